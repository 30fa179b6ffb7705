use mlua::{Lua, MultiValue, Table, Value, Variadic};

use kiln_resolver::{stringnorm, stringrel};

use crate::engine::LogSink;
use crate::error::SandboxError;
use crate::pattern;

/// Builds the whitelisted base environment table once per `Sandbox` lifetime
/// (§4.4). Used as the Lua `_ENV` for every chunk; never mutated afterward —
/// each file run gets a freshly cloned copy (`clone_env`), which is the
/// "restore to pristine" guarantee without spinning up a new `Lua` VM per file
/// (§9's stated preference for snapshot-based restoration over per-file VMs).
pub fn build_base_env(lua: &Lua) -> Result<Table, SandboxError> {
    let env = lua.create_table()?;
    let globals = lua.globals();

    for name in [
        "pairs", "ipairs", "next", "type", "tostring", "tonumber", "select", "rawequal", "error",
        "pcall", "assert",
    ] {
        env.set(name, globals.get::<Value>(name)?)?;
    }

    env.set("math", whitelisted_math(lua)?)?;
    env.set("table", whitelisted_table(lua)?)?;
    env.set("os", whitelisted_os(lua)?)?;
    env.set("string", whitelisted_string(lua)?)?;

    register_helpers(lua, &env)?;

    Ok(env)
}

/// Shallow copy of `env`'s key/value pairs into a fresh table. Function values
/// are Lua references and are shared, not duplicated — safe because none of
/// the whitelisted functions close over per-file mutable state; the one
/// exception (`debug`) reads its target through Lua app-data set fresh by the
/// engine before each run, not through a captured upvalue.
pub fn clone_env(lua: &Lua, base: &Table) -> Result<Table, SandboxError> {
    let fresh = lua.create_table()?;
    for pair in base.clone().pairs::<Value, Value>() {
        let (k, v) = pair?;
        fresh.set(k, v)?;
    }
    Ok(fresh)
}

fn whitelisted_math(lua: &Lua) -> Result<Table, SandboxError> {
    let src: Table = lua.globals().get("math")?;
    let dst = lua.create_table()?;
    for name in ["abs", "floor", "ceil", "min", "max", "huge", "maxinteger", "mininteger"] {
        dst.set(name, src.get::<Value>(name)?)?;
    }
    Ok(dst)
}

fn whitelisted_table(lua: &Lua) -> Result<Table, SandboxError> {
    let src: Table = lua.globals().get("table")?;
    let dst = lua.create_table()?;
    for name in ["insert", "remove", "sort", "concat", "unpack"] {
        dst.set(name, src.get::<Value>(name)?)?;
    }
    Ok(dst)
}

/// Read-only time and environment access: `time`/`date`/`clock`, and a single
/// `getenv` wrapper. No `execute`, no `remove`, no `tmpname`.
fn whitelisted_os(lua: &Lua) -> Result<Table, SandboxError> {
    let src: Table = lua.globals().get("os")?;
    let dst = lua.create_table()?;
    for name in ["time", "date", "clock"] {
        dst.set(name, src.get::<Value>(name)?)?;
    }
    dst.set(
        "getenv",
        lua.create_function(|_, name: String| Ok(std::env::var(name).ok()))?,
    )?;
    Ok(dst)
}

/// The sandboxed string table: native length/concat-adjacent helpers kept,
/// but every pattern-bearing function (`find`, `gmatch`, `gsub`) replaced by
/// the regex-backed pattern engine, per §4.4.
fn whitelisted_string(lua: &Lua) -> Result<Table, SandboxError> {
    let dst = lua.create_table()?;

    dst.set("len", lua.create_function(|_, s: String| Ok(pattern::codepoint_len(&s)))?)?;
    dst.set(
        "upper",
        lua.create_function(|_, s: String| Ok(s.to_uppercase()))?,
    )?;
    dst.set(
        "lower",
        lua.create_function(|_, s: String| Ok(s.to_lowercase()))?,
    )?;
    dst.set(
        "reverse",
        lua.create_function(|_, s: String| Ok(pattern::reverse(&s)))?,
    )?;
    dst.set(
        "sub",
        lua.create_function(|_, (s, start, end): (String, i64, Option<i64>)| {
            Ok(pattern::sub_range(&s, start, end.unwrap_or(-1)))
        })?,
    )?;

    dst.set(
        "find",
        lua.create_function(|_, (s, pat): (String, String)| {
            let re = pattern::compiled(&pat).map_err(to_lua_error)?;
            match re.find(&s) {
                Some(m) => {
                    let start_cp = s[..m.start()].chars().count() as i64 + 1;
                    let end_cp = s[..m.end()].chars().count() as i64;
                    Ok(MultiValue::from_vec(vec![
                        Value::Integer(start_cp),
                        Value::Integer(end_cp),
                    ]))
                }
                None => Ok(MultiValue::from_vec(vec![Value::Nil])),
            }
        })?,
    )?;

    dst.set(
        "matchall",
        lua.create_function(|lua, (s, pat): (String, String)| {
            let re = pattern::compiled(&pat).map_err(to_lua_error)?;
            let matches: Vec<String> = re.find_iter(&s).map(|m| m.as_str().to_string()).collect();
            lua.create_sequence_from(matches)
        })?,
    )?;

    dst.set(
        "gsub",
        lua.create_function(|lua, (s, pat, repl): (String, String, Value)| {
            let re = pattern::compiled(&pat).map_err(to_lua_error)?;
            let mut count = 0usize;
            let mut out = String::with_capacity(s.len());
            let mut last = 0usize;
            for m in re.find_iter(&s) {
                out.push_str(&s[last..m.start()]);
                let replacement = resolve_replacement(lua, &repl, m.as_str())?;
                out.push_str(&replacement);
                last = m.end();
                count += 1;
            }
            out.push_str(&s[last..]);
            Ok((out, count))
        })?,
    )?;

    Ok(dst)
}

fn resolve_replacement(lua: &Lua, repl: &Value, matched: &str) -> mlua::Result<String> {
    match repl {
        Value::String(template) => Ok(template.to_str()?.replace("%0", matched)),
        Value::Table(table) => match table.get::<Value>(matched)? {
            Value::Nil | Value::Boolean(false) => Ok(matched.to_string()),
            other => lua.coerce_string(other)?.map_or(Ok(matched.to_string()), |s| {
                Ok(s.to_str().map(|s| s.to_string()).unwrap_or_else(|_| matched.to_string()))
            }),
        },
        Value::Function(f) => {
            let result: Value = f.call(matched.to_string())?;
            match result {
                Value::Nil | Value::Boolean(false) => Ok(matched.to_string()),
                other => Ok(lua
                    .coerce_string(other)?
                    .and_then(|s| s.to_str().ok().map(|s| s.to_string()))
                    .unwrap_or_else(|| matched.to_string())),
            }
        }
        _ => Ok(matched.to_string()),
    }
}

fn to_lua_error(e: crate::error::SandboxError) -> mlua::Error {
    mlua::Error::RuntimeError(e.to_string())
}

/// Registers the three helpers named in the whitelist (§4.4): `debug`,
/// `stringnorm`, `stringrel`. `debug` writes through the per-run `LogSink` app
/// data rather than a captured buffer, so the same closure is safe to reuse
/// across every file's cloned environment.
fn register_helpers(lua: &Lua, env: &Table) -> Result<(), SandboxError> {
    env.set(
        "debug",
        lua.create_function(|lua, args: Variadic<String>| {
            let line = args.join(" ");
            if let Some(sink) = lua.app_data_ref::<LogSink>() {
                sink.push(line);
            }
            Ok(())
        })?,
    )?;

    env.set(
        "stringnorm",
        lua.create_function(|_, s: String| Ok(stringnorm(&s)))?,
    )?;

    env.set(
        "stringrel",
        lua.create_function(|_, (a, b): (String, String)| Ok(stringrel(&a, &b)))?,
    )?;

    Ok(())
}
