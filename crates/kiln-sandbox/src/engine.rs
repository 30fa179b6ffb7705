use std::cell::RefCell;

use mlua::{Lua, Table, Value};

use kiln_core::{OutputInfo, TagMap, WriteDisposition};

use crate::error::SandboxError;
use crate::whitelist;

/// One named script or action body, compiled fresh against a cloned `_ENV`
/// table for each run.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub name: String,
    pub body: String,
}

/// Per-run log target for the `debug()` helper. Lives in Lua app-data so the
/// registered closure stays free of captured per-file state (§4.4).
pub struct LogSink(RefCell<Vec<String>>);

impl LogSink {
    fn new() -> Self {
        LogSink(RefCell::new(Vec::new()))
    }

    pub fn push(&self, line: String) {
        self.0.borrow_mut().push(line);
    }

    fn into_lines(self) -> Vec<String> {
        self.0.into_inner()
    }
}

/// The embedded Lua 5.4 runtime. One instance is shared across analyzer
/// workers; `run_chain`/`run_exist_action` are safe to call concurrently
/// because each call operates on its own cloned environment table and its own
/// app-data slot is swapped in and out around the call — nothing here is
/// actually `Send`-shared mid-run (callers serialize access, per §4.1/§5:
/// script-chain execution is sequential per record).
pub struct Sandbox {
    lua: Lua,
    base_env: Table,
}

impl Sandbox {
    pub fn new() -> Result<Self, SandboxError> {
        let lua = Lua::new();
        let base_env = whitelist::build_base_env(&lua)?;
        Ok(Sandbox { lua, base_env })
    }

    /// Runs `scripts` in order against `output`, seeded from `input`. Returns
    /// the mutated output and appends any `debug()` lines to `log`. A script
    /// failure is logged and aborts the chain (policy: abort on first error,
    /// §4.4 contract step 3).
    pub fn run_chain(
        &self,
        scripts: &[ScriptSource],
        input_tags: &TagMap,
        mut output: OutputInfo,
        log: &mut Vec<String>,
    ) -> Result<OutputInfo, SandboxError> {
        let env = whitelist::clone_env(&self.lua, &self.base_env)?;

        let input_table = self.lua.create_table()?;
        input_table.set("tags", tags_to_table(&self.lua, input_tags)?)?;
        env.set("input", input_table)?;

        let output_table = output_to_table(&self.lua, &output)?;
        env.set("output", output_table.clone())?;
        env.set("i", env.get::<Table>("input")?.get::<Table>("tags")?)?;
        env.set("o", output_table.get::<Table>("tags")?)?;

        self.lua.set_app_data(LogSink::new());

        for script in scripts {
            let chunk = self
                .lua
                .load(script.body.as_str())
                .set_name(&script.name)
                .set_environment(env.clone());
            if let Err(source) = chunk.exec() {
                log.push(format!("script '{}' failed: {}", script.name, source));
                break;
            }
        }

        if let Some(sink) = self.lua.remove_app_data::<LogSink>() {
            log.extend(sink.into_lines());
        }

        table_to_output(&output_table, &mut output)?;
        Ok(output)
    }

    /// Runs the `exist` action (§4.4): same shape as a script, but also sees
    /// `existinfo` (the probed existing destination's tags) and is expected
    /// to set `output.write` to one of `overwrite`/`skip`/`suffix`. Default on
    /// no configured action, or on failure to set a recognized value, is
    /// `suffix`.
    pub fn run_exist_action(
        &self,
        action: Option<&ScriptSource>,
        existinfo_tags: &TagMap,
        mut output: OutputInfo,
        log: &mut Vec<String>,
    ) -> Result<OutputInfo, SandboxError> {
        let Some(action) = action else {
            output.write = WriteDisposition::Suffix;
            return Ok(output);
        };

        let env = whitelist::clone_env(&self.lua, &self.base_env)?;
        let existinfo_table = self.lua.create_table()?;
        existinfo_table.set("tags", tags_to_table(&self.lua, existinfo_tags)?)?;
        env.set("existinfo", existinfo_table)?;

        let output_table = output_to_table(&self.lua, &output)?;
        env.set("output", output_table.clone())?;
        env.set("o", output_table.get::<Table>("tags")?)?;

        self.lua.set_app_data(LogSink::new());

        let chunk = self
            .lua
            .load(action.body.as_str())
            .set_name(&action.name)
            .set_environment(env.clone());
        if let Err(source) = chunk.exec() {
            log.push(format!("exist action '{}' failed: {}", action.name, source));
        }

        if let Some(sink) = self.lua.remove_app_data::<LogSink>() {
            log.extend(sink.into_lines());
        }

        table_to_output(&output_table, &mut output)?;
        Ok(output)
    }
}

fn tags_to_table(lua: &Lua, tags: &TagMap) -> Result<Table, SandboxError> {
    let table = lua.create_table()?;
    for (k, v) in &tags.0 {
        table.set(k.as_str(), v.as_str())?;
    }
    Ok(table)
}

/// Extracts a `TagMap` back out of a Lua table, coercing any numeric values
/// back to strings (§4.4 contract step 4 — user scripts are expected to
/// read/write strings, but Lua arithmetic on a tag like `track` naturally
/// yields a number).
fn table_to_tags(table: &Table) -> Result<TagMap, SandboxError> {
    let mut tags = TagMap::new();
    for pair in table.clone().pairs::<String, Value>() {
        let (key, value) = pair?;
        let as_string = match value {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Number(n) => format_lua_number(n),
            Value::Integer(n) => n.to_string(),
            Value::Nil => String::new(),
            other => other.to_string()?,
        };
        tags.set(key, as_string);
    }
    Ok(tags)
}

fn format_lua_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn output_to_table(lua: &Lua, output: &OutputInfo) -> Result<Table, SandboxError> {
    let table = lua.create_table()?;
    table.set("destination", output.destination.to_string_lossy().to_string())?;
    table.set("container", output.container.clone())?;
    table.set(
        "params",
        lua.create_sequence_from(output.params.clone())?,
    )?;
    table.set("tags", tags_to_table(lua, &output.tags)?)?;
    table.set("write", write_disposition_to_str(output.write))?;
    table.set("removesource", output.removesource)?;
    Ok(table)
}

fn table_to_output(table: &Table, output: &mut OutputInfo) -> Result<(), SandboxError> {
    if let Ok(destination) = table.get::<String>("destination") {
        output.destination = destination.into();
    }
    if let Ok(container) = table.get::<String>("container") {
        output.container = container;
    }
    if let Ok(params) = table.get::<Vec<String>>("params") {
        output.params = params;
    }
    if let Ok(tags_table) = table.get::<Table>("tags") {
        output.tags = table_to_tags(&tags_table)?;
    }
    if let Ok(write) = table.get::<String>("write") {
        output.write = str_to_write_disposition(&write);
    }
    if let Ok(removesource) = table.get::<bool>("removesource") {
        output.removesource = removesource;
    }
    Ok(())
}

fn write_disposition_to_str(write: WriteDisposition) -> &'static str {
    match write {
        WriteDisposition::Overwrite => "overwrite",
        WriteDisposition::Skip => "skip",
        WriteDisposition::Suffix => "suffix",
    }
}

fn str_to_write_disposition(s: &str) -> WriteDisposition {
    match s {
        "overwrite" => WriteDisposition::Overwrite,
        "skip" => WriteDisposition::Skip,
        _ => WriteDisposition::Suffix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_output() -> OutputInfo {
        OutputInfo {
            destination: PathBuf::from("/music/a.flac"),
            container: "flac".to_string(),
            params: vec!["-c:a".to_string(), "copy".to_string()],
            tags: TagMap::new(),
            covers: Vec::new(),
            write: WriteDisposition::Suffix,
            removesource: false,
        }
    }

    #[test]
    fn script_can_rewrite_output_tags() {
        let sandbox = Sandbox::new().unwrap();
        let scripts = vec![ScriptSource {
            name: "rewrite".to_string(),
            body: "o.title = i.title .. ' (remaster)'".to_string(),
        }];
        let mut input_tags = TagMap::new();
        input_tags.set("title", "Song");
        let mut log = Vec::new();

        let output = sandbox
            .run_chain(&scripts, &input_tags, sample_output(), &mut log)
            .unwrap();

        assert_eq!(output.tags.get("title"), Some("Song (remaster)"));
    }

    #[test]
    fn debug_helper_appends_to_log() {
        let sandbox = Sandbox::new().unwrap();
        let scripts = vec![ScriptSource {
            name: "log-test".to_string(),
            body: "debug('hello from script')".to_string(),
        }];
        let mut log = Vec::new();

        sandbox
            .run_chain(&scripts, &TagMap::new(), sample_output(), &mut log)
            .unwrap();

        assert_eq!(log, vec!["hello from script".to_string()]);
    }

    #[test]
    fn failing_script_aborts_chain_and_logs() {
        let sandbox = Sandbox::new().unwrap();
        let scripts = vec![
            ScriptSource {
                name: "boom".to_string(),
                body: "error('nope')".to_string(),
            },
            ScriptSource {
                name: "unreachable".to_string(),
                body: "o.title = 'should not run'".to_string(),
            },
        ];
        let mut log = Vec::new();

        let output = sandbox
            .run_chain(&scripts, &TagMap::new(), sample_output(), &mut log)
            .unwrap();

        assert!(output.tags.get("title").is_none());
        assert!(log.iter().any(|l| l.contains("boom")));
    }

    #[test]
    fn titlecase_script_handles_stopwords_and_name_prefixes() {
        let sandbox = Sandbox::new().unwrap();
        let script_body = r#"
local first = true
local function cap(word)
    local is_first = first
    first = false
    local is_stop = string.find(word, "(?i)^(and|feat)\\.?$") ~= nil
    if is_stop and not is_first then
        return string.lower(word)
    end
    local head = string.upper(string.sub(word, 1, 1))
    local rest = string.lower(string.sub(word, 2, -1))
    local result = head .. rest
    if string.find(string.lower(word), "^mc.") ~= nil and string.len(word) > 2 then
        result = string.sub(result, 1, 2) .. string.upper(string.sub(result, 3, 3)) .. string.sub(result, 4, -1)
    end
    local apos = string.find(result, "'")
    if apos ~= nil then
        local before = string.sub(result, 1, apos)
        local after = string.upper(string.sub(result, apos + 1, apos + 1))
        local tail = string.sub(result, apos + 2, -1)
        result = before .. after .. tail
    end
    return result
end
o.title = string.gsub(i.title, "\\S+", cap)
"#;
        let scripts = vec![ScriptSource {
            name: "titlecase".to_string(),
            body: script_body.to_string(),
        }];

        let cases = [
            ("all lowercase words", "All Lowercase Words"),
            ("Feat and Feat. the machines.", "Feat and feat. The Machines."),
            ("o'hara", "O'Hara"),
            ("mcdonald", "McDonald"),
        ];

        for (input, expected) in cases {
            let mut input_tags = TagMap::new();
            input_tags.set("title", input);
            let mut log = Vec::new();
            let output = sandbox.run_chain(&scripts, &input_tags, sample_output(), &mut log).unwrap();
            assert_eq!(output.tags.get("title"), Some(expected), "input: {input:?}, log: {log:?}");
        }
    }

    #[test]
    fn missing_exist_action_defaults_to_suffix() {
        let sandbox = Sandbox::new().unwrap();
        let mut log = Vec::new();
        let output = sandbox
            .run_exist_action(None, &TagMap::new(), sample_output(), &mut log)
            .unwrap();
        assert_eq!(output.write, WriteDisposition::Suffix);
    }

    #[test]
    fn exist_action_can_set_overwrite() {
        let sandbox = Sandbox::new().unwrap();
        let action = ScriptSource {
            name: "exist".to_string(),
            body: "output.write = 'overwrite'".to_string(),
        };
        let mut log = Vec::new();
        let output = sandbox
            .run_exist_action(Some(&action), &TagMap::new(), sample_output(), &mut log)
            .unwrap();
        assert_eq!(output.write, WriteDisposition::Overwrite);
    }
}
