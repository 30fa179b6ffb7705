use std::path::PathBuf;

use anyhow::Context;
use kiln_paths::SearchRoot;
use kiln_sandbox::ScriptSource;
use mlua::Lua;

/// The option set a `config.lua` may assign (§6 "Configuration file"). Every
/// field has a sensible default so a missing assignment is not an error.
#[derive(Debug, Clone)]
pub struct Config {
    pub color: bool,
    pub cores: usize,
    pub extensions: Vec<String>,
    pub exist_action: Option<PathBuf>,
    pub prescript: Option<PathBuf>,
    pub postscript: Option<PathBuf>,
    pub scripts: Vec<PathBuf>,
    pub online: bool,
    pub acoustid_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            color: true,
            cores: num_cpus::get().max(1),
            extensions: default_extensions(),
            exist_action: None,
            prescript: None,
            postscript: None,
            scripts: Vec::new(),
            online: true,
            acoustid_key: String::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["flac", "mp3", "m4a", "ogg", "opus", "wav", "aiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Loads `root`'s `config.lua` through the same whitelisted Lua environment
/// the script sandbox uses for per-track scripts, per §6: "Loaded once at
/// startup through the same sandbox engine used for user scripts."
pub fn load(root: &SearchRoot) -> anyhow::Result<Config> {
    let body = std::fs::read_to_string(root.config_file())
        .with_context(|| format!("reading {}", root.config_file().display()))?;

    let lua = Lua::new();
    let base_env = kiln_sandbox::whitelist::build_base_env(&lua)?;
    let env = kiln_sandbox::whitelist::clone_env(&lua, &base_env)?;

    lua.load(body.as_str())
        .set_name("config.lua")
        .set_environment(env.clone())
        .exec()
        .with_context(|| "config.lua raised an error".to_string())?;

    let mut config = Config::default();

    if let Ok(color) = env.get::<bool>("color") {
        config.color = color;
    }
    if let Ok(cores) = env.get::<u32>("cores") {
        config.cores = (cores as usize).max(1);
    }
    if let Ok(extensions) = env.get::<Vec<String>>("extensions") {
        config.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
    }
    if let Ok(path) = env.get::<String>("exist_action") {
        config.exist_action = Some(root.actions_dir().join(path));
    }
    if let Ok(path) = env.get::<String>("prescript") {
        config.prescript = Some(root.scripts_dir().join(path));
    }
    if let Ok(path) = env.get::<String>("postscript") {
        config.postscript = Some(root.scripts_dir().join(path));
    }
    if let Ok(names) = env.get::<Vec<String>>("scripts") {
        config.scripts = names.into_iter().map(|n| root.scripts_dir().join(n)).collect();
    }
    if let Ok(online) = env.get::<bool>("online") {
        config.online = online;
    }
    if let Ok(key) = env.get::<String>("acoustid_key") {
        config.acoustid_key = key;
    }

    Ok(config)
}

/// Reads a named script file into a `ScriptSource`, erroring (fatally —
/// §7 "missing external tool / unreadable configuration") if it can't be read.
pub fn read_script(path: &PathBuf) -> anyhow::Result<ScriptSource> {
    let body = std::fs::read_to_string(path).with_context(|| format!("reading script {}", path.display()))?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(ScriptSource { name, body })
}
