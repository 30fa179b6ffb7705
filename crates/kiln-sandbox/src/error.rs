use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("lua runtime error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("script '{name}' failed: {source}")]
    ScriptFailed { name: String, source: mlua::Error },

    #[error("invalid pattern '{0}': {1}")]
    InvalidPattern(String, regex::Error),
}
