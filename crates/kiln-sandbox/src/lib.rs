pub mod engine;
pub mod error;
pub mod pattern;
pub mod whitelist;

pub use engine::{Sandbox, ScriptSource};
pub use error::SandboxError;
