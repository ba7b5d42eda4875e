use std::path::PathBuf;

use thiserror::Error;

use crate::registry::CallbackKind;

/// Errors surfaced by the script runtime.
///
/// Startup errors (`ModuleDir`, `Compile`, `Evaluate`) abort `init_modules`
/// and carry path or module-name context. Invocation errors go back to the
/// caller; the runtime recovers the child state and keeps serving, and no
/// error crosses from one invocation into another.
#[derive(Debug, Error)]
pub enum ScriptingError {
    /// The module root could not be created or walked.
    #[error("module directory {}: {source}", path.display())]
    ModuleDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A module failed to compile. Fatal at startup; a bad script is not a
    /// missing script.
    #[error("failed to compile module {}: {detail}", path.display())]
    Compile { path: PathBuf, detail: String },

    /// A module's top-level body raised. Fatal at startup.
    #[error("failed to evaluate module {name}: {detail}")]
    Evaluate { name: String, detail: String },

    /// No callback registered under this kind and key.
    #[error("no {kind} callback registered for \"{key}\"")]
    NotFound { kind: CallbackKind, key: String },

    /// A registration arrived for a kind and key that is already taken.
    #[error("{kind} callback already registered for \"{key}\"")]
    Duplicate { kind: CallbackKind, key: String },

    /// The callback raised during invocation.
    #[error("script error: {0}")]
    Script(String),

    /// The callback returned something other than a single table or nothing.
    #[error("callback must return a single table or no value")]
    BadReturn,

    /// The invocation ran past its configured deadline.
    #[error("invocation deadline exceeded")]
    Timeout,

    /// Engine-level failure outside the scripted paths.
    #[error("scripting state error: {0}")]
    State(String),
}
