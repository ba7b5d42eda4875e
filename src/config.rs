use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration consumed by the script runtime.
///
/// The operator-facing configuration layer embeds this struct; the runtime
/// itself only needs the data directory and the optional invocation
/// deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Server data directory. Script modules live under `<data_dir>/modules`.
    pub data_dir: PathBuf,
    /// Deadline for a single callback invocation, in milliseconds. Absent
    /// means invocations run without a time budget.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl ScriptingConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            call_timeout_ms: None,
        }
    }

    /// The module root: `<data_dir>/modules`.
    pub fn module_dir(&self) -> PathBuf {
        self.data_dir.join("modules")
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
