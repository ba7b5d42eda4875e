use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use mlua::RegistryKey;
use tracing::debug;

use crate::error::ScriptingError;

/// Host extension points a script callback can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// An HTTP endpoint, keyed by path
    Http,
    /// An RPC method, keyed by name
    Rpc,
    /// A pre-hook of a built-in operation, keyed by operation name
    Before,
    /// A post-hook of a built-in operation, keyed by operation name
    After,
}

impl CallbackKind {
    /// Entry-key prefix. The four prefixes are distinct so a flat map
    /// suffices and the same identifier may appear under multiple kinds.
    pub(crate) fn prefix(self) -> &'static str {
        match self {
            CallbackKind::Http => "http_",
            CallbackKind::Rpc => "rpc_",
            CallbackKind::Before => "pre_",
            CallbackKind::After => "post_",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallbackKind::Http => "http",
            CallbackKind::Rpc => "rpc",
            CallbackKind::Before => "before",
            CallbackKind::After => "after",
        })
    }
}

/// Mapping from `(kind, key)` to the Lua function a script registered.
///
/// Writes happen during startup evaluation; reads happen at request time
/// from any host thread. Entries are handles into the snapshot state, so
/// the registry holds no lifetime of its own: once the runtime is shut
/// down the entries are dead and lookups are not defended against.
pub struct CallbackRegistry {
    entries: RwLock<HashMap<String, Arc<RegistryKey>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store a callback. A second registration for the same `(kind, key)`
    /// is rejected; double registration in scripts is almost always a bug.
    pub fn put(
        &self,
        kind: CallbackKind,
        key: &str,
        callback: Arc<RegistryKey>,
    ) -> Result<(), ScriptingError> {
        let id = entry_id(kind, key);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return Err(ScriptingError::Duplicate {
                kind,
                key: key.to_owned(),
            });
        }
        debug!(target: "scripting", "Registered {} callback: {}", kind, key);
        entries.insert(id, callback);
        Ok(())
    }

    /// Look up a callback by kind and key.
    pub fn get(&self, kind: CallbackKind, key: &str) -> Option<Arc<RegistryKey>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&entry_id(kind, key)).cloned()
    }

    /// Number of registered callbacks across all kinds.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_id(kind: CallbackKind, key: &str) -> String {
    format!("{}{}", kind.prefix(), key)
}
