//! The snapshot-state runtime: module loading, evaluation, and invocation.
//!
//! Startup builds one Lua state, compiles every module under the module
//! root into `package.preload`, then runs each module body exactly once —
//! bodies already materialized through another module's `require` are
//! skipped. That state is retained as the snapshot; every request-time
//! invocation runs in a child thread spawned from it, sharing globals and
//! the module cache but owning its call stack.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use mlua::{
    Function, HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Table, Thread, ThreadStatus,
    Value, VmState,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bridge;
use crate::config::ScriptingConfig;
use crate::error::ScriptingError;
use crate::loader;
use crate::marshal;
use crate::registry::{CallbackKind, CallbackRegistry};

/// VM instructions between deadline checks on a child thread.
const DEADLINE_CHECK_INSTRUCTIONS: u32 = 4096;

/// The embedded Lua runtime.
///
/// `new` builds the state, `init_modules` loads the operator's script
/// modules and freezes the snapshot, and `invoke` runs registered
/// callbacks per request. The runtime is `Send + Sync`; invocations from
/// different host threads serialize on the snapshot lock and each runs in
/// its own child thread on the calling thread.
pub struct ScriptRuntime {
    /// Snapshot state, locked for the duration of each execution
    lua: Mutex<Lua>,
    /// Callbacks registered by script modules during `init_modules`
    registry: Arc<CallbackRegistry>,
    config: ScriptingConfig,
}

impl ScriptRuntime {
    /// Create the snapshot state with the allowlisted standard libraries
    /// and the host bridge preloaded. `init_modules` must run before
    /// callbacks can be invoked.
    pub fn new(config: ScriptingConfig) -> Result<Self, ScriptingError> {
        // io, os, and debug stay closed: scripts must not reach the
        // filesystem, the process environment, or the debug interface.
        let libs =
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE | StdLib::PACKAGE;
        let lua = Lua::new_with(libs, LuaOptions::default()).map_err(state_error)?;
        let registry = Arc::new(CallbackRegistry::new());

        {
            let package: Table = lua.globals().get("package").map_err(state_error)?;

            // require() resolves against the module root only; whatever
            // search path the environment carried is discarded.
            let module_dir = config.module_dir();
            let search_path = format!("{0}/?.lua;{0}/?/init.lua", module_dir.display());
            package.set("path", search_path).map_err(state_error)?;

            let preload: Table = package.get("preload").map_err(state_error)?;
            let bridge_loader = bridge::loader(&lua, registry.clone()).map_err(state_error)?;
            preload
                .set(bridge::BRIDGE_MODULE, bridge_loader)
                .map_err(state_error)?;
        }

        Ok(Self {
            lua: Mutex::new(lua),
            registry,
            config,
        })
    }

    /// Walk the module root, compile every file once, then execute every
    /// module body exactly once.
    ///
    /// Compilation installs each thunk under its module name in
    /// `package.preload` before any body runs, so cross-module `require`
    /// always finds its target regardless of file order. The execute pass
    /// then skips modules a prior body already pulled in through
    /// `require`, and records each directly-run module's result the way
    /// `require` would — the reconciliation that keeps every body at
    /// exactly one execution.
    pub fn init_modules(&self) -> Result<(), ScriptingError> {
        let module_dir = self.config.module_dir();
        fs::create_dir_all(&module_dir).map_err(|source| ScriptingError::ModuleDir {
            path: module_dir.clone(),
            source,
        })?;

        let modules = loader::collect_modules(&module_dir)?;
        info!(
            target: "scripting",
            "Loading {} script module(s) from {}",
            modules.len(),
            module_dir.display()
        );

        let lua = self.lock_state();
        let package: Table = lua.globals().get("package").map_err(state_error)?;
        let preload: Table = package.get("preload").map_err(state_error)?;

        let mut pending = Vec::with_capacity(modules.len());
        for module in &modules {
            let source = fs::read_to_string(&module.path).map_err(|e| ScriptingError::Compile {
                path: module.path.clone(),
                detail: e.to_string(),
            })?;
            let thunk = lua
                .load(source)
                .set_name(module.name.as_str())
                .into_function()
                .map_err(|e| ScriptingError::Compile {
                    path: module.path.clone(),
                    detail: e.to_string(),
                })?;
            preload
                .set(module.name.as_str(), thunk.clone())
                .map_err(state_error)?;
            pending.push((module.name.clone(), thunk));
        }

        let loaded: Table = package.get("loaded").map_err(state_error)?;
        for (name, thunk) in pending {
            let cached: Value = loaded.raw_get(name.as_str()).map_err(state_error)?;
            if truthy(&cached) {
                debug!(
                    target: "scripting",
                    "Module {} already materialized via require, skipping", name
                );
                continue;
            }

            debug!(target: "scripting", "Evaluating module: {}", name);
            let results: MultiValue = thunk.call(()).map_err(|e| ScriptingError::Evaluate {
                name: name.clone(),
                detail: e.to_string(),
            })?;

            let result = results.into_iter().next().unwrap_or(Value::Nil);
            let record = if matches!(result, Value::Nil) {
                Value::Boolean(true)
            } else {
                result
            };
            loaded.raw_set(name.as_str(), record).map_err(state_error)?;
        }

        info!(
            target: "scripting",
            "Script modules loaded, {} callback(s) registered",
            self.registry.len()
        );
        Ok(())
    }

    /// Invoke a registered callback.
    ///
    /// The callback runs in a child thread spawned from the snapshot.
    /// Callbacks receive `(input, caller_id)` — the marshalled input table
    /// or nil, then the caller id as a string — and may return a single
    /// table or nothing.
    pub fn invoke(
        &self,
        kind: CallbackKind,
        key: &str,
        caller_id: Uuid,
        input: Option<&JsonValue>,
    ) -> Result<Option<JsonValue>, ScriptingError> {
        let callback = self
            .registry
            .get(kind, key)
            .ok_or_else(|| ScriptingError::NotFound {
                kind,
                key: key.to_owned(),
            })?;

        let lua = self.lock_state();
        let function: Function = lua.registry_value(&callback).map_err(state_error)?;
        let thread = lua.create_thread(function).map_err(state_error)?;

        let expired = self
            .config
            .call_timeout()
            .map(|budget| arm_deadline(&thread, budget));

        let mut args = Vec::with_capacity(2);
        args.push(match input {
            Some(value) => marshal::json_to_lua(&lua, value).map_err(state_error)?,
            None => Value::Nil,
        });
        args.push(Value::String(
            lua.create_string(caller_id.to_string())
                .map_err(state_error)?,
        ));

        let results = run_to_completion(&thread, args.into_iter().collect(), expired.as_deref())?;

        let mut results = results.into_iter();
        match (results.next(), results.next()) {
            (None, _) | (Some(Value::Nil), None) => Ok(None),
            (Some(Value::Table(table)), None) => {
                Ok(Some(marshal::lua_to_json(Value::Table(table)).map_err(state_error)?))
            }
            _ => Err(ScriptingError::BadReturn),
        }
    }

    /// Compile an ad-hoc chunk against the snapshot and run it in a fresh
    /// child thread. Gives host subsystems the same execution environment
    /// a callback gets: shared globals and module cache, private stack.
    pub fn eval(&self, source: &str) -> Result<(), ScriptingError> {
        let lua = self.lock_state();
        let function = lua
            .load(source)
            .set_name("eval")
            .into_function()
            .map_err(|e| ScriptingError::Compile {
                path: PathBuf::from("<eval>"),
                detail: e.to_string(),
            })?;
        let thread = lua.create_thread(function).map_err(state_error)?;
        run_to_completion(&thread, MultiValue::new(), None)?;
        Ok(())
    }

    /// The callback registry populated during `init_modules`.
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Shut the runtime down, releasing the snapshot and with it every
    /// module environment and registered callback.
    pub fn stop(self) {
        info!(target: "scripting", "Script runtime stopped");
    }

    fn lock_state(&self) -> MutexGuard<'_, Lua> {
        // A poisoned lock means a panic elsewhere while executing; the
        // snapshot state itself is still usable.
        self.lua.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Arm an instruction-count hook on a child thread that aborts execution
/// once `budget` has elapsed. Returns the flag the hook sets, so the
/// caller can tell a deadline abort from an ordinary script error.
fn arm_deadline(thread: &Thread, budget: Duration) -> Arc<AtomicBool> {
    let deadline = Instant::now() + budget;
    let expired = Arc::new(AtomicBool::new(false));
    let flag = expired.clone();
    thread.set_hook(
        HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INSTRUCTIONS),
        move |_lua, _debug| {
            if Instant::now() >= deadline {
                flag.store(true, Ordering::Relaxed);
                return Err(mlua::Error::RuntimeError(
                    "invocation deadline exceeded".to_owned(),
                ));
            }
            Ok(VmState::Continue)
        },
    );
    expired
}

/// Resume a child thread until it completes, passing through coroutine
/// yields — the host call is synchronous and returns only when the
/// callback finishes or raises.
fn run_to_completion(
    thread: &Thread,
    args: MultiValue,
    expired: Option<&AtomicBool>,
) -> Result<MultiValue, ScriptingError> {
    let map_call_error = |e: mlua::Error| {
        if expired.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            ScriptingError::Timeout
        } else {
            ScriptingError::Script(e.to_string())
        }
    };

    let mut results = thread.resume::<MultiValue>(args).map_err(map_call_error)?;
    while thread.status() == ThreadStatus::Resumable {
        results = thread.resume::<MultiValue>(()).map_err(map_call_error)?;
    }
    Ok(results)
}

fn state_error(error: mlua::Error) -> ScriptingError {
    ScriptingError::State(error.to_string())
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}
