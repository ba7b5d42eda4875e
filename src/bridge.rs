//! The host bridge module scripts import to reach registration primitives.
//!
//! Scripts do `local burrow = require("burrow")` and get a table exposing
//! `register_http`, `register_rpc`, `register_before`, and `register_after`.
//! Each primitive validates its arguments and populates the callback
//! registry; splitting the kinds into distinct functions keeps the
//! capability surface enumerable and catches kind typos at load time.

use std::sync::Arc;

use mlua::{Function, Lua, Value, Variadic};

use crate::registry::{CallbackKind, CallbackRegistry};

/// Module name scripts pass to `require` to reach the host bridge.
pub const BRIDGE_MODULE: &str = "burrow";

/// Build the `package.preload` entry for the bridge module.
///
/// The returned function is what `require("burrow")` runs on first use; it
/// produces the module table. Registrations write into `registry`, which
/// the runtime owns — the bridge holds no state of its own.
pub fn loader(lua: &Lua, registry: Arc<CallbackRegistry>) -> mlua::Result<Function> {
    lua.create_function(move |lua, _args: Variadic<Value>| {
        let module = lua.create_table()?;
        module.set(
            "register_http",
            register_fn(lua, registry.clone(), CallbackKind::Http, "register_http")?,
        )?;
        module.set(
            "register_rpc",
            register_fn(lua, registry.clone(), CallbackKind::Rpc, "register_rpc")?,
        )?;
        module.set(
            "register_before",
            register_fn(lua, registry.clone(), CallbackKind::Before, "register_before")?,
        )?;
        module.set(
            "register_after",
            register_fn(lua, registry.clone(), CallbackKind::After, "register_after")?,
        )?;
        Ok(module)
    })
}

/// One registration primitive: `(function, key)` -> no return value.
///
/// The typed argument tuple makes mlua raise "bad argument #1" when the
/// callback is not a function; the empty-key and duplicate checks raise
/// with the same argument-error phrasing.
fn register_fn(
    lua: &Lua,
    registry: Arc<CallbackRegistry>,
    kind: CallbackKind,
    name: &'static str,
) -> mlua::Result<Function> {
    lua.create_function(move |lua, (callback, key): (Function, String)| {
        if key.is_empty() {
            return Err(mlua::Error::RuntimeError(format!(
                "bad argument #2 to '{name}' (key must be a non-empty string)"
            )));
        }
        let handle = lua.create_registry_value(callback)?;
        registry
            .put(kind, &key, Arc::new(handle))
            .map_err(mlua::Error::external)?;
        Ok(())
    })
}
