//! Embedded Lua script runtime for the Burrow game server.
//!
//! Operators drop Lua modules into `<data_dir>/modules/`. At startup the
//! runtime compiles and runs every module exactly once; modules call
//! `require("burrow")` to register callbacks against host extension
//! points (HTTP endpoints, RPC methods, and pre-/post-hooks of built-in
//! operations). The resulting state is kept as the snapshot, and each
//! request-time invocation runs in a child thread spawned from it.
//!
//! ```no_run
//! use burrow_scripting::{CallbackKind, ScriptRuntime, ScriptingConfig};
//! use uuid::Uuid;
//!
//! let runtime = ScriptRuntime::new(ScriptingConfig::new("/srv/burrow/data"))?;
//! runtime.init_modules()?;
//! let output = runtime.invoke(CallbackKind::Http, "/test/helloworld", Uuid::nil(), None)?;
//! # Ok::<(), burrow_scripting::ScriptingError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod loader;
pub mod marshal;
pub mod registry;
pub mod runtime;

pub use bridge::BRIDGE_MODULE;
pub use config::ScriptingConfig;
pub use error::ScriptingError;
pub use registry::{CallbackKind, CallbackRegistry};
pub use runtime::ScriptRuntime;
