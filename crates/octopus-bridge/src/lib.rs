//! # Octopus Bridge
//!
//! Embeds a Rhai script runtime in a host application and connects the two
//! sides.
//!
//! ## Features
//!
//! - One engine per embedding with a persistent execution context
//! - Host values in and out of scripts ([`Value`])
//! - Native callbacks invokable from scripts ([`Engine::new_callback`])
//! - Named event handlers dispatched from host or script code
//! - Replaceable storage, network and logging ports with built-in defaults
//!
//! ## Example
//!
//! ```no_run
//! use octopus_bridge::prelude::*;
//!
//! # fn main() -> octopus_bridge::Result<()> {
//! let engine = Engine::new(AppInfo::new("host", "1.0"))?;
//! let greet = engine.new_callback(|args| {
//!     let engine = Engine::from_arguments(args);
//!     let name = engine.convert_arguments(args)[0].as_string()?;
//!     Ok(engine.new_value(format!("hello {name}")))
//! })?;
//! engine.set_global_property("greet", &greet)?;
//!
//! engine.set_event_callback("done", |params| println!("done: {params:?}"));
//! let result = engine.evaluate(r#"trigger_event("done"); greet.call("world")"#, None)?;
//! assert_eq!(result.as_string()?, "hello world");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod app_info;
pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod globals;
pub mod ports;
pub mod value;

pub use app_info::AppInfo;
pub use callback::{CallbackArguments, NativeFn, MAX_CALLBACK_ARGS};
pub use config::{ConfigFormat, EngineOptions};
pub use engine::{Engine, WeakEngine};
pub use error::{Result, ScriptError};
pub use events::EventCallback;
pub use ports::{
    DefaultFileSystem, DefaultLogSystem, DefaultWebRequest, FileSystem, HttpRequest,
    HttpResponse, LogLevel, LogSystem, NetworkError, StatResult, StorageError, WebRequest,
};
pub use value::{IntoScript, Value};

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::app_info::AppInfo;
    pub use crate::callback::CallbackArguments;
    pub use crate::config::EngineOptions;
    pub use crate::engine::Engine;
    pub use crate::error::{Result, ScriptError};
    pub use crate::ports::{FileSystem, LogLevel, LogSystem, WebRequest};
    pub use crate::value::Value;
}
