//! Collaborator ports
//!
//! The engine never performs storage, network or logging work itself. It
//! holds one replaceable handle per capability and dispatches to whichever
//! handle is current, falling back to the built-in defaults below.

pub mod logging;
pub mod network;
pub mod storage;

pub use logging::{DefaultLogSystem, LogLevel, LogSystem};
pub use network::{DefaultWebRequest, HttpRequest, HttpResponse, NetworkError, WebRequest};
pub use storage::{DefaultFileSystem, FileSystem, StatResult, StorageError};
