// src/lib.rs
pub mod buffer;
pub mod config;
pub mod conn;
pub mod deque;
pub mod epoll;
pub mod error;
pub mod http;
pub mod io;
pub mod logging;
pub mod mmap;
pub mod pool;
pub mod server;
pub mod sys;
pub mod timer;

// Re-exports for users
pub use buffer::{Buffer, NewLine};
pub use config::Config;
pub use conn::{root_directory, set_root_directory, Connection};
pub use deque::BlockDeque;
pub use error::{Error, Result};
pub use http::{Method, StatusCode};
pub use logging::init_logging;
pub use mmap::MappedFile;
pub use pool::ThreadPool;
pub use server::{ServerHandle, WebServer, WebServerBuilder};
pub use sys::IpFamily;
pub use timer::HeapTimer;
