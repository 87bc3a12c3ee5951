pub mod connection;
pub mod handler;
pub mod session;
pub mod types;

pub use connection::{ConnectionHandle, ConnectionRegistry, DEFAULT_OUTBOUND_CAPACITY};
pub use handler::ws_handler;
pub use session::{DuplexSession, SessionConfig, SessionState};
pub use types::ServerFrame;
