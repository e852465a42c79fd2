//! Client connection acceptor for the embedded server.
//!
//! The transport module binds the client port with an explicit backlog and
//! accepts connections in a background thread, handing each one to a
//! [`ConnectionHandler`] on its own worker thread.

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub(crate) use self::handler::ConnectionHandler;
#[cfg(test)]
pub(crate) use self::handler::CountingHandler;
pub(crate) use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
