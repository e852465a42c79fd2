//! Single client round-trip against the server.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

use crate::engine::FourLetterWord;

const EXPECTED_REPLY: &[u8] = b"imok";
const MAX_REPLY_BYTES: u64 = 64;

/// Reasons a single probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The server is not accepting connections yet.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Probed address.
        address: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The connection broke during the exchange.
    #[error("round-trip with {address} failed: {source}")]
    Exchange {
        /// Probed address.
        address: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The server answered with something other than `imok`.
    #[error("unexpected reply from {address}: {reply:?}")]
    UnexpectedReply {
        /// Probed address.
        address: SocketAddr,
        /// Lossy rendering of the reply.
        reply: String,
    },
}

impl ProbeError {
    /// True when the failure only means the server is not listening yet.
    #[must_use]
    pub fn is_not_listening(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
            ),
            Self::Exchange { .. } | Self::UnexpectedReply { .. } => false,
        }
    }
}

/// Sends `ruok` to `address` and expects `imok` back.
pub fn probe(address: SocketAddr, timeout: Duration) -> Result<(), ProbeError> {
    let mut stream = TcpStream::connect_timeout(&address, timeout)
        .map_err(|source| ProbeError::Connect { address, source })?;
    let exchange = |source: io::Error| ProbeError::Exchange { address, source };
    stream.set_read_timeout(Some(timeout)).map_err(exchange)?;
    stream.set_write_timeout(Some(timeout)).map_err(exchange)?;
    stream
        .write_all(FourLetterWord::Ruok.as_bytes())
        .map_err(exchange)?;

    let mut reply = Vec::new();
    (&mut stream)
        .take(MAX_REPLY_BYTES)
        .read_to_end(&mut reply)
        .map_err(exchange)?;
    if reply == EXPECTED_REPLY {
        Ok(())
    } else {
        Err(ProbeError::UnexpectedReply {
            address,
            reply: String::from_utf8_lossy(&reply).into_owned(),
        })
    }
}
