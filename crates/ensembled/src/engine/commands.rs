//! Admin four-letter-word commands understood by the standalone engine.

use std::fmt;

/// Four-byte admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FourLetterWord {
    /// Liveness check, answered with `imok`.
    Ruok,
    /// Read-only check, answered with `rw`.
    Isro,
    /// Server summary.
    Srvr,
    /// Server summary preceded by the connected clients.
    Stat,
    /// Effective configuration.
    Conf,
    /// Environment details.
    Envi,
}

impl FourLetterWord {
    /// Wire form of the command.
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            Self::Ruok => b"ruok",
            Self::Isro => b"isro",
            Self::Srvr => b"srvr",
            Self::Stat => b"stat",
            Self::Conf => b"conf",
            Self::Envi => b"envi",
        }
    }

    /// Decodes a command from its wire form.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 4]) -> Option<Self> {
        match bytes {
            b"ruok" => Some(Self::Ruok),
            b"isro" => Some(Self::Isro),
            b"srvr" => Some(Self::Srvr),
            b"stat" => Some(Self::Stat),
            b"conf" => Some(Self::Conf),
            b"envi" => Some(Self::Envi),
            _ => None,
        }
    }
}

impl fmt::Display for FourLetterWord {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ruok => "ruok",
            Self::Isro => "isro",
            Self::Srvr => "srvr",
            Self::Stat => "stat",
            Self::Conf => "conf",
            Self::Envi => "envi",
        };
        formatter.write_str(label)
    }
}
