//! Cluster-wide error type and logging-aware construction macros.

use std::fmt;

/// Tagged error categories, per the error handling design: transport,
/// timeout, protocol, data, and quorum failures are distinguished so
/// callers can match on kind rather than parse a message string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParkClusterError {
    /// Broker unreachable, channel closed, publish rejected.
    Transport(String),
    /// A bounded wait elapsed with no reply.
    Timeout(String),
    /// Malformed payload: missing separator, unparseable score, unknown verb.
    Protocol(String),
    /// Zone not found, no spaces available, or similar non-fatal data gaps.
    Data(String),
    /// Fewer than `min_nodes` proposals available when a round needed to close.
    Quorum(String),
    /// Anything that would otherwise violate a cluster-state invariant.
    Internal(String),
}

impl ParkClusterError {
    pub fn msg(s: impl Into<String>) -> Self {
        ParkClusterError::Internal(s.into())
    }

    pub fn transport(s: impl Into<String>) -> Self {
        ParkClusterError::Transport(s.into())
    }

    pub fn timeout(s: impl Into<String>) -> Self {
        ParkClusterError::Timeout(s.into())
    }

    pub fn protocol(s: impl Into<String>) -> Self {
        ParkClusterError::Protocol(s.into())
    }

    pub fn data(s: impl Into<String>) -> Self {
        ParkClusterError::Data(s.into())
    }

    pub fn quorum(s: impl Into<String>) -> Self {
        ParkClusterError::Quorum(s.into())
    }
}

impl fmt::Display for ParkClusterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParkClusterError::Transport(s) => write!(f, "Transport: {}", s),
            ParkClusterError::Timeout(s) => write!(f, "Timeout: {}", s),
            ParkClusterError::Protocol(s) => write!(f, "Protocol: {}", s),
            ParkClusterError::Data(s) => write!(f, "Data: {}", s),
            ParkClusterError::Quorum(s) => write!(f, "Quorum: {}", s),
            ParkClusterError::Internal(s) => write!(f, "Internal: {}", s),
        }
    }
}

impl std::error::Error for ParkClusterError {}

impl From<std::io::Error> for ParkClusterError {
    fn from(e: std::io::Error) -> Self {
        ParkClusterError::Transport(e.to_string())
    }
}

impl From<uuid::Error> for ParkClusterError {
    fn from(e: uuid::Error) -> Self {
        ParkClusterError::Protocol(e.to_string())
    }
}

impl From<lapin::Error> for ParkClusterError {
    fn from(e: lapin::Error) -> Self {
        ParkClusterError::Transport(e.to_string())
    }
}

impl From<toml::de::Error> for ParkClusterError {
    fn from(e: toml::de::Error) -> Self {
        ParkClusterError::Internal(format!("config parse error: {}", e))
    }
}

/// Logs an error-level message and builds the matching [`ParkClusterError`]
/// variant in one step. First argument selects the variant constructor
/// (`transport`, `timeout`, `protocol`, `data`, `quorum`, or bare for
/// `Internal`); remaining arguments are a `format!`-style message.
#[macro_export]
macro_rules! logged_err {
    ($constructor:ident; $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::error!("{}", msg);
        Err($crate::error::ParkClusterError::$constructor(msg))
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::error!("{}", msg);
        Err($crate::error::ParkClusterError::Internal(msg))
    }};
}
