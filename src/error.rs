use std::fmt;

use backtrace::Backtrace;

/// The single error type shared by every component in this crate.
///
/// Invariant breaches are fatal and carry a captured backtrace, interruption
/// during a blocking wait is fatal at the API layer, and I/O failures from
/// the replicator are forwarded unchanged.
#[derive(Debug)]
pub enum EngineError {
    /// A broken invariant: releasing more permits than held, constructing a
    /// dispatcher with zero capacity, a chunk buffer of unexpected length,
    /// and so on. Non-recoverable; the caller should treat this as a bug.
    InvariantBreach {
        message: String,
        backtrace: Backtrace,
    },
    /// A blocking wait was interrupted. The engine does not retry
    /// automatically; this always propagates to the caller.
    Interrupted { message: String },
    /// An I/O failure surfaced by the replicator's file or stream.
    Io(std::io::Error),
}

impl EngineError {
    pub fn invariant(message: impl Into<String>) -> Self {
        EngineError::InvariantBreach {
            message: message.into(),
            backtrace: Backtrace::new(),
        }
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        EngineError::Interrupted {
            message: message.into(),
        }
    }

    /// Renders the captured backtrace to the log, if this variant has one.
    pub fn show_backtrace(&self) {
        if let EngineError::InvariantBreach { backtrace, message } = self {
            log::error!("invariant breach: {}\n{:?}", message, backtrace);
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::InvariantBreach { message, .. } => {
                write!(f, "invariant breach: {}", message)
            }
            EngineError::Interrupted { message } => write!(f, "interrupted: {}", message),
            EngineError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
