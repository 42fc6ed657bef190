use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Result alias for errors emitted by nowtaint internals.
pub type TaintResult<T> = Result<T, NowTaintError>;

/// Structured error type for nowtaint subsystems.
///
/// The propagation algorithm itself has no recoverable-error paths: every
/// unresolvable case degrades to "do not propagate". These variants cover
/// the surfaces around it: I/O, program loading, and host-contract
/// violations, which are fatal preconditions rather than analysis results.
#[derive(Debug, Error)]
pub enum NowTaintError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed program: {0}")]
    MalformedProgram(String),

    #[error("program dump parse failure: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl NowTaintError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedProgram(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Convert to anyhow::Error for interop with anyhow-based code.
    pub fn into_anyhow(self) -> AnyhowError {
        AnyhowError::new(self)
    }
}

impl From<AnyhowError> for NowTaintError {
    fn from(err: AnyhowError) -> Self {
        NowTaintError::other(err.to_string())
    }
}

/// Convenience macro mirroring `anyhow::bail!` but returning NowTaintError.
#[macro_export]
macro_rules! taint_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::NowTaintError::other(format!($($arg)*)));
    };
}

/// Convenience macro mirroring `anyhow::ensure!`.
#[macro_export]
macro_rules! taint_ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::taint_bail!($($arg)*);
        }
    };
}
