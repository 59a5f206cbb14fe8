//! Runtime pattern errors.
//!
//! Only recoverable conditions surface here: a pattern the engine
//! rejects, or a managed allocation that fails mid-protocol. Breaches
//! of the ownership protocol itself (adopting a chained program,
//! releasing a block twice) are internal-consistency violations and
//! panic at the point of detection instead.

use beryl_engine::CompileError;
use std::fmt;

/// Error from compiling or searching a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The engine rejected the pattern text.
    Syntax {
        /// The engine's explanation.
        message: String,
        /// The offending pattern.
        pattern: String,
    },
    /// A managed allocation failed. The operation was rolled back;
    /// nothing was adopted, absorbed or leaked.
    OutOfMemory {
        /// Bytes the failed allocation asked for.
        requested: usize,
    },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { message, pattern } => write!(f, "{}: {}", message, pattern),
            Self::OutOfMemory { requested } => {
                write!(f, "managed allocation of {} bytes failed", requested)
            }
        }
    }
}

impl std::error::Error for PatternError {}

impl From<CompileError> for PatternError {
    fn from(e: CompileError) -> Self {
        Self::Syntax {
            message: e.message,
            pattern: e.pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let syntax = PatternError::Syntax {
            message: "unclosed group".into(),
            pattern: "(".into(),
        };
        assert_eq!(syntax.to_string(), "unclosed group: (");

        let oom = PatternError::OutOfMemory { requested: 256 };
        assert_eq!(oom.to_string(), "managed allocation of 256 bytes failed");
    }

    #[test]
    fn test_from_compile_error() {
        let e = CompileError {
            message: "bad repeat".into(),
            pattern: "a{".into(),
        };
        match PatternError::from(e) {
            PatternError::Syntax { message, pattern } => {
                assert_eq!(message, "bad repeat");
                assert_eq!(pattern, "a{");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
