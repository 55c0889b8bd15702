//! Interpreter error type
//!
//! Errors that stop the interpreter itself. Failures inside user programs
//! (a builtin handed the wrong type, say) are ordinary Error *values* and
//! travel through frames as data; only the cases below become a `LispError`.

use crate::value::Elem;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LispError {
    /// Checked allocation found neither a free cell nor an unused slot
    ArenaExhausted { capacity: usize },
    /// A frame's `alloc` handle belongs to a different arena
    ForeignFrame,
    /// The reader could not produce a term
    Parse {
        message: String,
        pos: usize,
        /// Error value stored under the reader frame's `error` key
        error: Elem,
    },
    /// The evaluator was asked to apply something that is not a function
    Eval {
        message: String,
        /// Error value carrying `msg` and the failing `frame`
        error: Elem,
    },
    /// Evaluation ran past the configured step budget
    StepLimit { steps: u64 },
}

impl LispError {
    /// The Error value attached to this failure, if any
    pub fn error_value(&self) -> Option<Elem> {
        match self {
            LispError::Parse { error, .. } | LispError::Eval { error, .. } => Some(*error),
            _ => None,
        }
    }
}

impl fmt::Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LispError::ArenaExhausted { capacity } => {
                write!(f, "Arena exhausted: all {capacity} cells in use")
            }
            LispError::ForeignFrame => write!(f, "Frame belongs to a different arena"),
            LispError::Parse { message, pos, .. } => {
                write!(f, "ParseError at byte {pos}: {message}")
            }
            LispError::Eval { message, .. } => write!(f, "EvalError: {message}"),
            LispError::StepLimit { steps } => {
                write!(f, "Evaluation stopped after {steps} steps")
            }
        }
    }
}

impl std::error::Error for LispError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LispError::ArenaExhausted { capacity: 1000 };
        assert_eq!(err.to_string(), "Arena exhausted: all 1000 cells in use");

        let err = LispError::Parse {
            message: "Symbol not recognised.".to_string(),
            pos: 4,
            error: Elem::Nil,
        };
        assert_eq!(
            err.to_string(),
            "ParseError at byte 4: Symbol not recognised."
        );
    }

    #[test]
    fn test_error_value() {
        let err = LispError::Eval {
            message: "Expected function".to_string(),
            error: Elem::True,
        };
        assert_eq!(err.error_value(), Some(Elem::True));
        assert_eq!(LispError::ForeignFrame.error_value(), None);
    }
}
