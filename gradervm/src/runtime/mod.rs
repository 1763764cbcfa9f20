pub mod class;
pub mod instance;
pub mod std_lib;
pub mod thread;

use std::fmt::Display;

use thiserror::Error;

/// Maximum number of nested calls before execution fails with
/// [`ErrorKind::StackOverflow`].
pub const MAX_CALL_DEPTH: usize = 1024;

/// Frames shown when an error is displayed, the rest are summarised.
const SHOWN_FRAMES: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("stack overflow, more than {0} nested calls")]
    StackOverflow(usize),
    #[error("for input string {0:?}")]
    NumberFormat(String),
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("reached the end of a method that has to return a value")]
    MissingReturn,
    #[error("invalid operands for `{0}`")]
    InvalidOperands(&'static str),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("malformed code: {0}")]
    MalformedCode(String),
    #[error("class `{0}` was unloaded")]
    Unloaded(String),
}

/// One entry of an execution backtrace, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub class: String,
    pub method: String,
    /// Known only for classes compiled with debug information.
    pub line: Option<u32>,
}

impl Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "at {}.{}(line {line})", self.class, self.method),
            None => write!(f, "at {}.{}(unknown source)", self.class, self.method),
        }
    }
}

/// Failure of compiled code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub backtrace: Vec<StackFrame>,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, backtrace: Vec<StackFrame>) -> Self {
        Self { kind, backtrace }
    }
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for frame in self.backtrace.iter().take(SHOWN_FRAMES) {
            write!(f, "\n    {frame}")?;
        }
        if self.backtrace.len() > SHOWN_FRAMES {
            write!(f, "\n    ... {} more", self.backtrace.len() - SHOWN_FRAMES)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtrace_is_shown_below_the_error() {
        let err = ExecutionError::new(
            ErrorKind::DivisionByZero,
            vec![
                StackFrame {
                    class: "p.Impl".to_owned(),
                    method: "helper".to_owned(),
                    line: Some(7),
                },
                StackFrame {
                    class: "p.Impl".to_owned(),
                    method: "solution".to_owned(),
                    line: None,
                },
            ],
        );
        similar_asserts::assert_eq!(
            expected: "division by zero\n    at p.Impl.helper(line 7)\n    at p.Impl.solution(unknown source)",
            actual: err.to_string().as_str(),
        );
    }

    #[test]
    fn long_backtraces_are_summarised() {
        let frame = StackFrame {
            class: "A".to_owned(),
            method: "f".to_owned(),
            line: None,
        };
        let err = ExecutionError::new(ErrorKind::StackOverflow(3), vec![frame; 20]);
        let shown = err.to_string();
        assert_eq!(shown.lines().count(), 1 + SHOWN_FRAMES + 1);
        assert!(shown.ends_with("... 4 more"));
    }
}
