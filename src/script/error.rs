use std::fmt;

/// Location-tagged failure inside the script front end or interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptError {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

impl ScriptError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Which stage rejected the step code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// Lexing or parsing.
    Syntax,
    /// Evaluation against the sketch builder.
    Runtime,
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => f.write_str("syntax"),
            Self::Runtime => f.write_str("runtime"),
        }
    }
}

/// Step code could not be turned into a command list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{phase} error at line {line} (byte {offset}): {message}")]
pub struct CaptureError {
    /// Byte offset into the step code.
    pub offset: usize,
    /// 1-based line of `offset`.
    pub line: usize,
    /// Human-readable reason.
    pub message: String,
    /// Stage that failed.
    pub phase: CapturePhase,
}

impl CaptureError {
    /// Build a lexer/parser failure.
    pub fn syntax(offset: usize, line: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            line,
            message: message.into(),
            phase: CapturePhase::Syntax,
        }
    }

    /// Build an evaluation failure.
    pub fn runtime(offset: usize, line: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            line,
            message: message.into(),
            phase: CapturePhase::Runtime,
        }
    }

    pub(crate) fn locate(src: &str, err: ScriptError, phase: CapturePhase) -> Self {
        let offset = err.offset.min(src.len());
        let line = 1 + src.as_bytes()[..offset]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        match phase {
            CapturePhase::Syntax => Self::syntax(offset, line, err.message),
            CapturePhase::Runtime => Self::runtime(offset, line, err.message),
        }
    }
}
