use std::io;

/// Top-level error returned by the reader's public operations.
///
/// `Io` is taxonomy 1 from the error-handling design: surfaced verbatim,
/// never counted against the reject counter. `Parse` is taxonomy 2:
/// a malformed record, tagged with the line the record started on.
#[derive(Debug, thiserror::Error)]
pub enum LdifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse {
        line: u64,
        message: String,
        can_continue: bool,
    },
}

pub type Result<T> = std::result::Result<T, LdifError>;

impl LdifError {
    /// A malformed record. The record itself is unrecoverable, but the
    /// reader's internal state stays consistent and the stream can be
    /// resumed from the next record, so `can_continue` is always true
    /// here; only `Io` reports false.
    pub fn parse(line: u64, message: impl Into<String>) -> Self {
        LdifError::Parse {
            line,
            message: message.into(),
            can_continue: true,
        }
    }

    /// Line number this error is tagged with, if it has one.
    pub fn line(&self) -> Option<u64> {
        match self {
            LdifError::Parse { line, .. } => Some(*line),
            LdifError::Io(_) => None,
        }
    }

    pub fn can_continue(&self) -> bool {
        match self {
            LdifError::Parse { can_continue, .. } => *can_continue,
            LdifError::Io(_) => false,
        }
    }
}

/// Outcome of parsing one record: an emitted value, a policy-filtered
/// record (not an error — see spec §7 taxonomy 3), or a parse error.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Filtered(String),
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_can_continue() {
        let err = LdifError::parse(3, "bad record");
        assert!(err.can_continue());
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn io_error_cannot_continue() {
        let err = LdifError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(!err.can_continue());
        assert_eq!(err.line(), None);
    }
}
