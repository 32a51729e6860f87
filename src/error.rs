use thiserror::Error;

/// Error returned by an [`OutputSink`](crate::audio_io::OutputSink).
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Longest diagnostic kept by [`Session::last_error`](crate::Session::last_error).
pub const MAX_MESSAGE_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Resource,
    Sink,
    Config,
    State,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}, line {line}:\n  {text}")]
    Syntax {
        line: usize,
        text: String,
        message: String,
    },
    #[error("Total time is greater than 24 hours")]
    TotalTime,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Output error: {0}")]
    Sink(#[source] SinkError),
    #[error("{0}")]
    Config(String),
    #[error("Engine not initialised")]
    NotInitialized,
    #[error("No sequence loaded")]
    NoSequence,
}

impl Error {
    pub fn syntax(line: usize, text: &str, message: impl Into<String>) -> Self {
        Error::Syntax {
            line,
            text: text.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } | Error::TotalTime => ErrorKind::Syntax,
            Error::OutOfMemory => ErrorKind::Resource,
            Error::Sink(_) => ErrorKind::Sink,
            Error::Config(_) => ErrorKind::Config,
            Error::NotInitialized | Error::NoSequence => ErrorKind::State,
        }
    }

    /// Source line of a syntax error, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Syntax { line, .. } => Some(*line),
            _ => None,
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

/// Truncate `msg` to at most [`MAX_MESSAGE_LEN`] bytes on a char boundary.
pub(crate) fn bounded(msg: &str) -> String {
    if msg.len() <= MAX_MESSAGE_LEN {
        return msg.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_carry_line_and_text() {
        let err = Error::syntax(3, "10:00 nope", "Name \"nope\" not defined");
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.line(), Some(3));
        assert_eq!(
            err.to_string(),
            "Name \"nope\" not defined, line 3:\n  10:00 nope"
        );
    }

    #[test]
    fn messages_are_bounded() {
        let long = "é".repeat(400);
        let cut = bounded(&long);
        assert!(cut.len() <= MAX_MESSAGE_LEN);
        assert!(long.starts_with(&cut));
    }
}
