use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("frame truncated before end of headers")]
    Truncated,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header `{0}`")]
    InvalidEscape(String),
    #[error("invalid content-length `{0}`")]
    InvalidContentLength(String),
    #[error("frame body is not terminated by NUL")]
    MissingNull,
    #[error("unexpected data after frame terminator")]
    TrailingData,
    #[error("frame contains invalid UTF-8")]
    InvalidUtf8,
    #[error("invalid heart-beat header `{0}`")]
    InvalidHeartBeat(String),
}
