use crate::day::DayStartError;

/// Failure talking to the remote settings store or identity endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("remote returned an invalid value: {0}")]
    InvalidValue(#[from] DayStartError),

    #[error("malformed response: {0}")]
    Decode(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RemoteError::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}
