use types_rs::univote::ErrorCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// The server understood the request and refused it.
    #[error("{message} (code={code:?} status_code={status_code:?})")]
    Rejected {
        status_code: reqwest::StatusCode,
        code: ErrorCode,
        message: String,
    },

    /// The server failed without a structured error body.
    #[error("HTTP error: status_code={status_code:?} {text}")]
    Http {
        status_code: reqwest::StatusCode,
        text: String,
    },

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not logged in")]
    NotLoggedIn,
}

impl Error {
    /// The server's rejection category, if the server rejected the request.
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether sending the same request again may succeed. A duplicate vote
    /// is never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { code, .. } => code.is_retryable(),
            Self::Http { status_code, .. } => status_code.is_server_error(),
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Self::Url(_) | Self::Json(_) | Self::NotLoggedIn => false,
        }
    }
}
