use thiserror::Error;

/// Failures surfaced by index clients and the federator.
///
/// Back-ends classify their own failures into one of these three kinds; the
/// federator never retries and passes them to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self { Self::NotFound(msg.into()) }

    pub fn bad_input(msg: impl Into<String>) -> Self { Self::BadInput(msg.into()) }

    pub fn upstream(msg: impl Into<String>) -> Self { Self::UpstreamUnavailable(msg.into()) }

    /// HTTP-equivalent status for the outer request layer.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::BadInput(_) => 400,
            Self::UpstreamUnavailable(_) => 503,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
