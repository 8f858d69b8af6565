use thiserror::Error;

/// Failure of a single upstream API operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("exhausted {attempts} attempts, last error: {source}")]
    Exhausted {
        attempts: u32,
        source: Box<ApiError>,
    },
}

impl ApiError {
    /// True for upstream 5xx, the only failures retried by default.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if (500..=599).contains(status))
    }

    /// True when the request never reached the server.
    pub fn is_connect(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_connect())
    }

    /// True when the request hit the client-side timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_timeout())
    }

    /// Upstream HTTP status, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Exhausted { source, .. } => source.status(),
            ApiError::Malformed(_) => None,
        }
    }

    /// Upstream response body, if the failure carried one.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Status { body, .. } => Some(body.as_str()),
            ApiError::Exhausted { source, .. } => source.body(),
            _ => None,
        }
    }
}

/// Errors surfaced by the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("lookup of component {component_id} failed: {source}")]
    Lookup {
        component_id: String,
        source: ApiError,
    },

    #[error("feature creation for component {component_id} failed: {source}")]
    Creation {
        component_id: String,
        source: ApiError,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl RelayError {
    /// Name of the pipeline step that failed, for log fields.
    pub fn step(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "normalize",
            RelayError::Lookup { .. } => "lookup",
            RelayError::Creation { .. } => "create",
            RelayError::Config(_) => "config",
        }
    }

    /// The upstream error behind a lookup or creation failure.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            RelayError::Lookup { source, .. } | RelayError::Creation { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
