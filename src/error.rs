use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("degenerate input: {message}")]
    DegenerateInput { message: String },
    #[error(
        "chunk indices must be strictly increasing: position {position} has index {current} after {previous}"
    )]
    MalformedChunkOrder {
        position: usize,
        previous: u64,
        current: u64,
    },
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl AlignmentError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateInput {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// True for errors raised while validating inputs, before any chunk was processed.
    pub fn is_ingestion_error(&self) -> bool {
        matches!(
            self,
            Self::DegenerateInput { .. } | Self::MalformedChunkOrder { .. }
        )
    }
}
