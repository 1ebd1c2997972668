use thiserror::Error;

/// Failure kinds a pipeline run can end in. Cache problems never show up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    ContentExtractionFailed(String),
    #[error("{0}")]
    SummarizationFailed(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::ContentExtractionFailed(_) => 400,
            Self::SummarizationFailed(_) | Self::Internal(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "InvalidInput",
            Self::ContentExtractionFailed(_) => "ContentExtractionFailed",
            Self::SummarizationFailed(_) => "SummarizationFailed",
            Self::Internal(_) => "InternalError",
        }
    }
}
