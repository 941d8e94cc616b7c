use strata_databuf::DatabufError;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("databuf failure in stage {stage}")]
    Databuf {
        stage: String,
        #[source]
        source: DatabufError,
    },

    #[error("stage {stage} failed: {reason}")]
    Fatal { stage: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StageError {
    pub fn fatal(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StageError::Fatal {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }
}
