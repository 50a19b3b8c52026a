use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Model artifact not found at {path}")]
    ArtifactNotFound { path: String },

    #[error("Model artifact is corrupt: {0}")]
    ArtifactCorrupt(String),

    #[error("Malformed feature '{field}': {reason}")]
    MalformedFeatureVector { field: String, reason: String },

    #[error("Invalid training data: {0}")]
    InvalidTrainingData(String),

    #[error("Model prediction failed: {0}")]
    ModelPrediction(String),

    #[error("Wallet '{wallet_id}' not found")]
    UnknownWallet { wallet_id: String },

    #[error("Loan {loan_id} not found for wallet '{wallet_id}'")]
    LoanNotFound { wallet_id: String, loan_id: i64 },

    #[error("Invalid loan: {0}")]
    InvalidLoan(String),

    #[error("Loan {loan_id} is already settled")]
    LoanAlreadySettled { loan_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScoreError {
    /// Errors the scoring boundary recovers from by switching to the
    /// rule-based fallback. Everything else goes back to the caller.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            Self::ArtifactNotFound { .. }
                | Self::ArtifactCorrupt(_)
                | Self::ModelPrediction(_)
                | Self::Serialization(_)
                | Self::Io(_)
        )
    }

    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFeatureVector {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;
