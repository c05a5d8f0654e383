use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid candidate '{line}': {reason}")]
    InvalidCandidate { line: String, reason: String },

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),
}
