use thiserror::Error;

/// Error taxonomy for the consensus/state core. Each variant corresponds
/// to one of the kinds the validation, digest and task-queue layers must
/// distinguish between.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContrastError {
    #[error("malformed: {0}")]
    Malformed(String),

    #[error("conflicting UTXOs: {0}")]
    Conflicting(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("UTXOs(one at least) are spent: {0}")]
    UnresolvedInput(String),

    #[error("Invalid block index: {0}")]
    InvalidBlockIndex(String),

    #[error("hash does not conform to difficulty: {0}")]
    HashNonConform(String),

    #[error("invalid coinbase: {0}")]
    InvalidCoinbase(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("snapshot missing for height {0}")]
    SnapshotMissing(u64),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl ContrastError {
    /// Task queue (C11) skip-log policy: errors representing expected
    /// race conditions are swallowed rather than logged as failures.
    #[must_use]
    pub fn skip_log_matches(&self) -> bool {
        matches!(
            self,
            ContrastError::Conflicting(_)
                | ContrastError::UnresolvedInput(_)
                | ContrastError::InvalidBlockIndex(_)
        )
    }

    /// Fatal errors halt the node's state progress rather than simply
    /// being logged and skipped.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ContrastError::InvariantViolation(_) | ContrastError::SnapshotMissing(_))
    }
}

pub type Result<T> = std::result::Result<T, ContrastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_log_policy_matches_expected_race_errors() {
        assert!(ContrastError::Conflicting("x".into()).skip_log_matches());
        assert!(ContrastError::UnresolvedInput("x".into()).skip_log_matches());
        assert!(ContrastError::InvalidBlockIndex("x".into()).skip_log_matches());
        assert!(!ContrastError::Malformed("x".into()).skip_log_matches());
    }

    #[test]
    fn fatal_errors_are_invariant_and_snapshot() {
        assert!(ContrastError::InvariantViolation("x".into()).is_fatal());
        assert!(ContrastError::SnapshotMissing(5).is_fatal());
        assert!(!ContrastError::Unavailable("x".into()).is_fatal());
    }
}
