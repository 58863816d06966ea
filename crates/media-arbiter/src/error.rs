use thiserror::Error;

/// Errors raised while turning names into arbiter vocabulary.
///
/// Arbitration itself never fails: denial is a `false`, everything else a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbiterError {
    #[error("unknown media type: {0}")]
    UnknownMediaType(String),

    #[error("unknown restriction: {0}")]
    UnknownRestriction(String),
}
