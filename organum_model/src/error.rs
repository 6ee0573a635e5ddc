// Error taxonomy for the analysis core.
//
// Three structural failures plus one query failure. All are fatal to the
// operation that raised them; callers decide whether to skip the offending
// voice pair or piece, or abort the whole run. There is no internal retry.

use thiserror::Error;

/// Everything that can go wrong while classifying, parsing, or aggregating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// An input lacks data required to finish the computation: a pitch name
    /// that cannot be spelled, a half-step count no diatonic quality can
    /// express, an inversion of a quality-less interval.
    #[error("missing information: {0}")]
    MissingInformation(String),

    /// A caller-supplied parameter or token is structurally invalid: wrong
    /// list length, malformed token string, non-positive sample interval.
    #[error("nonsensical input: {0}")]
    NonsensicalInput(String),

    /// A deserialized or merged statistics store failed its structural
    /// invariant (leaf totals, per-piece list lengths, key consistency).
    #[error("inconsistent statistics: {0}")]
    InconsistentStatistics(String),

    /// A query asked for a cardinality the store has no entries for.
    #[error("no data for requested n = {0}")]
    NoDataForRequestedN(usize),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
