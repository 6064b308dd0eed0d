//! Error type shared by the fields, the lexical feature builder and the
//! predictor.

/// Result alias defaulting to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A token has no index and the vocabulary carries no unknown token.
    #[error("token '{0}' is not in the vocabulary")]
    UnknownToken(String),

    /// An index has no token in the vocabulary.
    #[error("index {index} is out of range for a vocabulary of {size} tokens")]
    IndexOutOfRange { index: usize, size: usize },

    /// A field was asked for its vocabulary before `build_vocab` ran.
    #[error("field vocabulary has not been built")]
    VocabNotBuilt,

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The decoding trace reports a length longer than its recorded steps.
    #[error("decoding trace reports length {length} but only has {steps} steps")]
    TraceTooShort { length: usize, steps: usize },

    /// Top-k extraction on a trace produced without top-k decoding.
    #[error("decoding trace carries no top-k candidates")]
    MissingTopK,

    #[error("requested {requested} candidates but the trace has {available}")]
    NotEnoughCandidates { requested: usize, available: usize },

    #[error("device {0:?} is not available for this model")]
    DeviceUnavailable(crate::model::Device),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
