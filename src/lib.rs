//! Sequence-to-sequence inference with lexical features.
//!
//! Fields prepare text for the model, the lexicon adds per-token age and
//! polarity features, and the predictor decodes source sentences with a
//! trained [`model::Seq2Seq`].

pub mod error;
pub mod fields;
pub mod lexicon;
pub mod model;
pub mod predictor;
pub mod vocab;

pub use error::{Error, Result};
pub use fields::{AuxSourceField, Batch, Field, FieldConfig, FieldOptions, SourceField, TargetField};
pub use lexicon::{lex_features, LexEntry, Lexicon, Polarity, LEX_DIM};
pub use model::{DecodeTrace, Device, Mode, ModelArgs, RefSeq2Seq, Seq2Seq};
pub use predictor::{Predictor, PredictorConfig};
pub use vocab::{Vocab, VocabOptions};
