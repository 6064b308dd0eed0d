//! Text fields: tokenization, preprocessing, vocabulary building and padding.
//!
//! Every field runs batch-first and reports lengths. [`FieldConfig::validate`]
//! turns caller options into a config with both flags on, warning when the
//! caller asked for something else.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView2};
use tracing::warn;

use crate::error::{Error, Result};
use crate::lexicon::{lex_features, Lexicon};
use crate::vocab::{Vocab, VocabOptions, PAD, UNK};

pub type Tokenize = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;
pub type Preprocess = Arc<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;

/// Options as supplied by the caller.
#[derive(Clone)]
pub struct FieldOptions {
    pub batch_first: Option<bool>,
    pub include_lengths: Option<bool>,
    pub lower: bool,
    /// Defaults to whitespace splitting.
    pub tokenize: Option<Tokenize>,
    pub preprocessing: Option<Preprocess>,
    pub fix_length: Option<usize>,
    pub pad_token: String,
    pub unk_token: String,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            batch_first: None,
            include_lengths: None,
            lower: false,
            tokenize: None,
            preprocessing: None,
            fix_length: None,
            pad_token: PAD.to_string(),
            unk_token: UNK.to_string(),
        }
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("batch_first", &self.batch_first)
            .field("include_lengths", &self.include_lengths)
            .field("lower", &self.lower)
            .field("tokenize", &self.tokenize.is_some())
            .field("preprocessing", &self.preprocessing.is_some())
            .field("fix_length", &self.fix_length)
            .finish()
    }
}

/// Validated field configuration.
#[derive(Clone)]
pub struct FieldConfig {
    batch_first: bool,
    include_lengths: bool,
    pub lower: bool,
    pub tokenize: Tokenize,
    pub preprocessing: Option<Preprocess>,
    pub fix_length: Option<usize>,
    pub pad_token: String,
    pub unk_token: String,
}

impl FieldConfig {
    pub fn validate(options: FieldOptions) -> Self {
        if options.batch_first == Some(false) {
            warn!("option batch_first has to be set for seq2seq fields, changed to true");
        }
        if options.include_lengths == Some(false) {
            warn!("option include_lengths has to be set for seq2seq fields, changed to true");
        }
        let tokenize: Tokenize = match options.tokenize {
            Some(t) => t,
            None => Arc::new(whitespace),
        };
        Self {
            batch_first: true,
            include_lengths: true,
            lower: options.lower,
            tokenize,
            preprocessing: options.preprocessing,
            fix_length: options.fix_length,
            pad_token: options.pad_token,
            unk_token: options.unk_token,
        }
    }

    pub fn batch_first(&self) -> bool {
        self.batch_first
    }

    pub fn include_lengths(&self) -> bool {
        self.include_lengths
    }
}

fn whitespace(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// A padded, numericalized batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// `(batch, seq_len)` token indices.
    pub ids: Array2<usize>,
    pub lengths: Vec<usize>,
}

/// Shared behavior of every field kind.
#[derive(Clone)]
pub struct Field {
    config: FieldConfig,
    vocab: Option<Vocab>,
}

impl Field {
    pub fn new(options: FieldOptions) -> Self {
        Self { config: FieldConfig::validate(options), vocab: None }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn vocab(&self) -> Result<&Vocab> {
        self.vocab.as_ref().ok_or(Error::VocabNotBuilt)
    }

    /// Tokenize, lowercase if configured, then run the preprocessing pipeline.
    pub fn preprocess(&self, text: &str) -> Vec<String> {
        let mut tokens = (self.config.tokenize)(text);
        if self.config.lower {
            tokens = tokens.into_iter().map(|t| t.to_lowercase()).collect();
        }
        match &self.config.preprocessing {
            Some(f) => f(tokens),
            None => tokens,
        }
    }

    /// Build the vocabulary from already preprocessed examples. The field's
    /// unk and pad tokens lead the specials.
    pub fn build_vocab(&mut self, examples: &[Vec<String>], options: &VocabOptions) -> &Vocab {
        let vocab = self.make_vocab(examples, options);
        self.vocab.insert(vocab)
    }

    fn make_vocab(&self, examples: &[Vec<String>], options: &VocabOptions) -> Vocab {
        let mut specials = vec![self.config.unk_token.clone(), self.config.pad_token.clone()];
        for s in &options.specials {
            if !specials.contains(s) {
                specials.push(s.clone());
            }
        }
        let options = VocabOptions { specials, ..options.clone() };
        Vocab::build(examples, &options)
    }

    pub fn set_vocab(&mut self, vocab: Vocab) {
        self.vocab = Some(vocab);
    }

    /// Pad every example to the longest one, or truncate/pad to `fix_length`.
    pub fn pad(&self, examples: &[Vec<String>]) -> (Vec<Vec<String>>, Vec<usize>) {
        let max_len = match self.config.fix_length {
            Some(n) => n,
            None => examples.iter().map(Vec::len).max().unwrap_or(0),
        };
        let mut padded = Vec::with_capacity(examples.len());
        let mut lengths = Vec::with_capacity(examples.len());
        for ex in examples {
            let kept = ex.len().min(max_len);
            let mut row: Vec<String> = ex[..kept].to_vec();
            row.resize(max_len, self.config.pad_token.clone());
            padded.push(row);
            lengths.push(kept);
        }
        (padded, lengths)
    }

    /// Map padded rows to indices. Every row must have the same length.
    pub fn numericalize(&self, padded: &[Vec<String>], lengths: Vec<usize>) -> Result<Batch> {
        let vocab = self.vocab()?;
        let cols = padded.first().map(Vec::len).unwrap_or(0);
        let mut ids = Array2::<usize>::zeros((padded.len(), cols));
        for (i, row) in padded.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::ShapeMismatch { expected: vec![cols], actual: vec![row.len()] });
            }
            for (j, tok) in row.iter().enumerate() {
                ids[[i, j]] = vocab.stoi(tok)?;
            }
        }
        Ok(Batch { ids, lengths })
    }

    pub fn process(&self, examples: &[Vec<String>]) -> Result<Batch> {
        let (padded, lengths) = self.pad(examples);
        self.numericalize(&padded, lengths)
    }
}

/// Source-side field.
#[derive(Clone)]
pub struct SourceField {
    field: Field,
}

impl SourceField {
    pub fn new(options: FieldOptions) -> Self {
        Self { field: Field::new(options) }
    }
}

impl std::ops::Deref for SourceField {
    type Target = Field;
    fn deref(&self) -> &Field {
        &self.field
    }
}

impl std::ops::DerefMut for SourceField {
    fn deref_mut(&mut self) -> &mut Field {
        &mut self.field
    }
}

/// Source-side field that also produces lexical features for its batches.
#[derive(Clone)]
pub struct AuxSourceField {
    field: Field,
    lexicon: Arc<Lexicon>,
}

impl AuxSourceField {
    pub fn new(lexicon: Arc<Lexicon>, options: FieldOptions) -> Self {
        Self { field: Field::new(options), lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// `(batch, seq_len, 4)` lexical features for indices produced by this field.
    pub fn lex_features(&self, batch: ArrayView2<usize>) -> Result<Array3<f32>> {
        lex_features(batch, self.field.vocab()?, &self.lexicon)
    }
}

impl std::ops::Deref for AuxSourceField {
    type Target = Field;
    fn deref(&self) -> &Field {
        &self.field
    }
}

impl std::ops::DerefMut for AuxSourceField {
    fn deref_mut(&mut self) -> &mut Field {
        &mut self.field
    }
}

/// Target-side field. Preprocessed sequences are wrapped in `<sos>`/`<eos>`.
#[derive(Clone)]
pub struct TargetField {
    field: Field,
    sos_id: Option<usize>,
    eos_id: Option<usize>,
}

impl TargetField {
    pub const SYM_SOS: &'static str = "<sos>";
    pub const SYM_EOS: &'static str = "<eos>";

    pub fn new(mut options: FieldOptions) -> Self {
        let inner = options.preprocessing.take();
        let wrapped: Preprocess = Arc::new(move |seq: Vec<String>| {
            let seq = match &inner {
                Some(f) => f(seq),
                None => seq,
            };
            let mut out = Vec::with_capacity(seq.len() + 2);
            out.push(Self::SYM_SOS.to_string());
            out.extend(seq);
            out.push(Self::SYM_EOS.to_string());
            out
        });
        options.preprocessing = Some(wrapped);
        Self { field: Field::new(options), sos_id: None, eos_id: None }
    }

    /// Build the vocabulary and cache the marker indices.
    pub fn build_vocab(&mut self, examples: &[Vec<String>], options: &VocabOptions) -> &Vocab {
        let mut options = options.clone();
        for sym in [Self::SYM_SOS, Self::SYM_EOS] {
            if !options.specials.iter().any(|s| s == sym) {
                options.specials.push(sym.to_string());
            }
        }
        let vocab = self.field.make_vocab(examples, &options);
        self.set_vocab_inner(vocab)
    }

    /// Install a prebuilt vocabulary and cache the marker indices.
    pub fn set_vocab(&mut self, vocab: Vocab) {
        self.set_vocab_inner(vocab);
    }

    fn set_vocab_inner(&mut self, vocab: Vocab) -> &Vocab {
        self.sos_id = vocab.get(Self::SYM_SOS);
        self.eos_id = vocab.get(Self::SYM_EOS);
        self.field.vocab.insert(vocab)
    }

    pub fn sos_id(&self) -> Option<usize> {
        self.sos_id
    }

    pub fn eos_id(&self) -> Option<usize> {
        self.eos_id
    }
}

impl std::ops::Deref for TargetField {
    type Target = Field;
    fn deref(&self) -> &Field {
        &self.field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::{LexEntry, Polarity};

    #[test]
    fn flags_are_forced_on() {
        let options = FieldOptions {
            batch_first: Some(false),
            include_lengths: Some(false),
            ..Default::default()
        };
        for config in [
            SourceField::new(options.clone()).config().clone(),
            AuxSourceField::new(Arc::new(Lexicon::new()), options.clone()).config().clone(),
            TargetField::new(options).config().clone(),
        ] {
            assert!(config.batch_first());
            assert!(config.include_lengths());
        }
    }

    #[test]
    fn target_wraps_markers_around_custom_preprocessing() {
        let options = FieldOptions {
            preprocessing: Some(Arc::new(|seq: Vec<String>| seq.into_iter().rev().collect())),
            ..Default::default()
        };
        let field = TargetField::new(options);
        assert_eq!(field.preprocess("a b c"), vec!["<sos>", "c", "b", "a", "<eos>"]);
    }

    #[test]
    fn target_markers_on_empty_input() {
        let field = TargetField::new(FieldOptions::default());
        assert_eq!(field.preprocess(""), vec!["<sos>", "<eos>"]);
    }

    #[test]
    fn marker_ids_resolve_after_build_vocab() {
        let mut field = TargetField::new(FieldOptions::default());
        assert_eq!(field.sos_id(), None);
        let examples = vec![field.preprocess("hi there")];
        let vocab = field.build_vocab(&examples, &VocabOptions::default()).clone();
        assert_eq!(field.sos_id(), vocab.get("<sos>"));
        assert_eq!(field.eos_id(), vocab.get("<eos>"));
        assert!(field.sos_id().is_some());
    }

    #[test]
    fn process_pads_and_reports_lengths() {
        let mut field = SourceField::new(FieldOptions { lower: true, ..Default::default() });
        let examples = vec![field.preprocess("Hello World"), field.preprocess("hello")];
        field.build_vocab(&examples, &VocabOptions::default());
        let batch = field.process(&examples).unwrap();
        assert_eq!(batch.lengths, vec![2, 1]);
        assert_eq!(batch.ids.dim(), (2, 2));
        let pad = field.vocab().unwrap().get("<pad>").unwrap();
        assert_eq!(batch.ids[[1, 1]], pad);
    }

    #[test]
    fn fix_length_truncates() {
        let field = SourceField::new(FieldOptions { fix_length: Some(2), ..Default::default() });
        let (padded, lengths) = field.pad(&[field.preprocess("a b c")]);
        assert_eq!(padded[0], vec!["a", "b"]);
        assert_eq!(lengths, vec![2]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut field = SourceField::new(FieldOptions::default());
        let examples = vec![field.preprocess("a b"), field.preprocess("c")];
        field.build_vocab(&examples, &VocabOptions::default());
        assert!(matches!(
            field.numericalize(&examples, vec![2, 1]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn aux_field_needs_vocab() {
        let field = AuxSourceField::new(Arc::new(Lexicon::new()), FieldOptions::default());
        let ids = Array2::<usize>::zeros((1, 1));
        assert!(matches!(field.lex_features(ids.view()), Err(Error::VocabNotBuilt)));
    }

    #[test]
    fn aux_field_features_use_own_vocab() {
        let mut lexicon = Lexicon::new();
        lexicon.insert("grim", LexEntry { age: Some(70.0), polarity: Some(Polarity::Negative) });
        let mut field = AuxSourceField::new(Arc::new(lexicon), FieldOptions::default());
        let examples = vec![field.preprocess("grim day")];
        field.build_vocab(&examples, &VocabOptions::default());
        let batch = field.process(&examples).unwrap();
        let feats = field.lex_features(batch.ids.view()).unwrap();
        assert_eq!(feats.shape(), &[1, 2, 4]);
        assert_eq!(feats.slice(ndarray::s![0, 0, ..]).to_vec(), vec![70.0, 1.0, 0.0, 0.0]);
        assert_eq!(feats.slice(ndarray::s![0, 1, ..]).to_vec(), vec![0.0; 4]);
    }
}
