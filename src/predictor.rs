//! Inference wrapper around a trained [`Seq2Seq`] model.

use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lexicon::{lex_features, Lexicon};
use crate::model::{DecodeTrace, Device, Mode, Seq2Seq};
use crate::vocab::Vocab;

/// Construction-time settings for a [`Predictor`].
#[derive(Clone, Debug, Default)]
pub struct PredictorConfig {
    pub device: Device,
}

/// Turns source token sequences into predicted target token sequences.
///
/// The model is moved to the configured device and put in evaluation mode
/// once, in [`Predictor::new`]; both stay fixed afterwards.
pub struct Predictor<M> {
    model: M,
    src_vocab: Vocab,
    tgt_vocab: Vocab,
    device: Device,
}

impl<M: Seq2Seq> Predictor<M> {
    pub fn new(mut model: M, src_vocab: Vocab, tgt_vocab: Vocab, config: PredictorConfig) -> Result<Self> {
        model.to_device(config.device)?;
        model.set_mode(Mode::Eval);
        debug!(device = ?config.device, src_vocab = src_vocab.len(), tgt_vocab = tgt_vocab.len(), "predictor ready");
        Ok(Self { model, src_vocab, tgt_vocab, device: config.device })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn src_vocab(&self) -> &Vocab {
        &self.src_vocab
    }

    pub fn tgt_vocab(&self) -> &Vocab {
        &self.tgt_vocab
    }

    /// Run the model on a single source sequence.
    pub fn decode<S: AsRef<str>>(&self, src_seq: &[S], lexicon: &Lexicon) -> Result<DecodeTrace> {
        let ids = self.src_vocab.encode(src_seq)?;
        let len = ids.len();
        let src = Array2::from_shape_vec((1, len), ids).map_err(|_| Error::ShapeMismatch {
            expected: vec![1, len],
            actual: vec![len],
        })?;
        let lex = lex_features(src.view(), &self.src_vocab, lexicon)?;
        self.model.forward(src.view(), lex.view(), &[len])
    }

    /// Most likely target sequence for `src_seq`.
    pub fn predict<S: AsRef<str>>(&self, src_seq: &[S], lexicon: &Lexicon) -> Result<Vec<String>> {
        let trace = self.decode(src_seq, lexicon)?;
        let length = trace
            .length
            .first()
            .copied()
            .ok_or_else(|| Error::ShapeMismatch { expected: vec![1], actual: vec![0] })?;
        if length > trace.sequence.len() {
            return Err(Error::TraceTooShort { length, steps: trace.sequence.len() });
        }
        let ids = trace.sequence[..length]
            .iter()
            .map(|step| {
                step.get(0).copied().ok_or_else(|| Error::ShapeMismatch { expected: vec![1], actual: vec![0] })
            })
            .collect::<Result<Vec<usize>>>()?;
        debug!(src_len = src_seq.len(), tgt_len = ids.len(), "predicted");
        self.tgt_vocab.decode(&ids)
    }

    /// The `n` best target sequences for `src_seq`, each cut to its own
    /// reported length.
    pub fn predict_n<S: AsRef<str>>(&self, src_seq: &[S], lexicon: &Lexicon, n: usize) -> Result<Vec<Vec<String>>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let trace = self.decode(src_seq, lexicon)?;
        let (lengths, steps) = match (&trace.topk_length, &trace.topk_sequence) {
            (Some(l), Some(s)) => (l.first().map(Vec::as_slice).unwrap_or(&[]), s),
            _ => return Err(Error::MissingTopK),
        };
        if n > lengths.len() {
            return Err(Error::NotEnoughCandidates { requested: n, available: lengths.len() });
        }

        let mut result = Vec::with_capacity(n);
        for (x, &length) in lengths.iter().take(n).enumerate() {
            if length > steps.len() {
                return Err(Error::TraceTooShort { length, steps: steps.len() });
            }
            let ids = steps[..length]
                .iter()
                .map(|step| {
                    step.get([0, x]).copied().ok_or_else(|| Error::NotEnoughCandidates {
                        requested: n,
                        available: step.ncols(),
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            result.push(self.tgt_vocab.decode(&ids)?);
        }
        debug!(src_len = src_seq.len(), n, "predicted candidates");
        Ok(result)
    }
}
