use ndarray::{concatenate, s, Array1, Array2, ArrayView2, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::lexicon::LEX_DIM;

/// Where a model runs. Chosen once when a predictor is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Accelerated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Output of one decoding run.
///
/// `sequence[step][b]` is the index chosen at `step` for batch item `b`.
/// The top-k fields, when present, hold `k` ranked candidates per batch
/// item: `topk_sequence[step][[b, x]]` and `topk_length[b][x]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeTrace {
    pub length: Vec<usize>,
    pub sequence: Vec<Array1<usize>>,
    pub topk_length: Option<Vec<Vec<usize>>>,
    pub topk_sequence: Option<Vec<Array2<usize>>>,
}

/// A trained sequence-to-sequence model with lexical feature input.
pub trait Seq2Seq {
    fn to_device(&mut self, device: Device) -> Result<()>;

    fn set_mode(&mut self, mode: Mode);

    /// Decode a `(batch, seq_len)` index batch with its `(batch, seq_len, 4)`
    /// lexical features and per-item source lengths.
    fn forward(&self, src: ArrayView2<usize>, lex: ArrayView3<f32>, lengths: &[usize]) -> Result<DecodeTrace>;
}

/// Configuration for the reference model.
#[derive(Clone, Debug)]
pub struct ModelArgs {
    pub src_vocab_size: usize,
    pub tgt_vocab_size: usize,
    /// Embedding/hidden dimension.
    pub dim: usize,
    /// Decoding stops after this many steps if no end marker was produced.
    pub max_decode_len: usize,
    /// Number of ranked candidates in the top-k part of the trace; 0 disables it.
    pub top_k: usize,
    pub sos_id: usize,
    pub eos_id: usize,
    pub seed: u64,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            src_vocab_size: 1024,
            tgt_vocab_size: 1024,
            dim: 64,
            max_decode_len: 32,
            top_k: 0,
            sos_id: 2,
            eos_id: 3,
            seed: 0,
        }
    }
}

impl ModelArgs {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Embedding layer mapping token ids to vectors.
pub struct Embedding {
    weight: Array2<f32>, // vocab_size x dim
}

impl Embedding {
    pub fn new(vocab_size: usize, dim: usize, rng: &mut impl Rng) -> Self {
        let weight = Array2::from_shape_fn((vocab_size, dim), |_| rng.gen_range(-0.1..0.1));
        Self { weight }
    }

    pub fn forward(&self, tokens: &[usize]) -> Result<Array2<f32>> {
        let vocab = self.weight.nrows();
        let mut out = Array2::<f32>::zeros((tokens.len(), self.weight.ncols()));
        for (i, &tok) in tokens.iter().enumerate() {
            if tok >= vocab {
                return Err(Error::IndexOutOfRange { index: tok, size: vocab });
            }
            out.row_mut(i).assign(&self.weight.row(tok));
        }
        Ok(out)
    }
}

/// Fully connected layer.
pub struct Linear {
    weight: Array2<f32>, // out x in
    bias: Option<Array1<f32>>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool, rng: &mut impl Rng) -> Self {
        let weight = Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-0.1..0.1));
        let bias = if bias {
            Some(Array1::from_shape_fn(out_features, |_| rng.gen_range(-0.1..0.1)))
        } else {
            None
        };
        Self { weight, bias }
    }

    pub fn forward(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        if let Some(b) = &self.bias {
            y += &b.view().insert_axis(Axis(0));
        }
        y
    }
}

/// Small ndarray encoder/decoder.
///
/// The encoder sums token embeddings with a projection of the lexical
/// features and mean-pools them. The decoder is greedy; with `top_k > 0`
/// it also branches on the `k` best first tokens and continues each
/// branch greedily.
pub struct RefSeq2Seq {
    pub args: ModelArgs,
    src_embed: Embedding,
    lex_proj: Linear,
    tgt_embed: Embedding,
    mix: Linear,
    head: Linear,
    device: Device,
    mode: Mode,
}

impl RefSeq2Seq {
    pub fn new(args: ModelArgs) -> Self {
        let mut rng = StdRng::seed_from_u64(args.seed);
        let src_embed = Embedding::new(args.src_vocab_size, args.dim, &mut rng);
        let lex_proj = Linear::new(LEX_DIM, args.dim, true, &mut rng);
        let tgt_embed = Embedding::new(args.tgt_vocab_size, args.dim, &mut rng);
        let mix = Linear::new(2 * args.dim, args.dim, true, &mut rng);
        let head = Linear::new(args.dim, args.tgt_vocab_size, true, &mut rng);
        Self {
            args,
            src_embed,
            lex_proj,
            tgt_embed,
            mix,
            head,
            device: Device::Cpu,
            mode: Mode::Train,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Mean-pooled `(1, dim)` context of one source sequence.
    fn encode(&self, src: &[usize], lex: ArrayView2<f32>) -> Result<Array2<f32>> {
        if src.is_empty() {
            return Ok(Array2::zeros((1, self.args.dim)));
        }
        let h = self.src_embed.forward(src)? + self.lex_proj.forward(&lex);
        let pooled = h.sum_axis(Axis(0)) / src.len() as f32;
        Ok(pooled.insert_axis(Axis(0)))
    }

    /// One decoder step: new state and output logits.
    fn step(&self, state: &Array2<f32>, prev: usize) -> Result<(Array2<f32>, Array1<f32>)> {
        let emb = self.tgt_embed.forward(&[prev])?;
        let joined = concatenate(Axis(1), &[state.view(), emb.view()])
            .map_err(|_| Error::ShapeMismatch { expected: vec![1, self.args.dim], actual: emb.shape().to_vec() })?;
        let next = self.mix.forward(&joined.view()).mapv(f32::tanh);
        let logits = self.head.forward(&rms_scaled(&next).view());
        Ok((next, logits.row(0).to_owned()))
    }

    /// Continue greedily from `state` after `first` was emitted.
    fn greedy_from(&self, mut state: Array2<f32>, first: usize) -> Result<Vec<usize>> {
        let mut out = vec![first];
        let mut prev = first;
        while prev != self.args.eos_id && out.len() < self.args.max_decode_len {
            let (next_state, logits) = self.step(&state, prev)?;
            state = next_state;
            prev = argmax(&logits);
            out.push(prev);
        }
        Ok(out)
    }

    fn check_shapes(&self, src: &ArrayView2<usize>, lex: &ArrayView3<f32>, lengths: &[usize]) -> Result<()> {
        let (batch, seq_len) = src.dim();
        if lex.dim() != (batch, seq_len, LEX_DIM) {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, seq_len, LEX_DIM],
                actual: lex.shape().to_vec(),
            });
        }
        if lengths.len() != batch || lengths.iter().any(|&l| l > seq_len) {
            return Err(Error::ShapeMismatch { expected: vec![batch], actual: lengths.to_vec() });
        }
        Ok(())
    }
}

impl Seq2Seq for RefSeq2Seq {
    fn to_device(&mut self, device: Device) -> Result<()> {
        match device {
            Device::Cpu => {
                self.device = device;
                Ok(())
            }
            Device::Accelerated => Err(Error::DeviceUnavailable(device)),
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&self, src: ArrayView2<usize>, lex: ArrayView3<f32>, lengths: &[usize]) -> Result<DecodeTrace> {
        self.check_shapes(&src, &lex, lengths)?;
        if self.args.max_decode_len == 0 {
            return Ok(DecodeTrace {
                length: vec![0; lengths.len()],
                topk_length: (self.args.top_k > 0).then(|| vec![vec![0; self.args.top_k]; lengths.len()]),
                topk_sequence: (self.args.top_k > 0).then(Vec::new),
                ..Default::default()
            });
        }

        let mut greedy = Vec::with_capacity(lengths.len());
        let mut ranked = Vec::with_capacity(lengths.len());
        for (b, &len) in lengths.iter().enumerate() {
            let ids: Vec<usize> = src.slice(s![b, ..len]).to_vec();
            let context = self.encode(&ids, lex.slice(s![b, ..len, ..]))?;
            let (state, logits) = self.step(&context, self.args.sos_id)?;
            greedy.push(self.greedy_from(state.clone(), argmax(&logits))?);
            if self.args.top_k > 0 {
                let mut candidates = Vec::with_capacity(self.args.top_k);
                for first in top_indices(&logits, self.args.top_k) {
                    candidates.push(self.greedy_from(state.clone(), first)?);
                }
                ranked.push(candidates);
            }
        }

        let pad = self.args.eos_id;
        let steps = greedy.iter().map(Vec::len).max().unwrap_or(0);
        let sequence = (0..steps)
            .map(|di| greedy.iter().map(|seq| seq.get(di).copied().unwrap_or(pad)).collect())
            .collect();
        let length = greedy.iter().map(Vec::len).collect();

        let (topk_length, topk_sequence) = if self.args.top_k > 0 {
            let k = ranked.first().map(Vec::len).unwrap_or(0);
            let steps = ranked.iter().flatten().map(Vec::len).max().unwrap_or(0);
            let topk_sequence = (0..steps)
                .map(|di| Array2::from_shape_fn((ranked.len(), k), |(b, x)| ranked[b][x].get(di).copied().unwrap_or(pad)))
                .collect();
            let topk_length = ranked.iter().map(|c| c.iter().map(Vec::len).collect()).collect();
            (Some(topk_length), Some(topk_sequence))
        } else {
            (None, None)
        };

        Ok(DecodeTrace { length, sequence, topk_length, topk_sequence })
    }
}

/// Scale each row to unit root mean square before the output head.
fn rms_scaled(x: &Array2<f32>) -> Array2<f32> {
    let ms = x.mapv(|v| v * v).sum_axis(Axis(1)) / x.ncols().max(1) as f32;
    x / &ms.mapv(|m| (m + 1e-6).sqrt()).insert_axis(Axis(1))
}

fn argmax(v: &Array1<f32>) -> usize {
    top_indices(v, 1).first().copied().unwrap_or(0)
}

/// Indices of the `k` largest values, best first.
fn top_indices(v: &Array1<f32>, k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_by(|&a, &b| v[b].total_cmp(&v[a]));
    idx.truncate(k);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn small_args() -> ModelArgs {
        ModelArgs {
            src_vocab_size: 10,
            tgt_vocab_size: 8,
            dim: 8,
            max_decode_len: 6,
            top_k: 3,
            sos_id: 2,
            eos_id: 3,
            seed: 7,
        }
    }

    #[test]
    fn rms_scaled_rows_have_unit_rms() {
        let x = array![[3.0_f32, -4.0], [0.5, 0.5]];
        let y = rms_scaled(&x);
        for row in y.rows() {
            let rms = (row.mapv(|v| v * v).sum() / 2.0).sqrt();
            assert!((rms - 1.0).abs() < 1e-3);
        }
        assert!(y[[0, 0]] > 0.0 && y[[0, 1]] < 0.0);
    }

    #[test]
    fn top_indices_are_ranked() {
        let v = array![0.1_f32, 0.9, -1.0, 0.5];
        assert_eq!(top_indices(&v, 3), vec![1, 3, 0]);
    }

    #[test]
    fn accelerated_device_is_rejected() {
        let mut model = RefSeq2Seq::new(small_args());
        assert!(matches!(model.to_device(Device::Accelerated), Err(Error::DeviceUnavailable(_))));
        assert!(model.to_device(Device::Cpu).is_ok());
    }

    #[test]
    fn trace_is_consistent() {
        let model = RefSeq2Seq::new(small_args());
        let src = array![[4usize, 5, 6]];
        let lex = Array3::<f32>::zeros((1, 3, LEX_DIM));
        let trace = model.forward(src.view(), lex.view(), &[3]).unwrap();

        assert_eq!(trace.length.len(), 1);
        assert!(trace.length[0] >= 1 && trace.length[0] <= 6);
        assert_eq!(trace.sequence.len(), trace.length[0]);

        let topk_length = trace.topk_length.unwrap();
        let topk_sequence = trace.topk_sequence.unwrap();
        assert_eq!(topk_length[0].len(), 3);
        // best-ranked branch is the greedy path
        assert_eq!(topk_length[0][0], trace.length[0]);
        for di in 0..trace.length[0] {
            assert_eq!(topk_sequence[di][[0, 0]], trace.sequence[di][0]);
        }
    }

    #[test]
    fn same_seed_same_output() {
        let src = array![[1usize, 2]];
        let lex = Array3::<f32>::zeros((1, 2, LEX_DIM));
        let a = RefSeq2Seq::new(small_args()).forward(src.view(), lex.view(), &[2]).unwrap();
        let b = RefSeq2Seq::new(small_args()).forward(src.view(), lex.view(), &[2]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mismatched_lex_shape_is_rejected() {
        let model = RefSeq2Seq::new(small_args());
        let src = array![[1usize, 2]];
        let lex = Array3::<f32>::zeros((1, 3, LEX_DIM));
        assert!(matches!(
            model.forward(src.view(), lex.view(), &[2]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
