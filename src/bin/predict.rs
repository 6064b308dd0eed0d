//! Command-line predictor.
//!
//! Reads one whitespace-tokenized source sentence per line from stdin and
//! prints the decoded target sentence, or `--top-k` numbered candidates.

use anyhow::{Context, Result};
use clap::Parser;
use seq2seq_lex::{Lexicon, ModelArgs, Predictor, PredictorConfig, RefSeq2Seq, TargetField, Vocab};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Source vocabulary, one token per line
    #[arg(long)]
    src_vocab: PathBuf,

    /// Target vocabulary, one token per line
    #[arg(long)]
    tgt_vocab: PathBuf,

    /// JSON lexicon mapping words to age/polarity
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Print this many ranked candidates per input instead of one
    #[arg(long)]
    top_k: Option<usize>,

    /// Seed for the reference model weights
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Maximum decoded length
    #[arg(long, default_value_t = 32)]
    max_len: usize,

    /// Hidden dimension of the reference model
    #[arg(long, default_value_t = 64)]
    dim: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let src_vocab = Vocab::load(&args.src_vocab)
        .with_context(|| format!("loading source vocabulary {:?}", args.src_vocab))?;
    let tgt_vocab = Vocab::load(&args.tgt_vocab)
        .with_context(|| format!("loading target vocabulary {:?}", args.tgt_vocab))?;
    let lexicon = match &args.lexicon {
        Some(path) => Lexicon::load(path).with_context(|| format!("loading lexicon {:?}", path))?,
        None => Lexicon::new(),
    };

    let sos_id = tgt_vocab
        .get(TargetField::SYM_SOS)
        .with_context(|| format!("target vocabulary has no {}", TargetField::SYM_SOS))?;
    let eos_id = tgt_vocab
        .get(TargetField::SYM_EOS)
        .with_context(|| format!("target vocabulary has no {}", TargetField::SYM_EOS))?;

    let model = RefSeq2Seq::new(ModelArgs {
        src_vocab_size: src_vocab.len(),
        tgt_vocab_size: tgt_vocab.len(),
        dim: args.dim,
        max_decode_len: args.max_len,
        top_k: args.top_k.unwrap_or(0),
        sos_id,
        eos_id,
        seed: args.seed,
    });
    let predictor = Predictor::new(model, src_vocab, tgt_vocab, PredictorConfig::default())?;

    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match args.top_k {
            Some(n) => {
                for (rank, seq) in predictor.predict_n(&tokens, &lexicon, n)?.iter().enumerate() {
                    writeln!(out, "{}\t{}", rank + 1, seq.join(" "))?;
                }
            }
            None => writeln!(out, "{}", predictor.predict(&tokens, &lexicon)?.join(" "))?,
        }
    }
    Ok(())
}
