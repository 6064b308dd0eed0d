//! Bidirectional token/index vocabulary.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

pub const UNK: &str = "<unk>";
pub const PAD: &str = "<pad>";

/// Options for building a vocabulary from counted tokens.
#[derive(Clone, Debug)]
pub struct VocabOptions {
    /// Maximum number of non-special tokens kept.
    pub max_size: Option<usize>,
    /// Tokens seen fewer times than this are dropped.
    pub min_freq: usize,
    /// Tokens placed first, in order. The first one of these equal to
    /// [`UNK`] becomes the unknown token.
    pub specials: Vec<String>,
}

impl Default for VocabOptions {
    fn default() -> Self {
        Self {
            max_size: None,
            min_freq: 1,
            specials: vec![UNK.to_string(), PAD.to_string()],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Vocab {
    stoi: HashMap<String, usize>,
    itos: Vec<String>,
    unk_id: Option<usize>,
}

impl Vocab {
    /// Create a vocabulary where each token's index is its position.
    /// Duplicate tokens keep their first index.
    pub fn new(tokens: Vec<String>) -> Self {
        let mut stoi = HashMap::with_capacity(tokens.len());
        for (i, tok) in tokens.iter().enumerate() {
            stoi.entry(tok.clone()).or_insert(i);
        }
        let unk_id = stoi.get(UNK).copied();
        Self { stoi, itos: tokens, unk_id }
    }

    /// Build from token sequences: specials first, then the remaining
    /// tokens by descending frequency, ties broken lexicographically.
    pub fn build<I, S>(sequences: I, options: &VocabOptions) -> Self
    where
        I: IntoIterator,
        I::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for seq in sequences {
            for tok in seq {
                *counts.entry(tok.as_ref().to_string()).or_insert(0) += 1;
            }
        }
        for special in &options.specials {
            counts.remove(special);
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, c)| *c >= options.min_freq)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max) = options.max_size {
            ranked.truncate(max);
        }

        let mut tokens = Vec::with_capacity(options.specials.len() + ranked.len());
        for special in &options.specials {
            if !tokens.contains(special) {
                tokens.push(special.clone());
            }
        }
        tokens.extend(ranked.into_iter().map(|(tok, _)| tok));
        debug!(size = tokens.len(), "built vocabulary");
        Self::new(tokens)
    }

    /// Load a vocabulary with one token per line; the line number is the index,
    /// blank lines included.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let tokens = content
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        Ok(Self::new(tokens))
    }

    /// Index of `token`, falling back to the unknown token when present.
    pub fn stoi(&self, token: &str) -> Result<usize> {
        match self.stoi.get(token) {
            Some(&id) => Ok(id),
            None => self
                .unk_id
                .ok_or_else(|| Error::UnknownToken(token.to_string())),
        }
    }

    pub fn itos(&self, index: usize) -> Result<&str> {
        self.itos
            .get(index)
            .map(String::as_str)
            .ok_or(Error::IndexOutOfRange { index, size: self.itos.len() })
    }

    /// Exact lookup without the unknown-token fallback.
    pub fn get(&self, token: &str) -> Option<usize> {
        self.stoi.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.stoi.contains_key(token)
    }

    pub fn unk_id(&self) -> Option<usize> {
        self.unk_id
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.itos
    }

    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<usize>> {
        tokens.iter().map(|t| self.stoi(t.as_ref())).collect()
    }

    pub fn decode(&self, ids: &[usize]) -> Result<Vec<String>> {
        ids.iter().map(|&id| self.itos(id).map(str::to_string)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_orders_specials_then_frequency() {
        let data = vec![toks(&["b", "a", "b"]), toks(&["c", "a", "b"])];
        let vocab = Vocab::build(&data, &VocabOptions::default());
        assert_eq!(vocab.tokens(), &toks(&["<unk>", "<pad>", "b", "a", "c"])[..]);
        assert_eq!(vocab.unk_id(), Some(0));
    }

    #[test]
    fn build_respects_min_freq_and_max_size() {
        let data = vec![toks(&["x", "x", "y", "y", "y", "z"])];
        let options = VocabOptions { max_size: Some(1), min_freq: 2, ..Default::default() };
        let vocab = Vocab::build(&data, &options);
        assert_eq!(vocab.tokens(), &toks(&["<unk>", "<pad>", "y"])[..]);
    }

    #[test]
    fn unknown_falls_back_to_unk() {
        let vocab = Vocab::new(toks(&["<unk>", "hello"]));
        assert_eq!(vocab.stoi("hello").unwrap(), 1);
        assert_eq!(vocab.stoi("bye").unwrap(), 0);
    }

    #[test]
    fn unknown_without_unk_is_an_error() {
        let vocab = Vocab::new(toks(&["hello"]));
        assert!(matches!(vocab.stoi("bye"), Err(Error::UnknownToken(t)) if t == "bye"));
    }

    #[test]
    fn itos_out_of_range() {
        let vocab = Vocab::new(toks(&["a"]));
        assert!(matches!(vocab.itos(3), Err(Error::IndexOutOfRange { index: 3, size: 1 })));
    }
}
