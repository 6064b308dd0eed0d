//! Word-level age/polarity lexicon and the lexical feature tensor built from it.
//!
//! Each token maps to a 4-element vector `[age, is_negative, is_neutral,
//! is_positive]`. Tokens missing from the lexicon get zeros.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ndarray::{Array3, ArrayView2};
use serde::{Deserialize, Deserializer};

use crate::error::Result;
use crate::vocab::Vocab;

/// Width of a lexical feature vector.
pub const LEX_DIM: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum Polarity {
    Negative = 1,
    Neutral = 2,
    Positive = 3,
}

impl Polarity {
    /// Position of the polarity flag inside a feature vector.
    pub fn slot(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Polarity {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(Polarity::Negative),
            2 => Ok(Polarity::Neutral),
            3 => Ok(Polarity::Positive),
            other => Err(format!("polarity must be 1, 2 or 3, got {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct LexEntry {
    #[serde(default)]
    pub age: Option<f32>,
    #[serde(default, deserialize_with = "polarity_or_none")]
    pub polarity: Option<Polarity>,
}

/// A polarity of `0` means the word has none.
fn polarity_or_none<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Polarity>, D::Error> {
    match Option::<u8>::deserialize(d)? {
        None | Some(0) => Ok(None),
        Some(v) => Polarity::try_from(v).map(Some).map_err(serde::de::Error::custom),
    }
}

impl LexEntry {
    pub fn features(&self) -> [f32; LEX_DIM] {
        let mut v = [0.0; LEX_DIM];
        if let Some(age) = self.age {
            v[0] = age;
        }
        if let Some(p) = self.polarity {
            v[p.slot()] = 1.0;
        }
        v
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Lexicon {
    entries: HashMap<String, LexEntry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn insert(&mut self, word: impl Into<String>, entry: LexEntry) {
        self.entries.insert(word.into(), entry);
    }

    pub fn get(&self, word: &str) -> Option<&LexEntry> {
        self.entries.get(word)
    }

    /// Feature vector for `word`, all zeros when the word is unknown.
    pub fn features(&self, word: &str) -> [f32; LEX_DIM] {
        self.get(word).copied().unwrap_or_default().features()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, LexEntry)> for Lexicon {
    fn from_iter<T: IntoIterator<Item = (String, LexEntry)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Build the `(batch, seq_len, 4)` feature tensor for a batch of token indices.
pub fn lex_features(batch: ArrayView2<usize>, vocab: &Vocab, lexicon: &Lexicon) -> Result<Array3<f32>> {
    let (rows, cols) = batch.dim();
    let mut out = Array3::<f32>::zeros((rows, cols, LEX_DIM));
    for ((i, j), &id) in batch.indexed_iter() {
        let word = vocab.itos(id)?;
        for (k, v) in lexicon.features(word).into_iter().enumerate() {
            out[[i, j, k]] = v;
        }
    }
    Ok(out)
}
