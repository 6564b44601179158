//! Okapi BM25 over a fixed corpus of short texts.
//!
//! Tokenization is lowercase + whitespace split, with no stemming and no
//! stop-word removal. Scores are un-normalized; callers map them into
//! `[0, 1]` by dividing by the batch maximum.
//!
//! # Formula
//!
//! ```text
//! idf(t)   = ln((N − df(t) + 0.5) / (df(t) + 0.5) + 1)
//! score(d) = Σ idf(t) · tf(t,d) · (k1 + 1) / (tf(t,d) + k1 · (1 − b + b · |d| / avgdl))
//! ```

use std::collections::HashMap;

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

/// Lowercase and split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
struct DocStats {
    len: usize,
    tf: HashMap<String, u32>,
}

/// BM25 scorer. Call [`Bm25::fit`] once, then [`Bm25::score`] any number of times.
#[derive(Debug, Clone)]
pub struct Bm25 {
    k1: f64,
    b: f64,
    docs: Vec<DocStats>,
    idf: HashMap<String, f64>,
    avgdl: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25 {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            docs: Vec::new(),
            idf: HashMap::new(),
            avgdl: 1.0,
        }
    }

    /// Build term statistics over `corpus`, replacing any previous fit.
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) {
        self.docs = corpus
            .iter()
            .map(|text| {
                let tokens = tokenize(text.as_ref());
                let mut tf = HashMap::new();
                for token in &tokens {
                    *tf.entry(token.clone()).or_insert(0u32) += 1;
                }
                DocStats {
                    len: tokens.len(),
                    tf,
                }
            })
            .collect();

        let n = self.docs.len();
        let total_len: usize = self.docs.iter().map(|d| d.len).sum();
        self.avgdl = if n == 0 || total_len == 0 {
            1.0
        } else {
            total_len as f64 / n as f64
        };

        let mut df: HashMap<&str, usize> = HashMap::new();
        for doc in &self.docs {
            for term in doc.tf.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = n as f64;
        self.idf = df
            .into_iter()
            .map(|(term, freq)| {
                let freq = freq as f64;
                let idf = ((n - freq + 0.5) / (freq + 0.5) + 1.0).ln();
                (term.to_string(), idf)
            })
            .collect();
    }

    /// Number of documents in the fitted corpus.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Score every corpus document against `query`, in corpus order.
    ///
    /// Query terms outside the fitted vocabulary contribute zero. Repeated
    /// query terms contribute once per occurrence.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let tokens = tokenize(query);
        let mut out = vec![0.0; self.docs.len()];

        for (i, doc) in self.docs.iter().enumerate() {
            let norm = self.k1 * (1.0 - self.b + self.b * doc.len as f64 / self.avgdl);
            for term in &tokens {
                let Some(idf) = self.idf.get(term) else {
                    continue;
                };
                let f = doc.tf.get(term).copied().unwrap_or(0) as f64;
                out[i] += idf * f * (self.k1 + 1.0) / (f + norm);
            }
        }

        out
    }
}
