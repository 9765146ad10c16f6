//! TF-IDF cosine retrieval.
//!
//! Term weights are raw counts times the smoothed idf `ln((1 + N) / (1 + df)) + 1`;
//! every row is L2-normalised, so the cosine is a plain sparse dot product.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use toolseek_core::dedup::dedup_by_tool;
use toolseek_core::traits::LexicalRetriever;
use toolseek_core::types::{Candidate, CorpusSnapshot, Method, Score};
use toolseek_core::Result;

use crate::corpus::tokenize_snapshot;
use crate::tokenize::Tokenizer;

/// Sparse row: `(term index, weight)` sorted by term index.
type Row = Vec<(usize, f32)>;

#[derive(Default)]
pub struct KeywordRetriever {
    tokenizer: Tokenizer,
}

impl KeywordRetriever {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn search(&self, snapshot: &CorpusSnapshot, query: &str, n: usize) -> Result<Vec<Candidate>> {
        if n == 0 || snapshot.is_empty() {
            return Ok(Vec::new());
        }
        let docs = tokenize_snapshot(&self.tokenizer, snapshot);
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let matrix = TfIdfMatrix::fit(docs.iter().map(|d| d.tokens.as_slice()));
        let query_row = matrix.transform(&self.tokenizer.tokenize(query));
        if query_row.is_empty() {
            debug!("keyword: no query term is in the corpus vocabulary");
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = matrix
            .rows
            .iter()
            .enumerate()
            .map(|(ordinal, row)| (dot(&query_row, row).min(1.0), ordinal))
            .filter(|(similarity, _)| *similarity > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(n);
        debug!(docs = docs.len(), vocab = matrix.vocab.len(), hits = scored.len(), "keyword: scored corpus");

        let candidates = scored
            .into_iter()
            .map(|(similarity, ordinal)| docs[ordinal].candidate(Score::Keyword { similarity }))
            .collect();
        Ok(dedup_by_tool(candidates, n))
    }
}

impl LexicalRetriever for KeywordRetriever {
    fn method(&self) -> Method {
        Method::Keyword
    }

    fn retrieve(&self, snapshot: &CorpusSnapshot, query: &str, n: usize) -> Result<Vec<Candidate>> {
        self.search(snapshot, query, n)
    }
}

struct TfIdfMatrix {
    vocab: HashMap<String, usize>,
    idf: Vec<f32>,
    rows: Vec<Row>,
}

impl TfIdfMatrix {
    fn fit<'a>(docs: impl Iterator<Item = &'a [String]> + Clone) -> Self {
        let mut vocab: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        let mut n_docs = 0usize;
        for tokens in docs.clone() {
            n_docs += 1;
            let mut seen: Vec<usize> = Vec::new();
            for token in tokens {
                let next = vocab.len();
                let idx = *vocab.entry(token.clone()).or_insert(next);
                if idx == df.len() {
                    df.push(0);
                }
                if !seen.contains(&idx) {
                    seen.push(idx);
                    df[idx] += 1;
                }
            }
        }
        let n = n_docs as f32;
        let idf = df.iter().map(|&d| ((1.0 + n) / (1.0 + d as f32)).ln() + 1.0).collect();
        let mut matrix = Self { vocab, idf, rows: Vec::with_capacity(n_docs) };
        let rows = docs.map(|tokens| matrix.transform(tokens)).collect();
        matrix.rows = rows;
        matrix
    }

    /// L2-normalised TF-IDF row; tokens outside the vocabulary are ignored.
    fn transform(&self, tokens: &[String]) -> Row {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for token in tokens {
            if let Some(&idx) = self.vocab.get(token) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }
        let mut row: Row = counts.into_iter().map(|(idx, tf)| (idx, tf * self.idf[idx])).collect();
        row.sort_by_key(|(idx, _)| *idx);
        let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut row {
                *w /= norm;
            }
        }
        row
    }
}

fn dot(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    let (mut i, mut j, mut acc) = (0, 0, 0.0f32);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                acc += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    acc
}
