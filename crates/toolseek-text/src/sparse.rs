//! BM25 retrieval over an in-RAM tantivy index rebuilt from the snapshot on every call.
//!
//! No index state survives a call, so there is nothing to invalidate when the
//! corpus changes; the price is an O(corpus) rebuild per query.

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};
use tracing::debug;

use toolseek_core::dedup::dedup_by_tool;
use toolseek_core::traits::LexicalRetriever;
use toolseek_core::types::{Candidate, CorpusSnapshot, Method, Score};
use toolseek_core::{Error, Result};

use crate::corpus::{tokenize_snapshot, TokenizedDoc};
use crate::tantivy_utils::{build_schema, index_err, register_tokenizer, LexicalFields, WRITER_MEMORY_BYTES};
use crate::tokenize::Tokenizer;

pub const DEFAULT_EPSILON: f32 = 1e-6;

pub struct SparseRetriever {
    tokenizer: Tokenizer,
    epsilon: f32,
}

impl Default for SparseRetriever {
    fn default() -> Self {
        Self::new(Tokenizer::new(), DEFAULT_EPSILON)
    }
}

impl SparseRetriever {
    pub fn new(tokenizer: Tokenizer, epsilon: f32) -> Self {
        Self { tokenizer, epsilon }
    }

    pub fn search(&self, snapshot: &CorpusSnapshot, query: &str, n: usize) -> Result<Vec<Candidate>> {
        if n == 0 || snapshot.is_empty() {
            return Ok(Vec::new());
        }
        let query_tokens = self.tokenizer.tokenize(query);
        if query_tokens.is_empty() {
            debug!("sparse: query has no tokens");
            return Ok(Vec::new());
        }
        let docs = tokenize_snapshot(&self.tokenizer, snapshot);
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let index = Bm25Index::build(&docs)?;
        let hits = index.top(&query_tokens, n)?;
        let max_raw = hits.iter().map(|(raw, _)| *raw).fold(0.0f32, f32::max);
        let candidates: Vec<Candidate> = hits
            .into_iter()
            .map(|(raw, ordinal)| {
                docs[ordinal].candidate(Score::Sparse { raw, normalized: raw / (max_raw + self.epsilon) })
            })
            .collect();
        debug!(docs = docs.len(), hits = candidates.len(), max_raw, "sparse: scored corpus");
        Ok(dedup_by_tool(candidates, n))
    }
}

impl LexicalRetriever for SparseRetriever {
    fn method(&self) -> Method {
        Method::Sparse
    }

    fn retrieve(&self, snapshot: &CorpusSnapshot, query: &str, n: usize) -> Result<Vec<Candidate>> {
        self.search(snapshot, query, n)
    }
}

struct Bm25Index {
    index: Index,
    fields: LexicalFields,
}

impl Bm25Index {
    fn build(docs: &[TokenizedDoc<'_>]) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizer(&index);
        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES).map_err(index_err)?;
        for (ordinal, d) in docs.iter().enumerate() {
            writer
                .add_document(doc!(fields.ordinal => ordinal as u64, fields.body => d.tokens.join(" ")))
                .map_err(index_err)?;
        }
        writer.commit().map_err(index_err)?;
        Ok(Self { index, fields })
    }

    /// Top `n` documents matching at least one query token, as `(bm25, ordinal)`.
    fn top(&self, query_tokens: &[String], n: usize) -> Result<Vec<(f32, usize)>> {
        let reader = self.index.reader().map_err(index_err)?;
        let searcher = reader.searcher();
        let clauses: Vec<(Occur, Box<dyn Query>)> = query_tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(self.fields.body, token);
                (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
            })
            .collect();
        let query = BooleanQuery::new(clauses);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(n)).map_err(index_err)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let stored: TantivyDocument = searcher.doc(addr).map_err(index_err)?;
            let ordinal = stored
                .get_first(self.fields.ordinal)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| Error::Index("stored ordinal missing".into()))?;
            hits.push((score, usize::try_from(ordinal).map_err(|e| Error::Index(e.to_string()))?));
        }
        Ok(hits)
    }
}
