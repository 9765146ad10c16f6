use tracing::warn;

use toolseek_core::types::{Candidate, Collection, CorpusDocument, CorpusSnapshot, Score};
use toolseek_core::Error;

use crate::tokenize::Tokenizer;

/// A snapshot document together with its tokens.
pub struct TokenizedDoc<'a> {
    pub collection: Collection,
    pub doc: &'a CorpusDocument,
    pub tokens: Vec<String>,
}

impl TokenizedDoc<'_> {
    pub fn candidate(&self, score: Score) -> Candidate {
        Candidate {
            tool_id: self.doc.id.clone(),
            score,
            source: self.collection,
            text: self.doc.text.clone(),
            metadata: self.doc.metadata.clone(),
        }
    }
}

/// Tokenize every document of both collections, skipping those that yield no tokens.
pub fn tokenize_snapshot<'a>(tokenizer: &Tokenizer, snapshot: &'a CorpusSnapshot) -> Vec<TokenizedDoc<'a>> {
    snapshot
        .iter()
        .filter_map(|(collection, doc)| {
            let tokens = tokenizer.tokenize(&doc.text);
            if tokens.is_empty() {
                let err = Error::MalformedDocument {
                    id: doc.id.clone(),
                    reason: format!("{collection} text has no tokens"),
                };
                warn!(error = %err, "skipping document");
                return None;
            }
            Some(TokenizedDoc { collection, doc, tokens })
        })
        .collect()
}
