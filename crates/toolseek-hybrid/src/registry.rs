use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use toolseek_core::catalog::CatalogEntry;
use toolseek_core::traits::{CorpusStore, EmbeddingProvider, PutMode};
use toolseek_core::types::{Collection, CorpusDocument, Meta, ToolDescriptor};
use toolseek_core::{EmbedError, Error, Result};

/// A registered tool as returned by [`ToolRegistry::select`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolEntry {
    pub name: String,
    /// Stored descriptor text (compact JSON).
    pub text: String,
    /// `None` when the stored text no longer parses as a descriptor.
    pub descriptor: Option<ToolDescriptor>,
    pub hypothetical_queries: Option<String>,
    pub metadata: Meta,
}

/// Counts from [`ToolRegistry::ingest`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Insert, update, delete and select tools across both collections.
pub struct ToolRegistry {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn CorpusStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Register a new tool. Fails with `Conflict` if the name is taken; on any
    /// later failure the descriptor written by this call is removed again.
    pub async fn insert(&self, descriptor: &ToolDescriptor, hypothetical_queries: Option<&str>) -> Result<()> {
        descriptor.validate()?;
        let name = descriptor.name.as_str();
        if self.store.get(Collection::Descriptors, name).await?.is_some() {
            return Err(Error::Conflict { collection: Collection::Descriptors, id: name.to_string() });
        }
        let (tool_doc, hq_doc) = self.build_documents(descriptor, hypothetical_queries).await?;
        self.store.put(Collection::Descriptors, tool_doc, PutMode::Insert).await?;

        if let Some(hq_doc) = hq_doc {
            if let Err(e) = self.store.put(Collection::HypotheticalQueries, hq_doc, PutMode::Upsert).await {
                warn!(tool = name, error = %e, "hypothetical queries not stored, rolling back insert");
                if let Err(rollback) = self.store.delete(Collection::Descriptors, name).await {
                    warn!(tool = name, error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }
        info!(tool = name, "tool inserted");
        Ok(())
    }

    /// Replace an existing tool. `None` hypothetical queries removes any stored ones.
    pub async fn update(&self, descriptor: &ToolDescriptor, hypothetical_queries: Option<&str>) -> Result<()> {
        descriptor.validate()?;
        let name = descriptor.name.as_str();
        let previous = self
            .store
            .get(Collection::Descriptors, name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tool '{name}'")))?;
        let (tool_doc, hq_doc) = self.build_documents(descriptor, hypothetical_queries).await?;
        self.store.put(Collection::Descriptors, tool_doc, PutMode::Upsert).await?;

        let hq_result = match hq_doc {
            Some(doc) => self.store.put(Collection::HypotheticalQueries, doc, PutMode::Upsert).await,
            None => self.store.delete(Collection::HypotheticalQueries, name).await.map(|_| ()),
        };
        if let Err(e) = hq_result {
            warn!(tool = name, error = %e, "hypothetical queries not updated, restoring previous descriptor");
            if let Err(rollback) = self.store.put(Collection::Descriptors, previous, PutMode::Upsert).await {
                warn!(tool = name, error = %rollback, "rollback failed");
            }
            return Err(e);
        }
        info!(tool = name, "tool updated");
        Ok(())
    }

    /// Remove a tool. Its hypothetical queries go first, so a failed call
    /// never leaves them searchable without a descriptor.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if self.store.get(Collection::Descriptors, name).await?.is_none() {
            return Err(Error::NotFound(format!("tool '{name}'")));
        }
        self.store.delete(Collection::HypotheticalQueries, name).await?;
        if !self.store.delete(Collection::Descriptors, name).await? {
            return Err(Error::NotFound(format!("tool '{name}'")));
        }
        info!(tool = name, "tool deleted");
        Ok(())
    }

    /// Register catalog entries one by one. With `update`, a name that is
    /// already taken is updated instead; any other failed entry is logged and
    /// skipped. `on_entry` runs after each entry.
    pub async fn ingest<F>(&self, entries: &[CatalogEntry], update: bool, mut on_entry: F) -> IngestSummary
    where
        F: FnMut(&CatalogEntry),
    {
        let mut summary = IngestSummary::default();
        for entry in entries {
            let (tool, source) = (entry.descriptor.name.as_str(), entry.source.display());
            let queries = entry.hypothetical_queries.as_deref();
            match self.insert(&entry.descriptor, queries).await {
                Ok(()) => summary.inserted += 1,
                Err(Error::Conflict { .. }) if update => match self.update(&entry.descriptor, queries).await {
                    Ok(()) => summary.updated += 1,
                    Err(e) => {
                        warn!(tool, %source, error = %e, "not updated");
                        summary.skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(tool, %source, error = %e, "not ingested");
                    summary.skipped += 1;
                }
            }
            on_entry(entry);
        }
        summary
    }

    /// One tool by name, or every tool when `name` is `None`.
    pub async fn select(&self, name: Option<&str>) -> Result<Vec<ToolEntry>> {
        match name {
            Some(name) => {
                let doc = self
                    .store
                    .get(Collection::Descriptors, name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("tool '{name}'")))?;
                let hq = self.store.get(Collection::HypotheticalQueries, name).await?.map(|d| d.text);
                Ok(vec![entry(doc, hq)])
            }
            None => {
                let mut hq: HashMap<String, String> = self
                    .store
                    .get_all(Collection::HypotheticalQueries)
                    .await?
                    .into_iter()
                    .map(|d| (d.id, d.text))
                    .collect();
                let docs = self.store.get_all(Collection::Descriptors).await?;
                Ok(docs
                    .into_iter()
                    .map(|doc| {
                        let queries = hq.remove(&doc.id);
                        entry(doc, queries)
                    })
                    .collect())
            }
        }
    }

    /// Embed the descriptor text and the hypothetical queries (if any) in one batch.
    async fn build_documents(
        &self,
        descriptor: &ToolDescriptor,
        hypothetical_queries: Option<&str>,
    ) -> Result<(CorpusDocument, Option<CorpusDocument>)> {
        let text = descriptor.to_document_text()?;
        let queries = hypothetical_queries.map(str::trim).filter(|q| !q.is_empty());
        let mut texts = vec![text.clone()];
        texts.extend(queries.map(str::to_string));

        let mut vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::EmbeddingUnavailable(EmbedError::Permanent(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))));
        }
        let hq_vector = if queries.is_some() { vectors.pop() } else { None };
        let tool_vector = vectors.pop().unwrap_or_default();

        let metadata = self.metadata();
        let tool_doc = CorpusDocument::new(descriptor.name.clone(), text, tool_vector).with_metadata(metadata.clone());
        let hq_doc = queries
            .zip(hq_vector)
            .map(|(q, v)| CorpusDocument::new(descriptor.name.clone(), q, v).with_metadata(metadata));
        Ok((tool_doc, hq_doc))
    }

    fn metadata(&self) -> Meta {
        Meta::from([
            ("updated_at".to_string(), serde_json::Value::String(Utc::now().to_rfc3339())),
            ("embedding_model".to_string(), serde_json::Value::String(self.embedder.id().to_string())),
        ])
    }
}

fn entry(doc: CorpusDocument, hypothetical_queries: Option<String>) -> ToolEntry {
    let descriptor = serde_json::from_str::<ToolDescriptor>(&doc.text).ok();
    ToolEntry { name: doc.id, text: doc.text, descriptor, hypothetical_queries, metadata: doc.metadata }
}
