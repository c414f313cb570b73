//! Retrieval-augmented answering over a project's collection

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use minirag_core::{
    ChatMessage, CollectionInfo, EmbedPurpose, EmbeddingProvider, Error, GenerationOptions,
    GenerationProvider, Result, RetrievedDocument, Role, VectorStore, collection_name,
};

use crate::templates::{
    DOCUMENT_PROMPT, FOOTER_PROMPT, QUERY_PROMPT, RAG_GROUP, SYSTEM_PROMPT, TemplateParser,
};

/// A generated answer together with what was sent to produce it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub full_prompt: String,
    pub chat_history: Vec<ChatMessage>,
}

pub struct RagEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    vector_store: Arc<dyn VectorStore>,
    templates: TemplateParser,
    options: GenerationOptions,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        vector_store: Arc<dyn VectorStore>,
        templates: TemplateParser,
    ) -> Self {
        Self {
            embedder,
            generator,
            vector_store,
            templates,
            options: GenerationOptions::default(),
        }
    }

    /// Override the generation limits used for answers
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn collection_info(&self, project_id: &str) -> Result<CollectionInfo> {
        self.vector_store
            .collection_info(&collection_name(project_id))
            .await
    }

    /// Drop the project's collection. Returns whether it existed.
    pub async fn reset_collection(&self, project_id: &str) -> Result<bool> {
        self.vector_store
            .delete_collection(&collection_name(project_id))
            .await
    }

    /// Nearest chunks to `query`, best first. An empty query embedding yields no hits.
    pub async fn search(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let vector = self.embedder.embed_text(query, EmbedPurpose::Query).await?;
        if vector.is_empty() {
            tracing::warn!(project_id, "query embedding is empty");
            return Ok(Vec::new());
        }

        self.vector_store
            .search_by_vector(&collection_name(project_id), &vector, top_k)
            .await
    }

    /// Retrieve, assemble the prompt and generate.
    ///
    /// Returns `Ok(None)` when nothing relevant was found.
    pub async fn answer(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Option<RagAnswer>> {
        let documents = self.search(project_id, query, top_k).await?;
        if documents.is_empty() {
            tracing::info!(project_id, "no documents retrieved, skipping generation");
            return Ok(None);
        }

        let system_prompt = self.templates.get(RAG_GROUP, SYSTEM_PROMPT, &[])?;
        let full_prompt = self.build_prompt(query, &documents)?;
        let mut chat_history = vec![
            self.generator
                .construct_prompt(&system_prompt, Role::System),
        ];

        let answer = self
            .generator
            .generate_text(&full_prompt, &chat_history, self.options)
            .await?;
        if answer.trim().is_empty() {
            return Err(Error::EmptyResponse(format!(
                "{} returned an empty answer",
                self.generator.backend()
            )));
        }

        chat_history.push(self.generator.construct_prompt(&full_prompt, Role::User));
        tracing::debug!(project_id, documents = documents.len(), "answer generated");

        Ok(Some(RagAnswer {
            answer,
            full_prompt,
            chat_history,
        }))
    }

    /// Tuple form of [`RagEngine::answer`]: every failure and the no-hit case
    /// become `(None, None, None)`. Errors are logged, not returned.
    pub async fn answer_rag_question(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> (Option<String>, Option<String>, Option<Vec<ChatMessage>>) {
        match self.answer(project_id, query, top_k).await {
            Ok(Some(rag)) => (Some(rag.answer), Some(rag.full_prompt), Some(rag.chat_history)),
            Ok(None) => (None, None, None),
            Err(e) => {
                tracing::error!(project_id, "answering failed: {}", e);
                (None, None, None)
            }
        }
    }

    fn build_prompt(&self, query: &str, documents: &[RetrievedDocument]) -> Result<String> {
        let query_section = self
            .templates
            .get(RAG_GROUP, QUERY_PROMPT, &[("query_text", query)])?;

        let sections = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let doc_num = (i + 1).to_string();
                let chunk_text = self.generator.process_text(&doc.text);
                self.templates.get(
                    RAG_GROUP,
                    DOCUMENT_PROMPT,
                    &[("doc_num", &doc_num), ("chunk_text", &chunk_text)],
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let footer = self.templates.get(RAG_GROUP, FOOTER_PROMPT, &[])?;

        Ok([query_section, sections.join("\n"), footer].join("\n\n"))
    }
}
