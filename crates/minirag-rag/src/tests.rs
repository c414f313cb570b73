//! Pipeline tests over in-process stores and scripted providers

#[cfg(test)]
mod support {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use minirag_core::{
        ChatMessage, Chunk, ChunkStore, CollectionInfo, EmbedPurpose, EmbeddingModel,
        EmbeddingProvider, Error, GenerationOptions, GenerationProvider, InsertBatch, LlmBackend,
        Metadata, Result, RetrievedDocument, Role, StoredChunk, VectorStore, VectorStoreBackend,
    };

    use crate::{InMemoryChunkStore, MemoryVectorStore};

    /// Byte histogram embedder; identical texts embed identically.
    pub struct FakeEmbedder {
        pub model: EmbeddingModel,
        pub width: usize,
        pub calls: Mutex<Vec<(usize, EmbedPurpose)>>,
        pub fail: bool,
    }

    impl FakeEmbedder {
        pub fn new(configured: Option<usize>, width: usize) -> Self {
            Self {
                model: EmbeddingModel::new("fake-embed", configured),
                width,
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn backend(&self) -> LlmBackend {
            LlmBackend::Local
        }

        fn set_embedding_model(&mut self, model_id: &str, dimension: Option<usize>) {
            self.model = EmbeddingModel::new(model_id, dimension);
        }

        fn embedding_dimension(&self) -> Option<usize> {
            self.model.dimension()
        }

        async fn embed_texts(
            &self,
            texts: &[String],
            purpose: EmbedPurpose,
        ) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push((texts.len(), purpose));
            if self.fail {
                return Err(Error::Network("embedding backend unreachable".to_string()));
            }
            let vectors: Vec<Vec<f32>> = texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0; self.width];
                    for b in text.bytes() {
                        v[b as usize % self.width] += 1.0;
                    }
                    v
                })
                .collect();
            if let Some(first) = vectors.first() {
                self.model.observe(first.len());
            }
            Ok(vectors)
        }
    }

    /// Generator answering with a fixed text and remembering what it was sent
    pub struct FakeGenerator {
        pub reply: String,
        pub received: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl FakeGenerator {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                received: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeGenerator {
        fn backend(&self) -> LlmBackend {
            LlmBackend::OpenAI
        }

        fn set_generation_model(&mut self, _model_id: &str) {}

        async fn generate_text(
            &self,
            prompt: &str,
            chat_history: &[ChatMessage],
            _options: GenerationOptions,
        ) -> Result<String> {
            self.received
                .lock()
                .unwrap()
                .push((prompt.to_string(), chat_history.to_vec()));
            Ok(self.reply.clone())
        }

        fn construct_prompt(&self, text: &str, role: Role) -> ChatMessage {
            let role = match role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            ChatMessage {
                role: role.to_string(),
                content: text.to_string(),
            }
        }

        fn process_text(&self, text: &str) -> String {
            minirag_core::truncate_text(text, 1000)
        }
    }

    /// Chunk store recording the size of every page it hands out
    #[derive(Default)]
    pub struct CountingChunkStore {
        pub inner: InMemoryChunkStore,
        pub page_sizes: Mutex<Vec<usize>>,
        pub count_calls: Mutex<usize>,
    }

    #[async_trait]
    impl ChunkStore for CountingChunkStore {
        async fn insert_many(&self, chunks: Vec<Chunk>) -> Result<usize> {
            self.inner.insert_many(chunks).await
        }

        async fn get_page(
            &self,
            project_id: &str,
            page_no: usize,
            page_size: usize,
        ) -> Result<Vec<StoredChunk>> {
            let page = self.inner.get_page(project_id, page_no, page_size).await?;
            self.page_sizes.lock().unwrap().push(page.len());
            Ok(page)
        }

        async fn count(&self, project_id: &str) -> Result<usize> {
            *self.count_calls.lock().unwrap() += 1;
            self.inner.count(project_id).await
        }

        async fn delete_all(&self, project_id: &str) -> Result<usize> {
            self.inner.delete_all(project_id).await
        }
    }

    /// Memory store recording the size of every `insert_many` batch
    pub struct RecordingVectorStore {
        pub inner: MemoryVectorStore,
        pub inserts: Mutex<Vec<usize>>,
    }

    impl RecordingVectorStore {
        pub fn new() -> Self {
            Self {
                inner: MemoryVectorStore::new(minirag_core::DistanceMetric::Cosine),
                inserts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorStore for RecordingVectorStore {
        fn backend(&self) -> VectorStoreBackend {
            self.inner.backend()
        }

        async fn connect(&mut self) -> Result<()> {
            self.inner.connect().await
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.inner.disconnect().await
        }

        async fn collection_exists(&self, name: &str) -> Result<bool> {
            self.inner.collection_exists(name).await
        }

        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }

        async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
            self.inner.collection_info(name).await
        }

        async fn create_collection(&self, name: &str, dimension: usize, reset: bool) -> Result<bool> {
            self.inner.create_collection(name, dimension, reset).await
        }

        async fn delete_collection(&self, name: &str) -> Result<bool> {
            self.inner.delete_collection(name).await
        }

        async fn insert_many(&self, collection: &str, batch: InsertBatch, batch_size: usize) -> Result<()> {
            self.inserts.lock().unwrap().push(batch.len());
            self.inner.insert_many(collection, batch, batch_size).await
        }

        async fn search_by_vector(
            &self,
            collection: &str,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<RetrievedDocument>> {
            self.inner.search_by_vector(collection, vector, top_k).await
        }
    }

    pub fn chunk(project_id: &str, order: usize, text: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::json!("notes.txt"));
        Chunk {
            text: text.to_string(),
            metadata,
            order,
            project_id: project_id.to_string(),
            asset_id: "notes.txt".to_string(),
        }
    }
}

#[cfg(test)]
mod indexer_tests {
    use std::sync::Arc;

    use super::support::*;
    use crate::{BatchIndexer, IndexingState, ResetPolicy};
    use minirag_core::{ChunkStore, EmbedPurpose, EmbeddingProvider, Error, VectorStore};

    async fn seeded_store(project_id: &str, n: usize) -> Arc<CountingChunkStore> {
        let store = Arc::new(CountingChunkStore::default());
        store
            .insert_many(
                (1..=n)
                    .map(|i| chunk(project_id, i, &format!("chunk number {}", i)))
                    .collect(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_pages_through_whole_project() {
        let chunks = seeded_store("42", 120).await;
        let vectors = Arc::new(RecordingVectorStore::new());
        let embedder = Arc::new(FakeEmbedder::new(Some(16), 16));

        let indexer = BatchIndexer::new(embedder.clone(), vectors.clone(), chunks.clone())
            .with_page_size(50);
        let report = indexer.index_project("42", ResetPolicy::None).await.unwrap();

        assert_eq!(report.state, IndexingState::Done);
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(report.inserted_count, 120);
        assert_eq!(report.total_expected, 120);
        assert_eq!(*chunks.page_sizes.lock().unwrap(), vec![50, 50, 20]);
        assert_eq!(*chunks.count_calls.lock().unwrap(), 1);
        assert_eq!(*vectors.inserts.lock().unwrap(), vec![50, 50, 20]);

        let calls = embedder.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, purpose)| *purpose == EmbedPurpose::Document));

        let info = vectors.collection_info("collection_42").await.unwrap();
        assert_eq!(info.points_count, 120);
        assert_eq!(info.dimension, Some(16));
    }

    #[tokio::test]
    async fn test_exact_multiple_of_page_size_ends_on_empty_page() {
        let chunks = seeded_store("7", 100).await;
        let vectors = Arc::new(RecordingVectorStore::new());
        let embedder = Arc::new(FakeEmbedder::new(Some(8), 8));

        let report = BatchIndexer::new(embedder, vectors.clone(), chunks.clone())
            .with_page_size(50)
            .index_project("7", ResetPolicy::None)
            .await
            .unwrap();

        assert_eq!(report.inserted_count, 100);
        assert_eq!(*chunks.page_sizes.lock().unwrap(), vec![50, 50, 0]);
        assert_eq!(vectors.inserts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reindexing_upserts_by_chunk_id() {
        let chunks = seeded_store("7", 30).await;
        let vectors = Arc::new(RecordingVectorStore::new());
        let embedder = Arc::new(FakeEmbedder::new(Some(8), 8));
        let indexer = BatchIndexer::new(embedder, vectors.clone(), chunks);

        indexer.index_project("7", ResetPolicy::None).await.unwrap();
        indexer.index_project("7", ResetPolicy::None).await.unwrap();

        let info = vectors.collection_info("collection_7").await.unwrap();
        assert_eq!(info.points_count, 30);
    }

    #[tokio::test]
    async fn test_auto_detected_dimension_creates_collection() {
        let chunks = seeded_store("9", 5).await;
        let vectors = Arc::new(RecordingVectorStore::new());
        let embedder = Arc::new(FakeEmbedder::new(None, 12));

        BatchIndexer::new(embedder.clone(), vectors.clone(), chunks)
            .index_project("9", ResetPolicy::None)
            .await
            .unwrap();

        assert_eq!(embedder.embedding_dimension(), Some(12));
        let info = vectors.collection_info("collection_9").await.unwrap();
        assert_eq!(info.dimension, Some(12));

        let err = vectors
            .insert_one("collection_9", "short", vec![1.0; 4], None, 99)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 12, actual: 4, .. }));
    }

    #[tokio::test]
    async fn test_collection_reset_recreates_with_new_dimension() {
        let chunks = seeded_store("3", 4).await;
        let vectors = Arc::new(RecordingVectorStore::new());
        vectors
            .create_collection("collection_3", 64, false)
            .await
            .unwrap();
        let embedder = Arc::new(FakeEmbedder::new(Some(8), 8));

        let report = BatchIndexer::new(embedder, vectors.clone(), chunks.clone())
            .index_project("3", ResetPolicy::Collection)
            .await
            .unwrap();

        assert_eq!(report.inserted_count, 4);
        let info = vectors.collection_info("collection_3").await.unwrap();
        assert_eq!(info.dimension, Some(8));
        assert_eq!(chunks.count("3").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_project_reset_clears_chunks() {
        let chunks = seeded_store("3", 4).await;
        chunks.insert_many(vec![chunk("4", 1, "other")]).await.unwrap();
        let vectors = Arc::new(RecordingVectorStore::new());
        let embedder = Arc::new(FakeEmbedder::new(Some(8), 8));

        let report = BatchIndexer::new(embedder, vectors.clone(), chunks.clone())
            .index_project("3", ResetPolicy::Project)
            .await
            .unwrap();

        assert_eq!(report.inserted_count, 0);
        assert_eq!(report.pages_fetched, 0);
        assert_eq!(chunks.count("3").await.unwrap(), 0);
        assert_eq!(chunks.count("4").await.unwrap(), 1);
        assert!(vectors.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_run() {
        let chunks = seeded_store("5", 10).await;
        let vectors = Arc::new(RecordingVectorStore::new());
        let mut embedder = FakeEmbedder::new(Some(8), 8);
        embedder.fail = true;

        let aborted = BatchIndexer::new(Arc::new(embedder), vectors.clone(), chunks)
            .index_project("5", ResetPolicy::None)
            .await
            .unwrap_err();

        assert_eq!(aborted.state, IndexingState::PageEmbedAndUpsert);
        assert_eq!(aborted.page_no, 1);
        assert_eq!(aborted.inserted, 0);
        assert!(matches!(aborted.source, Error::Network(_)));
        assert!(vectors.inserts.lock().unwrap().is_empty());
    }
}

#[cfg(test)]
mod engine_tests {
    use std::sync::Arc;

    use super::support::*;
    use crate::{RagEngine, TemplateParser};
    use minirag_core::{DistanceMetric, EmbedPurpose, EmbeddingProvider, InsertBatch, VectorStore};

    const TESLA: &str = "Nikola Tesla was an inventor.";
    const EDISON: &str = "Thomas Edison ran a lab in Menlo Park.";

    async fn engine_with(
        texts: &[&str],
        generator: Arc<FakeGenerator>,
    ) -> (RagEngine, Arc<RecordingVectorStore>) {
        let embedder = Arc::new(FakeEmbedder::new(Some(32), 32));
        let vectors = Arc::new(RecordingVectorStore::new());
        vectors
            .create_collection("collection_1", 32, false)
            .await
            .unwrap();

        if !texts.is_empty() {
            let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
            let embedded = embedder
                .embed_texts(&texts, EmbedPurpose::Document)
                .await
                .unwrap();
            let record_ids = (1..=texts.len() as i64).collect();
            vectors
                .insert_many(
                    "collection_1",
                    InsertBatch {
                        texts,
                        vectors: embedded,
                        metadatas: Vec::new(),
                        record_ids,
                    },
                    50,
                )
                .await
                .unwrap();
        }

        let engine = RagEngine::new(embedder, generator, vectors.clone(), TemplateParser::default());
        (engine, vectors)
    }

    #[tokio::test]
    async fn test_search_returns_available_hits_best_first() {
        let (engine, _) = engine_with(&[TESLA, EDISON], Arc::new(FakeGenerator::new("ok"))).await;

        let hits = engine.search("1", TESLA, 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, TESLA);
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_answer_prompt_layout() {
        let generator = Arc::new(FakeGenerator::new("He was an inventor."));
        let (engine, _) = engine_with(&[TESLA], generator.clone()).await;

        let answer = engine
            .answer("1", "Who was Tesla?", 1)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(answer.answer, "He was an inventor.");
        assert_eq!(
            answer.full_prompt,
            "## User Query: Who was Tesla?\n\n\
             ## Document No: 1\n### Content: Nikola Tesla was an inventor.\n\n\
             Based on the above documents, please generate an answer for the user.\n## Answer:"
        );

        assert_eq!(answer.chat_history.len(), 2);
        assert_eq!(answer.chat_history[0].role, "system");
        assert!(!answer.chat_history[0].content.contains("## User Query"));
        assert_eq!(answer.chat_history[1].role, "user");
        assert_eq!(answer.chat_history[1].content, answer.full_prompt);

        let received = generator.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, answer.full_prompt);
        assert_eq!(received[0].1.len(), 1);
    }

    #[tokio::test]
    async fn test_documents_numbered_and_joined_by_newline() {
        let (engine, _) = engine_with(&[TESLA, EDISON], Arc::new(FakeGenerator::new("ok"))).await;

        let answer = engine.answer("1", TESLA, 2).await.unwrap().unwrap();
        assert!(answer.full_prompt.contains(&format!(
            "## Document No: 1\n### Content: {}\n## Document No: 2\n### Content: {}",
            TESLA, EDISON
        )));
    }

    #[tokio::test]
    async fn test_no_hits_yields_all_none() {
        let generator = Arc::new(FakeGenerator::new("unused"));
        let (engine, _) = engine_with(&[], generator.clone()).await;

        let (answer, prompt, history) = engine.answer_rag_question("1", "anything", 3).await;
        assert!(answer.is_none());
        assert!(prompt.is_none());
        assert!(history.is_none());
        assert!(generator.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_collapses_to_none() {
        let (engine, _) = engine_with(&[TESLA], Arc::new(FakeGenerator::new("ok"))).await;

        assert!(engine.answer("2", "Who?", 3).await.is_err());
        assert_eq!(engine.answer_rag_question("2", "Who?", 3).await, (None, None, None));
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let (engine, _) = engine_with(&[TESLA], Arc::new(FakeGenerator::new("  "))).await;
        assert!(engine.answer("1", TESLA, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_and_info() {
        let (engine, vectors) = engine_with(&[TESLA], Arc::new(FakeGenerator::new("ok"))).await;

        let info = engine.collection_info("1").await.unwrap();
        assert_eq!(info.points_count, 1);
        assert_eq!(info.distance, DistanceMetric::Cosine);

        assert!(engine.reset_collection("1").await.unwrap());
        assert!(!vectors.collection_exists("collection_1").await.unwrap());
        assert!(!engine.reset_collection("1").await.unwrap());
    }
}
