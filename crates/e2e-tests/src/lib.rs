//! Shared harness for chunkstore end-to-end tests.

use std::sync::Arc;

use rand::Rng;

use chunkstore_adapters::{
    MemoryFieldIndex, MemoryMetadataStore, MemoryVectorIndex, VectorIndex,
};
use chunkstore_core::ChunkStore;
use chunkstore_types::Record;

/// A fully wired store over in-memory backends, with handles to the
/// backends kept for direct inspection and fault injection.
pub struct TestHarness {
    pub store: ChunkStore,
    pub metadata: Arc<MemoryMetadataStore>,
    pub fields: Arc<MemoryFieldIndex>,
}

impl TestHarness {
    /// Harness over the standard in-memory vector index.
    pub fn new() -> (Self, Arc<MemoryVectorIndex>) {
        let vectors = Arc::new(MemoryVectorIndex::new());
        let harness = Self::with_vectors(vectors.clone());
        (harness, vectors)
    }

    /// Harness over a caller-provided vector index (for fault injection).
    pub fn with_vectors(vectors: Arc<dyn VectorIndex>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let metadata = Arc::new(MemoryMetadataStore::new());
        let fields = Arc::new(MemoryFieldIndex::new());
        let store = ChunkStore::builder()
            .metadata_store(metadata.clone())
            .vector_index(vectors)
            .field_index(fields.clone())
            .build()
            .expect("harness store");
        Self {
            store,
            metadata,
            fields,
        }
    }
}

/// A record with a random embedding of the given dimension.
pub fn embedded_record(id: &str, dimension: usize) -> Record {
    let mut rng = rand::rng();
    let embedding: Vec<f32> = (0..dimension).map(|_| rng.random()).collect();
    Record::new(id)
        .with_field("title", format!("chunk {id}"))
        .with_field("source", "e2e")
        .with_array("tags", vec!["synthetic".to_string()])
        .with_embedding(embedding)
}
