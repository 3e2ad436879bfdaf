mod memory;
mod qdrant;
mod store;

pub use memory::InMemoryIndexStore;
pub use qdrant::QdrantIndexStore;
pub use store::{VectorIndexStore, cosine_similarity};

#[cfg(test)]
pub use store::MockVectorIndexStore;
