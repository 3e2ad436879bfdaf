mod client;
mod hashing;
mod openai;
mod provider;

pub use client::EmbeddingClient;
pub use hashing::HashingEmbeddingProvider;
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{EmbeddingProvider, EmbeddingProviderType};

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
