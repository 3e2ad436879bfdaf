use std::path::PathBuf;

use core_config::{AppInfo, FromEnv, app_info, env_optional, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_vectorization::PipelineConfig;

pub use core_config::Environment;

const DEFAULT_WATERMARK_PATH: &str = "./vector_store";

/// Vectorizer configuration, composed from the shared config components
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub pipeline: PipelineConfig,
    /// Directory for `watermarks.json`
    pub watermark_path: PathBuf,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // HOST=0.0.0.0, PORT=8080 by default
        let database = PostgresConfig::from_env()?; // DATABASE_URL is required
        let pipeline = PipelineConfig::from_env()?;

        // Watermarks live next to the embedded index unless told otherwise
        let watermark_path = env_optional("WATERMARK_PATH")
            .map(PathBuf::from)
            .or_else(|| pipeline.index.storage_path().cloned())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WATERMARK_PATH));

        Ok(Self {
            app: app_info!(),
            environment,
            server,
            database,
            pipeline,
            watermark_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_vectorization::{EmbeddingProviderType, IndexBackend};

    #[test]
    fn test_local_embedded_defaults() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgresql://localhost/medbot")),
                ("EMBEDDING_PROVIDER", Some("local")),
                ("VECTOR_STORE_URL", None),
                ("VECTOR_STORE_PATH", Some("/tmp/medbot-index")),
                ("WATERMARK_PATH", None),
                ("PORT", Some("9090")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.server.port, 9090);
                assert_eq!(config.pipeline.embedding.provider, EmbeddingProviderType::Local);
                assert_eq!(config.watermark_path, PathBuf::from("/tmp/medbot-index"));
                assert_eq!(config.app.name, "medbot_vectorizer");
            },
        );
    }

    #[test]
    fn test_qdrant_backend_uses_watermark_path() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgresql://localhost/medbot")),
                ("EMBEDDING_PROVIDER", Some("local")),
                ("VECTOR_STORE_URL", Some("http://localhost:6334")),
                ("WATERMARK_PATH", Some("/var/lib/medbot")),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert!(matches!(config.pipeline.index.backend, IndexBackend::Qdrant { .. }));
                assert_eq!(config.watermark_path, PathBuf::from("/var/lib/medbot"));
            },
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", None::<&str>),
                ("EMBEDDING_PROVIDER", Some("local")),
            ],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }
}
