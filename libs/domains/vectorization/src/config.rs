use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use core_config::{ConfigError, FromEnv, env_bool, env_optional, env_or_default, env_parse};
use database::common::RetryConfig;

use crate::embedding::EmbeddingProviderType;
use crate::models::Namespace;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Everything the pipeline needs besides the relational connection
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub sync: SyncConfig,
    pub search: SearchConfig,
}

impl FromEnv for PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            embedding: EmbeddingConfig::from_env()?,
            index: IndexConfig::from_env()?,
            sync: SyncConfig::from_env()?,
            search: SearchConfig::from_env()?,
        })
    }
}

fn parse_choice<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env_optional(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            details: format!("unsupported value '{raw}'"),
        }),
        None => Ok(default),
    }
}

impl FromStr for EmbeddingProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "local" | "hashing" => Ok(Self::Local),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

/// What to do with inputs longer than `max_input_tokens`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputPolicy {
    #[default]
    Truncate,
    Reject,
}

impl FromStr for InputPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown input policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderType,
    pub model_name: String,
    pub dimension: usize,
    pub max_input_tokens: usize,
    pub input_policy: InputPolicy,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl EmbeddingConfig {
    /// Local hashing embedder, no network
    pub fn local(dimension: usize) -> Self {
        Self {
            provider: EmbeddingProviderType::Local,
            model_name: "feature-hashing".to_string(),
            dimension,
            ..Self::default()
        }
    }

    pub fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = tokens;
        self
    }

    pub fn with_input_policy(mut self, policy: InputPolicy) -> Self {
        self.input_policy = policy;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.max_retries)
            .with_initial_delay(self.retry_initial_delay_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: 1536,
            max_input_tokens: 8191,
            input_policy: InputPolicy::Truncate,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_initial_delay_ms: 200,
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}

impl FromEnv for EmbeddingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let provider = parse_choice("EMBEDDING_PROVIDER", EmbeddingProviderType::OpenAI)?;
        let (default_model, default_dimension) = match provider {
            EmbeddingProviderType::OpenAI => (DEFAULT_EMBEDDING_MODEL, 1536),
            EmbeddingProviderType::Local => ("feature-hashing", 384),
        };

        let dimension: usize = env_parse("EMBEDDING_DIMENSION", default_dimension)?;
        if dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_DIMENSION".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        let api_key = env_optional("OPENAI_API_KEY");
        if provider == EmbeddingProviderType::OpenAI && api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        }

        Ok(Self {
            provider,
            model_name: env_or_default("EMBEDDING_MODEL", default_model),
            dimension,
            max_input_tokens: env_parse("EMBEDDING_MAX_INPUT_TOKENS", 8191)?,
            input_policy: parse_choice("EMBEDDING_INPUT_POLICY", InputPolicy::Truncate)?,
            timeout: Duration::from_secs(env_parse("EMBEDDING_TIMEOUT_SECS", 30)?),
            max_retries: env_parse("EMBEDDING_MAX_RETRIES", 3)?,
            retry_initial_delay_ms: env_parse("EMBEDDING_RETRY_DELAY_MS", 200)?,
            api_key,
            base_url: env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBackend {
    /// Embedded store, optionally snapshotted to `storage_path`
    Memory { storage_path: Option<PathBuf> },
    Qdrant {
        url: String,
        api_key: Option<String>,
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub full_profile_collection: String,
    pub demographic_collection: String,
}

impl IndexConfig {
    pub fn in_memory() -> Self {
        Self {
            backend: IndexBackend::Memory { storage_path: None },
            ..Self::default()
        }
    }

    pub fn collection_name(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::FullProfile => &self.full_profile_collection,
            Namespace::Demographic => &self.demographic_collection,
        }
    }

    /// Directory holding snapshots and watermarks, if persistence is on
    pub fn storage_path(&self) -> Option<&PathBuf> {
        match &self.backend {
            IndexBackend::Memory { storage_path } => storage_path.as_ref(),
            IndexBackend::Qdrant { .. } => None,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Memory {
                storage_path: Some(PathBuf::from("./vector_store")),
            },
            full_profile_collection: "medbot_documents".to_string(),
            demographic_collection: "demographic_patients_namespace".to_string(),
        }
    }
}

impl FromEnv for IndexConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = match env_optional("VECTOR_STORE_URL") {
            Some(url) => IndexBackend::Qdrant {
                url,
                api_key: env_optional("VECTOR_STORE_API_KEY"),
                timeout_secs: env_parse("VECTOR_STORE_TIMEOUT_SECS", 30)?,
            },
            None => IndexBackend::Memory {
                storage_path: Some(PathBuf::from(env_or_default(
                    "VECTOR_STORE_PATH",
                    "./vector_store",
                ))),
            },
        };

        Ok(Self {
            backend,
            full_profile_collection: env_or_default("COLLECTION_FULL_PROFILE", "medbot_documents"),
            demographic_collection: env_or_default(
                "COLLECTION_DEMOGRAPHIC",
                "demographic_patients_namespace",
            ),
        })
    }
}

/// Behaviour when a sync is requested for a namespace that is already syncing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Reject,
    Wait,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "wait" => Ok(Self::Wait),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Embed/upsert chunks in flight at once
    pub concurrency: usize,
    pub embed_batch_size: usize,
    /// Records per source page
    pub page_size: u64,
    pub conflict_policy: ConflictPolicy,
    pub prune_deleted: bool,
    /// Timeout applied to source reads and index calls
    pub io_timeout: Duration,
    pub upsert_retry: RetryConfig,
}

impl SyncConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_prune_deleted(mut self, prune: bool) -> Self {
        self.prune_deleted = prune;
        self
    }

    pub fn with_upsert_retry(mut self, retry: RetryConfig) -> Self {
        self.upsert_retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            embed_batch_size: 16,
            page_size: 500,
            conflict_policy: ConflictPolicy::Reject,
            prune_deleted: true,
            io_timeout: Duration::from_secs(30),
            upsert_retry: RetryConfig::new().with_max_retries(3),
        }
    }
}

impl FromEnv for SyncConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let concurrency: usize = env_parse("SYNC_CONCURRENCY", 4)?;
        let embed_batch_size: usize = env_parse("SYNC_EMBED_BATCH_SIZE", 16)?;
        let page_size: u64 = env_parse("SYNC_PAGE_SIZE", 500)?;

        for (key, value) in [
            ("SYNC_CONCURRENCY", concurrency as u64),
            ("SYNC_EMBED_BATCH_SIZE", embed_batch_size as u64),
            ("SYNC_PAGE_SIZE", page_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    details: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(Self {
            concurrency,
            embed_batch_size,
            page_size,
            conflict_policy: parse_choice("SYNC_CONFLICT_POLICY", ConflictPolicy::Reject)?,
            prune_deleted: env_bool("SYNC_PRUNE_DELETED", true)?,
            io_timeout: Duration::from_secs(env_parse("IO_TIMEOUT_SECS", 30)?),
            upsert_retry: RetryConfig::new().with_max_retries(env_parse("SYNC_UPSERT_RETRIES", 3)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub similarity_threshold: f32,
    pub max_top_k: usize,
    /// Candidates fetched per requested result before threshold filtering
    pub overfetch_factor: usize,
    pub max_query_chars: usize,
    pub io_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            similarity_threshold: 0.7,
            max_top_k: 50,
            overfetch_factor: 2,
            max_query_chars: 10_000,
            io_timeout: Duration::from_secs(30),
        }
    }
}

impl FromEnv for SearchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let similarity_threshold: f32 = env_parse("SIMILARITY_THRESHOLD", 0.7)?;
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "SIMILARITY_THRESHOLD".to_string(),
                details: format!("{similarity_threshold} is outside [0, 1]"),
            });
        }

        let max_top_k: usize = env_parse("VECTOR_SEARCH_MAX_TOP_K", 50)?;
        let default_top_k: usize = env_parse("VECTOR_SEARCH_TOP_K", 5)?;
        if default_top_k == 0 || default_top_k > max_top_k {
            return Err(ConfigError::InvalidValue {
                key: "VECTOR_SEARCH_TOP_K".to_string(),
                details: format!("must be between 1 and {max_top_k}"),
            });
        }

        Ok(Self {
            default_top_k,
            similarity_threshold,
            max_top_k,
            overfetch_factor: env_parse::<usize>("VECTOR_SEARCH_OVERFETCH", 2)?.max(1),
            max_query_chars: 10_000,
            io_timeout: Duration::from_secs(env_parse("IO_TIMEOUT_SECS", 30)?),
        })
    }
}
