//! Application context shared by CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{Cli, OutputFormat};
use crate::config::{CONFIG_FILE, Config, StorageBackend};
use crate::error::Result;
use crate::resilience::{
    CircuitBreakerRegistry, DegradationMessageService, ErrorClassifier, ErrorRecoveryService,
};
use crate::search::embeddings::EMBEDDING_DEPENDENCY;
use crate::search::{Embedder, EmbeddingCache, HybridQueryBuilder, QueryPipeline, build_embedder};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};
use crate::utils::clock::{Clock, SystemClock};

/// Project state directory used when `--root` is not given.
pub const DEFAULT_ROOT: &str = ".rsx";

pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    /// Project config file that `rsx config set` writes.
    pub config_path: PathBuf,
    pub output: OutputFormat,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn KeyValueStore>,
    pub registry: Arc<CircuitBreakerRegistry>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("root", &self.root)
            .field("config_path", &self.config_path)
            .field("output", &self.output)
            .field("store", &self.store.backend())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli.root.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
        let config = Config::load(cli.config.as_deref(), &root)?;
        let config_path = cli.config.clone().unwrap_or_else(|| root.join(CONFIG_FILE));
        Self::build(root, config, config_path, cli.output_format(), Arc::new(SystemClock))
    }

    /// Wire stores and services from an already loaded config.
    pub fn build(
        root: PathBuf,
        config: Config,
        config_path: PathBuf,
        output: OutputFormat,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = open_store(&config, Arc::clone(&clock))?;

        let mut registry = CircuitBreakerRegistry::new(Arc::clone(&store), Arc::clone(&clock))
            .with_defaults(config.breaker.defaults.clone())
            .with_known_dependencies(config.breaker.known_dependencies.iter().cloned());
        for id in config.breaker.overrides.keys() {
            registry = registry.with_override(id.clone(), config.breaker.config_for(id));
        }

        tracing::debug!(
            root = %root.display(),
            backend = store.backend(),
            dependencies = config.breaker.known_dependencies.len(),
            "application context ready"
        );

        Ok(Self {
            root,
            config,
            config_path,
            output,
            clock,
            store,
            registry: Arc::new(registry),
        })
    }

    pub fn classifier(&self) -> ErrorClassifier {
        ErrorClassifier::new(self.config.classifier.clone())
    }

    pub fn messages(&self) -> DegradationMessageService {
        DegradationMessageService::new(self.classifier())
    }

    pub fn recovery_service(&self) -> Result<ErrorRecoveryService> {
        Ok(ErrorRecoveryService::new(
            self.classifier(),
            self.config.recovery.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        )
        .with_registry(Arc::clone(&self.registry))
        .with_data_dir(self.data_dir()?))
    }

    pub fn query_pipeline(&self) -> Result<QueryPipeline> {
        let builder = HybridQueryBuilder::new(self.config.search.clone())?;
        let cache = Arc::new(EmbeddingCache::new(&self.config.cache, Arc::clone(&self.clock))?);
        let embedder: Arc<dyn Embedder> = Arc::from(build_embedder(&self.config.embedding)?);
        let breaker = self.registry.circuit_breaker(EMBEDDING_DEPENDENCY, None)?;
        Ok(QueryPipeline::new(builder, cache, embedder, breaker).with_messages(self.messages()))
    }

    /// Directory holding durable state; the root for the memory backend.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.config.storage.backend {
            StorageBackend::Sqlite => self
                .config
                .storage
                .resolved_sqlite_path()
                .map(|path| path.parent().map_or_else(|| self.root.clone(), Path::to_path_buf)),
            StorageBackend::Memory => Ok(self.root.clone()),
        }
    }

    pub fn is_json(&self) -> bool {
        self.output == OutputFormat::Json
    }
}

fn open_store(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn KeyValueStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new(clock))),
        StorageBackend::Sqlite => {
            let path = config.storage.resolved_sqlite_path()?;
            Ok(Arc::new(SqliteStore::open(path, clock)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use crate::utils::clock::ManualClock;
    use tempfile::TempDir;

    fn context(dir: &TempDir, backend: StorageBackend) -> AppContext {
        let mut config = Config::default();
        config.storage.backend = backend;
        config.storage.data_dir = Some(dir.path().join("data"));
        AppContext::build(
            dir.path().to_path_buf(),
            config,
            dir.path().join(CONFIG_FILE),
            OutputFormat::Human,
            Arc::new(ManualClock::new()),
        )
        .unwrap()
    }

    #[test]
    fn sqlite_backend_creates_state_db() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, StorageBackend::Sqlite);
        assert_eq!(ctx.store.backend(), "sqlite");
        assert!(dir.path().join("data").join("state.db").exists());
        assert_eq!(ctx.data_dir().unwrap(), dir.path().join("data"));
    }

    #[test]
    fn registry_uses_configured_overrides() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config.breaker.overrides.insert(
            "database".to_string(),
            crate::config::BreakerPatch {
                failure_threshold: Some(1),
                ..Default::default()
            },
        );
        let ctx = AppContext::build(
            dir.path().to_path_buf(),
            config,
            dir.path().join(CONFIG_FILE),
            OutputFormat::Json,
            Arc::new(ManualClock::new()),
        )
        .unwrap();

        let breaker = ctx.registry.circuit_breaker("database", None).unwrap();
        assert_eq!(breaker.config().failure_threshold, 1);
        assert!(ctx.is_json());
    }

    #[test]
    fn pipeline_is_guarded_by_embedding_breaker() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, StorageBackend::Memory);
        let pipeline = ctx.query_pipeline().unwrap();
        assert!(pipeline.cache().is_empty());
        let stats = ctx.registry.all_statistics().unwrap();
        assert_eq!(stats["embedding_api"].state, CircuitState::Closed);
    }
}
