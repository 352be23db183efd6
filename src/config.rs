use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result, RsError};
use crate::resilience::{
    CircuitBreakerConfig, ClassifierConfig, DEFAULT_DEPENDENCIES, HealthThresholds, RecoveryConfig, RetryConfig,
};
use crate::search::builder::{DistanceMetric, HighlightConfig, HybridConfig, RankingConfig};
use crate::search::{EmbedderConfig, EmbeddingCacheConfig, SearchConfig};

/// File name looked up in the global config dir and the project root.
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub cache: EmbeddingCacheConfig,
    #[serde(default)]
    pub embedding: EmbedderConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path (or `RSX_CONFIG`) replaces the global and project
    /// files. Otherwise `~/.config/rsx/config.toml` is applied, then
    /// `<root>/config.toml`. `RSX_*` environment variables win over files.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        Self::load_with_env(explicit_path, root, &|key| std::env::var(key).ok())
    }

    pub fn load_with_env(explicit_path: Option<&Path>, root: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path.map(PathBuf::from).or_else(|| env("RSX_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            match Self::load_patch(&path)? {
                Some(patch) => config.merge_patch(patch),
                None => {
                    return Err(RsError::MissingConfig(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&root.join(CONFIG_FILE))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides(env)?;
        config.validate()?;

        Ok(config)
    }

    /// Path of the global config file, if a config dir exists.
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rsx").join(CONFIG_FILE))
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        match Self::global_path() {
            Some(path) => Self::load_patch(&path),
            None => Ok(None),
        }
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| RsError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| RsError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    /// Check that a config document parses and yields a valid config when
    /// layered over the defaults.
    pub fn check_document(raw: &str) -> Result<()> {
        let patch: ConfigPatch = toml::from_str(raw).map_err(|err| RsError::Config(format!("parse config: {err}")))?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.breaker {
            self.breaker.merge(patch);
        }
        if let Some(patch) = patch.cache {
            self.cache.merge(patch);
        }
        if let Some(patch) = patch.embedding {
            self.embedding.merge(patch);
        }
        if let Some(patch) = patch.search {
            self.search.merge(patch);
        }
        if let Some(patch) = patch.recovery {
            self.recovery.merge(patch);
        }
        if let Some(patch) = patch.classifier {
            self.classifier.merge(patch);
        }
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        let defaults = &mut self.breaker.defaults;
        if let Some(value) = env_parse::<u32>(env, "RSX_BREAKER_FAILURE_THRESHOLD")? {
            defaults.failure_threshold = value;
        }
        if let Some(value) = env_parse::<u64>(env, "RSX_BREAKER_RECOVERY_TIMEOUT_SECS")? {
            defaults.recovery_timeout_secs = value;
        }
        if let Some(value) = env_parse::<u32>(env, "RSX_BREAKER_SUCCESS_THRESHOLD")? {
            defaults.success_threshold = value;
        }
        if let Some(value) = env_parse::<u64>(env, "RSX_BREAKER_TIMEOUT_MS")? {
            defaults.timeout_ms = (value > 0).then_some(value);
        }
        if let Some(values) = env_list(env, "RSX_KNOWN_DEPENDENCIES") {
            self.breaker.known_dependencies = merge_unique(values, &self.breaker.known_dependencies);
        }

        if let Some(value) = env_parse::<usize>(env, "RSX_CACHE_MAX_ENTRIES")? {
            self.cache.max_entries = value;
        }
        if let Some(value) = env_parse::<u64>(env, "RSX_CACHE_DEFAULT_TTL_SECS")? {
            self.cache.default_ttl_secs = value;
        }

        if let Some(value) = env("RSX_EMBEDDING_BACKEND") {
            self.embedding.backend = value;
        }
        if let Some(value) = env_parse::<usize>(env, "RSX_EMBEDDING_DIMS")? {
            self.embedding.dims = value;
        }

        if let Some(value) = env("RSX_SEARCH_LANGUAGE") {
            self.search.language = value;
        }
        if let Some(value) = env_bool(env, "RSX_SEARCH_STEMMING") {
            self.search.stemming = value;
        }
        if let Some(value) = env_parse::<f32>(env, "RSX_SEARCH_TEXT_WEIGHT")? {
            self.search.hybrid.text_weight = value;
        }
        if let Some(value) = env_parse::<f32>(env, "RSX_SEARCH_VECTOR_WEIGHT")? {
            self.search.hybrid.vector_weight = value;
        }
        if let Some(value) = env_parse::<f32>(env, "RSX_SEARCH_SIMILARITY_THRESHOLD")? {
            self.search.hybrid.similarity_threshold = value;
        }
        if let Some(value) = env_parse::<usize>(env, "RSX_SEARCH_MAX_RESULTS")? {
            self.search.hybrid.max_results = value;
        }

        if let Some(value) = env_parse::<u32>(env, "RSX_RECOVERY_MAX_ATTEMPTS")? {
            self.recovery.retry.max_attempts = value;
        }

        if let Some(value) = env("RSX_STORAGE_BACKEND") {
            self.storage.backend = parse_backend(&value)?;
        }
        if let Some(value) = env("RSX_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = env("RSX_SQLITE_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(value));
        }

        Ok(())
    }

    /// Check cross-field invariants. Runs after every load.
    pub fn validate(&self) -> Result<()> {
        self.breaker.defaults.validate()?;
        for (id, patch) in &self.breaker.overrides {
            if !self.breaker.known_dependencies.iter().any(|known| known == id) {
                return Err(RsError::Config(format!(
                    "breaker override for unknown dependency {id}"
                )));
            }
            self.breaker.config_for_patch(patch).validate()?;
        }
        if self.breaker.known_dependencies.is_empty() {
            return Err(RsError::Config(
                "breaker.known_dependencies must not be empty".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(RsError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }
        if self.embedding.dims == 0 {
            return Err(RsError::Config(
                "embedding.dims must be greater than 0".to_string(),
            ));
        }
        self.search.validate()?;
        if self.recovery.retry.max_attempts == 0 {
            return Err(RsError::Config(
                "recovery.retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.recovery.max_backoff_secs == 0 {
            return Err(RsError::Config(
                "recovery.max_backoff_secs must be greater than 0".to_string(),
            ));
        }
        let ratio = self.classifier.history_min_success_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(RsError::Config(format!(
                "classifier.history_min_success_ratio must be within [0, 1], got {ratio}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Thresholds for every dependency without an override.
    #[serde(default)]
    pub defaults: CircuitBreakerConfig,
    /// Dependency ids the registry will create breakers for.
    #[serde(default = "default_known_dependencies")]
    pub known_dependencies: Vec<String>,
    /// Per-dependency fields layered over `defaults`.
    #[serde(default)]
    pub overrides: BTreeMap<String, BreakerPatch>,
}

fn default_known_dependencies() -> Vec<String> {
    DEFAULT_DEPENDENCIES.iter().map(ToString::to_string).collect()
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            defaults: CircuitBreakerConfig::default(),
            known_dependencies: default_known_dependencies(),
            overrides: BTreeMap::new(),
        }
    }
}

impl BreakerConfig {
    /// Effective config for one dependency.
    pub fn config_for(&self, id: &str) -> CircuitBreakerConfig {
        match self.overrides.get(id) {
            Some(patch) => self.config_for_patch(patch),
            None => self.defaults.clone(),
        }
    }

    fn config_for_patch(&self, patch: &BreakerPatch) -> CircuitBreakerConfig {
        let mut config = self.defaults.clone();
        patch.apply(&mut config);
        config
    }

    fn merge(&mut self, patch: BreakerSectionPatch) {
        if let Some(defaults) = patch.defaults {
            defaults.apply(&mut self.defaults);
        }
        if let Some(values) = patch.known_dependencies {
            self.known_dependencies = values;
        }
        for (id, incoming) in patch.overrides.unwrap_or_default() {
            self.overrides
                .entry(id)
                .and_modify(|existing| existing.merge(incoming.clone()))
                .or_insert(incoming);
        }
    }
}

/// Partial breaker thresholds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_errors: Option<Vec<ErrorCode>>,
    /// `0` disables the timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl BreakerPatch {
    pub fn apply(&self, config: &mut CircuitBreakerConfig) {
        if let Some(value) = self.failure_threshold {
            config.failure_threshold = value;
        }
        if let Some(value) = self.recovery_timeout_secs {
            config.recovery_timeout_secs = value;
        }
        if let Some(value) = self.success_threshold {
            config.success_threshold = value;
        }
        if let Some(value) = &self.expected_errors {
            config.expected_errors = value.clone();
        }
        if let Some(value) = self.timeout_ms {
            config.timeout_ms = (value > 0).then_some(value);
        }
    }

    fn merge(&mut self, other: Self) {
        self.failure_threshold = other.failure_threshold.or(self.failure_threshold);
        self.recovery_timeout_secs = other.recovery_timeout_secs.or(self.recovery_timeout_secs);
        self.success_threshold = other.success_threshold.or(self.success_threshold);
        self.expected_errors = other.expected_errors.or(self.expected_errors.take());
        self.timeout_ms = other.timeout_ms.or(self.timeout_ms);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

fn parse_backend(value: &str) -> Result<StorageBackend> {
    match value.trim().to_lowercase().as_str() {
        "sqlite" => Ok(StorageBackend::Sqlite),
        "memory" => Ok(StorageBackend::Memory),
        other => Err(RsError::Config(format!(
            "invalid storage backend {other} (expected sqlite|memory)"
        ))),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Defaults to the platform data dir (`~/.local/share/rsx`).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/state.db`.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("rsx"))
                .ok_or_else(|| RsError::MissingConfig("data directory not found; set storage.data_dir".to_string())),
        }
    }

    pub fn resolved_sqlite_path(&self) -> Result<PathBuf> {
        match &self.sqlite_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.resolved_data_dir()?.join("state.db")),
        }
    }

    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.backend {
            self.backend = value;
        }
        if let Some(value) = patch.data_dir {
            self.data_dir = Some(value);
        }
        if let Some(value) = patch.sqlite_path {
            self.sqlite_path = Some(value);
        }
    }
}

// Section merges for configs owned by other modules.

impl EmbeddingCacheConfig {
    fn merge(&mut self, patch: CachePatch) {
        if let Some(value) = patch.max_entries {
            self.max_entries = value;
        }
        if let Some(value) = patch.default_ttl_secs {
            self.default_ttl_secs = value;
        }
    }
}

impl EmbedderConfig {
    fn merge(&mut self, patch: EmbeddingPatch) {
        if let Some(value) = patch.backend {
            self.backend = value;
        }
        if let Some(value) = patch.dims {
            self.dims = value;
        }
    }
}

impl SearchConfig {
    fn merge(&mut self, patch: SearchPatch) {
        if let Some(value) = patch.language {
            self.language = value;
        }
        if let Some(value) = patch.stemming {
            self.stemming = value;
        }
        if let Some(value) = patch.min_word_length {
            self.text.min_word_length = value;
        }
        if let Some(value) = patch.max_word_length {
            self.text.max_word_length = value;
        }
        if let Some(value) = patch.max_content_bytes {
            self.text.max_content_bytes = value;
        }
        if let Some(patch) = patch.highlight {
            merge_highlight(&mut self.highlight, patch);
        }
        if let Some(patch) = patch.ranking {
            merge_ranking(&mut self.ranking, patch);
        }
        if let Some(patch) = patch.hybrid {
            merge_hybrid(&mut self.hybrid, patch);
        }
    }
}

fn merge_highlight(config: &mut HighlightConfig, patch: HighlightPatch) {
    if let Some(value) = patch.enabled {
        config.enabled = value;
    }
    if let Some(value) = patch.max_words {
        config.max_words = value;
    }
    if let Some(value) = patch.min_words {
        config.min_words = value;
    }
    if let Some(value) = patch.max_fragments {
        config.max_fragments = value;
    }
}

fn merge_ranking(config: &mut RankingConfig, patch: RankingPatch) {
    if let Some(value) = patch.enabled {
        config.enabled = value;
    }
    if let Some(value) = patch.normalization {
        config.normalization = value;
    }
}

fn merge_hybrid(config: &mut HybridConfig, patch: HybridPatch) {
    if let Some(value) = patch.text_weight {
        config.text_weight = value;
    }
    if let Some(value) = patch.vector_weight {
        config.vector_weight = value;
    }
    if let Some(value) = patch.similarity_threshold {
        config.similarity_threshold = value;
    }
    if let Some(value) = patch.max_results {
        config.max_results = value;
    }
    if let Some(value) = patch.distance {
        config.distance = value;
    }
    if let Some(value) = patch.boost_exact_matches {
        config.boost_exact_matches = value;
    }
}

impl RecoveryConfig {
    fn merge(&mut self, patch: RecoveryPatch) {
        if let Some(patch) = patch.retry {
            merge_retry(&mut self.retry, patch);
        }
        if let Some(value) = patch.default_retry_after_ms {
            self.default_retry_after_ms = value;
        }
        if let Some(value) = patch.max_backoff_secs {
            self.max_backoff_secs = value;
        }
        if let Some(patch) = patch.health {
            merge_health(&mut self.health, patch);
        }
    }
}

fn merge_retry(config: &mut RetryConfig, patch: RetryPatch) {
    if let Some(value) = patch.max_attempts {
        config.max_attempts = value;
    }
    if let Some(value) = patch.initial_delay_ms {
        config.initial_delay_ms = value;
    }
    if let Some(value) = patch.max_delay_ms {
        config.max_delay_ms = value;
    }
    if let Some(value) = patch.backoff_multiplier {
        config.backoff_multiplier = value;
    }
    if let Some(value) = patch.jitter_factor {
        config.jitter_factor = value;
    }
}

fn merge_health(config: &mut HealthThresholds, patch: HealthPatch) {
    if let Some(value) = patch.memory_warning_ratio {
        config.memory_warning_ratio = value;
    }
    if let Some(value) = patch.memory_critical_ratio {
        config.memory_critical_ratio = value;
    }
    if let Some(value) = patch.disk_warning_ratio {
        config.disk_warning_ratio = value;
    }
    if let Some(value) = patch.disk_critical_ratio {
        config.disk_critical_ratio = value;
    }
}

impl ClassifierConfig {
    fn merge(&mut self, patch: ClassifierPatch) {
        if let Some(value) = patch.repeated_failure_threshold {
            self.repeated_failure_threshold = value;
        }
        if let Some(value) = patch.degraded_index_failure_threshold {
            self.degraded_index_failure_threshold = value;
        }
        if let Some(value) = patch.history_min_attempts {
            self.history_min_attempts = value;
        }
        if let Some(value) = patch.history_min_success_ratio {
            self.history_min_success_ratio = value;
        }
        if let Some(value) = patch.history_max_avg_recovery_secs {
            self.history_max_avg_recovery_secs = value;
        }
        if let Some(value) = patch.min_batch_size {
            self.min_batch_size = value;
        }
    }
}

// =============================================================================
// Patches
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    pub breaker: Option<BreakerSectionPatch>,
    pub cache: Option<CachePatch>,
    pub embedding: Option<EmbeddingPatch>,
    pub search: Option<SearchPatch>,
    pub recovery: Option<RecoveryPatch>,
    pub classifier: Option<ClassifierPatch>,
    pub storage: Option<StoragePatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BreakerSectionPatch {
    pub defaults: Option<BreakerPatch>,
    pub known_dependencies: Option<Vec<String>>,
    pub overrides: Option<BTreeMap<String, BreakerPatch>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CachePatch {
    pub max_entries: Option<usize>,
    pub default_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EmbeddingPatch {
    pub backend: Option<String>,
    pub dims: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SearchPatch {
    pub language: Option<String>,
    pub stemming: Option<bool>,
    pub min_word_length: Option<usize>,
    pub max_word_length: Option<usize>,
    pub max_content_bytes: Option<usize>,
    pub highlight: Option<HighlightPatch>,
    pub ranking: Option<RankingPatch>,
    pub hybrid: Option<HybridPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HighlightPatch {
    pub enabled: Option<bool>,
    pub max_words: Option<u32>,
    pub min_words: Option<u32>,
    pub max_fragments: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RankingPatch {
    pub enabled: Option<bool>,
    pub normalization: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HybridPatch {
    pub text_weight: Option<f32>,
    pub vector_weight: Option<f32>,
    pub similarity_threshold: Option<f32>,
    pub max_results: Option<usize>,
    pub distance: Option<DistanceMetric>,
    pub boost_exact_matches: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RecoveryPatch {
    pub retry: Option<RetryPatch>,
    pub default_retry_after_ms: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub health: Option<HealthPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RetryPatch {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub jitter_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HealthPatch {
    pub memory_warning_ratio: Option<f64>,
    pub memory_critical_ratio: Option<f64>,
    pub disk_warning_ratio: Option<f64>,
    pub disk_critical_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ClassifierPatch {
    pub repeated_failure_threshold: Option<u32>,
    pub degraded_index_failure_threshold: Option<u32>,
    pub history_min_attempts: Option<u32>,
    pub history_min_success_ratio: Option<f64>,
    pub history_max_avg_recovery_secs: Option<u64>,
    pub min_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub backend: Option<StorageBackend>,
    pub data_dir: Option<PathBuf>,
    pub sqlite_path: Option<PathBuf>,
}

// =============================================================================
// Env helpers
// =============================================================================

fn merge_unique(values: Vec<String>, existing: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values.into_iter().chain(existing.iter().cloned()) {
        if seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}

fn env_bool(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    env(key).map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_parse<T>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| RsError::Config(format!("invalid {key} value {value}: {err}"))),
        None => Ok(None),
    }
}

fn env_list(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    env(key).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(ToString::to_string)
            .collect()
    })
}
