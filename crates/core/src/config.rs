use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::money::CurrencyTable;
use crate::engine::budget::BudgetTierPolicy;
use crate::engine::cache::SimilarityCache;
use crate::engine::retrieval::RetrievalPolicy;
use crate::engine::routine::RoutinePolicy;
use crate::engine::scoring::{ScoringPolicy, ScoringWeights};
use crate::errors::DomainError;

const MAX_RETRIEVAL_TIMEOUT_MS: u64 = 60_000;
const MAX_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub budget: BudgetConfig,
    pub retrieval: RetrievalConfig,
    pub currency: CurrencyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub reference_currency: String,
    pub low_budget_threshold: Decimal,
    pub veto_burn_rate: f64,
    pub science_weight: f64,
    pub social_weight: f64,
    pub engineering_weight: f64,
    pub sensitive_skin_veto: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BudgetConfig {
    pub low_tier_cap: Decimal,
    pub mid_tier_cap: Decimal,
    pub tolerance: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalConfig {
    pub embedding_dim: usize,
    pub similarity_floor: f32,
    pub default_k: usize,
    pub max_k: usize,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurrencyConfig {
    /// Units of each currency per one reference unit.
    pub rates: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub reference_currency: Option<String>,
    pub low_budget_threshold: Option<Decimal>,
    pub embedding_dim: Option<usize>,
    pub retrieval_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("USD".to_string(), Decimal::ONE);
        rates.insert("CNY".to_string(), Decimal::new(72, 1));
        rates.insert("EUR".to_string(), Decimal::new(92, 2));

        Self {
            engine: EngineConfig {
                reference_currency: "USD".to_string(),
                low_budget_threshold: Decimal::new(50, 0),
                veto_burn_rate: 0.10,
                science_weight: 0.5,
                social_weight: 0.3,
                engineering_weight: 0.2,
                sensitive_skin_veto: true,
            },
            budget: BudgetConfig {
                low_tier_cap: Decimal::new(50, 0),
                mid_tier_cap: Decimal::new(150, 0),
                tolerance: Decimal::new(12, 1),
            },
            retrieval: RetrievalConfig {
                embedding_dim: 1536,
                similarity_floor: 0.0,
                default_k: 5,
                max_k: 20,
                timeout_ms: 1500,
                cache_ttl_secs: 300,
            },
            currency: CurrencyConfig { rates },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("skinfit.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            weights: ScoringWeights {
                science: self.engine.science_weight,
                social: self.engine.social_weight,
                engineering: self.engine.engineering_weight,
            },
            veto_burn_rate: self.engine.veto_burn_rate,
            sensitive_skin_veto: self.engine.sensitive_skin_veto,
        }
    }

    pub fn currency_table(&self) -> Result<CurrencyTable, DomainError> {
        CurrencyTable::new(self.engine.reference_currency.clone(), self.currency.rates.clone())
    }

    pub fn routine_policy(&self) -> Result<RoutinePolicy, DomainError> {
        Ok(RoutinePolicy {
            low_budget_threshold: self.engine.low_budget_threshold,
            currencies: self.currency_table()?,
        })
    }

    pub fn budget_policy(&self) -> BudgetTierPolicy {
        BudgetTierPolicy {
            low_tier_cap: self.budget.low_tier_cap,
            mid_tier_cap: self.budget.mid_tier_cap,
            tolerance: self.budget.tolerance,
        }
    }

    pub fn retrieval_policy(&self) -> RetrievalPolicy {
        RetrievalPolicy {
            similarity_floor: self.retrieval.similarity_floor,
            default_k: self.retrieval.default_k,
            max_k: self.retrieval.max_k,
            timeout: Duration::from_millis(self.retrieval.timeout_ms),
        }
    }

    pub fn similarity_cache(&self) -> SimilarityCache {
        let ttl_secs = self.retrieval.cache_ttl_secs.min(MAX_CACHE_TTL_SECS);
        SimilarityCache::new(chrono::Duration::seconds(ttl_secs as i64))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(reference_currency) = engine.reference_currency {
                self.engine.reference_currency = reference_currency;
            }
            if let Some(low_budget_threshold) = engine.low_budget_threshold {
                self.engine.low_budget_threshold = low_budget_threshold;
            }
            if let Some(veto_burn_rate) = engine.veto_burn_rate {
                self.engine.veto_burn_rate = veto_burn_rate;
            }
            if let Some(science_weight) = engine.science_weight {
                self.engine.science_weight = science_weight;
            }
            if let Some(social_weight) = engine.social_weight {
                self.engine.social_weight = social_weight;
            }
            if let Some(engineering_weight) = engine.engineering_weight {
                self.engine.engineering_weight = engineering_weight;
            }
            if let Some(sensitive_skin_veto) = engine.sensitive_skin_veto {
                self.engine.sensitive_skin_veto = sensitive_skin_veto;
            }
        }

        if let Some(budget) = patch.budget {
            if let Some(low_tier_cap) = budget.low_tier_cap {
                self.budget.low_tier_cap = low_tier_cap;
            }
            if let Some(mid_tier_cap) = budget.mid_tier_cap {
                self.budget.mid_tier_cap = mid_tier_cap;
            }
            if let Some(tolerance) = budget.tolerance {
                self.budget.tolerance = tolerance;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(embedding_dim) = retrieval.embedding_dim {
                self.retrieval.embedding_dim = embedding_dim;
            }
            if let Some(similarity_floor) = retrieval.similarity_floor {
                self.retrieval.similarity_floor = similarity_floor;
            }
            if let Some(default_k) = retrieval.default_k {
                self.retrieval.default_k = default_k;
            }
            if let Some(max_k) = retrieval.max_k {
                self.retrieval.max_k = max_k;
            }
            if let Some(timeout_ms) = retrieval.timeout_ms {
                self.retrieval.timeout_ms = timeout_ms;
            }
            if let Some(cache_ttl_secs) = retrieval.cache_ttl_secs {
                self.retrieval.cache_ttl_secs = cache_ttl_secs;
            }
        }

        // File rates extend the defaults rather than replacing them.
        if let Some(currency) = patch.currency {
            for (code, rate) in currency.rates {
                self.currency.rates.insert(code.trim().to_ascii_uppercase(), rate);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SKINFIT_ENGINE_REFERENCE_CURRENCY") {
            self.engine.reference_currency = value;
        }
        if let Some(value) = read_env("SKINFIT_ENGINE_LOW_BUDGET_THRESHOLD") {
            self.engine.low_budget_threshold = parse_env("SKINFIT_ENGINE_LOW_BUDGET_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_ENGINE_VETO_BURN_RATE") {
            self.engine.veto_burn_rate = parse_env("SKINFIT_ENGINE_VETO_BURN_RATE", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_ENGINE_SCIENCE_WEIGHT") {
            self.engine.science_weight = parse_env("SKINFIT_ENGINE_SCIENCE_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_ENGINE_SOCIAL_WEIGHT") {
            self.engine.social_weight = parse_env("SKINFIT_ENGINE_SOCIAL_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_ENGINE_ENGINEERING_WEIGHT") {
            self.engine.engineering_weight = parse_env("SKINFIT_ENGINE_ENGINEERING_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_ENGINE_SENSITIVE_SKIN_VETO") {
            self.engine.sensitive_skin_veto = parse_env("SKINFIT_ENGINE_SENSITIVE_SKIN_VETO", &value)?;
        }

        if let Some(value) = read_env("SKINFIT_BUDGET_LOW_TIER_CAP") {
            self.budget.low_tier_cap = parse_env("SKINFIT_BUDGET_LOW_TIER_CAP", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_BUDGET_MID_TIER_CAP") {
            self.budget.mid_tier_cap = parse_env("SKINFIT_BUDGET_MID_TIER_CAP", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_BUDGET_TOLERANCE") {
            self.budget.tolerance = parse_env("SKINFIT_BUDGET_TOLERANCE", &value)?;
        }

        if let Some(value) = read_env("SKINFIT_RETRIEVAL_EMBEDDING_DIM") {
            self.retrieval.embedding_dim = parse_env("SKINFIT_RETRIEVAL_EMBEDDING_DIM", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_RETRIEVAL_SIMILARITY_FLOOR") {
            self.retrieval.similarity_floor = parse_env("SKINFIT_RETRIEVAL_SIMILARITY_FLOOR", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_RETRIEVAL_DEFAULT_K") {
            self.retrieval.default_k = parse_env("SKINFIT_RETRIEVAL_DEFAULT_K", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_RETRIEVAL_MAX_K") {
            self.retrieval.max_k = parse_env("SKINFIT_RETRIEVAL_MAX_K", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_RETRIEVAL_TIMEOUT_MS") {
            self.retrieval.timeout_ms = parse_env("SKINFIT_RETRIEVAL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("SKINFIT_RETRIEVAL_CACHE_TTL_SECS") {
            self.retrieval.cache_ttl_secs = parse_env("SKINFIT_RETRIEVAL_CACHE_TTL_SECS", &value)?;
        }

        let log_level = read_env("SKINFIT_LOGGING_LEVEL").or_else(|| read_env("SKINFIT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SKINFIT_LOGGING_FORMAT").or_else(|| read_env("SKINFIT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(reference_currency) = overrides.reference_currency {
            self.engine.reference_currency = reference_currency;
        }
        if let Some(low_budget_threshold) = overrides.low_budget_threshold {
            self.engine.low_budget_threshold = low_budget_threshold;
        }
        if let Some(embedding_dim) = overrides.embedding_dim {
            self.retrieval.embedding_dim = embedding_dim;
        }
        if let Some(timeout_ms) = overrides.retrieval_timeout_ms {
            self.retrieval.timeout_ms = timeout_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        self.scoring_policy().validate().map_err(domain_validation)?;
        self.budget_policy().validate().map_err(domain_validation)?;
        validate_retrieval(&self.retrieval)?;
        validate_currency(&self.engine, &self.currency)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("skinfit.toml"), PathBuf::from("config/skinfit.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn domain_validation(error: DomainError) -> ConfigError {
    ConfigError::Validation(error.to_string())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    let code = engine.reference_currency.trim();
    if code.len() != 3 || !code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "engine.reference_currency must be a three-letter ISO code such as `USD`".to_string(),
        ));
    }

    if engine.low_budget_threshold <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "engine.low_budget_threshold must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.embedding_dim == 0 {
        return Err(ConfigError::Validation(
            "retrieval.embedding_dim must be greater than zero".to_string(),
        ));
    }

    if !retrieval.similarity_floor.is_finite() || !(-1.0..=1.0).contains(&retrieval.similarity_floor) {
        return Err(ConfigError::Validation(
            "retrieval.similarity_floor must be in range -1.0..=1.0".to_string(),
        ));
    }

    if retrieval.max_k == 0 || retrieval.default_k == 0 || retrieval.default_k > retrieval.max_k {
        return Err(ConfigError::Validation(
            "retrieval.default_k must be in range 1..=retrieval.max_k".to_string(),
        ));
    }

    if retrieval.timeout_ms == 0 || retrieval.timeout_ms > MAX_RETRIEVAL_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "retrieval.timeout_ms must be in range 1..={MAX_RETRIEVAL_TIMEOUT_MS}"
        )));
    }

    if retrieval.cache_ttl_secs == 0 || retrieval.cache_ttl_secs > MAX_CACHE_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "retrieval.cache_ttl_secs must be in range 1..={MAX_CACHE_TTL_SECS}"
        )));
    }

    Ok(())
}

fn validate_currency(engine: &EngineConfig, currency: &CurrencyConfig) -> Result<(), ConfigError> {
    for (code, rate) in &currency.rates {
        if *rate <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "currency.rates.{code} must be greater than zero"
            )));
        }
    }

    let reference = engine.reference_currency.trim().to_ascii_uppercase();
    let reference_rate = currency
        .rates
        .iter()
        .find(|(code, _)| code.trim().eq_ignore_ascii_case(&reference))
        .map(|(_, rate)| *rate);
    if reference_rate.is_some_and(|rate| rate != Decimal::ONE) {
        return Err(ConfigError::Validation(format!(
            "currency.rates.{reference} must be 1 because it is the reference currency"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    budget: Option<BudgetPatch>,
    retrieval: Option<RetrievalPatch>,
    currency: Option<CurrencyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    reference_currency: Option<String>,
    low_budget_threshold: Option<Decimal>,
    veto_burn_rate: Option<f64>,
    science_weight: Option<f64>,
    social_weight: Option<f64>,
    engineering_weight: Option<f64>,
    sensitive_skin_veto: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct BudgetPatch {
    low_tier_cap: Option<Decimal>,
    mid_tier_cap: Option<Decimal>,
    tolerance: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    embedding_dim: Option<usize>,
    similarity_floor: Option<f32>,
    default_k: Option<usize>,
    max_k: Option<usize>,
    timeout_ms: Option<u64>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrencyPatch {
    #[serde(default)]
    rates: BTreeMap<String, Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
