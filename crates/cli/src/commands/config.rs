use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use skinfit_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let engine = &config.engine;
    let budget = &config.budget;
    let retrieval = &config.retrieval;
    let fields = vec![
        field("engine.reference_currency", engine.reference_currency.clone(), &["SKINFIT_ENGINE_REFERENCE_CURRENCY"]),
        field(
            "engine.low_budget_threshold",
            engine.low_budget_threshold.to_string(),
            &["SKINFIT_ENGINE_LOW_BUDGET_THRESHOLD"],
        ),
        field("engine.veto_burn_rate", engine.veto_burn_rate.to_string(), &["SKINFIT_ENGINE_VETO_BURN_RATE"]),
        field("engine.science_weight", engine.science_weight.to_string(), &["SKINFIT_ENGINE_SCIENCE_WEIGHT"]),
        field("engine.social_weight", engine.social_weight.to_string(), &["SKINFIT_ENGINE_SOCIAL_WEIGHT"]),
        field(
            "engine.engineering_weight",
            engine.engineering_weight.to_string(),
            &["SKINFIT_ENGINE_ENGINEERING_WEIGHT"],
        ),
        field(
            "engine.sensitive_skin_veto",
            engine.sensitive_skin_veto.to_string(),
            &["SKINFIT_ENGINE_SENSITIVE_SKIN_VETO"],
        ),
        field("budget.low_tier_cap", budget.low_tier_cap.to_string(), &["SKINFIT_BUDGET_LOW_TIER_CAP"]),
        field("budget.mid_tier_cap", budget.mid_tier_cap.to_string(), &["SKINFIT_BUDGET_MID_TIER_CAP"]),
        field("budget.tolerance", budget.tolerance.to_string(), &["SKINFIT_BUDGET_TOLERANCE"]),
        field("retrieval.embedding_dim", retrieval.embedding_dim.to_string(), &["SKINFIT_RETRIEVAL_EMBEDDING_DIM"]),
        field(
            "retrieval.similarity_floor",
            retrieval.similarity_floor.to_string(),
            &["SKINFIT_RETRIEVAL_SIMILARITY_FLOOR"],
        ),
        field("retrieval.default_k", retrieval.default_k.to_string(), &["SKINFIT_RETRIEVAL_DEFAULT_K"]),
        field("retrieval.max_k", retrieval.max_k.to_string(), &["SKINFIT_RETRIEVAL_MAX_K"]),
        field("retrieval.timeout_ms", retrieval.timeout_ms.to_string(), &["SKINFIT_RETRIEVAL_TIMEOUT_MS"]),
        field(
            "retrieval.cache_ttl_secs",
            retrieval.cache_ttl_secs.to_string(),
            &["SKINFIT_RETRIEVAL_CACHE_TTL_SECS"],
        ),
        field("logging.level", config.logging.level.clone(), &["SKINFIT_LOGGING_LEVEL", "SKINFIT_LOG_LEVEL"]),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["SKINFIT_LOGGING_FORMAT", "SKINFIT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields {
        let source =
            field_source(field.key_path, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key_path, &field.value, source));
    }

    for (code, rate) in &config.currency.rates {
        let key_path = format!("currency.rates.{code}");
        let source = field_source(&key_path, &[], config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(&key_path, &rate.to_string(), source));
    }

    lines.join("\n")
}

fn field(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigField {
    ConfigField { key_path, value, env_keys }
}

struct ConfigField {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("skinfit.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/skinfit.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

/// Currency codes are normalized to upper case on load, so the last segment matches case-insensitively.
fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let next = current.get(key).or_else(|| {
            current.as_table().and_then(|table| {
                table.iter().find(|(name, _)| name.trim().eq_ignore_ascii_case(key)).map(|(_, value)| value)
            })
        });
        let Some(next) = next else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
