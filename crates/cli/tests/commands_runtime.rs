use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use skinfit_cli::commands::similar::{QuerySource, SimilarArgs};
use skinfit_cli::commands::{config, conflicts, doctor, evaluate, score, similar};
use skinfit_core::config::LoadOptions;
use tempfile::TempDir;

const REPAIR_TURN: &str = r#"{
    "profile": {
        "skin_types": ["dry"],
        "goals": [{ "track": "repair", "priority": 1 }],
        "budget": { "total_monthly": "30", "currency": "USD" }
    },
    "catalog": [
        { "id": "wash", "brand": "Plain", "name": "Gentle Wash", "category": "cleanser", "price": "5",
          "mechanism_scores": { "repair": 0.5 } },
        { "id": "spf", "brand": "Plain", "name": "Daily SPF", "category": "sunscreen", "price": "8",
          "mechanism_scores": { "repair": 0.5 } },
        { "id": "cream-rich", "brand": "Plain", "name": "Rich Cream", "category": "moisturizer", "price": "12",
          "mechanism_scores": { "repair": 0.9 } },
        { "id": "cream-basic", "brand": "Plain", "name": "Basic Cream", "category": "moisturizer", "price": "7",
          "mechanism_scores": { "repair": 0.5 } },
        { "id": "serum-premium", "brand": "Plain", "name": "Premium Serum", "category": "treatment", "price": "15",
          "mechanism_scores": { "repair": 0.9 } },
        { "id": "serum-lite", "brand": "Plain", "name": "Lite Serum", "category": "treatment", "price": "12",
          "mechanism_scores": { "repair": 0.6 } }
    ],
    "embeddings": {
        "wash": [1.0, 0.0, 0.0],
        "spf": [0.9, 0.1, 0.0],
        "cream-basic": [0.0, 1.0, 0.0]
    }
}"#;

#[test]
fn evaluate_repairs_an_over_budget_routine() {
    let (_dir, request) = write_request(REPAIR_TURN);

    with_env(&[], || {
        let result = evaluate::run(&LoadOptions::default(), &request);
        assert_eq!(result.exit_code, 0, "unexpected failure: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "evaluate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["primary"]["cost"]["known_total"], "40");

        let repair = &payload["data"]["repair"];
        assert_eq!(repair["fits_budget"], true);
        assert_eq!(repair["actions"][0]["action"], "swap_moisturizer");
        assert!(payload["message"].as_str().is_some_and(|message| message.contains("fits the budget")));
    });
}

#[test]
fn evaluate_rejects_malformed_request() {
    let (_dir, request) = write_request("{ not json");

    with_env(&[], || {
        let result = evaluate::run(&LoadOptions::default(), &request);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_request");
    });
}

#[test]
fn evaluate_reports_config_validation_failure() {
    let (_dir, request) = write_request(REPAIR_TURN);

    with_env(&[("SKINFIT_RETRIEVAL_DEFAULT_K", "50")], || {
        let result = evaluate::run(&LoadOptions::default(), &request);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "evaluate");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn evaluate_rejects_unknown_budget_currency() {
    let (_dir, request) = write_request(&REPAIR_TURN.replace("\"currency\": \"USD\"", "\"currency\": \"XYZ\""));

    with_env(&[], || {
        let result = evaluate::run(&LoadOptions::default(), &request);
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "domain_contract");
    });
}

#[test]
fn score_returns_breakdowns_best_first() {
    let (_dir, request) = write_request(REPAIR_TURN);

    with_env(&[], || {
        let result = score::run(&LoadOptions::default(), &request);
        assert_eq!(result.exit_code, 0, "unexpected failure: {}", result.output);

        let payload = parse_payload(&result.output);
        let scores = payload["data"].as_array().expect("score array");
        assert_eq!(scores.len(), 6);

        let totals: Vec<f64> =
            scores.iter().map(|score| score["breakdown"]["total"].as_f64().expect("total")).collect();
        assert!(totals.windows(2).all(|pair| pair[0] >= pair[1]));
    });
}

#[test]
fn similar_excludes_the_anchor_and_ranks_by_similarity() {
    let (_dir, request) = write_request(REPAIR_TURN);

    with_env(&[("SKINFIT_RETRIEVAL_EMBEDDING_DIM", "3")], || {
        let args = SimilarArgs {
            request: request.clone(),
            source: QuerySource::Anchor("wash".to_string()),
            k: Some(2),
            region: None,
            cheaper: false,
        };
        let result = similar::run(&LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 0, "unexpected failure: {}", result.output);

        let payload = parse_payload(&result.output);
        let matches = payload["data"]["matches"].as_array().expect("matches");
        assert!(!matches.is_empty());
        assert_eq!(matches[0]["item"]["id"], "spf");
        assert!(matches.iter().all(|candidate| candidate["item"]["id"] != "wash"));
        assert_eq!(payload["data"]["degraded"], false);
    });
}

#[test]
fn similar_rejects_unreadable_embedding_file() {
    let (dir, request) = write_request(REPAIR_TURN);
    let embedding = dir.path().join("query.json");
    fs::write(&embedding, "\"not an array\"").expect("write embedding");

    with_env(&[], || {
        let args = SimilarArgs {
            request: request.clone(),
            source: QuerySource::EmbeddingFile(embedding.clone()),
            k: None,
            region: None,
            cheaper: false,
        };
        let result = similar::run(&LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_request");
    });
}

#[test]
fn conflicts_against_mode_flags_cross_set_pairs() {
    let candidate = vec!["Benzoyl Peroxide".to_string()];
    let existing = vec!["Tretinoin".to_string(), "Ceramides".to_string()];

    let result = conflicts::run(&candidate, Some(&existing));
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    let findings = payload["data"].as_array().expect("findings");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["severity"], "avoid");
}

#[test]
fn doctor_json_reports_request_check() {
    let (_dir, request) = write_request(REPAIR_TURN);

    with_env(&[], || {
        let output = doctor::run(&LoadOptions::default(), true, Some(request.as_path()));
        let payload = parse_payload(&output);

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks");
        let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(names, vec!["config_validation", "engine_assembly", "request_file"]);
    });
}

#[test]
fn doctor_fails_when_config_is_invalid() {
    with_env(&[("SKINFIT_ENGINE_REFERENCE_CURRENCY", "dollars")], || {
        let output = doctor::run(&LoadOptions::default(), false, None);

        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation"));
        assert!(output.contains("- [skip] engine_assembly"));
        assert!(output.contains("- [skip] request_file"));
    });
}

#[test]
fn config_attributes_env_and_file_sources() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("skinfit.toml");
    fs::write(&path, "[budget]\nlow_tier_cap = 40\n").expect("write config");

    with_env(&[("SKINFIT_LOG_LEVEL", "debug")], || {
        let options = LoadOptions { config_path: Some(path.clone()), require_file: true, ..LoadOptions::default() };
        let output = config::run(&options);

        assert!(output.contains("- logging.level = debug (source: env (SKINFIT_LOG_LEVEL))"));
        assert!(output.contains(&format!("- budget.low_tier_cap = 40 (source: file ({}))", path.display())));
        assert!(output.contains("- retrieval.max_k = 20 (source: default)"));
    });
}

fn write_request(raw: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("turn.json");
    write_file(&path, raw);
    (dir, path)
}

fn write_file(path: &Path, raw: &str) {
    fs::write(path, raw).expect("write request");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SKINFIT_ENGINE_REFERENCE_CURRENCY",
        "SKINFIT_ENGINE_LOW_BUDGET_THRESHOLD",
        "SKINFIT_ENGINE_VETO_BURN_RATE",
        "SKINFIT_ENGINE_SCIENCE_WEIGHT",
        "SKINFIT_ENGINE_SOCIAL_WEIGHT",
        "SKINFIT_ENGINE_ENGINEERING_WEIGHT",
        "SKINFIT_ENGINE_SENSITIVE_SKIN_VETO",
        "SKINFIT_BUDGET_LOW_TIER_CAP",
        "SKINFIT_BUDGET_MID_TIER_CAP",
        "SKINFIT_BUDGET_TOLERANCE",
        "SKINFIT_RETRIEVAL_EMBEDDING_DIM",
        "SKINFIT_RETRIEVAL_SIMILARITY_FLOOR",
        "SKINFIT_RETRIEVAL_DEFAULT_K",
        "SKINFIT_RETRIEVAL_MAX_K",
        "SKINFIT_RETRIEVAL_TIMEOUT_MS",
        "SKINFIT_RETRIEVAL_CACHE_TTL_SECS",
        "SKINFIT_LOGGING_LEVEL",
        "SKINFIT_LOGGING_FORMAT",
        "SKINFIT_LOG_LEVEL",
        "SKINFIT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
