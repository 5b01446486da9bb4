use std::path::Path;

use serde::Serialize;
use skinfit_core::config::{AppConfig, LoadOptions};
use skinfit_core::DecisionEngine;

use crate::commands::request::TurnRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool, request_path: Option<&Path>) -> String {
    let report = build_report(options, request_path);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: &LoadOptions, request_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_engine_assembly(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "engine_assembly",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    checks.push(check_request(request_path));

    let overall_status = if checks.iter().any(|check| check.status == CheckStatus::Fail) {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    };
    let summary = if overall_status == CheckStatus::Pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_engine_assembly(config: &AppConfig) -> DoctorCheck {
    match DecisionEngine::from_config(config) {
        Ok(_) => DoctorCheck {
            name: "engine_assembly",
            status: CheckStatus::Pass,
            details: format!(
                "scorer, routine builder and negotiator built (reference currency {})",
                config.engine.reference_currency
            ),
        },
        Err(error) => {
            DoctorCheck { name: "engine_assembly", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_request(request_path: Option<&Path>) -> DoctorCheck {
    let Some(path) = request_path else {
        return DoctorCheck {
            name: "request_file",
            status: CheckStatus::Skipped,
            details: "no request file given".to_string(),
        };
    };

    match TurnRequest::load(path) {
        Ok(request) => DoctorCheck {
            name: "request_file",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` parsed with {} catalog item(s) and {} embedding(s)",
                path.display(),
                request.catalog.len(),
                request.embeddings.len()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "request_file", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
