use std::path::Path;

use skinfit_core::config::{AppConfig, LoadOptions};
use skinfit_core::{ApplicationError, DecisionEngine, DecisionRuntime, TurnEvaluation};
use tracing::info;
use uuid::Uuid;

use crate::commands::request::TurnRequest;
use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "evaluate";

pub fn run(options: &LoadOptions, request_path: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    match evaluate(&config, request_path) {
        Ok(evaluation) => CommandResult::with_data(COMMAND, summarize(&evaluation), &evaluation),
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

fn evaluate(config: &AppConfig, request_path: &Path) -> Result<TurnEvaluation, ApplicationError> {
    let correlation_id = Uuid::new_v4();
    let engine = DecisionEngine::from_config(config)?;
    let prepared = TurnRequest::load(request_path)?.prepare();

    let evaluation = engine.evaluate_turn(&prepared.input())?;

    let routine = evaluation.final_routine();
    info!(
        event_name = "cli.evaluate.completed",
        correlation_id = %correlation_id,
        catalog_size = prepared.catalog.len(),
        known_total = %routine.cost.known_total,
        unknown_count = routine.cost.unknown_count,
        repaired = evaluation.repair.is_some(),
        conflicts = evaluation.conflicts.len(),
        "turn evaluated"
    );

    Ok(evaluation)
}

fn summarize(evaluation: &TurnEvaluation) -> String {
    let routine = evaluation.final_routine();
    let mut message = format!(
        "routine built with {} AM and {} PM steps; known total {} {}",
        routine.am.len(),
        routine.pm.len(),
        routine.cost.known_total,
        routine.cost.currency
    );
    if routine.cost.unknown_count > 0 {
        message.push_str(&format!(" (+{} unpriced)", routine.cost.unknown_count));
    }
    if let Some(repair) = &evaluation.repair {
        let verdict = if repair.fits_budget { "fits" } else { "still exceeds" };
        message.push_str(&format!("; budget repair {verdict} the budget"));
    }
    if !evaluation.conflicts.is_empty() {
        message.push_str(&format!("; {} conflict(s) flagged", evaluation.conflicts.len()));
    }
    message
}
