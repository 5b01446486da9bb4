use std::path::Path;

use skinfit_core::config::{AppConfig, LoadOptions};
use skinfit_core::{ApplicationError, DeterministicFitScorer, FitScorer, ItemScore};
use tracing::debug;

use crate::commands::request::TurnRequest;
use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "score";

pub fn run(options: &LoadOptions, request_path: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    match score_catalog(&config, request_path) {
        Ok(scores) => {
            let vetoed = scores.iter().filter(|score| score.breakdown.vetoed).count();
            let message = format!("scored {} item(s); {vetoed} vetoed", scores.len());
            CommandResult::with_data(COMMAND, message, &scores)
        }
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

/// Breakdowns for every catalog item, best fit first.
fn score_catalog(config: &AppConfig, request_path: &Path) -> Result<Vec<ItemScore>, ApplicationError> {
    let scorer = DeterministicFitScorer::new(config.scoring_policy())
        .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
    let prepared = TurnRequest::load(request_path)?.prepare();

    let mut scores: Vec<ItemScore> = prepared
        .catalog
        .items()
        .iter()
        .map(|item| ItemScore { item_id: item.id.clone(), breakdown: scorer.score(item, &prepared.profile) })
        .collect();
    scores.sort_by(|left, right| {
        right.breakdown.total.total_cmp(&left.breakdown.total).then_with(|| left.item_id.cmp(&right.item_id))
    });

    debug!(event_name = "cli.score.completed", scored = scores.len(), "catalog scored");
    Ok(scores)
}
