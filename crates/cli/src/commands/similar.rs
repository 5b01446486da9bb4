use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skinfit_core::config::{AppConfig, LoadOptions};
use skinfit_core::{ApplicationError, SimilarityOutcome, SimilarityQuery, SimilarityRetriever};
use tracing::{info, warn};

use crate::commands::request::TurnRequest;
use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "similar";

#[derive(Clone, Debug)]
pub enum QuerySource {
    Anchor(String),
    EmbeddingFile(PathBuf),
}

#[derive(Clone, Debug)]
pub struct SimilarArgs {
    pub request: PathBuf,
    pub source: QuerySource,
    pub k: Option<usize>,
    pub region: Option<String>,
    pub cheaper: bool,
}

pub fn run(options: &LoadOptions, args: &SimilarArgs) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                5,
            );
        }
    };

    match runtime.block_on(find_similar(&config, args)) {
        Ok(outcome) => {
            let mut message = format!("{} similar item(s)", outcome.matches.len());
            if outcome.degraded {
                message.push_str(" from the fallback pool");
            }
            CommandResult::with_data(COMMAND, message, &outcome)
        }
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

async fn find_similar(config: &AppConfig, args: &SimilarArgs) -> Result<SimilarityOutcome, ApplicationError> {
    let prepared = TurnRequest::load(&args.request)?.prepare();
    let (index, truncated) = prepared.index(config.retrieval.embedding_dim);
    if !truncated.is_empty() {
        warn!(
            event_name = "cli.similar.embeddings_truncated",
            count = truncated.len(),
            dimension = config.retrieval.embedding_dim,
            "catalog embeddings did not match the configured dimension"
        );
    }

    let currencies = config.currency_table().map_err(|error| ApplicationError::Configuration(error.to_string()))?;
    let retriever = SimilarityRetriever::new(Arc::new(index), config.retrieval_policy(), currencies)
        .with_cache(Arc::new(config.similarity_cache()));

    let mut query = match &args.source {
        QuerySource::Anchor(item_id) => SimilarityQuery::anchor(item_id.trim()),
        QuerySource::EmbeddingFile(path) => SimilarityQuery::embedding(read_embedding(path)?),
    };
    if let Some(k) = args.k {
        query = query.with_k(k);
    }
    if let Some(region) = &args.region {
        query = query.in_region(region.as_str());
    }
    if args.cheaper {
        query = query.cheaper();
    }

    let outcome = retriever.find_similar(&prepared.catalog, &query).await;
    info!(
        event_name = "cli.similar.completed",
        matches = outcome.matches.len(),
        degraded = outcome.degraded,
        diagnostics = outcome.diagnostics.len(),
        "similarity lookup finished"
    );
    Ok(outcome)
}

fn read_embedding(path: &Path) -> Result<Vec<f32>, ApplicationError> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ApplicationError::InvalidRequest(format!("could not read `{}`: {error}", path.display()))
    })?;
    let embedding: Vec<f32> = serde_json::from_str(&raw)
        .map_err(|error| ApplicationError::InvalidRequest(format!("embedding must be a JSON array: {error}")))?;
    if embedding.is_empty() {
        return Err(ApplicationError::InvalidRequest("embedding is empty".to_string()));
    }
    Ok(embedding)
}
