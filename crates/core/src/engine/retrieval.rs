//! Similar and cheaper alternatives via a nearest-neighbor index.
//!
//! `find_similar` never fails: index errors and timeouts degrade to a
//! deterministic catalog-ordered fallback with a diagnostic attached.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::item::{Catalog, Item, ItemId};
use crate::domain::money::CurrencyTable;
use crate::engine::cache::SimilarityCache;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("nearest-neighbor lookup timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("nearest-neighbor index failed: {0}")]
    Index(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub item_id: ItemId,
    pub similarity: f32,
}

/// External vector index. Implementations own their storage and transport.
#[async_trait]
pub trait NearestNeighborIndex: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embedding_for(&self, item_id: &ItemId) -> Result<Option<Vec<f32>>, RetrievalError>;

    /// Up to `limit` neighbors, most similar first.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, RetrievalError>;
}

/// Brute-force cosine index held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIndex {
    dimension: usize,
    vectors: BTreeMap<ItemId, Vec<f32>>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, vectors: BTreeMap::new() }
    }

    /// Stores `embedding` fitted to the index dimension.
    pub fn insert(&mut self, item_id: ItemId, embedding: &[f32]) -> Option<RetrievalDiagnostic> {
        let (vector, diagnostic) = fit_dimension(embedding, self.dimension);
        self.vectors.insert(item_id, vector);
        diagnostic
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[async_trait]
impl NearestNeighborIndex for InMemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embedding_for(&self, item_id: &ItemId) -> Result<Option<Vec<f32>>, RetrievalError> {
        Ok(self.vectors.get(item_id).cloned())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, RetrievalError> {
        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .map(|(item_id, vector)| Neighbor {
                item_id: item_id.clone(),
                similarity: cosine_similarity(query, vector),
            })
            .collect();
        neighbors.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.item_id.cmp(&b.item_id)));
        neighbors.truncate(limit);
        Ok(neighbors)
    }
}

/// Zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Pads with zeros or truncates to `dimension`. Non-finite components become zero.
///
/// A diagnostic is returned only when truncation drops non-zero values.
pub fn fit_dimension(embedding: &[f32], dimension: usize) -> (Vec<f32>, Option<RetrievalDiagnostic>) {
    let mut vector: Vec<f32> =
        embedding.iter().map(|value| if value.is_finite() { *value } else { 0.0 }).collect();

    let lossy = vector.len() > dimension && vector[dimension..].iter().any(|value| *value != 0.0);
    let original = vector.len();
    vector.resize(dimension, 0.0);

    let diagnostic = lossy.then_some(RetrievalDiagnostic::EmbeddingTruncated { from: original, to: dimension });
    (vector, diagnostic)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalDiagnostic {
    EmbeddingTruncated { from: usize, to: usize },
    AnchorNotFound { item_id: ItemId },
    AnchorEmbeddingMissing { item_id: ItemId },
    RegionFallback { region: String },
    CheaperFilterSkipped { item_id: ItemId },
    IndexUnavailable { reason: String },
    CacheHit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryTarget {
    Embedding(Vec<f32>),
    Anchor(ItemId),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    pub target: QueryTarget,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub cheaper_than_anchor: bool,
}

impl SimilarityQuery {
    pub fn anchor(item_id: impl Into<String>) -> Self {
        Self::new(QueryTarget::Anchor(ItemId::new(item_id)))
    }

    pub fn embedding(vector: Vec<f32>) -> Self {
        Self::new(QueryTarget::Embedding(vector))
    }

    fn new(target: QueryTarget) -> Self {
        Self { target, k: None, region: None, cheaper_than_anchor: false }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn cheaper(mut self) -> Self {
        self.cheaper_than_anchor = true;
        self
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref().map(str::trim).filter(|region| !region.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub item: Item,
    pub similarity: f32,
    pub reference_price: Option<Decimal>,
    pub availability: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityOutcome {
    pub matches: Vec<SimilarMatch>,
    pub diagnostics: Vec<RetrievalDiagnostic>,
    /// Served from the fallback pool rather than the index.
    pub degraded: bool,
}

impl SimilarityOutcome {
    fn is_cacheable(&self) -> bool {
        !self.degraded
            && !self
                .diagnostics
                .iter()
                .any(|diagnostic| matches!(diagnostic, RetrievalDiagnostic::AnchorNotFound { .. }))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalPolicy {
    pub similarity_floor: f32,
    pub default_k: usize,
    pub max_k: usize,
    pub timeout: Duration,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self { similarity_floor: 0.0, default_k: 5, max_k: 20, timeout: Duration::from_millis(1500) }
    }
}

impl RetrievalPolicy {
    pub fn clamp_k(&self, k: Option<usize>) -> usize {
        k.unwrap_or(self.default_k).clamp(1, self.max_k.max(1))
    }
}

pub struct SimilarityRetriever {
    index: Arc<dyn NearestNeighborIndex>,
    policy: RetrievalPolicy,
    currencies: CurrencyTable,
    cache: Option<Arc<SimilarityCache>>,
}

impl SimilarityRetriever {
    pub fn new(index: Arc<dyn NearestNeighborIndex>, policy: RetrievalPolicy, currencies: CurrencyTable) -> Self {
        Self { index, policy, currencies, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<SimilarityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn find_similar(&self, catalog: &Catalog, query: &SimilarityQuery) -> SimilarityOutcome {
        let k = self.policy.clamp_k(query.k);
        let key = self.cache.as_ref().map(|_| cache_key(catalog, query, k, self.index.dimension()));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key, Utc::now()) {
                debug!(event_name = "engine.retrieval.cache_hit", cache_key = %key, "similarity cache hit");
                let mut outcome = SimilarityOutcome::clone(&hit);
                outcome.diagnostics.push(RetrievalDiagnostic::CacheHit);
                return outcome;
            }
        }

        let outcome = self.resolve(catalog, query, k).await;
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if outcome.is_cacheable() {
                cache.insert(key, outcome.clone(), Utc::now());
            }
        }
        outcome
    }

    async fn resolve(&self, catalog: &Catalog, query: &SimilarityQuery, k: usize) -> SimilarityOutcome {
        let dimension = self.index.dimension();
        let mut diagnostics = Vec::new();

        let (anchor, raw) = match &query.target {
            QueryTarget::Embedding(raw) => (None, raw.clone()),
            QueryTarget::Anchor(item_id) => {
                let Some(anchor) = catalog.find(item_id) else {
                    return SimilarityOutcome {
                        matches: Vec::new(),
                        diagnostics: vec![RetrievalDiagnostic::AnchorNotFound { item_id: item_id.clone() }],
                        degraded: false,
                    };
                };
                match self.bounded(self.index.embedding_for(item_id)).await {
                    Ok(Some(raw)) => (Some(anchor), raw),
                    Ok(None) => {
                        diagnostics
                            .push(RetrievalDiagnostic::AnchorEmbeddingMissing { item_id: item_id.clone() });
                        return self.fallback(catalog, Some(anchor), query, k, diagnostics, None);
                    }
                    Err(error) => {
                        return self.fallback(catalog, Some(anchor), query, k, diagnostics, Some(error));
                    }
                }
            }
        };

        let (vector, truncated) = fit_dimension(&raw, dimension);
        if let Some(diagnostic) = truncated {
            warn!(
                event_name = "engine.retrieval.embedding_truncated",
                from = raw.len(),
                to = dimension,
                "query embedding truncated to index dimension"
            );
            diagnostics.push(diagnostic);
        }

        let neighbors = match self.bounded(self.index.search(&vector, catalog.len() + 1)).await {
            Ok(neighbors) => neighbors,
            Err(error) => return self.fallback(catalog, anchor, query, k, diagnostics, Some(error)),
        };

        let mut ranked: Vec<SimilarMatch> = neighbors
            .into_iter()
            .filter(|neighbor| anchor.map_or(true, |anchor| anchor.id != neighbor.item_id))
            .filter(|neighbor| neighbor.similarity.is_finite())
            .filter_map(|neighbor| {
                let similarity = neighbor.similarity.clamp(0.0, 1.0);
                if similarity < self.policy.similarity_floor {
                    return None;
                }
                catalog.find(&neighbor.item_id).map(|item| self.to_match(item, similarity))
            })
            .collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.item.id.cmp(&b.item.id)));

        let filtered = self.cheaper_filter(ranked, anchor, query, &mut diagnostics);
        let mut matches = region_filter(filtered, query.region(), &mut diagnostics);
        matches.truncate(k);

        SimilarityOutcome { matches, diagnostics, degraded: false }
    }

    /// Same category as the anchor first, then cheapest known price, then id.
    fn fallback(
        &self,
        catalog: &Catalog,
        anchor: Option<&Item>,
        query: &SimilarityQuery,
        k: usize,
        mut diagnostics: Vec<RetrievalDiagnostic>,
        error: Option<RetrievalError>,
    ) -> SimilarityOutcome {
        if let Some(error) = error {
            warn!(
                event_name = "engine.retrieval.fallback",
                error = %error,
                "nearest-neighbor index unavailable; serving fallback pool"
            );
            diagnostics.push(RetrievalDiagnostic::IndexUnavailable { reason: error.to_string() });
        }

        let anchor_category = anchor.map(|anchor| anchor.category);
        let mut pool: Vec<SimilarMatch> = catalog
            .items()
            .iter()
            .filter(|item| anchor.map_or(true, |anchor| anchor.id != item.id))
            .map(|item| self.to_match(item, 0.0))
            .collect();
        pool.sort_by(|a, b| {
            let a_same = Some(a.item.category) == anchor_category;
            let b_same = Some(b.item.category) == anchor_category;
            b_same
                .cmp(&a_same)
                .then_with(|| price_order(a.reference_price, b.reference_price))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        let filtered = self.cheaper_filter(pool, anchor, query, &mut diagnostics);
        let mut matches = region_filter(filtered, query.region(), &mut diagnostics);
        matches.truncate(k);

        SimilarityOutcome { matches, diagnostics, degraded: true }
    }

    /// Applies only when the anchor's price is known.
    fn cheaper_filter(
        &self,
        matches: Vec<SimilarMatch>,
        anchor: Option<&Item>,
        query: &SimilarityQuery,
        diagnostics: &mut Vec<RetrievalDiagnostic>,
    ) -> Vec<SimilarMatch> {
        if !query.cheaper_than_anchor {
            return matches;
        }
        let Some(anchor) = anchor else {
            return matches;
        };
        match self.currencies.reference_price(anchor.price, &anchor.currency) {
            Some(anchor_price) => matches
                .into_iter()
                .filter(|candidate| candidate.reference_price.is_some_and(|price| price < anchor_price))
                .collect(),
            None => {
                diagnostics.push(RetrievalDiagnostic::CheaperFilterSkipped { item_id: anchor.id.clone() });
                matches
            }
        }
    }

    fn to_match(&self, item: &Item, similarity: f32) -> SimilarMatch {
        SimilarMatch {
            item: item.clone(),
            similarity,
            reference_price: self.currencies.reference_price(item.price, &item.currency),
            availability: item.availability.clone(),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RetrievalError>>,
    ) -> Result<T, RetrievalError> {
        match tokio::time::timeout(self.policy.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout {
                after_ms: u64::try_from(self.policy.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Keeps regional items; an empty regional list falls back to the unfiltered one.
fn region_filter(
    matches: Vec<SimilarMatch>,
    region: Option<&str>,
    diagnostics: &mut Vec<RetrievalDiagnostic>,
) -> Vec<SimilarMatch> {
    let Some(region) = region else {
        return matches;
    };
    let local: Vec<SimilarMatch> =
        matches.iter().filter(|candidate| candidate.item.is_available_in(region)).cloned().collect();
    if local.is_empty() && !matches.is_empty() {
        diagnostics.push(RetrievalDiagnostic::RegionFallback { region: region.to_owned() });
        return matches;
    }
    local
}

fn price_order(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Query key: fitted-vector or exact anchor-id digest, k, lower-cased region, flag and catalog digest.
///
/// Anchor ids match case-sensitively in the catalog, so they are hashed byte for byte.
pub fn cache_key(catalog: &Catalog, query: &SimilarityQuery, k: usize, dimension: usize) -> String {
    let target = match &query.target {
        QueryTarget::Embedding(raw) => {
            let (vector, _) = fit_dimension(raw, dimension);
            let mut hasher = blake3::Hasher::new();
            for value in &vector {
                hasher.update(&value.to_le_bytes());
            }
            format!("embedding:{}", hasher.finalize().to_hex())
        }
        QueryTarget::Anchor(item_id) => {
            format!("anchor:{}", blake3::hash(item_id.as_str().as_bytes()).to_hex())
        }
    };
    let region = query.region().map(str::to_lowercase).unwrap_or_else(|| "*".to_owned());
    format!(
        "{target}|k={k}|region={region}|cheaper={}|catalog={}",
        query.cheaper_than_anchor,
        catalog_digest(catalog)
    )
}

/// Changes whenever any item in the catalog changes.
fn catalog_digest(catalog: &Catalog) -> String {
    let mut hasher = blake3::Hasher::new();
    for item in catalog.items() {
        hasher.update(format!("{item:?}").as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().as_str()[..16].to_owned()
}
