//! JSON turn request shared by the `evaluate`, `score` and `similar` commands.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use skinfit_core::engine::actives::enrich_item;
use skinfit_core::{
    ApplicationError, Catalog, EvidenceIndex, EvidencePack, InMemoryIndex, Item, ItemId,
    QuerySignals, RetrievalDiagnostic, RoutineLocks, TurnInput, UserProfile,
};

#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub item: Item,
    /// Raw INCI list; folded into flags, actives and burn rate when present.
    #[serde(default)]
    pub ingredients: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub profile: UserProfile,
    pub catalog: Vec<CatalogEntry>,
    #[serde(default)]
    pub signals: QuerySignals,
    #[serde(default)]
    pub locks: RoutineLocks,
    /// Monthly budget in reference units; overrides the profile's budget.
    #[serde(default)]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub evidence: Vec<EvidencePack>,
    #[serde(default)]
    pub current_actives: Vec<String>,
    #[serde(default)]
    pub embeddings: BTreeMap<String, Vec<f32>>,
}

/// Request with its catalog enriched and its evidence indexed, ready to borrow as a turn.
#[derive(Debug)]
pub struct PreparedTurn {
    pub profile: UserProfile,
    pub catalog: Catalog,
    pub signals: QuerySignals,
    pub locks: RoutineLocks,
    pub budget: Option<Decimal>,
    pub evidence: EvidenceIndex,
    pub current_actives: Vec<String>,
    pub embeddings: BTreeMap<String, Vec<f32>>,
}

impl TurnRequest {
    pub fn load(path: &Path) -> Result<Self, ApplicationError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            ApplicationError::InvalidRequest(format!("could not read `{}`: {error}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ApplicationError> {
        let request: Self = serde_json::from_str(raw)
            .map_err(|error| ApplicationError::InvalidRequest(format!("malformed turn request: {error}")))?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<(), ApplicationError> {
        self.profile.validate()?;

        let mut seen = BTreeSet::new();
        for entry in &self.catalog {
            if entry.item.id.as_str().trim().is_empty() {
                return Err(ApplicationError::InvalidRequest("catalog item with an empty id".to_string()));
            }
            if !seen.insert(entry.item.id.as_str()) {
                return Err(ApplicationError::InvalidRequest(format!(
                    "catalog item `{}` appears more than once",
                    entry.item.id
                )));
            }
        }

        if let Some(unknown) = self.embeddings.keys().find(|id| !seen.contains(id.as_str())) {
            return Err(ApplicationError::InvalidRequest(format!(
                "embedding for `{unknown}` has no catalog item"
            )));
        }

        Ok(())
    }

    pub fn prepare(self) -> PreparedTurn {
        let items = self
            .catalog
            .into_iter()
            .map(|entry| {
                let mut item = entry.item;
                if let Some(ingredients) = entry.ingredients.as_deref() {
                    enrich_item(&mut item, ingredients);
                }
                item
            })
            .collect();

        PreparedTurn {
            profile: self.profile,
            catalog: Catalog::new(items),
            signals: self.signals,
            locks: self.locks,
            budget: self.budget,
            evidence: EvidenceIndex::new(self.evidence),
            current_actives: self.current_actives,
            embeddings: self.embeddings,
        }
    }
}

impl PreparedTurn {
    pub fn input(&self) -> TurnInput<'_> {
        TurnInput {
            catalog: &self.catalog,
            user: &self.profile,
            signals: &self.signals,
            locks: &self.locks,
            evidence: &self.evidence,
            budget: self.budget,
            current_actives: &self.current_actives,
        }
    }

    /// Brute-force index over the request's embeddings, plus any truncation diagnostics.
    pub fn index(&self, dimension: usize) -> (InMemoryIndex, Vec<RetrievalDiagnostic>) {
        let mut index = InMemoryIndex::new(dimension);
        let diagnostics = self
            .embeddings
            .iter()
            .filter_map(|(item_id, embedding)| index.insert(ItemId::new(item_id.as_str()), embedding))
            .collect();
        (index, diagnostics)
    }
}
