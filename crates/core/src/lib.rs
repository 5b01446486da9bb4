pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;

pub use domain::evidence::{EvidenceIndex, EvidencePack, EvidenceSnippet, SnippetTopic};
pub use domain::item::{Catalog, Category, Item, ItemId, MechanismScores, MechanismTrack, RiskFlag};
pub use domain::money::CurrencyTable;
pub use domain::profile::{BarrierStatus, Budget, BudgetStrategy, Goal, SkinType, UserProfile};
pub use domain::routine::{
    BudgetRepairOutcome, QuerySignals, RepairAction, RoutineCost, RoutineLocks, RoutineRec, Slot, Step,
};
pub use engine::budget::{BudgetNegotiation, BudgetNegotiator, BudgetTier, BudgetTierPolicy, SwapSuggestion};
pub use engine::conflicts::{ConflictDetector, ConflictFinding, ConflictSeverity, RuleTableConflictDetector};
pub use engine::retrieval::{
    InMemoryIndex, NearestNeighborIndex, RetrievalDiagnostic, RetrievalPolicy, SimilarityOutcome,
    SimilarityQuery, SimilarityRetriever,
};
pub use engine::routine::{RoutineBuilder, RoutinePolicy, RoutineRequest};
pub use engine::scoring::{DeterministicFitScorer, FitScorer, ScoreBreakdown, ScoringPolicy};
pub use engine::{DecisionEngine, DecisionRuntime, ItemScore, TurnEvaluation, TurnInput};
pub use errors::{ApplicationError, DomainError};
