pub mod actives;
pub mod budget;
pub mod cache;
pub mod classify;
pub mod conflicts;
pub mod retrieval;
pub mod routine;
pub mod scoring;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::domain::evidence::EvidenceIndex;
use crate::domain::item::{Catalog, ItemId};
use crate::domain::profile::UserProfile;
use crate::domain::routine::{BudgetRepairOutcome, QuerySignals, RoutineLocks, RoutineRec};
use crate::errors::{ApplicationError, DomainError};

use self::budget::{BudgetNegotiation, BudgetNegotiator};
use self::conflicts::{ConflictDetector, ConflictFinding, RuleTableConflictDetector};
use self::routine::{RoutineBuilder, RoutineRequest};
use self::scoring::{DeterministicFitScorer, FitScorer, ScoreBreakdown};

/// Borrowed inputs for one conversational turn.
#[derive(Clone, Copy, Debug)]
pub struct TurnInput<'a> {
    pub catalog: &'a Catalog,
    pub user: &'a UserProfile,
    pub signals: &'a QuerySignals,
    pub locks: &'a RoutineLocks,
    pub evidence: &'a EvidenceIndex,
    /// Monthly budget in reference units; overrides the profile's budget.
    pub budget: Option<Decimal>,
    /// Actives the user already applies outside the recommended routine.
    pub current_actives: &'a [String],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemScore {
    pub item_id: ItemId,
    pub breakdown: ScoreBreakdown,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnEvaluation {
    /// Every catalog item, best total first, ties by id.
    pub scores: Vec<ItemScore>,
    pub primary: RoutineRec,
    /// Present only when the primary routine's known cost exceeds the budget.
    pub repair: Option<BudgetRepairOutcome>,
    /// Conflicts within the final routine (repaired when a repair ran).
    pub conflicts: Vec<ConflictFinding>,
    /// Conflicts between the final routine and `current_actives`.
    pub current_routine_conflicts: Vec<ConflictFinding>,
    pub negotiation: Option<BudgetNegotiation>,
}

impl TurnEvaluation {
    pub fn final_routine(&self) -> &RoutineRec {
        self.repair.as_ref().map_or(&self.primary, |outcome| &outcome.routine)
    }
}

pub trait DecisionRuntime: Send + Sync {
    fn evaluate_turn(&self, input: &TurnInput<'_>) -> Result<TurnEvaluation, DomainError>;
}

pub struct DecisionEngine<S = DeterministicFitScorer, D = RuleTableConflictDetector> {
    builder: RoutineBuilder<S>,
    negotiator: BudgetNegotiator,
    detector: D,
}

impl<S, D> DecisionEngine<S, D> {
    pub fn new(builder: RoutineBuilder<S>, negotiator: BudgetNegotiator, detector: D) -> Self {
        Self { builder, negotiator, detector }
    }

    pub fn builder(&self) -> &RoutineBuilder<S> {
        &self.builder
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}

impl Default for DecisionEngine<DeterministicFitScorer, RuleTableConflictDetector> {
    fn default() -> Self {
        Self::new(RoutineBuilder::default(), BudgetNegotiator::default(), RuleTableConflictDetector)
    }
}

impl DecisionEngine<DeterministicFitScorer, RuleTableConflictDetector> {
    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let scorer = DeterministicFitScorer::new(config.scoring_policy()).map_err(configuration_error)?;
        let routine_policy = config.routine_policy().map_err(configuration_error)?;
        let negotiator = BudgetNegotiator::new(config.budget_policy()).map_err(configuration_error)?;
        Ok(Self::new(RoutineBuilder::new(scorer, routine_policy), negotiator, RuleTableConflictDetector))
    }
}

fn configuration_error(error: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Configuration(error.to_string())
}

impl<S, D> DecisionRuntime for DecisionEngine<S, D>
where
    S: FitScorer,
    D: ConflictDetector,
{
    fn evaluate_turn(&self, input: &TurnInput<'_>) -> Result<TurnEvaluation, DomainError> {
        input.user.validate()?;
        if input.budget.is_none() {
            input.user.budget.in_reference(&self.builder.policy().currencies)?;
        }

        let request = RoutineRequest::new(input.catalog, input.user)
            .with_signals(input.signals)
            .with_budget(input.budget)
            .with_locks(input.locks)
            .with_evidence(input.evidence);

        let mut scores: Vec<ItemScore> = input
            .catalog
            .items()
            .iter()
            .map(|item| ItemScore {
                item_id: item.id.clone(),
                breakdown: self.builder.scorer().score(item, input.user),
            })
            .collect();
        scores.sort_by(|a, b| {
            b.breakdown.total.total_cmp(&a.breakdown.total).then_with(|| a.item_id.cmp(&b.item_id))
        });

        let primary = self.builder.build(&request);
        let budget = self.builder.reference_budget(&request);

        let repair = budget
            .filter(|budget| primary.cost.known_total > *budget)
            .map(|budget| self.builder.repair(&request, &primary, budget));
        let negotiation = budget.map(|budget| {
            let floor = self.builder.build_floor(&request);
            self.negotiator.negotiate(&primary, &floor, budget)
        });

        let final_routine = repair.as_ref().map_or(&primary, |outcome| &outcome.routine);
        let conflicts = self.detector.detect_routine(final_routine, input.evidence);
        let current_routine_conflicts = if input.current_actives.is_empty() {
            Vec::new()
        } else {
            let routine_actives: Vec<String> = final_routine
                .unique_items()
                .into_iter()
                .flat_map(|item| input.evidence.actives_for(item))
                .collect();
            self.detector.detect_pair(&routine_actives, input.current_actives)
        };

        debug!(
            event_name = "engine.turn.evaluated",
            catalog_size = input.catalog.len(),
            primary_total = %primary.cost.known_total,
            repaired = repair.is_some(),
            conflicts = conflicts.len(),
            current_routine_conflicts = current_routine_conflicts.len(),
            "turn evaluated"
        );

        Ok(TurnEvaluation { scores, primary, repair, conflicts, current_routine_conflicts, negotiation })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{DecisionEngine, DecisionRuntime, TurnInput};
    use crate::domain::evidence::EvidenceIndex;
    use crate::domain::item::{Catalog, Category, Item, MechanismScores, MechanismTrack};
    use crate::domain::profile::{BarrierStatus, Budget, Goal, SkinType, UserProfile};
    use crate::domain::routine::{QuerySignals, RoutineLocks};
    use crate::engine::budget::BudgetNegotiator;
    use crate::engine::conflicts::{ConflictDetector, ConflictFinding, ConflictSeverity};
    use crate::engine::routine::RoutineBuilder;
    use crate::errors::DomainError;

    fn priced(id: &str, category: Category, price: i64, track: MechanismTrack, strength: f64) -> Item {
        let mut item = Item::new(id, id, category);
        item.price = Some(Decimal::new(price, 0));
        item.mechanism_scores = MechanismScores::default().with(track, strength);
        item
    }

    fn catalog() -> Catalog {
        let mut retinal = priced("retinal", Category::Treatment, 60, MechanismTrack::AntiAging, 0.9);
        retinal.key_actives = vec!["Retinal".to_owned()];
        Catalog::new(vec![
            priced("wash", Category::Cleanser, 12, MechanismTrack::Repair, 0.3),
            retinal,
            priced("cream", Category::Moisturizer, 20, MechanismTrack::Repair, 0.8),
            priced("spf", Category::Sunscreen, 18, MechanismTrack::Repair, 0.4),
        ])
    }

    fn user() -> UserProfile {
        UserProfile::new(
            [SkinType::Normal],
            BarrierStatus::Healthy,
            vec![Goal::new(MechanismTrack::AntiAging, 1), Goal::new(MechanismTrack::Repair, 2)],
        )
        .expect("valid profile")
    }

    fn input<'a>(
        catalog: &'a Catalog,
        user: &'a UserProfile,
        signals: &'a QuerySignals,
        locks: &'a RoutineLocks,
        evidence: &'a EvidenceIndex,
    ) -> TurnInput<'a> {
        TurnInput { catalog, user, signals, locks, evidence, budget: None, current_actives: &[] }
    }

    #[test]
    fn evaluate_turn_scores_every_item_best_first() {
        let catalog = catalog();
        let user = user();
        let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex::default());

        let evaluation = DecisionEngine::default()
            .evaluate_turn(&input(&catalog, &user, &signals, &locks, &evidence))
            .expect("evaluation");

        assert_eq!(evaluation.scores.len(), 4);
        assert_eq!(evaluation.scores[0].item_id.as_str(), "retinal");
        assert!(evaluation
            .scores
            .windows(2)
            .all(|pair| pair[0].breakdown.total >= pair[1].breakdown.total));
        assert!(evaluation.repair.is_none());
        assert!(evaluation.negotiation.is_none());
        assert_eq!(evaluation.final_routine(), &evaluation.primary);
    }

    #[test]
    fn over_budget_turn_repairs_and_negotiates() {
        let catalog = catalog();
        let user = user().with_budget(Budget::monthly(Decimal::new(40, 0), "USD"));
        let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex::default());

        let evaluation = DecisionEngine::default()
            .evaluate_turn(&input(&catalog, &user, &signals, &locks, &evidence))
            .expect("evaluation");

        let repair = evaluation.repair.as_ref().expect("repair ran");
        assert!(repair.routine.cost.known_total <= evaluation.primary.cost.known_total);
        assert!(evaluation.negotiation.is_some());
    }

    #[test]
    fn explicit_budget_overrides_profile_budget() {
        let catalog = catalog();
        let user = user().with_budget(Budget::monthly(Decimal::new(10, 0), "USD"));
        let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex::default());
        let turn = TurnInput { budget: Some(Decimal::new(1000, 0)), ..input(&catalog, &user, &signals, &locks, &evidence) };

        let evaluation = DecisionEngine::default().evaluate_turn(&turn).expect("evaluation");
        assert!(evaluation.repair.is_none());
        assert_eq!(evaluation.negotiation.map(|negotiation| negotiation.trigger), Some(false));
    }

    #[test]
    fn unknown_budget_currency_fails_fast() {
        let catalog = catalog();
        let user = user().with_budget(Budget::monthly(Decimal::new(40, 0), "XYZ"));
        let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex::default());

        let error = DecisionEngine::default()
            .evaluate_turn(&input(&catalog, &user, &signals, &locks, &evidence))
            .expect_err("unknown currency");
        assert_eq!(error, DomainError::UnknownCurrency("XYZ".to_owned()));
    }

    #[test]
    fn current_actives_are_checked_against_the_routine() {
        let catalog = catalog();
        let user = user();
        let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex::default());
        let current = vec!["Glycolic Acid".to_owned()];
        let turn = TurnInput { current_actives: &current, ..input(&catalog, &user, &signals, &locks, &evidence) };

        let evaluation = DecisionEngine::default().evaluate_turn(&turn).expect("evaluation");
        assert_eq!(evaluation.current_routine_conflicts.len(), 1);
        assert_eq!(evaluation.current_routine_conflicts[0].a_active, "Glycolic Acid");
        assert_eq!(evaluation.current_routine_conflicts[0].b_active, "Retinal");
    }

    struct AlwaysCaution;

    impl ConflictDetector for AlwaysCaution {
        fn detect_pair(&self, _candidate: &[String], _existing: &[String]) -> Vec<ConflictFinding> {
            Vec::new()
        }

        fn detect_application(&self, actives: &[String]) -> Vec<ConflictFinding> {
            actives
                .first()
                .map(|active| ConflictFinding {
                    a_active: active.clone(),
                    b_active: active.clone(),
                    severity: ConflictSeverity::Caution,
                    message: "custom".to_owned(),
                })
                .into_iter()
                .collect()
        }
    }

    #[test]
    fn runtime_accepts_custom_detector() {
        let catalog = catalog();
        let user = user();
        let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex(BTreeMap::new()));
        let engine = DecisionEngine::new(RoutineBuilder::default(), BudgetNegotiator::default(), AlwaysCaution);

        let evaluation = engine.evaluate_turn(&input(&catalog, &user, &signals, &locks, &evidence)).expect("evaluation");
        assert!(evaluation.conflicts.iter().all(|finding| finding.message == "custom"));
        assert!(!evaluation.conflicts.is_empty());
    }
}
