use std::sync::Arc;

use rust_decimal::Decimal;
use skinfit_core::domain::item::{Experience, SocialStats, Texture};
use skinfit_core::engine::retrieval::InMemoryIndex;
use skinfit_core::{
    BarrierStatus, Budget, Catalog, Category, ConflictDetector, ConflictSeverity, CurrencyTable,
    DecisionEngine, DecisionRuntime, DeterministicFitScorer, EvidenceIndex, FitScorer, Goal, Item,
    ItemId, MechanismScores, MechanismTrack, QuerySignals, RepairAction, RetrievalDiagnostic,
    RetrievalPolicy, RiskFlag, RoutineBuilder, RoutineLocks, RoutineRequest, RuleTableConflictDetector,
    SimilarityQuery, SimilarityRetriever, SkinType, Slot, TurnInput, UserProfile,
};

fn item(id: &str, category: Category, price: Option<i64>, track: MechanismTrack, strength: f64) -> Item {
    let mut item = Item::new(id, id, category);
    item.price = price.map(|value| Decimal::new(value, 0));
    item.mechanism_scores = MechanismScores::default().with(track, strength);
    item
}

fn user(skin: SkinType, barrier: BarrierStatus, goals: &[MechanismTrack]) -> UserProfile {
    let goals = goals.iter().enumerate().map(|(index, track)| Goal::new(*track, index as u8 + 1)).collect();
    UserProfile::new([skin], barrier, goals).expect("valid profile")
}

fn ids(steps: &[skinfit_core::Step]) -> Vec<&str> {
    steps.iter().map(|step| step.item.id.as_str()).collect()
}

#[test]
fn scenario_a_acid_item_is_vetoed_for_impaired_barrier() {
    let mut exfoliant = item("x", Category::Treatment, Some(20), MechanismTrack::AcneComedonal, 1.0);
    exfoliant.risk_flags.insert(RiskFlag::Acid);
    let profile = user(SkinType::Oily, BarrierStatus::Impaired, &[MechanismTrack::AcneComedonal]);

    let score = DeterministicFitScorer::default().score(&exfoliant, &profile);
    assert!(score.vetoed);
    assert_eq!(score.total, 0.0);
    assert!(score.veto_reason.is_some_and(|reason| reason.contains("acid")));
}

#[test]
fn scenario_b_low_budget_comedones_draw_treatment_from_acid_pool() {
    let mut bha = item("bha-liquid", Category::Treatment, Some(11), MechanismTrack::AcneComedonal, 0.6);
    bha.key_actives = vec!["Salicylic Acid".to_owned()];
    let mut vitamin_c = item("c-serum", Category::Treatment, Some(9), MechanismTrack::AcneComedonal, 0.9);
    vitamin_c.key_actives = vec!["L-Ascorbic Acid".to_owned()];
    vitamin_c.mechanism_scores = vitamin_c.mechanism_scores.with(MechanismTrack::Brightening, 0.9);
    let catalog = Catalog::new(vec![
        item("wash", Category::Cleanser, Some(6), MechanismTrack::AcneComedonal, 0.3),
        bha,
        vitamin_c,
        item("gel-cream", Category::Moisturizer, Some(8), MechanismTrack::AcneComedonal, 0.4),
        item("spf", Category::Sunscreen, Some(10), MechanismTrack::AcneComedonal, 0.2),
    ]);
    let profile = user(SkinType::Oily, BarrierStatus::Healthy, &[MechanismTrack::AcneComedonal])
        .with_budget(Budget::monthly(Decimal::new(45, 0), "USD"));
    let signals = QuerySignals { comedones: true, wants_brightening: true, ..QuerySignals::default() };

    let routine = RoutineBuilder::default().build(&RoutineRequest::new(&catalog, &profile).with_signals(&signals));

    assert!(routine.am.iter().all(|step| step.slot != Slot::Moisturizer));
    assert_eq!(ids(&routine.am), vec!["wash", "spf"]);
    let treatment = routine.step_for(Slot::Treatment).expect("acid treatment");
    assert_eq!(treatment.item.id.as_str(), "bha-liquid");
    assert!(routine.pm.iter().any(|step| step.slot == Slot::Treatment));
}

fn scenario_c_catalog() -> Catalog {
    Catalog::new(vec![
        item("wash", Category::Cleanser, Some(5), MechanismTrack::Repair, 0.5),
        item("spf", Category::Sunscreen, Some(8), MechanismTrack::Repair, 0.5),
        item("cream-rich", Category::Moisturizer, Some(12), MechanismTrack::Repair, 0.9),
        item("cream-basic", Category::Moisturizer, Some(7), MechanismTrack::Repair, 0.5),
        item("serum-premium", Category::Treatment, Some(15), MechanismTrack::Repair, 0.9),
        item("serum-lite", Category::Treatment, Some(12), MechanismTrack::Repair, 0.6),
    ])
}

#[test]
fn scenario_c_repair_swaps_moisturizer_then_treatment_then_drops_treatment() {
    let catalog = scenario_c_catalog();
    let profile = user(SkinType::Dry, BarrierStatus::Healthy, &[MechanismTrack::Repair])
        .with_budget(Budget::monthly(Decimal::new(30, 0), "USD"));
    let (signals, locks, evidence) = (QuerySignals::default(), RoutineLocks::default(), EvidenceIndex::default());
    let turn = TurnInput {
        catalog: &catalog,
        user: &profile,
        signals: &signals,
        locks: &locks,
        evidence: &evidence,
        budget: None,
        current_actives: &[],
    };

    let evaluation = DecisionEngine::default().evaluate_turn(&turn).expect("evaluation");
    assert_eq!(evaluation.primary.cost.known_total, Decimal::new(40, 0));

    let repair = evaluation.repair.as_ref().expect("repair ran");
    let kinds: Vec<&str> = repair
        .actions
        .iter()
        .map(|action| match action {
            RepairAction::SwapMoisturizer { .. } => "swap_moisturizer",
            RepairAction::DowngradeTreatment { .. } => "downgrade_treatment",
            RepairAction::DropTreatment { .. } => "drop_treatment",
            RepairAction::Skipped { .. } => "skipped",
            RepairAction::Insufficient { .. } => "insufficient",
        })
        .collect();
    assert_eq!(kinds, vec!["swap_moisturizer", "downgrade_treatment", "drop_treatment"]);

    let routine = &repair.routine;
    assert!(repair.fits_budget);
    assert!(routine.cost.known_total <= Decimal::new(30, 0));
    assert!(routine.step_for(Slot::Treatment).is_none());
    assert_eq!(routine.item_for(Slot::Moisturizer).map(|item| item.id.as_str()), Some("cream-basic"));
    assert_eq!(evaluation.final_routine(), routine);
}

#[test]
fn scenario_c_unaffordable_staples_leave_an_insufficient_record() {
    let mut items = scenario_c_catalog().items().to_vec();
    for item in &mut items {
        if item.category == Category::Cleanser {
            item.price = Some(Decimal::new(40, 0));
        }
    }
    let catalog = Catalog::new(items);
    let profile = user(SkinType::Dry, BarrierStatus::Healthy, &[MechanismTrack::Repair]);
    let builder = RoutineBuilder::default();
    let request = RoutineRequest::new(&catalog, &profile).with_budget(Some(Decimal::new(30, 0)));

    let primary = builder.build(&request);
    let outcome = builder.repair(&request, &primary, Decimal::new(30, 0));

    assert!(!outcome.fits_budget);
    assert!(outcome.routine.step_for(Slot::Treatment).is_none());
    assert!(matches!(outcome.actions.last(), Some(RepairAction::Insufficient { .. })));
}

fn retrieval_fixture() -> (Catalog, InMemoryIndex) {
    let catalog = Catalog::new(vec![
        item("anchor", Category::Serum, None, MechanismTrack::Brightening, 0.8),
        item("near", Category::Serum, Some(25), MechanismTrack::Brightening, 0.7),
        item("mid", Category::Serum, Some(90), MechanismTrack::Brightening, 0.6),
        item("far", Category::Moisturizer, Some(12), MechanismTrack::Repair, 0.6),
    ]);
    let mut index = InMemoryIndex::new(4);
    for (id, vector) in [
        ("anchor", [1.0, 0.0, 0.0, 0.0]),
        ("near", [0.95, 0.05, 0.0, 0.0]),
        ("mid", [0.6, 0.4, 0.0, 0.0]),
        ("far", [0.0, 0.0, 1.0, 0.0]),
    ] {
        index.insert(ItemId::new(id), &vector);
    }
    (catalog, index)
}

#[tokio::test]
async fn scenario_d_unknown_anchor_price_returns_unfiltered_candidates() {
    let (catalog, index) = retrieval_fixture();
    let retriever = SimilarityRetriever::new(Arc::new(index), RetrievalPolicy::default(), CurrencyTable::default());

    let query = SimilarityQuery::anchor("anchor").with_k(10).cheaper();
    let outcome = retriever.find_similar(&catalog, &query).await;

    let found: Vec<&str> = outcome.matches.iter().map(|candidate| candidate.item.id.as_str()).collect();
    assert_eq!(found, vec!["near", "mid", "far"]);
    assert!(outcome
        .diagnostics
        .contains(&RetrievalDiagnostic::CheaperFilterSkipped { item_id: ItemId::new("anchor") }));
}

#[test]
fn scenario_e_adapalene_and_glycolic_acid_yield_one_finding_in_either_order() {
    let detector = RuleTableConflictDetector;
    let forward = detector.detect_application(&["adapalene".to_owned(), "glycolic acid".to_owned()]);
    let reverse = detector.detect_application(&["glycolic acid".to_owned(), "adapalene".to_owned()]);

    assert_eq!(forward.len(), 1);
    assert_eq!(forward, reverse);
    assert_eq!(forward[0].severity, ConflictSeverity::Avoid);
    assert!(forward[0].message.contains("retinoids"));
}

#[test]
fn veto_dominates_any_mechanism_strength() {
    let scorer = DeterministicFitScorer::default();
    let profile = user(SkinType::Normal, BarrierStatus::Impaired, &[MechanismTrack::Brightening]);

    for flag in RiskFlag::BARRIER_VETO {
        for strength in [0.0, 0.5, 1.0] {
            let mut candidate = item("x", Category::Serum, Some(10), MechanismTrack::Brightening, strength);
            candidate.risk_flags.insert(flag);
            candidate.social_stats.platform_scores.insert(skinfit_core::domain::item::Platform::Reddit, 1.0);

            let score = scorer.score(&candidate, &profile);
            assert!(score.vetoed, "{flag:?} at {strength} should veto");
            assert_eq!(score.total, 0.0);
        }
    }
}

#[test]
fn scores_stay_within_bounds_for_extreme_inputs() {
    let scorer = DeterministicFitScorer::default();
    let users = [
        user(SkinType::Oily, BarrierStatus::Healthy, &[MechanismTrack::OilControl, MechanismTrack::Redness]),
        user(SkinType::Sensitive, BarrierStatus::Impaired, &[]),
        user(SkinType::Dry, BarrierStatus::Healthy, &[MechanismTrack::Repair]),
    ];

    for strength in [-3.0, 0.0, 0.4, 1.0, 7.5, f64::NAN] {
        for burn_rate in [-1.0, 0.0, 0.05, 0.5, 2.0] {
            let mut candidate = item("x", Category::Moisturizer, Some(10), MechanismTrack::Repair, strength);
            candidate.mechanism_scores = candidate.mechanism_scores.with(MechanismTrack::OilControl, strength);
            candidate.social_stats = SocialStats { burn_rate, ..SocialStats::default() };
            candidate.experience =
                Some(Experience { texture: Texture::Sticky, stickiness: strength, pilling_risk: burn_rate });

            for profile in &users {
                let score = scorer.score(&candidate, profile);
                for value in [score.science, score.social, score.engineering, score.total] {
                    assert!((0.0..=100.0).contains(&value), "{value} out of bounds");
                }
            }
        }
    }
}

#[test]
fn floor_and_repair_never_cost_more_than_primary() {
    let catalog = scenario_c_catalog();
    let builder = RoutineBuilder::default();

    for skin in [SkinType::Dry, SkinType::Oily, SkinType::Normal] {
        for budget in [10, 25, 30, 45, 60, 200] {
            let profile = user(skin, BarrierStatus::Healthy, &[MechanismTrack::Repair]);
            let budget = Decimal::new(budget, 0);
            let request = RoutineRequest::new(&catalog, &profile).with_budget(Some(budget));

            let primary = builder.build(&request);
            let floor = builder.build_floor(&request);
            let repaired = builder.repair(&request, &primary, budget);

            assert!(floor.cost.known_total <= primary.cost.known_total);
            assert!(repaired.routine.cost.known_total <= primary.cost.known_total);
        }
    }
}

#[test]
fn score_and_build_are_idempotent() {
    let catalog = scenario_c_catalog();
    let profile = user(SkinType::Dry, BarrierStatus::Healthy, &[MechanismTrack::Repair]);
    let scorer = DeterministicFitScorer::default();
    let builder = RoutineBuilder::default();
    let request = RoutineRequest::new(&catalog, &profile);

    for candidate in catalog.items() {
        assert_eq!(scorer.score(candidate, &profile), scorer.score(candidate, &profile));
    }
    assert_eq!(builder.build(&request), builder.build(&request));
}

#[test]
fn conflict_detection_is_order_independent() {
    let detector = RuleTableConflictDetector;
    let actives = ["Tretinoin", "Benzoyl Peroxide", "Ascorbic Acid", "Copper Tripeptide-1", "Mandelic Acid"];

    let forward: Vec<String> = actives.iter().map(|active| (*active).to_owned()).collect();
    let reverse: Vec<String> = actives.iter().rev().map(|active| (*active).to_owned()).collect();
    let rotated: Vec<String> = actives.iter().cycle().skip(2).take(actives.len()).map(|active| (*active).to_owned()).collect();

    let baseline = detector.detect_application(&forward);
    assert!(!baseline.is_empty());
    assert_eq!(baseline, detector.detect_application(&reverse));
    assert_eq!(baseline, detector.detect_application(&rotated));

    let (left, right) = forward.split_at(2);
    assert_eq!(detector.detect_pair(left, right), detector.detect_pair(right, left));
}

#[tokio::test]
async fn retrieval_is_ordered_and_never_returns_the_anchor() {
    let (catalog, index) = retrieval_fixture();
    let retriever = SimilarityRetriever::new(Arc::new(index), RetrievalPolicy::default(), CurrencyTable::default());

    for anchor in ["anchor", "near", "mid", "far"] {
        let outcome = retriever.find_similar(&catalog, &SimilarityQuery::anchor(anchor).with_k(10)).await;
        assert!(outcome.matches.iter().all(|candidate| candidate.item.id.as_str() != anchor));
        assert!(outcome.matches.windows(2).all(|pair| pair[0].similarity >= pair[1].similarity));
    }
}
