//! Routine assembly: per-slot pool -> filter -> pick, then optional budget repair.
//!
//! The builder never fails. Thin catalogs surface as `missing_slots`, and an
//! unconvertible budget is treated as no budget.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::evidence::EvidenceIndex;
use crate::domain::item::{Catalog, Category, Item, MechanismTrack, RiskFlag};
use crate::domain::money::CurrencyTable;
use crate::domain::profile::{BudgetStrategy, UserProfile};
use crate::domain::routine::{
    BudgetRepairOutcome, QuerySignals, RepairAction, RoutineLocks, RoutineRec, Slot, Step,
};
use crate::engine::actives::{classify_active, is_brightening_active, AcidStrength, ActiveClass};
use crate::engine::scoring::{DeterministicFitScorer, FitScorer, ScoreBreakdown};

const BRIGHTENING_MECHANISM_FLOOR: f64 = 0.7;

static NO_SIGNALS: QuerySignals =
    QuerySignals { comedones: false, wants_brightening: false, price_sensitive: false, region: None };
static NO_LOCKS: RoutineLocks = RoutineLocks(BTreeMap::new());
static NO_EVIDENCE: EvidenceIndex = EvidenceIndex(BTreeMap::new());

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutinePolicy {
    /// Reference-currency monthly budget at or below which low-budget mode applies.
    pub low_budget_threshold: Decimal,
    pub currencies: CurrencyTable,
}

impl Default for RoutinePolicy {
    fn default() -> Self {
        Self { low_budget_threshold: Decimal::new(50, 0), currencies: CurrencyTable::default() }
    }
}

/// Everything one build needs; borrowed from the caller for the duration of the turn.
#[derive(Clone, Copy, Debug)]
pub struct RoutineRequest<'a> {
    pub catalog: &'a Catalog,
    pub user: &'a UserProfile,
    pub signals: &'a QuerySignals,
    /// Monthly budget in reference units; overrides the profile's budget.
    pub budget: Option<Decimal>,
    pub locks: &'a RoutineLocks,
    pub evidence: &'a EvidenceIndex,
}

impl<'a> RoutineRequest<'a> {
    pub fn new(catalog: &'a Catalog, user: &'a UserProfile) -> Self {
        Self { catalog, user, signals: &NO_SIGNALS, budget: None, locks: &NO_LOCKS, evidence: &NO_EVIDENCE }
    }

    pub fn with_signals(mut self, signals: &'a QuerySignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_budget(mut self, budget: Option<Decimal>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_locks(mut self, locks: &'a RoutineLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_evidence(mut self, evidence: &'a EvidenceIndex) -> Self {
        self.evidence = evidence;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuildMode {
    Primary,
    /// Locks ignored, low-budget mode forced.
    Floor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PickRule {
    Locked,
    Cheapest,
    BestScore,
    AcidPool,
    BrighteningPool,
    CheapestFallback,
    Repair,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ActiveTraits {
    acid: Option<AcidStrength>,
    retinoid: bool,
    brightening: bool,
}

#[derive(Clone, Debug)]
struct Candidate<'a> {
    item: &'a Item,
    /// `None` for locked items, which are never scored.
    score: Option<ScoreBreakdown>,
    price: Option<Decimal>,
    traits: ActiveTraits,
}

impl Candidate<'_> {
    fn total(&self) -> f64 {
        self.score.as_ref().map_or(0.0, |score| score.total)
    }

    fn is_safe(&self) -> bool {
        self.score.as_ref().is_some_and(|score| !score.vetoed)
    }

    fn is_eligible(&self) -> bool {
        self.score.as_ref().is_some_and(ScoreBreakdown::is_eligible)
    }

    fn available_in(&self, region: Option<&str>) -> bool {
        region.map_or(true, |region| self.item.is_available_in(region))
    }
}

#[derive(Clone, Copy, Debug)]
struct BuildContext<'r> {
    low_budget: bool,
    compress_am: bool,
    gentle: bool,
    dry: bool,
    comedones: bool,
    wants_brightening: bool,
    region: Option<&'r str>,
}

/// Builds AM/PM routines from a scored catalog.
#[derive(Debug, Clone)]
pub struct RoutineBuilder<S = DeterministicFitScorer> {
    scorer: S,
    policy: RoutinePolicy,
}

impl Default for RoutineBuilder<DeterministicFitScorer> {
    fn default() -> Self {
        Self { scorer: DeterministicFitScorer::default(), policy: RoutinePolicy::default() }
    }
}

impl<S: FitScorer> RoutineBuilder<S> {
    pub fn new(scorer: S, policy: RoutinePolicy) -> Self {
        Self { scorer, policy }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn policy(&self) -> &RoutinePolicy {
        &self.policy
    }

    /// Monthly budget in reference units, from the request override or the profile.
    pub fn reference_budget(&self, request: &RoutineRequest<'_>) -> Option<Decimal> {
        if request.budget.is_some() {
            return request.budget;
        }
        match request.user.budget.in_reference(&self.policy.currencies) {
            Ok(budget) => budget,
            Err(error) => {
                warn!(
                    event_name = "engine.routine.budget_unconvertible",
                    error = %error,
                    "profile budget could not be converted; building without a budget"
                );
                None
            }
        }
    }

    pub fn build(&self, request: &RoutineRequest<'_>) -> RoutineRec {
        self.assemble(request, BuildMode::Primary)
    }

    /// Strict-budget routine for the same turn, used as the negotiator's comparison point.
    pub fn build_floor(&self, request: &RoutineRequest<'_>) -> RoutineRec {
        self.assemble(request, BuildMode::Floor)
    }

    fn assemble(&self, request: &RoutineRequest<'_>, mode: BuildMode) -> RoutineRec {
        let candidates = self.candidates(request);
        let context = self.context(request, mode);
        let locks = match mode {
            BuildMode::Primary => Some(request.locks),
            BuildMode::Floor => None,
        };

        let mut missing = Vec::new();
        let mut pick = |slot: Slot| -> Option<Step> {
            let locked = locks.and_then(|locks| locks.get(slot)).map(|item| self.locked(item, request));
            let chosen = match locked {
                Some(candidate) => Some((candidate, PickRule::Locked)),
                None => self.pick_slot(slot, &candidates, &context),
            };
            match chosen {
                Some((candidate, rule)) => Some(step(slot, &candidate, rule, &context)),
                None => {
                    if slot != Slot::Treatment {
                        missing.push(slot);
                    }
                    None
                }
            }
        };

        let cleanser = pick(Slot::Cleanser);
        let treatment = pick(Slot::Treatment);
        let moisturizer = pick(Slot::Moisturizer);
        let sunscreen = pick(Slot::Sunscreen);

        let mut am = Vec::new();
        am.extend(cleanser.clone());
        if !context.compress_am {
            am.extend(moisturizer.clone());
        }
        am.extend(sunscreen);

        let mut pm = Vec::new();
        pm.extend(cleanser);
        pm.extend(treatment);
        pm.extend(moisturizer);

        RoutineRec::new(am, pm, missing, self.policy.currencies.reference())
    }

    fn pick_slot<'a>(
        &self,
        slot: Slot,
        candidates: &[Candidate<'a>],
        context: &BuildContext<'_>,
    ) -> Option<(Candidate<'a>, PickRule)> {
        let chosen = match slot {
            Slot::Cleanser | Slot::Sunscreen => {
                let pool = regional(candidates, context.region, |candidate| {
                    candidate.item.category == slot.primary_category() && candidate.is_safe()
                });
                pool.into_iter().min_by(|a, b| cheaper_first(a, b)).map(|candidate| (candidate, PickRule::Cheapest))
            }
            Slot::Treatment => self.pick_treatment(candidates, context),
            Slot::Moisturizer => {
                let safe = regional(candidates, context.region, |candidate| {
                    candidate.item.category == Category::Moisturizer && candidate.is_safe()
                });
                let cheapest = || safe.iter().copied().min_by(|a, b| cheaper_first(a, b));
                if context.low_budget && !context.dry {
                    cheapest().map(|candidate| (candidate, PickRule::Cheapest))
                } else {
                    let best = safe
                        .iter()
                        .copied()
                        .filter(|candidate| candidate.is_eligible())
                        .min_by(|a, b| better_first(a, b));
                    match best {
                        Some(candidate) => Some((candidate, PickRule::BestScore)),
                        None => cheapest().map(|candidate| (candidate, PickRule::CheapestFallback)),
                    }
                }
            }
        };
        chosen.map(|(candidate, rule)| (candidate.clone(), rule))
    }

    fn pick_treatment<'c, 'a>(
        &self,
        candidates: &'c [Candidate<'a>],
        context: &BuildContext<'_>,
    ) -> Option<(&'c Candidate<'a>, PickRule)> {
        let eligible = regional(candidates, context.region, |candidate| {
            matches!(candidate.item.category, Category::Treatment | Category::Serum) && candidate.is_eligible()
        });

        if context.comedones {
            return eligible
                .iter()
                .copied()
                .filter(|candidate| acid_allowed(candidate, context))
                .min_by(|a, b| better_first(a, b))
                .map(|candidate| (candidate, PickRule::AcidPool));
        }

        let treatments: Vec<&Candidate<'a>> =
            eligible.iter().copied().filter(|candidate| candidate.item.category == Category::Treatment).collect();
        let base = if treatments.is_empty() { eligible } else { treatments };

        if context.wants_brightening {
            let brightening = base
                .iter()
                .copied()
                .filter(|candidate| candidate.traits.brightening)
                .min_by(|a, b| better_first(a, b));
            if let Some(candidate) = brightening {
                return Some((candidate, PickRule::BrighteningPool));
            }
        }

        base.into_iter().min_by(|a, b| better_first(a, b)).map(|candidate| (candidate, PickRule::BestScore))
    }

    /// Steps 1-3 in order, each applied only when it does not raise the known cost.
    pub fn repair(
        &self,
        request: &RoutineRequest<'_>,
        primary: &RoutineRec,
        budget: Decimal,
    ) -> BudgetRepairOutcome {
        let mut routine = primary.clone();
        let mut actions = Vec::new();
        if fits(&routine, budget) {
            return BudgetRepairOutcome { routine, actions, fits_budget: true };
        }

        let candidates = self.candidates(request);
        let context = self.context(request, BuildMode::Primary);

        self.repair_moisturizer(request, &candidates, &context, &mut routine, &mut actions);
        if !fits(&routine, budget) {
            self.repair_treatment(request, &candidates, &context, &mut routine, &mut actions);
        }
        // A locked treatment was already recorded as skipped by the downgrade step.
        if !fits(&routine, budget) && !request.locks.is_locked(Slot::Treatment) {
            if let Some(current) = routine.step_for(Slot::Treatment) {
                let removed = current.item.id.clone();
                let next = replace_slot(&routine, Slot::Treatment, None);
                actions.push(RepairAction::DropTreatment { removed, known_total: next.cost.known_total });
                routine = next;
            }
        }

        let fits_budget = fits(&routine, budget);
        if !fits_budget {
            actions.push(RepairAction::Insufficient { known_total: routine.cost.known_total, budget });
        }
        for action in &actions {
            debug!(event_name = "engine.routine.repair_step", action = ?action, "budget repair step");
        }

        BudgetRepairOutcome { routine, actions, fits_budget }
    }

    fn repair_moisturizer(
        &self,
        request: &RoutineRequest<'_>,
        candidates: &[Candidate<'_>],
        context: &BuildContext<'_>,
        routine: &mut RoutineRec,
        actions: &mut Vec<RepairAction>,
    ) {
        if request.locks.is_locked(Slot::Moisturizer) {
            actions.push(locked_skip(Slot::Moisturizer));
            return;
        }
        let Some(current) = routine.step_for(Slot::Moisturizer) else {
            return;
        };

        let cheapest = regional(candidates, context.region, |candidate| {
            candidate.item.category == Category::Moisturizer && candidate.is_safe() && candidate.price.is_some()
        })
        .into_iter()
        .min_by(|a, b| cheaper_first(a, b));
        let Some(cheapest) = cheapest else {
            actions.push(skip(Slot::Moisturizer, "no priced moisturizer to swap in"));
            return;
        };
        if cheapest.item.id == current.item.id {
            actions.push(skip(Slot::Moisturizer, "already the cheapest moisturizer"));
            return;
        }

        let from = current.item.id.clone();
        let next = replace_slot(routine, Slot::Moisturizer, Some(step(Slot::Moisturizer, cheapest, PickRule::Repair, context)));
        if next.cost.known_total <= routine.cost.known_total {
            actions.push(RepairAction::SwapMoisturizer {
                from,
                to: cheapest.item.id.clone(),
                known_total: next.cost.known_total,
            });
            *routine = next;
        } else {
            actions.push(skip(Slot::Moisturizer, "swap would raise the known cost"));
        }
    }

    fn repair_treatment(
        &self,
        request: &RoutineRequest<'_>,
        candidates: &[Candidate<'_>],
        context: &BuildContext<'_>,
        routine: &mut RoutineRec,
        actions: &mut Vec<RepairAction>,
    ) {
        if request.locks.is_locked(Slot::Treatment) {
            actions.push(locked_skip(Slot::Treatment));
            return;
        }
        let Some(current) = routine.step_for(Slot::Treatment) else {
            return;
        };
        let Some(current_price) = current.reference_price else {
            actions.push(skip(Slot::Treatment, "current treatment price is unknown"));
            return;
        };

        let cheaper = regional(candidates, context.region, |candidate| {
            matches!(candidate.item.category, Category::Treatment | Category::Serum)
                && candidate.is_eligible()
                && candidate.price.is_some_and(|price| price < current_price)
                && (!context.comedones || acid_allowed(candidate, context))
        })
        .into_iter()
        .min_by(|a, b| better_first(a, b));
        let Some(cheaper) = cheaper else {
            actions.push(skip(Slot::Treatment, "no cheaper treatment available"));
            return;
        };

        let from = current.item.id.clone();
        let next = replace_slot(routine, Slot::Treatment, Some(step(Slot::Treatment, cheaper, PickRule::Repair, context)));
        if next.cost.known_total <= routine.cost.known_total {
            actions.push(RepairAction::DowngradeTreatment {
                from,
                to: cheaper.item.id.clone(),
                known_total: next.cost.known_total,
            });
            *routine = next;
        } else {
            actions.push(skip(Slot::Treatment, "downgrade would raise the known cost"));
        }
    }

    fn candidates<'a>(&self, request: &RoutineRequest<'a>) -> Vec<Candidate<'a>> {
        request
            .catalog
            .items()
            .iter()
            .map(|item| Candidate {
                item,
                score: Some(self.scorer.score(item, request.user)),
                price: self.policy.currencies.reference_price(item.price, &item.currency),
                traits: active_traits(item, request.evidence),
            })
            .collect()
    }

    fn locked<'a>(&self, item: &'a Item, request: &RoutineRequest<'a>) -> Candidate<'a> {
        Candidate {
            item,
            score: None,
            price: self.policy.currencies.reference_price(item.price, &item.currency),
            traits: active_traits(item, request.evidence),
        }
    }

    fn context<'r>(&self, request: &RoutineRequest<'r>, mode: BuildMode) -> BuildContext<'r> {
        let user = request.user;
        let under_threshold = self
            .reference_budget(request)
            .is_some_and(|budget| budget <= self.policy.low_budget_threshold);
        let low_budget = mode == BuildMode::Floor
            || user.budget.strategy == BudgetStrategy::Strict
            || request.signals.price_sensitive
            || under_threshold;

        BuildContext {
            low_budget,
            compress_am: low_budget && !user.is_dry(),
            gentle: user.is_sensitive() || user.is_barrier_impaired(),
            dry: user.is_dry(),
            comedones: request.signals.comedones,
            wants_brightening: request.signals.wants_brightening,
            region: request.signals.region.as_deref().map(str::trim).filter(|region| !region.is_empty()),
        }
    }
}

/// Candidates matching `keep`, narrowed to the region when that leaves any.
fn regional<'c, 'a>(
    candidates: &'c [Candidate<'a>],
    region: Option<&str>,
    keep: impl Fn(&Candidate<'a>) -> bool,
) -> Vec<&'c Candidate<'a>> {
    let pool: Vec<&Candidate<'a>> = candidates.iter().filter(|candidate| keep(*candidate)).collect();
    let local: Vec<&Candidate<'a>> =
        pool.iter().copied().filter(|candidate| candidate.available_in(region)).collect();
    if local.is_empty() {
        pool
    } else {
        local
    }
}

fn acid_allowed(candidate: &Candidate<'_>, context: &BuildContext<'_>) -> bool {
    match candidate.traits.acid {
        Some(AcidStrength::Mild) => true,
        Some(AcidStrength::Strong) => !context.gentle,
        None => false,
    }
}

fn active_traits(item: &Item, evidence: &EvidenceIndex) -> ActiveTraits {
    let mut names = evidence.actives_for(item);
    names.push(item.name.clone());

    let mut traits = ActiveTraits::default();
    for name in &names {
        if let Some(active) = classify_active(name) {
            match active.class {
                ActiveClass::ExfoliatingAcid => traits.acid = traits.acid.max(active.strength),
                ActiveClass::Retinoid => traits.retinoid = true,
                _ => {}
            }
        }
        traits.brightening |= is_brightening_active(name);
    }

    if item.risk_flags.contains(&RiskFlag::Acid) {
        traits.acid = Some(AcidStrength::Strong);
    } else if item.risk_flags.contains(&RiskFlag::MildAcid) {
        traits.acid = traits.acid.max(Some(AcidStrength::Mild));
    }
    traits.retinoid |= item.risk_flags.contains(&RiskFlag::Retinoid);
    traits.brightening |= item
        .mechanism_scores
        .get(MechanismTrack::Brightening)
        .is_some_and(|score| score >= BRIGHTENING_MECHANISM_FLOOR);
    traits
}

/// Known prices first (ascending), then higher score, then id.
fn cheaper_first(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    price_order(a.price, b.price)
        .then_with(|| b.total().total_cmp(&a.total()))
        .then_with(|| a.item.id.cmp(&b.item.id))
}

/// Higher score first, then cheaper known price, then id.
fn better_first(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.total()
        .total_cmp(&a.total())
        .then_with(|| price_order(a.price, b.price))
        .then_with(|| a.item.id.cmp(&b.item.id))
}

fn price_order(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn fits(routine: &RoutineRec, budget: Decimal) -> bool {
    routine.cost.known_total <= budget
}

fn skip(slot: Slot, reason: &str) -> RepairAction {
    RepairAction::Skipped { slot, reason: reason.to_owned() }
}

fn locked_skip(slot: Slot) -> RepairAction {
    skip(slot, "locked by the user")
}

/// New routine with every step in `slot` replaced, or removed when `replacement` is `None`.
fn replace_slot(routine: &RoutineRec, slot: Slot, replacement: Option<Step>) -> RoutineRec {
    let swap = |steps: &[Step]| -> Vec<Step> {
        steps
            .iter()
            .filter_map(|existing| {
                if existing.slot == slot {
                    replacement.clone()
                } else {
                    Some(existing.clone())
                }
            })
            .collect()
    };
    RoutineRec::new(swap(&routine.am), swap(&routine.pm), routine.missing_slots.clone(), &routine.cost.currency)
}

fn step(slot: Slot, candidate: &Candidate<'_>, rule: PickRule, context: &BuildContext<'_>) -> Step {
    Step {
        slot,
        item: candidate.item.clone(),
        reference_price: candidate.price,
        notes: slot_notes(slot, candidate, rule, context),
    }
}

fn slot_notes(slot: Slot, candidate: &Candidate<'_>, rule: PickRule, context: &BuildContext<'_>) -> Vec<String> {
    let mut notes: Vec<&str> = Vec::new();
    if rule == PickRule::Locked {
        notes.push("Kept from your current routine.");
    }

    match slot {
        Slot::Cleanser => {
            notes.push("Use morning and night; rinse with lukewarm water.");
            if context.gentle {
                notes.push("Keep contact under 60 seconds while skin is reactive.");
            }
        }
        Slot::Treatment => {
            let traits = candidate.traits;
            if traits.acid.is_some() {
                notes.push("Start 2-3 nights per week and build up as tolerated.");
                notes.push("Skip on nights with redness or stinging.");
            } else if traits.retinoid {
                notes.push("Introduce every third night, then move toward nightly as tolerated.");
            } else if rule == PickRule::BrighteningPool {
                notes.push("Apply nightly after cleansing; tone changes take 8-12 weeks to show.");
            } else {
                notes.push("Apply a thin layer after cleansing.");
            }
            if context.gentle && (traits.acid.is_some() || traits.retinoid) {
                notes.push("Use the sandwich method: moisturizer before and after the active.");
            }
        }
        Slot::Moisturizer => {
            notes.push("Apply to slightly damp skin.");
            if context.dry {
                notes.push("Use a generous layer at night.");
            }
        }
        Slot::Sunscreen => {
            notes.push("Apply two finger-lengths as the last morning step; reapply every 2 hours outdoors.");
            if context.compress_am {
                notes.push("Doubles as morning hydration, so the AM moisturizer is skipped.");
            }
        }
    }

    if rule == PickRule::Repair {
        notes.push("Swapped in to fit the monthly budget.");
    }
    notes.into_iter().map(str::to_owned).collect()
}
