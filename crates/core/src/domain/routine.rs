use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::item::{Category, Item, ItemId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Cleanser,
    Treatment,
    Moisturizer,
    Sunscreen,
}

impl Slot {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cleanser => "Cleanser",
            Self::Treatment => "Treatment",
            Self::Moisturizer => "Moisturizer",
            Self::Sunscreen => "Sunscreen",
        }
    }

    /// Slots the routine cannot be meaningfully delivered without.
    pub fn is_required(self) -> bool {
        matches!(self, Self::Cleanser | Self::Sunscreen)
    }

    pub fn primary_category(self) -> Category {
        match self {
            Self::Cleanser => Category::Cleanser,
            Self::Treatment => Category::Treatment,
            Self::Moisturizer => Category::Moisturizer,
            Self::Sunscreen => Category::Sunscreen,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub slot: Slot,
    pub item: Item,
    /// Price in the reference currency, `None` when unknown.
    pub reference_price: Option<Decimal>,
    pub notes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineCost {
    pub known_total: Decimal,
    pub unknown_count: usize,
    pub currency: String,
}

impl RoutineCost {
    pub fn is_precise(&self) -> bool {
        self.unknown_count == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutineRec {
    pub am: Vec<Step>,
    pub pm: Vec<Step>,
    pub cost: RoutineCost,
    /// Required slots the catalog could not fill.
    pub missing_slots: Vec<Slot>,
}

impl RoutineRec {
    pub fn new(am: Vec<Step>, pm: Vec<Step>, missing_slots: Vec<Slot>, currency: &str) -> Self {
        let cost = routine_cost(am.iter().chain(pm.iter()), currency);
        Self { am, pm, cost, missing_slots }
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.am.iter().chain(self.pm.iter())
    }

    /// First step assigned to `slot`, AM before PM.
    pub fn step_for(&self, slot: Slot) -> Option<&Step> {
        self.steps().find(|step| step.slot == slot)
    }

    pub fn item_for(&self, slot: Slot) -> Option<&Item> {
        self.step_for(slot).map(|step| &step.item)
    }

    pub fn has_coverage_gap(&self) -> bool {
        !self.missing_slots.is_empty()
    }

    /// Distinct items in first-seen order.
    pub fn unique_items(&self) -> Vec<&Item> {
        let mut seen = BTreeSet::new();
        self.steps().filter(|step| seen.insert(&step.item.id)).map(|step| &step.item).collect()
    }
}

/// Sums each distinct item once; unknown prices are counted, not zeroed.
///
/// A price that would overflow the running total is counted as unknown.
pub fn routine_cost<'a>(steps: impl Iterator<Item = &'a Step>, currency: &str) -> RoutineCost {
    let mut seen: BTreeMap<&ItemId, Option<Decimal>> = BTreeMap::new();
    for step in steps {
        seen.entry(&step.item.id).or_insert(step.reference_price);
    }

    let mut known_total = Decimal::ZERO;
    let mut unknown_count = 0;
    for price in seen.values() {
        match price.and_then(|price| known_total.checked_add(price)) {
            Some(total) => known_total = total,
            None => unknown_count += 1,
        }
    }

    RoutineCost { known_total, unknown_count, currency: currency.to_owned() }
}

/// Upstream-detected flags about the current turn; their extraction is not this crate's concern.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySignals {
    pub comedones: bool,
    pub wants_brightening: bool,
    pub price_sensitive: bool,
    pub region: Option<String>,
}

/// Items the user already committed to in a prior turn, pinned per slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutineLocks(pub BTreeMap<Slot, Item>);

impl RoutineLocks {
    pub fn get(&self, slot: Slot) -> Option<&Item> {
        self.0.get(&slot)
    }

    pub fn is_locked(&self, slot: Slot) -> bool {
        self.0.contains_key(&slot)
    }

    pub fn pin(mut self, slot: Slot, item: Item) -> Self {
        self.0.insert(slot, item);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    SwapMoisturizer { from: ItemId, to: ItemId, known_total: Decimal },
    DowngradeTreatment { from: ItemId, to: ItemId, known_total: Decimal },
    DropTreatment { removed: ItemId, known_total: Decimal },
    Skipped { slot: Slot, reason: String },
    Insufficient { known_total: Decimal, budget: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetRepairOutcome {
    pub routine: RoutineRec,
    pub actions: Vec<RepairAction>,
    pub fits_budget: bool,
}
