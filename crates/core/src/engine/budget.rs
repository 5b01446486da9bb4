//! Budget tiering and wash-off swap suggestions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::item::{Category, Item};
use crate::domain::routine::{RoutineRec, Slot, Step};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTier {
    Low,
    Mid,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTierPolicy {
    pub low_tier_cap: Decimal,
    pub mid_tier_cap: Decimal,
    /// Multiplier on the cap before negotiation triggers.
    pub tolerance: Decimal,
}

impl Default for BudgetTierPolicy {
    fn default() -> Self {
        Self { low_tier_cap: Decimal::new(50, 0), mid_tier_cap: Decimal::new(150, 0), tolerance: Decimal::new(12, 1) }
    }
}

impl BudgetTierPolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.low_tier_cap <= Decimal::ZERO || self.mid_tier_cap <= self.low_tier_cap {
            return Err(DomainError::InvalidWeight {
                field: "budget.tier_caps".to_owned(),
                value: format!("{} / {}", self.low_tier_cap, self.mid_tier_cap),
            });
        }
        if self.tolerance < Decimal::ONE {
            return Err(DomainError::InvalidWeight {
                field: "budget.tolerance".to_owned(),
                value: self.tolerance.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwapSuggestion {
    pub slot: Slot,
    pub category: Category,
    pub from: Item,
    pub to: Item,
    /// Reference-currency saving; `None` when either price is unknown.
    pub savings: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetNegotiation {
    pub tier: BudgetTier,
    /// Tier cap; `None` for the high tier.
    pub threshold: Option<Decimal>,
    pub known_subtotal: Decimal,
    pub unknown_count: usize,
    pub trigger: bool,
    /// False when any routine price is unknown, so the subtotal is a lower bound.
    pub precise: bool,
    pub suggested_swap: Option<SwapSuggestion>,
}

#[derive(Clone, Debug, Default)]
pub struct BudgetNegotiator {
    policy: BudgetTierPolicy,
}

impl BudgetNegotiator {
    pub fn new(policy: BudgetTierPolicy) -> Result<Self, DomainError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn tier_for(&self, budget: Decimal) -> (BudgetTier, Option<Decimal>) {
        if budget < self.policy.low_tier_cap {
            (BudgetTier::Low, Some(self.policy.low_tier_cap))
        } else if budget < self.policy.mid_tier_cap {
            (BudgetTier::Mid, Some(self.policy.mid_tier_cap))
        } else {
            (BudgetTier::High, None)
        }
    }

    /// Compares the primary routine with the strict-budget floor routine.
    ///
    /// A swap is only suggested when negotiation triggers.
    pub fn negotiate(&self, primary: &RoutineRec, floor: &RoutineRec, budget: Decimal) -> BudgetNegotiation {
        let (tier, threshold) = self.tier_for(budget);
        let known_subtotal = primary.cost.known_total;
        let trigger = threshold.is_some_and(|cap| {
            cap.checked_mul(self.policy.tolerance).map_or(false, |limit| known_subtotal > limit)
        });
        let suggested_swap = if trigger { wash_off_swap(primary, floor) } else { None };

        BudgetNegotiation {
            tier,
            threshold,
            known_subtotal,
            unknown_count: primary.cost.unknown_count,
            trigger,
            precise: primary.cost.is_precise(),
            suggested_swap,
        }
    }
}

/// First wash-off step, AM then PM, whose item differs from the floor routine's.
fn wash_off_swap(primary: &RoutineRec, floor: &RoutineRec) -> Option<SwapSuggestion> {
    let applications = [(&primary.am, &floor.am), (&primary.pm, &floor.pm)];
    applications.into_iter().find_map(|(current, cheaper)| {
        current.iter().filter(|step| step.item.category.is_wash_off()).find_map(|step| {
            let replacement = cheaper.iter().find(|candidate| candidate.slot == step.slot)?;
            (replacement.item.id != step.item.id).then(|| suggestion(step, replacement))
        })
    })
}

fn suggestion(from: &Step, to: &Step) -> SwapSuggestion {
    let savings = match (from.reference_price, to.reference_price) {
        (Some(from), Some(to)) => from.checked_sub(to),
        _ => None,
    };
    SwapSuggestion {
        slot: from.slot,
        category: from.item.category,
        from: from.item.clone(),
        to: to.item.clone(),
        savings,
    }
}
