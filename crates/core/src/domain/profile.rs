use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::item::{MechanismTrack, Platform};
use crate::domain::money::CurrencyTable;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinType {
    Oily,
    Dry,
    Combination,
    Normal,
    Sensitive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierStatus {
    #[default]
    Healthy,
    Impaired,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStrategy {
    #[default]
    Balanced,
    /// Spend as little as the routine allows, regardless of the stated total.
    Strict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default)]
    pub total_monthly: Option<Decimal>,
    #[serde(default = "default_budget_currency")]
    pub currency: String,
    #[serde(default)]
    pub strategy: BudgetStrategy,
}

fn default_budget_currency() -> String {
    "USD".to_owned()
}

impl Default for Budget {
    fn default() -> Self {
        Self { total_monthly: None, currency: default_budget_currency(), strategy: BudgetStrategy::default() }
    }
}

impl Budget {
    pub fn monthly(amount: Decimal, currency: impl Into<String>) -> Self {
        Self { total_monthly: Some(amount), currency: currency.into(), strategy: BudgetStrategy::Balanced }
    }

    pub fn in_reference(&self, currencies: &CurrencyTable) -> Result<Option<Decimal>, DomainError> {
        self.total_monthly.map(|amount| currencies.to_reference(amount, &self.currency)).transpose()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub track: MechanismTrack,
    /// 1 is the most important goal.
    pub priority: u8,
}

impl Goal {
    pub fn new(track: MechanismTrack, priority: u8) -> Self {
        Self { track, priority }
    }

    pub fn weight(&self) -> f64 {
        1.0 / f64::from(self.priority.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub skin_types: BTreeSet<SkinType>,
    #[serde(default)]
    pub barrier_status: BarrierStatus,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub platform_weights: BTreeMap<Platform, f64>,
}

impl UserProfile {
    pub fn new(
        skin_types: impl IntoIterator<Item = SkinType>,
        barrier_status: BarrierStatus,
        goals: Vec<Goal>,
    ) -> Result<Self, DomainError> {
        let profile = Self {
            skin_types: skin_types.into_iter().collect(),
            barrier_status,
            budget: Budget::default(),
            goals,
            platform_weights: BTreeMap::new(),
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_platform_weight(mut self, platform: Platform, weight: f64) -> Self {
        self.platform_weights.insert(platform, weight);
        self
    }

    /// Checks the invariants a deserialized profile must hold before scoring.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.skin_types.is_empty() {
            return Err(DomainError::EmptySkinType);
        }

        let mut seen = BTreeSet::new();
        for goal in &self.goals {
            if !seen.insert(goal.track) {
                return Err(DomainError::DuplicateGoal(goal.track));
            }
        }

        for (platform, weight) in &self.platform_weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
                return Err(DomainError::InvalidWeight {
                    field: format!("platform_weights.{platform:?}"),
                    value: weight.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn has_skin_type(&self, skin_type: SkinType) -> bool {
        self.skin_types.contains(&skin_type)
    }

    pub fn is_sensitive(&self) -> bool {
        self.has_skin_type(SkinType::Sensitive)
    }

    pub fn is_dry(&self) -> bool {
        self.has_skin_type(SkinType::Dry)
    }

    pub fn is_barrier_impaired(&self) -> bool {
        self.barrier_status == BarrierStatus::Impaired
    }

    /// Goals ordered by priority, most important first.
    pub fn ranked_goals(&self) -> Vec<Goal> {
        let mut goals = self.goals.clone();
        goals.sort_by_key(|goal| (goal.priority, goal.track));
        goals
    }
}
