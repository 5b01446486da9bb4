use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cleanser,
    Toner,
    Serum,
    Treatment,
    Moisturizer,
    Sunscreen,
}

impl Category {
    /// Rinsed off after application; the only categories a budget swap may touch.
    pub fn is_wash_off(self) -> bool {
        matches!(self, Self::Cleanser | Self::Toner)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cleanser => "cleanser",
            Self::Toner => "toner",
            Self::Serum => "serum",
            Self::Treatment => "treatment",
            Self::Moisturizer => "moisturizer",
            Self::Sunscreen => "sunscreen",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismTrack {
    AcneComedonal,
    OilControl,
    Brightening,
    Repair,
    Soothing,
    Redness,
    AntiAging,
}

impl MechanismTrack {
    pub const ALL: [MechanismTrack; 7] = [
        Self::AcneComedonal,
        Self::OilControl,
        Self::Brightening,
        Self::Repair,
        Self::Soothing,
        Self::Redness,
        Self::AntiAging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AcneComedonal => "acne_comedonal",
            Self::OilControl => "oil_control",
            Self::Brightening => "brightening",
            Self::Repair => "repair",
            Self::Soothing => "soothing",
            Self::Redness => "redness",
            Self::AntiAging => "anti_aging",
        }
    }
}

impl FromStr for MechanismTrack {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|track| track.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownTrack(value.to_owned()))
    }
}

/// Per-track efficacy estimates in `0.0..=1.0`. `None` means the catalog has no signal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanismScores {
    pub acne_comedonal: Option<f64>,
    pub oil_control: Option<f64>,
    pub brightening: Option<f64>,
    pub repair: Option<f64>,
    pub soothing: Option<f64>,
    pub redness: Option<f64>,
    pub anti_aging: Option<f64>,
}

impl MechanismScores {
    pub fn get(&self, track: MechanismTrack) -> Option<f64> {
        let value = match track {
            MechanismTrack::AcneComedonal => self.acne_comedonal,
            MechanismTrack::OilControl => self.oil_control,
            MechanismTrack::Brightening => self.brightening,
            MechanismTrack::Repair => self.repair,
            MechanismTrack::Soothing => self.soothing,
            MechanismTrack::Redness => self.redness,
            MechanismTrack::AntiAging => self.anti_aging,
        };
        value.filter(|score| score.is_finite()).map(|score| score.clamp(0.0, 1.0))
    }

    pub fn with(mut self, track: MechanismTrack, score: f64) -> Self {
        let slot = match track {
            MechanismTrack::AcneComedonal => &mut self.acne_comedonal,
            MechanismTrack::OilControl => &mut self.oil_control,
            MechanismTrack::Brightening => &mut self.brightening,
            MechanismTrack::Repair => &mut self.repair,
            MechanismTrack::Soothing => &mut self.soothing,
            MechanismTrack::Redness => &mut self.redness,
            MechanismTrack::AntiAging => &mut self.anti_aging,
        };
        *slot = Some(score);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Texture {
    Watery,
    Light,
    Gel,
    Sticky,
    Thick,
    Rich,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub texture: Texture,
    #[serde(default)]
    pub stickiness: f64,
    #[serde(default)]
    pub pilling_risk: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Alcohol,
    Acid,
    HighIrritation,
    MildAcid,
    Retinoid,
    BenzoylPeroxide,
    Fragrance,
    Mint,
    FungalAcne,
}

impl RiskFlag {
    /// Flags that veto an item for an impaired barrier.
    pub const BARRIER_VETO: [RiskFlag; 3] = [Self::Alcohol, Self::Acid, Self::HighIrritation];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alcohol => "alcohol",
            Self::Acid => "acid",
            Self::HighIrritation => "high_irritation",
            Self::MildAcid => "mild_acid",
            Self::Retinoid => "retinoid",
            Self::BenzoylPeroxide => "benzoyl_peroxide",
            Self::Fragrance => "fragrance",
            Self::Mint => "mint",
            Self::FungalAcne => "fungal_acne",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Red,
    Reddit,
    Tiktok,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialStats {
    pub platform_scores: BTreeMap<Platform, f64>,
    pub burn_rate: f64,
}

impl SocialStats {
    pub fn burn_rate(&self) -> f64 {
        if self.burn_rate.is_finite() {
            self.burn_rate.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub const GLOBAL_REGION: &str = "Global";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub brand: String,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub mechanism_scores: MechanismScores,
    #[serde(default)]
    pub experience: Option<Experience>,
    #[serde(default)]
    pub risk_flags: BTreeSet<RiskFlag>,
    #[serde(default)]
    pub social_stats: SocialStats,
    #[serde(default)]
    pub availability: Vec<String>,
    #[serde(default)]
    pub key_actives: Vec<String>,
}

fn default_currency() -> String {
    "USD".to_owned()
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: ItemId::new(id),
            brand: String::new(),
            name: name.into(),
            category,
            price: None,
            currency: default_currency(),
            mechanism_scores: MechanismScores::default(),
            experience: None,
            risk_flags: BTreeSet::new(),
            social_stats: SocialStats::default(),
            availability: Vec::new(),
            key_actives: Vec::new(),
        }
    }

    pub fn display_name(&self) -> String {
        if self.brand.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.brand, self.name)
        }
    }

    /// True when the item ships to `region` or carries the universal marker.
    pub fn is_available_in(&self, region: &str) -> bool {
        let region = region.trim();
        self.availability.iter().any(|entry| {
            let entry = entry.trim();
            entry.eq_ignore_ascii_case(region) || entry.eq_ignore_ascii_case(GLOBAL_REGION)
        })
    }
}

/// Read-only catalog snapshot for one turn.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn find(&self, item_id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == item_id)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.category == category)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, Item, MechanismScores, MechanismTrack, SocialStats};
    use crate::errors::DomainError;

    #[test]
    fn track_parsing_accepts_spacing_variants_and_rejects_unknown() {
        assert_eq!("Oil Control".parse::<MechanismTrack>(), Ok(MechanismTrack::OilControl));
        assert_eq!("acne-comedonal".parse::<MechanismTrack>(), Ok(MechanismTrack::AcneComedonal));
        assert_eq!(
            "glass_skin".parse::<MechanismTrack>(),
            Err(DomainError::UnknownTrack("glass_skin".to_owned()))
        );
    }

    #[test]
    fn mechanism_scores_clamp_and_ignore_non_finite_values() {
        let scores = MechanismScores::default()
            .with(MechanismTrack::Repair, 1.4)
            .with(MechanismTrack::Soothing, f64::NAN);

        assert_eq!(scores.get(MechanismTrack::Repair), Some(1.0));
        assert_eq!(scores.get(MechanismTrack::Soothing), None);
        assert_eq!(scores.get(MechanismTrack::Redness), None);
    }

    #[test]
    fn availability_matches_region_or_global_marker() {
        let mut item = Item::new("sku-1", "Gel Cleanser", Category::Cleanser);
        item.availability = vec!["CN".to_owned()];
        assert!(item.is_available_in("cn"));
        assert!(!item.is_available_in("US"));

        item.availability.push("global".to_owned());
        assert!(item.is_available_in("US"));
    }

    #[test]
    fn burn_rate_is_clamped() {
        let stats = SocialStats { burn_rate: 1.7, ..SocialStats::default() };
        assert_eq!(stats.burn_rate(), 1.0);
    }

    #[test]
    fn item_deserializes_with_defaults() {
        let item: Item = serde_json::from_str(
            r#"{"id":"sku-9","brand":"Acme","name":"Daily Fluid","category":"sunscreen","price":12.5}"#,
        )
        .expect("item json");

        assert_eq!(item.currency, "USD");
        assert!(item.experience.is_none());
        assert_eq!(item.price.map(|price| price.to_string()), Some("12.5".to_owned()));
        assert_eq!(item.display_name(), "Acme Daily Fluid");
    }
}
