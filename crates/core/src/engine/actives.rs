//! Active-ingredient vocabulary shared by the routine builder and conflict detector.
//!
//! Everything here is a closed keyword table over lower-cased text. Unknown
//! strings classify as `None` rather than guessing.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::item::{Item, RiskFlag};
use crate::engine::classify::{contains_term, Confidence};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveClass {
    ExfoliatingAcid,
    Retinoid,
    VitaminC,
    CopperPeptide,
    BenzoylPeroxide,
    BarrierSupport,
}

impl ActiveClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExfoliatingAcid => "exfoliating_acid",
            Self::Retinoid => "retinoid",
            Self::VitaminC => "vitamin_c",
            Self::CopperPeptide => "copper_peptide",
            Self::BenzoylPeroxide => "benzoyl_peroxide",
            Self::BarrierSupport => "barrier_support",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcidStrength {
    Mild,
    Strong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedActive {
    pub class: ActiveClass,
    /// Only set for exfoliating acids.
    pub strength: Option<AcidStrength>,
    pub confidence: Confidence,
}

const COPPER_PEPTIDE_TERMS: &[&str] = &["copper peptide", "copper tripeptide", "ghk-cu", "ghk cu", "蓝铜"];
const BENZOYL_PEROXIDE_TERMS: &[&str] = &["benzoyl peroxide", "过氧化苯甲酰"];
const RETINOID_TERMS: &[&str] = &[
    "retinol",
    "retinal",
    "retinaldehyde",
    "tretinoin",
    "adapalene",
    "tazarotene",
    "retinoate",
    "retinoid",
    "a醇",
    "维a",
    "视黄",
    "阿达帕林",
];
const VITAMIN_C_TERMS: &[&str] =
    &["l-ascorbic", "ascorbic acid", "vitamin c", "ascorbyl", "ascorbate", "维c", "维生素c"];
const VITAMIN_C_DERIVATIVES: &[&str] = &["ascorbyl", "ascorbate"];
/// Acids that do not exfoliate: humectants, brighteners and pH adjusters.
const NON_EXFOLIATING_ACIDS: &[&str] = &[
    "hyaluronic",
    "hyaluronate",
    "tranexamic",
    "kojic",
    "ferulic",
    "citric",
    "linoleic",
    "amino acid",
    "fatty acid",
    "透明质酸",
    "玻尿酸",
    "传明酸",
];
const MILD_ACID_TERMS: &[&str] =
    &["azelaic", "mandelic", "gluconolactone", "lactobionic", "pha", "壬二酸", "杏仁酸", "葡糖酸内酯"];
const STRONG_ACID_TERMS: &[&str] = &[
    "salicylic",
    "betaine salicylate",
    "glycolic",
    "lactic acid",
    "bha",
    "aha",
    "水杨酸",
    "乙醇酸",
    "果酸",
];
const BARRIER_SUPPORT_TERMS: &[&str] = &[
    "hyaluronic",
    "hyaluronate",
    "ceramide",
    "cholesterol",
    "panthenol",
    "centella",
    "madecassoside",
    "asiaticoside",
    "allantoin",
    "squalane",
    "神经酰胺",
    "泛醇",
    "积雪草",
    "透明质酸",
    "玻尿酸",
];
const BRIGHTENING_TERMS: &[&str] = &[
    "niacinamide",
    "tranexamic",
    "arbutin",
    "kojic",
    "vitamin c",
    "ascorb",
    "azelaic",
    "licorice",
    "glabridin",
    "烟酰胺",
    "传明酸",
    "熊果苷",
    "曲酸",
];

/// Classifies one active name. Order matters: copper before peptide-adjacent
/// terms, vitamin C before the generic acid check, humectant acids before acids.
pub fn classify_active(raw: &str) -> Option<ClassifiedActive> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    if let Some(term) = first_match(&text, COPPER_PEPTIDE_TERMS) {
        return Some(plain(ActiveClass::CopperPeptide, &text, term));
    }
    if let Some(term) = first_match(&text, BENZOYL_PEROXIDE_TERMS) {
        return Some(plain(ActiveClass::BenzoylPeroxide, &text, term));
    }
    if let Some(term) = first_match(&text, RETINOID_TERMS) {
        return Some(plain(ActiveClass::Retinoid, &text, term));
    }
    if let Some(term) = first_match(&text, VITAMIN_C_TERMS) {
        let mut classified = plain(ActiveClass::VitaminC, &text, term);
        if VITAMIN_C_DERIVATIVES.contains(&term) {
            classified.confidence = Confidence::Medium;
        }
        return Some(classified);
    }
    if first_match(&text, NON_EXFOLIATING_ACIDS).is_some() {
        return first_match(&text, BARRIER_SUPPORT_TERMS)
            .map(|term| plain(ActiveClass::BarrierSupport, &text, term));
    }
    if let Some(term) = first_match(&text, MILD_ACID_TERMS) {
        return Some(acid(AcidStrength::Mild, &text, term));
    }
    if let Some(term) = first_match(&text, STRONG_ACID_TERMS) {
        return Some(acid(AcidStrength::Strong, &text, term));
    }
    first_match(&text, BARRIER_SUPPORT_TERMS).map(|term| plain(ActiveClass::BarrierSupport, &text, term))
}

pub fn is_brightening_active(raw: &str) -> bool {
    let text = raw.trim().to_lowercase();
    first_match(&text, BRIGHTENING_TERMS).is_some()
}

fn plain(class: ActiveClass, text: &str, term: &str) -> ClassifiedActive {
    ClassifiedActive { class, strength: None, confidence: confidence_for(text, term) }
}

fn acid(strength: AcidStrength, text: &str, term: &str) -> ClassifiedActive {
    ClassifiedActive {
        class: ActiveClass::ExfoliatingAcid,
        strength: Some(strength),
        confidence: confidence_for(text, term),
    }
}

/// Exact names are high confidence; a keyword buried in a longer label is medium.
fn confidence_for(text: &str, term: &str) -> Confidence {
    let bare = text.trim_end_matches(" acid");
    if text == term || bare == term || bare == term.trim_end_matches(" acid") {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn first_match(text: &str, terms: &[&'static str]) -> Option<&'static str> {
    terms.iter().copied().find(|term| matches_keyword(text, term))
}

/// Short ASCII abbreviations (`aha`, `pha`) must stand alone; longer terms match as substrings.
fn matches_keyword(text: &str, term: &str) -> bool {
    if term.is_ascii() && term.len() <= 3 {
        contains_term(text, term)
    } else {
        text.contains(term)
    }
}

fn ingredient_tokens(ingredients: &str) -> Vec<String> {
    ingredients
        .to_lowercase()
        .split([',', '，'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

fn any_token(tokens: &[String], needles: &[&str]) -> bool {
    tokens.iter().any(|token| needles.iter().any(|needle| token.contains(needle)))
}

const ALCOHOL_TERMS: &[&str] = &["alcohol denat", "denatured alcohol", "sd alcohol", "ethyl alcohol"];
const INCI_RETINOIDS: &[&str] =
    &["retinol", "retinal", "tretinoin", "adapalene", "tazarotene", "retinoate"];
const INCI_STRONG_ACIDS: &[&str] = &["salicylic acid", "betaine salicylate", "glycolic acid", "lactic acid"];
const INCI_MILD_ACIDS: &[&str] = &["azelaic acid", "mandelic acid", "gluconolactone", "lactobionic acid"];
const FRAGRANCE_TERMS: &[&str] = &[
    "fragrance",
    "parfum",
    "perfume",
    "limonene",
    "linalool",
    "citral",
    "geraniol",
    "eugenol",
    "coumarin",
    "farnesol",
    "benzyl benzoate",
    "benzyl salicylate",
];
const MINT_TERMS: &[&str] = &["menthol", "peppermint", "mentha", "camphor", "eucalyptus"];

/// Conservative risk flags from an INCI list.
///
/// Alcohol counts only in the top five ingredients and strong acids only in the
/// top ten; `high_irritation` is reserved for strong actives.
pub fn infer_risk_flags(ingredients: &str) -> BTreeSet<RiskFlag> {
    let tokens = ingredient_tokens(ingredients);
    let top5 = &tokens[..tokens.len().min(5)];
    let top10 = &tokens[..tokens.len().min(10)];

    let mut flags = BTreeSet::new();
    let strong_acid = any_token(top10, INCI_STRONG_ACIDS);
    let retinoid = any_token(&tokens, INCI_RETINOIDS);
    let benzoyl_peroxide = any_token(&tokens, &["benzoyl peroxide"]);

    if any_token(top5, ALCOHOL_TERMS) {
        flags.insert(RiskFlag::Alcohol);
    }
    if strong_acid {
        flags.insert(RiskFlag::Acid);
    } else if any_token(&tokens, INCI_MILD_ACIDS)
        || tokens.iter().any(|token| contains_term(token, "pha"))
    {
        flags.insert(RiskFlag::MildAcid);
    }
    if retinoid {
        flags.insert(RiskFlag::Retinoid);
    }
    if benzoyl_peroxide {
        flags.insert(RiskFlag::BenzoylPeroxide);
    }
    if strong_acid || retinoid || benzoyl_peroxide {
        flags.insert(RiskFlag::HighIrritation);
    }
    if any_token(&tokens, FRAGRANCE_TERMS) {
        flags.insert(RiskFlag::Fragrance);
    }
    if any_token(&tokens, MINT_TERMS) {
        flags.insert(RiskFlag::Mint);
    }
    if any_token(&tokens, &["polysorbate"]) {
        flags.insert(RiskFlag::FungalAcne);
    }
    flags
}

const MAX_KEY_ACTIVES: usize = 16;

const KEY_ACTIVE_LABELS: &[(&str, &[&str])] = &[
    ("Niacinamide", &["niacinamide", "烟酰胺"]),
    ("Tranexamic Acid", &["tranexamic acid", "传明酸"]),
    ("Arbutin", &["arbutin", "熊果苷"]),
    ("Kojic Acid", &["kojic", "曲酸"]),
    ("Azelaic Acid", &["azelaic", "壬二酸"]),
    ("Vitamin C", &["ascorbic acid", "l-ascorbic", "ascorbyl", "ascorbate", "维c", "维生素c"]),
    ("Retinoid", &["retinol", "retinal", "tretinoin", "retinoate", "a醇", "维a", "视黄"]),
    ("Salicylic Acid", &["salicylic acid", "betaine salicylate", "capryloyl salicylic", "水杨酸"]),
    ("Glycolic Acid", &["glycolic acid", "乙醇酸"]),
    ("Lactic Acid", &["lactic acid", "乳酸"]),
    ("Mandelic Acid", &["mandelic acid", "杏仁酸"]),
    ("Gluconolactone", &["gluconolactone", "lactobionic", "葡糖酸内酯"]),
    ("Copper Peptide", &["copper tripeptide", "ghk-cu", "蓝铜"]),
    ("Peptides", &["peptide", "palmitoyl", "多肽"]),
    ("Panthenol", &["panthenol", "泛醇"]),
    ("Ceramides", &["ceramide", "神经酰胺"]),
    ("Cholesterol", &["cholesterol", "胆固醇"]),
    ("Centella", &["centella", "madecassoside", "asiaticoside", "积雪草"]),
    ("Allantoin", &["allantoin", "尿囊素"]),
    ("Hyaluronic Acid", &["hyaluronic", "sodium hyaluronate", "透明质酸", "玻尿酸"]),
    ("Benzoyl Peroxide", &["benzoyl peroxide", "过氧化苯甲酰"]),
    ("Adapalene", &["adapalene", "阿达帕林"]),
];

/// Key actives named in an INCI list, seeded by curated names when present.
pub fn infer_key_actives(ingredients: &str, curated: &[String]) -> Vec<String> {
    let lower = ingredients.to_lowercase();
    let mut seen = HashSet::new();
    let mut actives = Vec::new();

    let curated = curated.iter().map(|label| label.trim()).filter(|label| label.chars().count() >= 2);
    for label in curated {
        if seen.insert(label.to_lowercase()) {
            actives.push(label.to_owned());
        }
    }

    for (label, needles) in KEY_ACTIVE_LABELS {
        if needles.iter().any(|needle| lower.contains(needle)) && seen.insert(label.to_lowercase()) {
            actives.push((*label).to_owned());
        }
    }

    actives.truncate(MAX_KEY_ACTIVES);
    actives
}

const WASH_OFF_MARKERS: &[&str] = &["cleanser", "cleansing", "wash", "soap", "foam"];

pub fn looks_like_wash_off(name: &str) -> bool {
    let name = name.to_lowercase();
    WASH_OFF_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Keeps a reported burn rate consistent with the item's deterministic flags.
///
/// Wash-off products without strong actives are capped below the veto line;
/// strong leave-on actives get a floor.
pub fn calibrate_burn_rate(burn_rate: f64, flags: &BTreeSet<RiskFlag>, name: &str) -> f64 {
    let rate = if burn_rate.is_finite() { burn_rate.clamp(0.0, 1.0) } else { 0.0 };
    let strong = [RiskFlag::Acid, RiskFlag::Retinoid, RiskFlag::BenzoylPeroxide, RiskFlag::HighIrritation]
        .iter()
        .any(|flag| flags.contains(flag));
    let medium =
        [RiskFlag::Alcohol, RiskFlag::Fragrance, RiskFlag::Mint].iter().any(|flag| flags.contains(flag));

    if looks_like_wash_off(name) && !strong {
        return rate.min(if medium { 0.10 } else { 0.08 });
    }
    if strong {
        return rate.max(0.12);
    }
    if medium {
        return rate.min(0.25);
    }
    rate.min(0.15)
}

/// Folds an INCI list into a catalog item: merged risk flags, key actives, calibrated burn rate.
pub fn enrich_item(item: &mut Item, ingredients: &str) {
    if ingredients.trim().is_empty() {
        return;
    }
    item.risk_flags.extend(infer_risk_flags(ingredients));
    item.key_actives = infer_key_actives(ingredients, &item.key_actives);

    let label = if item.category.is_wash_off() { "cleanser" } else { item.name.as_str() };
    item.social_stats.burn_rate = calibrate_burn_rate(item.social_stats.burn_rate, &item.risk_flags, label);
}
