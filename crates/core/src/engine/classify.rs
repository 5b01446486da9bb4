//! Keyword classification of free-form profile text.
//!
//! Returns closed-set tags with a confidence indicator; language detection and
//! conversation handling live upstream.

use serde::{Deserialize, Serialize};

use crate::domain::profile::{BarrierStatus, SkinType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification<T> {
    pub value: T,
    pub confidence: Confidence,
    pub matched: Vec<String>,
}

const SKIN_TYPE_KEYWORDS: &[(SkinType, &[&str])] = &[
    (SkinType::Oily, &["oily", "greasy", "shiny", "oil slick", "油皮", "出油", "大油田"]),
    (SkinType::Dry, &["dry", "dryness", "flaky", "tight", "dehydrated", "干皮", "起皮", "紧绷"]),
    (SkinType::Combination, &["combination", "combo", "t-zone", "混合", "混油", "混干"]),
    (SkinType::Normal, &["normal skin", "中性"]),
    (SkinType::Sensitive, &["sensitive", "reactive", "easily irritated", "敏感", "敏感肌"]),
];

const IMPAIRED_BARRIER_KEYWORDS: &[&str] = &[
    "damaged barrier",
    "barrier is damaged",
    "compromised barrier",
    "impaired barrier",
    "over-exfoliated",
    "overexfoliated",
    "stinging",
    "burning",
    "raw skin",
    "屏障受损",
    "烂脸",
    "刺痛",
    "泛红刺痛",
];

/// Skin types mentioned in `text`, in the enum's declaration order.
pub fn classify_skin_types(text: &str) -> Vec<Classification<SkinType>> {
    let normalized = text.to_lowercase();
    SKIN_TYPE_KEYWORDS
        .iter()
        .filter_map(|(skin_type, keywords)| {
            let matched = matched_terms(&normalized, keywords);
            (!matched.is_empty()).then(|| Classification {
                value: *skin_type,
                confidence: confidence_for(matched.len()),
                matched,
            })
        })
        .collect()
}

/// Barrier status from `text`; silence resolves to healthy at low confidence.
pub fn classify_barrier(text: &str) -> Classification<BarrierStatus> {
    let normalized = text.to_lowercase();
    let matched = matched_terms(&normalized, IMPAIRED_BARRIER_KEYWORDS);
    if matched.is_empty() {
        return Classification {
            value: BarrierStatus::Healthy,
            confidence: Confidence::Low,
            matched,
        };
    }

    Classification { value: BarrierStatus::Impaired, confidence: confidence_for(matched.len()), matched }
}

fn matched_terms(normalized: &str, keywords: &[&str]) -> Vec<String> {
    keywords
        .iter()
        .filter(|keyword| contains_term(normalized, keyword))
        .map(|keyword| (*keyword).to_owned())
        .collect()
}

fn confidence_for(matches: usize) -> Confidence {
    if matches >= 2 {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

/// Whole-word match for ASCII terms, plain substring for everything else.
pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if !term.is_ascii() {
        return haystack.contains(term);
    }

    let bytes = haystack.as_bytes();
    let mut start = 0;
    while let Some(offset) = haystack[start..].find(term) {
        let begin = start + offset;
        let end = begin + term.len();
        let before_ok = begin == 0 || !bytes[begin - 1].is_ascii_alphanumeric();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}
