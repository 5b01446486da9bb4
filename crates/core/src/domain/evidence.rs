use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::item::{Item, ItemId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetTopic {
    Sensitivity,
    KeyActives,
    Comparison,
    Usage,
    Texture,
    Notes,
    Unknown,
}

const SENSITIVITY_MARKERS: &[&str] = &["sensitivity", "irrit", "risk", "敏感", "刺激", "刺痛", "过敏"];
const KEY_ACTIVE_MARKERS: &[&str] = &["主要成分", "核心成分", "关键活性", "功效成分"];
const COMPARISON_MARKERS: &[&str] = &["comparison", "compare", "dupe", "替代", "平替", "对比", "竞品"];
const USAGE_MARKERS: &[&str] = &[
    "usage", "routine", "layer", "frequency", "warning", "caution", "用法", "搭配", "叠加", "频率",
    "注意事项", "警示", "警告",
];
const TEXTURE_MARKERS: &[&str] = &["texture", "finish", "pilling", "质地", "清爽", "厚重", "搓泥", "成膜", "油腻"];

impl SnippetTopic {
    /// Classifies a free-form field label from a knowledge-base snippet.
    ///
    /// Sensitivity wins over every other topic so irritation warnings are never filed as notes.
    pub fn infer(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return Self::Unknown;
        }

        let has_any = |markers: &[&str]| markers.iter().any(|marker| label.contains(marker));

        if has_any(SENSITIVITY_MARKERS) {
            return Self::Sensitivity;
        }
        if label.contains("key_actives")
            || (label.contains("key") && label.contains("active"))
            || has_any(KEY_ACTIVE_MARKERS)
        {
            return Self::KeyActives;
        }
        if has_any(COMPARISON_MARKERS) {
            return Self::Comparison;
        }
        if has_any(USAGE_MARKERS) {
            return Self::Usage;
        }
        if has_any(TEXTURE_MARKERS) {
            return Self::Texture;
        }
        Self::Notes
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub topic: SnippetTopic,
    pub text: String,
}

impl EvidenceSnippet {
    pub fn labelled(label: &str, text: impl Into<String>) -> Self {
        Self { topic: SnippetTopic::infer(label), text: text.into() }
    }
}

/// Knowledge-base summary for one item, already fetched by a collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePack {
    pub item_id: ItemId,
    #[serde(default)]
    pub snippets: Vec<EvidenceSnippet>,
}

const PLACEHOLDERS: &[&str] = &["n/a", "na", "none", "unknown"];

impl EvidencePack {
    pub fn new(item_id: ItemId, snippets: Vec<EvidenceSnippet>) -> Self {
        Self { item_id, snippets }
    }

    pub fn topic(&self, topic: SnippetTopic) -> impl Iterator<Item = &EvidenceSnippet> {
        self.snippets.iter().filter(move |snippet| snippet.topic == topic)
    }

    /// Actives named by `key_actives` snippets, deduplicated case-insensitively.
    pub fn key_actives(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut actives = Vec::new();
        for snippet in self.topic(SnippetTopic::KeyActives) {
            for part in snippet.text.split(['|', ',', '，', ';', '/']) {
                let cleaned = part.trim();
                if cleaned.chars().count() < 2 {
                    continue;
                }
                let key = cleaned.to_lowercase();
                if PLACEHOLDERS.contains(&key.as_str()) {
                    continue;
                }
                if seen.insert(key) {
                    actives.push(cleaned.to_owned());
                }
            }
        }
        actives
    }

    /// Count of snippets per topic, every topic present.
    pub fn coverage(&self) -> BTreeMap<SnippetTopic, usize> {
        let mut coverage: BTreeMap<SnippetTopic, usize> = [
            SnippetTopic::Sensitivity,
            SnippetTopic::KeyActives,
            SnippetTopic::Comparison,
            SnippetTopic::Usage,
            SnippetTopic::Texture,
            SnippetTopic::Notes,
            SnippetTopic::Unknown,
        ]
        .into_iter()
        .map(|topic| (topic, 0))
        .collect();
        for snippet in &self.snippets {
            *coverage.entry(snippet.topic).or_insert(0) += 1;
        }
        coverage
    }
}

/// Evidence packs for the items in play this turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceIndex(pub BTreeMap<ItemId, EvidencePack>);

impl EvidenceIndex {
    pub fn new(packs: impl IntoIterator<Item = EvidencePack>) -> Self {
        Self(packs.into_iter().map(|pack| (pack.item_id.clone(), pack)).collect())
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&EvidencePack> {
        self.0.get(item_id)
    }

    /// Evidence-pack actives when the pack names any, else the catalog's own list.
    pub fn actives_for(&self, item: &Item) -> Vec<String> {
        let from_pack = self.get(&item.id).map(EvidencePack::key_actives).unwrap_or_default();
        if from_pack.is_empty() {
            item.key_actives.clone()
        } else {
            from_pack
        }
    }
}
