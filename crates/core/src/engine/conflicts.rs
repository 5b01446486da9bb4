use serde::{Deserialize, Serialize};

use crate::domain::evidence::EvidenceIndex;
use crate::domain::routine::{RoutineRec, Step};
use crate::engine::actives::{classify_active, ActiveClass};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Caution,
    Avoid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFinding {
    pub a_active: String,
    pub b_active: String,
    pub severity: ConflictSeverity,
    pub message: String,
}

#[derive(Clone, Copy, Debug)]
struct ConflictRule {
    first: ActiveClass,
    second: ActiveClass,
    severity: ConflictSeverity,
    message: &'static str,
}

const RULES: [ConflictRule; 5] = [
    ConflictRule {
        first: ActiveClass::ExfoliatingAcid,
        second: ActiveClass::Retinoid,
        severity: ConflictSeverity::Avoid,
        message: "Exfoliating acids and retinoids in the same application over-exfoliate; alternate nights.",
    },
    ConflictRule {
        first: ActiveClass::CopperPeptide,
        second: ActiveClass::ExfoliatingAcid,
        severity: ConflictSeverity::Avoid,
        message: "Direct acids break down copper peptides; use them in separate routines.",
    },
    ConflictRule {
        first: ActiveClass::CopperPeptide,
        second: ActiveClass::VitaminC,
        severity: ConflictSeverity::Avoid,
        message: "Copper peptides and pure vitamin C destabilize each other; keep vitamin C in the morning.",
    },
    ConflictRule {
        first: ActiveClass::BenzoylPeroxide,
        second: ActiveClass::Retinoid,
        severity: ConflictSeverity::Avoid,
        message: "Benzoyl peroxide can oxidize retinoids; apply them at different times of day.",
    },
    ConflictRule {
        first: ActiveClass::BenzoylPeroxide,
        second: ActiveClass::VitaminC,
        severity: ConflictSeverity::Caution,
        message: "Benzoyl peroxide can oxidize vitamin C; prefer separate routines.",
    },
];

/// Detects known active-pair conflicts. Results are order-independent.
pub trait ConflictDetector: Send + Sync {
    /// Conflicts between a candidate's actives and another set, such as the user's current routine.
    fn detect_pair(&self, candidate: &[String], existing: &[String]) -> Vec<ConflictFinding>;

    /// Conflicts among actives applied together in one application.
    fn detect_application(&self, actives: &[String]) -> Vec<ConflictFinding>;

    /// AM and PM applications are checked separately.
    fn detect_routine(&self, routine: &RoutineRec, evidence: &EvidenceIndex) -> Vec<ConflictFinding> {
        let am = self.detect_application(&application_actives(&routine.am, evidence));
        let pm = self.detect_application(&application_actives(&routine.pm, evidence));
        merge_findings(am.into_iter().chain(pm))
    }
}

/// Detector backed by the fixed rule table.
#[derive(Clone, Debug, Default)]
pub struct RuleTableConflictDetector;

impl ConflictDetector for RuleTableConflictDetector {
    fn detect_pair(&self, candidate: &[String], existing: &[String]) -> Vec<ConflictFinding> {
        let left = classify_all(candidate);
        let right = classify_all(existing);

        let mut pairs = Vec::new();
        for (x, x_class) in &left {
            for (y, y_class) in &right {
                pairs.push((x.as_str(), *x_class, y.as_str(), *y_class));
                pairs.push((y.as_str(), *y_class, x.as_str(), *x_class));
            }
        }
        findings_for(&pairs)
    }

    fn detect_application(&self, actives: &[String]) -> Vec<ConflictFinding> {
        let classified = classify_all(actives);

        let mut pairs = Vec::new();
        for (index, (x, x_class)) in classified.iter().enumerate() {
            for (y, y_class) in classified.iter().skip(index + 1) {
                pairs.push((x.as_str(), *x_class, y.as_str(), *y_class));
                pairs.push((y.as_str(), *y_class, x.as_str(), *x_class));
            }
        }
        findings_for(&pairs)
    }
}

fn classify_all(actives: &[String]) -> Vec<(String, ActiveClass)> {
    actives
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .filter_map(|raw| classify_active(raw).map(|active| (raw.to_owned(), active.class)))
        .collect()
}

/// One finding per rule, built from the lexicographically smallest matching pair.
fn findings_for(pairs: &[(&str, ActiveClass, &str, ActiveClass)]) -> Vec<ConflictFinding> {
    let findings = RULES.iter().filter_map(|rule| {
        pairs
            .iter()
            .filter(|(_, a_class, _, b_class)| *a_class == rule.first && *b_class == rule.second)
            .map(|(a, _, b, _)| (*a, *b))
            .min()
            .map(|(a, b)| ConflictFinding {
                a_active: a.to_owned(),
                b_active: b.to_owned(),
                severity: rule.severity,
                message: rule.message.to_owned(),
            })
    });
    merge_findings(findings)
}

/// Deduplicates by message, keeping the smallest actives, ordered by rule.
fn merge_findings(findings: impl Iterator<Item = ConflictFinding>) -> Vec<ConflictFinding> {
    let mut merged: Vec<ConflictFinding> = Vec::new();
    for finding in findings {
        match merged.iter_mut().find(|existing| existing.message == finding.message) {
            Some(existing) => {
                if (finding.a_active.as_str(), finding.b_active.as_str())
                    < (existing.a_active.as_str(), existing.b_active.as_str())
                {
                    *existing = finding;
                }
            }
            None => merged.push(finding),
        }
    }
    merged.sort_by_key(|finding| rule_rank(&finding.message));
    merged
}

fn rule_rank(message: &str) -> usize {
    RULES.iter().position(|rule| rule.message == message).unwrap_or(RULES.len())
}

fn application_actives(steps: &[Step], evidence: &EvidenceIndex) -> Vec<String> {
    steps.iter().flat_map(|step| evidence.actives_for(&step.item)).collect()
}
