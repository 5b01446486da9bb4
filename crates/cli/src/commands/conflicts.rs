use skinfit_core::{ConflictDetector, ConflictFinding, ConflictSeverity, RuleTableConflictDetector};
use tracing::debug;

use crate::commands::CommandResult;

const COMMAND: &str = "conflicts";

/// Checks one application's actives, or a candidate set against what the user already uses.
pub fn run(actives: &[String], against: Option<&[String]>) -> CommandResult {
    let actives = normalize(actives);
    if actives.is_empty() {
        return CommandResult::failure(COMMAND, "invalid_request", "at least one active is required", 3);
    }

    let detector = RuleTableConflictDetector;
    let findings = match against {
        Some(existing) => detector.detect_pair(&actives, &normalize(existing)),
        None => detector.detect_application(&actives),
    };

    debug!(event_name = "cli.conflicts.completed", findings = findings.len(), "conflict check finished");
    CommandResult::with_data(COMMAND, summarize(&findings), &findings)
}

fn normalize(actives: &[String]) -> Vec<String> {
    actives.iter().map(|active| active.trim()).filter(|active| !active.is_empty()).map(str::to_string).collect()
}

fn summarize(findings: &[ConflictFinding]) -> String {
    if findings.is_empty() {
        return "no conflicts detected".to_string();
    }
    let avoid = findings.iter().filter(|finding| finding.severity == ConflictSeverity::Avoid).count();
    format!("{} conflict(s) detected; {avoid} to avoid", findings.len())
}
