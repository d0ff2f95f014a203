use std::collections::{BTreeMap, BTreeSet};

use flowcheck_core::report::{FindingKind, FlowFinding, Recommendation};

/// Groups findings by kind and writes one fix text per group.
#[derive(Debug, Default)]
pub struct RecommendationBuilder {
    groups: BTreeMap<FindingKind, Group>,
}

#[derive(Debug, Default)]
struct Group {
    events: BTreeSet<String>,
    paths: BTreeSet<String>,
    files: BTreeSet<String>,
    count: u32,
}

impl RecommendationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, finding: &FlowFinding) {
        let group = self.groups.entry(finding.kind).or_default();
        if !finding.event_id.is_empty() {
            group.events.insert(finding.event_id.clone());
        }
        if !finding.property_path.is_empty() {
            group.paths.insert(finding.property_path.clone());
        }
        group.files.insert(finding.file_path.clone());
        group.count += 1;
    }

    pub fn build(self) -> Vec<Recommendation> {
        self.groups
            .into_iter()
            .map(|(kind, group)| Recommendation {
                kind,
                text: fix_text(kind, &group),
                event_ids: group.events.into_iter().collect(),
                count: group.count,
            })
            .collect()
    }

    pub fn from_findings(findings: &[FlowFinding]) -> Vec<Recommendation> {
        let mut builder = Self::new();
        for finding in findings {
            builder.add(finding);
        }
        builder.build()
    }
}

fn join(items: &BTreeSet<String>) -> String {
    items
        .iter()
        .map(|i| format!("`{i}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn fix_text(kind: FindingKind, group: &Group) -> String {
    let events = join(&group.events);
    match kind {
        FindingKind::MissingProperty => format!(
            "add property {} to the producer payload, or to the broker's special case for event {events}",
            join(&group.paths)
        ),
        FindingKind::NestedMismatch => {
            let parts: Vec<String> = group
                .paths
                .iter()
                .filter_map(|p| p.rsplit_once('.'))
                .map(|(parent, leaf)| format!("`{parent}` contains `{leaf}`"))
                .collect();
            format!("ensure parent object {} in producer output", parts.join(", "))
        }
        FindingKind::OrphanHandler => format!("create a producer for event {events}"),
        FindingKind::OrphanProducer => {
            format!("add a handler for event {events} or remove the dispatch")
        }
        FindingKind::DiscoveryFailed => {
            "check that the module path exists and is a readable directory".to_string()
        }
        FindingKind::ExtractionFailed => format!(
            "fix or ignore the files that could not be parsed: {}",
            join(&group.files)
        ),
        FindingKind::ComparisonFailed => {
            "re-run validation; some handlers were paired with the wrong producer".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcheck_core::report::Severity;

    fn finding(kind: FindingKind, event: &str, path: &str) -> FlowFinding {
        FlowFinding {
            id: String::new(),
            kind,
            event_id: event.into(),
            property_path: path.into(),
            severity: Severity::Critical,
            confidence: 0.9,
            message: String::new(),
            suggested_fix: String::new(),
            file_path: "handlers/drop.js".into(),
            line: 1,
        }
    }

    #[test]
    fn test_groups_by_kind() {
        let recs = RecommendationBuilder::from_findings(&[
            finding(FindingKind::MissingProperty, "drop", "zoneId"),
            finding(FindingKind::MissingProperty, "drop", "rawPointerEvent"),
            finding(FindingKind::OrphanHandler, "resize", ""),
        ]);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].kind, FindingKind::MissingProperty);
        assert_eq!(recs[0].count, 2);
        assert_eq!(recs[0].event_ids, vec!["drop"]);
        assert_eq!(
            recs[0].text,
            "add property `rawPointerEvent`, `zoneId` to the producer payload, or to the broker's special case for event `drop`"
        );
        assert_eq!(recs[1].text, "create a producer for event `resize`");
    }

    #[test]
    fn test_nested_text_names_parent() {
        let recs = RecommendationBuilder::from_findings(&[finding(
            FindingKind::NestedMismatch,
            "drop",
            "context.meta.owner",
        )]);
        assert_eq!(
            recs[0].text,
            "ensure parent object `context.meta` contains `owner` in producer output"
        );
    }

    #[test]
    fn test_empty() {
        assert!(RecommendationBuilder::from_findings(&[]).is_empty());
    }
}
