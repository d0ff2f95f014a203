use std::collections::{BTreeSet, HashSet};

use flowcheck_core::error::ComparisonError;
use flowcheck_core::report::{FindingKind, FlowFinding, Severity};
use flowcheck_core::types::{ConsumerContract, ProducerContract};

use crate::confidence::ConfidenceScorer;
use crate::finding::{orphan_handler, orphan_producer, FindingSite};
use crate::simulator::{AppliedTransform, SimulatedContract};

/// Compares what a handler reads with what the simulated payload carries.
///
/// Presence is checked by top-level name only. A nested path is satisfied as
/// soon as its root property is present; deeper shape is not verified.
pub struct FlowComparator {
    scorer: ConfidenceScorer,
}

impl FlowComparator {
    pub fn new(scorer: ConfidenceScorer) -> Self {
        Self { scorer }
    }

    pub fn compare(
        &self,
        producer: &ProducerContract,
        simulated: &SimulatedContract,
        consumer: &ConsumerContract,
    ) -> Result<Vec<FlowFinding>, ComparisonError> {
        if producer.target_event_id != consumer.event_id || simulated.event_id != consumer.event_id {
            return Err(ComparisonError::EventMismatch {
                producer: producer.target_event_id.clone(),
                consumer: consumer.event_id.clone(),
            });
        }

        let mut findings = Vec::new();
        self.missing_properties(producer, simulated, consumer, &mut findings);
        self.nested_mismatches(producer, simulated, consumer, &mut findings);
        Ok(findings)
    }

    fn missing_properties(
        &self,
        producer: &ProducerContract,
        simulated: &SimulatedContract,
        consumer: &ConsumerContract,
        out: &mut Vec<FlowFinding>,
    ) {
        let event = consumer.event_id.as_str();
        for required in &consumer.required_properties {
            // Reported through the nested path instead.
            if required.is_nested || simulated.has(&required.name) {
                continue;
            }
            let name = required.name.as_str();
            let mut message = format!(
                "handler `{}` requires `{name}` but the payload from `{}` for event `{event}` does not contain it",
                consumer.handler_name, producer.function_name
            );
            message.push_str(&drop_note(simulated, name));

            let fix = if simulated.was_dropped(name) {
                format!("map `{name}` in the broker's special case for event `{event}`")
            } else if simulated.applied.is_exclusionary() {
                format!("add property `{name}` to the broker's special case for event `{event}`")
            } else {
                format!(
                    "add property `{name}` to the producer payload in `{}`, or to the broker's special case for event `{event}`",
                    producer.function_name
                )
            };

            let confidence =
                self.scorer
                    .property_finding(name, &producer.raw_event_id, &consumer.event_source);
            out.push(
                FindingSite {
                    kind: FindingKind::MissingProperty,
                    severity: Severity::Critical,
                    event_id: event,
                    property_path: name,
                    file_path: &consumer.file_path,
                    line: required.line,
                    detail: &producer.function_name,
                }
                .finish(confidence, message, fix),
            );
        }
    }

    fn nested_mismatches(
        &self,
        producer: &ProducerContract,
        simulated: &SimulatedContract,
        consumer: &ConsumerContract,
        out: &mut Vec<FlowFinding>,
    ) {
        let event = consumer.event_id.as_str();
        let parents: HashSet<&str> = consumer
            .nested_properties
            .iter()
            .map(|n| n.parent_path.as_str())
            .collect();

        for nested in &consumer.nested_properties {
            let path = nested.full_path();
            // Only the deepest path of a chain is reported.
            if parents.contains(path.as_str()) {
                continue;
            }
            let root = nested.root();
            if simulated.has(root) {
                continue;
            }
            let severity = if nested.is_required {
                Severity::Error
            } else {
                Severity::Warning
            };
            let mut message = format!(
                "handler `{}` reads `{path}` but `{root}` is not in the payload from `{}` for event `{event}`",
                consumer.handler_name, producer.function_name
            );
            message.push_str(&drop_note(simulated, root));
            let fix = format!(
                "ensure parent object `{}` contains `{}` in producer output",
                nested.parent_path, nested.name
            );
            let confidence =
                self.scorer
                    .property_finding(&nested.name, &producer.raw_event_id, &consumer.event_source);
            out.push(
                FindingSite {
                    kind: FindingKind::NestedMismatch,
                    severity,
                    event_id: event,
                    property_path: &path,
                    file_path: &consumer.file_path,
                    line: nested.line,
                    detail: &producer.function_name,
                }
                .finish(confidence, message, fix),
            );
        }
    }
}

fn drop_note(simulated: &SimulatedContract, name: &str) -> String {
    if !simulated.was_dropped(name) {
        return String::new();
    }
    match &simulated.applied {
        AppliedTransform::SpecialCase {
            condition: Some(condition),
            ..
        } => format!("; the producer sends it but the broker special case `{condition}` drops it"),
        _ => "; the producer sends it but the broker transformation drops it".to_string(),
    }
}

/// Handlers nobody dispatches to, and producers nobody listens to.
pub fn find_orphans(producers: &[ProducerContract], consumers: &[ConsumerContract]) -> Vec<FlowFinding> {
    let produced: BTreeSet<&str> = producers.iter().map(|p| p.target_event_id.as_str()).collect();
    let consumed: BTreeSet<&str> = consumers.iter().map(|c| c.event_id.as_str()).collect();

    let mut findings: Vec<FlowFinding> = consumers
        .iter()
        .filter(|c| !produced.contains(c.event_id.as_str()))
        .map(orphan_handler)
        .collect();
    findings.extend(
        producers
            .iter()
            .filter(|p| !consumed.contains(p.target_event_id.as_str()))
            .map(orphan_producer),
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcheck_core::config::ScoringConfig;
    use flowcheck_core::types::{
        BindingKind, BrokerTransformation, NestedProperty, PropertyBinding, RequiredProperty,
    };

    use crate::simulator::simulate;

    fn comparator() -> FlowComparator {
        FlowComparator::new(ConfidenceScorer::new(&ScoringConfig::default()))
    }

    fn producer(event: &str, props: &[&str]) -> ProducerContract {
        ProducerContract {
            function_name: "startDrop".into(),
            target_event_id: event.into(),
            raw_event_id: event.into(),
            input_parameters: vec![],
            produced_properties: props
                .iter()
                .map(|p| PropertyBinding {
                    name: p.to_string(),
                    kind: BindingKind::Parameter,
                    source_parameter: Some(p.to_string()),
                    expression: p.to_string(),
                    line: 3,
                })
                .collect(),
            file_path: "flows/drop.js".into(),
            line: 1,
        }
    }

    fn required(name: &str, line: u32) -> RequiredProperty {
        RequiredProperty {
            name: name.into(),
            is_nested: false,
            nested_path: None,
            line,
        }
    }

    fn consumer(event: &str, required: Vec<RequiredProperty>, nested: Vec<NestedProperty>) -> ConsumerContract {
        ConsumerContract {
            handler_name: "handleDrop".into(),
            event_id: event.into(),
            event_source: "handleDrop".into(),
            required_properties: required,
            optional_properties: vec![],
            nested_properties: nested,
            file_path: "handlers/drop.js".into(),
            line: 1,
        }
    }

    fn special_drop() -> BrokerTransformation {
        BrokerTransformation {
            event_id: "drop".into(),
            is_special_cased: true,
            condition: Some("eventType === 'drop'".into()),
            output_mappings: [("zoneId", "resolveZone(payload)"), ("elementId", "payload.elementId")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            added_properties: vec![],
            removed_properties: vec![],
            file_path: "broker.js".into(),
            line: 4,
        }
    }

    #[test]
    fn test_satisfied_contract_has_no_findings() {
        let p = producer("drop", &["elementId", "rawPointerEvent"]);
        let sim = simulate(&p, &[special_drop()]);
        let c = consumer("drop", vec![required("elementId", 2), required("zoneId", 3)], vec![]);
        assert!(comparator().compare(&p, &sim, &c).unwrap().is_empty());
    }

    #[test]
    fn test_dropped_property_is_reported_with_reason() {
        let p = producer("drop", &["elementId", "rawPointerEvent"]);
        let sim = simulate(&p, &[special_drop()]);
        let c = consumer("drop", vec![required("rawPointerEvent", 5)], vec![]);
        let findings = comparator().compare(&p, &sim, &c).unwrap();
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.kind, FindingKind::MissingProperty);
        assert_eq!(f.severity, Severity::Critical);
        assert_eq!(f.property_path, "rawPointerEvent");
        assert_eq!(f.line, 5);
        assert!(f.message.contains("eventType === 'drop'"), "{}", f.message);
        assert!(f.suggested_fix.contains("special case for event `drop`"));
        assert!((f.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_additive_special_case_suggests_producer_fix() {
        let p = producer("resize", &["width"]);
        let mut t = special_drop();
        t.event_id = "resize".into();
        t.is_special_cased = false;
        t.condition = Some("eventType === 'resize'".into());
        t.output_mappings.clear();
        t.added_properties = vec!["measuredAt".into()];
        let sim = simulate(&p, &[t]);
        let c = consumer("resize", vec![required("width", 2), required("height", 3)], vec![]);
        let findings = comparator().compare(&p, &sim, &c).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].property_path, "height");
        assert!(
            findings[0].suggested_fix.contains("to the producer payload in `startDrop`"),
            "{}",
            findings[0].suggested_fix
        );
    }

    #[test]
    fn test_nested_required_property_reported_once() {
        let p = producer("drop", &["elementId"]);
        let sim = simulate(&p, &[]);
        let c = consumer(
            "drop",
            vec![RequiredProperty {
                name: "context".into(),
                is_nested: true,
                nested_path: Some("context.meta.owner".into()),
                line: 4,
            }],
            vec![
                NestedProperty {
                    parent_path: "context".into(),
                    name: "meta".into(),
                    is_required: true,
                    line: 4,
                },
                NestedProperty {
                    parent_path: "context.meta".into(),
                    name: "owner".into(),
                    is_required: true,
                    line: 4,
                },
            ],
        );
        let findings = comparator().compare(&p, &sim, &c).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::NestedMismatch);
        assert_eq!(findings[0].property_path, "context.meta.owner");
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(findings[0].suggested_fix.contains("`context.meta` contains `owner`"));
    }

    #[test]
    fn test_optional_nested_is_warning_and_present_root_is_fine() {
        let p = producer("drop", &["elementId"]);
        let sim = simulate(&p, &[]);
        let nested = |root: &str| NestedProperty {
            parent_path: root.into(),
            name: "id".into(),
            is_required: false,
            line: 2,
        };
        let c = consumer("drop", vec![], vec![nested("context"), nested("elementId")]);
        let findings = comparator().compare(&p, &sim, &c).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].property_path, "context.id");
    }

    #[test]
    fn test_event_mismatch_is_an_error() {
        let p = producer("drop", &[]);
        let sim = simulate(&p, &[]);
        let c = consumer("drag-start", vec![], vec![]);
        let err = comparator().compare(&p, &sim, &c).unwrap_err();
        assert!(matches!(err, ComparisonError::EventMismatch { .. }));
    }

    #[test]
    fn test_orphans() {
        let producers = vec![producer("drop", &[]), producer("drag-start", &[])];
        let consumers = vec![consumer("drop", vec![], vec![]), consumer("resize", vec![], vec![])];
        let orphans = find_orphans(&producers, &consumers);
        let kinds: Vec<(FindingKind, &str)> =
            orphans.iter().map(|f| (f.kind, f.event_id.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (FindingKind::OrphanHandler, "resize"),
                (FindingKind::OrphanProducer, "drag-start"),
            ]
        );
        assert!(orphans.iter().all(|f| f.severity == Severity::Warning));
        assert!(orphans[0].suggested_fix.contains("create a producer for event `resize`"));
    }
}
