// Invariants that must hold for any contract set, not just the fixtures.
use std::collections::BTreeMap;

use flowcheck_core::config::ScoringConfig;
use flowcheck_core::report::FindingKind;
use flowcheck_core::types::{
    BindingKind, BrokerTransformation, ConsumerContract, ProducerContract, PropertyBinding,
    RequiredProperty,
};
use flowcheck_enforce::comparator::FlowComparator;
use flowcheck_enforce::confidence::ConfidenceScorer;
use flowcheck_enforce::simulator::simulate;
use flowcheck_enforce::FlowEngine;

use crate::common::Module;

const NAMES: &[&str] = &[
    "elementId", "zoneId", "id", "data", "rawPointerEvent", "ts", "context", "sequenceId",
];

fn producer(props: &[&str]) -> ProducerContract {
    ProducerContract {
        function_name: "start".into(),
        target_event_id: "drop".into(),
        raw_event_id: "drop".into(),
        input_parameters: vec![],
        produced_properties: props
            .iter()
            .map(|p| PropertyBinding {
                name: p.to_string(),
                kind: BindingKind::Parameter,
                source_parameter: Some(p.to_string()),
                expression: p.to_string(),
                line: 2,
            })
            .collect(),
        file_path: "flows/start.js".into(),
        line: 1,
    }
}

fn consumer(required: &[&str]) -> ConsumerContract {
    ConsumerContract {
        handler_name: "handleDrop".into(),
        event_id: "drop".into(),
        event_source: "handleDrop".into(),
        required_properties: required
            .iter()
            .enumerate()
            .map(|(i, name)| RequiredProperty {
                name: name.to_string(),
                is_nested: false,
                nested_path: None,
                line: i as u32 + 2,
            })
            .collect(),
        optional_properties: vec![],
        nested_properties: vec![],
        file_path: "handlers/drop.js".into(),
        line: 1,
    }
}

fn transform(event: &str, special: bool, mappings: &[&str], added: &[&str]) -> BrokerTransformation {
    BrokerTransformation {
        event_id: event.into(),
        is_special_cased: special,
        condition: None,
        output_mappings: mappings
            .iter()
            .map(|m| (m.to_string(), m.to_string()))
            .collect::<BTreeMap<_, _>>(),
        added_properties: added.iter().map(|a| a.to_string()).collect(),
        removed_properties: vec![],
        file_path: "broker.js".into(),
        line: 1,
    }
}

/// Every subset of `NAMES` selected by the bits of `mask`.
fn subset(mask: u32) -> Vec<&'static str> {
    NAMES
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, n)| *n)
        .collect()
}

fn comparator() -> FlowComparator {
    FlowComparator::new(ConfidenceScorer::new(&ScoringConfig::default()))
}

#[test]
fn test_additive_default_never_loses_producer_properties() {
    let default = transform("*", false, &["sequenceId"], &["sequenceId"]);
    let all = (1u32 << NAMES.len()) - 1;
    for produced_mask in (0..=all).step_by(7) {
        let produced = subset(produced_mask);
        let p = producer(&produced);
        let sim = simulate(&p, std::slice::from_ref(&default));
        // Any subset of the producer's properties.
        let required = subset(produced_mask & 0b1010_1101);
        let findings = comparator().compare(&p, &sim, &consumer(&required)).unwrap();
        assert!(
            findings.iter().all(|f| f.kind != FindingKind::MissingProperty),
            "produced {produced:?} required {required:?}: {findings:#?}"
        );
    }
}

#[test]
fn test_special_case_reports_everything_outside_its_mappings() {
    let kept = ["elementId", "zoneId"];
    let added = ["sequenceId"];
    let special = transform("drop", true, &kept, &added);
    let default = transform("*", false, &[], &["ts"]);
    let all = (1u32 << NAMES.len()) - 1;

    for mask in (1..=all).step_by(5) {
        let required = subset(mask);
        let p = producer(NAMES);
        let sim = simulate(&p, &[default.clone(), special.clone()]);
        let findings = comparator().compare(&p, &sim, &consumer(&required)).unwrap();
        let mut reported: Vec<&str> = findings.iter().map(|f| f.property_path.as_str()).collect();
        reported.sort_unstable();
        let mut expected: Vec<&str> = required
            .iter()
            .copied()
            .filter(|r| !kept.contains(r) && !added.contains(r))
            .collect();
        expected.sort_unstable();
        assert_eq!(reported, expected, "required {required:?}");
    }
}

#[test]
fn test_confidence_never_below_floor() {
    let module = Module::with_broker();
    module
        .producer("startDrop", "elementId", "drop", "{ elementId }")
        .producer("startResize", "w", "resize", "{ width: w }")
        .handler("handleDrop", "  return [data.id, data.rawPointerEvent, data.context.owner];")
        .handler("handleOrphan", "  return data.value;")
        .write("handlers/broken.js", "export function handleBroken(data {");

    let report = FlowEngine::new().validate(module.root(), "mixed");
    assert!(report.findings.len() >= 5, "{:#?}", report.findings);
    for f in &report.findings {
        assert!(f.confidence >= 0.6, "{f:#?}");
        assert!(f.confidence <= 1.0, "{f:#?}");
        if f.kind.is_property_level() {
            assert!(f.confidence >= 0.7, "{f:#?}");
        }
    }
    let mean = report.mean_confidence().unwrap();
    assert!((0.6..=1.0).contains(&mean));
}

#[test]
fn test_rerun_is_identical() {
    let module = Module::with_broker();
    module
        .producer("startDrop", "elementId, rawPointerEvent", "drop", "{ elementId, rawPointerEvent }")
        .handler("handleDrop", "  return [data.rawPointerEvent, data.context?.slot];");

    let engine = FlowEngine::new();
    let first = engine.validate(module.root(), "drop");
    let second = engine.validate(module.root(), "drop");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    let ids: Vec<&str> = first.findings.iter().map(|f| f.id.as_str()).collect();
    let again: Vec<&str> = second.findings.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, again);
}
