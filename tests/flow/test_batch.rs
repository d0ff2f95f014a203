// Batch validation across modules that share a project-wide broker.
use std::collections::BTreeMap;
use std::path::PathBuf;

use flowcheck_core::report::{FindingKind, Severity};
use flowcheck_enforce::validate_all;

use crate::common::{Module, BROKER};

/// A project with `shared/broker.js` and two modules pointing at it.
fn project() -> (Module, BTreeMap<String, PathBuf>) {
    let project = Module::new();
    project.write("shared/broker.js", BROKER);
    let config = serde_json::json!({ "project_root": project.root() }).to_string();

    project
        .write("modules/drag/.flowcheck/flowcheck.json", &config)
        .write(
            "modules/drag/flows/start.js",
            "export function startDrag(elementId) { dispatch('drag-start', { elementId }); }",
        )
        .write(
            "modules/drag/handlers/drag.js",
            "export function handleDragStart(data) { return data.elementId + data.sequenceId; }",
        );

    project
        .write("modules/drop/.flowcheck/flowcheck.json", &config)
        .write(
            "modules/drop/flows/start.js",
            "export function startDrop(elementId, rawPointerEvent) { dispatch('drop', { elementId, rawPointerEvent }); }",
        )
        .write(
            "modules/drop/handlers/drop.js",
            "export function handleDrop(data) {\n  return [data.zoneId, data.rawPointerEvent];\n}\n",
        );

    let mut modules = BTreeMap::new();
    modules.insert("drag".to_string(), project.path("modules/drag"));
    modules.insert("drop".to_string(), project.path("modules/drop"));
    (project, modules)
}

#[test]
fn test_batch_uses_project_broker_for_every_module() {
    let (_project, modules) = project();
    let batch = validate_all(&modules);

    let drag = &batch.reports["drag"];
    assert!(drag.findings.is_empty(), "{:#?}", drag.findings);
    assert_eq!(drag.statistics.broker_transformations, 2);

    let drop = &batch.reports["drop"];
    assert_eq!(drop.findings.len(), 1, "{:#?}", drop.findings);
    assert_eq!(drop.findings[0].kind, FindingKind::MissingProperty);
    assert_eq!(drop.findings[0].property_path, "rawPointerEvent");
    assert_eq!(drop.findings[0].line, 2);
}

#[test]
fn test_batch_summary_and_shared_cache() {
    let (_project, modules) = project();
    let batch = validate_all(&modules);

    assert_eq!(batch.summary.modules, 2);
    assert_eq!(batch.summary.findings, 1);
    assert_eq!(batch.summary.critical, 1);
    assert_eq!(batch.summary.errors + batch.summary.warnings, 0);
    let mean = batch.summary.mean_confidence.unwrap();
    assert!((mean - batch.reports["drop"].findings[0].confidence).abs() < 1e-9);
    assert!(batch.has_blocking());

    // The broker is parsed once for the whole batch.
    assert_eq!(batch.reports["drag"].statistics.cache_hits, 0);
    assert_eq!(batch.reports["drop"].statistics.cache_hits, 1);
}

#[test]
fn test_batch_isolates_failing_module() {
    let (_project, mut modules) = project();
    modules.insert("ghost".to_string(), PathBuf::from("/no/such/module"));
    let batch = validate_all(&modules);

    assert_eq!(batch.summary.modules, 3);
    let ghost = &batch.reports["ghost"];
    assert_eq!(ghost.findings.len(), 1);
    assert_eq!(ghost.findings[0].kind, FindingKind::DiscoveryFailed);
    assert_eq!(ghost.findings[0].severity, Severity::Critical);
    assert_eq!(batch.summary.critical, 2);
    assert!(batch.reports["drag"].findings.is_empty());
}

#[test]
fn test_batch_report_serializes() {
    let (_project, modules) = project();
    let batch = validate_all(&modules);
    let json = serde_json::to_value(&batch).unwrap();
    assert_eq!(json["summary"]["modules"], 2);
    assert_eq!(
        json["reports"]["drop"]["findings"][0]["kind"],
        "missing_property"
    );
    assert_eq!(json["reports"]["drop"]["findings"][0]["severity"], "critical");
}
