// Producer -> broker -> handler scenarios over real files on disk.
use flowcheck_core::report::{FindingKind, Severity};
use flowcheck_enforce::FlowEngine;

use crate::common::Module;

fn drag_module() -> Module {
    let module = Module::with_broker();
    module.producer(
        "startDrag",
        "elementId",
        "drag-start",
        "{ elementId, timestamp: Date.now() }",
    );
    module
}

fn drop_module() -> Module {
    let module = Module::with_broker();
    module.producer(
        "startDrop",
        "elementId, rawPointerEvent",
        "drop",
        "{ elementId, rawPointerEvent }",
    );
    module
}

#[test]
fn test_default_transform_satisfies_handler() {
    let module = drag_module();
    module.handler(
        "handleDragStart",
        "  const { elementId, sequenceId } = data;\n  return elementId + sequenceId;",
    );
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
    assert_eq!(report.statistics.events_compared, 1);
}

#[test]
fn test_missing_property_is_critical() {
    let module = drag_module();
    module.handler(
        "handleDragStart",
        "  return data.elementId + data.targetZone;",
    );
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    let f = &report.findings[0];
    assert_eq!(f.kind, FindingKind::MissingProperty);
    assert_eq!(f.severity, Severity::Critical);
    assert_eq!(f.event_id, "drag-start");
    assert_eq!(f.property_path, "targetZone");
    assert_eq!(f.file_path, "handlers/handleDragStart.js");
    assert_eq!(f.line, 2);
    assert!(report.has_blocking());
}

#[test]
fn test_special_case_excludes_unmapped_properties() {
    let module = drop_module();
    module.handler("handleDrop", "  return [data.elementId, data.zoneId];");
    let report = FlowEngine::new().validate(module.root(), "drop");
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
    assert_eq!(report.statistics.special_cases, 1);
}

#[test]
fn test_handler_needing_excluded_property_fails() {
    let module = drop_module();
    module.handler(
        "handleDrop",
        "  return [data.elementId, data.zoneId, data.rawPointerEvent];",
    );
    let report = FlowEngine::new().validate(module.root(), "drop");
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    let f = &report.findings[0];
    assert_eq!(f.kind, FindingKind::MissingProperty);
    assert_eq!(f.property_path, "rawPointerEvent");
    assert!(f.message.contains("eventType === 'drop'"), "{}", f.message);
}

#[test]
fn test_nested_root_absent_required() {
    let module = drag_module();
    module.handler("handleDragStart", "  return data.context.elementId;");
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    let f = &report.findings[0];
    assert_eq!(f.kind, FindingKind::NestedMismatch);
    assert_eq!(f.severity, Severity::Error);
    assert_eq!(f.property_path, "context.elementId");
}

#[test]
fn test_nested_leaf_in_condition_is_still_required() {
    let module = drag_module();
    module.handler(
        "handleDragStart",
        "  if (data.context.elementId) {\n    return 1;\n  }\n  return 0;",
    );
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    let f = &report.findings[0];
    assert_eq!(f.kind, FindingKind::NestedMismatch);
    assert_eq!(f.severity, Severity::Error);
    assert_eq!(f.property_path, "context.elementId");
}

#[test]
fn test_callback_parameter_shadowing_payload() {
    let module = Module::with_broker();
    module
        .producer("startDrag", "elementId, items", "drag-start", "{ elementId, items }")
        .handler("handleDragStart", "  return data.items.map((data) => data.label);");
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
}

#[test]
fn test_nested_root_absent_optional_chain() {
    let module = drag_module();
    module.handler("handleDragStart", "  return data.context?.elementId;");
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    assert_eq!(report.findings[0].kind, FindingKind::NestedMismatch);
    assert_eq!(report.findings[0].severity, Severity::Warning);
}

#[test]
fn test_fallback_access_is_not_required() {
    let module = drag_module();
    module.handler(
        "handleDragStart",
        "  const zone = data.targetZone || 'root';\n  return data.elementId + zone;",
    );
    let report = FlowEngine::new().validate(module.root(), "drag");
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
}

#[test]
fn test_registration_call_maps_event() {
    let module = drop_module();
    module.write(
        "handlers/index.js",
        r#"
function onDropped(data) {
  return data.slot;
}

bus.on('drop', onDropped);
"#,
    );
    let report = FlowEngine::new().validate(module.root(), "drop");
    let missing: Vec<_> = report.findings_of(FindingKind::MissingProperty).collect();
    assert_eq!(missing.len(), 1, "{:#?}", report.findings);
    assert_eq!(missing[0].event_id, "drop");
    assert_eq!(missing[0].property_path, "slot");
}
