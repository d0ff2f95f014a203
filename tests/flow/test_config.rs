// Module-level configuration changes what is discovered and extracted.
use flowcheck_core::report::FindingKind;
use flowcheck_enforce::validate;

use crate::common::Module;

#[test]
fn test_module_config_customizes_extraction() {
    let module = Module::new();
    module
        .write(
            ".flowcheck/flowcheck.json",
            r#"{
                "roles": {
                    "producer_globs": ["src/start/**"],
                    "consumer_globs": ["src/react/**"]
                },
                "broker": { "path": "src/bus.ts", "entry_points": ["fire"], "prepare_functions": ["shape"] },
                "consumer": { "handler_prefixes": ["process"] }
            }"#,
        )
        .write(
            "src/bus.ts",
            r#"
export function shape(topic: string, payload: Record<string, unknown>) {
  switch (topic) {
    case 'resize':
      return { width: payload.width };
  }
  return payload;
}
"#,
        )
        .write(
            "src/start/resize.ts",
            "export function beginResize(width: number, height: number) { fire('resize', { width, height }); }",
        )
        .write(
            "src/react/resize.ts",
            "export function processResize(data) { return data.width * data.height; }",
        );

    let report = validate(module.root(), "resize");
    assert_eq!(report.statistics.producers, 1);
    assert_eq!(report.statistics.consumers, 1);
    assert_eq!(report.statistics.special_cases, 1);
    assert_eq!(report.findings.len(), 1, "{:#?}", report.findings);
    assert_eq!(report.findings[0].kind, FindingKind::MissingProperty);
    assert_eq!(report.findings[0].property_path, "height");
    assert_eq!(report.findings[0].file_path, "src/react/resize.ts");
}

#[test]
fn test_flowcheckignore_hides_files() {
    let module = Module::with_broker();
    module
        .producer("startDrag", "elementId", "drag-start", "{ elementId }")
        .handler("handleDragStart", "  return data.elementId;")
        .write("handlers/legacy/old.js", "export function handleDragStart(data) { return data.gone; }")
        .write(".flowcheckignore", "legacy/\n");

    let report = validate(module.root(), "drag");
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
    assert_eq!(report.statistics.consumers, 1);
}

#[test]
fn test_orphan_reporting_can_be_disabled() {
    let module = Module::with_broker();
    module
        .producer("startDrag", "elementId", "drag-start", "{ elementId }")
        .write(".flowcheck/flowcheck.json", r#"{ "report_orphans": false }"#);

    let report = validate(module.root(), "drag");
    assert!(report.findings.is_empty(), "{:#?}", report.findings);
    assert_eq!(report.statistics.producers, 1);
}
