// Infrastructure failures become findings; the run always completes.
use std::path::Path;

use flowcheck_core::config::FlowConfig;
use flowcheck_core::report::{ConfidenceLevel, FindingKind, Severity};
use flowcheck_enforce::{validate, FlowEngine, FlowState};

use crate::common::Module;

#[test]
fn test_missing_module_is_one_critical_finding() {
    let report = validate(Path::new("/definitely/not/here"), "ghost");
    assert_eq!(report.module, "ghost");
    assert_eq!(report.findings.len(), 1);
    let f = &report.findings[0];
    assert_eq!(f.kind, FindingKind::DiscoveryFailed);
    assert_eq!(f.severity, Severity::Critical);
    assert!(f.event_id.is_empty());
    assert!((f.confidence - 0.6).abs() < 1e-9);
    assert_eq!(report.confidence_level, ConfidenceLevel::Unknown);
    assert_eq!(report.statistics.files_scanned, 0);
    assert_eq!(report.recommendations.len(), 1);
}

#[test]
fn test_module_path_that_is_a_file() {
    let module = Module::with_broker();
    let report = FlowEngine::new().validate(&module.path("broker.js"), "file");
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].kind, FindingKind::DiscoveryFailed);
}

#[test]
fn test_invalid_role_pattern_fails_discovery() {
    let module = Module::with_broker();
    let mut config = FlowConfig::default();
    config.roles.consumer_globs = vec!["handlers/[".into()];
    let (report, trace) = FlowEngine::with_config(config).validate_traced(module.root(), "bad");
    assert_eq!(report.findings[0].kind, FindingKind::DiscoveryFailed);
    assert!(!trace.contains(&FlowState::Extracting));
}

#[test]
fn test_bad_files_are_skipped_with_warnings() {
    let module = Module::with_broker();
    module
        .producer("startDrag", "elementId", "drag-start", "{ elementId }")
        .handler("handleDragStart", "  return data.elementId + data.sequenceId;")
        .write("handlers/broken.ts", "export const handleDrop = (data => {")
        .write("flows/huge.js", &format!("export const blob = '{}';", "x".repeat(4096)));
    std::fs::write(module.path("handlers/latin1.js"), [0x65u8, 0x78, 0xff, 0xfe, 0x0a]).unwrap();

    let mut config = FlowConfig::default();
    config.limits.max_file_bytes = 1024;
    let report = FlowEngine::with_config(config).validate(module.root(), "drag");

    let failed: Vec<&str> = report
        .findings_of(FindingKind::ExtractionFailed)
        .map(|f| f.file_path.as_str())
        .collect();
    assert_eq!(
        failed,
        vec!["flows/huge.js", "handlers/broken.ts", "handlers/latin1.js"]
    );
    assert!(report
        .findings_of(FindingKind::ExtractionFailed)
        .all(|f| f.severity == Severity::Warning && f.message.starts_with("could not extract contract")));
    assert_eq!(report.statistics.files_failed, 3);
    assert_eq!(report.statistics.files_scanned, 6);
    assert_eq!(report.statistics.producers, 1);
    assert_eq!(report.statistics.consumers, 1);
    assert!(!report.has_blocking(), "{:#?}", report.findings);
}

#[test]
fn test_empty_module_is_clean() {
    let module = Module::new();
    let report = FlowEngine::new().validate(module.root(), "empty");
    assert!(report.findings.is_empty());
    assert_eq!(report.confidence_level, ConfidenceLevel::Unknown);
    assert_eq!(report.mean_confidence(), None);
}

#[test]
fn test_orphans_on_both_sides() {
    let module = Module::with_broker();
    module
        .producer("startDrag", "elementId", "drag-start", "{ elementId }")
        .handler("handleResize", "  return data.width;");
    let report = FlowEngine::new().validate(module.root(), "drag");
    let kinds: Vec<FindingKind> = report.findings.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FindingKind::OrphanProducer, FindingKind::OrphanHandler]);
    assert_eq!(report.findings[0].file_path, "flows/startDrag.js");
    assert_eq!(report.findings[1].event_id, "resize");
    assert_eq!(report.recommendations.len(), 2);
}
