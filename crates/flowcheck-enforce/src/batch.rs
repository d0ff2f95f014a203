use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use flowcheck_core::config::FlowConfig;
use flowcheck_core::report::FlowReport;
use flowcheck_parsers::cache::ExtractionCache;

use crate::engine::FlowEngine;

/// Aggregate counts across every module in a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub modules: u32,
    pub critical: u32,
    pub errors: u32,
    pub warnings: u32,
    pub findings: u32,
    /// Mean over all findings of all modules; `None` when there are none.
    pub mean_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub reports: BTreeMap<String, FlowReport>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_reports(reports: BTreeMap<String, FlowReport>) -> Self {
        let mut summary = BatchSummary {
            modules: reports.len() as u32,
            ..BatchSummary::default()
        };
        let mut confidence_sum = 0.0;
        for report in reports.values() {
            summary.critical += report.statistics.critical;
            summary.errors += report.statistics.errors;
            summary.warnings += report.statistics.warnings;
            summary.findings += report.findings.len() as u32;
            confidence_sum += report.findings.iter().map(|f| f.confidence).sum::<f64>();
        }
        if summary.findings > 0 {
            summary.mean_confidence = Some(confidence_sum / f64::from(summary.findings));
        }
        Self { reports, summary }
    }

    pub fn has_blocking(&self) -> bool {
        self.reports.values().any(FlowReport::has_blocking)
    }
}

/// Validate several modules in one run.
///
/// Each module uses its own `.flowcheck/flowcheck.json`. One extraction
/// cache is shared for the whole batch, so a project-wide broker is parsed
/// once.
pub fn validate_all(modules: &BTreeMap<String, PathBuf>) -> BatchReport {
    let cache = ExtractionCache::new();
    let mut reports = BTreeMap::new();
    for (name, path) in modules {
        let engine = FlowEngine::with_config(FlowConfig::for_module(path));
        let report = engine.validate_with_cache(path, name, &cache);
        reports.insert(name.clone(), report);
    }
    let batch = BatchReport::from_reports(reports);
    tracing::info!(
        modules = batch.summary.modules,
        findings = batch.summary.findings,
        cache_hits = cache.hits(),
        "batch validation complete"
    );
    batch
}
