use std::collections::BTreeSet;
use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use flowcheck_core::config::FlowConfig;
use flowcheck_core::error::DiscoveryError;
use flowcheck_core::report::{ConfidenceLevel, FlowFinding, FlowReport, FlowStatistics};
use flowcheck_core::types::{BrokerTransformation, ConsumerContract, Contract, ProducerContract};
use flowcheck_parsers::cache::ExtractionCache;
use flowcheck_parsers::extractor::{extract_file, extract_files, ExtractorSet, FileExtraction};
use flowcheck_parsers::walker::{discover, Discovery, SourceFile};

use crate::comparator::{find_orphans, FlowComparator};
use crate::confidence::{floored, ConfidenceScorer};
use crate::finding::{comparison_failed, discovery_failed, extraction_failed};
use crate::recommend::RecommendationBuilder;
use crate::simulator::{simulate, SimulatedContract};

/// Stages of one validation run. Each stage runs once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Discovering,
    Extracting,
    Simulating,
    Comparing,
    Reporting,
    Done,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::Discovering => "discovering",
            FlowState::Extracting => "extracting",
            FlowState::Simulating => "simulating",
            FlowState::Comparing => "comparing",
            FlowState::Reporting => "reporting",
            FlowState::Done => "done",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contracts from every file that extracted cleanly, plus the failures.
#[derive(Debug, Default)]
struct Extracted {
    producers: Vec<ProducerContract>,
    transformations: Vec<BrokerTransformation>,
    consumers: Vec<ConsumerContract>,
    failures: Vec<FlowFinding>,
    files_scanned: u32,
    files_failed: u32,
    cache_hits: u32,
}

impl Extracted {
    fn collect(extractions: Vec<FileExtraction>) -> Self {
        let mut out = Extracted::default();
        for extraction in extractions {
            out.files_scanned += 1;
            if extraction.cache_hit {
                out.cache_hits += 1;
            }
            match extraction.result {
                Ok(contracts) => {
                    for contract in contracts {
                        match contract {
                            Contract::Producer(p) => out.producers.push(p),
                            Contract::Broker(b) => out.transformations.push(b),
                            Contract::Consumer(c) => out.consumers.push(c),
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %extraction.file.display_path, error = %e, "extraction failed");
                    out.files_failed += 1;
                    out.failures
                        .push(extraction_failed(&extraction.file.display_path, &e));
                }
            }
        }
        out
    }
}

/// Runs discovery, extraction, simulation and comparison for one module.
pub struct FlowEngine {
    config: FlowConfig,
    extractors: ExtractorSet,
    comparator: FlowComparator,
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEngine {
    pub fn new() -> Self {
        Self::with_config(FlowConfig::default())
    }

    pub fn with_config(config: FlowConfig) -> Self {
        Self {
            extractors: ExtractorSet::new(&config),
            comparator: FlowComparator::new(ConfidenceScorer::new(&config.scoring)),
            config,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Validate one module with a cache scoped to this call.
    pub fn validate(&self, module_path: &Path, module_name: &str) -> FlowReport {
        self.validate_traced(module_path, module_name).0
    }

    /// Like [`FlowEngine::validate`], also returning the visited states.
    pub fn validate_traced(&self, module_path: &Path, module_name: &str) -> (FlowReport, Vec<FlowState>) {
        let cache = ExtractionCache::new();
        self.run(module_path, module_name, &cache)
    }

    /// Validate with a caller-owned cache, shared across modules of one batch.
    pub fn validate_with_cache(
        &self,
        module_path: &Path,
        module_name: &str,
        cache: &ExtractionCache,
    ) -> FlowReport {
        self.run(module_path, module_name, cache).0
    }

    fn run(
        &self,
        module_path: &Path,
        module_name: &str,
        cache: &ExtractionCache,
    ) -> (FlowReport, Vec<FlowState>) {
        let mut trace = vec![FlowState::Idle];

        trace.push(FlowState::Discovering);
        let discovery = match discover(module_path, &self.config) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(module = module_name, error = %e, "discovery failed");
                trace.push(FlowState::Reporting);
                let report = discovery_report(module_name, &e);
                trace.push(FlowState::Done);
                return (report, trace);
            }
        };

        trace.push(FlowState::Extracting);
        let extracted = Extracted::collect(self.extract(&discovery, cache));

        trace.push(FlowState::Simulating);
        let simulated: Vec<SimulatedContract> = extracted
            .producers
            .iter()
            .map(|p| simulate(p, &extracted.transformations))
            .collect();

        trace.push(FlowState::Comparing);
        let (mut findings, events_compared) = self.compare(&extracted, &simulated);
        if self.config.report_orphans {
            findings.extend(find_orphans(&extracted.producers, &extracted.consumers));
        }
        findings.extend(extracted.failures.iter().cloned());

        trace.push(FlowState::Reporting);
        let report = self.build_report(module_name, findings, &extracted, events_compared);
        tracing::info!(
            module = module_name,
            findings = report.findings.len(),
            critical = report.statistics.critical,
            errors = report.statistics.errors,
            warnings = report.statistics.warnings,
            confidence = ?report.confidence_level,
            "flow validation complete"
        );
        trace.push(FlowState::Done);
        (report, trace)
    }

    /// Extract every discovered file on a bounded pool, sequentially if the
    /// pool cannot be built.
    fn extract(&self, discovery: &Discovery, cache: &ExtractionCache) -> Vec<FileExtraction> {
        let files: Vec<SourceFile> = discovery.files().cloned().collect();
        let limits = &self.config.limits;
        let workers = self.config.worker_count();
        tracing::debug!(files = files.len(), workers, "extracting contracts");

        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| extract_files(&files, &self.extractors, cache, limits)),
            Err(e) => {
                tracing::warn!(error = %e, "could not build worker pool, extracting sequentially");
                files
                    .iter()
                    .map(|f| extract_file(f, &self.extractors, cache, limits))
                    .collect()
            }
        }
    }

    /// Compare every (producer, simulated payload, consumer) triple that
    /// shares an event id.
    fn compare(&self, extracted: &Extracted, simulated: &[SimulatedContract]) -> (Vec<FlowFinding>, u32) {
        let mut findings = Vec::new();
        let mut events = BTreeSet::new();
        for (producer, sim) in extracted.producers.iter().zip(simulated) {
            for consumer in extracted
                .consumers
                .iter()
                .filter(|c| c.event_id == producer.target_event_id)
            {
                events.insert(consumer.event_id.as_str());
                match self.comparator.compare(producer, sim, consumer) {
                    Ok(found) => findings.extend(found),
                    Err(e) => {
                        tracing::warn!(handler = %consumer.handler_name, error = %e, "comparison skipped");
                        findings.push(comparison_failed(consumer, &e));
                    }
                }
            }
        }
        tracing::debug!(events = events.len(), findings = findings.len(), "compared contracts");
        (findings, events.len() as u32)
    }

    fn build_report(
        &self,
        module_name: &str,
        findings: Vec<FlowFinding>,
        extracted: &Extracted,
        events_compared: u32,
    ) -> FlowReport {
        let findings = finalize(findings);

        let special_cases = extracted
            .transformations
            .iter()
            .filter(|t| !t.is_default())
            .count();
        let nested_properties: usize = extracted
            .consumers
            .iter()
            .map(|c| c.nested_properties.len())
            .sum();

        let mut statistics = FlowStatistics {
            files_scanned: extracted.files_scanned,
            files_failed: extracted.files_failed,
            producers: extracted.producers.len() as u32,
            consumers: extracted.consumers.len() as u32,
            broker_transformations: extracted.transformations.len() as u32,
            special_cases: special_cases as u32,
            nested_properties: nested_properties as u32,
            events_compared,
            cache_hits: extracted.cache_hits,
            ..FlowStatistics::default()
        };
        statistics.count_severities(&findings);

        let confidence_level = ConfidenceLevel::from_complexity(
            special_cases,
            nested_properties,
            statistics.total_contracts(),
        );

        FlowReport {
            module: module_name.to_string(),
            recommendations: RecommendationBuilder::from_findings(&findings),
            findings,
            confidence_level,
            statistics,
        }
    }
}

/// Drop duplicate ids, apply the confidence floor, and sort for output.
fn finalize(findings: Vec<FlowFinding>) -> Vec<FlowFinding> {
    let mut seen = HashSet::new();
    let mut findings: Vec<FlowFinding> = findings
        .into_iter()
        .filter(|f| seen.insert(f.id.clone()))
        .map(|mut f| {
            f.confidence = floored(f.confidence);
            f
        })
        .collect();
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    findings
}

fn discovery_report(module_name: &str, error: &DiscoveryError) -> FlowReport {
    let findings = vec![discovery_failed(module_name, error)];
    let mut statistics = FlowStatistics::default();
    statistics.count_severities(&findings);
    FlowReport {
        module: module_name.to_string(),
        recommendations: RecommendationBuilder::from_findings(&findings),
        findings,
        confidence_level: ConfidenceLevel::Unknown,
        statistics,
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
