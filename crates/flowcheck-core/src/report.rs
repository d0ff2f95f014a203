use serde::{Deserialize, Serialize};

/// Finding categories. The first four are flow findings; the rest record
/// infrastructure problems recovered during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingProperty,
    NestedMismatch,
    OrphanHandler,
    OrphanProducer,
    DiscoveryFailed,
    ExtractionFailed,
    ComparisonFailed,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::MissingProperty => "missing_property",
            FindingKind::NestedMismatch => "nested_mismatch",
            FindingKind::OrphanHandler => "orphan_handler",
            FindingKind::OrphanProducer => "orphan_producer",
            FindingKind::DiscoveryFailed => "discovery_failed",
            FindingKind::ExtractionFailed => "extraction_failed",
            FindingKind::ComparisonFailed => "comparison_failed",
        }
    }

    /// Property-level findings get the tighter confidence clamp.
    pub fn is_property_level(&self) -> bool {
        matches!(self, FindingKind::MissingProperty | FindingKind::NestedMismatch)
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFinding {
    /// Stable base62 id, see [`crate::hash::finding_id`].
    pub id: String,
    pub kind: FindingKind,
    /// Empty for infrastructure findings.
    pub event_id: String,
    pub property_path: String,
    pub severity: Severity,
    pub confidence: f64,
    pub message: String,
    pub suggested_fix: String,
    pub file_path: String,
    pub line: u32,
}

impl FlowFinding {
    /// Deterministic report order: file, line, kind, then the remaining text fields.
    pub fn sort_key(&self) -> (&str, u32, FindingKind, &str, &str, &str) {
        (
            &self.file_path,
            self.line,
            self.kind,
            &self.event_id,
            &self.property_path,
            &self.message,
        )
    }
}

/// Overall trust in a report, driven by how much special-casing and nesting
/// the extractor had to reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Unknown,
}

impl ConfidenceLevel {
    /// Bucket the `(special cases + nested properties) / contracts` ratio.
    pub fn from_complexity(special_cases: usize, nested_properties: usize, contracts: usize) -> Self {
        if contracts == 0 {
            return ConfidenceLevel::Unknown;
        }
        let ratio = (special_cases + nested_properties) as f64 / contracts as f64;
        if ratio < 0.2 {
            ConfidenceLevel::High
        } else if ratio < 0.5 {
            ConfidenceLevel::Medium
        } else if ratio < 0.8 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Unknown
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatistics {
    pub files_scanned: u32,
    pub files_failed: u32,
    pub producers: u32,
    pub consumers: u32,
    pub broker_transformations: u32,
    pub special_cases: u32,
    pub nested_properties: u32,
    pub events_compared: u32,
    pub critical: u32,
    pub errors: u32,
    pub warnings: u32,
    pub cache_hits: u32,
}

impl FlowStatistics {
    pub fn total_contracts(&self) -> usize {
        (self.producers + self.consumers + self.broker_transformations) as usize
    }

    pub fn count_severities(&mut self, findings: &[FlowFinding]) {
        self.critical = 0;
        self.errors = 0;
        self.warnings = 0;
        for f in findings {
            match f.severity {
                Severity::Critical => self.critical += 1,
                Severity::Error => self.errors += 1,
                Severity::Warning => self.warnings += 1,
            }
        }
    }
}

/// Fix text for one group of findings of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: FindingKind,
    pub event_ids: Vec<String>,
    pub count: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowReport {
    pub module: String,
    pub findings: Vec<FlowFinding>,
    pub confidence_level: ConfidenceLevel,
    pub statistics: FlowStatistics,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub recommendations: Vec<Recommendation>,
}

impl FlowReport {
    pub fn has_blocking(&self) -> bool {
        self.findings
            .iter()
            .any(|f| matches!(f.severity, Severity::Critical | Severity::Error))
    }

    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &FlowFinding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Mean confidence over all findings, `None` for a clean report.
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.findings.is_empty() {
            return None;
        }
        let sum: f64 = self.findings.iter().map(|f| f.confidence).sum();
        Some(sum / self.findings.len() as f64)
    }
}
