use flowcheck_core::error::{ComparisonError, DiscoveryError, ExtractionError};
use flowcheck_core::hash::finding_id;
use flowcheck_core::report::{FindingKind, FlowFinding, Severity};
use flowcheck_core::types::{ConsumerContract, ProducerContract};

use crate::confidence::{INFRASTRUCTURE_CONFIDENCE, ORPHAN_CONFIDENCE};

/// Where a finding points, plus the text that makes its id unique.
pub struct FindingSite<'a> {
    pub kind: FindingKind,
    pub severity: Severity,
    pub event_id: &'a str,
    pub property_path: &'a str,
    pub file_path: &'a str,
    pub line: u32,
    /// Extra id input, e.g. the producer a property was traced through.
    pub detail: &'a str,
}

impl FindingSite<'_> {
    pub fn finish(self, confidence: f64, message: String, suggested_fix: String) -> FlowFinding {
        FlowFinding {
            id: finding_id(
                self.kind.as_str(),
                self.event_id,
                self.property_path,
                self.file_path,
                self.detail,
            ),
            kind: self.kind,
            event_id: self.event_id.to_string(),
            property_path: self.property_path.to_string(),
            severity: self.severity,
            confidence,
            message,
            suggested_fix,
            file_path: self.file_path.to_string(),
            line: self.line,
        }
    }
}

pub fn discovery_failed(module: &str, error: &DiscoveryError) -> FlowFinding {
    FindingSite {
        kind: FindingKind::DiscoveryFailed,
        severity: Severity::Critical,
        event_id: "",
        property_path: "",
        file_path: module,
        line: 0,
        detail: "",
    }
    .finish(
        INFRASTRUCTURE_CONFIDENCE,
        format!("could not scan module `{module}`: {error}"),
        "check that the module path exists and is a readable directory".to_string(),
    )
}

pub fn extraction_failed(file_path: &str, error: &ExtractionError) -> FlowFinding {
    FindingSite {
        kind: FindingKind::ExtractionFailed,
        severity: Severity::Warning,
        event_id: "",
        property_path: "",
        file_path,
        line: error.line(),
        detail: "",
    }
    .finish(
        INFRASTRUCTURE_CONFIDENCE,
        format!("could not extract contract: {error}"),
        format!("fix the file or list `{file_path}` in .flowcheckignore"),
    )
}

pub fn comparison_failed(consumer: &ConsumerContract, error: &ComparisonError) -> FlowFinding {
    FindingSite {
        kind: FindingKind::ComparisonFailed,
        severity: Severity::Warning,
        event_id: "",
        property_path: "",
        file_path: &consumer.file_path,
        line: consumer.line,
        detail: &consumer.handler_name,
    }
    .finish(
        INFRASTRUCTURE_CONFIDENCE,
        format!("skipped comparison for `{}`: {error}", consumer.handler_name),
        "re-run validation; the handler was paired with the wrong producer".to_string(),
    )
}

/// A handler whose event no scanned producer dispatches.
pub fn orphan_handler(consumer: &ConsumerContract) -> FlowFinding {
    FindingSite {
        kind: FindingKind::OrphanHandler,
        severity: Severity::Warning,
        event_id: &consumer.event_id,
        property_path: "",
        file_path: &consumer.file_path,
        line: consumer.line,
        detail: &consumer.handler_name,
    }
    .finish(
        ORPHAN_CONFIDENCE,
        format!(
            "handler `{}` listens for `{}` but no producer in this module dispatches it",
            consumer.handler_name, consumer.event_id
        ),
        format!("create a producer for event `{}`", consumer.event_id),
    )
}

/// A producer whose event no scanned handler consumes.
pub fn orphan_producer(producer: &ProducerContract) -> FlowFinding {
    let event_id = producer.target_event_id.as_str();
    FindingSite {
        kind: FindingKind::OrphanProducer,
        severity: Severity::Warning,
        event_id,
        property_path: "",
        file_path: &producer.file_path,
        line: producer.line,
        detail: &producer.function_name,
    }
    .finish(
        ORPHAN_CONFIDENCE,
        format!(
            "producer `{}` dispatches `{event_id}` but no handler in this module consumes it",
            producer.function_name
        ),
        format!("add a handler for event `{event_id}` or remove the dispatch"),
    )
}
