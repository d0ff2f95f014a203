//! Flow verification engine for flowcheck.
//!
//! Simulates the broker over every producer contract and compares the
//! resulting payload with what each handler reads:
//! - missing_property: a handler requires a property the payload lacks
//! - nested_mismatch: a handler reads a nested path whose root is absent
//! - orphan_handler / orphan_producer: one side of an event has no partner
//!
//! Infrastructure problems (unreadable module, unparseable file) are
//! reported as findings too; the entry points never fail.

pub mod batch;
pub mod comparator;
pub mod confidence;
pub mod engine;
pub mod finding;
pub mod recommend;
pub mod simulator;

use std::path::Path;

use flowcheck_core::config::FlowConfig;
use flowcheck_core::report::FlowReport;

pub use batch::{validate_all, BatchReport, BatchSummary};
pub use engine::{FlowEngine, FlowState};

/// Validate one module using the config in `<module>/.flowcheck/`.
pub fn validate(module_path: &Path, module_name: &str) -> FlowReport {
    FlowEngine::with_config(FlowConfig::for_module(module_path)).validate(module_path, module_name)
}
