//! Transformation simulation.
//!
//! Replays the broker's prepare routine over a producer contract to predict
//! the payload a handler will actually receive.
//!
//! - A special-cased transformation is exclusionary: only its output
//!   mappings and added properties survive.
//! - A default transformation is additive: every producer property is kept
//!   and the added properties are layered on top.
//! - With no transformation at all the producer payload passes through.

use std::collections::BTreeMap;

use serde::Serialize;

use flowcheck_core::types::{BrokerTransformation, ProducerContract, DEFAULT_EVENT_ID};

/// Where a simulated property came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOrigin {
    Producer,
    Mapping,
    Added,
}

/// Which broker branch was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedTransform {
    SpecialCase {
        event_id: String,
        condition: Option<String>,
        exclusionary: bool,
    },
    Default {
        exclusionary: bool,
    },
    Passthrough,
}

impl AppliedTransform {
    pub fn is_exclusionary(&self) -> bool {
        match self {
            AppliedTransform::SpecialCase { exclusionary, .. }
            | AppliedTransform::Default { exclusionary } => *exclusionary,
            AppliedTransform::Passthrough => false,
        }
    }
}

/// The payload a handler receives for one producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedContract {
    pub event_id: String,
    pub producer: String,
    pub properties: BTreeMap<String, PropertyOrigin>,
    /// Producer properties the applied transformation did not keep.
    pub dropped: Vec<String>,
    /// Properties the broker deletes or destructures away.
    pub removed: Vec<String>,
    pub applied: AppliedTransform,
}

impl SimulatedContract {
    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn was_dropped(&self, name: &str) -> bool {
        self.dropped.iter().any(|d| d == name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// Pick the transformation for an event: an exact special case if one
/// exists, otherwise the `"*"` default.
pub fn resolve_transformation<'a>(
    event_id: &str,
    transformations: &'a [BrokerTransformation],
) -> Option<&'a BrokerTransformation> {
    transformations
        .iter()
        .find(|t| !t.is_default() && t.event_id == event_id)
        .or_else(|| transformations.iter().find(|t| t.event_id == DEFAULT_EVENT_ID))
}

pub fn simulate(
    producer: &ProducerContract,
    transformations: &[BrokerTransformation],
) -> SimulatedContract {
    let transform = resolve_transformation(&producer.target_event_id, transformations);
    let mut properties = BTreeMap::new();
    let mut dropped = Vec::new();

    let applied = match transform {
        None => {
            for name in producer.property_names() {
                properties.insert(name.to_string(), PropertyOrigin::Producer);
            }
            AppliedTransform::Passthrough
        }
        Some(t) if t.is_special_cased => {
            for name in producer.property_names() {
                if !t.output_mappings.contains_key(name)
                    && !t.added_properties.iter().any(|a| a == name)
                    && !dropped.iter().any(|d: &String| d == name)
                {
                    dropped.push(name.to_string());
                }
            }
            for name in t.output_mappings.keys() {
                properties.insert(name.clone(), PropertyOrigin::Mapping);
            }
            for name in &t.added_properties {
                properties.insert(name.clone(), PropertyOrigin::Added);
            }
            if t.is_default() {
                AppliedTransform::Default { exclusionary: true }
            } else {
                AppliedTransform::SpecialCase {
                    event_id: t.event_id.clone(),
                    condition: t.condition.clone(),
                    exclusionary: true,
                }
            }
        }
        Some(t) => {
            for name in producer.property_names() {
                properties.insert(name.to_string(), PropertyOrigin::Producer);
            }
            for name in &t.added_properties {
                properties.insert(name.clone(), PropertyOrigin::Added);
            }
            if t.is_default() {
                AppliedTransform::Default {
                    exclusionary: false,
                }
            } else {
                AppliedTransform::SpecialCase {
                    event_id: t.event_id.clone(),
                    condition: t.condition.clone(),
                    exclusionary: false,
                }
            }
        }
    };

    tracing::debug!(
        producer = %producer.function_name,
        event = %producer.target_event_id,
        properties = properties.len(),
        dropped = dropped.len(),
        "simulated broker transformation"
    );

    SimulatedContract {
        event_id: producer.target_event_id.clone(),
        producer: producer.function_name.clone(),
        properties,
        dropped,
        removed: transform.map(|t| t.removed_properties.clone()).unwrap_or_default(),
        applied,
    }
}
