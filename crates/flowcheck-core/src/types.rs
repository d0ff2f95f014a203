use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The event id used by the broker's fall-through transformation.
pub const DEFAULT_EVENT_ID: &str = "*";

/// The three architectural roles a source file can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Producer,
    Broker,
    Consumer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Broker => "broker",
            Role::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payload property obtains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Bare identifier (`elementId`).
    Parameter,
    /// Member access (`options.zone`).
    PropertyAccess,
    /// Anything not matched by another kind.
    Literal,
    /// Call expression (`Date.now()`).
    Generated,
    /// Backtick template literal.
    Template,
    /// `a || b`, `a ?? b`, or a ternary.
    Conditional,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Parameter => "parameter",
            BindingKind::PropertyAccess => "property_access",
            BindingKind::Literal => "literal",
            BindingKind::Generated => "generated",
            BindingKind::Template => "template",
            BindingKind::Conditional => "conditional",
        }
    }
}

impl std::fmt::Display for BindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse parameter type inferred from naming and usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Identifier,
    Element,
    Event,
    Number,
    Boolean,
    Text,
    Object,
    Callback,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParamType,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBinding {
    pub name: String,
    pub kind: BindingKind,
    /// Producer parameter the value is read from, when traceable.
    pub source_parameter: Option<String>,
    /// Verbatim value expression.
    pub expression: String,
    pub line: u32,
}

/// What a flow-start function forwards into the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerContract {
    pub function_name: String,
    /// Normalized (kebab-case) event id.
    pub target_event_id: String,
    /// Event text exactly as written at the call site.
    pub raw_event_id: String,
    pub input_parameters: Vec<Parameter>,
    pub produced_properties: Vec<PropertyBinding>,
    pub file_path: String,
    pub line: u32,
}

impl ProducerContract {
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.produced_properties.iter().map(|p| p.name.as_str())
    }
}

/// One branch of the broker's prepare routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerTransformation {
    /// Normalized event id, or [`DEFAULT_EVENT_ID`] for the fall-through.
    pub event_id: String,
    /// Exclusionary when true: only `output_mappings` and `added_properties` survive.
    pub is_special_cased: bool,
    /// Guard text, verbatim.
    pub condition: Option<String>,
    pub output_mappings: BTreeMap<String, String>,
    pub added_properties: Vec<String>,
    pub removed_properties: Vec<String>,
    pub file_path: String,
    pub line: u32,
}

impl BrokerTransformation {
    pub fn is_default(&self) -> bool {
        self.event_id == DEFAULT_EVENT_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredProperty {
    pub name: String,
    /// True when the property is only reached through a deeper chain.
    pub is_nested: bool,
    pub nested_path: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalProperty {
    pub name: String,
    pub has_fallback: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedProperty {
    /// Dotted path of the parent object, rooted at a top-level payload property.
    pub parent_path: String,
    pub name: String,
    pub is_required: bool,
    pub line: u32,
}

impl NestedProperty {
    pub fn root(&self) -> &str {
        self.parent_path.split('.').next().unwrap_or(&self.parent_path)
    }

    pub fn full_path(&self) -> String {
        format!("{}.{}", self.parent_path, self.name)
    }
}

/// What a terminal handler reads from its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerContract {
    pub handler_name: String,
    pub event_id: String,
    /// Text the event id was derived from (handler name or mapping key).
    pub event_source: String,
    pub required_properties: Vec<RequiredProperty>,
    pub optional_properties: Vec<OptionalProperty>,
    pub nested_properties: Vec<NestedProperty>,
    pub file_path: String,
    pub line: u32,
}

/// A contract of any role, as produced by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Contract {
    Producer(ProducerContract),
    Broker(BrokerTransformation),
    Consumer(ConsumerContract),
}

impl Contract {
    pub fn role(&self) -> Role {
        match self {
            Contract::Producer(_) => Role::Producer,
            Contract::Broker(_) => Role::Broker,
            Contract::Consumer(_) => Role::Consumer,
        }
    }
}
