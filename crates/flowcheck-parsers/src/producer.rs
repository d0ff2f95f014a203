//! Producer (flow-start) contract extraction.

use std::collections::{HashMap, HashSet};

use flowcheck_core::config::FlowConfig;
use flowcheck_core::error::ExtractionError;
use flowcheck_core::types::{
    BindingKind, Contract, ParamType, Parameter, ProducerContract, PropertyBinding, Role,
};
use tree_sitter::Node;

use crate::classify::{classify, leading_identifier};
use crate::extractor::ContractExtractor;
use crate::naming::normalize_event_id;
use crate::treesitter::helpers::{
    bound_names, call_arguments, callee, collect_functions, find_local_value, for_each_descendant,
    line_of, member_chain, named_children, node_text, object_entries, param_pattern,
    string_value, unwrap_expr, FunctionNode, ObjectEntry,
};
use crate::treesitter::SourceParser;

pub struct ProducerExtractor {
    entry_points: Vec<String>,
    parse_timeout_ms: u64,
}

impl ProducerExtractor {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            entry_points: config.broker.entry_points.clone(),
            parse_timeout_ms: config.limits.parse_timeout_ms,
        }
    }
}

impl ContractExtractor for ProducerExtractor {
    fn role(&self) -> Role {
        Role::Producer
    }

    fn extract(&self, path: &str, source: &str) -> Result<Vec<Contract>, ExtractionError> {
        let tree = SourceParser::new(self.parse_timeout_ms).parse(path, source)?;
        Ok(extract_producers(tree.root_node(), source, path, &self.entry_points)
            .into_iter()
            .map(Contract::Producer)
            .collect())
    }
}

/// Every exported function that calls a broker entry point becomes one contract.
pub fn extract_producers(
    root: Node<'_>,
    source: &str,
    path: &str,
    entry_points: &[String],
) -> Vec<ProducerContract> {
    let constants = file_string_constants(root, source);
    let mut contracts = Vec::new();

    for func in collect_functions(root, source) {
        if !func.exported {
            continue;
        }
        let Some(call) = find_broker_call(func.body, source, entry_points) else {
            continue;
        };
        let args = call_arguments(call);
        let Some(event_arg) = args.first() else {
            continue;
        };
        let Some(raw_event) = resolve_event(*event_arg, func.body, source, &constants) else {
            tracing::debug!(
                path,
                function = %func.name,
                "broker call with unresolvable event id, skipping"
            );
            continue;
        };

        let input_parameters = input_parameters(&func, source);
        let param_names: HashSet<&str> = input_parameters.iter().map(|p| p.name.as_str()).collect();
        let produced_properties = match args.get(1) {
            Some(payload) => payload_bindings(*payload, func.body, source, &param_names),
            None => vec![],
        };

        contracts.push(ProducerContract {
            function_name: func.name.clone(),
            target_event_id: normalize_event_id(&raw_event),
            raw_event_id: raw_event,
            input_parameters,
            produced_properties,
            file_path: path.to_string(),
            line: line_of(call),
        });
    }
    contracts
}

/// The first call to a broker entry point, bare (`dispatch(...)`) or as a method.
fn find_broker_call<'t>(body: Node<'t>, source: &str, entry_points: &[String]) -> Option<Node<'t>> {
    let mut found = None;
    for_each_descendant(body, |n| {
        if found.is_some() {
            return false;
        }
        if n.kind() == "call_expression" {
            if let Some((_, name)) = callee(n, source) {
                if entry_points.iter().any(|e| e == name) {
                    found = Some(n);
                    return false;
                }
            }
        }
        true
    });
    found
}

/// File-level `const NAME = 'value'` declarations.
fn file_string_constants(root: Node<'_>, source: &str) -> HashMap<String, String> {
    let mut constants = HashMap::new();
    for stmt in named_children(root) {
        let decl = if stmt.kind() == "export_statement" {
            match stmt.child_by_field_name("declaration") {
                Some(d) => d,
                None => continue,
            }
        } else {
            stmt
        };
        if !matches!(decl.kind(), "lexical_declaration" | "variable_declaration") {
            continue;
        }
        for declarator in named_children(decl) {
            let (Some(name), Some(value)) = (
                declarator.child_by_field_name("name"),
                declarator.child_by_field_name("value"),
            ) else {
                continue;
            };
            if let Some(s) = string_value(value, source) {
                constants.insert(node_text(name, source).to_string(), s);
            }
        }
    }
    constants
}

fn resolve_event(
    arg: Node<'_>,
    scope: Node<'_>,
    source: &str,
    constants: &HashMap<String, String>,
) -> Option<String> {
    if let Some(s) = string_value(arg, source) {
        return Some(s);
    }
    let arg = unwrap_expr(arg);
    if arg.kind() != "identifier" {
        return None;
    }
    let name = node_text(arg, source);
    find_local_value(scope, name, source)
        .and_then(|v| string_value(v, source))
        .or_else(|| constants.get(name).cloned())
}

fn payload_bindings(
    payload: Node<'_>,
    scope: Node<'_>,
    source: &str,
    params: &HashSet<&str>,
) -> Vec<PropertyBinding> {
    let object = match resolve_object(payload, scope, source) {
        Some(o) => o,
        None => {
            tracing::debug!(
                payload = node_text(payload, source),
                "payload is not an object literal"
            );
            return vec![];
        }
    };
    let mut bindings: Vec<PropertyBinding> = Vec::new();
    collect_bindings(object, scope, source, params, &mut bindings, 0);
    bindings
}

/// An object literal, or an identifier bound to one in `scope`.
fn resolve_object<'t>(node: Node<'t>, scope: Node<'t>, source: &str) -> Option<Node<'t>> {
    let node = unwrap_expr(node);
    match node.kind() {
        "object" => Some(node),
        "identifier" => {
            let value = find_local_value(scope, node_text(node, source), source)?;
            let value = unwrap_expr(value);
            (value.kind() == "object").then_some(value)
        }
        _ => None,
    }
}

fn collect_bindings(
    object: Node<'_>,
    scope: Node<'_>,
    source: &str,
    params: &HashSet<&str>,
    out: &mut Vec<PropertyBinding>,
    depth: usize,
) {
    for entry in object_entries(object, source) {
        let binding = match entry {
            ObjectEntry::Pair { key, value, line } => {
                let expression = node_text(value, source).to_string();
                binding_for(key, expression, line, params)
            }
            ObjectEntry::Shorthand { name, line } => {
                binding_for(name.clone(), name, line, params)
            }
            ObjectEntry::Method { name, line } => PropertyBinding {
                name,
                kind: BindingKind::Literal,
                source_parameter: None,
                expression: String::new(),
                line,
            },
            ObjectEntry::Spread { argument, .. } => {
                // Inline spreads of local object literals; anything else is opaque.
                if depth < 2 {
                    if let Some(inner) = resolve_object(argument, scope, source) {
                        collect_bindings(inner, scope, source, params, out, depth + 1);
                    }
                }
                continue;
            }
        };
        // Later keys win, as at runtime.
        if let Some(existing) = out.iter_mut().find(|b| b.name == binding.name) {
            *existing = binding;
        } else {
            out.push(binding);
        }
    }
}

fn binding_for(name: String, expression: String, line: u32, params: &HashSet<&str>) -> PropertyBinding {
    let kind = classify(&expression);
    let source_parameter = match kind {
        BindingKind::Parameter
        | BindingKind::PropertyAccess
        | BindingKind::Conditional
        | BindingKind::Template => leading_identifier(&expression)
            .filter(|id| params.contains(id))
            .map(str::to_string),
        _ => None,
    };
    PropertyBinding {
        name,
        kind,
        source_parameter,
        expression,
        line,
    }
}

fn input_parameters(func: &FunctionNode<'_>, source: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    for param in &func.params {
        let (pattern, has_default) = param_pattern(*param);
        for name in bound_names(pattern, source) {
            let param_type = usage_type(&name, func.body, source).unwrap_or_else(|| name_type(&name));
            params.push(Parameter {
                name,
                param_type,
                has_default,
            });
        }
    }
    params
}

/// Coarse type from naming conventions alone.
pub fn name_type(name: &str) -> ParamType {
    let lower = name.to_lowercase();
    let ends_upper = |suffix: &str| name.ends_with(suffix);
    let is_prefixed = |prefix: &str| {
        name.strip_prefix(prefix)
            .and_then(|r| r.chars().next())
            .is_some_and(|c| c.is_uppercase())
    };

    if lower == "id" || ends_upper("Id") || ends_upper("ID") || lower.ends_with("_id") {
        return ParamType::Identifier;
    }
    if ["is", "has", "should", "can", "was"].iter().any(|p| is_prefixed(p)) {
        return ParamType::Boolean;
    }
    if ["on"].iter().any(|p| is_prefixed(p))
        || ["callback", "cb", "handler", "fn", "listener"].iter().any(|s| lower.ends_with(s))
    {
        return ParamType::Callback;
    }
    if matches!(lower.as_str(), "e" | "ev" | "evt" | "event") || lower.ends_with("event") {
        return ParamType::Event;
    }
    if lower == "el"
        || ends_upper("El")
        || ["element", "node", "target", "container"].iter().any(|s| lower.ends_with(s))
    {
        return ParamType::Element;
    }
    if matches!(lower.as_str(), "x" | "y" | "dx" | "dy" | "n" | "i")
        || ends_upper("X")
        || ends_upper("Y")
        || ["count", "index", "idx", "width", "height", "size", "offset", "delta", "length", "total", "amount"]
            .iter()
            .any(|s| lower.ends_with(s))
    {
        return ParamType::Number;
    }
    if ["name", "label", "text", "title", "message", "url", "key", "type"]
        .iter()
        .any(|s| lower.ends_with(s))
    {
        return ParamType::Text;
    }
    if ["options", "opts", "config", "settings", "props", "data", "payload", "state"]
        .iter()
        .any(|s| lower.ends_with(s))
    {
        return ParamType::Object;
    }
    ParamType::Unknown
}

/// Refine a parameter's type from how the body uses it.
fn usage_type(name: &str, body: Node<'_>, source: &str) -> Option<ParamType> {
    const EVENT_MEMBERS: &[&str] = &[
        "preventDefault", "stopPropagation", "clientX", "clientY", "pointerId", "currentTarget",
        "key", "button",
    ];
    const ELEMENT_MEMBERS: &[&str] = &[
        "getBoundingClientRect", "classList", "querySelector", "appendChild", "style", "dataset",
        "closest", "getAttribute", "setAttribute",
    ];
    const TEXT_MEMBERS: &[&str] = &["trim", "toLowerCase", "toUpperCase", "startsWith", "endsWith", "split"];
    const NUMBER_MEMBERS: &[&str] = &["toFixed", "toPrecision"];

    let mut found = None;
    for_each_descendant(body, |n| {
        if found.is_some() {
            return false;
        }
        match n.kind() {
            "call_expression" => {
                if let Some(f) = n.child_by_field_name("function") {
                    if f.kind() == "identifier" && node_text(f, source) == name {
                        found = Some(ParamType::Callback);
                        return false;
                    }
                }
            }
            "member_expression" => {
                if let Some(chain) = member_chain(n, source) {
                    if chain.root == name {
                        if let Some(first) = chain.segments.first() {
                            let m = first.name.as_str();
                            found = if EVENT_MEMBERS.contains(&m) {
                                Some(ParamType::Event)
                            } else if ELEMENT_MEMBERS.contains(&m) {
                                Some(ParamType::Element)
                            } else if TEXT_MEMBERS.contains(&m) {
                                Some(ParamType::Text)
                            } else if NUMBER_MEMBERS.contains(&m) {
                                Some(ParamType::Number)
                            } else {
                                None
                            };
                        }
                        return false;
                    }
                }
            }
            "unary_expression" => {
                let text = node_text(n, source);
                if text.starts_with("typeof") && text["typeof".len()..].trim() == name {
                    found = typeof_comparison(n, source);
                    return false;
                }
            }
            _ => {}
        }
        true
    });
    found
}

/// `typeof x === 'number'` → Number, read from the enclosing comparison.
fn typeof_comparison(typeof_node: Node<'_>, source: &str) -> Option<ParamType> {
    let parent = typeof_node.parent()?;
    if parent.kind() != "binary_expression" {
        return None;
    }
    let other = named_children(parent)
        .into_iter()
        .find(|c| *c != typeof_node)?;
    match string_value(other, source)?.as_str() {
        "number" | "bigint" => Some(ParamType::Number),
        "string" => Some(ParamType::Text),
        "boolean" => Some(ParamType::Boolean),
        "function" => Some(ParamType::Callback),
        "object" => Some(ParamType::Object),
        _ => None,
    }
}
