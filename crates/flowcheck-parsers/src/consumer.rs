//! Consumer (handler) contract extraction.
//!
//! A handler's requirements are recovered from how it reads its data
//! parameter: destructuring, guards, fallbacks, optional chaining, and plain
//! member access. Property-level decisions are made once all accesses in the
//! body are known, see [`AccessCollector::finish`].

use std::collections::{BTreeMap, HashMap};

use flowcheck_core::config::FlowConfig;
use flowcheck_core::error::ExtractionError;
use flowcheck_core::types::{
    ConsumerContract, Contract, NestedProperty, OptionalProperty, RequiredProperty, Role,
};
use tree_sitter::Node;

use crate::extractor::ContractExtractor;
use crate::naming::{event_from_handler_name, normalize_event_id};
use crate::treesitter::helpers::{
    bound_names, call_arguments, callee, collect_functions, for_each_descendant, function_from,
    line_of, member_chain, node_text, object_entries, object_pattern_entries, operator,
    param_pattern, string_value, unwrap_expr, FunctionNode, MemberChain, ObjectEntry,
};
use crate::treesitter::SourceParser;

/// First-parameter names that carry the event rather than its data.
const EVENT_PARAM_NAMES: &[&str] = &[
    "event", "evt", "eventid", "eventname", "eventtype", "type", "name", "topic", "kind",
];

pub struct ConsumerExtractor {
    handler_prefixes: Vec<String>,
    registration_calls: Vec<String>,
    parse_timeout_ms: u64,
}

impl ConsumerExtractor {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            handler_prefixes: config.consumer.handler_prefixes.clone(),
            registration_calls: config.consumer.registration_calls.clone(),
            parse_timeout_ms: config.limits.parse_timeout_ms,
        }
    }
}

impl ContractExtractor for ConsumerExtractor {
    fn role(&self) -> Role {
        Role::Consumer
    }

    fn extract(&self, path: &str, source: &str) -> Result<Vec<Contract>, ExtractionError> {
        let tree = SourceParser::new(self.parse_timeout_ms).parse(path, source)?;
        Ok(extract_consumers(
            tree.root_node(),
            source,
            path,
            &self.handler_prefixes,
            &self.registration_calls,
        )
        .into_iter()
        .map(Contract::Consumer)
        .collect())
    }
}

/// An explicit `event → handler` binding found in the file.
struct Binding<'t> {
    raw_event: String,
    handler: BoundHandler<'t>,
}

enum BoundHandler<'t> {
    Named(String),
    Inline(FunctionNode<'t>),
}

pub fn extract_consumers(
    root: Node<'_>,
    source: &str,
    path: &str,
    handler_prefixes: &[String],
    registration_calls: &[String],
) -> Vec<ConsumerContract> {
    let functions = collect_functions(root, source);
    let known = |name: &str| functions.iter().any(|f| f.name == name);
    let bindings = explicit_bindings(root, source, registration_calls, &known);

    let mut contracts = Vec::new();
    for func in &functions {
        let explicit: Vec<&str> = bindings
            .iter()
            .filter(|b| matches!(&b.handler, BoundHandler::Named(n) if *n == func.name))
            .map(|b| b.raw_event.as_str())
            .collect();
        if !explicit.is_empty() {
            for raw in explicit {
                contracts.push(consumer_contract(func, raw, normalize_event_id(raw), source, path));
            }
        } else if func.exported {
            if let Some(event_id) = event_from_handler_name(&func.name, handler_prefixes) {
                contracts.push(consumer_contract(func, &func.name, event_id, source, path));
            }
        }
    }

    for binding in &bindings {
        if let BoundHandler::Inline(func) = &binding.handler {
            let event_id = normalize_event_id(&binding.raw_event);
            contracts.push(consumer_contract(func, &binding.raw_event, event_id, source, path));
        }
    }

    contracts.sort_by(|a, b| (a.line, &a.event_id).cmp(&(b.line, &b.event_id)));
    contracts
}

/// Mapping tables (`{ drop: handleDrop }`) and registration calls
/// (`bus.on('drop', handleDrop)`), in source order.
fn explicit_bindings<'t>(
    root: Node<'t>,
    source: &str,
    registration_calls: &[String],
    known: &dyn Fn(&str) -> bool,
) -> Vec<Binding<'t>> {
    let mut bindings: Vec<Binding<'t>> = Vec::new();
    for_each_descendant(root, |n| {
        match n.kind() {
            "object" => {
                for entry in object_entries(n, source) {
                    if let ObjectEntry::Pair { key, value, .. } = entry {
                        let value = unwrap_expr(value);
                        let name = node_text(value, source);
                        if value.kind() == "identifier" && known(name) {
                            bindings.push(Binding {
                                raw_event: key,
                                handler: BoundHandler::Named(name.to_string()),
                            });
                        }
                    }
                }
            }
            "call_expression" => {
                let Some((_, method)) = callee(n, source) else {
                    return true;
                };
                if !registration_calls.iter().any(|r| r == method) {
                    return true;
                }
                let args = call_arguments(n);
                let (Some(event), Some(handler)) = (args.first(), args.get(1)) else {
                    return true;
                };
                let Some(raw_event) = string_value(*event, source) else {
                    return true;
                };
                let handler = unwrap_expr(*handler);
                match handler.kind() {
                    "identifier" if known(node_text(handler, source)) => bindings.push(Binding {
                        raw_event,
                        handler: BoundHandler::Named(node_text(handler, source).to_string()),
                    }),
                    "arrow_function" | "function_expression" | "function" => {
                        let target = n.child_by_field_name("function").unwrap_or(n);
                        let name = format!("{}('{}')", node_text(target, source), raw_event);
                        if let Some(func) = function_from(name, handler, false) {
                            bindings.push(Binding {
                                raw_event,
                                handler: BoundHandler::Inline(func),
                            });
                        }
                        // The inline body is analyzed as a handler, not scanned for tables.
                        return false;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        true
    });
    bindings
}

fn consumer_contract(
    func: &FunctionNode<'_>,
    event_source: &str,
    event_id: String,
    source: &str,
    path: &str,
) -> ConsumerContract {
    let mut collector = AccessCollector::new(source);
    if let Some(param) = data_parameter(func, source) {
        let (pattern, has_default) = param_pattern(param);
        match pattern.kind() {
            "identifier" => collector.add_source(node_text(pattern, source), vec![], has_default),
            "object_pattern" => collector.record_pattern(pattern, vec![], has_default),
            _ => {}
        }
    }
    collector.walk(func.body);
    let (required_properties, optional_properties, nested_properties) = collector.finish();

    tracing::debug!(
        path,
        handler = %func.name,
        event = %event_id,
        required = required_properties.len(),
        optional = optional_properties.len(),
        nested = nested_properties.len(),
        "extracted consumer contract"
    );

    ConsumerContract {
        handler_name: func.name.clone(),
        event_id,
        event_source: event_source.to_string(),
        required_properties,
        optional_properties,
        nested_properties,
        file_path: path.to_string(),
        line: func.line,
    }
}

fn is_write_target(node: Node<'_>) -> bool {
    node.parent().is_some_and(|p| {
        matches!(p.kind(), "assignment_expression" | "augmented_assignment_expression")
            && p.child_by_field_name("left") == Some(node)
    })
}

/// The parameter holding the payload: the first, or the second when the
/// first names the event.
fn data_parameter<'t>(func: &FunctionNode<'t>, source: &str) -> Option<Node<'t>> {
    let first = *func.params.first()?;
    let (first_pattern, _) = param_pattern(first);
    let names_event = first_pattern.kind() == "identifier"
        && EVENT_PARAM_NAMES.contains(&node_text(first_pattern, source).to_lowercase().as_str());
    match func.params.get(1) {
        Some(second) if names_event => Some(*second),
        _ => Some(first),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessContext {
    Plain,
    /// Left side of `||` / `??`.
    Fallback,
    /// Condition position; `negated` for `!x`, `x === undefined`, and friends.
    Test { negated: bool },
}

#[derive(Debug, Clone)]
struct Access {
    /// Property path from the payload root.
    path: Vec<String>,
    /// Per segment: reached through `?.` (or a defaulted alias).
    optional: Vec<bool>,
    context: AccessContext,
    destructured: bool,
    has_default: bool,
    line: u32,
}

impl Access {
    fn safe_navigated(&self) -> bool {
        self.optional.iter().take(2).any(|o| *o)
    }
}

/// A local that refers to the payload or a path inside it.
#[derive(Debug, Clone)]
struct SourceRef {
    prefix: Vec<String>,
    safe: bool,
}

struct AccessCollector<'s> {
    source: &'s str,
    sources: HashMap<String, SourceRef>,
    accesses: Vec<Access>,
}

/// Everything observed about one top-level payload property.
#[derive(Debug, Default)]
struct Summary {
    line: u32,
    destructured: bool,
    defaulted: bool,
    guarded: bool,
    unconditional: bool,
    fallback: bool,
    safe_nav: bool,
    tested: bool,
    /// Accessed by name, not only through a deeper chain.
    direct: bool,
    deepest: Option<Vec<String>>,
}

impl Summary {
    fn covered(&self) -> bool {
        self.fallback || self.safe_nav || self.tested || self.defaulted
    }

    fn required(&self) -> bool {
        self.destructured || self.guarded || (self.unconditional && !self.covered())
    }
}

impl<'s> AccessCollector<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            sources: HashMap::new(),
            accesses: Vec::new(),
        }
    }

    fn add_source(&mut self, name: &str, prefix: Vec<String>, safe: bool) {
        self.sources.insert(name.to_string(), SourceRef { prefix, safe });
    }

    fn resolve(&self, chain: &MemberChain) -> Option<(Vec<String>, Vec<bool>)> {
        let src = self.sources.get(&chain.root)?;
        let mut path = src.prefix.clone();
        let mut optional = vec![src.safe; src.prefix.len()];
        for seg in &chain.segments {
            path.push(seg.name.clone());
            optional.push(seg.optional);
        }
        Some((path, optional))
    }

    fn resolve_node(&self, node: Node<'_>) -> Option<(Vec<String>, Vec<bool>)> {
        self.resolve(&member_chain(unwrap_expr(node), self.source)?)
    }

    fn push(&mut self, path: Vec<String>, optional: Vec<bool>, context: AccessContext, line: u32) {
        self.accesses.push(Access {
            path,
            optional,
            context,
            destructured: false,
            has_default: false,
            line,
        });
    }

    /// Record an object destructuring pattern read from `prefix`.
    fn record_pattern(&mut self, pattern: Node<'_>, prefix: Vec<String>, safe: bool) {
        for entry in object_pattern_entries(pattern, self.source) {
            if entry.is_rest {
                continue;
            }
            let mut path = prefix.clone();
            path.push(entry.key.clone());
            let entry_safe = safe || entry.has_default;
            // A nested pattern only reads its parent through the deeper paths.
            if entry.nested.is_none() || entry.has_default {
                self.accesses.push(Access {
                    optional: vec![safe; path.len()],
                    path: path.clone(),
                    context: AccessContext::Plain,
                    destructured: true,
                    has_default: entry.has_default,
                    line: entry.line,
                });
            }
            if let Some(nested) = entry.nested {
                self.record_pattern(nested, path, entry_safe);
            } else if let Some(local) = entry.local {
                self.add_source(&local, path, entry_safe);
            }
        }
    }

    fn walk(&mut self, body: Node<'_>) {
        for_each_descendant(body, |n| self.visit(n));
    }

    fn visit(&mut self, node: Node<'_>) -> bool {
        match node.kind() {
            "variable_declarator" => self.visit_declarator(node),
            "call_expression" => self.visit_call(node),
            "binary_expression" if operator(node) == Some("in") => self.visit_in(node),
            "member_expression" => self.visit_member(node),
            "identifier" => self.visit_identifier(node),
            "arrow_function"
            | "function_expression"
            | "function"
            | "generator_function"
            | "function_declaration"
            | "generator_function_declaration"
            | "method_definition" => self.visit_inner_function(node),
            _ => true,
        }
    }

    /// A nested function whose parameters shadow a payload local reads its own
    /// argument, not the payload, inside its body.
    fn visit_inner_function(&mut self, node: Node<'_>) -> bool {
        let Some(func) = function_from(String::new(), node, false) else {
            return true;
        };
        let shadowed: Vec<(String, SourceRef)> = func
            .params
            .iter()
            .flat_map(|p| bound_names(param_pattern(*p).0, self.source))
            .filter_map(|name| self.sources.remove(&name).map(|src| (name, src)))
            .collect();
        if shadowed.is_empty() {
            return true;
        }
        self.walk(func.body);
        self.sources.extend(shadowed);
        false
    }

    /// Bare use of a local bound to a payload path (`if (!ctx)`, `render(elementId)`).
    fn visit_identifier(&mut self, node: Node<'_>) -> bool {
        let Some(src) = self.sources.get(node_text(node, self.source)) else {
            return false;
        };
        if src.prefix.is_empty() || is_write_target(node) {
            return false;
        }
        let path = src.prefix.clone();
        let optional = vec![src.safe; path.len()];
        let context = self.context_of(node);
        self.push(path, optional, context, line_of(node));
        false
    }

    /// `const { a } = data`, `const ctx = data.context`, `const c = data.c || {}`.
    fn visit_declarator(&mut self, node: Node<'_>) -> bool {
        let (Some(name), Some(value)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("value"),
        ) else {
            return true;
        };
        let value = unwrap_expr(value);
        let (base, with_fallback) = match (value.kind(), operator(value)) {
            ("binary_expression", Some("||" | "??")) => match value.child_by_field_name("left") {
                Some(left) => (left, true),
                None => return true,
            },
            _ => (value, false),
        };
        let Some((path, optional)) = self.resolve_node(base) else {
            return true;
        };
        let safe = with_fallback || optional.iter().any(|o| *o);
        match name.kind() {
            "object_pattern" => {
                self.record_pattern(name, path, safe);
                false
            }
            "identifier" => {
                // Aliasing reads `data.a.b` (dereferencing `a`) but not `b` itself.
                if with_fallback && !path.is_empty() {
                    self.push(path.clone(), optional, AccessContext::Fallback, line_of(base));
                } else if path.len() > 1 {
                    self.push(path.clone(), optional, AccessContext::Plain, line_of(base));
                }
                self.add_source(node_text(name, self.source), path, safe);
                false
            }
            _ => true,
        }
    }

    /// `data.hasOwnProperty('p')` and `Object.hasOwn(data, 'p')`.
    fn visit_call(&mut self, node: Node<'_>) -> bool {
        let Some((receiver, method)) = callee(node, self.source) else {
            return true;
        };
        let args = call_arguments(node);
        let target = match (receiver, method) {
            (Some("Object"), "hasOwn") => args.first().copied().zip(args.get(1).copied()),
            (Some(_), "hasOwnProperty") => node
                .child_by_field_name("function")
                .and_then(|f| unwrap_expr(f).child_by_field_name("object"))
                .zip(args.first().copied()),
            _ => None,
        };
        let Some((object, key)) = target else {
            return true;
        };
        let (Some((mut path, mut optional)), Some(key)) =
            (self.resolve_node(object), string_value(key, self.source))
        else {
            return true;
        };
        path.push(key);
        optional.push(false);
        self.push(path, optional, AccessContext::Test { negated: false }, line_of(node));
        false
    }

    /// `'p' in data`.
    fn visit_in(&mut self, node: Node<'_>) -> bool {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return true;
        };
        let (Some(key), Some((mut path, mut optional))) =
            (string_value(left, self.source), self.resolve_node(right))
        else {
            return true;
        };
        path.push(key);
        optional.push(false);
        let negated = matches!(self.context_of(node), AccessContext::Test { negated: true });
        self.push(path, optional, AccessContext::Test { negated }, line_of(node));
        false
    }

    fn visit_member(&mut self, node: Node<'_>) -> bool {
        let Some(chain) = member_chain(node, self.source) else {
            return true;
        };
        let Some((mut path, mut optional)) = self.resolve(&chain) else {
            return true;
        };
        if is_write_target(node) {
            return false;
        }
        // `data.items.map(...)`: the method name is not a property.
        if let Some(parent) = node.parent() {
            if parent.kind() == "call_expression" && parent.child_by_field_name("function") == Some(node) {
                path.pop();
                optional.pop();
            }
        }
        if path.is_empty() {
            return false;
        }
        let context = self.context_of(node);
        self.push(path, optional, context, line_of(node));
        false
    }

    /// Classify how the value at `node` is used by walking up through
    /// parentheses, `!`, `typeof`, and comparisons to a consuming position.
    fn context_of(&self, node: Node<'_>) -> AccessContext {
        let mut current = node;
        let mut negated = false;
        let mut typeof_seen = false;
        loop {
            let Some(parent) = current.parent() else {
                return AccessContext::Plain;
            };
            let is_field = |field: &str| parent.child_by_field_name(field) == Some(current);
            match parent.kind() {
                "parenthesized_expression" => {}
                "unary_expression" => match operator(parent) {
                    Some("!") => negated = !negated,
                    Some("typeof") => typeof_seen = true,
                    _ => return AccessContext::Plain,
                },
                "binary_expression" => {
                    let op = operator(parent).unwrap_or("");
                    match op {
                        "||" | "??" if is_field("left") => return AccessContext::Fallback,
                        "&&" if is_field("left") => return AccessContext::Test { negated },
                        "===" | "==" | "!==" | "!=" => {
                            let other_field = if is_field("left") { "right" } else { "left" };
                            let Some(other) = parent.child_by_field_name(other_field) else {
                                return AccessContext::Plain;
                            };
                            let other_text = node_text(other, self.source);
                            let is_missing = matches!(other_text, "undefined" | "null")
                                || (typeof_seen
                                    && string_value(other, self.source).as_deref() == Some("undefined"));
                            if !is_missing && !typeof_seen {
                                return AccessContext::Plain;
                            }
                            let equality = matches!(op, "===" | "==");
                            // `x === undefined` and `typeof x !== 'function'` both bail on absence.
                            let bails = if is_missing { equality } else { !equality };
                            return AccessContext::Test {
                                negated: negated != bails,
                            };
                        }
                        _ => return AccessContext::Plain,
                    }
                }
                "if_statement" | "while_statement" | "do_statement" | "ternary_expression" => {
                    return if is_field("condition") {
                        AccessContext::Test { negated }
                    } else {
                        AccessContext::Plain
                    };
                }
                _ => return AccessContext::Plain,
            }
            current = parent;
        }
    }

    /// Reduce the recorded accesses to required, optional, and nested properties.
    fn finish(self) -> (Vec<RequiredProperty>, Vec<OptionalProperty>, Vec<NestedProperty>) {
        // Summaries keep first-occurrence order.
        let mut order: HashMap<String, usize> = HashMap::new();
        let mut summaries: Vec<(String, Summary)> = Vec::new();
        // (parent_path, name) -> (required, line)
        let mut nested: BTreeMap<(String, String), (bool, u32)> = BTreeMap::new();

        for access in &self.accesses {
            let Some(name) = access.path.first() else {
                continue;
            };
            let idx = *order.entry(name.clone()).or_insert_with(|| {
                summaries.push((
                    name.clone(),
                    Summary {
                        line: access.line,
                        ..Summary::default()
                    },
                ));
                summaries.len() - 1
            });
            let s = &mut summaries[idx].1;
            s.line = s.line.min(access.line);
            let top_level = access.path.len() == 1;
            let safe_nav = access.safe_navigated();

            if access.destructured {
                if access.has_default && top_level {
                    s.defaulted = true;
                } else if !access.optional.first().copied().unwrap_or(false) {
                    s.destructured = true;
                } else {
                    s.safe_nav = true;
                }
            } else if safe_nav {
                s.safe_nav = true;
            } else {
                match access.context {
                    AccessContext::Fallback if top_level => s.fallback = true,
                    AccessContext::Test { negated: true } => s.guarded = true,
                    AccessContext::Test { negated: false } if top_level => s.tested = true,
                    _ => s.unconditional = true,
                }
            }
            if top_level {
                s.direct = true;
            } else if s.deepest.as_ref().map_or(true, |d| d.len() < access.path.len()) {
                s.deepest = Some(access.path.clone());
            }

            // Reading `a.b` dereferences `a` whatever the surrounding context;
            // only `?.` or a safe alias up to that segment makes it optional.
            for depth in 1..access.path.len() {
                let required = !access.optional.iter().take(depth + 1).any(|o| *o);
                let key = (access.path[..depth].join("."), access.path[depth].clone());
                let entry = nested.entry(key).or_insert((required, access.line));
                entry.0 |= required;
                entry.1 = entry.1.min(access.line);
            }
        }

        let mut required = Vec::new();
        let mut optional = Vec::new();
        for (name, s) in &summaries {
            if s.required() {
                required.push(RequiredProperty {
                    name: name.clone(),
                    is_nested: !s.direct,
                    nested_path: if s.direct {
                        None
                    } else {
                        s.deepest.as_ref().map(|p| p.join("."))
                    },
                    line: s.line,
                });
            } else {
                optional.push(OptionalProperty {
                    name: name.clone(),
                    has_fallback: s.fallback || s.defaulted,
                    line: s.line,
                });
            }
        }

        let mut nested_properties: Vec<NestedProperty> = nested
            .into_iter()
            .map(|((parent_path, name), (is_required, line))| {
                let root = parent_path.split('.').next().unwrap_or("");
                // A root the handler tests or defaults protects everything below it.
                let root_protected = order
                    .get(root)
                    .is_some_and(|i| {
                        let s = &summaries[*i].1;
                        s.tested || s.defaulted || s.fallback
                    });
                NestedProperty {
                    parent_path,
                    name,
                    is_required: is_required && !root_protected,
                    line,
                }
            })
            .collect();

        required.sort_by_key(|p| p.line);
        optional.sort_by_key(|p| p.line);
        nested_properties.sort_by(|a, b| {
            (a.line, &a.parent_path, &a.name).cmp(&(b.line, &b.parent_path, &b.name))
        });
        (required, optional, nested_properties)
    }
}
