//! Broker transformation extraction.
//!
//! The broker exposes one prepare routine. Every branch keyed on the event id
//! becomes a [`BrokerTransformation`]; the routine's final return becomes the
//! fall-through entry under [`DEFAULT_EVENT_ID`].

use std::collections::{BTreeMap, HashSet};

use flowcheck_core::config::FlowConfig;
use flowcheck_core::error::ExtractionError;
use flowcheck_core::types::{BindingKind, BrokerTransformation, Contract, Role, DEFAULT_EVENT_ID};
use tree_sitter::Node;

use crate::classify::{classify, referenced_identifiers};
use crate::extractor::ContractExtractor;
use crate::naming::normalize_event_id;
use crate::treesitter::helpers::{
    bound_names, call_arguments, callee, collect_functions, find_local_value, for_each_descendant,
    line_of, member_chain, named_children, node_text, object_entries, object_pattern_entries,
    operator, param_name, string_value, unwrap_expr, FunctionNode, ObjectEntry,
};
use crate::treesitter::SourceParser;

/// Members of the payload that may carry the event id (`payload.type === 'drop'`).
const PAYLOAD_EVENT_FIELDS: &[&str] = &["type", "event", "eventType", "eventId"];

const MAX_RESOLVE_DEPTH: usize = 4;

pub struct BrokerExtractor {
    prepare_functions: Vec<String>,
    generators: Vec<String>,
    parse_timeout_ms: u64,
}

impl BrokerExtractor {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            prepare_functions: config.broker.prepare_functions.clone(),
            generators: config.broker.generators.clone(),
            parse_timeout_ms: config.limits.parse_timeout_ms,
        }
    }
}

impl ContractExtractor for BrokerExtractor {
    fn role(&self) -> Role {
        Role::Broker
    }

    fn extract(&self, path: &str, source: &str) -> Result<Vec<Contract>, ExtractionError> {
        let tree = SourceParser::new(self.parse_timeout_ms).parse(path, source)?;
        Ok(extract_broker(
            tree.root_node(),
            source,
            path,
            &self.prepare_functions,
            &self.generators,
        )
        .into_iter()
        .map(Contract::Broker)
        .collect())
    }
}

pub fn extract_broker(
    root: Node<'_>,
    source: &str,
    path: &str,
    prepare_functions: &[String],
    generators: &[String],
) -> Vec<BrokerTransformation> {
    let functions = collect_functions(root, source);
    let Some(func) = prepare_functions
        .iter()
        .find_map(|name| functions.iter().find(|f| &f.name == name))
    else {
        tracing::debug!(path, "no prepare routine in broker file");
        return vec![];
    };
    PrepareRoutine::new(func, source, path, generators).transformations()
}

/// The shape of a returned payload.
#[derive(Debug, Default)]
struct ReturnShape {
    /// Explicit keys with their value text, last write wins.
    entries: Vec<(String, String)>,
    /// The input (or something opaque) is spread into the result.
    has_spread: bool,
}

impl ReturnShape {
    fn passthrough() -> Self {
        Self {
            entries: vec![],
            has_spread: true,
        }
    }

    fn set(&mut self, name: String, expression: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = expression;
        } else {
            self.entries.push((name, expression));
        }
    }
}

/// A region of the routine: the node to search for local declarations and
/// the statements whose side effects (assignments, deletes) count.
struct Scope<'a> {
    node: Node<'a>,
    statements: Vec<Node<'a>>,
}

impl<'a> Scope<'a> {
    fn of_branch(branch: Node<'a>) -> Self {
        let statements = if branch.kind() == "statement_block" {
            named_children(branch)
        } else {
            vec![branch]
        };
        Self {
            node: branch,
            statements,
        }
    }
}

struct PrepareRoutine<'a> {
    source: &'a str,
    path: &'a str,
    body: Node<'a>,
    event_param: Option<String>,
    payload_param: Option<String>,
    /// Inputs plus every local derived from them.
    traceable: HashSet<String>,
    generators: &'a [String],
}

fn mentions_event(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["event", "type", "name", "kind", "topic"]
        .iter()
        .any(|w| lower.contains(w))
}

impl<'a> PrepareRoutine<'a> {
    fn new(func: &FunctionNode<'a>, source: &'a str, path: &'a str, generators: &'a [String]) -> Self {
        let names: Vec<Option<String>> = func.params.iter().map(|p| param_name(*p, source)).collect();
        let event_idx = names
            .iter()
            .position(|n| n.as_deref().is_some_and(mentions_event))
            .unwrap_or(0);
        let event_param = names.get(event_idx).cloned().flatten();
        let payload_param = names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != event_idx)
            .find_map(|(_, n)| n.clone());

        let mut routine = Self {
            source,
            path,
            body: func.body,
            event_param,
            payload_param,
            traceable: HashSet::new(),
            generators,
        };
        routine.traceable = routine.derive_traceable();
        routine
    }

    fn derive_traceable(&self) -> HashSet<String> {
        let mut set: HashSet<String> = self
            .event_param
            .iter()
            .chain(self.payload_param.iter())
            .cloned()
            .collect();
        let mut declarators = Vec::new();
        for_each_descendant(self.body, |n| {
            if n.kind() == "variable_declarator" {
                declarators.push(n);
            }
            true
        });
        // Fixed point over `const x = <expr over inputs>`.
        loop {
            let before = set.len();
            for declarator in &declarators {
                let (Some(name), Some(value)) = (
                    declarator.child_by_field_name("name"),
                    declarator.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let refs = referenced_identifiers(node_text(value, self.source));
                if refs.iter().any(|r| set.contains(*r)) {
                    set.extend(bound_names(name, self.source));
                }
            }
            if set.len() == before {
                break;
            }
        }
        set
    }

    fn transformations(&self) -> Vec<BrokerTransformation> {
        let mut special: Vec<BrokerTransformation> = Vec::new();
        let mut fallback: Option<BrokerTransformation> = None;

        if self.body.kind() != "statement_block" {
            let scope = Scope {
                node: self.body,
                statements: vec![],
            };
            return self
                .shape_of(self.body, &scope, 0)
                .map(|shape| vec![self.transformation(DEFAULT_EVENT_ID.into(), None, &shape, vec![], line_of(self.body))])
                .unwrap_or_default();
        }

        let top_level = named_children(self.body);
        let mut final_return = None;
        for stmt in &top_level {
            match stmt.kind() {
                "if_statement" => self.if_chain(*stmt, &mut special, &mut fallback),
                "switch_statement" => self.switch_cases(*stmt, &mut special, &mut fallback),
                "return_statement" => final_return = Some(*stmt),
                _ => {}
            }
        }

        let default_scope = Scope {
            node: self.body,
            statements: top_level
                .iter()
                .copied()
                .filter(|s| !matches!(s.kind(), "if_statement" | "switch_statement"))
                .collect(),
        };
        let default = final_return
            .and_then(|ret| {
                let shape = self.shape_of(ret.named_child(0)?, &default_scope, 0)?;
                let removed = self.removed_in(&default_scope);
                Some(self.transformation(DEFAULT_EVENT_ID.into(), None, &shape, removed, line_of(ret)))
            })
            .or(fallback);

        tracing::debug!(
            path = self.path,
            special_cases = special.len(),
            has_default = default.is_some(),
            "extracted broker transformations"
        );
        special.extend(default);
        special
    }

    fn push_special(&self, out: &mut Vec<BrokerTransformation>, t: BrokerTransformation) {
        if out.iter().any(|o| o.event_id == t.event_id) {
            tracing::debug!(path = self.path, event = %t.event_id, "duplicate broker branch ignored");
            return;
        }
        out.push(t);
    }

    fn if_chain(
        &self,
        stmt: Node<'a>,
        out: &mut Vec<BrokerTransformation>,
        fallback: &mut Option<BrokerTransformation>,
    ) {
        let mut chain_has_guard = false;
        let mut current = Some(stmt);
        while let Some(node) = current.take() {
            let (Some(condition), Some(consequence)) = (
                node.child_by_field_name("condition"),
                node.child_by_field_name("consequence"),
            ) else {
                return;
            };
            let guard = unwrap_expr(condition);
            if let Some(events) = self.guard_events(guard) {
                chain_has_guard = true;
                let text = node_text(guard, self.source).to_string();
                let scope = Scope::of_branch(consequence);
                match self.scope_shape(&scope) {
                    Some(shape) => {
                        let removed = self.removed_in(&scope);
                        for event in events {
                            let t = self.transformation(
                                normalize_event_id(&event),
                                Some(text.clone()),
                                &shape,
                                removed.clone(),
                                line_of(node),
                            );
                            self.push_special(out, t);
                        }
                    }
                    None => tracing::debug!(
                        path = self.path,
                        guard = %text,
                        "branch has no resolvable return"
                    ),
                }
            }

            let Some(alternative) = node.child_by_field_name("alternative") else {
                return;
            };
            match named_children(alternative).into_iter().next() {
                Some(next) if next.kind() == "if_statement" => current = Some(next),
                Some(block) if chain_has_guard && fallback.is_none() => {
                    let scope = Scope::of_branch(block);
                    if let Some(shape) = self.scope_shape(&scope) {
                        *fallback = Some(self.transformation(
                            DEFAULT_EVENT_ID.into(),
                            None,
                            &shape,
                            self.removed_in(&scope),
                            line_of(block),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    fn switch_cases(
        &self,
        stmt: Node<'a>,
        out: &mut Vec<BrokerTransformation>,
        fallback: &mut Option<BrokerTransformation>,
    ) {
        let (Some(value), Some(body)) = (
            stmt.child_by_field_name("value"),
            stmt.child_by_field_name("body"),
        ) else {
            return;
        };
        if !self.is_event_ref(value) {
            return;
        }

        // Cases without a body fall through into the next one.
        let mut pending: Vec<(String, String, u32)> = Vec::new();
        for case in named_children(body) {
            let case_value = case.child_by_field_name("value");
            let statements: Vec<Node<'a>> = named_children(case)
                .into_iter()
                .filter(|c| Some(*c) != case_value)
                .collect();
            match case.kind() {
                "switch_case" => {
                    if let Some(v) = case_value {
                        if let Some(event) = string_value(v, self.source) {
                            pending.push((event, format!("case {}", node_text(v, self.source)), line_of(case)));
                        }
                    }
                    if statements.is_empty() {
                        continue;
                    }
                    let scope = Scope {
                        node: case,
                        statements,
                    };
                    let Some(shape) = self.scope_shape(&scope) else {
                        pending.clear();
                        continue;
                    };
                    let removed = self.removed_in(&scope);
                    for (event, condition, line) in pending.drain(..) {
                        let t = self.transformation(
                            normalize_event_id(&event),
                            Some(condition),
                            &shape,
                            removed.clone(),
                            line,
                        );
                        self.push_special(out, t);
                    }
                }
                "switch_default" if fallback.is_none() => {
                    let scope = Scope {
                        node: case,
                        statements,
                    };
                    if let Some(shape) = self.scope_shape(&scope) {
                        *fallback = Some(self.transformation(
                            DEFAULT_EVENT_ID.into(),
                            None,
                            &shape,
                            self.removed_in(&scope),
                            line_of(case),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    /// Whether `node` reads the dispatched event id.
    fn is_event_ref(&self, node: Node<'_>) -> bool {
        let node = unwrap_expr(node);
        let text = node_text(node, self.source);
        if self.event_param.as_deref() == Some(text) {
            return true;
        }
        match (member_chain(node, self.source), &self.payload_param) {
            (Some(chain), Some(payload)) => {
                chain.root == *payload
                    && chain.segments.len() == 1
                    && PAYLOAD_EVENT_FIELDS.contains(&chain.segments[0].name.as_str())
            }
            _ => false,
        }
    }

    /// Event ids selected by a guard, or `None` if the guard is not keyed on
    /// the event id.
    fn guard_events(&self, node: Node<'_>) -> Option<Vec<String>> {
        let node = unwrap_expr(node);
        match node.kind() {
            "binary_expression" => {
                let left = node.child_by_field_name("left")?;
                let right = node.child_by_field_name("right")?;
                match operator(node)? {
                    "===" | "==" => {
                        if self.is_event_ref(left) {
                            string_value(right, self.source).map(|s| vec![s])
                        } else if self.is_event_ref(right) {
                            string_value(left, self.source).map(|s| vec![s])
                        } else {
                            None
                        }
                    }
                    "||" => {
                        let mut events = self.guard_events(left)?;
                        for e in self.guard_events(right)? {
                            if !events.contains(&e) {
                                events.push(e);
                            }
                        }
                        Some(events)
                    }
                    // Extra conditions conjoined with an event test narrow, never widen.
                    "&&" => match (self.guard_events(left), self.guard_events(right)) {
                        (Some(l), Some(r)) => {
                            let both: Vec<String> = l.into_iter().filter(|e| r.contains(e)).collect();
                            (!both.is_empty()).then_some(both)
                        }
                        (Some(events), None) | (None, Some(events)) => Some(events),
                        (None, None) => None,
                    },
                    _ => None,
                }
            }
            "call_expression" => {
                let (_, method) = callee(node, self.source)?;
                let function = unwrap_expr(node.child_by_field_name("function")?);
                let list = unwrap_expr(function.child_by_field_name("object")?);
                let arg = *call_arguments(node).first()?;
                if method != "includes" || list.kind() != "array" || !self.is_event_ref(arg) {
                    return None;
                }
                let events: Vec<String> = named_children(list)
                    .into_iter()
                    .filter_map(|e| string_value(e, self.source))
                    .collect();
                (!events.is_empty()).then_some(events)
            }
            _ => None,
        }
    }

    fn scope_shape(&self, scope: &Scope<'a>) -> Option<ReturnShape> {
        let ret = terminal_return(&scope.statements)?;
        self.shape_of(ret.named_child(0)?, scope, 0)
    }

    fn shape_of(&self, expr: Node<'a>, scope: &Scope<'a>, depth: usize) -> Option<ReturnShape> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let expr = unwrap_expr(expr);
        match expr.kind() {
            "object" => {
                let mut shape = ReturnShape::default();
                self.merge_object(expr, scope, &mut shape, depth);
                Some(shape)
            }
            "identifier" => {
                let name = node_text(expr, self.source);
                let mut shape = if self.payload_param.as_deref() == Some(name) {
                    ReturnShape::passthrough()
                } else {
                    let value = find_local_value(scope.node, name, self.source)
                        .or_else(|| find_local_value(self.body, name, self.source))?;
                    self.shape_of(value, scope, depth + 1)?
                };
                self.collect_assignments(scope, name, &mut shape);
                Some(shape)
            }
            "call_expression" => {
                let (receiver, method) = callee(expr, self.source)?;
                if receiver != Some("Object") || method != "assign" {
                    return None;
                }
                let mut shape = ReturnShape::default();
                for arg in call_arguments(expr) {
                    self.merge_source(arg, scope, &mut shape, depth + 1);
                }
                Some(shape)
            }
            _ => None,
        }
    }

    fn merge_object(&self, object: Node<'a>, scope: &Scope<'a>, shape: &mut ReturnShape, depth: usize) {
        for entry in object_entries(object, self.source) {
            match entry {
                ObjectEntry::Pair { key, value, .. } => {
                    shape.set(key, node_text(value, self.source).to_string())
                }
                ObjectEntry::Shorthand { name, .. } => shape.set(name.clone(), name),
                ObjectEntry::Method { name, .. } => shape.set(name, String::new()),
                ObjectEntry::Spread { argument, .. } => {
                    self.merge_source(argument, scope, shape, depth + 1)
                }
            }
        }
    }

    /// Fold a spread / `Object.assign` source into `shape`. Local object
    /// literals are inlined; anything else counts as spreading the input.
    fn merge_source(&self, node: Node<'a>, scope: &Scope<'a>, shape: &mut ReturnShape, depth: usize) {
        let node = unwrap_expr(node);
        if depth <= MAX_RESOLVE_DEPTH {
            if node.kind() == "object" {
                self.merge_object(node, scope, shape, depth);
                return;
            }
            if node.kind() == "identifier" {
                let name = node_text(node, self.source);
                let local = find_local_value(scope.node, name, self.source)
                    .or_else(|| find_local_value(self.body, name, self.source))
                    .map(unwrap_expr);
                if let Some(value) = local.filter(|v| v.kind() == "object") {
                    self.merge_object(value, scope, shape, depth + 1);
                    return;
                }
            }
        }
        shape.has_spread = true;
    }

    /// `ident.prop = value` statements in scope.
    fn collect_assignments(&self, scope: &Scope<'a>, ident: &str, shape: &mut ReturnShape) {
        for stmt in &scope.statements {
            for_each_descendant(*stmt, |n| {
                if n.kind() != "assignment_expression" {
                    return true;
                }
                let (Some(left), Some(right)) = (
                    n.child_by_field_name("left"),
                    n.child_by_field_name("right"),
                ) else {
                    return true;
                };
                if let Some(chain) = member_chain(left, self.source) {
                    if chain.root == ident && chain.segments.len() == 1 {
                        shape.set(
                            chain.segments[0].name.clone(),
                            node_text(right, self.source).to_string(),
                        );
                    }
                }
                true
            });
        }
    }

    /// `delete x.p` targets and keys excluded via `{ p, ...rest } = input`.
    fn removed_in(&self, scope: &Scope<'a>) -> Vec<String> {
        let mut removed: Vec<String> = Vec::new();
        for stmt in &scope.statements {
            for_each_descendant(*stmt, |n| {
                match n.kind() {
                    "unary_expression" if operator(n) == Some("delete") => {
                        if let Some(chain) = n
                            .child_by_field_name("argument")
                            .and_then(|a| member_chain(a, self.source))
                        {
                            if let Some(last) = chain.segments.last() {
                                removed.push(last.name.clone());
                            }
                        }
                    }
                    "variable_declarator" => {
                        let (Some(name), Some(value)) = (
                            n.child_by_field_name("name"),
                            n.child_by_field_name("value"),
                        ) else {
                            return true;
                        };
                        if name.kind() != "object_pattern" || !self.is_traceable(node_text(value, self.source)) {
                            return true;
                        }
                        let entries = object_pattern_entries(name, self.source);
                        if entries.iter().any(|e| e.is_rest) {
                            removed.extend(entries.into_iter().filter(|e| !e.is_rest).map(|e| e.key));
                        }
                    }
                    _ => {}
                }
                true
            });
        }
        removed.sort();
        removed.dedup();
        removed
    }

    fn is_traceable(&self, expression: &str) -> bool {
        referenced_identifiers(expression)
            .iter()
            .any(|id| self.traceable.contains(*id))
    }

    /// Synthesized by the broker rather than forwarded from the input.
    fn is_broker_generated(&self, name: &str, expression: &str) -> bool {
        self.generators.iter().any(|g| g == name)
            || classify(expression) == BindingKind::Generated
            || !self.is_traceable(expression)
    }

    fn transformation(
        &self,
        event_id: String,
        condition: Option<String>,
        shape: &ReturnShape,
        removed_properties: Vec<String>,
        line: u32,
    ) -> BrokerTransformation {
        let is_special_cased = !shape.has_spread;
        let mut output_mappings = BTreeMap::new();
        let mut added_properties = Vec::new();
        for (name, expression) in &shape.entries {
            output_mappings.insert(name.clone(), expression.clone());
            // In an additive branch every explicit key lands on top of the input.
            if !is_special_cased || self.is_broker_generated(name, expression) {
                added_properties.push(name.clone());
            }
        }
        BrokerTransformation {
            event_id,
            is_special_cased,
            condition,
            output_mappings,
            added_properties,
            removed_properties,
            file_path: self.path.to_string(),
            line,
        }
    }
}

/// Last `return` in a statement list, looking into trailing blocks.
fn terminal_return<'a>(statements: &[Node<'a>]) -> Option<Node<'a>> {
    for stmt in statements.iter().rev() {
        match stmt.kind() {
            "return_statement" => return Some(*stmt),
            "statement_block" => {
                if let Some(ret) = terminal_return(&named_children(*stmt)) {
                    return Some(ret);
                }
            }
            _ => {}
        }
    }
    None
}
