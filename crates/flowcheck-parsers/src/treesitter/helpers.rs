//! Node-level helpers shared by the role extractors.

use std::collections::HashSet;

use tree_sitter::Node;

pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based line of the node's first byte.
pub fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

/// Named children, skipping comments.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// Pre-order traversal; `f` returns whether to descend into the node.
pub fn for_each_descendant<'t>(node: Node<'t>, mut f: impl FnMut(Node<'t>) -> bool) {
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if !f(n) {
            continue;
        }
        let children = named_children(n);
        stack.extend(children.into_iter().rev());
    }
}

/// Strip parentheses and TypeScript-only wrappers (`as`, `satisfies`, `!`).
pub fn unwrap_expr(mut node: Node<'_>) -> Node<'_> {
    loop {
        match node.kind() {
            "parenthesized_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression" => match node.named_child(0) {
                Some(inner) => node = inner,
                None => return node,
            },
            _ => return node,
        }
    }
}

/// Operator token of a binary/unary/assignment expression.
pub fn operator(node: Node<'_>) -> Option<&'static str> {
    node.child_by_field_name("operator").map(|op| op.kind())
}

/// Value of a string literal or a substitution-free template literal.
pub fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    let node = unwrap_expr(node);
    let text = node_text(node, source);
    match node.kind() {
        "string" if text.len() >= 2 => Some(text[1..text.len() - 1].to_string()),
        "template_string" if text.len() >= 2 => {
            let has_substitution = named_children(node)
                .iter()
                .any(|c| c.kind() == "template_substitution");
            if has_substitution {
                None
            } else {
                Some(text[1..text.len() - 1].to_string())
            }
        }
        _ => None,
    }
}

/// A function-like definition found at file or class level.
#[derive(Debug, Clone)]
pub struct FunctionNode<'t> {
    pub name: String,
    pub params: Vec<Node<'t>>,
    /// `statement_block`, or the expression body of an arrow function.
    pub body: Node<'t>,
    pub exported: bool,
    pub line: u32,
}

impl<'t> FunctionNode<'t> {
    /// Top-level statements of the body. An expression body is returned as-is.
    pub fn statements(&self) -> Vec<Node<'t>> {
        if self.body.kind() == "statement_block" {
            named_children(self.body)
        } else {
            vec![self.body]
        }
    }
}

fn is_function_value(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// Build a [`FunctionNode`] from any node with `parameters`/`parameter` and `body` fields.
pub fn function_from(name: String, node: Node<'_>, exported: bool) -> Option<FunctionNode<'_>> {
    let body = node.child_by_field_name("body")?;
    let params = if let Some(list) = node.child_by_field_name("parameters") {
        named_children(list)
    } else if let Some(single) = node.child_by_field_name("parameter") {
        vec![single]
    } else {
        vec![]
    };
    Some(FunctionNode {
        name,
        params,
        body,
        exported,
        line: line_of(node),
    })
}

fn collect_declarators<'t>(decl: Node<'t>, source: &str, exported: bool, out: &mut Vec<FunctionNode<'t>>) {
    for declarator in named_children(decl) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let (Some(name), Some(value)) = (
            declarator.child_by_field_name("name"),
            declarator.child_by_field_name("value"),
        ) else {
            continue;
        };
        let value = unwrap_expr(value);
        if name.kind() == "identifier" && is_function_value(value.kind()) {
            if let Some(f) = function_from(node_text(name, source).to_string(), value, exported) {
                out.push(f);
            }
        }
    }
}

fn collect_class_methods<'t>(class: Node<'t>, source: &str, exported: bool, out: &mut Vec<FunctionNode<'t>>) {
    let Some(body) = class.child_by_field_name("body") else {
        return;
    };
    for member in named_children(body) {
        if member.kind() != "method_definition" {
            continue;
        }
        if let Some(name) = member.child_by_field_name("name") {
            if let Some(f) = function_from(node_text(name, source).to_string(), member, exported) {
                out.push(f);
            }
        }
    }
}

fn collect_declaration<'t>(node: Node<'t>, source: &str, exported: bool, out: &mut Vec<FunctionNode<'t>>) {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                if let Some(f) = function_from(node_text(name, source).to_string(), node, exported) {
                    out.push(f);
                }
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            collect_declarators(node, source, exported, out)
        }
        "class_declaration" | "abstract_class_declaration" => {
            collect_class_methods(node, source, exported, out)
        }
        _ => {}
    }
}

/// Collect file-level functions, arrow/function consts, and class methods.
///
/// `exported` reflects `export` modifiers, `export default`, and names listed
/// in `export { … }` clauses.
pub fn collect_functions<'t>(root: Node<'t>, source: &str) -> Vec<FunctionNode<'t>> {
    let mut out = Vec::new();
    let mut export_names = HashSet::new();

    for stmt in named_children(root) {
        if stmt.kind() != "export_statement" {
            collect_declaration(stmt, source, false, &mut out);
            continue;
        }
        if let Some(decl) = stmt.child_by_field_name("declaration") {
            collect_declaration(decl, source, true, &mut out);
        } else if let Some(value) = stmt.child_by_field_name("value") {
            let value = unwrap_expr(value);
            if is_function_value(value.kind()) {
                let name = value
                    .child_by_field_name("name")
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_else(|| "default".to_string());
                if let Some(f) = function_from(name, value, true) {
                    out.push(f);
                }
            } else if value.kind() == "identifier" {
                export_names.insert(node_text(value, source).to_string());
            }
        }
        for child in named_children(stmt) {
            if child.kind() != "export_clause" {
                continue;
            }
            for spec in named_children(child) {
                if let Some(name) = spec.child_by_field_name("name") {
                    export_names.insert(node_text(name, source).to_string());
                }
            }
        }
    }

    for f in &mut out {
        if export_names.contains(&f.name) {
            f.exported = true;
        }
    }
    out
}

/// The pattern of a formal parameter and whether it declares a default.
pub fn param_pattern(param: Node<'_>) -> (Node<'_>, bool) {
    match param.kind() {
        "required_parameter" | "optional_parameter" => {
            let pattern = param.child_by_field_name("pattern").unwrap_or(param);
            let has_default = param.child_by_field_name("value").is_some()
                || param.kind() == "optional_parameter";
            let (inner, inner_default) = param_pattern_inner(pattern);
            (inner, has_default || inner_default)
        }
        _ => param_pattern_inner(param),
    }
}

fn param_pattern_inner(node: Node<'_>) -> (Node<'_>, bool) {
    if node.kind() == "assignment_pattern" {
        if let Some(left) = node.child_by_field_name("left") {
            return (left, true);
        }
    }
    (node, false)
}

/// Identifier name of a simple parameter.
pub fn param_name(param: Node<'_>, source: &str) -> Option<String> {
    let (pattern, _) = param_pattern(param);
    (pattern.kind() == "identifier").then(|| node_text(pattern, source).to_string())
}

/// One binding inside an object destructuring pattern.
#[derive(Debug, Clone)]
pub struct PatternEntry<'t> {
    /// Property name read from the source object.
    pub key: String,
    /// Local identifier the property is bound to, if simple.
    pub local: Option<String>,
    pub has_default: bool,
    /// Nested object pattern (`{ ctx: { id } }`).
    pub nested: Option<Node<'t>>,
    pub is_rest: bool,
    pub line: u32,
}

pub fn object_pattern_entries<'t>(pattern: Node<'t>, source: &str) -> Vec<PatternEntry<'t>> {
    let mut entries = Vec::new();
    for child in named_children(pattern) {
        let line = line_of(child);
        match child.kind() {
            "shorthand_property_identifier_pattern" => {
                let name = node_text(child, source).to_string();
                entries.push(PatternEntry {
                    key: name.clone(),
                    local: Some(name),
                    has_default: false,
                    nested: None,
                    is_rest: false,
                    line,
                });
            }
            "object_assignment_pattern" => {
                if let Some(left) = child.child_by_field_name("left") {
                    let name = node_text(left, source).to_string();
                    entries.push(PatternEntry {
                        key: name.clone(),
                        local: Some(name),
                        has_default: true,
                        nested: None,
                        is_rest: false,
                        line,
                    });
                }
            }
            "pair_pattern" => {
                let (Some(key), Some(value)) = (
                    child.child_by_field_name("key"),
                    child.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let key = property_key(key, source);
                let (value, has_default) = param_pattern_inner(value);
                let (local, nested) = match value.kind() {
                    "identifier" => (Some(node_text(value, source).to_string()), None),
                    "object_pattern" => (None, Some(value)),
                    _ => (None, None),
                };
                entries.push(PatternEntry {
                    key,
                    local,
                    has_default,
                    nested,
                    is_rest: false,
                    line,
                });
            }
            "rest_pattern" => {
                let name = child
                    .named_child(0)
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                entries.push(PatternEntry {
                    key: name.clone(),
                    local: Some(name),
                    has_default: false,
                    nested: None,
                    is_rest: true,
                    line,
                });
            }
            _ => {}
        }
    }
    entries
}

/// Every identifier a parameter binds (destructured names included).
pub fn bound_names(pattern: Node<'_>, source: &str) -> Vec<String> {
    match pattern.kind() {
        "identifier" => vec![node_text(pattern, source).to_string()],
        "object_pattern" => object_pattern_entries(pattern, source)
            .into_iter()
            .flat_map(|e| match (e.local, e.nested) {
                (Some(local), _) => vec![local],
                (None, Some(nested)) => bound_names(nested, source),
                (None, None) => vec![],
            })
            .collect(),
        "array_pattern" => named_children(pattern)
            .into_iter()
            .flat_map(|c| bound_names(param_pattern_inner(c).0, source))
            .collect(),
        "rest_pattern" => pattern
            .named_child(0)
            .map(|n| bound_names(n, source))
            .unwrap_or_default(),
        _ => vec![],
    }
}

/// Name of an object key: identifiers and numbers verbatim, strings unquoted,
/// computed keys as written.
pub fn property_key(key: Node<'_>, source: &str) -> String {
    string_value(key, source).unwrap_or_else(|| node_text(key, source).to_string())
}

/// One entry of an object literal.
#[derive(Debug, Clone)]
pub enum ObjectEntry<'t> {
    Pair { key: String, value: Node<'t>, line: u32 },
    Shorthand { name: String, line: u32 },
    Spread { argument: Node<'t>, line: u32 },
    Method { name: String, line: u32 },
}

impl ObjectEntry<'_> {
    pub fn key(&self) -> Option<&str> {
        match self {
            ObjectEntry::Pair { key, .. } => Some(key),
            ObjectEntry::Shorthand { name, .. } | ObjectEntry::Method { name, .. } => Some(name),
            ObjectEntry::Spread { .. } => None,
        }
    }
}

pub fn object_entries<'t>(object: Node<'t>, source: &str) -> Vec<ObjectEntry<'t>> {
    let mut entries = Vec::new();
    for child in named_children(object) {
        let line = line_of(child);
        match child.kind() {
            "pair" => {
                if let (Some(key), Some(value)) = (
                    child.child_by_field_name("key"),
                    child.child_by_field_name("value"),
                ) {
                    entries.push(ObjectEntry::Pair {
                        key: property_key(key, source),
                        value,
                        line,
                    });
                }
            }
            "shorthand_property_identifier" => entries.push(ObjectEntry::Shorthand {
                name: node_text(child, source).to_string(),
                line,
            }),
            "spread_element" => {
                if let Some(argument) = child.named_child(0) {
                    entries.push(ObjectEntry::Spread { argument, line });
                }
            }
            "method_definition" => {
                if let Some(name) = child.child_by_field_name("name") {
                    entries.push(ObjectEntry::Method {
                        name: node_text(name, source).to_string(),
                        line,
                    });
                }
            }
            _ => {}
        }
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// Reached through `?.`.
    pub optional: bool,
}

/// `root.a?.b.c` decomposed into its root identifier and segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberChain {
    pub root: String,
    pub segments: Vec<Segment>,
}

impl MemberChain {
    pub fn names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }
}

/// Decompose a `member_expression` rooted at an identifier (or `this`).
/// Returns `None` for chains through calls or subscripts.
pub fn member_chain(node: Node<'_>, source: &str) -> Option<MemberChain> {
    match node.kind() {
        "identifier" | "this" => Some(MemberChain {
            root: node_text(node, source).to_string(),
            segments: vec![],
        }),
        "parenthesized_expression" | "non_null_expression" => {
            member_chain(node.named_child(0)?, source)
        }
        "member_expression" => {
            let object = node.child_by_field_name("object")?;
            let property = node.child_by_field_name("property")?;
            if !matches!(
                property.kind(),
                "property_identifier" | "private_property_identifier"
            ) {
                return None;
            }
            let mut chain = member_chain(object, source)?;
            let between = source.get(object.end_byte()..property.start_byte()).unwrap_or("");
            chain.segments.push(Segment {
                name: node_text(property, source).to_string(),
                optional: between.contains('?'),
            });
            Some(chain)
        }
        _ => None,
    }
}

/// Callee of a call expression as `(receiver, name)`.
pub fn callee<'a>(call: Node<'_>, source: &'a str) -> Option<(Option<&'a str>, &'a str)> {
    let function = unwrap_expr(call.child_by_field_name("function")?);
    match function.kind() {
        "identifier" => Some((None, node_text(function, source))),
        "member_expression" => {
            let object = function.child_by_field_name("object")?;
            let property = function.child_by_field_name("property")?;
            Some((Some(node_text(object, source)), node_text(property, source)))
        }
        _ => None,
    }
}

pub fn call_arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// Find a `const name = <value>` declarator among the descendants of `scope`.
pub fn find_local_value<'t>(scope: Node<'t>, name: &str, source: &str) -> Option<Node<'t>> {
    let mut found = None;
    for_each_descendant(scope, |n| {
        if found.is_some() {
            return false;
        }
        if n.kind() == "variable_declarator" {
            if let (Some(decl_name), Some(value)) =
                (n.child_by_field_name("name"), n.child_by_field_name("value"))
            {
                if decl_name.kind() == "identifier" && node_text(decl_name, source) == name {
                    found = Some(value);
                    return false;
                }
            }
        }
        true
    });
    found
}
