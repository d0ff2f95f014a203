//! Text-level classification of payload value expressions.
//!
//! These heuristics work on expression text alone, independent of any parse
//! tree or file I/O. They are deliberately incomplete: anything they do not
//! recognize falls through to [`BindingKind::Literal`].

use flowcheck_core::types::BindingKind;

const KEYWORD_LITERALS: &[&str] = &[
    "true", "false", "null", "undefined", "NaN", "Infinity", "this",
];

/// Classify a value expression.
///
/// Precedence: template, conditional, generated (call / `new` / `await`),
/// property access, bare identifier (parameter), literal.
pub fn classify(text: &str) -> BindingKind {
    let t = strip_parens(text.trim());
    if t.is_empty() {
        return BindingKind::Literal;
    }
    if is_template(t) {
        return BindingKind::Template;
    }
    if is_conditional(t) {
        return BindingKind::Conditional;
    }
    if t.starts_with("new ") || t.starts_with("await ") {
        return BindingKind::Generated;
    }
    match postfix_chain(t) {
        Some(Chain { has_call: true, .. }) => BindingKind::Generated,
        Some(Chain { has_access: true, .. }) => BindingKind::PropertyAccess,
        Some(_) if is_identifier(t) && !KEYWORD_LITERALS.contains(&t) => BindingKind::Parameter,
        _ => BindingKind::Literal,
    }
}

pub fn is_identifier(t: &str) -> bool {
    let mut chars = t.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// First identifier of an expression (`a.b` → `a`, `${x}` templates → `x`).
pub fn leading_identifier(text: &str) -> Option<&str> {
    referenced_identifiers(text).into_iter().next()
}

/// Identifiers referenced by an expression, skipping string contents
/// (template substitutions included), property names after `.`, and object
/// keys followed by `:`.
pub fn referenced_identifiers(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    let mut template_depth: Vec<usize> = Vec::new();
    let mut brace_depth = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if q == b'`' && b == b'$' && bytes.get(i + 1) == Some(&b'{') {
                template_depth.push(brace_depth);
                brace_depth += 1;
                quote = None;
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => {
                quote = Some(b);
                i += 1;
            }
            b'{' => {
                brace_depth += 1;
                i += 1;
            }
            b'}' => {
                brace_depth = brace_depth.saturating_sub(1);
                if template_depth.last() == Some(&brace_depth) {
                    template_depth.pop();
                    quote = Some(b'`');
                }
                i += 1;
            }
            _ if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
                {
                    i += 1;
                }
                let after_dot = text[..start].trim_end().ends_with('.')
                    && !text[..start].trim_end().ends_with("...");
                let is_key = brace_depth > 0
                    && text[i..].trim_start().starts_with(':')
                    && !text[i..].trim_start().starts_with("::");
                let ident = &text[start..i];
                if !after_dot && !is_key && !KEYWORD_LITERALS.contains(&ident) && !is_keyword(ident) {
                    out.push(ident);
                }
            }
            _ if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    out
}

fn is_keyword(ident: &str) -> bool {
    matches!(
        ident,
        "new" | "await" | "typeof" | "void" | "delete" | "in" | "instanceof" | "return"
            | "function" | "const" | "let" | "var" | "async"
    )
}

fn strip_parens(mut t: &str) -> &str {
    while t.starts_with('(') && t.ends_with(')') && closing_paren(t) == Some(t.len() - 1) {
        t = t[1..t.len() - 1].trim();
    }
    t
}

/// Index of the `)` matching the `(` at index 0.
fn closing_paren(t: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut found = None;
    scan_top_level(t, |i, c, d| {
        if found.is_some() {
            return;
        }
        depth = d;
        if c == ')' && depth == 0 {
            found = Some(i);
        }
    });
    found
}

/// Walk characters outside string literals, reporting each with the bracket
/// depth *after* it is applied.
fn scan_top_level(t: &str, mut f: impl FnMut(usize, char, i32)) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in t.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        f(i, c, depth);
    }
}

fn is_template(t: &str) -> bool {
    if !(t.starts_with('`') && t.ends_with('`') && t.len() >= 2) {
        return false;
    }
    // A single template literal: the first closing backtick is the last char.
    let mut escaped = false;
    for (i, c) in t.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '`' => return i == t.len() - 1 || template_has_substitutions(t),
            _ => {}
        }
    }
    false
}

fn template_has_substitutions(t: &str) -> bool {
    t.contains("${")
}

/// `a || b`, `a ?? b`, or `cond ? a : b` at the top level.
fn is_conditional(t: &str) -> bool {
    let bytes = t.as_bytes();
    let mut conditional = false;
    let mut ternary_question = false;
    scan_top_level(t, |i, c, depth| {
        if depth != 0 || conditional {
            return;
        }
        let next = bytes.get(i + 1).copied();
        let prev = if i > 0 { bytes.get(i - 1).copied() } else { None };
        match c {
            '|' if next == Some(b'|') => conditional = true,
            '?' if next == Some(b'?') => conditional = true,
            '?' if prev == Some(b'?') => {}
            '?' if next == Some(b'.') => {
                // `?.` is optional chaining unless followed by a digit (`a?.5:1`).
                if bytes.get(i + 2).is_some_and(|b| b.is_ascii_digit()) {
                    ternary_question = true;
                }
            }
            '?' => ternary_question = true,
            ':' if ternary_question => conditional = true,
            _ => {}
        }
    });
    conditional
}

struct Chain {
    has_call: bool,
    has_access: bool,
}

/// Recognize `ident(.ident | ?.ident | [..] | (..))*` with nothing else at
/// the top level.
fn postfix_chain(t: &str) -> Option<Chain> {
    let bytes = t.as_bytes();
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_' || first == b'$') {
        return None;
    }
    let mut chain = Chain {
        has_call: false,
        has_access: false,
    };
    let mut ok = true;
    scan_top_level(t, |i, c, depth| {
        if !ok {
            return;
        }
        match c {
            '(' if depth == 1 => chain.has_call = true,
            '[' if depth == 1 => chain.has_access = true,
            '.' if depth == 0 => chain.has_access = true,
            _ if depth > 0 => {}
            ')' | ']' | '}' => {}
            '?' if bytes.get(i + 1) == Some(&b'.') => {}
            c if c.is_alphanumeric() || c == '_' || c == '$' => {}
            _ => ok = false,
        }
    });
    // Quoted strings are skipped by the scanner, so a bare `"x"` never gets here;
    // a chain must not end inside an unclosed bracket either.
    (ok && !t.ends_with('.')).then_some(chain)
}
