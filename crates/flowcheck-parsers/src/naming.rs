//! Event identifier normalization.
//!
//! Producers write event ids as string literals, handlers imply them through
//! their names. Both sides are reduced to lowercase kebab case before matching.

/// `dragStart`, `DragStart`, `DRAG_START`, `drag start`, `drag:start` → `drag-start`.
pub fn normalize_event_id(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // Split on `aB` and on the last capital of an acronym (`HTTPRequest`).
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.join("-")
}

/// Event id implied by a handler name, e.g. `handleDragStart` → `drag-start`.
///
/// The prefix must be followed by an uppercase letter or `_` so that names
/// like `online` are not read as `on` + `line`.
pub fn event_from_handler_name(name: &str, prefixes: &[String]) -> Option<String> {
    for prefix in prefixes {
        let Some(rest) = name.strip_prefix(prefix.as_str()) else {
            continue;
        };
        let Some(first) = rest.chars().next() else {
            continue;
        };
        if first.is_uppercase() || first == '_' {
            let id = normalize_event_id(rest);
            if !id.is_empty() {
                return Some(id);
            }
        }
    }
    None
}

/// Lowercase alphanumerics only.
pub fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Whether two raw event texts overlap once squashed (either contains the other).
pub fn textual_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (squash(a), squash(b));
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}
