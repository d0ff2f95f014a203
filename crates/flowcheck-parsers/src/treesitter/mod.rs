pub mod helpers;

use std::path::Path;

use flowcheck_core::error::ExtractionError;
use tree_sitter::{Language, Node, Parser, Tree};

/// Thin wrapper over a tree-sitter parser for the JavaScript family.
///
/// The resulting tree is only used to locate constructs; nothing downstream
/// assumes it is a verified AST.
pub struct SourceParser {
    parser: Parser,
    timeout_micros: u64,
}

impl SourceParser {
    /// `timeout_ms == 0` disables the parse timeout.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            parser: Parser::new(),
            timeout_micros: timeout_ms.saturating_mul(1000),
        }
    }

    /// Parse `source`, rejecting trees that contain syntax errors.
    pub fn parse(&mut self, path: &str, source: &str) -> Result<Tree, ExtractionError> {
        let lang = language_for_path(Path::new(path))
            .ok_or_else(|| ExtractionError::UnsupportedLanguage(path.to_string()))?;
        self.parser
            .set_language(&lang)
            .map_err(|e| ExtractionError::Language(format!("{e}")))?;
        self.parser.set_timeout_micros(self.timeout_micros);
        let tree = match self.parser.parse(source.as_bytes(), None) {
            Some(tree) => tree,
            None => {
                self.parser.reset();
                return Err(ExtractionError::Timeout(path.to_string()));
            }
        };
        let root = tree.root_node();
        if root.has_error() {
            return Err(ExtractionError::Malformed {
                path: path.to_string(),
                line: first_error_line(root),
            });
        }
        Ok(tree)
    }
}

/// TSX covers plain JavaScript and JSX; `.ts` files need the TypeScript
/// grammar so `<T>expr` casts parse.
pub fn language_for_path(path: &Path) -> Option<Language> {
    match path.extension()?.to_str()? {
        "ts" | "mts" | "cts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "tsx" | "jsx" | "js" | "mjs" | "cjs" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        _ => None,
    }
}

pub fn is_supported_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ts" | "mts" | "cts" | "tsx" | "jsx" | "js" | "mjs" | "cjs")
    )
}

fn first_error_line(root: Node<'_>) -> u32 {
    let mut line = None;
    helpers::for_each_descendant(root, |n| {
        if line.is_some() {
            return false;
        }
        if n.is_error() || n.is_missing() {
            line = Some(helpers::line_of(n));
            return false;
        }
        n.has_error()
    });
    line.unwrap_or(1)
}
