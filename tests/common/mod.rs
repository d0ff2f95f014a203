/// Shared test helpers for flowcheck integration tests.
///
/// Import from any integration test file with:
///   `#[path = "common/mod.rs"] mod common;`
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Broker with one exclusionary special case for `drop` and an additive
/// default that stamps a sequence id.
#[allow(dead_code)]
pub const BROKER: &str = r#"
import { nextSequence, resolveZone } from './runtime';

export function preparePayload(eventType, payload) {
  if (eventType === 'drop') {
    return {
      zoneId: resolveZone(payload.target),
      elementId: payload.elementId,
    };
  }
  return { ...payload, sequenceId: nextSequence() };
}
"#;

/// A module directory on disk. Hold the value to keep the directory alive.
pub struct Module {
    dir: TempDir,
}

#[allow(dead_code)]
impl Module {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// A module that already contains [`BROKER`] at `broker.js`.
    pub fn with_broker() -> Self {
        let module = Self::new();
        module.write("broker.js", BROKER);
        module
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    /// `flows/<name>.js` exporting `name(params)` that dispatches `payload`.
    pub fn producer(&self, name: &str, params: &str, event: &str, payload: &str) -> &Self {
        let source = format!(
            "export function {name}({params}) {{\n  dispatch('{event}', {payload});\n}}\n"
        );
        self.write(&format!("flows/{name}.js"), &source)
    }

    /// `handlers/<name>.js` exporting `name(data)` with the given body.
    pub fn handler(&self, name: &str, body: &str) -> &Self {
        let source = format!("export function {name}(data) {{\n{body}\n}}\n");
        self.write(&format!("handlers/{name}.js"), &source)
    }
}
