use std::path::{Path, PathBuf};

use flowcheck_core::config::{FlowConfig, RoleConfig};
use flowcheck_core::error::DiscoveryError;
use flowcheck_core::types::Role;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;

use crate::treesitter::is_supported_source;

pub const IGNORE_FILENAME: &str = ".flowcheckignore";

/// A discovered source file and the role it plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Forward-slash path relative to the scanned root, used in findings.
    pub display_path: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    pub producers: Vec<SourceFile>,
    pub consumers: Vec<SourceFile>,
    pub broker: Option<SourceFile>,
}

impl Discovery {
    /// Every discovered file: broker first, then producers, then consumers.
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.broker
            .iter()
            .chain(self.producers.iter())
            .chain(self.consumers.iter())
    }

    pub fn len(&self) -> usize {
        self.producers.len() + self.consumers.len() + usize::from(self.broker.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assigns module-relative paths to roles. Broker patterns win over consumer
/// patterns, which win over producer patterns.
pub struct RoleMatcher {
    producer: GlobSet,
    consumer: GlobSet,
    broker: GlobSet,
    ignored: GlobSet,
}

impl RoleMatcher {
    pub fn new(roles: &RoleConfig, ignore_patterns: &[String]) -> Result<Self, DiscoveryError> {
        Ok(Self {
            producer: build_set(&roles.producer_globs)?,
            consumer: build_set(&roles.consumer_globs)?,
            broker: build_set(&roles.broker_globs)?,
            ignored: build_set(ignore_patterns)?,
        })
    }

    pub fn role_of(&self, relative: &Path) -> Option<Role> {
        if self.ignored.is_match(relative) {
            None
        } else if self.broker.is_match(relative) {
            Some(Role::Broker)
        } else if self.consumer.is_match(relative) {
            Some(Role::Consumer)
        } else if self.producer.is_match(relative) {
            Some(Role::Producer)
        } else {
            None
        }
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DiscoveryError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

fn display_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Supported source files under `root`, honoring `.gitignore` and
/// `.flowcheckignore`, sorted by path.
fn walk_sources(root: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILENAME)
        .build();

    let mut paths = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable walk entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.into_path();
        if is_supported_source(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    paths
}

fn check_root(root: &Path) -> Result<(), DiscoveryError> {
    if !root.exists() {
        return Err(DiscoveryError::Missing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|e| DiscoveryError::Unreadable {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Scan a module for producer, consumer, and broker files.
///
/// The broker is resolved in order: `broker.path` from config, the first
/// broker-pattern match inside the module, then the first match under
/// `project_root`.
pub fn discover(module_root: &Path, config: &FlowConfig) -> Result<Discovery, DiscoveryError> {
    check_root(module_root)?;
    let matcher = RoleMatcher::new(&config.roles, &config.ignore_patterns)?;

    let explicit_broker = config
        .broker
        .path
        .as_ref()
        .map(|p| if p.is_absolute() { p.clone() } else { module_root.join(p) });

    let mut discovery = Discovery::default();
    let mut broker_candidates = Vec::new();

    for path in walk_sources(module_root) {
        if explicit_broker.as_deref() == Some(path.as_path()) {
            continue;
        }
        let display = display_path(module_root, &path);
        let Some(role) = matcher.role_of(Path::new(&display)) else {
            continue;
        };
        let file = SourceFile {
            path,
            display_path: display,
            role,
        };
        match role {
            Role::Producer => discovery.producers.push(file),
            Role::Consumer => discovery.consumers.push(file),
            Role::Broker => broker_candidates.push(file),
        }
    }

    discovery.broker = match explicit_broker {
        Some(path) if path.is_file() => Some(SourceFile {
            display_path: display_path(module_root, &path),
            path,
            role: Role::Broker,
        }),
        Some(path) => {
            tracing::warn!(path = %path.display(), "configured broker file not found");
            pick_broker(broker_candidates, module_root)
        }
        None => pick_broker(broker_candidates, module_root),
    };

    if discovery.broker.is_none() {
        if let Some(project_root) = &config.project_root {
            discovery.broker = find_project_broker(project_root, &matcher);
        }
    }

    tracing::debug!(
        module = %module_root.display(),
        producers = discovery.producers.len(),
        consumers = discovery.consumers.len(),
        broker = discovery.broker.as_ref().map(|b| b.display_path.as_str()),
        "discovered module files"
    );
    Ok(discovery)
}

fn pick_broker(mut candidates: Vec<SourceFile>, root: &Path) -> Option<SourceFile> {
    if candidates.len() > 1 {
        tracing::warn!(
            root = %root.display(),
            candidates = candidates.len(),
            chosen = %candidates[0].display_path,
            "multiple broker files matched, using the first"
        );
    }
    if candidates.is_empty() {
        None
    } else {
        Some(candidates.swap_remove(0))
    }
}

fn find_project_broker(project_root: &Path, matcher: &RoleMatcher) -> Option<SourceFile> {
    if !project_root.is_dir() {
        tracing::warn!(path = %project_root.display(), "project root is not a directory");
        return None;
    }
    let candidates = walk_sources(project_root)
        .into_iter()
        .filter_map(|path| {
            let display = display_path(project_root, &path);
            (matcher.role_of(Path::new(&display)) == Some(Role::Broker)).then(|| SourceFile {
                path,
                display_path: display,
                role: Role::Broker,
            })
        })
        .collect();
    pick_broker(candidates, project_root)
}
