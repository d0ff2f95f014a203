use std::path::Path;

use rayon::prelude::*;

use flowcheck_core::config::{FlowConfig, LimitsConfig};
use flowcheck_core::error::ExtractionError;
use flowcheck_core::hash::content_hash;
use flowcheck_core::types::{Contract, Role};

use crate::broker::BrokerExtractor;
use crate::cache::{CacheKey, ExtractionCache};
use crate::consumer::ConsumerExtractor;
use crate::producer::ProducerExtractor;
use crate::walker::SourceFile;

// ---------------------------------------------------------------------------
// ContractExtractor -- one interface for every role
// ---------------------------------------------------------------------------

/// Turns one file's text into zero or more contracts for a single role.
///
/// Extraction is best-effort and total: a file with nothing to extract yields
/// an empty list. Only unreadable or malformed input is an error.
///
/// Implementors must be `Send + Sync` so they can be shared across rayon
/// parallel iterators.
pub trait ContractExtractor: Send + Sync {
    fn role(&self) -> Role;

    /// `path` is the display path recorded on every contract.
    fn extract(&self, path: &str, source: &str) -> Result<Vec<Contract>, ExtractionError>;
}

/// Build the extractor for a role from configuration.
pub fn extractor_for(role: Role, config: &FlowConfig) -> Box<dyn ContractExtractor> {
    match role {
        Role::Producer => Box::new(ProducerExtractor::new(config)),
        Role::Broker => Box::new(BrokerExtractor::new(config)),
        Role::Consumer => Box::new(ConsumerExtractor::new(config)),
    }
}

/// One extractor per role, built once per run.
pub struct ExtractorSet {
    producer: Box<dyn ContractExtractor>,
    broker: Box<dyn ContractExtractor>,
    consumer: Box<dyn ContractExtractor>,
}

impl ExtractorSet {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            producer: extractor_for(Role::Producer, config),
            broker: extractor_for(Role::Broker, config),
            consumer: extractor_for(Role::Consumer, config),
        }
    }

    pub fn get(&self, role: Role) -> &dyn ContractExtractor {
        match role {
            Role::Producer => self.producer.as_ref(),
            Role::Broker => self.broker.as_ref(),
            Role::Consumer => self.consumer.as_ref(),
        }
    }
}

/// Result of extracting a single discovered file.
#[derive(Debug)]
pub struct FileExtraction {
    pub file: SourceFile,
    pub result: Result<Vec<Contract>, ExtractionError>,
    pub cache_hit: bool,
}

/// Read a source file, refusing anything over `max_bytes`.
pub fn read_source(path: &Path, display: &str, max_bytes: u64) -> Result<String, ExtractionError> {
    let io_err = |e: std::io::Error| ExtractionError::Io {
        path: display.to_string(),
        reason: e.to_string(),
    };
    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if max_bytes > 0 && size > max_bytes {
        return Err(ExtractionError::TooLarge {
            path: display.to_string(),
            size,
            limit: max_bytes,
        });
    }
    let bytes = std::fs::read(path).map_err(io_err)?;
    String::from_utf8(bytes).map_err(|_| ExtractionError::NotUtf8(display.to_string()))
}

/// Read, hash, and extract one file, consulting the run-scoped cache.
pub fn extract_file(
    file: &SourceFile,
    extractors: &ExtractorSet,
    cache: &ExtractionCache,
    limits: &LimitsConfig,
) -> FileExtraction {
    let source = match read_source(&file.path, &file.display_path, limits.max_file_bytes) {
        Ok(s) => s,
        Err(e) => {
            return FileExtraction {
                file: file.clone(),
                result: Err(e),
                cache_hit: false,
            }
        }
    };

    let key = CacheKey {
        file_path: file.path.to_string_lossy().to_string(),
        role: file.role,
        content_hash: content_hash(&source),
    };
    if let Some(contracts) = cache.get(&key) {
        tracing::debug!(path = %file.display_path, "extraction cache hit");
        return FileExtraction {
            file: file.clone(),
            result: Ok(contracts),
            cache_hit: true,
        };
    }

    let result = extractors.get(file.role).extract(&file.display_path, &source);
    if let Ok(contracts) = &result {
        tracing::debug!(
            path = %file.display_path,
            role = %file.role,
            contracts = contracts.len(),
            "extracted contracts"
        );
        cache.put(key, contracts.clone());
    }
    FileExtraction {
        file: file.clone(),
        result,
        cache_hit: false,
    }
}

/// Extract every file on the current rayon pool. Output order matches `files`.
pub fn extract_files(
    files: &[SourceFile],
    extractors: &ExtractorSet,
    cache: &ExtractionCache,
    limits: &LimitsConfig,
) -> Vec<FileExtraction> {
    files
        .par_iter()
        .map(|file| extract_file(file, extractors, cache, limits))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn source_file(dir: &Path, rel: &str, role: Role, content: &str) -> SourceFile {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        SourceFile {
            path,
            display_path: rel.to_string(),
            role,
        }
    }

    #[test]
    fn test_extractor_roles() {
        let config = FlowConfig::default();
        for role in [Role::Producer, Role::Broker, Role::Consumer] {
            assert_eq!(extractor_for(role, &config).role(), role);
        }
    }

    #[test]
    fn test_extract_file_uses_cache_on_second_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(
            dir.path(),
            "flows/drag.js",
            Role::Producer,
            "export function startDrag(elementId) { broker.dispatch('drag-start', { elementId }); }",
        );
        let config = FlowConfig::default();
        let extractors = ExtractorSet::new(&config);
        let cache = ExtractionCache::new();

        let first = extract_file(&file, &extractors, &cache, &config.limits);
        assert!(!first.cache_hit);
        assert_eq!(first.result.as_ref().unwrap().len(), 1);

        let second = extract_file(&file, &extractors, &cache, &config.limits);
        assert!(second.cache_hit);
        assert_eq!(second.result.unwrap(), first.result.unwrap());
    }

    #[test]
    fn test_extract_files_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            source_file(dir.path(), "handlers/b.js", Role::Consumer, "export function handleB(d) { d.x; }"),
            source_file(dir.path(), "flows/a.js", Role::Producer, "export function a() { dispatch('b', {}); }"),
            source_file(dir.path(), "flows/bad.js", Role::Producer, "export function ( {"),
        ];
        let config = FlowConfig::default();
        let out = extract_files(&files, &ExtractorSet::new(&config), &ExtractionCache::new(), &config.limits);
        let paths: Vec<&str> = out.iter().map(|e| e.file.display_path.as_str()).collect();
        assert_eq!(paths, vec!["handlers/b.js", "flows/a.js", "flows/bad.js"]);
        assert!(out[0].result.is_ok() && out[1].result.is_ok());
        assert!(matches!(out[2].result, Err(ExtractionError::Malformed { .. })));
    }

    #[test]
    fn test_extract_file_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(dir.path(), "flows/big.js", Role::Producer, &"// x\n".repeat(100));
        let config = FlowConfig::default();
        let mut limits = config.limits.clone();
        limits.max_file_bytes = 10;
        let out = extract_file(&file, &ExtractorSet::new(&config), &ExtractionCache::new(), &limits);
        assert!(matches!(out.result, Err(ExtractionError::TooLarge { .. })));
    }

    #[test]
    fn test_extract_file_not_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows/bin.js");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0xffu8, 0xfe, 0x00]).unwrap();
        let file = SourceFile {
            path,
            display_path: "flows/bin.js".into(),
            role: Role::Producer,
        };
        let config = FlowConfig::default();
        let out = extract_file(&file, &ExtractorSet::new(&config), &ExtractionCache::new(), &config.limits);
        assert!(matches!(out.result, Err(ExtractionError::NotUtf8(_))));
    }
}
