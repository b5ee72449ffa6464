//! # Cache
//!
//! Compiled-script artifacts on disk and their validity checks.

use crate::{
    constants::CACHE_ARTIFACT_EXTENSION,
    core::compiler,
    models::ScriptUnit,
};
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;

/// A problem with a cache artifact. These never abort a run: the loader logs them
/// and falls back to compiling the source.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The artifact or its metadata could not be read or written.
    #[error("cache I/O error at '{path}': {source}")]
    Io {
        /// The artifact path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The artifact exists but holds no bytes.
    #[error("cache artifact is empty")]
    Empty,
    /// The artifact does not start with the expected magic bytes.
    #[error("cache artifact has an unrecognized header")]
    BadHeader,
    /// The artifact was written by an incompatible format version.
    #[error("cache artifact has incompatible format version {0}")]
    IncompatibleVersion(u8),
    /// LZ4 decompression failed; the artifact is truncated or corrupt.
    #[error("failed to decompress cache artifact: {0}. It might be corrupt.")]
    Decompress(String),
    /// The decompressed bytes do not decode to a script unit.
    #[error("failed to decode cache artifact: {0}")]
    Decode(String),
    /// The script unit could not be encoded.
    #[error("failed to encode script unit: {0}")]
    Encode(String),
}

/// The result of looking up a compiled unit in the cache.
#[derive(Debug)]
pub enum CacheLookup {
    /// A valid artifact: its modification time is not older than the source's.
    Hit(ScriptUnit),
    /// An artifact exists but the source was modified after it was written.
    Stale,
    /// No artifact exists for this class name.
    Missing,
    /// An artifact exists but could not be used.
    Failed(CacheError),
}

/// The artifact path for `class_name` inside `cache_dir`.
pub fn artifact_path(cache_dir: &Path, class_name: &str) -> PathBuf {
    cache_dir.join(format!("{}.{}", class_name, CACHE_ARTIFACT_EXTENSION))
}

/// Returns the modification time of `path`.
pub fn modified_time(path: &Path) -> Result<SystemTime, CacheError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Looks up the compiled unit for `class_name`, validating it against the
/// modification time of its source.
pub fn lookup(cache_dir: &Path, class_name: &str, source_modified: SystemTime) -> CacheLookup {
    let path = artifact_path(cache_dir, class_name);
    if !path.exists() {
        debug!("No cache artifact at '{}'", path.display());
        return CacheLookup::Missing;
    }

    let artifact_modified = match modified_time(&path) {
        Ok(t) => t,
        Err(e) => return CacheLookup::Failed(e),
    };
    if artifact_modified < source_modified {
        debug!("Cache artifact '{}' is older than its source", path.display());
        return CacheLookup::Stale;
    }

    match compiler::read_cached_unit(&path) {
        Ok(unit) if unit.class_name == class_name => {
            debug!("Cache hit for class '{}'", class_name);
            CacheLookup::Hit(unit)
        }
        Ok(unit) => CacheLookup::Failed(CacheError::Decode(format!(
            "artifact holds class '{}', expected '{}'",
            unit.class_name, class_name
        ))),
        Err(e) => CacheLookup::Failed(e),
    }
}

/// Writes `unit` into the cache under its class name.
pub fn store(cache_dir: &Path, unit: &ScriptUnit) -> Result<PathBuf, CacheError> {
    let path = artifact_path(cache_dir, &unit.class_name);
    compiler::write_cached_unit(&path, unit)?;
    debug!("Wrote cache artifact '{}'", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, time::Duration};

    fn unit(class_name: &str) -> ScriptUnit {
        compiler::compile_source("def x = 1", "build.gant", class_name).unwrap()
    }

    #[test]
    fn test_lookup_missing_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let source_time = SystemTime::now() - Duration::from_secs(60);

        assert!(matches!(
            lookup(dir.path(), "build_gant", source_time),
            CacheLookup::Missing
        ));

        let path = store(dir.path(), &unit("build_gant")).unwrap();
        assert_eq!(path, dir.path().join("build_gant.gantc"));

        match lookup(dir.path(), "build_gant", source_time) {
            CacheLookup::Hit(u) => assert_eq!(u, unit("build_gant")),
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_reports_stale_when_source_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let path = store(dir.path(), &unit("build_gant")).unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        assert!(matches!(
            lookup(dir.path(), "build_gant", SystemTime::now()),
            CacheLookup::Stale
        ));
    }

    #[test]
    fn test_lookup_reports_corrupt_artifact_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(artifact_path(dir.path(), "build_gant"), b"garbage").unwrap();
        let source_time = SystemTime::now() - Duration::from_secs(60);

        assert!(matches!(
            lookup(dir.path(), "build_gant", source_time),
            CacheLookup::Failed(CacheError::BadHeader)
        ));
    }
}
