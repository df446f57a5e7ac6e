//! `load` subcommand: push files through a file cache and report its stats.
//!
//! Every file is loaded twice. The first pass reads from disk, the second
//! is served from the cache unless the file was evicted in between.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::{EXIT_CONFIG, EXIT_FAILURE};
use crate::cache::{LandlordCached, LandlordLazy, LandlordNaive, Lru, Manager};
use crate::config::{EnvConfig, ManagerKind};
use crate::file_cache::{FileBuf, FileCache, FileCacheError, FileStats, PathKey};
use crate::memory::VmError;

/// Outcome of a `load` run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub manager: ManagerKind,
    pub files: usize,
    pub loaded: usize,
    pub failed: usize,
    pub stats: FileStats,
}

/// Load `paths` through a file cache built from `config`.
pub fn run_load(config: &EnvConfig, paths: &[PathBuf]) -> Result<LoadReport, FileCacheError> {
    let (loaded, failed, stats) = match config.manager {
        ManagerKind::Naive => load_with::<LandlordNaive<PathKey, FileBuf>>(config, paths)?,
        ManagerKind::Cached => load_with::<LandlordCached<PathKey, FileBuf>>(config, paths)?,
        ManagerKind::Lazy => load_with::<LandlordLazy<PathKey, FileBuf>>(config, paths)?,
        ManagerKind::Lru => load_with::<Lru<PathKey, FileBuf>>(config, paths)?,
    };
    info!(manager = %config.manager, loaded, failed, "Load complete");
    Ok(LoadReport {
        manager: config.manager,
        files: paths.len(),
        loaded,
        failed,
        stats,
    })
}

/// Exit code for a failed [`run_load`]. Only a failed address space
/// reservation points at the configuration (`ZCIO_CACHE_CAPACITY`).
pub fn load_exit_code(error: &FileCacheError) -> i32 {
    match error {
        FileCacheError::Memory(VmError::Reserve { .. }) => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

fn load_with<M>(
    config: &EnvConfig,
    paths: &[PathBuf],
) -> Result<(usize, usize, FileStats), FileCacheError>
where
    M: Manager<PathKey, FileBuf> + Default,
{
    let mut cache: FileCache<M> = FileCache::new(config.file_cache.clone())?;
    let mut loaded = 0;
    let mut failed = 0;
    for pass in 0..2 {
        for path in paths {
            match load_one(&mut cache, path) {
                Ok(()) if pass == 0 => loaded += 1,
                Ok(()) => {}
                Err(e) => {
                    warn!(path = %path.display(), pass, error = %e, "Load failed");
                    if pass == 0 {
                        failed += 1;
                    }
                }
            }
        }
    }
    Ok((loaded, failed, cache.stats()))
}

fn load_one<M: Manager<PathKey, FileBuf>>(
    cache: &mut FileCache<M>,
    path: &Path,
) -> Result<(), FileCacheError> {
    let (key, _) = cache.load(path)?;
    cache.release(&key)
}
