//! On-disk cache locations for index artifacts.
//!
//! The global cache is per-user and holds one artifact directory per
//! dependency, keyed by provenance. The layout is a value passed around
//! explicitly so tests can point it at a temp directory.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use xxhash_rust::xxh3::xxh3_64;

pub const CACHE_ENV_VAR: &str = "PACKAGE_CACHE_DIR";
/// Name of the per-workspace cache directory under the workspace root.
pub const WORKSPACE_CACHE_DIR: &str = ".symdex";

#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Resolves the global cache root: `PACKAGE_CACHE_DIR`, else
    /// `$HOME/.symdex/cache`.
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(CACHE_ENV_VAR) {
            return Self { root: PathBuf::from(dir) };
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            root: Path::new(&home).join(".symdex/cache"),
        }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sdk_dir(&self, version: &str) -> PathBuf {
        self.root.join("sdk").join(version)
    }

    pub fn framework_dir(&self, version: &str, name: &str) -> PathBuf {
        self.root.join("framework").join(version).join(name)
    }

    pub fn hosted_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join("hosted").join(format!("{}-{}", name, version))
    }

    /// `key` is the repo/commit cache key, e.g. `utils-9f2c41d0`.
    pub fn git_dir(&self, key: &str) -> PathBuf {
        self.root.join("git").join(key)
    }

    /// Per-project artifact directory, keyed by a hash of the absolute path.
    pub fn project_dir(&self, project_root: &Path) -> PathBuf {
        let abs = project_root
            .canonicalize()
            .unwrap_or_else(|_| project_root.to_path_buf());
        let hash = xxh3_64(abs.to_string_lossy().as_bytes());
        self.root.join("project").join(format!("{:016x}", hash))
    }
}

pub fn workspace_cache_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(WORKSPACE_CACHE_DIR)
}

pub fn local_package_dir(workspace_cache: &Path, name: &str) -> PathBuf {
    workspace_cache.join("local").join(name)
}

/// Advisory lock over an artifact directory.
///
/// Prevents two processes from racing to rebuild the same artifact. The lock
/// is a `.lock` file created with `create_new`; a lock older than the stale
/// window is treated as abandoned and cleaned up. Released on drop.
pub struct DirLock {
    lock_path: PathBuf,
}

const STALE_AFTER: Duration = Duration::from_secs(600);

impl DirLock {
    pub fn acquire(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let lock_path = dir.join(".lock");

        match Self::try_create(&lock_path) {
            Ok(()) => Ok(Self { lock_path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if Self::is_stale(&lock_path) {
                    let _ = std::fs::remove_file(&lock_path);
                    Self::try_create(&lock_path)?;
                    Ok(Self { lock_path })
                } else {
                    Err(io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("artifact directory is locked: {}", lock_path.display()),
                    ))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn try_create(lock_path: &Path) -> io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)?;
        write!(file, "{}", std::process::id())?;
        Ok(())
    }

    fn is_stale(lock_path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(lock_path) else {
            return true;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map_or(false, |age| age > STALE_AFTER)
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}
