//! Run-scoped working directories.
//!
//! Each run owns `<root>/run-<uuid>` exclusively, so concurrent runs never
//! see each other's artifacts. The directory is a [`TempDir`]: it is removed
//! when the handle is dropped unless the run hands it over with
//! [`WorkingDir::keep`].

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

const PAGES_DIR: &str = "pages";

pub struct WorkingDir {
    run_id: Uuid,
    /// Temporary directory (auto-cleaned on drop)
    dir: TempDir,
}

impl WorkingDir {
    /// Create a fresh directory for a new run under `root`.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_id(root, Uuid::new_v4())
    }

    /// Create the directory for a known run id, replacing any stale leftovers.
    pub fn create_with_id(root: impl AsRef<Path>, run_id: Uuid) -> Result<Self> {
        let root = root.as_ref();
        let name = format!("run-{run_id}");
        let stale = root.join(&name);

        if stale.exists() {
            debug!("Removing stale working directory {}", stale.display());
            std::fs::remove_dir_all(&stale).map_err(|e| io_error(&stale, "clear", e))?;
        }

        std::fs::create_dir_all(root).map_err(|e| io_error(root, "create", e))?;

        let dir = tempfile::Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempdir_in(root)
            .map_err(|e| io_error(&stale, "create", e))?;

        let pages = dir.path().join(PAGES_DIR);
        std::fs::create_dir(&pages).map_err(|e| io_error(&pages, "create", e))?;

        debug!("Created working directory {}", dir.path().display());

        Ok(Self { run_id, dir })
    }

    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where split artifacts are written
    pub fn pages_dir(&self) -> PathBuf {
        self.dir.path().join(PAGES_DIR)
    }

    /// Leave the directory on disk and return its path.
    pub fn keep(self) -> PathBuf {
        let path = self.dir.keep();
        debug!("Keeping working directory {}", path.display());
        path
    }
}

impl std::fmt::Debug for WorkingDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingDir")
            .field("run_id", &self.run_id)
            .field("path", &self.dir.path())
            .finish()
    }
}

fn io_error(path: &Path, action: &str, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("Failed to {action} working directory {}: {e}", path.display()),
    ))
}
