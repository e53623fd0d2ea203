//! Compute-once file locations
use crate::error::{BuildError, BuildResult};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type Supplier = Box<dyn FnOnce() -> BuildResult<PathBuf> + Send>;

/// A file location that may need producing (usually extracting) first.
///
/// The supplier runs at most once. Concurrent callers block until it has
/// finished and all observe the same outcome, including failure.
pub struct LazyPath {
    name: String,
    cell: OnceLock<Result<PathBuf, Arc<BuildError>>>,
    supplier: Mutex<Option<Supplier>>,
}

impl LazyPath {
    /// A location that already exists
    pub fn ready(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(path.into()));
        Self {
            name: name.into(),
            cell,
            supplier: Mutex::new(None),
        }
    }

    /// A location produced by `supplier` on first use
    pub fn deferred<F>(name: impl Into<String>, supplier: F) -> Self
    where
        F: FnOnce() -> BuildResult<PathBuf> + Send + 'static,
    {
        Self {
            name: name.into(),
            cell: OnceLock::new(),
            supplier: Mutex::new(Some(Box::new(supplier))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Produce the location if needed and return it
    pub fn get(&self) -> BuildResult<PathBuf> {
        let outcome = self.cell.get_or_init(|| {
            let supplier = self
                .supplier
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match supplier {
                Some(supplier) => supplier().map_err(Arc::new),
                None => Err(Arc::new(BuildError::tool(
                    format!("supplier for {}", self.name),
                    "did not complete",
                ))),
            }
        });

        outcome.clone().map_err(|cause| BuildError::ReferenceExtraction {
            name: self.name.clone(),
            cause,
        })
    }

    /// Whether the supplier has already run
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPath")
            .field("name", &self.name)
            .field("value", &self.cell.get())
            .finish()
    }
}
