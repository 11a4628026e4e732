//! Databases by name.
//!
//! The first reference to a name opens (or creates) `<root>/<name>`; later
//! references share the same handle until it is closed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::database::Database;
use crate::error::GigError;
use crate::storage::StoreConfig;

static GLOBAL: OnceLock<DatabaseRegistry> = OnceLock::new();

/// Install the process-wide registry. Returns false if one already exists.
pub fn install_global(base: StoreConfig) -> bool {
    GLOBAL.set(DatabaseRegistry::new(base)).is_ok()
}

/// The process-wide registry, created with default settings on first use.
pub fn global() -> &'static DatabaseRegistry {
    GLOBAL.get_or_init(|| DatabaseRegistry::new(StoreConfig::default()))
}

pub struct DatabaseRegistry {
    /// Tuning shared by every database; `path` is the root directory
    base: StoreConfig,
    open: Mutex<HashMap<String, Arc<Database>>>,
}

impl DatabaseRegistry {
    pub fn new(base: StoreConfig) -> Self {
        Self {
            base,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Get the named database, opening it on first reference.
    pub fn open(&self, name: &str) -> Result<Arc<Database>, GigError> {
        check_name(name)?;
        let mut open = self.lock();
        if let Some(db) = open.get(name) {
            return Ok(Arc::clone(db));
        }

        let config = self.base.at(self.base.path.join(name));
        let db = Arc::new(Database::open(name, config)?);
        open.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Forget the named database. It closes once the last handle drops.
    pub fn close(&self, name: &str) -> bool {
        let closed = self.lock().remove(name).is_some();
        if closed {
            log::info!("Closed database '{name}'");
        }
        closed
    }

    /// Names of open databases, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Database>>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Names become directory names: ASCII letters, digits, `-` and `_` only.
fn check_name(name: &str) -> Result<(), GigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GigError::InvalidArgument(format!(
            "database name {name:?} must be non-empty ASCII letters, digits, '-' or '_'"
        )))
    }
}
