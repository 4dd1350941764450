pub mod memory;
pub mod query;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Error as AnyhowError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;
use crate::db::query::{Query, ResultSet};

pub use memory::MemoryRepository;

static NEXT_REPOSITORY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity handed out by a repository when an item is created.
///
/// Ids come from one process-wide counter: they order by creation, are never
/// reused, and no two repositories share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryId(u64);

impl RepositoryId {
    pub(crate) fn next() -> Self {
        RepositoryId(NEXT_REPOSITORY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Dispose {
    /// Releases the store. Calling it again is a no-op.
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
}

/// Identity-keyed storage of one record type.
///
/// All mutation goes through identities. Item references returned by
/// `create_item` / `get_item` stay valid until the item is deleted, and
/// [`Repository::get_id`] maps such a reference back to its identity.
pub trait Repository<T>: Dispose {
    fn can_query(&self) -> bool;
    fn can_persist(&self) -> bool;

    /// UTC time of the last delete or save, `DateTime::<Utc>::MIN_UTC` before any.
    fn last_modified(&self) -> DateTime<Utc>;

    fn create_item(&mut self) -> Result<(RepositoryId, &mut T), RepositoryError>;

    fn delete_item(&mut self, id: RepositoryId) -> Result<(), RepositoryError>;

    fn delete_all_items(&mut self) -> Result<(), RepositoryError>;

    /// A snapshot of the current identities.
    fn get_all_items(&self) -> Result<Vec<RepositoryId>, RepositoryError>;

    fn save_item(&mut self, id: RepositoryId) -> Result<(), RepositoryError>;

    fn save_items(&mut self, ids: &[RepositoryId]) -> Result<(), RepositoryError> {
        for id in ids {
            self.save_item(*id)?;
        }
        Ok(())
    }

    fn get_items_matching<'r>(&'r self, query: &dyn Query<T>) -> Result<ResultSet<'r, T>, RepositoryError>;

    fn count_all_items(&self) -> Result<usize, RepositoryError>;

    fn contains_id(&self, id: RepositoryId) -> Result<bool, RepositoryError>;

    fn get_id(&self, item: &T) -> Result<RepositoryId, RepositoryError>;

    fn get_item(&self, id: RepositoryId) -> Result<&T, RepositoryError>;

    fn get_item_mut(&mut self, id: RepositoryId) -> Result<&mut T, RepositoryError>;
}

/// A repository behind a lock, so it can be handed to a background worker.
///
/// Dropping the handle disposes the repository.
#[derive(Debug)]
pub struct DatabaseHandle<R: Dispose> {
    repository: Mutex<R>,
}

impl<R: Dispose> DatabaseHandle<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository: Mutex::new(repository),
        }
    }

    /// Performs a write operation on the repository, holding the lock for its duration.
    pub fn do_write<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> Result<T, RepositoryError>,
    {
        let mut repository = self.repository.lock();
        operation(&mut repository).map_err(AnyhowError::from)
    }

    /// Performs a read operation on the repository.
    pub fn do_read<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&R) -> Result<T, RepositoryError>,
    {
        let repository = self.repository.lock();
        operation(&repository).map_err(AnyhowError::from)
    }
}

impl<R: Dispose> Drop for DatabaseHandle<R> {
    fn drop(&mut self) {
        self.repository.get_mut().dispose();
    }
}
