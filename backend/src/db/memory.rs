use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::db::query::{Query, RecordToken, ResultSet};
use crate::db::{Dispose, Repository, RepositoryId};
use crate::error::RepositoryError;

const NAME: &str = "MemoryRepository";

/// The in-memory reference engine.
///
/// Items are boxed, so their addresses stay put while the maps grow and can
/// serve as the reverse (item to identity) index.
#[derive(Debug)]
pub struct MemoryRepository<T> {
    id_to_item: IndexMap<RepositoryId, Box<Slot<T>>>,
    item_to_id: HashMap<usize, RepositoryId>,
    last_modified: DateTime<Utc>,
    disposed: bool,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        MemoryRepository {
            id_to_item: IndexMap::new(),
            item_to_id: HashMap::new(),
            last_modified: DateTime::<Utc>::MIN_UTC,
            disposed: false,
        }
    }

    fn verify_not_disposed(&self) -> Result<(), RepositoryError> {
        if self.disposed {
            return Err(RepositoryError::Disposed(NAME));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

/// Never zero-sized, so each boxed slot is its own allocation and the item
/// at offset 0 has an address no other live item shares.
#[derive(Debug)]
#[repr(C)]
struct Slot<T> {
    item: T,
    _tag: u8,
}

fn address<T>(item: &T) -> usize {
    item as *const T as usize
}

impl<T> Dispose for MemoryRepository<T> {
    fn dispose(&mut self) {
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<T: Default> Repository<T> for MemoryRepository<T> {
    fn can_query(&self) -> bool {
        true
    }

    fn can_persist(&self) -> bool {
        false
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn create_item(&mut self) -> Result<(RepositoryId, &mut T), RepositoryError> {
        self.verify_not_disposed()?;
        let id = RepositoryId::next();
        let slot = Box::new(Slot { item: T::default(), _tag: 0 });
        self.item_to_id.insert(address(&slot.item), id);
        let slot = self.id_to_item.entry(id).or_insert(slot);
        Ok((id, &mut slot.item))
    }

    fn delete_item(&mut self, id: RepositoryId) -> Result<(), RepositoryError> {
        self.verify_not_disposed()?;
        let slot = self
            .id_to_item
            .shift_remove(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        self.item_to_id.remove(&address(&slot.item));
        self.touch();
        Ok(())
    }

    fn delete_all_items(&mut self) -> Result<(), RepositoryError> {
        self.verify_not_disposed()?;
        self.id_to_item.clear();
        self.item_to_id.clear();
        self.touch();
        Ok(())
    }

    fn get_all_items(&self) -> Result<Vec<RepositoryId>, RepositoryError> {
        self.verify_not_disposed()?;
        Ok(self.id_to_item.keys().copied().collect())
    }

    fn save_item(&mut self, id: RepositoryId) -> Result<(), RepositoryError> {
        self.verify_not_disposed()?;
        if !self.id_to_item.contains_key(&id) {
            return Err(RepositoryError::NotFound(id));
        }
        self.touch();
        Ok(())
    }

    fn get_items_matching<'r>(&'r self, query: &dyn Query<T>) -> Result<ResultSet<'r, T>, RepositoryError> {
        self.verify_not_disposed()?;
        let mut tokens = Vec::new();
        for (id, slot) in &self.id_to_item {
            for row in query.results(&slot.item) {
                tokens.push(RecordToken::new(self, *id, row));
            }
        }
        Ok(ResultSet::new(tokens))
    }

    fn count_all_items(&self) -> Result<usize, RepositoryError> {
        self.verify_not_disposed()?;
        Ok(self.id_to_item.len())
    }

    fn contains_id(&self, id: RepositoryId) -> Result<bool, RepositoryError> {
        self.verify_not_disposed()?;
        Ok(self.id_to_item.contains_key(&id))
    }

    fn get_id(&self, item: &T) -> Result<RepositoryId, RepositoryError> {
        self.verify_not_disposed()?;
        self.item_to_id
            .get(&address(item))
            .copied()
            .ok_or(RepositoryError::ItemNotFound)
    }

    fn get_item(&self, id: RepositoryId) -> Result<&T, RepositoryError> {
        self.verify_not_disposed()?;
        self.id_to_item
            .get(&id)
            .map(|slot| &slot.item)
            .ok_or(RepositoryError::NotFound(id))
    }

    fn get_item_mut(&mut self, id: RepositoryId) -> Result<&mut T, RepositoryError> {
        self.verify_not_disposed()?;
        self.id_to_item
            .get_mut(&id)
            .map(|slot| &mut slot.item)
            .ok_or(RepositoryError::NotFound(id))
    }
}

impl<T> Drop for MemoryRepository<T> {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !self.disposed && !std::thread::panicking() {
            panic!("dispose() was not called on {} before it was dropped", NAME);
        }
    }
}
