use std::collections::HashMap;

use super::{Store, StoreError};

/// HashMap-backed store for tests and quick starts.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    items: HashMap<String, T>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        MemoryStore {
            items: HashMap::new(),
        }
    }
}

impl<T: Clone + Send> Store<T> for MemoryStore<T> {
    fn put(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        self.items.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<T, StoreError> {
        self.items
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.items.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.items.len())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.items.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_list_count_delete() {
        let mut store: MemoryStore<String> = MemoryStore::new();
        assert_eq!(store.count().unwrap(), 0);

        store.put("a", &"one".to_string()).unwrap();
        store.put("b", &"two".to_string()).unwrap();
        assert_eq!(store.get("a").unwrap(), "one");
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.list().unwrap().len(), 2);

        // Upsert replaces.
        store.put("a", &"uno".to_string()).unwrap();
        assert_eq!(store.get("a").unwrap(), "uno");
        assert_eq!(store.count().unwrap(), 2);

        store.delete("a").unwrap();
        assert!(matches!(store.get("a"), Err(StoreError::NotFound(_))));

        // Deleting an absent key is fine.
        store.delete("a").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
