use slotmap::{Key, SlotMap};

/// Generation-checked handle arena. One pool per handle type; a slot is only
/// reused after its generation is bumped, so a stale handle can never alias a
/// newer allocation of the same slot.
///
/// Anything whose payload is visible to the GPU must release that payload
/// through the [`GarbageBin`](crate::garbage::GarbageBin) before calling
/// [`remove`](HandlePool::remove).
pub struct HandlePool<K: Key, V> {
    storage: SlotMap<K, V>,
}

impl<K: Key, V> Default for HandlePool<K, V> {
    fn default() -> Self {
        Self {
            storage: SlotMap::with_key(),
        }
    }
}

impl<K: Key, V> HandlePool<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: SlotMap::with_capacity_and_key(capacity),
        }
    }

    pub fn insert(&mut self, value: V) -> K {
        self.storage.insert(value)
    }

    #[inline]
    pub fn get(&self, key: K) -> &V {
        self.storage
            .get(key)
            .unwrap_or_else(|| panic!("invalid {} handle", std::any::type_name::<K>()))
    }

    #[inline]
    pub fn get_mut(&mut self, key: K) -> &mut V {
        self.storage
            .get_mut(key)
            .unwrap_or_else(|| panic!("invalid {} handle", std::any::type_name::<K>()))
    }

    #[inline]
    pub fn try_get(&self, key: K) -> Option<&V> {
        self.storage.get(key)
    }

    pub fn remove(&mut self, key: K) -> V {
        self.storage
            .remove(key)
            .unwrap_or_else(|| panic!("double free of {} handle", std::any::type_name::<K>()))
    }

    pub fn contains(&self, key: K) -> bool {
        self.storage.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.storage.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.storage.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::new_key_type;

    new_key_type! { struct TestKey; }

    #[test]
    fn insert_and_get_round_trip() {
        let mut pool: HandlePool<TestKey, u32> = HandlePool::default();
        let a = pool.insert(7);
        let b = pool.insert(11);
        assert_eq!(*pool.get(a), 7);
        assert_eq!(*pool.get(b), 11);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn removed_key_is_never_revived() {
        let mut pool: HandlePool<TestKey, u32> = HandlePool::default();
        let a = pool.insert(1);
        assert_eq!(pool.remove(a), 1);

        // Slot may be reused, but the old key stays dead.
        let b = pool.insert(2);
        assert!(pool.try_get(a).is_none());
        assert_eq!(*pool.get(b), 2);
    }

    #[test]
    #[should_panic(expected = "invalid")]
    fn stale_key_panics() {
        let mut pool: HandlePool<TestKey, u32> = HandlePool::default();
        let a = pool.insert(1);
        pool.remove(a);
        pool.get(a);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut pool: HandlePool<TestKey, usize> = HandlePool::with_capacity(2);
        let keys: Vec<_> = (0..64).map(|i| pool.insert(i)).collect();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(*pool.get(*key), i);
        }
    }
}
