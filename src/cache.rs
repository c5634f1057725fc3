use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::trace;

use crate::errors::{GdalWrapError, Result};
use crate::handle::NativeHandle;

/// Maps a native object to the single wrapper that represents it.
///
/// Entries are weak: the cache never keeps a wrapper alive. Wrappers evict
/// their own entry when disposed, including on drop, so a dead entry can only
/// be observed while its wrapper is being torn down.
#[derive(Debug)]
pub struct IdentityCache<T> {
    entries: HashMap<NativeHandle, Weak<T>>,
}

impl<T> Default for IdentityCache<T> {
    fn default() -> Self {
        IdentityCache {
            entries: HashMap::new(),
        }
    }
}

impl<T> IdentityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, handle: NativeHandle) -> Option<Rc<T>> {
        let found = self.entries.get(&handle).and_then(Weak::upgrade);
        if found.is_some() {
            trace!("Cache hit {:?}", handle);
        }
        found
    }

    /// Add an entry for `handle`.
    ///
    /// Fails if a live entry already exists; a dead one is replaced.
    pub fn insert(&mut self, handle: NativeHandle, value: &Rc<T>) -> Result<()> {
        if self.has(handle) {
            return Err(GdalWrapError::DuplicateHandle(handle));
        }
        self.entries.insert(handle, Rc::downgrade(value));
        Ok(())
    }

    /// Remove the entry for `handle`, if any.
    pub fn evict(&mut self, handle: NativeHandle) {
        if self.entries.remove(&handle).is_some() {
            trace!("Evicted {:?}", handle);
        }
    }

    pub fn has(&self, handle: NativeHandle) -> bool {
        self.entries
            .get(&handle)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handles(&self) -> Vec<NativeHandle> {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Every entry whose value is still alive.
    pub fn live(&self) -> Vec<Rc<T>> {
        self.entries.values().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::c_void;

    fn fake(addr: usize) -> NativeHandle {
        NativeHandle::from_ptr(addr as *mut c_void).unwrap()
    }

    #[test]
    fn test_insert_lookup_evict() {
        let mut cache = IdentityCache::new();
        let value = Rc::new("band");
        let h = fake(0x100);

        assert!(cache.lookup(h).is_none());
        cache.insert(h, &value).unwrap();
        assert!(cache.has(h));
        assert!(Rc::ptr_eq(&cache.lookup(h).unwrap(), &value));
        assert_eq!(cache.len(), 1);

        cache.evict(h);
        assert!(!cache.has(h));
        assert!(cache.is_empty());
        // evicting an absent key is a no-op
        cache.evict(h);
        cache.evict(fake(0x200));
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut cache = IdentityCache::new();
        let a = Rc::new(1);
        let b = Rc::new(2);
        let h = fake(0x100);
        cache.insert(h, &a).unwrap();
        assert_eq!(cache.insert(h, &b), Err(GdalWrapError::DuplicateHandle(h)));
        assert_eq!(*cache.lookup(h).unwrap(), 1);
    }

    #[test]
    fn test_dead_entry_is_absent_and_replaceable() {
        let mut cache = IdentityCache::new();
        let h = fake(0x100);
        {
            let gone = Rc::new(1);
            cache.insert(h, &gone).unwrap();
        }
        assert!(!cache.has(h));
        assert!(cache.lookup(h).is_none());
        assert!(cache.live().is_empty());
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert!(cache.handles().is_empty());

        let fresh = Rc::new(2);
        cache.insert(h, &fresh).unwrap();
        assert_eq!(*cache.lookup(h).unwrap(), 2);
        assert_eq!(cache.handles(), vec![h]);
        assert_eq!(cache.len(), 1);
    }
}
