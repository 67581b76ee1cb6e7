/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Bounded set-associative cache.
//!
//! Per-session index files are opened lazily and held in this cache; when a
//! set fills up its oldest entry is evicted and dropped, which unmaps the
//! file. Keys hash into `num_sets` sets (a power of two) of `set_size`
//! entries each.

use ferrofix_core::error::IndexError;

/// Bounded cache of values keyed by `u64`, organised into sets.
#[derive(Debug)]
pub struct SetAssociativeCache<V> {
    sets: Vec<Vec<(u64, V)>>,
    set_size: usize,
    mask: u64,
}

impl<V> SetAssociativeCache<V> {
    /// Creates a cache of `num_sets` sets holding `set_size` entries each.
    ///
    /// # Errors
    /// Returns [`IndexError::InvalidCacheGeometry`] unless `num_sets` is a
    /// power of two and `set_size` is non-zero.
    pub fn new(num_sets: usize, set_size: usize) -> Result<Self, IndexError> {
        if num_sets == 0 || !num_sets.is_power_of_two() || set_size == 0 {
            return Err(IndexError::InvalidCacheGeometry { num_sets, set_size });
        }
        Ok(Self {
            sets: (0..num_sets).map(|_| Vec::with_capacity(set_size)).collect(),
            set_size,
            mask: (num_sets - 1) as u64,
        })
    }

    #[inline]
    fn set_of(&self, key: u64) -> usize {
        // Multiplicative hash to spread contiguous session ids across sets.
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32 & self.mask) as usize
    }

    /// Returns the cached value for `key`, if resident.
    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let set = self.set_of(key);
        self.sets[set]
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Returns the value for `key`, creating it with `create` on a miss.
    ///
    /// When the set is full the oldest entry is evicted (dropped) first.
    ///
    /// # Errors
    /// Propagates the error of `create`; the cache is unchanged on error.
    pub fn get_or_try_insert<E>(
        &mut self,
        key: u64,
        create: impl FnOnce() -> Result<V, E>,
    ) -> Result<&mut V, E> {
        let set_index = self.set_of(key);
        let set = &mut self.sets[set_index];

        if let Some(position) = set.iter().position(|(k, _)| *k == key) {
            return Ok(&mut set[position].1);
        }

        let value = create()?;
        if set.len() == self.set_size {
            set.remove(0);
        }
        set.push((key, value));
        let last = set.len() - 1;
        Ok(&mut set[last].1)
    }

    /// Number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.iter().map(Vec::len).sum()
    }

    /// Returns true if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every resident entry.
    pub fn clear(&mut self) {
        for set in &mut self.sets {
            set.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_validation() {
        assert!(SetAssociativeCache::<u32>::new(3, 4).is_err());
        assert!(SetAssociativeCache::<u32>::new(4, 0).is_err());
        assert!(SetAssociativeCache::<u32>::new(0, 4).is_err());
        assert!(SetAssociativeCache::<u32>::new(4, 4).is_ok());
    }

    #[test]
    fn test_get_or_insert_and_hit() {
        let mut cache = SetAssociativeCache::new(2, 2).unwrap();
        let value = cache
            .get_or_try_insert(7, || Ok::<_, ()>(70))
            .unwrap();
        *value += 1;
        assert_eq!(cache.get_mut(7), Some(&mut 71));
        assert_eq!(cache.len(), 1);

        // A hit must not re-create.
        cache
            .get_or_try_insert(7, || -> Result<u32, ()> { panic!("re-created") })
            .unwrap();
    }

    #[test]
    fn test_eviction_of_oldest_in_set() {
        // Single set: every key collides.
        let mut cache = SetAssociativeCache::new(1, 2).unwrap();
        cache.get_or_try_insert(1, || Ok::<_, ()>(10)).unwrap();
        cache.get_or_try_insert(2, || Ok::<_, ()>(20)).unwrap();
        cache.get_or_try_insert(3, || Ok::<_, ()>(30)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get_mut(1).is_none());
        assert!(cache.get_mut(2).is_some());
        assert!(cache.get_mut(3).is_some());
    }

    #[test]
    fn test_create_error_leaves_cache_unchanged() {
        let mut cache = SetAssociativeCache::<u32>::new(1, 2).unwrap();
        assert!(cache.get_or_try_insert(1, || Err::<u32, &str>("boom")).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut cache = SetAssociativeCache::new(4, 2).unwrap();
        for key in 0..6u64 {
            cache.get_or_try_insert(key, || Ok::<_, ()>(key)).unwrap();
        }
        cache.clear();
        assert!(cache.is_empty());
    }
}
