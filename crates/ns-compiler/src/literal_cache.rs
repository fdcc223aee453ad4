use std::collections::HashMap;

use ns_parser::{ParamKind, ParamValue};

/// Bounded least-recently-used cache of parsed parameter literals.
///
/// Owned by the binder that uses it; a capacity of zero disables caching.
#[derive(Debug, Clone)]
pub struct LiteralCache {
    capacity: usize,
    entries: HashMap<(ParamKind, String), CacheEntry>,
    clock: u64,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: Result<ParamValue, String>,
    last_used: u64,
}

impl LiteralCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn parse(&mut self, kind: ParamKind, text: &str) -> Result<ParamValue, String> {
        if self.capacity == 0 {
            self.misses += 1;
            return kind.parse_value_text(text);
        }

        self.clock += 1;
        let key = (kind, text.to_string());
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_used = self.clock;
            self.hits += 1;
            return entry.result.clone();
        }

        self.misses += 1;
        let result = kind.parse_value_text(text);
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                last_used: self.clock,
            },
        );
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl Default for LiteralCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod literal_cache_tests {
    use super::*;

    #[test]
    fn repeated_literals_hit_the_cache() {
        let mut cache = LiteralCache::new(4);
        assert_eq!(
            cache.parse(ParamKind::Integer, "42"),
            Ok(ParamValue::Integer(42))
        );
        assert_eq!(
            cache.parse(ParamKind::Integer, "42"),
            Ok(ParamValue::Integer(42))
        );
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!(cache.parse(ParamKind::Integer, "x").is_err());
        assert!(cache.parse(ParamKind::Integer, "x").is_err());
        assert_eq!(cache.hits(), 2);
    }

    #[test]
    fn same_text_is_cached_per_kind() {
        let mut cache = LiteralCache::new(4);
        assert_eq!(
            cache.parse(ParamKind::String, "1"),
            Ok(ParamValue::String("1".to_string()))
        );
        assert_eq!(cache.parse(ParamKind::Boolean, "1"), Ok(ParamValue::Boolean(true)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let mut cache = LiteralCache::new(2);
        cache.parse(ParamKind::Integer, "1").expect("one");
        cache.parse(ParamKind::Integer, "2").expect("two");
        cache.parse(ParamKind::Integer, "1").expect("one again");
        cache.parse(ParamKind::Integer, "3").expect("three");
        assert_eq!(cache.len(), 2);

        let hits = cache.hits();
        cache.parse(ParamKind::Integer, "1").expect("one still cached");
        assert_eq!(cache.hits(), hits + 1);
        cache.parse(ParamKind::Integer, "2").expect("two was evicted");
        assert_eq!(cache.hits(), hits + 1);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = LiteralCache::new(0);
        cache.parse(ParamKind::Decimal, "1.5").expect("decimal");
        cache.parse(ParamKind::Decimal, "1.5").expect("decimal");
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }
}
