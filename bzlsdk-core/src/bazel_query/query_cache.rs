use std::num::NonZeroUsize;

use lru::LruCache;

pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 8;

/// Results of recent `bazel query` invocations keyed by the query expression.
///
/// Nothing is invalidated automatically, whoever changes BUILD files has to
/// flush.
#[derive(Debug)]
pub struct QueryCache {
    entries: LruCache<String, Vec<String>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        QueryCache::new(DEFAULT_QUERY_CACHE_CAPACITY)
    }
}

impl QueryCache {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, query: &str) -> Option<&Vec<String>> {
        self.entries.get(query)
    }

    pub fn put(&mut self, query: &str, lines: Vec<String>) {
        self.entries.put(query.to_string(), lines);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_least_recent_query_is_evicted() {
        let mut cache = QueryCache::new(2);
        cache.put("a", lines(&["//a:a"]));
        cache.put("b", lines(&["//b:b"]));
        assert!(cache.get("a").is_some());
        cache.put("c", lines(&["//c:c"]));

        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(&lines(&["//a:a"])));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_single_slot() {
        let mut cache = QueryCache::new(0);
        cache.put("a", lines(&["//a:a"]));
        cache.put("b", lines(&["//b:b"]));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
