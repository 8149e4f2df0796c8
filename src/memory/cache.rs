use parking_lot::Mutex;
use std::collections::HashMap;

type CacheKey = (String, String);

/// Tool results of a single crew run, keyed by tool name and input.
///
/// Shared between the agents of a crew so that a repeated search or scrape is
/// answered without network I/O.
#[derive(Default)]
pub struct ToolCache {
    pages: Mutex<HashMap<CacheKey, String>>,
}

impl ToolCache {
    pub fn new() -> Self {
        ToolCache {
            pages: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, tool: &str, input: &str) -> Option<String> {
        self.pages
            .lock()
            .get(&(tool.to_string(), input.to_string()))
            .cloned()
    }

    pub fn set(&self, tool: &str, input: &str, value: String) {
        self.pages
            .lock()
            .insert((tool.to_string(), input.to_string()), value);
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_on_tool_and_input() {
        let cache = ToolCache::new();
        assert!(cache.is_empty());

        cache.set("search", "rust", "results".to_string());
        assert_eq!(cache.get("search", "rust"), Some("results".to_string()));
        assert_eq!(cache.get("scrape", "rust"), None);
        assert_eq!(cache.get("search", "go"), None);

        cache.set("search", "rust", "newer".to_string());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("search", "rust"), Some("newer".to_string()));
    }
}
