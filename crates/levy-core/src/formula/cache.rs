//! Shared cache of compiled formulas.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::ast::{compile, Expr};
use crate::error::FormulaResult;

/// Compiled formulas keyed by their exact text.
///
/// Only ASTs are shared; evaluation always happens against a caller-owned
/// environment. Compile errors are not cached.
#[derive(Debug)]
pub struct FormulaCache {
    entries: RwLock<HashMap<String, Arc<Expr>>>,
    max_depth: usize,
    capacity: usize,
}

impl FormulaCache {
    /// Creates a cache. A `capacity` of 0 compiles on every call.
    pub fn new(max_depth: usize, capacity: usize) -> Self {
        FormulaCache {
            entries: RwLock::new(HashMap::new()),
            max_depth,
            capacity,
        }
    }

    /// Returns the compiled form of `text`, compiling it on first use.
    pub fn compile(&self, text: &str) -> FormulaResult<Arc<Expr>> {
        if let Some(expr) = self.entries.read().get(text) {
            return Ok(Arc::clone(expr));
        }

        let expr = Arc::new(compile(text, self.max_depth)?);
        if self.capacity == 0 {
            return Ok(expr);
        }

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(text) {
            debug!(capacity = self.capacity, "Formula cache full, flushing");
            entries.clear();
        }
        Ok(Arc::clone(
            entries.entry(text.to_string()).or_insert(expr),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormulaError;

    #[test]
    fn test_same_text_shares_ast() {
        let cache = FormulaCache::new(64, 16);
        let first = cache.compile("2/3").unwrap();
        let second = cache.compile("2/3").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = FormulaCache::new(64, 16);
        assert!(matches!(cache.compile("(1"), Err(FormulaError::Syntax { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_flushes_when_full() {
        let cache = FormulaCache::new(64, 2);
        cache.compile("1 + 1").unwrap();
        cache.compile("1 + 2").unwrap();
        cache.compile("1 + 3").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = FormulaCache::new(64, 0);
        cache.compile("1 + 1").unwrap();
        assert!(cache.is_empty());
    }
}
