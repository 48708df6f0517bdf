//! Per-execution filter-SQL cache (§4.5).
//!
//! Lives for the duration of a single [`crate::executor::Executor::execute`]
//! call so that a filter extracted once for CTE propagation and rendered
//! again for the outer query shares identical parameter placeholders.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::query::{Condition, Filter};
use crate::sql::Expr;

/// Hit/miss/size counters exposed for debugging (§4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
}

/// Per-execution cache mapping a condition's content key to its built SQL
/// expression. Array-operator conditions and logical (and/or) filters are
/// never cached - see [`FilterSqlCache::get_or_build`].
#[derive(Default)]
pub struct FilterSqlCache {
    entries: RefCell<HashMap<String, Expr>>,
    stats: RefCell<FilterCacheStats>,
}

impl FilterSqlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached SQL for `filter` if present and cacheable;
    /// otherwise invokes `builder`, and caches the result unless `filter`
    /// is one of the two kinds that must never be cached:
    /// - an array-operator condition (`arrayContains`/`arrayOverlaps`/
    ///   `arrayContained`), which needs raw column-type metadata that can
    ///   vary by call site;
    /// - a logical (`and`/`or`) filter, which may mix cube contexts and
    ///   would reference the wrong table if reused verbatim.
    ///
    /// Simple conditions nested inside a logical filter are still cached
    /// independently - callers build logical filters by recursing into
    /// this method per leaf condition, not by caching the whole tree.
    pub fn get_or_build(&self, filter: &Filter, builder: impl FnOnce() -> Expr) -> Expr {
        if !Self::is_cacheable(filter) {
            return builder();
        }
        let key = filter.content_key();
        if let Some(cached) = self.entries.borrow().get(&key) {
            self.stats.borrow_mut().hits += 1;
            return cached.clone();
        }
        let built = builder();
        self.stats.borrow_mut().misses += 1;
        self.entries.borrow_mut().insert(key, built.clone());
        self.stats.borrow_mut().size = self.entries.borrow().len();
        built
    }

    fn is_cacheable(filter: &Filter) -> bool {
        match filter {
            Filter::Condition(c) => !Self::is_array_operator(c),
            Filter::And { .. } | Filter::Or { .. } => false,
        }
    }

    fn is_array_operator(condition: &Condition) -> bool {
        use crate::query::Operator;
        matches!(
            condition.operator,
            Operator::ArrayContains | Operator::ArrayOverlaps | Operator::ArrayContained
        )
    }

    pub fn stats(&self) -> FilterCacheStats {
        *self.stats.borrow()
    }
}
