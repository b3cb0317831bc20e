use std::sync::Arc;
use tracing::debug;

use mailbench_core::{CoreError, CoreResult, MailStore, SearchStrategy};

use crate::aggregation::AggregationSearchStrategy;
use crate::optimized::IndexOptimizedStrategy;
use crate::pattern::RegexSearchStrategy;
use crate::text::TextSearchStrategy;

/// Builds one strategy by its configured name.
pub fn build_strategy(name: &str, store: Arc<dyn MailStore>) -> CoreResult<Arc<dyn SearchStrategy>> {
    let strategy: Arc<dyn SearchStrategy> = match name {
        "text_search" => Arc::new(TextSearchStrategy::new(store)),
        "regex" => Arc::new(RegexSearchStrategy::new(store)),
        "aggregation" => Arc::new(AggregationSearchStrategy::new(store)),
        "index_optimized" => Arc::new(IndexOptimizedStrategy::new(store)),
        other => {
            return Err(CoreError::ValidationError(format!(
                "unknown search strategy `{other}`"
            )))
        }
    };
    debug!(strategy = name, "Search strategy built");
    Ok(strategy)
}

/// Builds strategies in the given order.
pub fn build_strategies<S: AsRef<str>>(
    names: &[S],
    store: Arc<dyn MailStore>,
) -> CoreResult<Vec<Arc<dyn SearchStrategy>>> {
    names
        .iter()
        .map(|name| build_strategy(name.as_ref(), Arc::clone(&store)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbench_core::config::SEARCH_METHODS;
    use mailbench_storage::MemoryMailStore;

    #[test]
    fn test_every_configurable_name_builds() {
        let store: Arc<dyn MailStore> = Arc::new(MemoryMailStore::new());
        let strategies = build_strategies(&SEARCH_METHODS, store).unwrap();
        let names: Vec<_> = strategies.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, SEARCH_METHODS);
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let store: Arc<dyn MailStore> = Arc::new(MemoryMailStore::new());
        assert!(build_strategy("full_scan", store).is_err());
    }
}
