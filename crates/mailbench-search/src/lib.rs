//! Interchangeable mailbox search strategies.

pub mod aggregation;
pub mod optimized;
pub mod pattern;
pub mod registry;
pub mod text;

pub use aggregation::AggregationSearchStrategy;
pub use optimized::IndexOptimizedStrategy;
pub use pattern::RegexSearchStrategy;
pub use registry::{build_strategies, build_strategy};
pub use text::TextSearchStrategy;
