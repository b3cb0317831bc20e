//! Core domain types, capability traits and configuration for mailbench.

pub mod config;
pub mod error;
pub mod ids;
pub mod mail;
pub mod metrics;
pub mod query;
pub mod traits;

pub use config::{MailbenchConfig, OperationWeights};
pub use error::{CoreError, CoreResult};
pub use ids::{MailId, ThreadId, UserId};
pub use mail::{ListRequest, Mail, MailKind, MailRequest, SearchRequest, Thread, ThreadEntry};
pub use query::{IndexField, IndexKind, IndexSpec, MailField, MailFilter, MailQuery, SortOrder};
pub use traits::{MailOperationGateway, MailStore, SearchStrategy};
