use async_trait::async_trait;

use crate::error::CoreResult;
use crate::ids::{MailId, ThreadId, UserId};
use crate::mail::{ListRequest, Mail, MailRequest, SearchRequest, Thread, ThreadEntry};
use crate::query::{IndexSpec, MailQuery};

/// Document store holding mail copies and per-owner threads.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Inserts a new mail copy. Fails if the identifier is already present.
    async fn insert_mail(&self, mail: Mail) -> CoreResult<()>;

    /// Fetches a mail copy by its identifier.
    async fn get_mail(&self, mail_id: MailId) -> CoreResult<Option<Mail>>;

    /// Appends an entry to the owner's thread, creating the thread on first use.
    async fn upsert_thread_entry(
        &self,
        owner: UserId,
        thread_id: ThreadId,
        entry: ThreadEntry,
    ) -> CoreResult<()>;

    /// Fetches the owner's view of a thread.
    async fn get_thread(&self, owner: UserId, thread_id: ThreadId) -> CoreResult<Option<Thread>>;

    /// Runs a mailbox query.
    async fn find_mails(&self, query: &MailQuery) -> CoreResult<Vec<Mail>>;

    /// Creates the index if missing. Identical re-definitions are no-ops.
    async fn ensure_index(&self, spec: &IndexSpec) -> CoreResult<()>;

    /// Lists index definitions in creation order.
    async fn list_indexes(&self) -> CoreResult<Vec<IndexSpec>>;

    /// Total number of stored mail copies.
    async fn count_mails(&self) -> CoreResult<u64>;
}

/// The three workload operations, served either by a local store or a remote service.
#[async_trait]
pub trait MailOperationGateway: Send + Sync {
    /// Human-readable backend label used in logs.
    fn backend(&self) -> &'static str;

    /// Sends a mail.
    async fn create_mail(&self, request: &MailRequest) -> CoreResult<()>;

    /// Lists a page of one mailbox.
    async fn list_mails(&self, request: &ListRequest) -> CoreResult<Vec<Mail>>;

    /// Searches one mailbox.
    async fn search_mails(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>>;
}

/// One interchangeable formulation of the mailbox search query.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Stable name used in configuration and reports.
    fn name(&self) -> &str;

    /// Short human description.
    fn description(&self) -> &str;

    /// Ensures the indexes the strategy depends on exist. Must be idempotent.
    async fn setup(&self) -> CoreResult<()>;

    /// Executes one search.
    async fn search(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>>;
}
