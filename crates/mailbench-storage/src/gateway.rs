//! Direct data-access gateway
//!
//! Implements the workload operations straight against a [`MailStore`],
//! including delivery fan-out and per-owner thread maintenance.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::trace;

use mailbench_core::{
    CoreError, CoreResult, ListRequest, Mail, MailField, MailFilter, MailKind,
    MailOperationGateway, MailQuery, MailRequest, MailStore, SearchRequest, SortOrder,
    ThreadEntry, ThreadId,
};

/// Gateway backed by a local [`MailStore`].
#[derive(Clone)]
pub struct DirectStoreGateway {
    store: Arc<dyn MailStore>,
}

impl DirectStoreGateway {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }

    async fn resolve_thread(&self, request: &MailRequest) -> CoreResult<ThreadId> {
        match request.reply_to {
            Some(original_id) => {
                let original = self
                    .store
                    .get_mail(original_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("mail", original_id.to_string()))?;
                Ok(original.thread_id)
            }
            None => Ok(ThreadId::new()),
        }
    }

    async fn deliver(&self, mail: Mail) -> CoreResult<()> {
        let owner = mail.user_id;
        let thread_id = mail.thread_id;
        let entry = ThreadEntry::from(&mail);
        self.store.insert_mail(mail).await?;
        self.store.upsert_thread_entry(owner, thread_id, entry).await
    }
}

#[async_trait]
impl MailOperationGateway for DirectStoreGateway {
    fn backend(&self) -> &'static str {
        "direct"
    }

    async fn create_mail(&self, request: &MailRequest) -> CoreResult<()> {
        let thread_id = self.resolve_thread(request).await?;
        let created_at = Utc::now();

        self.deliver(Mail::copy_for(
            request,
            request.from,
            MailKind::Sent,
            thread_id,
            created_at,
        ))
        .await?;

        let targets = request.delivery_targets();
        for recipient in &targets {
            self.deliver(Mail::copy_for(
                request,
                *recipient,
                MailKind::Received,
                thread_id,
                created_at,
            ))
            .await?;
        }

        trace!(thread = %thread_id, recipients = targets.len(), "Mail delivered");
        Ok(())
    }

    async fn list_mails(&self, request: &ListRequest) -> CoreResult<Vec<Mail>> {
        let query = MailQuery::mailbox(request.user_id)
            .sorted(SortOrder::CreatedAtDesc)
            .skip(request.offset)
            .limit(request.limit);
        self.store.find_mails(&query).await
    }

    async fn search_mails(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>> {
        let query = MailQuery::mailbox(request.user_id)
            .with_filter(MailFilter::Pattern {
                pattern: regex::escape(&request.search_term),
                fields: vec![MailField::Subject, MailField::Content],
                case_insensitive: true,
            })
            .sorted(SortOrder::CreatedAtDesc)
            .limit(request.limit);
        self.store.find_mails(&query).await
    }
}
