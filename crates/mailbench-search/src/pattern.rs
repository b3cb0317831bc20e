use async_trait::async_trait;
use std::sync::Arc;

use mailbench_core::{
    CoreResult, IndexField, IndexSpec, Mail, MailField, MailFilter, MailQuery, MailStore,
    SearchRequest, SearchStrategy, SortOrder,
};

/// Case-insensitive pattern scan over subject or content, newest first.
pub struct RegexSearchStrategy {
    store: Arc<dyn MailStore>,
}

impl RegexSearchStrategy {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchStrategy for RegexSearchStrategy {
    fn name(&self) -> &str {
        "regex"
    }

    fn description(&self) -> &str {
        "Case-insensitive pattern match on subject or content - flexible but scans every candidate"
    }

    async fn setup(&self) -> CoreResult<()> {
        self.store
            .ensure_index(&IndexSpec::ascending(
                "mail_subject_idx",
                vec![IndexField::UserId, IndexField::Subject],
            ))
            .await?;
        self.store
            .ensure_index(&IndexSpec::ascending(
                "mail_content_idx",
                vec![IndexField::UserId, IndexField::Content],
            ))
            .await
    }

    async fn search(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>> {
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
