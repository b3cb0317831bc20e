use async_trait::async_trait;
use std::sync::Arc;

use mailbench_core::{
    CoreResult, IndexField, IndexSpec, Mail, MailField, MailFilter, MailQuery, MailStore,
    SearchRequest, SearchStrategy, SortOrder,
};

/// Compound indexes with case-insensitive collation and a prefix-anchored pattern.
pub struct IndexOptimizedStrategy {
    store: Arc<dyn MailStore>,
}

impl IndexOptimizedStrategy {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchStrategy for IndexOptimizedStrategy {
    fn name(&self) -> &str {
        "index_optimized"
    }

    fn description(&self) -> &str {
        "Compound indexes with case-insensitive collation and anchored patterns"
    }

    async fn setup(&self) -> CoreResult<()> {
        self.store
            .ensure_index(&IndexSpec::ascending_case_insensitive(
                "mail_optimized_subject_idx",
                vec![IndexField::UserId, IndexField::Subject],
            ))
            .await?;
        self.store
            .ensure_index(&IndexSpec::ascending_case_insensitive(
                "mail_optimized_content_idx",
                vec![IndexField::UserId, IndexField::Content],
            ))
            .await
    }

    async fn search(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>> {
        let query = MailQuery::mailbox(request.user_id)
            .with_filter(MailFilter::Pattern {
                pattern: format!("(?s)^.*{}", regex::escape(&request.search_term)),
                fields: vec![MailField::Subject, MailField::Content],
                case_insensitive: true,
            })
            .sorted(SortOrder::CreatedAtDesc)
            .limit(request.limit);
        self.store.find_mails(&query).await
    }
}
