use async_trait::async_trait;
use std::sync::Arc;

use mailbench_core::{
    CoreResult, IndexSpec, Mail, MailField, MailFilter, MailQuery, MailStore, SearchRequest,
    SearchStrategy, SortOrder,
};

pub const TEXT_INDEX_NAME: &str = "mail_text_idx";

/// Full-text index lookup ranked by term hits.
pub struct TextSearchStrategy {
    store: Arc<dyn MailStore>,
}

impl TextSearchStrategy {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchStrategy for TextSearchStrategy {
    fn name(&self) -> &str {
        "text_search"
    }

    fn description(&self) -> &str {
        "Full-text index over subject and content, ranked by score - best for natural language search"
    }

    async fn setup(&self) -> CoreResult<()> {
        self.store
            .ensure_index(&IndexSpec::text(
                TEXT_INDEX_NAME,
                vec![MailField::Subject, MailField::Content],
            ))
            .await
    }

    async fn search(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>> {
        let query = MailQuery::mailbox(request.user_id)
            .with_filter(MailFilter::FullText {
                query: request.search_term.clone(),
            })
            .sorted(SortOrder::TextScoreDesc)
            .limit(request.limit);
        self.store.find_mails(&query).await
    }
}
