use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use mailbench_core::{
    CoreError, CoreResult, IndexField, IndexSpec, Mail, MailField, MailFilter, MailQuery,
    MailStore, SearchRequest, SearchStrategy, SortOrder,
};

/// Relevance bonus for a subject match.
pub const SUBJECT_WEIGHT: u32 = 10;
/// Relevance bonus for a content match.
pub const CONTENT_WEIGHT: u32 = 5;

/// Multi-stage pipeline: match, score by field, sort by score then recency, limit.
pub struct AggregationSearchStrategy {
    store: Arc<dyn MailStore>,
}

impl AggregationSearchStrategy {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }
}

fn relevance(matcher: &Regex, mail: &Mail) -> u32 {
    let mut score = 0;
    if matcher.is_match(&mail.subject) {
        score += SUBJECT_WEIGHT;
    }
    if matcher.is_match(&mail.content) {
        score += CONTENT_WEIGHT;
    }
    score
}

#[async_trait]
impl SearchStrategy for AggregationSearchStrategy {
    fn name(&self) -> &str {
        "aggregation"
    }

    fn description(&self) -> &str {
        "Aggregation pipeline with relevance scoring - subject hits outrank content hits"
    }

    async fn setup(&self) -> CoreResult<()> {
        self.store
            .ensure_index(&IndexSpec::ascending(
                "mail_user_created_idx",
                vec![IndexField::UserId, IndexField::CreatedAt],
            ))
            .await
    }

    async fn search(&self, request: &SearchRequest) -> CoreResult<Vec<Mail>> {
        let pattern = regex::escape(&request.search_term);
        let matcher = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::ValidationError(e.to_string()))?;

        // Stage 1: match, newest first so the stable score sort keeps recency as tie-break.
        let query = MailQuery::mailbox(request.user_id)
            .with_filter(MailFilter::Pattern {
                pattern,
                fields: vec![MailField::Subject, MailField::Content],
                case_insensitive: true,
            })
            .sorted(SortOrder::CreatedAtDesc);
        let matched = self.store.find_mails(&query).await?;

        // Stage 2: score and order.
        let mut scored: Vec<(u32, Mail)> = matched
            .into_iter()
            .map(|mail| (relevance(&matcher, &mail), mail))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(request.limit)
            .map(|(_, mail)| mail)
            .collect())
    }
}
