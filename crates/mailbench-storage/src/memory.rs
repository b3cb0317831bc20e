//! In-memory mail store
//!
//! A document-style store keyed by mail id with an always-on owner index,
//! optional secondary index definitions and an optional inverted text index.
//! Locks are never held across an await point.

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use mailbench_core::{
    CoreError, CoreResult, IndexKind, IndexSpec, Mail, MailField, MailFilter, MailId, MailQuery,
    MailStore, SortOrder, Thread, ThreadEntry, ThreadId, UserId,
};

/// Inverted index over lowercase word tokens.
#[derive(Debug)]
struct TextIndex {
    name: String,
    fields: Vec<MailField>,
    postings: HashMap<String, HashSet<MailId>>,
}

impl TextIndex {
    fn new(name: &str, fields: &[MailField]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.to_vec(),
            postings: HashMap::new(),
        }
    }

    fn add(&mut self, mail: &Mail) {
        for field in &self.fields {
            for token in tokenize(field_value(mail, *field)) {
                self.postings.entry(token).or_default().insert(mail.id);
            }
        }
    }

    /// Number of distinct query terms each matching mail contains.
    fn score(&self, query: &str) -> HashMap<MailId, u32> {
        let terms: HashSet<String> = tokenize(query).collect();
        let mut scores: HashMap<MailId, u32> = HashMap::new();
        for term in &terms {
            if let Some(ids) = self.postings.get(term) {
                for id in ids {
                    *scores.entry(*id).or_insert(0) += 1;
                }
            }
        }
        scores
    }
}

#[derive(Debug, Default)]
struct StoreState {
    mails: HashMap<MailId, Mail>,
    /// Owner index in insertion order.
    by_owner: HashMap<UserId, Vec<MailId>>,
    threads: HashMap<(UserId, ThreadId), Thread>,
    indexes: Vec<IndexSpec>,
    text_index: Option<TextIndex>,
}

/// In-memory [`MailStore`] implementation.
#[derive(Clone, Default)]
pub struct MemoryMailStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryMailStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn field_value(mail: &Mail, field: MailField) -> &str {
    match field {
        MailField::Subject => &mail.subject,
        MailField::Content => &mail.content,
    }
}

fn compile_pattern(pattern: &str, case_insensitive: bool) -> CoreResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| CoreError::ValidationError(format!("invalid pattern `{pattern}`: {e}")))
}

fn newest_first(a: &Mail, b: &Mail) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl MailStore for MemoryMailStore {
    async fn insert_mail(&self, mail: Mail) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.mails.contains_key(&mail.id) {
            return Err(CoreError::already_exists("mail", mail.id.to_string()));
        }
        if let Some(text_index) = state.text_index.as_mut() {
            text_index.add(&mail);
        }
        state.by_owner.entry(mail.user_id).or_default().push(mail.id);
        state.mails.insert(mail.id, mail);
        Ok(())
    }

    async fn get_mail(&self, mail_id: MailId) -> CoreResult<Option<Mail>> {
        Ok(self.state.read().mails.get(&mail_id).cloned())
    }

    async fn upsert_thread_entry(
        &self,
        owner: UserId,
        thread_id: ThreadId,
        entry: ThreadEntry,
    ) -> CoreResult<()> {
        let mut state = self.state.write();
        let thread = state
            .threads
            .entry((owner, thread_id))
            .or_insert_with(|| Thread {
                thread_id,
                user_id: owner,
                mails: Vec::new(),
                total_mails: 0,
            });
        thread.mails.push(entry);
        thread.total_mails += 1;
        Ok(())
    }

    async fn get_thread(&self, owner: UserId, thread_id: ThreadId) -> CoreResult<Option<Thread>> {
        Ok(self.state.read().threads.get(&(owner, thread_id)).cloned())
    }

    async fn find_mails(&self, query: &MailQuery) -> CoreResult<Vec<Mail>> {
        let state = self.state.read();
        let owned: &[MailId] = state
            .by_owner
            .get(&query.user_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut scored: Vec<(u32, &Mail)> = match &query.filter {
            MailFilter::All => owned
                .iter()
                .filter_map(|id| state.mails.get(id))
                .map(|mail| (0, mail))
                .collect(),
            MailFilter::FullText { query: text } => {
                let text_index = state.text_index.as_ref().ok_or_else(|| {
                    CoreError::ValidationError(
                        "full-text query requires a text index".to_string(),
                    )
                })?;
                let scores = text_index.score(text);
                owned
                    .iter()
                    .filter_map(|id| scores.get(id).map(|score| (*score, id)))
                    .filter_map(|(score, id)| state.mails.get(id).map(|mail| (score, mail)))
                    .collect()
            }
            MailFilter::Pattern {
                pattern,
                fields,
                case_insensitive,
            } => {
                let regex = compile_pattern(pattern, *case_insensitive)?;
                owned
                    .iter()
                    .filter_map(|id| state.mails.get(id))
                    .filter(|mail| {
                        fields
                            .iter()
                            .any(|field| regex.is_match(field_value(mail, *field)))
                    })
                    .map(|mail| (0, mail))
                    .collect()
            }
        };

        match query.sort {
            SortOrder::Unsorted => {}
            SortOrder::CreatedAtDesc => scored.sort_by(|a, b| newest_first(a.1, b.1)),
            SortOrder::TextScoreDesc => scored.sort_by(|a, b| {
                Reverse(a.0)
                    .cmp(&Reverse(b.0))
                    .then_with(|| newest_first(a.1, b.1))
            }),
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(scored
            .into_iter()
            .skip(query.skip)
            .take(limit)
            .map(|(_, mail)| mail.clone())
            .collect())
    }

    async fn ensure_index(&self, spec: &IndexSpec) -> CoreResult<()> {
        let mut state = self.state.write();

        if let Some(existing) = state.indexes.iter().find(|idx| idx.name == spec.name) {
            if existing == spec {
                debug!(index = %spec.name, "Index already present");
                return Ok(());
            }
            return Err(CoreError::conflict(format!(
                "index `{}` already exists with a different definition",
                spec.name
            )));
        }

        if let IndexKind::Text { fields } = &spec.kind {
            if let Some(current) = &state.text_index {
                return Err(CoreError::conflict(format!(
                    "only one text index is allowed, `{}` already exists",
                    current.name
                )));
            }
            let mut text_index = TextIndex::new(&spec.name, fields);
            for mail in state.mails.values() {
                text_index.add(mail);
            }
            state.text_index = Some(text_index);
        }

        debug!(index = %spec.name, "Index created");
        state.indexes.push(spec.clone());
        Ok(())
    }

    async fn list_indexes(&self) -> CoreResult<Vec<IndexSpec>> {
        Ok(self.state.read().indexes.clone())
    }

    async fn count_mails(&self) -> CoreResult<u64> {
        Ok(self.state.read().mails.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use mailbench_core::{IndexField, MailKind, MailRequest};

    fn mail_for(owner: UserId, subject: &str, content: &str, age_secs: i64) -> Mail {
        let request = MailRequest {
            from: owner,
            to: vec![UserId::new()],
            cc: vec![],
            bcc: vec![],
            subject: subject.to_string(),
            content: content.to_string(),
            reply_to: None,
        };
        Mail::copy_for(
            &request,
            owner,
            MailKind::Sent,
            ThreadId::new(),
            Utc::now() - ChronoDuration::seconds(age_secs),
        )
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryMailStore::new();
        let mail = mail_for(UserId::new(), "Team Sync", "body", 0);

        store.insert_mail(mail.clone()).await.unwrap();
        let err = store.insert_mail(mail).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_mailbox_newest_first_with_skip_and_limit() {
        let store = MemoryMailStore::new();
        let owner = UserId::new();
        for age in [30, 10, 20, 40] {
            store
                .insert_mail(mail_for(owner, &format!("age {age}"), "x", age))
                .await
                .unwrap();
        }
        store
            .insert_mail(mail_for(UserId::new(), "other", "x", 0))
            .await
            .unwrap();

        let page = store
            .find_mails(
                &MailQuery::mailbox(owner)
                    .sorted(SortOrder::CreatedAtDesc)
                    .skip(1)
                    .limit(2),
            )
            .await
            .unwrap();

        let subjects: Vec<_> = page.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["age 20", "age 30"]);
    }

    #[tokio::test]
    async fn test_full_text_requires_index() {
        let store = MemoryMailStore::new();
        let owner = UserId::new();
        store
            .insert_mail(mail_for(owner, "Budget Review", "numbers", 0))
            .await
            .unwrap();

        let query = MailQuery::mailbox(owner).with_filter(MailFilter::FullText {
            query: "budget".to_string(),
        });
        assert!(store.find_mails(&query).await.is_err());

        store
            .ensure_index(&IndexSpec::text(
                "mail_text_idx",
                vec![MailField::Subject, MailField::Content],
            ))
            .await
            .unwrap();

        let found = store.find_mails(&query).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_full_text_ranks_by_term_hits() {
        let store = MemoryMailStore::new();
        store
            .ensure_index(&IndexSpec::text(
                "mail_text_idx",
                vec![MailField::Subject, MailField::Content],
            ))
            .await
            .unwrap();
        let owner = UserId::new();
        store
            .insert_mail(mail_for(owner, "Weekly Report", "nothing else", 0))
            .await
            .unwrap();
        store
            .insert_mail(mail_for(owner, "Team Sync", "weekly numbers", 5))
            .await
            .unwrap();
        store
            .insert_mail(mail_for(owner, "Follow Up", "no match here", 1))
            .await
            .unwrap();

        let found = store
            .find_mails(
                &MailQuery::mailbox(owner)
                    .with_filter(MailFilter::FullText {
                        query: "Weekly Report".to_string(),
                    })
                    .sorted(SortOrder::TextScoreDesc),
            )
            .await
            .unwrap();

        let subjects: Vec<_> = found.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Weekly Report", "Team Sync"]);
    }

    #[tokio::test]
    async fn test_pattern_case_insensitive_over_fields() {
        let store = MemoryMailStore::new();
        let owner = UserId::new();
        store
            .insert_mail(mail_for(owner, "Quick Question", "about lunch", 0))
            .await
            .unwrap();
        store
            .insert_mail(mail_for(owner, "Hello", "a quick question inside", 1))
            .await
            .unwrap();

        let subject_only = MailQuery::mailbox(owner).with_filter(MailFilter::Pattern {
            pattern: "quick question".to_string(),
            fields: vec![MailField::Subject],
            case_insensitive: true,
        });
        assert_eq!(store.find_mails(&subject_only).await.unwrap().len(), 1);

        let both = MailQuery::mailbox(owner).with_filter(MailFilter::Pattern {
            pattern: "quick question".to_string(),
            fields: vec![MailField::Subject, MailField::Content],
            case_insensitive: true,
        });
        assert_eq!(store.find_mails(&both).await.unwrap().len(), 2);

        let sensitive = MailQuery::mailbox(owner).with_filter(MailFilter::Pattern {
            pattern: "quick question".to_string(),
            fields: vec![MailField::Subject, MailField::Content],
            case_insensitive: false,
        });
        assert_eq!(store.find_mails(&sensitive).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_validation_error() {
        let store = MemoryMailStore::new();
        let query = MailQuery::mailbox(UserId::new()).with_filter(MailFilter::Pattern {
            pattern: "(unclosed".to_string(),
            fields: vec![MailField::Subject],
            case_insensitive: true,
        });
        let err = store.find_mails(&query).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_ensure_index_idempotent_and_conflicting() {
        let store = MemoryMailStore::new();
        let spec = IndexSpec::ascending("user_subject", vec![IndexField::UserId, IndexField::Subject]);

        store.ensure_index(&spec).await.unwrap();
        store.ensure_index(&spec).await.unwrap();
        assert_eq!(store.list_indexes().await.unwrap().len(), 1);

        let other =
            IndexSpec::ascending_case_insensitive("user_subject", vec![IndexField::UserId, IndexField::Subject]);
        let err = store.ensure_index(&other).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_second_text_index_conflicts() {
        let store = MemoryMailStore::new();
        store
            .ensure_index(&IndexSpec::text("a", vec![MailField::Subject]))
            .await
            .unwrap();
        let err = store
            .ensure_index(&IndexSpec::text("b", vec![MailField::Content]))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_thread_upsert_accumulates() {
        let store = MemoryMailStore::new();
        let owner = UserId::new();
        let thread_id = ThreadId::new();
        let mail = mail_for(owner, "Follow Up", "x", 0);

        store
            .upsert_thread_entry(owner, thread_id, ThreadEntry::from(&mail))
            .await
            .unwrap();
        store
            .upsert_thread_entry(owner, thread_id, ThreadEntry::from(&mail))
            .await
            .unwrap();

        let thread = store.get_thread(owner, thread_id).await.unwrap().unwrap();
        assert_eq!(thread.total_mails, 2);
        assert_eq!(thread.mails.len(), 2);
        assert!(store
            .get_thread(UserId::new(), thread_id)
            .await
            .unwrap()
            .is_none());
    }
}
