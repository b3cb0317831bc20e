//! Query and index vocabulary understood by [`MailStore`](crate::traits::MailStore).

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Searchable text fields of a mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailField {
    Subject,
    Content,
}

/// Fields an index key may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexField {
    UserId,
    Subject,
    Content,
    CreatedAt,
}

/// Row filter applied within a single mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailFilter {
    /// Every mail owned by the user.
    All,
    /// Any-term match against the text index. Requires a text index.
    FullText { query: String },
    /// Regular expression matched against any of `fields`.
    Pattern {
        pattern: String,
        fields: Vec<MailField>,
        case_insensitive: bool,
    },
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Unsorted,
    /// Newest first.
    CreatedAtDesc,
    /// Highest full-text score first, newest first among equals.
    TextScoreDesc,
}

/// A mailbox query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    pub user_id: UserId,
    pub filter: MailFilter,
    pub sort: SortOrder,
    pub skip: usize,
    /// `None` returns every match after `skip`.
    pub limit: Option<usize>,
}

impl MailQuery {
    /// Query for every mail in a mailbox, unsorted and unbounded.
    #[must_use]
    pub fn mailbox(user_id: UserId) -> Self {
        Self {
            user_id,
            filter: MailFilter::All,
            sort: SortOrder::Unsorted,
            skip: 0,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: MailFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Kind of secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexKind {
    /// Ordered compound index over the listed keys.
    Ascending {
        keys: Vec<IndexField>,
        /// Compare strings case-insensitively.
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Tokenized full-text index over the listed fields.
    Text { fields: Vec<MailField> },
}

/// Named index definition. Two specs are identical when name and kind match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    #[must_use]
    pub fn ascending(name: impl Into<String>, keys: Vec<IndexField>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Ascending {
                keys,
                case_insensitive: false,
            },
        }
    }

    /// Ascending index with case-insensitive collation.
    #[must_use]
    pub fn ascending_case_insensitive(name: impl Into<String>, keys: Vec<IndexField>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Ascending {
                keys,
                case_insensitive: true,
            },
        }
    }

    #[must_use]
    pub fn text(name: impl Into<String>, fields: Vec<MailField>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Text { fields },
        }
    }
}
