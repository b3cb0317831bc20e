use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MailId, ThreadId, UserId};

/// Which side of a delivery a stored copy represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailKind {
    /// Copy delivered into a recipient's mailbox.
    Received,
    /// Copy kept in the sender's mailbox.
    Sent,
}

/// A single mail copy as stored in one owner's mailbox.
///
/// Every delivery produces one `Sent` copy for the sender plus one `Received`
/// copy per distinct recipient, all sharing the same thread identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
    pub id: MailId,
    pub from: UserId,
    pub to: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<UserId>,
    pub subject: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MailKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MailId>,
    pub thread_id: ThreadId,
    /// Mailbox owner of this copy.
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Mail {
    /// Builds the owner-specific copy of a delivery.
    #[must_use]
    pub fn copy_for(
        request: &MailRequest,
        owner: UserId,
        kind: MailKind,
        thread_id: ThreadId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MailId::new(),
            from: request.from,
            to: request.to.clone(),
            cc: request.cc.clone(),
            bcc: request.bcc.clone(),
            subject: request.subject.clone(),
            content: request.content.clone(),
            kind,
            reply_to: request.reply_to,
            thread_id,
            user_id: owner,
            created_at,
        }
    }
}

/// Payload for creating (sending) a mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailRequest {
    pub from: UserId,
    pub to: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<UserId>,
    pub subject: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MailId>,
}

impl MailRequest {
    /// All recipients across To, Cc and Bcc, in that order, excluding the sender
    /// and without duplicates.
    #[must_use]
    pub fn delivery_targets(&self) -> Vec<UserId> {
        let mut targets: Vec<UserId> = Vec::new();
        for id in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            if *id != self.from && !targets.contains(id) {
                targets.push(*id);
            }
        }
        targets
    }
}

/// Paged listing of one mailbox, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub user_id: UserId,
    pub limit: usize,
    pub offset: usize,
}

/// Term search within one mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub user_id: UserId,
    pub search_term: String,
    pub limit: usize,
}

/// Per-owner conversation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub mails: Vec<ThreadEntry>,
    pub total_mails: u64,
}

/// Summary of one mail inside a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEntry {
    pub mail_id: MailId,
    pub from: UserId,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Mail> for ThreadEntry {
    fn from(mail: &Mail) -> Self {
        Self {
            mail_id: mail.id,
            from: mail.from,
            subject: mail.subject.clone(),
            created_at: mail.created_at,
        }
    }
}
