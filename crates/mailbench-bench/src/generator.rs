//! Synthetic request generation
//!
//! Produces create/list/search payloads from a fixed pool of user ids and a
//! small subject vocabulary, so search terms always have discoverable matches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use mailbench_core::{CoreError, CoreResult, ListRequest, MailId, MailRequest, SearchRequest, UserId};

/// Subject vocabulary. Search terms are drawn from the same list.
pub const SUBJECTS: [&str; 9] = [
    "Meeting Update",
    "Project Status",
    "Quick Question",
    "Follow Up",
    "Important Notice",
    "Weekly Report",
    "Team Sync",
    "Budget Review",
    "Action Required",
];

/// Body templates; `{}` is replaced by the subject.
pub const CONTENT_TEMPLATES: [&str; 5] = [
    "Hi team, I wanted to follow up on our discussion about {}. Please review and provide feedback.",
    "This is regarding the {} project. We need to discuss the next steps.",
    "Can you please take a look at {}? Your input would be valuable.",
    "Update on {}: We've made significant progress this week.",
    "Reminder about {}. Please complete by end of day.",
];

pub const CC_PROBABILITY: f64 = 0.3;
pub const BCC_PROBABILITY: f64 = 0.1;
pub const MAX_RECIPIENTS: usize = 3;
pub const SEARCH_LIMIT: usize = 50;
const LIST_LIMIT: std::ops::Range<usize> = 20..100;
const LIST_OFFSET: std::ops::Range<usize> = 0..100;

/// Creates `count` fresh user ids.
pub fn generate_user_ids(count: usize) -> Vec<UserId> {
    (0..count).map(|_| UserId::new()).collect()
}

/// Random request factory.
///
/// Each worker owns its own generator obtained through [`fork`](Self::fork),
/// so no RNG state is shared between tasks.
#[derive(Debug, Clone)]
pub struct RequestGenerator {
    users: Arc<[UserId]>,
    seed: Option<u64>,
    rng: StdRng,
}

impl RequestGenerator {
    /// Generator seeded from OS entropy.
    pub fn new(users: Vec<UserId>) -> CoreResult<Self> {
        Self::build(users, None)
    }

    /// Generator with a fixed seed. Forks derive their own seeds from it.
    pub fn with_seed(users: Vec<UserId>, seed: u64) -> CoreResult<Self> {
        Self::build(users, Some(seed))
    }

    fn build(users: Vec<UserId>, seed: Option<u64>) -> CoreResult<Self> {
        if users.is_empty() {
            return Err(CoreError::ValidationError(
                "request generator needs at least one user".to_string(),
            ));
        }
        Ok(Self {
            users: users.into(),
            seed,
            rng: rng_for(seed),
        })
    }

    /// Independent generator over the same user pool. With a seed, stream `n`
    /// is reproducible.
    #[must_use]
    pub fn fork(&self, stream: u64) -> Self {
        let seed = self.seed.map(|seed| seed.wrapping_add(stream));
        Self {
            users: Arc::clone(&self.users),
            seed,
            rng: rng_for(seed),
        }
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    fn random_user(&mut self) -> UserId {
        self.users[self.rng.gen_range(0..self.users.len())]
    }

    fn random_subject(&mut self) -> &'static str {
        SUBJECTS[self.rng.gen_range(0..SUBJECTS.len())]
    }

    /// A user other than `sender`, or `None` when the draw hit the sender.
    fn other_user(&mut self, sender: UserId) -> Option<UserId> {
        let candidate = self.random_user();
        (candidate != sender).then_some(candidate)
    }

    /// Builds a send request. The To list can come out empty when every draw
    /// hits the sender; callers must accept that.
    pub fn create_request(&mut self, reply_to: Option<MailId>) -> MailRequest {
        let from = self.random_user();

        let draws = self.rng.gen_range(1..=MAX_RECIPIENTS);
        let to = (0..draws).filter_map(|_| self.other_user(from)).collect();

        let cc = if self.rng.gen_bool(CC_PROBABILITY) {
            self.other_user(from).into_iter().collect()
        } else {
            Vec::new()
        };

        let bcc = if self.rng.gen_bool(BCC_PROBABILITY) {
            self.other_user(from).into_iter().collect()
        } else {
            Vec::new()
        };

        let subject = self.random_subject();
        let template = CONTENT_TEMPLATES[self.rng.gen_range(0..CONTENT_TEMPLATES.len())];

        MailRequest {
            from,
            to,
            cc,
            bcc,
            subject: subject.to_string(),
            content: template.replacen("{}", subject, 1),
            reply_to,
        }
    }

    pub fn list_request(&mut self) -> ListRequest {
        ListRequest {
            user_id: self.random_user(),
            limit: self.rng.gen_range(LIST_LIMIT),
            offset: self.rng.gen_range(LIST_OFFSET),
        }
    }

    pub fn search_request(&mut self) -> SearchRequest {
        SearchRequest {
            user_id: self.random_user(),
            search_term: self.random_subject().to_string(),
            limit: SEARCH_LIMIT,
        }
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(users: usize) -> RequestGenerator {
        RequestGenerator::with_seed(generate_user_ids(users), 42).unwrap()
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(RequestGenerator::new(Vec::new()).is_err());
    }

    #[test]
    fn test_sender_never_receives_own_mail() {
        // Small pool makes sender collisions frequent.
        let mut gen = generator(2);
        for _ in 0..5_000 {
            let req = gen.create_request(None);
            assert!(!req.to.contains(&req.from));
            assert!(!req.cc.contains(&req.from));
            assert!(!req.bcc.contains(&req.from));
            assert!(req.to.len() <= MAX_RECIPIENTS);
            assert!(req.cc.len() <= 1 && req.bcc.len() <= 1);
        }
    }

    #[test]
    fn test_single_user_pool_yields_empty_recipients() {
        let mut gen = generator(1);
        let req = gen.create_request(None);
        assert!(req.to.is_empty());
        assert!(req.cc.is_empty());
        assert!(req.bcc.is_empty());
    }

    #[test]
    fn test_content_is_templated_from_subject() {
        let mut gen = generator(10);
        for _ in 0..200 {
            let req = gen.create_request(None);
            assert!(SUBJECTS.contains(&req.subject.as_str()));
            assert!(req.content.contains(&req.subject));
            assert!(!req.content.contains("{}"));
        }
    }

    #[test]
    fn test_reply_to_is_carried() {
        let mut gen = generator(10);
        let original = MailId::new();
        assert_eq!(gen.create_request(Some(original)).reply_to, Some(original));
    }

    #[test]
    fn test_cc_rate_near_configured_probability() {
        let mut gen = generator(1_000);
        let draws = 10_000;
        let with_cc = (0..draws)
            .filter(|_| !gen.create_request(None).cc.is_empty())
            .count();
        let ratio = with_cc as f64 / draws as f64;
        assert!((0.25..0.35).contains(&ratio), "cc ratio {ratio}");
    }

    #[test]
    fn test_list_and_search_ranges() {
        let mut gen = generator(10);
        for _ in 0..1_000 {
            let list = gen.list_request();
            assert!((20..100).contains(&list.limit));
            assert!(list.offset < 100);
            assert!(gen.users().contains(&list.user_id));

            let search = gen.search_request();
            assert_eq!(search.limit, SEARCH_LIMIT);
            assert!(SUBJECTS.contains(&search.search_term.as_str()));
        }
    }

    #[test]
    fn test_seeded_forks_are_reproducible() {
        let base = generator(10);
        let mut a = base.fork(3);
        let mut b = base.fork(3);
        let mut c = base.fork(4);

        let seq_a: Vec<_> = (0..20).map(|_| a.search_request()).collect();
        let seq_b: Vec<_> = (0..20).map(|_| b.search_request()).collect();
        let seq_c: Vec<_> = (0..20).map(|_| c.search_request()).collect();

        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a, seq_c);
    }
}
