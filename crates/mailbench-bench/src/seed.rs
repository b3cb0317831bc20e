use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use mailbench_core::{CoreResult, MailOperationGateway, MailStore};

use crate::generator::RequestGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub requested: u64,
    pub created: u64,
    pub failed: u64,
    #[serde(with = "crate::stats::duration_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

/// Sends `count` generated mails through the gateway, one at a time.
///
/// Failures are counted and skipped. `on_progress` receives the number of
/// attempts made so far after each one.
pub async fn seed_mailboxes<F>(
    gateway: &dyn MailOperationGateway,
    generator: &mut RequestGenerator,
    count: u64,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> SeedSummary
where
    F: FnMut(u64),
{
    let start = Instant::now();
    let mut created = 0u64;
    let mut failed = 0u64;

    for attempt in 1..=count {
        if cancel.is_cancelled() {
            break;
        }
        let request = generator.create_request(None);
        match gateway.create_mail(&request).await {
            Ok(()) => created += 1,
            Err(e) => {
                debug!(attempt, error = %e, "Failed to seed mail");
                failed += 1;
            }
        }
        on_progress(attempt);
    }

    let summary = SeedSummary {
        requested: count,
        created,
        failed,
        elapsed: start.elapsed(),
    };
    info!(created, failed, backend = gateway.backend(), "Seeding finished");
    summary
}

/// Seeds `sample_size` mails through `gateway` when `store` holds none.
///
/// Returns `None` when the store already has data or `sample_size` is zero.
pub async fn seed_if_empty(
    store: &dyn MailStore,
    gateway: &dyn MailOperationGateway,
    generator: &mut RequestGenerator,
    sample_size: u64,
    cancel: &CancellationToken,
) -> CoreResult<Option<SeedSummary>> {
    if sample_size == 0 {
        return Ok(None);
    }
    let existing = store.count_mails().await?;
    if existing > 0 {
        debug!(existing, "Store already populated");
        return Ok(None);
    }

    info!(sample_size, "Store is empty, seeding sample dataset");
    let summary = seed_mailboxes(gateway, generator, sample_size, cancel, |_| {}).await;
    Ok(Some(summary))
}
