use flowlens_network::ProjectionGateway;
use flowlens_types::config::PropagationConfig;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Result of waiting for a written entity to show up in the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Visible after this many milliseconds.
    Visible(u64),
    TimedOut { waited_ms: u64 },
}

/// Milliseconds since `started`, rounded to the nearest millisecond.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    let micros = started.elapsed().as_micros();
    u64::try_from((micros + 500) / 1000).unwrap_or(u64::MAX)
}

/// Polls the projection list every `interval_ms` until `id` appears or
/// `max_wait_ms` has passed. List failures count as "not yet visible".
pub async fn wait_for_propagation<P>(
    gateway: &P,
    id: &str,
    config: &PropagationConfig,
) -> PollOutcome
where
    P: ProjectionGateway + ?Sized,
{
    let started = Instant::now();
    let max_wait = config.max_wait();
    let mut attempts = 0u32;

    while started.elapsed() < max_wait {
        attempts += 1;
        match gateway.list_persons().await {
            Ok(persons) if persons.iter().any(|p| p.id == id) => {
                let waited = elapsed_ms(started);
                debug!(id, attempts, waited_ms = waited, "entity visible in projection");
                return PollOutcome::Visible(waited);
            }
            Ok(_) => {}
            Err(err) => debug!(id, attempts, "propagation poll failed: {err}"),
        }
        sleep(config.interval()).await;
    }

    PollOutcome::TimedOut {
        waited_ms: elapsed_ms(started),
    }
}
