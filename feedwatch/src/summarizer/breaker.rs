use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure guard around the summarization backend.
///
/// Reaching `threshold` failures opens the breaker for `cooldown`. After the
/// cooldown exactly one caller is admitted for a trial call; a failure re-opens
/// immediately and a success closes it.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether calls are currently refused. Does not claim the trial slot.
    pub async fn is_open(&self) -> bool {
        let state = self.state.lock().await;
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => state.trial_in_flight,
            None => false,
        }
    }

    /// Admit a backend call. Once the cooldown has elapsed only the first caller is
    /// admitted until that trial records its outcome.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.open_until {
            Some(until) if Instant::now() < until => false,
            Some(_) if state.trial_in_flight => false,
            Some(_) => {
                info!("Summary circuit breaker cooldown elapsed, allowing a trial call");
                state.trial_in_flight = true;
                true
            }
            None => true,
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = 0;
        state.open_until = None;
        state.trial_in_flight = false;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        if state.trial_in_flight {
            warn!("Summary trial call failed, circuit breaker open for {:?}", self.cooldown);
            state.trial_in_flight = false;
            state.open_until = Some(Instant::now() + self.cooldown);
        } else if state.consecutive_failures >= self.threshold && state.open_until.is_none() {
            warn!(
                "Summary circuit breaker opened after {} consecutive failures for {:?}",
                state.consecutive_failures, self.cooldown
            );
            state.open_until = Some(Instant::now() + self.cooldown);
        }
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }
}
