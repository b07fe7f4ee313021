use std::{future::pending, pin::Pin, time::Duration};
use tokio::time::{sleep, Instant, Sleep};

/// Per-connection inactivity deadline.
///
/// Armed when created and re-armed after every keep-alive reset, not on
/// every read: a client that trickles bytes still has to finish the
/// request within the period.
#[derive(Debug)]
pub(crate) struct TimeoutSupervisor {
    sleep: Pin<Box<Sleep>>,
    period: Duration,
    armed: bool,
}

impl TimeoutSupervisor {
    #[inline]
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            sleep: Box::pin(sleep(period)),
            period,
            armed: true,
        }
    }

    #[inline]
    pub(crate) fn rearm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.period);
        self.armed = true;
    }

    #[inline]
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completes once the deadline passes. Never completes while disarmed.
    pub(crate) async fn expired(&mut self) {
        if !self.armed {
            return pending().await;
        }

        self.sleep.as_mut().await;
        self.armed = false;
    }
}
