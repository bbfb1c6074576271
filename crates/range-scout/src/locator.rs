//! Locating the picker element.
//!
//! The element is found by tag name only; deployments do not agree on an id.
//! Pages re-render the picker freely, so nothing here caches a result.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use crate::dom::{PageHost, SignalInbox, SignalKind};

/// Finds the current picker element on a host page.
#[derive(Debug)]
pub struct SourceLocator<H> {
    host: Arc<H>,
    tag: String,
    recheck: Duration,
}

impl<H: PageHost> SourceLocator<H> {
    /// `recheck` is the coarse interval at which [`wait_until_present`]
    /// queries again even without a mutation signal.
    ///
    /// [`wait_until_present`]: SourceLocator::wait_until_present
    pub fn new(host: Arc<H>, tag: impl Into<String>, recheck: Duration) -> Self {
        Self {
            host,
            tag: tag.into(),
            recheck,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// One query for the picker tag.
    pub fn find(&self) -> Option<H::Element> {
        self.host.query_tag(&self.tag)
    }

    /// Wait until a picker exists, or `timeout` elapses.
    ///
    /// Re-queries on every subtree-mutation signal and on each recheck tick.
    /// Other signals are deferred back into `inbox` untouched. An unload
    /// signal ends the wait immediately with `None`; a closed channel ends it
    /// with one last query.
    pub async fn wait_until_present(
        &self,
        timeout: Duration,
        inbox: &mut SignalInbox,
    ) -> Option<H::Element> {
        if let Some(element) = self.find() {
            return Some(element);
        }

        let start = time::Instant::now();
        let deadline = start + timeout;
        let mut recheck = time::interval_at(start + self.recheck, self.recheck);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(tag = %self.tag, timeout_ms = timeout.as_millis() as u64, "waiting for picker");

        loop {
            tokio::select! {
                biased;

                _ = time::sleep_until(deadline) => {
                    debug!(tag = %self.tag, "picker wait expired");
                    return None;
                }
                signal = inbox.recv_fresh() => match signal {
                    Some(signal) if signal.kind == SignalKind::SubtreeMutated => {
                        if let Some(element) = self.find() {
                            debug!(tag = %self.tag, "picker appeared after mutation");
                            return Some(element);
                        }
                    }
                    Some(signal) if signal.kind == SignalKind::Unload => {
                        inbox.defer(signal);
                        return None;
                    }
                    Some(signal) => {
                        trace!(subscription = %signal.subscription, "deferring signal during wait");
                        inbox.defer(signal);
                    }
                    None => return self.find(),
                },
                _ = recheck.tick() => {
                    if let Some(element) = self.find() {
                        debug!(tag = %self.tag, "picker found on recheck");
                        return Some(element);
                    }
                }
            }
        }
    }
}
