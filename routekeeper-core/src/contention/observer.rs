use super::SimpleContentionTracker;
use crate::model::{Route, RouteIngress, RouteUpdate};
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

/// Returns this router's ingress from `new` when it differs from the one in
/// `old`. An ingress that only appears in `new` is not a change.
pub fn ingress_changed<'a>(
    old: &Route,
    new: &'a Route,
    router_name: &str,
) -> Option<&'a RouteIngress> {
    let ingress = new.ingress_for(router_name)?;
    let previous = old.ingress_for(router_name)?;
    if ingress.same_target(previous) {
        None
    } else {
        Some(ingress)
    }
}

impl SimpleContentionTracker {
    /// Feeds observed route updates into the tracker and flushes it every
    /// two expiry intervals until shutdown.
    pub async fn run(
        self: Arc<Self>,
        router_name: String,
        mut updates: broadcast::Receiver<RouteUpdate>,
        mut shutdown: ShutdownSignal,
    ) {
        let period = self
            .params()
            .expires
            .saturating_mul(2)
            .max(std::time::Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut open = true;

        info!(
            event = "contention_observer",
            router = %router_name,
            interval_secs = period.as_secs(),
            "contention observer started"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,

                _ = ticker.tick() => {
                    self.flush();
                }

                update = updates.recv(), if open => match update {
                    Ok(RouteUpdate { old: Some(old), new }) => {
                        if let Some(ingress) = ingress_changed(&old, &new, &router_name) {
                            self.changed(new.uid(), ingress);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "contention observer lagged behind route updates");
                    }
                    Err(RecvError::Closed) => {
                        debug!("route update stream closed");
                        open = false;
                    }
                },
            }
        }

        debug!(router = %router_name, "contention observer stopped");
    }
}
