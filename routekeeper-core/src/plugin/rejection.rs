use crate::model::Route;
use tracing::info;

pub const REASON_ROUTE_NOT_ADMITTED: &str = "RouteNotAdmitted";
pub const REASON_SUBDOMAIN_ALREADY_CLAIMED: &str = "SubdomainAlreadyClaimed";
pub const REASON_HOST_ALREADY_CLAIMED: &str = "HostAlreadyClaimed";
pub const REASON_NO_HOST_VALUE: &str = "NoHostValue";

/// Sink for the reason a route was not admitted.
pub trait RejectionRecorder: Send + Sync {
    fn record_route_rejection(&self, route: &Route, reason: &str, message: &str);
}

/// Records rejections in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRejections;

impl RejectionRecorder for LogRejections {
    fn record_route_rejection(&self, route: &Route, reason: &str, message: &str) {
        info!(
            event = "route_rejected",
            route = %route.key(),
            reason,
            message,
            "route rejected"
        );
    }
}
