use crate::model::Route;
use async_trait::async_trait;
use thiserror::Error;

/// Outcome classes of a failed status write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
    /// Optimistic-concurrency failure: someone else wrote first.
    #[error("conflict writing status of {0}")]
    Conflict(String),

    #[error("forbidden to write status of {0}")]
    Forbidden(String),

    #[error("route {0} not found")]
    NotFound(String),

    #[error("status write failed: {0}")]
    Other(String),
}

/// Write side of route status.
#[async_trait]
pub trait RouteStatusClient: Send + Sync {
    /// Replaces the status of `route`, guarded by its resource version.
    async fn update_status(&self, route: &Route) -> Result<Route, StatusError>;
}

/// Read side: the locally cached view of routes.
pub trait RouteLister: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Result<Route, StatusError>;
}
