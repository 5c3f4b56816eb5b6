use crate::model::RouteKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("route {route} rejected: {reason}: {message}")]
    Rejected {
        route: RouteKey,
        reason: &'static str,
        message: String,
    },

    #[error("route {route} not admitted: {message}")]
    NotAdmitted { route: RouteKey, message: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl PluginError {
    pub fn rejected(route: RouteKey, reason: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            route,
            reason,
            message: message.into(),
        }
    }

    pub fn not_admitted(route: RouteKey, message: impl Into<String>) -> Self {
        Self::NotAdmitted {
            route,
            message: message.into(),
        }
    }
}
