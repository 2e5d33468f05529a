//! Capability seam between the engine and vendor management APIs.
//!
//! The engine only ever sees this trait and the error classification; vendor
//! adapters (Redfish today) implement it and are selected by configuration.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use common::api::{ActionPayload, ActionRequest, ErrorClass, Target};

pub type DynEndpointClient = Arc<dyn EndpointClient>;

/// Authenticated session handle returned by [`EndpointClient::connect`].
///
/// Threaded explicitly through `perform`/`close`; there is no process-wide
/// session singleton.
#[derive(Debug, Clone)]
pub struct Session {
    pub address: String,
    /// Bearer/session token when the vendor protocol issues one.
    pub token: Option<String>,
    /// Resource to delete on logout, when the vendor protocol tracks sessions.
    pub session_uri: Option<String>,
}

/// One logical action against one endpoint.
#[async_trait]
pub trait EndpointClient: Send + Sync {
    async fn connect(&self, target: &Target) -> Result<Session, EndpointError>;

    async fn perform(
        &self,
        target: &Target,
        session: &Session,
        action: &ActionRequest,
    ) -> Result<ActionPayload, EndpointError>;

    /// Best-effort logout; must never fail the outcome.
    async fn close(&self, session: Session);
}

/// Endpoint failure with retry classification baked in.
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    #[error("authentication rejected by {address}: {message}")]
    Auth { address: String, message: String },
    #[error("transient failure for {address}: {message}")]
    Transient { address: String, message: String },
    #[error("request rejected by {address}: {message}")]
    Terminal { address: String, message: String },
}

impl EndpointError {
    pub fn auth(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn transient(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn terminal(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Terminal {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EndpointError::Auth { .. } => ErrorClass::Auth,
            EndpointError::Transient { .. } => ErrorClass::Transient,
            EndpointError::Terminal { .. } => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}
