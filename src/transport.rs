//! The seam between the orchestrator and the network.
//!
//! [`ResilientClient`](crate::ResilientClient) never talks to sockets directly;
//! it hands each attempt's request to a [`Transport`]. The production transport
//! is [`reqwest::Client`]; tests substitute scripted transports.

use crate::error::TransportError;
use async_trait::async_trait;

/// Sends one HTTP request and returns the response head (body unread).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        reqwest::Client::execute(self, request).await.map_err(TransportError::from)
    }
}

#[async_trait]
impl<T> Transport for std::sync::Arc<T>
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        (**self).execute(request).await
    }
}
