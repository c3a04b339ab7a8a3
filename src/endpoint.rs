//! Outbound message endpoints.
//!
//! Transport adapters implement [`OutboundEndpoint`] to put scenario output
//! on the wire. [`ChannelEndpoint`] hands messages to a bounded Tokio
//! channel instead, so an adapter task (or a test) can drain them.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::message::Message;

/// Errors raised when sending outbound messages.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EndpointError {
    /// The receiving side has gone away.
    #[error("outbound endpoint closed")]
    Closed,
    /// A channel endpoint was configured with zero capacity.
    #[error("invalid endpoint capacity {0}; must be >= 1")]
    InvalidCapacity(usize),
}

/// Destination for messages sent by scenarios.
#[async_trait]
pub trait OutboundEndpoint: Send + Sync + 'static {
    /// Deliver `message`, waiting for capacity if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Closed`] if the endpoint can no longer
    /// deliver messages.
    async fn send(&self, message: Message) -> Result<(), EndpointError>;
}

/// Endpoint backed by a bounded channel.
#[derive(Clone, Debug)]
pub struct ChannelEndpoint {
    tx: mpsc::Sender<Message>,
}

impl ChannelEndpoint {
    /// Create an endpoint and the receiver that drains it.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<Message>), EndpointError> {
        if capacity == 0 {
            return Err(EndpointError::InvalidCapacity(capacity));
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok((Self { tx }, rx))
    }
}

#[async_trait]
impl OutboundEndpoint for ChannelEndpoint {
    async fn send(&self, message: Message) -> Result<(), EndpointError> {
        self.tx.send(message).await.map_err(|_| EndpointError::Closed)
    }
}

/// Endpoint that accepts and drops every message.
///
/// Used when a simulator is started without an outbound transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardEndpoint;

#[async_trait]
impl OutboundEndpoint for DiscardEndpoint {
    async fn send(&self, message: Message) -> Result<(), EndpointError> {
        debug!(bytes = message.payload.len(), "discarding outbound message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            ChannelEndpoint::new(0).map(|_| ()),
            Err(EndpointError::InvalidCapacity(0))
        );
    }

    #[tokio::test]
    async fn closed_receiver_fails_sends() {
        let (endpoint, rx) = ChannelEndpoint::new(1).expect("endpoint");
        drop(rx);
        assert_eq!(
            endpoint.send(Message::new("late")).await,
            Err(EndpointError::Closed)
        );
    }

    #[tokio::test]
    async fn discard_endpoint_accepts_everything() {
        assert!(DiscardEndpoint.send(Message::new("x")).await.is_ok());
    }
}
