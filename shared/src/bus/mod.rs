//! Message bus client: keyed JSON publish and the consume loop that feeds a
//! [`Router`](crate::router::Router).

pub mod kafka;
pub mod memory;
pub mod mock;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::error::ServiceError;
use crate::router::{Delivery, Router};
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("encode message: {0}")]
    Encode(String),

    #[error("publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("connection: {0}")]
    Connection(String),

    #[error("subscribe: {0}")]
    Subscribe(String),
}

impl From<BusError> for ServiceError {
    fn from(err: BusError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

/// Durable publish to a named topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Publishes `msg` as JSON, keyed by order id.
pub async fn publish_json<T>(
    publisher: &dyn Publisher,
    topic: &str,
    order_id: i64,
    msg: &T,
) -> Result<(), BusError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(msg).map_err(|e| BusError::Encode(e.to_string()))?;
    publisher
        .publish(topic, &order_id.to_string(), payload)
        .await
}

/// Feeds `messages` into `router` in arrival order until the stream ends or
/// `shutdown` fires, and returns how many were dispatched. `ack` gets a
/// message's token once its handlers are launched; nothing is dispatched
/// or acked after shutdown.
pub async fn consume<S, A>(
    router: &Router,
    messages: S,
    mut shutdown: ShutdownSignal,
    mut ack: impl FnMut(A),
) -> usize
where
    S: Stream<Item = (Delivery, A)>,
{
    futures::pin_mut!(messages);
    let mut dispatched = 0;

    loop {
        let (delivery, token) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = messages.next() => match next {
                Some(message) => message,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = router.dispatch(delivery) => {}
        }

        ack(token);
        dispatched += 1;
    }

    dispatched
}
