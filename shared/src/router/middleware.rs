use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::{handler_fn, Delivery, Handler, Middleware};

/// Logs topic, payload, outcome and elapsed time of every handled message.
pub fn logger() -> Middleware {
    Arc::new(|next: Handler| {
        handler_fn(move |delivery: Arc<Delivery>| {
            let next = next.clone();
            async move {
                let start = Instant::now();
                let result = next(delivery.clone()).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let payload = String::from_utf8_lossy(&delivery.payload);

                match &result {
                    Ok(()) => info!(
                        topic = %delivery.topic,
                        key = ?delivery.key,
                        payload = %payload,
                        elapsed_ms,
                        "message handled"
                    ),
                    Err(e) => warn!(
                        topic = %delivery.topic,
                        key = ?delivery.key,
                        payload = %payload,
                        elapsed_ms,
                        error = %e,
                        "message failed"
                    ),
                }

                result
            }
        })
    })
}
