//! Topic router shared by every service.
//!
//! A [`RouterBuilder`] collects middleware first and routes second; once the
//! first route is added the builder turns into [`Routes`], which has no way
//! to add middleware, so late layering is rejected at compile time:
//!
//! ```compile_fail
//! use shared::router::{handler_fn, middleware, RouterBuilder};
//!
//! let routes = RouterBuilder::new().route("reset", handler_fn(|_| async { Ok(()) }));
//! let routes = routes.layer(middleware::logger());
//! ```
//!
//! The built [`Router`] is immutable. Each topic gets a bounded pool of
//! worker permits; [`Router::dispatch`] launches every handler of the
//! delivery's topic as its own task and returns without waiting for them,
//! and [`Router::drain`] waits for whatever is still running.

pub mod middleware;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::error::ServiceError;

pub const DEFAULT_WORKER_LIMIT: usize = 64;

/// Largest pool a topic can have: `drain` takes every permit in one
/// `acquire_many(u32)` call.
pub fn max_worker_limit() -> usize {
    Semaphore::MAX_PERMITS.min(u32::MAX as usize)
}

/// One inbound message as handed over by the consume loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

impl Delivery {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
            partition: 0,
            offset: 0,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

pub type HandlerResult = Result<(), ServiceError>;
pub type Handler = Arc<dyn Fn(Arc<Delivery>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Turns an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Delivery>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |delivery| f(delivery).boxed())
}

pub struct RouterBuilder {
    middlewares: Vec<Middleware>,
    worker_limit: usize,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
            worker_limit: DEFAULT_WORKER_LIMIT,
        }
    }

    /// Maximum number of handlers running at once per topic, kept within
    /// `1..=max_worker_limit()`.
    pub fn worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = limit.clamp(1, max_worker_limit());
        self
    }

    /// Adds middleware around every handler routed afterwards. The first
    /// layer added is the outermost.
    pub fn layer(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn route(self, topic: &str, handler: Handler) -> Routes {
        Routes {
            middlewares: self.middlewares,
            worker_limit: self.worker_limit,
            routes: Vec::new(),
        }
        .route(topic, handler)
    }
}

/// Builder state once routes exist. Middleware can no longer be added.
pub struct Routes {
    middlewares: Vec<Middleware>,
    worker_limit: usize,
    routes: Vec<(String, Handler)>,
}

impl Routes {
    pub fn route(mut self, topic: &str, handler: Handler) -> Self {
        let wrapped = self
            .middlewares
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware(inner));
        self.routes.push((topic.to_string(), wrapped));
        self
    }

    pub fn build(self) -> Router {
        let mut pools: HashMap<String, TopicPool> = HashMap::new();
        for (topic, handler) in self.routes {
            pools
                .entry(topic)
                .or_insert_with(|| TopicPool {
                    handlers: Vec::new(),
                    permits: Arc::new(Semaphore::new(self.worker_limit)),
                })
                .handlers
                .push(handler);
        }

        Router {
            pools,
            worker_limit: self.worker_limit,
        }
    }
}

struct TopicPool {
    handlers: Vec<Handler>,
    permits: Arc<Semaphore>,
}

pub struct Router {
    pools: HashMap<String, TopicPool>,
    worker_limit: usize,
}

impl Router {
    /// Subscribed topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.pools.get(topic).map_or(0, |pool| pool.handlers.len())
    }

    /// Launches every handler bound to the delivery's topic, in registration
    /// order, and returns how many were launched. Waits only for a free
    /// worker permit, never for a handler to finish. Handler errors are
    /// logged and go no further.
    pub async fn dispatch(&self, delivery: Delivery) -> usize {
        let Some(pool) = self.pools.get(&delivery.topic) else {
            debug!(topic = %delivery.topic, "no handlers for topic");
            return 0;
        };

        let delivery = Arc::new(delivery);
        let mut launched = 0;

        for handler in &pool.handlers {
            let permit = match pool.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(topic = %delivery.topic, offset = delivery.offset, "router drained, delivery dropped");
                    break;
                }
            };

            let handler = handler.clone();
            let delivery = delivery.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handler(delivery.clone()).await {
                    error!(
                        topic = %delivery.topic,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        kind = e.kind(),
                        error = %e,
                        "handle message"
                    );
                }
            });
            launched += 1;
        }

        launched
    }

    pub fn worker_limit(&self) -> usize {
        self.worker_limit
    }

    /// Handlers currently running across all topics.
    pub fn in_flight(&self) -> usize {
        self.pools
            .values()
            .map(|pool| self.worker_limit.saturating_sub(pool.permits.available_permits()))
            .sum()
    }

    /// Waits for in-flight handlers to finish and stops accepting new ones.
    pub async fn drain(&self) {
        for (topic, pool) in &self.pools {
            // Holding every permit means no handler of this topic is running.
            let permits = u32::try_from(self.worker_limit).unwrap_or(u32::MAX);
            let all = pool.permits.acquire_many(permits).await;
            pool.permits.close();
            drop(all);
            debug!(topic = %topic, "topic drained");
        }
    }
}
