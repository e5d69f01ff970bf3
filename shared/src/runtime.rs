//! Process lifecycle shared by the service binaries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::kafka::{KafkaConfig, KafkaConsumer};
use crate::compensation::StatsHandle;
use crate::error::ServiceError;
use crate::router::Router;
use crate::saga::Service;
use crate::shutdown::{Shutdown, ShutdownSignal};

/// Feeds `service`'s topics into `router` until Ctrl-C, then stops the
/// consume loop and waits up to `drain_timeout` for running handlers.
pub async fn run_until_ctrl_c(
    service: Service,
    kafka: &KafkaConfig,
    router: Router,
    drain_timeout: Duration,
) -> Result<(), ServiceError> {
    let router = Arc::new(router);
    let consumer = KafkaConsumer::subscribe(kafka, service.consumes())?;

    info!(service = service.name(), topics = ?router.topics(), "service started");

    let stop = async {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| ServiceError::Internal(format!("listen for ctrl-c: {e}")))?;
        info!(service = service.name(), "shutting down");
        Ok(())
    };

    serve(
        router.clone(),
        |signal| consumer.run(router, signal),
        stop,
        drain_timeout,
    )
    .await
}

/// Runs the loop built by `consume` until `stop` resolves, then signals it
/// to stop, waits for it, and drains `router` for at most `drain_timeout`.
/// The outcome of `stop` is returned once the router is drained.
pub async fn serve<C, F, S>(
    router: Arc<Router>,
    consume: C,
    stop: S,
    drain_timeout: Duration,
) -> Result<(), ServiceError>
where
    C: FnOnce(ShutdownSignal) -> F,
    F: Future<Output = ()> + Send + 'static,
    S: Future<Output = Result<(), ServiceError>>,
{
    let shutdown = Shutdown::new();
    let consume_loop = tokio::spawn(consume(shutdown.signal()));

    let stopped = stop.await;
    shutdown.trigger();

    if let Err(e) = consume_loop.await {
        warn!(error = %e, "consume loop panicked");
    }

    if tokio::time::timeout(drain_timeout, router.drain()).await.is_err() {
        warn!(
            timeout_ms = drain_timeout.as_millis() as u64,
            in_flight = router.in_flight(),
            "handlers still running after drain timeout"
        );
    }
    stopped
}

/// Waits for the compensation worker to publish what is still queued. The
/// worker only finishes once every `Compensator` clone is gone.
pub async fn flush_compensations(worker: JoinHandle<()>, stats: StatsHandle, timeout: Duration) {
    if tokio::time::timeout(timeout, worker).await.is_err() {
        warn!(pending = stats.get().pending(), "compensation queue not flushed");
    }

    let stats = stats.get();
    info!(
        resets_published = stats.published,
        resets_failed = stats.failed,
        resets_dropped = stats.dropped,
        "compensation queue closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus;
    use crate::router::{handler_fn, Delivery, RouterBuilder};
    use futures::channel::mpsc;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn sleeping_router(done: Arc<AtomicUsize>, delay: Duration) -> Arc<Router> {
        Arc::new(
            RouterBuilder::new()
                .route(
                    "paid_orders",
                    handler_fn(move |_| {
                        let done = done.clone();
                        async move {
                            tokio::time::sleep(delay).await;
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                )
                .build(),
        )
    }

    async fn wait_until_running(router: &Router) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while router.in_flight() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("delivery never dispatched");
    }

    fn consuming(
        router: Arc<Router>,
        messages: mpsc::UnboundedReceiver<(Delivery, ())>,
        dispatched: Arc<AtomicUsize>,
    ) -> impl FnOnce(ShutdownSignal) -> futures::future::BoxFuture<'static, ()> {
        move |signal| {
            async move {
                let n = bus::consume(&router, messages, signal, |_| {}).await;
                dispatched.store(n, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn stop_ends_consuming_then_waits_for_handlers() {
        let done = Arc::new(AtomicUsize::new(0));
        let dispatched = Arc::new(AtomicUsize::new(0));
        let router = sleeping_router(done.clone(), Duration::from_millis(50));
        let (tx, rx) = mpsc::unbounded();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        tx.unbounded_send((Delivery::new("paid_orders", "{}"), ()))
            .unwrap();
        let late = tx.clone();
        let server = tokio::spawn(serve(
            router.clone(),
            consuming(router.clone(), rx, dispatched.clone()),
            async move {
                let _ = stop_rx.await;
                // Queued in the same poll that fires the shutdown signal.
                late.unbounded_send((Delivery::new("paid_orders", "{}"), ()))
                    .unwrap();
                Ok(())
            },
            Duration::from_secs(1),
        ));

        wait_until_running(&router).await;
        stop_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("serve kept running after stop")
            .unwrap()
            .unwrap();

        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(router.in_flight(), 0);
    }

    #[tokio::test]
    async fn drain_timeout_bounds_shutdown() {
        let done = Arc::new(AtomicUsize::new(0));
        let dispatched = Arc::new(AtomicUsize::new(0));
        let router = sleeping_router(done.clone(), Duration::from_secs(30));
        let (tx, rx) = mpsc::unbounded();

        tx.unbounded_send((Delivery::new("paid_orders", "{}"), ()))
            .unwrap();
        let watched = router.clone();
        let stop = async move {
            wait_until_running(&watched).await;
            Ok(())
        };

        tokio::time::timeout(
            Duration::from_secs(2),
            serve(
                router.clone(),
                consuming(router.clone(), rx, dispatched.clone()),
                stop,
                Duration::from_millis(50),
            ),
        )
        .await
        .expect("drain waited past its timeout")
        .unwrap();

        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_stop_still_shuts_down() {
        let router = Arc::new(
            RouterBuilder::new()
                .route("check", handler_fn(|_| async { Ok(()) }))
                .build(),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            serve(
                router,
                |mut signal: ShutdownSignal| async move { signal.cancelled().await },
                async { Err(ServiceError::Internal("listen for ctrl-c".into())) },
                Duration::from_millis(50),
            ),
        )
        .await
        .expect("consume loop was not stopped");

        assert_eq!(result.unwrap_err().kind(), "internal");
    }
}
