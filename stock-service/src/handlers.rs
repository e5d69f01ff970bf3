use std::sync::Arc;

use shared::messages::decode;
use shared::router::{handler_fn, middleware, Delivery, Router, RouterBuilder};
use shared::{topics, CancelMsg, Order, ResetMsg};

use crate::engine::ReservationEngine;

/// Binds the stock topics to the reservation engine.
pub fn routes(engine: Arc<ReservationEngine>, worker_limit: usize) -> Router {
    let reserve = engine.clone();
    let collect = engine.clone();
    let reset = engine.clone();
    let cancel = engine;

    RouterBuilder::new()
        .worker_limit(worker_limit)
        .layer(middleware::logger())
        .route(
            topics::SAVED_ORDERS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = reserve.clone();
                async move {
                    let order: Order = decode(&d.payload)?;
                    engine.reserve(&order).await
                }
            }),
        )
        .route(
            topics::PAID_ORDERS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = collect.clone();
                async move {
                    let order: Order = decode(&d.payload)?;
                    engine.collect(order.order_id).await
                }
            }),
        )
        .route(
            topics::RESET,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = reset.clone();
                async move {
                    let msg: ResetMsg = decode(&d.payload)?;
                    engine.cancel_reservation(msg.order_id).await
                }
            }),
        )
        .route(
            topics::CANCEL,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = cancel.clone();
                async move {
                    let msg: CancelMsg = decode(&d.payload)?;
                    engine.cancel_reservation(msg.order_id).await
                }
            }),
        )
        .build()
}
