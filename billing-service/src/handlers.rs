use std::sync::Arc;

use shared::messages::decode;
use shared::router::{handler_fn, middleware, Delivery, Router, RouterBuilder};
use shared::{topics, CancelMsg, Order, Receipt, ResetMsg};

use crate::engine::PaymentEngine;

pub fn routes(engine: Arc<PaymentEngine>, worker_limit: usize) -> Router {
    let add = engine.clone();
    let approve = engine.clone();
    let reset = engine.clone();
    let cancel = engine;

    RouterBuilder::new()
        .worker_limit(worker_limit)
        .layer(middleware::logger())
        .route(
            topics::RESERVED_ORDERS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = add.clone();
                async move {
                    let order: Order = decode(&d.payload)?;
                    engine
                        .add_payment(order.order_id, order.user_id, order.total)
                        .await
                }
            }),
        )
        .route(
            topics::RECEIPTS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = approve.clone();
                async move {
                    let receipt: Receipt = decode(&d.payload)?;
                    engine.approve_payment(receipt.order_id).await
                }
            }),
        )
        .route(
            topics::RESET,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = reset.clone();
                async move {
                    let msg: ResetMsg = decode(&d.payload)?;
                    engine.cancel_payment(msg.order_id).await
                }
            }),
        )
        .route(
            topics::CANCEL,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = cancel.clone();
                async move {
                    let msg: CancelMsg = decode(&d.payload)?;
                    engine.cancel_payment(msg.order_id).await
                }
            }),
        )
        .build()
}
