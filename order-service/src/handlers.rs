use std::sync::Arc;

use shared::messages::decode;
use shared::router::{handler_fn, middleware, Delivery, Router, RouterBuilder};
use shared::{topics, CancelMsg, CreateOrderReq, PaymentEvent, ResetMsg};

use crate::engine::OrderEngine;

pub fn routes(engine: Arc<OrderEngine>, worker_limit: usize) -> Router {
    let create = engine.clone();
    let paid = engine.clone();
    let reset = engine.clone();
    let cancel = engine;

    RouterBuilder::new()
        .worker_limit(worker_limit)
        .layer(middleware::logger())
        .route(
            topics::NEW_ORDERS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = create.clone();
                async move {
                    let req: CreateOrderReq = decode(&d.payload)?;
                    engine.create(req).await.map(|_| ())
                }
            }),
        )
        .route(
            topics::PAID_PAYMENTS,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = paid.clone();
                async move {
                    let payment: PaymentEvent = decode(&d.payload)?;
                    engine.send_paid_order(payment.order_id).await
                }
            }),
        )
        .route(
            topics::RESET,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = reset.clone();
                async move {
                    let msg: ResetMsg = decode(&d.payload)?;
                    engine.delete(msg.order_id).await
                }
            }),
        )
        .route(
            topics::CANCEL,
            handler_fn(move |d: Arc<Delivery>| {
                let engine = cancel.clone();
                async move {
                    let msg: CancelMsg = decode(&d.payload)?;
                    engine.delete(msg.order_id).await
                }
            }),
        )
        .build()
}
