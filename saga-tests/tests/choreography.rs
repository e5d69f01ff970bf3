use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use saga_tests::Harness;
use shared::{
    topics, CancelMsg, CheckReq, CreateOrderReq, EmailNotification, Item, Order, PaymentStatus,
    Receipt, ResetMsg, Stage,
};
use stock_service::models::Reservation;
use stock_service::store::StockStore;

const WAIT: Duration = Duration::from_secs(2);

fn request(quantity: i32) -> CreateOrderReq {
    CreateOrderReq {
        user_id: 7,
        items: vec![Item {
            product_id: 5,
            quantity,
        }],
        delivery_date: Utc.with_ymd_and_hms(2022, 6, 4, 0, 0, 0).unwrap(),
        email: "buyer@example.com".into(),
        total: 100.0,
    }
}

async fn place_order(h: &Harness, req: &CreateOrderReq) {
    h.bus.inject(topics::NEW_ORDERS, 0, req).await.unwrap();
    h.bus.settle().await;
}

#[tokio::test]
async fn order_reserves_stock_and_opens_payment() {
    let h = Harness::start([(5, 10)]).await;
    place_order(&h, &request(2)).await;

    assert_eq!(h.stock.quantity(5).await.unwrap(), Some(8));
    assert_eq!(
        h.stock.reservations(1).await.unwrap(),
        vec![Reservation {
            order_id: 1,
            product_id: 5,
            quantity: 2
        }]
    );

    let payment = h.billing.get_payment(1).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.total, 100.0);
    assert_eq!(h.bus.log().count(topics::PENDING_PAYMENTS).await, 1);
    assert_eq!(h.stage(1).await, Some(Stage::PendingPayment));
}

#[tokio::test]
async fn receipt_pays_collects_and_schedules_notification() {
    let h = Harness::start([(5, 10)]).await;
    place_order(&h, &request(2)).await;

    h.bus
        .inject(topics::RECEIPTS, 1, &Receipt { order_id: 1 })
        .await
        .unwrap();
    h.bus.settle().await;

    assert_eq!(h.payments.status(1).await, Some(PaymentStatus::Paid));

    let paid = h.bus.log().on_topic(topics::PAID_ORDERS).await;
    assert_eq!(paid.len(), 1);
    let order: Order = paid[0].decode().unwrap();
    assert_eq!(order, Order::from_request(1, request(2)));

    assert!(h.stock.reservations(1).await.unwrap().is_empty());
    assert_eq!(h.stock.quantity(5).await.unwrap(), Some(8));
    assert_eq!(h.view(1).await.notifications, 1);
    assert_eq!(h.stage(1).await, Some(Stage::Collected));
    assert_eq!(h.bus.log().count(topics::RESET).await, 0);
}

#[tokio::test]
async fn insufficient_stock_resets_the_order() {
    let h = Harness::start([(5, 1)]).await;
    place_order(&h, &request(2)).await;

    assert!(h.bus.log().wait_for(topics::RESET, 1, WAIT).await);
    h.bus.settle().await;

    let reset: ResetMsg = h.bus.log().on_topic(topics::RESET).await[0]
        .decode()
        .unwrap();
    assert_eq!(reset.order_id, 1);
    assert!(reset.err_msg.contains("not enough stock"));

    assert_eq!(h.stock.quantity(5).await.unwrap(), Some(1));
    assert!(h.stock.reservations(1).await.unwrap().is_empty());
    assert_eq!(h.payments.status(1).await, None);
    assert_eq!(h.bus.log().count(topics::RESERVED_ORDERS).await, 0);
    assert!(!h.orders.exists(1).await);
    assert_eq!(h.stage(1).await, None);

    let stats = h.stock_compensator.stats();
    assert_eq!(stats.published, 1);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn cancel_before_payment_rolls_back_every_service() {
    let h = Harness::start([(5, 10)]).await;
    place_order(&h, &request(2)).await;
    assert_eq!(h.stage(1).await, Some(Stage::PendingPayment));

    let cancel = CancelMsg {
        order_id: 1,
        reason: "changed my mind".into(),
    };
    h.bus.inject(topics::CANCEL, 1, &cancel).await.unwrap();
    h.bus.settle().await;

    assert!(h.stock.reservations(1).await.unwrap().is_empty());
    assert_eq!(h.stock.quantity(5).await.unwrap(), Some(10));
    assert_eq!(h.payments.status(1).await, Some(PaymentStatus::Cancelled));
    assert!(!h.orders.exists(1).await);
    assert_eq!(h.stage(1).await, Some(Stage::Cancelled));
}

#[tokio::test]
async fn cancel_after_payment_leaves_payment_paid() {
    let h = Harness::start([(5, 10)]).await;
    place_order(&h, &request(2)).await;
    h.bus
        .inject(topics::RECEIPTS, 1, &Receipt { order_id: 1 })
        .await
        .unwrap();
    h.bus.settle().await;

    let cancel = CancelMsg {
        order_id: 1,
        reason: "too late".into(),
    };
    h.bus.inject(topics::CANCEL, 1, &cancel).await.unwrap();
    h.bus.settle().await;

    assert_eq!(h.payments.status(1).await, Some(PaymentStatus::Paid));
    assert_eq!(h.stock.quantity(5).await.unwrap(), Some(8));
}

#[tokio::test]
async fn check_sends_notifications_due_on_delivery_date() {
    let h = Harness::start([(5, 10)]).await;
    place_order(&h, &request(1)).await;
    h.bus
        .inject(topics::RECEIPTS, 1, &Receipt { order_id: 1 })
        .await
        .unwrap();
    h.bus.settle().await;

    let day_before = NaiveDate::from_ymd_opt(2022, 6, 3).unwrap();
    assert_eq!(h.notifier.check_on(day_before).await.unwrap(), 0);

    let delivery_day = NaiveDate::from_ymd_opt(2022, 6, 4).unwrap();
    assert_eq!(h.notifier.check_on(delivery_day).await.unwrap(), 1);
    assert!(h
        .bus
        .log()
        .wait_for(topics::EMAIL_NOTIFICATIONS, 1, WAIT)
        .await);

    let sent: EmailNotification = h.bus.log().on_topic(topics::EMAIL_NOTIFICATIONS).await[0]
        .decode()
        .unwrap();
    assert_eq!(
        sent,
        EmailNotification {
            order_id: 1,
            user_id: 7
        }
    );
}

#[tokio::test]
async fn check_message_reaches_notifications() {
    let h = Harness::start([(5, 10)]).await;
    h.bus.inject(topics::CHECK, 0, &CheckReq {}).await.unwrap();
    h.bus.settle().await;

    assert_eq!(h.bus.log().count(topics::EMAIL_NOTIFICATIONS).await, 0);
    assert_eq!(h.bus.log().count(topics::RESET).await, 0);
}

#[tokio::test]
async fn malformed_messages_change_nothing() {
    let h = Harness::start([(5, 10)]).await;
    h.bus
        .inject(topics::NEW_ORDERS, 0, &serde_json::json!({"user_id": 7}))
        .await
        .unwrap();
    h.bus
        .inject(topics::RECEIPTS, 0, &serde_json::json!({"order": 1}))
        .await
        .unwrap();
    h.bus.settle().await;

    assert!(!h.orders.exists(1).await);
    assert_eq!(h.stock.quantity(5).await.unwrap(), Some(10));
    assert_eq!(h.bus.log().published().await.len(), 2);
}
