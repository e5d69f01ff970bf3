use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::{CreateOrderReq, Order, ServiceError};

use crate::models::{NewOrder, OrderItem, OrderRow};
use crate::schema::{orders, orders_items};

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Saves the order with its items and returns the assigned id.
    async fn create(&self, req: &CreateOrderReq) -> Result<i64, ServiceError>;

    /// Removes the order and its items. Returns whether an order was removed.
    async fn delete(&self, order_id: i64) -> Result<bool, ServiceError>;

    async fn get(&self, order_id: i64) -> Result<Order, ServiceError>;
}

pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, req: &CreateOrderReq) -> Result<i64, ServiceError> {
        let header = NewOrder::from_request(req)?;
        let items = req.items.clone();
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        conn.build_transaction()
            .read_committed()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    let order_id: i64 = diesel::insert_into(orders::table)
                        .values(&header)
                        .returning(orders::order_id)
                        .get_result(conn)
                        .await?;

                    let rows: Vec<OrderItem> = items
                        .iter()
                        .map(|item| OrderItem::new(order_id, item))
                        .collect();

                    diesel::insert_into(orders_items::table)
                        .values(&rows)
                        .execute(conn)
                        .await?;

                    Ok(order_id)
                })
            })
            .await
    }

    async fn delete(&self, order_id: i64) -> Result<bool, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        conn.build_transaction()
            .read_committed()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    diesel::delete(orders_items::table.filter(orders_items::order_id.eq(order_id)))
                        .execute(conn)
                        .await?;

                    let deleted = diesel::delete(orders::table.filter(orders::order_id.eq(order_id)))
                        .execute(conn)
                        .await?;

                    Ok(deleted > 0)
                })
            })
            .await
    }

    async fn get(&self, order_id: i64) -> Result<Order, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        conn.build_transaction()
            .read_committed()
            .read_only()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    let header: OrderRow = orders::table
                        .filter(orders::order_id.eq(order_id))
                        .select(OrderRow::as_select())
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;

                    let items: Vec<OrderItem> = orders_items::table
                        .filter(orders_items::order_id.eq(order_id))
                        .order(orders_items::product_id)
                        .select(OrderItem::as_select())
                        .load(conn)
                        .await?;

                    header.into_order(items)
                })
            })
            .await
    }
}
