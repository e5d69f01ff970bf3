use std::collections::BTreeMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::error::unique_violation;
use shared::{Item, ServiceError};

use crate::models::{ProductQuantity, Reservation};
use crate::schema::{quantities, reservations};

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Transactional storage for product quantities and per-order reservations.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Holds `items` for `order_id` and takes them off the shelf, all or nothing.
    async fn reserve(&self, order_id: i64, items: &[Item]) -> Result<(), ServiceError>;

    /// Drops the reservations of `order_id` and puts the quantities back.
    async fn cancel_reservation(&self, order_id: i64) -> Result<Vec<Item>, ServiceError>;

    /// Drops the reservations of `order_id` without restoring quantities.
    async fn collect(&self, order_id: i64) -> Result<Vec<Item>, ServiceError>;

    async fn quantity(&self, product_id: i64) -> Result<Option<i32>, ServiceError>;

    async fn reservations(&self, order_id: i64) -> Result<Vec<Reservation>, ServiceError>;
}

/// Requested quantity per distinct product. A total that does not fit the
/// quantity column is an invalid order.
pub(crate) fn requested(
    order_id: i64,
    items: &[Item],
) -> Result<BTreeMap<i64, i32>, ServiceError> {
    let mut wanted = BTreeMap::new();
    for item in items {
        let total = wanted.entry(item.product_id).or_insert(0i32);
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            ServiceError::InvalidMessage(format!(
                "order {order_id} requests too much of product {}",
                item.product_id
            ))
        })?;
    }
    Ok(wanted)
}

/// Fails unless every requested product has a row holding enough quantity.
pub(crate) fn check_sufficient(
    order_id: i64,
    wanted: &BTreeMap<i64, i32>,
    available: &[ProductQuantity],
) -> Result<(), ServiceError> {
    if available.len() < wanted.len() {
        return Err(ServiceError::InsufficientStock { order_id });
    }

    for (product_id, qty) in wanted {
        match available.iter().find(|row| row.product_id == *product_id) {
            Some(row) if row.quantity >= *qty => {}
            _ => return Err(ServiceError::InsufficientStock { order_id }),
        }
    }

    Ok(())
}

pub struct PgStockStore {
    pool: DbPool,
}

impl PgStockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn delete_reservations(
        &self,
        order_id: i64,
        restore: bool,
    ) -> Result<Vec<Item>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        conn.build_transaction()
            .read_committed()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    let removed: Vec<Reservation> = diesel::delete(
                        reservations::table.filter(reservations::order_id.eq(order_id)),
                    )
                    .returning(Reservation::as_returning())
                    .get_results(conn)
                    .await?;

                    if restore {
                        for r in &removed {
                            diesel::insert_into(quantities::table)
                                .values(ProductQuantity {
                                    product_id: r.product_id,
                                    quantity: r.quantity,
                                })
                                .on_conflict(quantities::product_id)
                                .do_update()
                                .set(
                                    quantities::quantity
                                        .eq(quantities::quantity + excluded(quantities::quantity)),
                                )
                                .execute(conn)
                                .await?;
                        }
                    }

                    Ok(removed.into_iter().map(Item::from).collect())
                })
            })
            .await
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn reserve(&self, order_id: i64, items: &[Item]) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;
        let items = items.to_vec();

        conn.build_transaction()
            .read_committed()
            .run::<_, ServiceError, _>(|conn| {
                Box::pin(async move {
                    let wanted = requested(order_id, &items)?;
                    let ids: Vec<i64> = wanted.keys().copied().collect();

                    // Row locks keep concurrent reservations from reading the same balance.
                    let available: Vec<ProductQuantity> = quantities::table
                        .filter(quantities::product_id.eq_any(&ids))
                        .select(ProductQuantity::as_select())
                        .order(quantities::product_id)
                        .for_update()
                        .load(conn)
                        .await?;

                    check_sufficient(order_id, &wanted, &available)?;

                    let rows: Vec<Reservation> = items
                        .iter()
                        .map(|item| Reservation::new(order_id, item))
                        .collect();

                    diesel::insert_into(reservations::table)
                        .values(&rows)
                        .execute(conn)
                        .await
                        .map_err(|e| match unique_violation(&e) {
                            Some(constraint) => ServiceError::Conflict(format!(
                                "order {order_id} already reserved ({constraint})"
                            )),
                            None => ServiceError::from(e),
                        })?;

                    for (product_id, qty) in &wanted {
                        let updated = diesel::update(
                            quantities::table
                                .filter(quantities::product_id.eq(*product_id))
                                .filter(quantities::quantity.ge(*qty)),
                        )
                        .set(quantities::quantity.eq(quantities::quantity - *qty))
                        .execute(conn)
                        .await?;

                        if updated == 0 {
                            return Err(ServiceError::InsufficientStock { order_id });
                        }
                    }

                    Ok(())
                })
            })
            .await
    }

    async fn cancel_reservation(&self, order_id: i64) -> Result<Vec<Item>, ServiceError> {
        self.delete_reservations(order_id, true).await
    }

    async fn collect(&self, order_id: i64) -> Result<Vec<Item>, ServiceError> {
        self.delete_reservations(order_id, false).await
    }

    async fn quantity(&self, product_id: i64) -> Result<Option<i32>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        let quantity = quantities::table
            .filter(quantities::product_id.eq(product_id))
            .select(quantities::quantity)
            .first::<i32>(&mut conn)
            .await
            .optional()?;

        Ok(quantity)
    }

    async fn reservations(&self, order_id: i64) -> Result<Vec<Reservation>, ServiceError> {
        let mut conn = self.pool.get().await.map_err(ServiceError::internal)?;

        let rows = reservations::table
            .filter(reservations::order_id.eq(order_id))
            .order(reservations::product_id)
            .select(Reservation::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }
}
