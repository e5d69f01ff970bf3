use diesel::prelude::*;
use shared::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::quantities)]
pub struct ProductQuantity {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::reservations)]
pub struct Reservation {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
}

impl Reservation {
    pub fn new(order_id: i64, item: &Item) -> Self {
        Self {
            order_id,
            product_id: item.product_id,
            quantity: item.quantity,
        }
    }
}

impl From<Reservation> for Item {
    fn from(r: Reservation) -> Self {
        Item {
            product_id: r.product_id,
            quantity: r.quantity,
        }
    }
}
