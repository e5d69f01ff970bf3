diesel::table! {
    quantities (product_id) {
        product_id -> Int8,
        quantity -> Int4,
    }
}

diesel::table! {
    reservations (order_id, product_id) {
        order_id -> Int8,
        product_id -> Int8,
        quantity -> Int4,
    }
}

diesel::allow_tables_to_appear_in_same_query!(quantities, reservations,);
