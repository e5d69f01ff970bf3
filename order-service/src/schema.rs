diesel::table! {
    orders (order_id) {
        order_id -> Int8,
        user_id -> Int8,
        delivery_date -> Timestamptz,
        email -> Varchar,
        total -> Numeric,
    }
}

diesel::table! {
    orders_items (order_id, product_id) {
        order_id -> Int8,
        product_id -> Int8,
        quantity -> Int4,
    }
}

diesel::joinable!(orders_items -> orders (order_id));

diesel::allow_tables_to_appear_in_same_query!(orders, orders_items,);
