diesel::table! {
    payments (order_id) {
        order_id -> Int8,
        user_id -> Int8,
        total -> Numeric,
    }
}

diesel::table! {
    payments_statuses (order_id) {
        order_id -> Int8,
        status -> Varchar,
    }
}

diesel::joinable!(payments_statuses -> payments (order_id));

diesel::allow_tables_to_appear_in_same_query!(payments, payments_statuses,);
