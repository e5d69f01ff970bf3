diesel::table! {
    notifications (id) {
        id -> Int8,
        order_id -> Int8,
        user_id -> Int8,
        ts -> Timestamptz,
    }
}
