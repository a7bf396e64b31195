table! {
    posts (id) {
        id -> Integer,
        user_id -> Integer,
        content -> Text,
        timestamp -> Timestamp,
    }
}

table! {
    relationships (id) {
        id -> Integer,
        from_user_id -> Integer,
        to_user_id -> Integer,
    }
}

table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        password -> Text,
        joined_at -> Timestamp,
        is_admin -> Bool,
    }
}

joinable!(posts -> users (user_id));

allow_tables_to_appear_in_same_query!(posts, relationships, users);
