// Diesel table definitions. Column order must match db/schema.rs and the Queryable models.

diesel::table! {
    schema_version (version) {
        version -> Integer,
    }
}

diesel::table! {
    credit_transactions (seq) {
        seq -> BigInt,
        id -> Text,
        user_id -> Text,
        amount -> BigInt,
        kind -> Text,
        source -> Text,
        description -> Text,
        chain_id -> Nullable<Text>,
        request_id -> Nullable<Text>,
        related_user_id -> Nullable<Text>,
        idempotency_key -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    user_credit_balances (user_id) {
        user_id -> Text,
        total_credits -> BigInt,
        earned_credits -> BigInt,
        spent_credits -> BigInt,
        updated_at -> Text,
    }
}

diesel::table! {
    connection_requests (id) {
        id -> Text,
        chain_id -> Text,
        creator_id -> Text,
        target -> Text,
        reward -> BigInt,
        status -> Text,
        message -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    chain_participants (chain_id, user_id) {
        chain_id -> Text,
        user_id -> Text,
        request_id -> Text,
        position -> BigInt,
        joined_at -> Text,
    }
}

diesel::table! {
    target_claims (seq) {
        seq -> BigInt,
        id -> Text,
        request_id -> Text,
        claimant_id -> Text,
        contact_name -> Text,
        contact_email -> Nullable<Text>,
        contact_phone -> Nullable<Text>,
        message -> Nullable<Text>,
        status -> Text,
        rejection_reason -> Nullable<Text>,
        reviewed_at -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    unlocked_chains (user_id, chain_id) {
        user_id -> Text,
        chain_id -> Text,
        request_id -> Text,
        credits_spent -> BigInt,
        transaction_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    chain_likes (user_id, chain_id) {
        user_id -> Text,
        chain_id -> Text,
        request_id -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(target_claims -> connection_requests (request_id));

diesel::allow_tables_to_appear_in_same_query!(
    credit_transactions,
    user_credit_balances,
    connection_requests,
    chain_participants,
    target_claims,
    unlocked_chains,
    chain_likes,
);
