use proptest::prelude::*;
use risk_lookup_core::LookupParams;

/// Strategy for non-empty identifying field values
pub fn field_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9+#_-]{1,24}"
}

/// Strategy for optional field values, including blank ones
pub fn optional_field_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        3 => field_value_strategy().prop_map(Some),
        1 => Just(None),
        1 => Just(Some("   ".to_string())),
    ]
}

/// Strategy for lookup parameters with at least one identifying field
pub fn lookup_params_strategy() -> impl Strategy<Value = LookupParams> {
    (
        optional_field_strategy(),
        optional_field_strategy(),
        optional_field_strategy(),
        optional_field_strategy(),
    )
        .prop_map(|(checkout_token, phone, order_name, order_id)| LookupParams {
            checkout_token,
            phone,
            order_name,
            order_id,
        })
        .prop_filter("at least one identifying field", |params| !params.is_empty())
}

/// Strategy for an ordering of the four field setters
pub fn field_order_strategy() -> impl Strategy<Value = Vec<usize>> {
    Just(vec![0usize, 1, 2, 3]).prop_shuffle()
}
