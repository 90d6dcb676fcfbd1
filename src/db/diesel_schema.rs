// Mirrors the DDL in schema.rs

diesel::table! {
    manifests (customer_id, id) {
        id -> Text,
        customer_id -> Integer,
        label_json -> Nullable<Text>,
        space_id -> Nullable<Integer>,
        created_at -> Text,
        modified_at -> Text,
        last_processed_at -> Nullable<Text>,
    }
}

diesel::table! {
    canvas_paintings (canvas_painting_id) {
        canvas_painting_id -> Integer,
        canvas_id -> Text,
        manifest_id -> Text,
        customer_id -> Integer,
        canvas_original_id -> Nullable<Text>,
        canvas_order -> Integer,
        choice_order -> Integer,
        asset_id -> Nullable<Text>,
        external_asset_id -> Nullable<Text>,
        label_json -> Nullable<Text>,
        canvas_label_json -> Nullable<Text>,
        target -> Nullable<Text>,
        thumbnail -> Nullable<Text>,
        static_width -> Nullable<Integer>,
        static_height -> Nullable<Integer>,
        duration -> Nullable<Double>,
        ingesting -> Integer,
        created_at -> Text,
        modified_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(manifests, canvas_paintings);
