use flashsync_core::{is_data_equal, DatasetNamespace, FilterLevel, RowId, SyncRecord};
use proptest::prelude::*;

fn filter_level() -> impl Strategy<Value = FilterLevel> {
    prop_oneof![Just(FilterLevel::All), (0u8..=5).prop_map(FilterLevel::Stars)]
}

fn record() -> impl Strategy<Value = SyncRecord> {
    (
        proptest::option::of(0u8..=5),
        proptest::option::of(1u32..10_000),
        proptest::option::of(filter_level()),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(stars, row, level, sort)| SyncRecord {
            key: "k".into(),
            stars,
            last_viewed_row: row,
            filter_level: level,
            sort_by_stars: sort,
            ..SyncRecord::default()
        })
}

proptest! {
    #[test]
    fn prop_namespace_is_alphanumeric(name in "\\PC{0,40}") {
        let ns = DatasetNamespace::from_dataset_name(&name);
        prop_assert!(ns.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn prop_namespace_ignores_csv_extension(stem in "[A-Za-z0-9 _()-]{1,30}") {
        let with_ext = DatasetNamespace::from_dataset_name(&format!("{stem}.csv"));
        let other_ext = DatasetNamespace::from_dataset_name(&format!("{stem}.tsv"));
        prop_assert_eq!(with_ext, other_ext);
    }

    #[test]
    fn prop_item_key_round_trips_row(ns in "[a-z0-9]{1,12}", row in "[A-Za-z0-9-]{1,12}") {
        let namespace = DatasetNamespace::from_dataset_name(&ns);
        let key = namespace.item_key(&RowId::from(row.as_str()));
        prop_assert_eq!(namespace.row_of(&key), Some(row.as_str()));
        prop_assert_ne!(key, namespace.settings_key());
    }

    #[test]
    fn prop_equality_is_reflexive_and_symmetric(a in record(), b in record()) {
        prop_assert!(is_data_equal(Some(&a), Some(&a)));
        prop_assert_eq!(is_data_equal(Some(&a), Some(&b)), is_data_equal(Some(&b), Some(&a)));
    }

    #[test]
    fn prop_equality_survives_json(a in record()) {
        let decoded = SyncRecord::from_value("k", &a.to_value().unwrap()).unwrap();
        prop_assert!(is_data_equal(Some(&a), Some(&decoded)));
    }

    #[test]
    fn prop_filter_level_text_round_trips(level in filter_level()) {
        prop_assert_eq!(level.to_string().parse::<FilterLevel>().unwrap(), level);
    }
}
