//! Property tests for statement building and DSN handling.

use mysql_kit::db::builder::{build_insert, build_update};
use mysql_kit::{DbError, Dsn, Record, Value};
use proptest::prelude::*;

fn column_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[ -~]{0,16}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ]
}

fn record() -> impl Strategy<Value = Record> {
    prop::collection::vec((column_name(), scalar()), 1..8)
        .prop_map(|fields| fields.into_iter().collect::<Record>())
}

proptest! {
    #[test]
    fn single_document_has_one_group_of_all_keys(doc in record()) {
        let stmt = build_insert(&[doc.clone()]).unwrap();

        prop_assert_eq!(stmt.groups.len(), 1);
        prop_assert_eq!(stmt.placeholder_count(), doc.len());
        prop_assert_eq!(stmt.columns.len(), doc.len());
        prop_assert_eq!(stmt.args, doc.values().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn same_keyed_documents_produce_n_groups(doc in record(), n in 1usize..6) {
        let docs = vec![doc.clone(); n];
        let stmt = build_insert(&docs).unwrap();

        prop_assert_eq!(stmt.groups.len(), n);
        prop_assert_eq!(stmt.args.len(), n * doc.len());
        prop_assert_eq!(stmt.placeholder_count(), stmt.args.len());
    }

    #[test]
    fn placeholders_always_align_with_args(docs in prop::collection::vec(record(), 1..5)) {
        let stmt = build_insert(&docs).unwrap();
        prop_assert_eq!(stmt.placeholder_count(), stmt.args.len());
        prop_assert_eq!(stmt.args.len(), stmt.columns.len() * docs.len());
    }

    #[test]
    fn blank_where_always_rejected(doc in record(), blank in "[ \t\n]{0,4}") {
        let result = build_update(&doc, &blank, &[]);
        prop_assert!(
            matches!(result, Err(DbError::EmptyWhereClause { .. })),
            "expected Err(DbError::EmptyWhereClause {{ .. }}), got {:?}",
            result
        );
    }

    #[test]
    fn update_args_are_set_values_then_where_args(doc in record(), extra in prop::collection::vec(scalar(), 0..4)) {
        let stmt = build_update(&doc, "id = ?", &extra).unwrap();
        prop_assert_eq!(stmt.args.len(), doc.len() + extra.len());
        prop_assert_eq!(&stmt.args[doc.len()..], extra.as_slice());
        prop_assert_eq!(stmt.set_clause.matches("=?").count(), doc.len());
    }

    #[test]
    fn dsn_parse_never_panics(raw in "[ -~]{0,64}") {
        let _ = Dsn::parse(&raw);
    }

    #[test]
    fn dsn_format_parses_back(
        user in "[a-z]{1,8}",
        password in "[a-zA-Z0-9]{0,8}",
        host in "[a-z]{1,8}(\\.[a-z]{1,8})?",
        port in 1u16..,
        database in "[a-z]{0,8}",
    ) {
        let dsn = Dsn {
            user: Some(user),
            password: (!password.is_empty()).then_some(password),
            protocol: Some("tcp".to_string()),
            host: Some(host),
            port: Some(port),
            database: (!database.is_empty()).then_some(database),
            params: Default::default(),
        };
        prop_assert_eq!(Dsn::parse(&dsn.to_string()).unwrap(), dsn);
    }
}
