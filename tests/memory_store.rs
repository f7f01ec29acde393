use tempora::{
    Combinator, Condition, ErrorCode, MemoryStore, Operator, RowStore, SearchSpec, Value, row,
};

fn people() -> MemoryStore {
    let mut store = MemoryStore::new("people");
    for (name, age) in [("Alice", 35), ("Bob", 10), ("Carol", 40)] {
        store.create_row(row! { "name" => name, "age" => age }).expect("create");
    }
    store
}

#[test]
fn ids_are_assigned_sequentially_from_one() {
    let mut store = MemoryStore::new("t");
    assert_eq!(store.create_row(row! { "a" => 1 }).expect("first"), 1);
    assert_eq!(store.create_row(row! { "a" => 2 }).expect("second"), 2);
    assert_eq!(store.create_row(row! { "id" => 10, "a" => 3 }).expect("explicit"), 10);
    assert_eq!(store.create_row(row! { "a" => 4 }).expect("after explicit"), 11);
    assert_eq!(store.get_row(10).expect("get")["id"], Value::Integer(10));
}

#[test]
fn unusable_ids_on_create_are_replaced() {
    let mut store = MemoryStore::new("t");
    assert_eq!(store.create_row(row! { "id" => 0, "a" => 1 }).expect("zero id"), 1);
    assert_eq!(store.create_row(row! { "id" => "x", "a" => 1 }).expect("text id"), 2);
    assert_eq!(store.create_row(row! { "id" => "7" }).expect("integral text"), 7);
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut store = people();
    let err = store.create_row(row! { "id" => 2, "name" => "Dave" }).expect_err("duplicate");
    assert_eq!(err.code(), ErrorCode::RowAlreadyExists);
    assert_eq!(store.get_row(2).expect("untouched")["name"], Value::from("Bob"));
}

#[test]
fn missing_rows_are_reported() {
    let store = people();
    assert!(!store.row_exists(99).expect("exists"));
    let err = store.get_row(99).expect_err("missing");
    assert_eq!(err.code(), ErrorCode::RowDoesNotExist);
}

#[test]
fn update_overwrites_only_supplied_columns() {
    let mut store = people();
    store.update_row(row! { "id" => 1, "age" => 36, "city" => "Oslo" }).expect("update");
    let alice = store.get_row(1).expect("get");
    assert_eq!(alice, row! { "id" => 1, "name" => "Alice", "age" => 36, "city" => "Oslo" });

    store.update_row(row! { "id" => 1, "city" => Value::Null }).expect("clear");
    assert!(!store.get_row(1).expect("get").contains_key("city"));
}

#[test]
fn update_validates_the_id() {
    let mut store = people();
    let cases = [
        (row! { "age" => 1 }, ErrorCode::InvalidIdNotSet),
        (row! { "id" => Value::Null, "age" => 1 }, ErrorCode::InvalidIdNotSet),
        (row! { "id" => 0, "age" => 1 }, ErrorCode::InvalidIdIsZero),
        (row! { "id" => "abc", "age" => 1 }, ErrorCode::InvalidIdNotInteger),
        (row! { "id" => 1.5, "age" => 1 }, ErrorCode::InvalidIdNotInteger),
        (row! { "id" => 42, "age" => 1 }, ErrorCode::RowDoesNotExist),
    ];
    for (row, code) in cases {
        let err = store.update_row(row.clone()).expect_err("invalid update");
        assert_eq!(err.code(), code, "{row:?}");
    }
}

#[test]
fn delete_reports_how_many_rows_went() {
    let mut store = people();
    assert_eq!(store.delete_row(2).expect("delete"), 1);
    assert_eq!(store.delete_row(2).expect("delete again"), 0);
    assert_eq!(store.get_unique_ids().expect("ids"), vec![1, 3]);
}

#[test]
fn search_returns_restartable_rows_in_id_order() {
    let store = people();
    let spec = SearchSpec::new(vec![Condition::new("age", Operator::Gt, 30)]);
    let mut found = store.search(&spec, Combinator::And, 0).expect("search");
    assert!(found.is_restartable());
    assert_eq!(found.len(), 2);
    let names: Vec<Value> = found.by_ref().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![Value::from("Alice"), Value::from("Carol")]);

    let rows = found.restartable().expect("array backed");
    rows.rewind();
    assert_eq!(rows.key(), Some(0));
    assert_eq!(rows.current().expect("current")["name"], Value::from("Alice"));
}

#[test]
fn max_results_truncates_after_ordering() {
    let store = people();
    let spec = SearchSpec::new(vec![Condition::new("age", Operator::Ge, 0)]);
    let found = store.search(&spec, Combinator::And, 2).expect("search");
    assert_eq!(found.len(), 2);
    assert_eq!(found.first().expect("first")["id"], Value::Integer(1));
}

#[test]
fn empty_specs_are_rejected() {
    let store = people();
    let err = store.search(&SearchSpec::default(), Combinator::And, 0).expect_err("empty");
    assert_eq!(err.code(), ErrorCode::InvalidSearchSpec);
}

#[test]
fn key_value_lookups() {
    let store = people();
    let found = store.find_rows(&row! { "name" => "Carol" }, 0).expect("find");
    assert_eq!(found.len(), 1);
    assert_eq!(store.get_id_for_key_value("name", &Value::from("Bob")).expect("lookup"), Some(2));
    assert_eq!(store.get_id_for_key_value("name", &Value::from("Zed")).expect("lookup"), None);
    assert_eq!(store.get_id_for_key_value("name", &Value::Null).expect("lookup"), None);
}

#[test]
fn max_values_read_numerically() {
    let mut store = people();
    assert_eq!(store.get_max_id().expect("max id"), 3);
    assert_eq!(store.get_max_value_in_column("age").expect("max age"), 40);
    assert_eq!(store.get_max_value_in_column("ghost").expect("no column"), 0);
    store.create_row(row! { "age" => "75 years" }).expect("text age");
    assert_eq!(store.get_max_value_in_column("age").expect("max age"), 75);
}

#[test]
fn null_columns_are_not_stored() {
    let mut store = MemoryStore::new("t");
    let id = store.create_row(row! { "a" => 1, "b" => Value::Null }).expect("create");
    assert_eq!(store.get_row(id).expect("get"), row! { "id" => id, "a" => 1 });
}

#[test]
fn the_id_column_can_be_renamed() {
    let mut store = people();
    store.set_id_column("person_id").expect("rename");
    let bob = store.get_row(2).expect("get");
    assert_eq!(bob["person_id"], Value::Integer(2));
    assert!(!bob.contains_key("id"));
    let id = store.create_row(row! { "person_id" => 20, "name" => "Dave" }).expect("create");
    assert_eq!(id, 20);
}
