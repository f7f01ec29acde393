use rusqlite::Connection;
use tempora::error::ProblemCode;
use tempora::{
    BitemporalTable, Combinator, Condition, END_OF_TIME, ErrorCode, Operator, RowStore, Rows, SearchSpec,
    SqliteStore, TemporaError, Timestamp, VALID_FROM, VALID_UNTIL, Value, WarningCode, row,
};

const T0: &str = "2010-01-01 00:00:00.000000";
const T1: &str = "2015-01-01 00:00:00.000000";
const T2: &str = "2016-01-01 00:00:00.000000";

fn three_versions<S: RowStore>(table: &mut BitemporalTable<S>) {
    let id = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    table.update_row_with_time(row! { "id" => id, "v" => 2 }, T1).expect("first update");
    table.update_row_with_time(row! { "id" => id, "v" => 3 }, T2).expect("second update");

    assert_eq!(table.get_row_with_time(id, "2012-01-01").expect("2012")["v"], Value::Integer(1));
    assert_eq!(table.get_row_with_time(id, "2015-06-01").expect("2015")["v"], Value::Integer(2));
    assert_eq!(table.get_row(id).expect("current")["v"], Value::Integer(3));

    let history = table.get_row_history(id).expect("history");
    assert_eq!(history.len(), 3);
    let froms: Vec<&Value> = history.iter().map(|v| &v[VALID_FROM]).collect();
    assert_eq!(froms, vec![&Value::from(T0), &Value::from(T1), &Value::from(T2)]);
    assert_eq!(history[0][VALID_UNTIL], Value::from(T1));
    assert_eq!(history[1][VALID_UNTIL], Value::from(T2));
    assert_eq!(history[2][VALID_UNTIL], Value::from(END_OF_TIME));
    assert!(history.iter().all(|v| !v.contains_key("versionId")));
    assert!(table.check_consistency().expect("check").is_empty());
}

fn ages_over_thirty<S: RowStore>(table: &mut BitemporalTable<S>) {
    for age in [10, 35, 40] {
        table.create_row_with_time(row! { "age" => age }, T0).expect("create");
    }
    let spec = SearchSpec::new(vec![Condition::new("age", Operator::Gt, 30)]);
    let ages: Vec<Value> = table
        .search_with_time(&spec, Combinator::And, 0, T1)
        .expect("search")
        .map(|r| r["age"].clone())
        .collect();
    assert_eq!(ages, vec![Value::Integer(35), Value::Integer(40)]);
    // nothing existed yet
    assert!(table.search_with_time(&spec, Combinator::And, 0, "2000-01-01").expect("search").is_empty());
}

fn ids(rows: Rows<'_>) -> Vec<i64> {
    rows.filter_map(|r| r["id"].as_id()).collect()
}

fn ids_after_updating_a_lower_id<S: RowStore>(table: &mut BitemporalTable<S>) {
    let a = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    let b = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    table.update_row_with_time(row! { "id" => a, "w" => 2 }, T1).expect("update lower id");

    let spec = SearchSpec::new(vec![Condition::eq("v", 1)]);
    assert_eq!(ids(table.search_with_time(&spec, Combinator::And, 0, T2).expect("search")), vec![a, b]);
    assert_eq!(ids(table.search_with_time(&spec, Combinator::And, 1, T2).expect("search")), vec![a]);
    assert_eq!(ids(table.search_with_time(&spec, Combinator::Or, 1, T2).expect("search")), vec![a]);
    assert_eq!(ids(table.search(&spec, Combinator::And, 1).expect("search")), vec![a]);
    assert_eq!(ids(table.find_rows_with_time(&row! { "v" => 1 }, 1, T2).expect("find")), vec![a]);
    assert_eq!(ids(table.find_rows(&row! { "v" => 1 }, 0).expect("find")), vec![a, b]);
}

#[test]
fn history_in_memory() {
    three_versions(&mut BitemporalTable::in_memory("history").expect("table"));
}

#[test]
fn history_in_sqlite() {
    tempora::logging::init_test();
    let conn = Connection::open_in_memory().expect("conn");
    three_versions(&mut BitemporalTable::sqlite(&conn, "history").expect("table"));
}

#[test]
fn point_in_time_search_in_memory() {
    ages_over_thirty(&mut BitemporalTable::in_memory("people").expect("table"));
}

#[test]
fn point_in_time_search_in_sqlite() {
    let conn = Connection::open_in_memory().expect("conn");
    ages_over_thirty(&mut BitemporalTable::sqlite(&conn, "people").expect("table"));
}

#[test]
fn intervals_are_half_open() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    table.update_row_with_time(row! { "id" => id, "v" => 2 }, T1).expect("update");
    assert_eq!(table.get_row_with_time(id, T1).expect("boundary")["v"], Value::Integer(2));
    assert_eq!(
        table.get_row_with_time(id, "2014-12-31 23:59:59.999999").expect("just before")["v"],
        Value::Integer(1)
    );
    let err = table.get_row_with_time(id, "2009-12-31").expect_err("before creation");
    assert_eq!(err.code(), ErrorCode::RowDoesNotExist);
}

#[test]
fn updates_merge_with_the_current_version() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table
        .create_row_with_time(row! { "name" => "Alice", "age" => 35, "city" => "Oslo" }, T0)
        .expect("create");
    table
        .update_row_with_time(row! { "id" => id, "age" => 36, "city" => Value::Null }, T1)
        .expect("update");
    let current = table.get_row_with_time(id, T2).expect("current");
    assert_eq!(current["name"], Value::from("Alice"));
    assert_eq!(current["age"], Value::Integer(36));
    assert!(!current.contains_key("city"));
    // the earlier version is untouched
    assert_eq!(table.get_row_with_time(id, T0).expect("past")["city"], Value::from("Oslo"));
}

#[test]
fn updates_must_move_forward_in_time() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table.create_row_with_time(row! { "v" => 1 }, T1).expect("create");
    for t in [T0, T1] {
        let err = table.update_row_with_time(row! { "id" => id, "v" => 2 }, t).expect_err("not after");
        assert_eq!(err.code(), ErrorCode::InvalidTime);
    }
    let err = table.delete_row_with_time(id, T0).expect_err("delete before");
    assert_eq!(err.code(), ErrorCode::InvalidTime);
    assert_eq!(table.get_row_history(id).expect("history").len(), 1);
}

#[test]
fn malformed_times_are_rejected_before_writing() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let err = table.create_row_with_time(row! { "v" => 1 }, "last tuesday").expect_err("bad time");
    assert_eq!(err.code(), ErrorCode::InvalidTime);
    let err = table.create_row_with_time(row! { "v" => 1 }, END_OF_TIME).expect_err("end of time");
    assert_eq!(err.code(), ErrorCode::InvalidTime);
    assert!(table.inner().is_empty());
}

#[test]
fn deleted_rows_keep_their_history() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    assert_eq!(table.delete_row_with_time(id, T1).expect("delete"), 1);
    assert!(table.row_exists_with_time(id, "2012-01-01").expect("before delete"));
    assert!(!table.row_exists_with_time(id, T1).expect("at delete"));
    assert!(!table.row_exists_with_time(id, T2).expect("after delete"));
    assert!(!table.row_exists(id).expect("now"));
    assert_eq!(table.delete_row_with_time(id, T2).expect("delete again"), 0);
    assert_eq!(table.get_row_history(id).expect("history").len(), 1);
    let err = table.update_row_with_time(row! { "id" => id, "v" => 2 }, T2).expect_err("deleted");
    assert_eq!(err.code(), ErrorCode::RowDoesNotExist);
    assert!(table.check_consistency().expect("check").is_empty());
}

#[test]
fn unknown_ids_have_no_history() {
    let table = BitemporalTable::in_memory("t").expect("table");
    let err = table.get_row_history(7).expect_err("never existed");
    assert_eq!(err.code(), ErrorCode::RowDoesNotExist);
}

#[test]
fn ids_stay_taken_after_deletion() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let first = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    table.delete_row_with_time(first, T1).expect("delete");
    let err = table.create_row_with_time(row! { "id" => first, "v" => 2 }, T2).expect_err("reuse");
    assert_eq!(err.code(), ErrorCode::RowAlreadyExists);
    assert_eq!(table.create_row_with_time(row! { "v" => 3 }, T2).expect("next"), first + 1);
}

#[test]
fn reserved_columns_are_ignored_with_a_warning() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table
        .create_row_with_time(row! { "v" => 1, VALID_UNTIL => T1, "versionId" => 99 }, T0)
        .expect("create");
    let current = table.get_row_with_time(id, T2).expect("still current");
    assert_eq!(current[VALID_UNTIL], Value::from(END_OF_TIME));
    let warnings = table.take_warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.code == WarningCode::ReservedColumnIgnored));
}

#[test]
fn find_rows_with_time_matches_columns() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let alice = table.create_row_with_time(row! { "name" => "Alice" }, T0).expect("create");
    table.create_row_with_time(row! { "name" => "Bob" }, T0).expect("create");
    table.update_row_with_time(row! { "id" => alice, "name" => "Alicia" }, T1).expect("rename");
    assert_eq!(table.find_rows_with_time(&row! { "name" => "Alice" }, 0, "2012-01-01").expect("find").len(), 1);
    assert!(table.find_rows_with_time(&row! { "name" => "Alice" }, 0, T2).expect("find").is_empty());
    let found = table.find_rows_with_time(&row! { "name" => "Alicia" }, 0, T2).expect("find");
    assert_eq!(found.first().expect("first")["id"], Value::Integer(alice));
}

#[test]
fn or_search_stays_within_the_time_window() {
    let conn = Connection::open_in_memory().expect("conn");
    let mut table = BitemporalTable::sqlite(&conn, "t").expect("table");
    let a = table.create_row_with_time(row! { "x" => 1, "y" => 0 }, T0).expect("create");
    table.create_row_with_time(row! { "x" => 0, "y" => 2 }, T0).expect("create");
    table.create_row_with_time(row! { "x" => 0, "y" => 0 }, T0).expect("create");
    table.update_row_with_time(row! { "id" => a, "x" => 5 }, T1).expect("update");
    let spec = SearchSpec::new(vec![Condition::eq("x", 1), Condition::eq("y", 2)]);
    assert_eq!(table.search_with_time(&spec, Combinator::Or, 0, "2012-01-01").expect("search").len(), 2);
    assert_eq!(table.search_with_time(&spec, Combinator::Or, 0, T2).expect("search").len(), 1);
    assert_eq!(table.search_with_time(&spec, Combinator::Or, 1, "2012-01-01").expect("search").len(), 1);
}

#[test]
fn the_plain_contract_acts_now() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let before = Timestamp::now();
    let id = table.create_row(row! { "v" => 1 }).expect("create");
    assert_eq!(table.get_row(id).expect("get")["v"], Value::Integer(1));
    let created = Timestamp::try_from(&table.get_row(id).expect("get")[VALID_FROM]).expect("timestamp");
    assert!(created >= before);

    let spec = SearchSpec::new(vec![Condition::eq("v", 1)]);
    assert_eq!(table.search(&spec, Combinator::And, 0).expect("search").len(), 1);
    assert_eq!(table.get_unique_ids().expect("ids"), vec![id]);
    assert_eq!(table.get_max_id().expect("max"), id);
    assert_eq!(table.delete_row(id).expect("delete"), 1);
    assert!(table.get_unique_ids().expect("ids").is_empty());
    assert_eq!(table.get_row_history(id).expect("history").len(), 1);
}

#[test]
fn the_id_column_is_fixed_once_rows_exist() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    table.set_id_column("person").expect("empty table");
    let id = table.create_row_with_time(row! { "name" => "Alice" }, T0).expect("create");
    assert_eq!(table.get_row_with_time(id, T1).expect("get")["person"], Value::Integer(id));
    let err = table.set_id_column("other").expect_err("rows exist");
    assert_eq!(err.code(), ErrorCode::Config);
    let err = table.set_id_column(VALID_FROM).expect_err("reserved");
    assert_eq!(err.code(), ErrorCode::Config);
}

#[test]
fn versioned_searches_follow_id_order_in_memory() {
    ids_after_updating_a_lower_id(&mut BitemporalTable::in_memory("t").expect("table"));
}

#[test]
fn versioned_searches_follow_id_order_in_sqlite() {
    let conn = Connection::open_in_memory().expect("conn");
    ids_after_updating_a_lower_id(&mut BitemporalTable::sqlite(&conn, "t").expect("table"));
}

#[test]
fn deleting_at_the_end_of_time_is_refused() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    let err = table.delete_row_with_time(id, END_OF_TIME).expect_err("end of time");
    assert_eq!(err.code(), ErrorCode::InvalidTime);
    assert!(table.row_exists(id).expect("still current"));
    assert_eq!(table.get_row(id).expect("current")[VALID_UNTIL], Value::from(END_OF_TIME));
}

#[test]
fn plain_writes_right_after_a_create_succeed() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table.create_row(row! { "v" => 1 }).expect("create");
    table.update_row(row! { "id" => id, "v" => 2 }).expect("immediate update");
    table.update_row(row! { "id" => id, "v" => 3 }).expect("second update");
    assert_eq!(table.get_row(id).expect("current")["v"], Value::Integer(3));
    assert_eq!(table.delete_row(id).expect("immediate delete"), 1);

    let history = table.get_row_history(id).expect("history");
    assert_eq!(history.len(), 3);
    let froms: Vec<Timestamp> = history
        .iter()
        .map(|v| Timestamp::try_from(&v[VALID_FROM]).expect("timestamp"))
        .collect();
    assert!(froms.windows(2).all(|w| w[0] < w[1]));
    assert!(table.check_consistency().expect("check").is_empty());
}

#[test]
fn version_keys_cannot_be_searched() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    table.create_row_with_time(row! { "v" => 1 }, T0).expect("create");
    for column in ["versionId", "VERSIONID"] {
        let spec = SearchSpec::new(vec![Condition::eq("v", 1), Condition::eq(column, 1)]);
        let err = table.search_with_time(&spec, Combinator::Or, 0, T1).expect_err("version key");
        match err {
            TemporaError::InvalidSearchSpec { problems } => {
                assert_eq!(problems.len(), 1);
                assert_eq!(problems[0].spec_index, Some(1));
                assert_eq!(problems[0].code, ProblemCode::ReservedColumn);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
    // the interval columns are returned to callers and may be searched
    let spec = SearchSpec::new(vec![Condition::eq(VALID_FROM, T0)]);
    assert_eq!(table.search_with_time(&spec, Combinator::And, 0, T1).expect("search").len(), 1);
}

#[test]
fn reserved_columns_are_recognised_in_any_case() {
    let mut table = BitemporalTable::in_memory("t").expect("table");
    let id = table
        .create_row_with_time(row! { "v" => 1, "VALIDUNTIL" => T1 }, T0)
        .expect("create");
    assert_eq!(table.get_row_with_time(id, T2).expect("still current")[VALID_UNTIL], Value::from(END_OF_TIME));
    assert_eq!(table.take_warnings()[0].code, WarningCode::ReservedColumnIgnored);
}

#[test]
fn sqlite_tables_keyed_by_the_logical_id_are_refused() {
    let conn = Connection::open_in_memory().expect("conn");
    let store = SqliteStore::new(&conn, "h").expect("store");
    let err = BitemporalTable::new(store).expect_err("keyed by id");
    assert_eq!(err.code(), ErrorCode::Config);

    // the same table cannot be opened for versioning either
    let err = BitemporalTable::sqlite(&conn, "h").expect_err("keyed by id");
    assert_eq!(err.code(), ErrorCode::Config);

    let mut store = SqliteStore::new(&conn, "h").expect("reopen");
    assert_eq!(store.set_id_column("versionId").expect_err("re-key").code(), ErrorCode::Config);
    assert_eq!(store.id_column(), "id");
    assert_eq!(store.create_row(row! { "v" => 1 }).expect("still usable"), 1);
}
