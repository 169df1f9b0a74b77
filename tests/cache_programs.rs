mod support;

use support::{json_bool, json_i64};

fn sample_programs() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({"uuid": "11111111-aaaa", "title": "Data Science"}),
        serde_json::json!({"uuid": "22222222-bbbb", "title": "Statistics"}),
        serde_json::json!({"uuid": "33333333-cccc", "title": "Economics"}),
    ]
}

#[test]
fn skips_when_integration_is_unconfigured() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    let summary =
        campus_hub_lib::test_support::cache_programs_unconfigured(true).expect("run command");
    assert!(summary.is_null());
    assert_eq!(
        campus_hub_lib::test_support::program_cache_entry_count().expect("count"),
        0
    );
}

#[test]
fn skips_when_integration_is_disabled() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    let summary =
        campus_hub_lib::test_support::cache_programs_disabled(true).expect("run command");
    assert!(summary.is_null());
    assert_eq!(
        campus_hub_lib::test_support::program_cache_entry_count().expect("count"),
        0
    );
}

#[test]
fn dry_run_fetches_every_page_but_writes_nothing() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    // page_size 2 forces the fetch to follow a `next` link.
    let summary =
        campus_hub_lib::test_support::cache_programs_with_stub(sample_programs(), 2, false)
            .expect("run command");

    assert_eq!(json_i64(&summary, "total"), 3);
    assert_eq!(json_i64(&summary, "written"), 3);
    assert!(!json_bool(&summary, "committed"));
    assert_eq!(
        campus_hub_lib::test_support::program_cache_entry_count().expect("count"),
        0
    );
}

#[test]
fn commit_writes_each_program_and_the_uuid_list() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    let summary =
        campus_hub_lib::test_support::cache_programs_with_stub(sample_programs(), 2, true)
            .expect("run command");

    assert_eq!(json_i64(&summary, "total"), 3);
    assert_eq!(json_i64(&summary, "written"), 3);
    assert!(json_bool(&summary, "committed"));

    // Three program entries plus the uuid list.
    assert_eq!(
        campus_hub_lib::test_support::program_cache_entry_count().expect("count"),
        4
    );

    let cached = campus_hub_lib::test_support::program_cache_get_json("program.11111111-aaaa")
        .expect("get")
        .expect("entry");
    assert_eq!(cached["title"], "Data Science");

    let uuids = campus_hub_lib::test_support::cached_program_uuids().expect("uuids");
    assert_eq!(
        uuids,
        vec![
            "11111111-aaaa".to_string(),
            "22222222-bbbb".to_string(),
            "33333333-cccc".to_string()
        ]
    );
}

#[test]
fn rerun_overwrites_instead_of_duplicating_entries() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    campus_hub_lib::test_support::cache_programs_with_stub(sample_programs(), 2, true)
        .expect("first run");
    campus_hub_lib::test_support::cache_programs_with_stub(sample_programs(), 2, true)
        .expect("second run");

    assert_eq!(
        campus_hub_lib::test_support::program_cache_entry_count().expect("count"),
        4
    );
}
