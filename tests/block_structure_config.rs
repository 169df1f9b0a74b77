mod support;

use support::{json_bool, json_i64, json_str};

#[test]
fn accessors_return_defaults_with_no_row_and_no_switches() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    let effective =
        campus_hub_lib::test_support::block_structure_effective_json().expect("effective");
    assert_eq!(json_i64(&effective, "num_versions_to_keep"), 5);
    assert_eq!(json_i64(&effective, "cache_timeout_in_seconds"), 86400);
}

#[test]
fn admin_update_is_visible_to_the_next_request() {
    let _env = support::TestEnv::new();
    campus_hub_lib::test_support::init_db().expect("init db");

    campus_hub_lib::test_support::block_structure_update(Some(2), Some(600)).expect("update");
    let effective =
        campus_hub_lib::test_support::block_structure_effective_json().expect("effective");
    assert_eq!(json_i64(&effective, "num_versions_to_keep"), 2);
    assert_eq!(json_i64(&effective, "cache_timeout_in_seconds"), 600);

    // A later write replaces the current row for subsequent requests.
    campus_hub_lib::test_support::block_structure_update(Some(10), Some(1200)).expect("update");
    let effective =
        campus_hub_lib::test_support::block_structure_effective_json().expect("effective");
    assert_eq!(json_i64(&effective, "num_versions_to_keep"), 10);
    assert_eq!(json_i64(&effective, "cache_timeout_in_seconds"), 1200);
}

#[test]
fn config_endpoint_reports_defaults_and_switch_states() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    let probe = gateway.get("/config/block-structure").expect("probe");
    assert_eq!(probe.status, 200);

    let body: serde_json::Value = serde_json::from_str(&probe.body).expect("json body");
    assert_eq!(json_i64(&body, "num_versions_to_keep"), 5);
    assert_eq!(json_i64(&body, "cache_timeout_in_seconds"), 86400);

    let switches = body
        .get("switches")
        .and_then(|v| v.as_array())
        .expect("switches");
    assert_eq!(switches.len(), 4);
    for switch in switches {
        assert!(!json_bool(switch, "enabled"), "expected default-off: {switch}");
    }
}

#[test]
fn enabling_a_switch_is_reflected_by_the_endpoint() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    gateway
        .set_switch("block_structure", "prune_old_versions", true)
        .expect("enable switch");

    let probe = gateway.get("/config/block-structure").expect("probe");
    let body: serde_json::Value = serde_json::from_str(&probe.body).expect("json body");
    let switches = body
        .get("switches")
        .and_then(|v| v.as_array())
        .expect("switches");

    for switch in switches {
        let expected = json_str(switch, "name") == "prune_old_versions";
        assert_eq!(json_bool(switch, "enabled"), expected, "switch: {switch}");
    }
}

#[test]
fn config_endpoint_sees_admin_updates() {
    let _env = support::TestEnv::new();
    let gateway = campus_hub_lib::test_support::TestGateway::start().expect("start gateway");

    gateway
        .update_block_structure(Some(3), Some(900))
        .expect("update config");

    let probe = gateway.get("/config/block-structure").expect("probe");
    let body: serde_json::Value = serde_json::from_str(&probe.body).expect("json body");
    assert_eq!(json_i64(&body, "num_versions_to_keep"), 3);
    assert_eq!(json_i64(&body, "cache_timeout_in_seconds"), 900);
}
