// ==========================================
// 配置集成测试
// ==========================================
// 职责: 验证 config_kv 中的配置项对展开与排程生效
// ==========================================


use shopfloor_exec::api::{ProductionApi, SchedulingFilter};
use shopfloor_exec::config::{config_keys, ConfigManager};
use shopfloor_exec::db::open_shared_connection;
use shopfloor_exec::domain::types::{ASSEMBLY_GROUP, INSPECT_GROUP};
use shopfloor_exec::engine::{ConflictReason, ShopFloorRepositories};
use std::sync::Arc;

use test_helpers::*;

// ==========================================
// 测试辅助函数
// ==========================================

/// 基于真实 ConfigManager 构建 API
fn build_configured_api(db_path: &str) -> (ProductionApi, Arc<ConfigManager>) {
    let conn = open_shared_connection(db_path).unwrap();
    let repos = ShopFloorRepositories::from_connection(conn.clone()).unwrap();
    let config = Arc::new(ConfigManager::from_connection(conn).unwrap());
    let api = ProductionApi::new(repos, config.clone()).with_today(monday());
    (api, config)
}

#[test]
fn test_release_schedules_by_default() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.5, 0.1)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let (api, _config) = build_configured_api(&db_path);
    let response = api.release_order("O1").unwrap();

    let schedule = response.schedule.unwrap();
    assert_eq!(schedule.scheduled.len(), 1);
    assert_eq!(schedule.scheduled[0].scheduled_start, monday());
}

#[test]
fn test_release_without_scheduling_when_disabled() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.5, 0.1)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let (api, config) = build_configured_api(&db_path);
    config
        .set_global_config_value(config_keys::RESCHEDULE_ON_RELEASE, "false")
        .unwrap();

    let response = api.release_order("O1").unwrap();
    assert!(response.schedule.is_none());
    assert!(response.operations[0].scheduled_start.is_none());
}

#[test]
fn test_configured_horizon_bounds_placement() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.0, 0.8)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 1, None);
    insert_draft_order(&conn, "O2", "P1", 10.0, 2, None);

    let (api, config) = build_configured_api(&db_path);
    config
        .set_global_config_value(config_keys::RESCHEDULE_ON_RELEASE, "false")
        .unwrap();
    config
        .set_global_config_value(config_keys::HORIZON_DAYS, "0")
        .unwrap();
    api.release_order("O1").unwrap();
    api.release_order("O2").unwrap();

    let result = api
        .run_scheduling(&SchedulingFilter::default(), None, None)
        .unwrap();
    assert_eq!(result.scheduled.len(), 1);
    assert_eq!(result.scheduled[0].order_id, "O1");
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(
        result.conflicts[0].reason,
        ConflictReason::NoCapacityInHorizon
    );

    // 显式参数优先于配置
    let result = api
        .run_scheduling(&SchedulingFilter::default(), Some(1), None)
        .unwrap();
    assert_eq!(result.scheduled.len(), 1);
    assert_eq!(result.scheduled[0].order_id, "O2");
    assert_eq!(result.scheduled[0].scheduled_start, date(2026, 10, 27));
}

#[test]
fn test_inspection_keywords_drive_grouping() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    seed_two_component_assembly(&conn);
    insert_draft_order(&conn, "O1", "ASM", 1.0, 5, None);

    let (api, config) = build_configured_api(&db_path);
    let drafts = api.explode_routing("O1").unwrap();
    assert_eq!(drafts[4].operation_group.as_deref(), Some(INSPECT_GROUP));

    // 关键字替换后 "Final inspect" / "QC cell" 均不再命中
    config
        .set_global_config_value(config_keys::INSPECTION_KEYWORDS, r#"["deburr"]"#)
        .unwrap();
    let drafts = api.explode_routing("O1").unwrap();
    assert_eq!(drafts[4].operation_group.as_deref(), Some(ASSEMBLY_GROUP));
    assert!(!drafts[4].is_inspection);
}

#[test]
fn test_group_key_length_is_configurable() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    seed_two_component_assembly(&conn);
    insert_draft_order(&conn, "O1", "ASM", 1.0, 5, None);

    let (api, config) = build_configured_api(&db_path);
    config
        .set_global_config_value(config_keys::MAX_GROUP_KEY_LEN, "2")
        .unwrap();

    let drafts = api.explode_routing("O1").unwrap();
    assert_eq!(drafts[0].operation_group.as_deref(), Some("PN"));
    assert_eq!(drafts[2].operation_group.as_deref(), Some("PN"));
}

#[test]
fn test_snapshot_reflects_overrides() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let (_api, config) = build_configured_api(&db_path);
    config
        .set_global_config_value(config_keys::OPTIMIZE_SETUP, "true")
        .unwrap();

    let snapshot: serde_json::Value =
        serde_json::from_str(&config.get_config_snapshot().unwrap()).unwrap();
    assert_eq!(snapshot[config_keys::OPTIMIZE_SETUP], "true");
}
