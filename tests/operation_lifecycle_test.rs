// ==========================================
// 工序生命周期集成测试
// ==========================================
// 职责: 验证下达 → 分组放行 → 开工/报工/暂停/恢复 → 订单完工 的全流程落库
// ==========================================


use shopfloor_exec::api::{ApiError, ProductionApi};
use shopfloor_exec::engine::TransitionPayload;
use shopfloor_exec::repository::ProductionOrderRepository;
use shopfloor_exec::{OperationStatus, OrderStatus, TransitionAction};

use test_helpers::*;

// ==========================================
// 测试辅助函数
// ==========================================

/// 下达订单并返回 序号 → 工序ID
fn release(api: &ProductionApi, order_id: &str) -> Vec<(i32, String)> {
    let response = api.release_order(order_id).unwrap();
    assert_eq!(response.order.status, OrderStatus::Released);
    assert!(response.order.released_at.is_some());
    response
        .operations
        .iter()
        .map(|op| (op.sequence, op.operation_id.clone()))
        .collect()
}

fn id_of(ids: &[(i32, String)], sequence: i32) -> String {
    ids.iter()
        .find(|(seq, _)| *seq == sequence)
        .map(|(_, id)| id.clone())
        .unwrap()
}

fn actor(name: &str) -> TransitionPayload {
    TransitionPayload {
        actor: Some(name.to_string()),
        ..Default::default()
    }
}

fn report(quantity: f64) -> TransitionPayload {
    TransitionPayload {
        actor: Some("op-a".to_string()),
        quantity_complete: Some(quantity),
        ..Default::default()
    }
}

fn start_and_finish(api: &ProductionApi, operation_id: &str, quantity: f64) -> Vec<String> {
    api.transition(operation_id, TransitionAction::Start, actor("op-a"))
        .unwrap();
    api.transition(operation_id, TransitionAction::Complete, report(quantity))
        .unwrap()
        .outcome
        .released_operation_ids
}

// ==========================================
// 分组放行
// ==========================================

#[test]
fn test_release_promotes_first_component_group_only() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    seed_two_component_assembly(&conn);
    insert_draft_order(&conn, "O1", "ASM", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    release(&api, "O1");

    assert_eq!(
        operation_statuses(&conn, "O1"),
        vec![
            (10, "READY".to_string()),
            (20, "READY".to_string()),
            (30, "PENDING".to_string()),
            (40, "PENDING".to_string()),
            (50, "PENDING".to_string()),
        ]
    );
}

#[test]
fn test_release_twice_is_rejected() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    seed_two_component_assembly(&conn);
    insert_draft_order(&conn, "O1", "ASM", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    release(&api, "O1");
    assert!(matches!(
        api.release_order("O1"),
        Err(ApiError::InvalidStateTransition(_))
    ));
    assert_eq!(operation_statuses(&conn, "O1").len(), 5);
}

#[test]
fn test_wave_release_through_to_order_completion() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    seed_two_component_assembly(&conn);
    insert_draft_order(&conn, "O1", "ASM", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    let ids = release(&api, "O1");

    // 下一组尚未放行
    let err = api
        .transition(&id_of(&ids, 30), TransitionAction::Start, actor("op-a"))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition(_)));

    // 开工后订单进入生产中
    let response = api
        .transition(&id_of(&ids, 10), TransitionAction::Start, actor("op-a"))
        .unwrap();
    assert_eq!(response.order.status, OrderStatus::InProgress);
    assert_eq!(response.operation.started_by.as_deref(), Some("op-a"));
    assert!(response.availability.contains_key("MILL"));

    // 组内未全部完工不放行
    let response = api
        .transition(&id_of(&ids, 10), TransitionAction::Complete, report(10.0))
        .unwrap();
    assert_eq!(response.operation.status, OperationStatus::Complete);
    assert!(response.outcome.released_operation_ids.is_empty());

    // PN-X 组完工 → PN-Y 放行
    let released = start_and_finish(&api, &id_of(&ids, 20), 10.0);
    assert_eq!(released, vec![id_of(&ids, 30)]);
    assert_eq!(operation_statuses(&conn, "O1")[2], (30, "READY".to_string()));

    // PN-Y → ASSEMBLY → INSPECT
    let released = start_and_finish(&api, &id_of(&ids, 30), 10.0);
    assert_eq!(released, vec![id_of(&ids, 40)]);
    let released = start_and_finish(&api, &id_of(&ids, 40), 10.0);
    assert_eq!(released, vec![id_of(&ids, 50)]);

    api.transition(&id_of(&ids, 50), TransitionAction::Start, actor("qc-1"))
        .unwrap();
    let response = api
        .transition(&id_of(&ids, 50), TransitionAction::Complete, report(10.0))
        .unwrap();
    assert_eq!(response.order.status, OrderStatus::Complete);
    assert_eq!(
        response.outcome.order_status_change,
        Some((OrderStatus::InProgress, OrderStatus::Complete))
    );

    let orders = ProductionOrderRepository::new(&db_path).unwrap();
    let order = orders.get_order("O1").unwrap();
    assert_eq!(order.status, OrderStatus::Complete);
    assert!(order.completed_at.is_some());
    assert!(operation_statuses(&conn, "O1")
        .iter()
        .all(|(_, status)| status == "COMPLETE"));
}

// ==========================================
// 报工
// ==========================================

#[test]
fn test_partial_report_accumulates_hours_and_notes() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.5, 0.1)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    let ids = release(&api, "O1");
    let op_id = id_of(&ids, 10);
    api.transition(&op_id, TransitionAction::Start, actor("op-a"))
        .unwrap();

    let response = api
        .transition(
            &op_id,
            TransitionAction::Complete,
            TransitionPayload {
                quantity_complete: Some(4.0),
                setup_hours: Some(0.5),
                run_hours: Some(0.4),
                notes: Some("first shift".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(response.operation.status, OperationStatus::InProgress);
    assert!(response.outcome.affected_work_centers.is_empty());

    api.transition(
        &op_id,
        TransitionAction::Complete,
        TransitionPayload {
            actor: Some("op-b".to_string()),
            quantity_complete: Some(10.0),
            quantity_scrapped: Some(1.0),
            run_hours: Some(0.6),
            notes: Some("second shift".to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    let orders = ProductionOrderRepository::new(&db_path).unwrap();
    let op = orders.find_operation(&op_id).unwrap().unwrap();
    assert_eq!(op.status, OperationStatus::Complete);
    assert!((op.actual_setup_hours - 0.5).abs() < 1e-9);
    assert!((op.actual_run_hours - 1.0).abs() < 1e-9);
    assert!((op.quantity_complete - 10.0).abs() < 1e-9);
    assert!((op.quantity_scrapped - 1.0).abs() < 1e-9);
    assert_eq!(op.completed_by.as_deref(), Some("op-b"));
    assert_eq!(op.notes.as_deref(), Some("first shift\nsecond shift"));
    assert!(op.actual_end.is_some());

    // 单工序订单随之完工
    assert_eq!(orders.get_order("O1").unwrap().status, OrderStatus::Complete);
}

#[test]
fn test_invalid_quantities_are_rejected_without_write() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.5, 0.1)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    let ids = release(&api, "O1");
    let op_id = id_of(&ids, 10);
    api.transition(&op_id, TransitionAction::Start, actor("op-a"))
        .unwrap();

    for quantity in [11.0, -1.0, f64::NAN] {
        let err = api
            .transition(&op_id, TransitionAction::Complete, report(quantity))
            .unwrap_err();
        assert!(
            matches!(err, ApiError::ValidationError(_)),
            "quantity {} should be rejected, got {:?}",
            quantity,
            err
        );
    }

    // 缺少数量
    let err = api
        .transition(&op_id, TransitionAction::Complete, actor("op-a"))
        .unwrap_err();
    assert!(matches!(err, ApiError::ValidationError(_)));

    let orders = ProductionOrderRepository::new(&db_path).unwrap();
    let op = orders.find_operation(&op_id).unwrap().unwrap();
    assert_eq!(op.status, OperationStatus::InProgress);
    assert_eq!(op.quantity_complete, 0.0);
}

#[test]
fn test_complete_requires_in_progress() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.5, 0.1)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    let ids = release(&api, "O1");

    let err = api
        .transition(&id_of(&ids, 10), TransitionAction::Complete, report(10.0))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition(_)));
}

// ==========================================
// 暂停 / 恢复 / 订单门禁
// ==========================================

#[test]
fn test_hold_and_resume_restore_the_right_state() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(
        &conn,
        "P1",
        &[(10, "MILL", "Rough", 0.5, 0.1), (20, "MILL", "Finish", 0.5, 0.1)],
    );
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    let ids = release(&api, "O1");
    let first = id_of(&ids, 10);
    let second = id_of(&ids, 20);

    // 无分组工序严格顺序: 仅首道 READY
    assert_eq!(
        operation_statuses(&conn, "O1"),
        vec![(10, "READY".to_string()), (20, "PENDING".to_string())]
    );

    // 未放行工序恢复后回到 PENDING
    api.transition(&second, TransitionAction::Hold, actor("sup"))
        .unwrap();
    let response = api
        .transition(&second, TransitionAction::Resume, actor("sup"))
        .unwrap();
    assert_eq!(response.operation.status, OperationStatus::Pending);

    // 活动分组内未开工工序恢复后回到 READY
    api.transition(&first, TransitionAction::Hold, actor("sup"))
        .unwrap();
    let response = api
        .transition(&first, TransitionAction::Resume, actor("sup"))
        .unwrap();
    assert_eq!(response.operation.status, OperationStatus::Ready);

    // 已开工工序恢复后回到 IN_PROGRESS
    api.transition(&first, TransitionAction::Start, actor("op-a"))
        .unwrap();
    let response = api
        .transition(&first, TransitionAction::Hold, actor("sup"))
        .unwrap();
    assert_eq!(response.operation.status, OperationStatus::OnHold);
    let response = api
        .transition(&first, TransitionAction::Resume, actor("sup"))
        .unwrap();
    assert_eq!(response.operation.status, OperationStatus::InProgress);

    // 非暂停状态不可恢复
    assert!(matches!(
        api.transition(&first, TransitionAction::Resume, actor("sup")),
        Err(ApiError::InvalidStateTransition(_))
    ));
}

#[test]
fn test_start_is_blocked_while_order_not_active() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let conn = open_conn(&db_path);
    insert_work_center(&conn, "MILL", 8.0);
    seed_simple_part(&conn, "P1", &[(10, "MILL", "Mill", 0.5, 0.1)]);
    insert_draft_order(&conn, "O1", "P1", 10.0, 5, None);

    let api = build_api(&db_path, MockConfig::default(), monday());
    let ids = release(&api, "O1");

    conn.execute(
        "UPDATE production_order SET status = 'ON_HOLD' WHERE order_id = 'O1'",
        [],
    )
    .unwrap();

    let err = api
        .transition(&id_of(&ids, 10), TransitionAction::Start, actor("op-a"))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition(_)));
    assert_eq!(operation_statuses(&conn, "O1")[0], (10, "READY".to_string()));
}

#[test]
fn test_unknown_operation_is_not_found() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let api = build_api(&db_path, MockConfig::default(), monday());
    assert!(matches!(
        api.transition("missing", TransitionAction::Start, TransitionPayload::default()),
        Err(ApiError::NotFound(_))
    ));
}
