// ==========================================
// 生产排程与车间执行引擎 - 工序状态机
// ==========================================
// 职责: 工序状态流转 + 分组波次放行
// 状态: PENDING → READY → IN_PROGRESS → COMPLETE, ON_HOLD 分支
// 红线:
// - 分组订单: 仅当前活动分组可开工, 组内允许并行
// - 未分组订单: 前序全部完工才可开工
// - quantity_complete 不超过订单数量
// ==========================================

use crate::domain::order::{Operation, ProductionOrder};
use crate::domain::types::{OperationStatus, OrderStatus, TransitionAction};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

// ==========================================
// 状态转换表
// ==========================================

/// 状态转换表: (当前状态, 动作) → 目标状态 | 拒绝
///
/// - Complete 的目标为 COMPLETE, 部分完工时由状态机保持 IN_PROGRESS
/// - Resume 的目标为 READY, 已开工时由状态机改为 IN_PROGRESS
pub fn transition_table(
    current: OperationStatus,
    action: TransitionAction,
) -> Option<OperationStatus> {
    use OperationStatus::*;

    match (current, action) {
        (Ready | InProgress, TransitionAction::Start) => Some(InProgress),
        (InProgress, TransitionAction::Complete) => Some(Complete),
        (Pending | Ready | InProgress, TransitionAction::Hold) => Some(OnHold),
        (OnHold, TransitionAction::Resume) => Some(Ready),
        _ => None,
    }
}

// ==========================================
// TransitionPayload - 动作参数
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub actor: Option<String>,
    pub quantity_complete: Option<f64>, // 累计完工数 (调用方给出的总数, 非增量)
    pub quantity_scrapped: Option<f64>, // 累计报废数
    pub setup_hours: Option<f64>,       // 本次实际准备工时 (累加)
    pub run_hours: Option<f64>,         // 本次实际加工工时 (累加)
    pub notes: Option<String>,
}

// ==========================================
// TransitionOutcome - 转换结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub operation_id: String,
    pub action: TransitionAction,
    pub previous_status: OperationStatus,
    pub new_status: OperationStatus,
    pub released_operation_ids: Vec<String>,           // 本次放行为 READY 的工序
    pub order_status_change: Option<(OrderStatus, OrderStatus)>,
    pub affected_work_centers: Vec<String>,            // 需重算可用率的工作中心
}

// ==========================================
// OrderWorkset - 订单及其工序
// ==========================================
#[derive(Debug, Clone)]
pub struct OrderWorkset {
    pub order: ProductionOrder,
    pub operations: Vec<Operation>,
}

impl OrderWorkset {
    /// 创建工作集 (工序按序号排序)
    pub fn new(order: ProductionOrder, mut operations: Vec<Operation>) -> Self {
        operations.sort_by_key(|op| op.sequence);
        Self { order, operations }
    }

    fn position(&self, operation_id: &str) -> EngineResult<usize> {
        self.operations
            .iter()
            .position(|op| op.operation_id == operation_id)
            .ok_or_else(|| EngineError::OperationNotInOrder {
                operation_id: operation_id.to_string(),
                order_id: self.order.order_id.clone(),
            })
    }

    pub fn operation(&self, operation_id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.operation_id == operation_id)
    }
}

// ==========================================
// GroupIndex - 分组聚合
// ==========================================
// 每次变更后构建一次, 之后分组查询为 O(1)
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    groups: HashMap<String, GroupStats>,
    active_group: Option<String>,
    first_incomplete_sequence: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupStats {
    pub min_sequence: i32,
    pub total: usize,
    pub completed: usize,
    pub members: Vec<usize>, // 工序下标
}

impl GroupStats {
    pub fn remaining(&self) -> usize {
        self.total - self.completed
    }
}

impl GroupIndex {
    /// 由订单工序构建分组聚合
    pub fn build(operations: &[Operation]) -> Self {
        let mut groups: HashMap<String, GroupStats> = HashMap::new();
        let mut first_incomplete: Option<(i32, String)> = None;

        for (index, op) in operations.iter().enumerate() {
            let key = op.group_key();
            let stats = groups.entry(key.clone()).or_insert_with(|| GroupStats {
                min_sequence: op.sequence,
                ..GroupStats::default()
            });
            stats.min_sequence = stats.min_sequence.min(op.sequence);
            stats.total += 1;
            stats.members.push(index);

            if op.is_complete() {
                stats.completed += 1;
            } else if first_incomplete
                .as_ref()
                .map(|(sequence, _)| op.sequence < *sequence)
                .unwrap_or(true)
            {
                first_incomplete = Some((op.sequence, key));
            }
        }

        let (first_incomplete_sequence, active_group) = match first_incomplete {
            Some((sequence, key)) => (Some(sequence), Some(key)),
            None => (None, None),
        };

        Self {
            groups,
            active_group,
            first_incomplete_sequence,
        }
    }

    /// 当前活动分组 (未完工工序中序号最小者所在分组)
    pub fn active_group(&self) -> Option<&str> {
        self.active_group.as_deref()
    }

    /// 未完工工序中的最小序号
    pub fn first_incomplete_sequence(&self) -> Option<i32> {
        self.first_incomplete_sequence
    }

    pub fn group(&self, key: &str) -> Option<&GroupStats> {
        self.groups.get(key)
    }

    /// 分组是否全部完工
    pub fn is_group_complete(&self, key: &str) -> bool {
        self.groups
            .get(key)
            .map(|stats| stats.remaining() == 0)
            .unwrap_or(true)
    }

    /// 订单工序是否全部完工
    pub fn all_complete(&self) -> bool {
        self.active_group.is_none()
    }
}

// ==========================================
// OperationStateMachine - 工序状态机
// ==========================================
pub struct OperationStateMachine {
    // 无状态引擎
}

impl OperationStateMachine {
    pub fn new() -> Self {
        Self {}
    }

    /// 放行活动分组: 活动分组内 PENDING 工序 → READY
    ///
    /// 用于订单下达时的首波放行, 以及分组完工后的下一波放行
    ///
    /// # 返回
    /// 被放行的工序ID
    pub fn release_active_group(&self, workset: &mut OrderWorkset) -> Vec<String> {
        let index = GroupIndex::build(&workset.operations);
        let Some(active) = index.active_group() else {
            return Vec::new();
        };
        let Some(stats) = index.group(active) else {
            return Vec::new();
        };

        let mut released = Vec::new();
        for &member in &stats.members {
            let op = &mut workset.operations[member];
            if op.status == OperationStatus::Pending {
                op.status = OperationStatus::Ready;
                released.push(op.operation_id.clone());
            }
        }

        debug!(
            order_id = %workset.order.order_id,
            active_group = %active,
            released = released.len(),
            "分组放行"
        );
        released
    }

    /// 执行动作
    pub fn apply(
        &self,
        workset: &mut OrderWorkset,
        operation_id: &str,
        action: TransitionAction,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> EngineResult<TransitionOutcome> {
        match action {
            TransitionAction::Start => self.start(workset, operation_id, payload, now),
            TransitionAction::Complete => self.complete(workset, operation_id, payload, now),
            TransitionAction::Hold => self.hold(workset, operation_id, payload),
            TransitionAction::Resume => self.resume(workset, operation_id, payload),
        }
    }

    /// 开工
    pub fn start(
        &self,
        workset: &mut OrderWorkset,
        operation_id: &str,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> EngineResult<TransitionOutcome> {
        let position = workset.position(operation_id)?;
        ensure_order_active(&workset.order)?;

        let previous = workset.operations[position].status;
        let next = checked_transition(previous, TransitionAction::Start)?;

        let index = GroupIndex::build(&workset.operations);
        let op = &workset.operations[position];
        let key = op.group_key();
        if index.active_group() != Some(key.as_str()) {
            let active = index.active_group().unwrap_or_default().to_string();
            return Err(if op.operation_group.is_none() {
                EngineError::PredecessorIncomplete {
                    sequence: op.sequence,
                    blocking_sequence: index.first_incomplete_sequence().unwrap_or(op.sequence),
                }
            } else {
                EngineError::GroupNotReleased {
                    group: key,
                    active_group: active,
                }
            });
        }

        let op = &mut workset.operations[position];
        op.status = next;
        if op.actual_start.is_none() {
            op.actual_start = Some(now);
            op.started_by = payload.actor.clone();
        }
        append_notes(op, payload.notes.as_deref());
        let work_center_id = op.work_center_id.clone();

        let order_status_change = if workset.order.status == OrderStatus::Released {
            workset.order.status = OrderStatus::InProgress;
            Some((OrderStatus::Released, OrderStatus::InProgress))
        } else {
            None
        };

        info!(
            order_id = %workset.order.order_id,
            operation_id = %operation_id,
            "工序开工"
        );

        Ok(TransitionOutcome {
            operation_id: operation_id.to_string(),
            action: TransitionAction::Start,
            previous_status: previous,
            new_status: next,
            released_operation_ids: Vec::new(),
            order_status_change,
            affected_work_centers: vec![work_center_id],
        })
    }

    /// 报工 / 完工
    ///
    /// quantity_complete 为调用方给出的累计数; 达到订单数量即完工
    pub fn complete(
        &self,
        workset: &mut OrderWorkset,
        operation_id: &str,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> EngineResult<TransitionOutcome> {
        let position = workset.position(operation_id)?;
        ensure_order_active(&workset.order)?;

        let ordered = workset.order.quantity_ordered;
        let quantity = payload.quantity_complete.ok_or_else(|| EngineError::InvalidQuantity {
            field: "quantity_complete".to_string(),
            value: f64::NAN,
            reason: "缺少完工数量".to_string(),
        })?;
        validate_quantity("quantity_complete", quantity, Some(ordered))?;
        if let Some(scrapped) = payload.quantity_scrapped {
            validate_quantity("quantity_scrapped", scrapped, None)?;
        }
        if let Some(hours) = payload.setup_hours {
            validate_quantity("setup_hours", hours, None)?;
        }
        if let Some(hours) = payload.run_hours {
            validate_quantity("run_hours", hours, None)?;
        }

        let previous = workset.operations[position].status;
        checked_transition(previous, TransitionAction::Complete)?;

        let op = &mut workset.operations[position];
        op.actual_setup_hours += payload.setup_hours.unwrap_or(0.0);
        op.actual_run_hours += payload.run_hours.unwrap_or(0.0);
        op.quantity_complete = quantity;
        if let Some(scrapped) = payload.quantity_scrapped {
            op.quantity_scrapped = scrapped;
        }
        append_notes(op, payload.notes.as_deref());

        if quantity < ordered {
            debug!(
                operation_id = %operation_id,
                quantity_complete = quantity,
                quantity_ordered = ordered,
                "部分报工"
            );
            return Ok(TransitionOutcome {
                operation_id: operation_id.to_string(),
                action: TransitionAction::Complete,
                previous_status: previous,
                new_status: op.status,
                released_operation_ids: Vec::new(),
                order_status_change: None,
                affected_work_centers: Vec::new(),
            });
        }

        op.status = OperationStatus::Complete;
        op.actual_end = Some(now);
        op.completed_by = payload.actor.clone();
        let group_key = op.group_key();

        let mut affected: BTreeSet<String> = BTreeSet::new();
        affected.insert(op.work_center_id.clone());

        let index = GroupIndex::build(&workset.operations);
        let mut released = Vec::new();
        let mut order_status_change = None;

        if index.all_complete() {
            let before = workset.order.status;
            workset.order.status = OrderStatus::Complete;
            workset.order.completed_at = Some(now);
            order_status_change = Some((before, OrderStatus::Complete));
            info!(order_id = %workset.order.order_id, "订单全部工序完工");
        } else if index.is_group_complete(&group_key) {
            released = self.release_active_group(workset);
            for id in &released {
                if let Some(op) = workset.operation(id) {
                    affected.insert(op.work_center_id.clone());
                }
            }
        }

        info!(
            order_id = %workset.order.order_id,
            operation_id = %operation_id,
            released = released.len(),
            "工序完工"
        );

        Ok(TransitionOutcome {
            operation_id: operation_id.to_string(),
            action: TransitionAction::Complete,
            previous_status: previous,
            new_status: OperationStatus::Complete,
            released_operation_ids: released,
            order_status_change,
            affected_work_centers: affected.into_iter().collect(),
        })
    }

    /// 暂停
    pub fn hold(
        &self,
        workset: &mut OrderWorkset,
        operation_id: &str,
        payload: &TransitionPayload,
    ) -> EngineResult<TransitionOutcome> {
        let position = workset.position(operation_id)?;
        let op = &mut workset.operations[position];
        let previous = op.status;
        let next = checked_transition(previous, TransitionAction::Hold)?;

        op.status = next;
        append_notes(op, payload.notes.as_deref());

        Ok(TransitionOutcome {
            operation_id: operation_id.to_string(),
            action: TransitionAction::Hold,
            previous_status: previous,
            new_status: next,
            released_operation_ids: Vec::new(),
            order_status_change: None,
            affected_work_centers: Vec::new(),
        })
    }

    /// 恢复
    ///
    /// 已开工 → IN_PROGRESS; 未开工且属于活动分组 → READY; 否则 → PENDING
    pub fn resume(
        &self,
        workset: &mut OrderWorkset,
        operation_id: &str,
        payload: &TransitionPayload,
    ) -> EngineResult<TransitionOutcome> {
        let position = workset.position(operation_id)?;
        let previous = workset.operations[position].status;
        checked_transition(previous, TransitionAction::Resume)?;

        let index = GroupIndex::build(&workset.operations);
        let op = &mut workset.operations[position];
        let next = if op.has_started() {
            OperationStatus::InProgress
        } else if index.active_group() == Some(op.group_key().as_str()) {
            OperationStatus::Ready
        } else {
            OperationStatus::Pending
        };

        op.status = next;
        append_notes(op, payload.notes.as_deref());

        Ok(TransitionOutcome {
            operation_id: operation_id.to_string(),
            action: TransitionAction::Resume,
            previous_status: previous,
            new_status: next,
            released_operation_ids: Vec::new(),
            order_status_change: None,
            affected_work_centers: Vec::new(),
        })
    }
}

impl Default for OperationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn checked_transition(
    current: OperationStatus,
    action: TransitionAction,
) -> EngineResult<OperationStatus> {
    transition_table(current, action).ok_or_else(|| EngineError::InvalidStateTransition {
        from: current.to_string(),
        action: action.to_string(),
    })
}

fn ensure_order_active(order: &ProductionOrder) -> EngineResult<()> {
    if order.status.is_schedulable() {
        Ok(())
    } else {
        Err(EngineError::OrderNotActive {
            order_id: order.order_id.clone(),
            status: order.status.to_string(),
        })
    }
}

/// 数量校验: 有限, 非负, 可选上限
pub fn validate_quantity(field: &str, value: f64, upper: Option<f64>) -> EngineResult<()> {
    let reason = if !value.is_finite() {
        Some("必须为有限数".to_string())
    } else if value < 0.0 {
        Some("不能为负数".to_string())
    } else {
        match upper {
            Some(limit) if value > limit => Some(format!("超过订单数量 {}", limit)),
            _ => None,
        }
    };

    match reason {
        Some(reason) => Err(EngineError::InvalidQuantity {
            field: field.to_string(),
            value,
            reason,
        }),
        None => Ok(()),
    }
}

fn append_notes(op: &mut Operation, notes: Option<&str>) {
    let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return;
    };
    op.notes = Some(match op.notes.take() {
        Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, notes),
        _ => notes.to_string(),
    });
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OperationDraft;

    fn order(quantity: f64) -> ProductionOrder {
        ProductionOrder {
            order_id: "O1".to_string(),
            order_number: "MO-0001".to_string(),
            part_id: "ASM".to_string(),
            quantity_ordered: quantity,
            status: OrderStatus::Released,
            priority: 5,
            due_date: None,
            released_at: None,
            completed_at: None,
        }
    }

    fn op(sequence: i32, group: Option<&str>, wc: &str) -> Operation {
        let mut op = OperationDraft {
            sequence,
            component_part_id: None,
            operation_group: group.map(|g| g.to_string()),
            work_center_id: wc.to_string(),
            name: format!("OP{}", sequence),
            description: None,
            is_inspection: false,
            setup_hours: 1.0,
            run_hours: 2.0,
        }
        .into_operation("O1");
        op.operation_id = format!("op{}", sequence);
        op
    }

    /// X, Y 组件 + ASSEMBLY + INSPECT
    fn grouped_workset() -> OrderWorkset {
        let mut ws = OrderWorkset::new(
            order(5.0),
            vec![
                op(10, Some("X"), "WC1"),
                op(20, Some("Y"), "WC2"),
                op(30, Some("ASSEMBLY"), "WC3"),
                op(40, Some("INSPECT"), "WC3"),
            ],
        );
        OperationStateMachine::new().release_active_group(&mut ws);
        ws
    }

    fn simple_workset() -> OrderWorkset {
        let mut ws = OrderWorkset::new(
            order(5.0),
            vec![op(10, None, "WC1"), op(20, None, "WC2"), op(30, None, "WC1")],
        );
        OperationStateMachine::new().release_active_group(&mut ws);
        ws
    }

    fn finish(quantity: f64) -> TransitionPayload {
        TransitionPayload {
            actor: Some("op-user".to_string()),
            quantity_complete: Some(quantity),
            run_hours: Some(1.5),
            ..TransitionPayload::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn status(ws: &OrderWorkset, id: &str) -> OperationStatus {
        ws.operation(id).unwrap().status
    }

    #[test]
    fn test_transition_table() {
        use OperationStatus::*;
        assert_eq!(transition_table(Ready, TransitionAction::Start), Some(InProgress));
        assert_eq!(transition_table(InProgress, TransitionAction::Start), Some(InProgress));
        assert_eq!(transition_table(Pending, TransitionAction::Start), None);
        assert_eq!(transition_table(Complete, TransitionAction::Start), None);
        assert_eq!(transition_table(Ready, TransitionAction::Complete), None);
        assert_eq!(transition_table(Complete, TransitionAction::Hold), None);
        assert_eq!(transition_table(OnHold, TransitionAction::Resume), Some(Ready));
        assert_eq!(transition_table(Ready, TransitionAction::Resume), None);
    }

    #[test]
    fn test_initial_release_only_first_group() {
        let ws = grouped_workset();
        assert_eq!(status(&ws, "op10"), OperationStatus::Ready);
        assert_eq!(status(&ws, "op20"), OperationStatus::Pending);
        assert_eq!(status(&ws, "op30"), OperationStatus::Pending);
        assert_eq!(status(&ws, "op40"), OperationStatus::Pending);
    }

    #[test]
    fn test_group_members_release_together() {
        let mut ws = OrderWorkset::new(
            order(1.0),
            vec![
                op(10, Some("X"), "WC1"),
                op(20, Some("X"), "WC2"),
                op(30, Some("Y"), "WC3"),
            ],
        );
        let released = OperationStateMachine::new().release_active_group(&mut ws);
        assert_eq!(released, vec!["op10".to_string(), "op20".to_string()]);
        assert_eq!(status(&ws, "op30"), OperationStatus::Pending);

        // 组内并行开工
        let sm = OperationStateMachine::new();
        sm.start(&mut ws, "op20", &TransitionPayload::default(), now()).unwrap();
        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();
    }

    #[test]
    fn test_start_promotes_order_to_in_progress() {
        let mut ws = grouped_workset();
        let outcome = OperationStateMachine::new()
            .start(&mut ws, "op10", &TransitionPayload::default(), now())
            .unwrap();
        assert_eq!(outcome.new_status, OperationStatus::InProgress);
        assert_eq!(
            outcome.order_status_change,
            Some((OrderStatus::Released, OrderStatus::InProgress))
        );
        assert_eq!(ws.order.status, OrderStatus::InProgress);
        assert!(ws.operation("op10").unwrap().actual_start.is_some());
    }

    #[test]
    fn test_cross_group_start_is_rejected() {
        let mut ws = grouped_workset();
        // op20 仍为 PENDING, 先被状态表拒绝
        let err = OperationStateMachine::new()
            .start(&mut ws, "op20", &TransitionPayload::default(), now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition { .. }));

        // 人为置为 READY 也会因分组未放行被拒绝
        ws.operations[1].status = OperationStatus::Ready;
        let err = OperationStateMachine::new()
            .start(&mut ws, "op20", &TransitionPayload::default(), now())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::GroupNotReleased {
                group: "Y".to_string(),
                active_group: "X".to_string()
            }
        );
    }

    #[test]
    fn test_simple_order_requires_predecessor_complete() {
        let mut ws = simple_workset();
        ws.operations[1].status = OperationStatus::Ready;
        let err = OperationStateMachine::new()
            .start(&mut ws, "op20", &TransitionPayload::default(), now())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::PredecessorIncomplete {
                sequence: 20,
                blocking_sequence: 10
            }
        );
    }

    #[test]
    fn test_wave_release_through_assembly() {
        let sm = OperationStateMachine::new();
        let mut ws = grouped_workset();

        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();
        let outcome = sm.complete(&mut ws, "op10", &finish(5.0), now()).unwrap();
        assert_eq!(outcome.released_operation_ids, vec!["op20".to_string()]);
        assert_eq!(outcome.affected_work_centers, vec!["WC1".to_string(), "WC2".to_string()]);
        assert_eq!(status(&ws, "op30"), OperationStatus::Pending);

        sm.start(&mut ws, "op20", &TransitionPayload::default(), now()).unwrap();
        sm.complete(&mut ws, "op20", &finish(5.0), now()).unwrap();
        assert_eq!(status(&ws, "op30"), OperationStatus::Ready);
        assert_eq!(status(&ws, "op40"), OperationStatus::Pending);

        sm.start(&mut ws, "op30", &TransitionPayload::default(), now()).unwrap();
        sm.complete(&mut ws, "op30", &finish(5.0), now()).unwrap();
        assert_eq!(status(&ws, "op40"), OperationStatus::Ready);

        sm.start(&mut ws, "op40", &TransitionPayload::default(), now()).unwrap();
        let last = sm.complete(&mut ws, "op40", &finish(5.0), now()).unwrap();
        assert!(last.released_operation_ids.is_empty());
        assert_eq!(
            last.order_status_change,
            Some((OrderStatus::InProgress, OrderStatus::Complete))
        );
        assert_eq!(ws.order.status, OrderStatus::Complete);
        assert!(ws.order.completed_at.is_some());
    }

    #[test]
    fn test_partial_completion_is_running_total() {
        let sm = OperationStateMachine::new();
        let mut ws = simple_workset();
        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();

        let outcome = sm.complete(&mut ws, "op10", &finish(2.0), now()).unwrap();
        assert_eq!(outcome.new_status, OperationStatus::InProgress);
        sm.complete(&mut ws, "op10", &finish(3.0), now()).unwrap();

        let op = ws.operation("op10").unwrap();
        assert_eq!(op.quantity_complete, 3.0);
        assert_eq!(op.status, OperationStatus::InProgress);
        assert!((op.actual_run_hours - 3.0).abs() < 1e-9);
        assert_eq!(status(&ws, "op20"), OperationStatus::Pending);
    }

    #[test]
    fn test_complete_rejects_invalid_quantities() {
        let sm = OperationStateMachine::new();
        let mut ws = simple_workset();
        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();

        for bad in [-1.0, f64::INFINITY, f64::NAN, 5.5] {
            let err = sm.complete(&mut ws, "op10", &finish(bad), now()).unwrap_err();
            assert!(matches!(err, EngineError::InvalidQuantity { .. }), "{}", bad);
        }
        let err = sm
            .complete(&mut ws, "op10", &TransitionPayload::default(), now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuantity { .. }));
        assert_eq!(ws.operation("op10").unwrap().quantity_complete, 0.0);
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let mut ws = simple_workset();
        let err = OperationStateMachine::new()
            .complete(&mut ws, "op10", &finish(5.0), now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_last_operation_completes_order_without_release() {
        let sm = OperationStateMachine::new();
        let mut ws = OrderWorkset::new(order(4.0), vec![op(10, None, "WC1")]);
        sm.release_active_group(&mut ws);
        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();
        let outcome = sm.complete(&mut ws, "op10", &finish(4.0), now()).unwrap();

        assert_eq!(ws.order.status, OrderStatus::Complete);
        assert!(outcome.released_operation_ids.is_empty());
        assert_eq!(outcome.affected_work_centers, vec!["WC1".to_string()]);
    }

    #[test]
    fn test_hold_and_resume_restore_prior_state() {
        let sm = OperationStateMachine::new();
        let mut ws = simple_workset();

        sm.hold(&mut ws, "op10", &TransitionPayload::default()).unwrap();
        assert_eq!(status(&ws, "op10"), OperationStatus::OnHold);
        let outcome = sm.resume(&mut ws, "op10", &TransitionPayload::default()).unwrap();
        assert_eq!(outcome.new_status, OperationStatus::Ready);

        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();
        sm.hold(&mut ws, "op10", &TransitionPayload::default()).unwrap();
        let outcome = sm.resume(&mut ws, "op10", &TransitionPayload::default()).unwrap();
        assert_eq!(outcome.new_status, OperationStatus::InProgress);
    }

    #[test]
    fn test_resume_outside_active_group_returns_to_pending() {
        let sm = OperationStateMachine::new();
        let mut ws = grouped_workset();
        sm.hold(&mut ws, "op30", &TransitionPayload::default()).unwrap();
        let outcome = sm.resume(&mut ws, "op30", &TransitionPayload::default()).unwrap();
        assert_eq!(outcome.new_status, OperationStatus::Pending);
    }

    #[test]
    fn test_hold_on_complete_is_rejected() {
        let sm = OperationStateMachine::new();
        let mut ws = OrderWorkset::new(order(1.0), vec![op(10, None, "WC1"), op(20, None, "WC1")]);
        sm.release_active_group(&mut ws);
        sm.start(&mut ws, "op10", &TransitionPayload::default(), now()).unwrap();
        sm.complete(&mut ws, "op10", &finish(1.0), now()).unwrap();

        let err = sm.hold(&mut ws, "op10", &TransitionPayload::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_start_rejected_when_order_on_hold() {
        let mut ws = simple_workset();
        ws.order.status = OrderStatus::OnHold;
        let err = OperationStateMachine::new()
            .start(&mut ws, "op10", &TransitionPayload::default(), now())
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderNotActive { .. }));
    }

    #[test]
    fn test_group_index_aggregates() {
        let mut ws = grouped_workset();
        ws.operations[0].status = OperationStatus::Complete;
        let index = GroupIndex::build(&ws.operations);
        assert_eq!(index.active_group(), Some("Y"));
        assert_eq!(index.first_incomplete_sequence(), Some(20));
        assert!(index.is_group_complete("X"));
        assert_eq!(index.group("Y").unwrap().remaining(), 1);
        assert!(!index.all_complete());
    }

    #[test]
    fn test_notes_are_appended() {
        let sm = OperationStateMachine::new();
        let mut ws = simple_workset();
        let note = |n: &str| TransitionPayload {
            notes: Some(n.to_string()),
            ..TransitionPayload::default()
        };
        sm.start(&mut ws, "op10", &note("first"), now()).unwrap();
        sm.hold(&mut ws, "op10", &note("waiting on tooling")).unwrap();
        assert_eq!(
            ws.operation("op10").unwrap().notes.as_deref(),
            Some("first\nwaiting on tooling")
        );
    }
}
