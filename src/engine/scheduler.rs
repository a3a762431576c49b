// ==========================================
// 生产排程与车间执行引擎 - 有限产能排程器
// ==========================================
// 职责: 为未排程工序分配工作中心开工/完工日期
// 输入: 活动订单工作集 + 工作中心 + 本次排程台账
// 输出: 排程结果 + 冲突列表 (冲突是数据, 不是错误)
// 红线:
// - 贪心单遍, 不回溯, 不调整已有排程
// - 周六/周日不开工
// - 单个候选失败只记录冲突, 不中断整批
// ==========================================

use crate::domain::capacity::{CapacityConstraint, CapacityLedger};
use crate::domain::master::WorkCenter;
use crate::domain::order::Operation;
use crate::engine::calendar;
use crate::engine::operation_state::OrderWorkset;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, instrument};

/// 工时比较容差
const HOURS_EPSILON: f64 = 1e-9;

pub const DEFAULT_HORIZON_DAYS: u32 = 30;
pub const DEFAULT_MIN_OPERATION_HOURS: f64 = 1.0;

// ==========================================
// ScheduleRequest - 排程请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub today: NaiveDate,
    pub horizon_days: u32,
    pub optimize_setup: bool,                    // 同零件聚类, 减少换型
    pub min_operation_hours: f64,                // 单工序工时下限
    pub work_center_filter: Option<Vec<String>>, // 仅排这些工作中心
    pub order_filter: Option<String>,            // 仅排该订单
}

impl ScheduleRequest {
    pub fn new(today: NaiveDate, horizon_days: u32) -> Self {
        Self {
            today,
            horizon_days,
            optimize_setup: false,
            min_operation_hours: DEFAULT_MIN_OPERATION_HOURS,
            work_center_filter: None,
            order_filter: None,
        }
    }

    /// 排程窗口终点 (含)
    pub fn window_end(&self) -> NaiveDate {
        self.today
            .checked_add_days(Days::new(u64::from(self.horizon_days)))
            .unwrap_or(NaiveDate::MAX)
    }

    /// 工作中心是否在本次范围内
    pub fn includes_work_center(&self, work_center_id: &str) -> bool {
        self.work_center_filter
            .as_ref()
            .map(|ids| ids.iter().any(|id| id == work_center_id))
            .unwrap_or(true)
    }

    fn includes_order(&self, order_id: &str) -> bool {
        self.order_filter
            .as_deref()
            .map(|id| id == order_id)
            .unwrap_or(true)
    }
}

// ==========================================
// ScheduledOperation - 排程结果行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    pub operation_id: String,
    pub order_id: String,
    pub sequence: i32,
    pub work_center_id: String,
    pub scheduled_start: NaiveDate,
    pub scheduled_end: NaiveDate,
    pub hours: f64,                 // 记入开工日的工时
    pub weekend_days_skipped: u32,  // 寻位过程中跳过的周末天数
}

// ==========================================
// SchedulingConflict - 排程冲突
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    PredecessorUnscheduled, // 前序工序尚未排程
    NoCapacityInHorizon,    // 窗口内无可用产能
    UnknownWorkCenter,      // 工作中心不在产能模型中
    ConcurrentlyScheduled,  // 落库时已被并发排程占用
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConflictReason::PredecessorUnscheduled => "predecessor unscheduled",
            ConflictReason::NoCapacityInHorizon => "no available capacity in horizon",
            ConflictReason::UnknownWorkCenter => "unknown work center",
            ConflictReason::ConcurrentlyScheduled => "concurrently scheduled",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConflict {
    pub operation_id: String,
    pub order_id: String,
    pub sequence: i32,
    pub work_center_id: String,
    pub reason: ConflictReason,
    pub detail: String,
}

impl SchedulingConflict {
    fn for_operation(op: &Operation, reason: ConflictReason, detail: String) -> Self {
        Self {
            operation_id: op.operation_id.clone(),
            order_id: op.order_id.clone(),
            sequence: op.sequence,
            work_center_id: op.work_center_id.clone(),
            reason,
            detail,
        }
    }

    /// 落库守卫失败 (scheduled_start 已被他人写入)
    pub fn concurrently_scheduled(scheduled: &ScheduledOperation) -> Self {
        Self {
            operation_id: scheduled.operation_id.clone(),
            order_id: scheduled.order_id.clone(),
            sequence: scheduled.sequence,
            work_center_id: scheduled.work_center_id.clone(),
            reason: ConflictReason::ConcurrentlyScheduled,
            detail: "工序已被其他排程写入".to_string(),
        }
    }
}

// ==========================================
// ScheduleResult - 排程结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub scheduled: Vec<ScheduledOperation>,
    pub conflicts: Vec<SchedulingConflict>,
    pub affected_work_centers: Vec<String>, // 有新排程的工作中心 (升序)
}

// ==========================================
// 候选工序
// ==========================================
#[derive(Debug, Clone)]
struct Candidate<'a> {
    operation: &'a Operation,
    priority: i32,
    due_date: Option<NaiveDate>,
    part_id: &'a str,
    predecessor: Option<&'a Operation>,
}

/// 候选排序: 优先级 (1 最紧急) → 交期 (无交期最后) → [零件] → 序号 → 订单
fn compare_candidates(a: &Candidate<'_>, b: &Candidate<'_>, optimize_setup: bool) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| {
            if optimize_setup {
                a.part_id.cmp(b.part_id)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.operation.sequence.cmp(&b.operation.sequence))
        .then_with(|| a.operation.order_id.cmp(&b.operation.order_id))
}

// ==========================================
// FiniteCapacityScheduler - 有限产能排程器
// ==========================================
pub struct FiniteCapacityScheduler {
    // 无状态引擎
}

impl FiniteCapacityScheduler {
    pub fn new() -> Self {
        Self {}
    }

    /// 选取候选工序
    ///
    /// 条件: 订单已下达/生产中, 工序 PENDING/READY, 尚未排程, 满足过滤条件
    fn select_candidates<'a>(
        &self,
        request: &ScheduleRequest,
        worksets: &'a [OrderWorkset],
    ) -> Vec<Candidate<'a>> {
        let mut candidates = Vec::new();

        for workset in worksets {
            let order = &workset.order;
            if !order.status.is_schedulable() || !request.includes_order(&order.order_id) {
                continue;
            }

            let mut ops: Vec<&Operation> = workset.operations.iter().collect();
            ops.sort_by_key(|op| op.sequence);

            for (index, op) in ops.iter().copied().enumerate() {
                if !op.status.is_schedulable()
                    || op.scheduled_start.is_some()
                    || !request.includes_work_center(&op.work_center_id)
                {
                    continue;
                }
                candidates.push(Candidate {
                    operation: op,
                    priority: order.priority,
                    due_date: order.due_date,
                    part_id: &order.part_id,
                    predecessor: index.checked_sub(1).map(|prev| ops[prev]),
                });
            }
        }

        candidates.sort_by(|a, b| compare_candidates(a, b, request.optimize_setup));
        candidates
    }

    /// 执行一次排程
    ///
    /// # 参数
    /// - `request`: 排程请求
    /// - `worksets`: 活动订单及其全部工序 (含已排程/已完工, 用于前序判定)
    /// - `work_centers`: 工作中心 (不在其中的工序记为冲突)
    /// - `ledger`: 本次排程台账 (会被修改)
    #[instrument(skip(self, worksets, work_centers, ledger), fields(
        today = %request.today,
        horizon_days = request.horizon_days,
        optimize_setup = request.optimize_setup,
        orders = worksets.len()
    ))]
    pub fn schedule(
        &self,
        request: &ScheduleRequest,
        worksets: &[OrderWorkset],
        work_centers: &HashMap<String, WorkCenter>,
        ledger: &mut CapacityLedger,
    ) -> ScheduleResult {
        let candidates = self.select_candidates(request, worksets);
        let window_end = request.window_end();

        let mut placed_end: HashMap<&str, NaiveDate> = HashMap::new();
        let mut affected: BTreeSet<String> = BTreeSet::new();
        let mut result = ScheduleResult::default();

        debug!(candidates = candidates.len(), "候选工序已排序");

        for candidate in &candidates {
            let op = candidate.operation;

            // 1. 最早开工日
            let earliest = match candidate.predecessor {
                None => request.today,
                Some(prev) if prev.is_complete() => request.today,
                Some(prev) => {
                    let prev_end = placed_end
                        .get(prev.operation_id.as_str())
                        .copied()
                        .or(prev.scheduled_end);
                    match prev_end.and_then(calendar::next_day) {
                        Some(day) => day,
                        None => {
                            result.conflicts.push(SchedulingConflict::for_operation(
                                op,
                                ConflictReason::PredecessorUnscheduled,
                                format!("前序工序 {} 尚未排程", prev.sequence),
                            ));
                            continue;
                        }
                    }
                }
            };

            // 2. 工作中心
            let Some(work_center) = work_centers.get(&op.work_center_id) else {
                result.conflicts.push(SchedulingConflict::for_operation(
                    op,
                    ConflictReason::UnknownWorkCenter,
                    format!("工作中心 {} 不在产能模型中", op.work_center_id),
                ));
                continue;
            };

            // 3. 寻位
            let hours = op.hours_needed(request.min_operation_hours);
            let start_from = earliest.max(request.today);
            match self.find_start_date(ledger, work_center, hours, start_from, window_end) {
                Some((start, weekend_days_skipped)) => {
                    let cap = work_center.capacity_hours_per_day;
                    let days = calendar::days_needed(hours, cap);
                    let end = calendar::nth_business_day(start, days).unwrap_or(start);
                    ledger.book(&work_center.work_center_id, start, hours);

                    debug!(
                        operation_id = %op.operation_id,
                        work_center_id = %work_center.work_center_id,
                        start = %start,
                        end = %end,
                        hours = hours,
                        weekend_days_skipped = weekend_days_skipped,
                        "工序已排程"
                    );

                    placed_end.insert(op.operation_id.as_str(), end);
                    affected.insert(work_center.work_center_id.clone());
                    result.scheduled.push(ScheduledOperation {
                        operation_id: op.operation_id.clone(),
                        order_id: op.order_id.clone(),
                        sequence: op.sequence,
                        work_center_id: work_center.work_center_id.clone(),
                        scheduled_start: start,
                        scheduled_end: end,
                        hours,
                        weekend_days_skipped,
                    });
                }
                None => {
                    result.conflicts.push(SchedulingConflict::for_operation(
                        op,
                        ConflictReason::NoCapacityInHorizon,
                        format!(
                            "{} 至 {} 内无 {:.2} 小时可用产能",
                            start_from, window_end, hours
                        ),
                    ));
                }
            }
        }

        result.affected_work_centers = affected.into_iter().collect();

        info!(
            scheduled = result.scheduled.len(),
            conflicts = result.conflicts.len(),
            "排程完成"
        );
        result
    }

    /// 从 start_from 起逐日寻找第一个可开工日
    ///
    /// 开工日剩余产能须 ≥ min(工时, 日产能); 超过一天的工序独占开工日
    ///
    /// # 返回
    /// (开工日, 跳过的周末天数)
    fn find_start_date(
        &self,
        ledger: &CapacityLedger,
        work_center: &WorkCenter,
        hours: f64,
        start_from: NaiveDate,
        window_end: NaiveDate,
    ) -> Option<(NaiveDate, u32)> {
        let cap = work_center.capacity_hours_per_day;
        if !cap.is_finite() || cap <= 0.0 {
            return None;
        }
        let required = hours.min(cap) - HOURS_EPSILON;

        let mut weekend_days_skipped = 0;
        let mut date = start_from;
        while date <= window_end {
            if !calendar::is_business_day(date) {
                weekend_days_skipped += 1;
            } else if ledger
                .day(&work_center.work_center_id, date, cap)
                .can_book(required)
            {
                return Some((date, weekend_days_skipped));
            }
            date = calendar::next_day(date)?;
        }
        None
    }
}

impl Default for FiniteCapacityScheduler {
    fn default() -> Self {
        Self::new()
    }
}
