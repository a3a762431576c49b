// ==========================================
// 生产排程与车间执行引擎 - 生产执行 API
// ==========================================
// 职责: 工艺展开 / 订单下达 / 工序流转 / 排程 / 可用率重算
// 红线:
// - 排程与流转经同一闸门串行执行, 台账重建与落库不交错
// - 下达时零工序订单在写库前拒绝
// - 排程冲突作为结果返回, 不抛错
// ==========================================

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::SchedulingConfigReader;
use crate::domain::capacity::CapacityLedger;
use crate::domain::master::WorkCenter;
use crate::domain::order::{Operation, OperationDraft, ProductionOrder};
use crate::domain::types::{OrderStatus, TransitionAction};
use crate::engine::availability::AvailabilityRecalculator;
use crate::engine::operation_state::{
    OperationStateMachine, OrderWorkset, TransitionOutcome, TransitionPayload,
};
use crate::engine::repositories::ShopFloorRepositories;
use crate::engine::routing_explosion::{ExplosionConfig, RoutingExplosionEngine};
use crate::engine::scheduler::{
    FiniteCapacityScheduler, ScheduleRequest, ScheduleResult, SchedulingConflict,
};
use crate::perf::PerfGuard;

// ==========================================
// 请求 / 响应
// ==========================================

/// 排程过滤条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingFilter {
    pub work_center_ids: Option<Vec<String>>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub order: ProductionOrder,
    pub operations: Vec<Operation>,
    pub schedule: Option<ScheduleResult>, // 未开启下达即排程时为空
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub operation: Operation,
    pub order: ProductionOrder,
    pub outcome: TransitionOutcome,
    pub availability: BTreeMap<String, f64>, // 重算后的工作中心可用率
}

// ==========================================
// ProductionApi
// ==========================================
pub struct ProductionApi {
    repos: ShopFloorRepositories,
    config: Arc<dyn SchedulingConfigReader>,
    state_machine: OperationStateMachine,
    scheduler: FiniteCapacityScheduler,
    recalculator: AvailabilityRecalculator,
    gate: Mutex<()>,                 // 进程内串行点
    today_override: Option<NaiveDate>,
}

impl ProductionApi {
    pub fn new(repos: ShopFloorRepositories, config: Arc<dyn SchedulingConfigReader>) -> Self {
        Self {
            repos,
            config,
            state_machine: OperationStateMachine::new(),
            scheduler: FiniteCapacityScheduler::new(),
            recalculator: AvailabilityRecalculator::new(),
            gate: Mutex::new(()),
            today_override: None,
        }
    }

    /// 固定"今天" (测试与补算用)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today_override = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today_override
            .unwrap_or_else(|| Local::now().date_naive())
    }

    fn lock_gate(&self) -> ApiResult<MutexGuard<'_, ()>> {
        self.gate
            .lock()
            .map_err(|e| ApiError::InternalError(format!("串行闸门获取失败: {}", e)))
    }

    fn explosion_engine(&self) -> ApiResult<RoutingExplosionEngine> {
        Ok(RoutingExplosionEngine::new(ExplosionConfig {
            max_group_key_len: self.config.get_max_group_key_len()?,
            inspection_keywords: self.config.get_inspection_keywords()?,
        }))
    }

    // ==========================================
    // 工艺展开
    // ==========================================

    /// 展开订单工序 (只读预览, 不落库)
    pub fn explode_routing(&self, order_id: &str) -> ApiResult<Vec<OperationDraft>> {
        let order = self.repos.order_repo.get_order(order_id)?;
        let drafts = self
            .explosion_engine()?
            .explode(&order, self.repos.master_data_repo.as_ref())?;
        Ok(drafts)
    }

    // ==========================================
    // 订单下达
    // ==========================================

    /// 下达订单
    ///
    /// 流程: DRAFT 校验 → 展开 → 零工序拒绝 → 首组放行 → 单事务落库 → (可选) 排程该订单
    #[instrument(skip(self))]
    pub fn release_order(&self, order_id: &str) -> ApiResult<ReleaseResponse> {
        let _gate = self.lock_gate()?;

        let order = self.repos.order_repo.get_order(order_id)?;
        if order.status != OrderStatus::Draft {
            return Err(ApiError::InvalidStateTransition(format!(
                "订单{}状态为{}, 仅 DRAFT 可下达",
                order.order_number, order.status
            )));
        }

        let drafts = self
            .explosion_engine()?
            .explode(&order, self.repos.master_data_repo.as_ref())?;
        if drafts.is_empty() {
            return Err(ApiError::ValidationError(format!(
                "订单{}没有可展开的工序 (零件{}无已发布工艺)",
                order.order_number, order.part_id
            )));
        }

        let operations: Vec<Operation> = drafts
            .into_iter()
            .map(|draft| draft.into_operation(order_id))
            .collect();
        let mut workset = OrderWorkset::new(order, operations);
        let released = self.state_machine.release_active_group(&mut workset);

        self.repos
            .order_repo
            .release_with_operations(order_id, &workset.operations, Utc::now())?;

        info!(
            order_id = %order_id,
            operations = workset.operations.len(),
            ready = released.len(),
            "订单下达完成"
        );

        let schedule = if self.config.get_reschedule_on_release()? {
            let filter = SchedulingFilter {
                work_center_ids: None,
                order_id: Some(order_id.to_string()),
            };
            Some(self.schedule_locked(&filter, None, None)?)
        } else {
            None
        };

        Ok(ReleaseResponse {
            order: self.repos.order_repo.get_order(order_id)?,
            operations: self.repos.order_repo.list_operations(order_id)?,
            schedule,
        })
    }

    // ==========================================
    // 工序流转
    // ==========================================

    /// 工序动作: start / complete / hold / resume
    #[instrument(skip(self, action, payload), fields(action = %action))]
    pub fn transition(
        &self,
        operation_id: &str,
        action: TransitionAction,
        payload: TransitionPayload,
    ) -> ApiResult<TransitionResponse> {
        let _gate = self.lock_gate()?;

        let operation = self
            .repos
            .order_repo
            .find_operation(operation_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Operation(id={})不存在", operation_id)))?;
        let order = self.repos.order_repo.get_order(&operation.order_id)?;
        let operations = self.repos.order_repo.list_operations(&order.order_id)?;
        let mut workset = OrderWorkset::new(order, operations);

        let outcome =
            self.state_machine
                .apply(&mut workset, operation_id, action, &payload, Utc::now())?;

        let changed: Vec<&Operation> = workset
            .operations
            .iter()
            .filter(|op| {
                op.operation_id == outcome.operation_id
                    || outcome.released_operation_ids.contains(&op.operation_id)
            })
            .collect();
        self.repos
            .order_repo
            .apply_transition(&workset.order, &changed)?;

        let availability = if outcome.affected_work_centers.is_empty() {
            BTreeMap::new()
        } else {
            self.recalculate_locked(Some(outcome.affected_work_centers.as_slice()), None)?
        };

        let operation = workset
            .operation(operation_id)
            .cloned()
            .ok_or_else(|| ApiError::InternalError(format!("工序{}丢失", operation_id)))?;

        Ok(TransitionResponse {
            operation,
            order: workset.order,
            outcome,
            availability,
        })
    }

    // ==========================================
    // 排程
    // ==========================================

    /// 执行有限产能排程
    ///
    /// `horizon_days` / `optimize_setup` 为空时取配置值
    pub fn run_scheduling(
        &self,
        filter: &SchedulingFilter,
        horizon_days: Option<u32>,
        optimize_setup: Option<bool>,
    ) -> ApiResult<ScheduleResult> {
        let _gate = self.lock_gate()?;
        self.schedule_locked(filter, horizon_days, optimize_setup)
    }

    /// 清除订单未开工工序的排程 (优先级调整后重新排程前使用)
    ///
    /// # 返回
    /// 受影响的工作中心
    pub fn unschedule_order(&self, order_id: &str) -> ApiResult<Vec<String>> {
        let _gate = self.lock_gate()?;

        self.repos.order_repo.get_order(order_id)?;
        let affected = self.repos.order_repo.clear_schedule(order_id)?;
        if !affected.is_empty() {
            self.recalculate_locked(Some(affected.as_slice()), None)?;
        }
        info!(order_id = %order_id, work_centers = affected.len(), "订单排程已清除");
        Ok(affected)
    }

    fn schedule_locked(
        &self,
        filter: &SchedulingFilter,
        horizon_days: Option<u32>,
        optimize_setup: Option<bool>,
    ) -> ApiResult<ScheduleResult> {
        let _perf = PerfGuard::new("run_scheduling");

        let request = ScheduleRequest {
            today: self.today(),
            horizon_days: match horizon_days {
                Some(days) => days,
                None => self.config.get_horizon_days()?,
            },
            optimize_setup: match optimize_setup {
                Some(flag) => flag,
                None => self.config.get_optimize_setup()?,
            },
            min_operation_hours: self.config.get_min_operation_hours()?,
            work_center_filter: filter.work_center_ids.clone(),
            order_filter: filter.order_id.clone(),
        };

        // 1. 工作中心 + 台账
        let work_centers: HashMap<String, WorkCenter> = self
            .repos
            .master_data_repo
            .list_active_work_centers()?
            .into_iter()
            .filter(|wc| request.includes_work_center(&wc.work_center_id))
            .map(|wc| (wc.work_center_id.clone(), wc))
            .collect();
        let mut ledger = self.build_ledger(
            request.today,
            request.window_end(),
            request.min_operation_hours,
            |wc_id| request.includes_work_center(wc_id),
        )?;

        // 2. 候选工作集
        let worksets: Vec<OrderWorkset> = self
            .repos
            .order_repo
            .list_active_orders_with_operations(request.order_filter.as_deref())?
            .into_iter()
            .map(|(order, ops)| OrderWorkset::new(order, ops))
            .collect();

        // 3. 排程 (纯计算)
        let mut result = self
            .scheduler
            .schedule(&request, &worksets, &work_centers, &mut ledger);

        // 4. 带守卫落库
        let rejected = {
            let placements: Vec<(&str, NaiveDate, NaiveDate)> = result
                .scheduled
                .iter()
                .map(|s| (s.operation_id.as_str(), s.scheduled_start, s.scheduled_end))
                .collect();
            self.repos.order_repo.write_schedule(&placements)?
        };
        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "部分工序已被并发排程, 记为冲突");
            let (lost, kept): (Vec<_>, Vec<_>) = result
                .scheduled
                .into_iter()
                .partition(|s| rejected.contains(&s.operation_id));
            result.scheduled = kept;
            result
                .conflicts
                .extend(lost.iter().map(SchedulingConflict::concurrently_scheduled));
            let mut affected: Vec<String> = result
                .scheduled
                .iter()
                .map(|s| s.work_center_id.clone())
                .collect();
            affected.sort();
            affected.dedup();
            result.affected_work_centers = affected;
        }

        // 5. 可用率
        if !result.affected_work_centers.is_empty() {
            self.recalculate_locked(
                Some(result.affected_work_centers.as_slice()),
                Some(request.horizon_days),
            )?;
        }

        Ok(result)
    }

    // ==========================================
    // 可用率
    // ==========================================

    /// 重算工作中心可用率
    ///
    /// `work_center_ids` 为空时重算全部启用中的工作中心
    pub fn recalculate_availability(
        &self,
        work_center_ids: Option<&[String]>,
        horizon_days: Option<u32>,
    ) -> ApiResult<BTreeMap<String, f64>> {
        let _gate = self.lock_gate()?;
        self.recalculate_locked(work_center_ids, horizon_days)
    }

    fn recalculate_locked(
        &self,
        work_center_ids: Option<&[String]>,
        horizon_days: Option<u32>,
    ) -> ApiResult<BTreeMap<String, f64>> {
        let horizon_days = match horizon_days {
            Some(days) => days,
            None => self.config.get_horizon_days()?,
        };
        let request = ScheduleRequest::new(self.today(), horizon_days);

        let work_centers = match work_center_ids {
            Some(ids) => self.repos.master_data_repo.list_work_centers_by_ids(ids)?,
            None => self.repos.master_data_repo.list_active_work_centers()?,
        };
        let ledger = self.build_ledger(
            request.today,
            request.window_end(),
            self.config.get_min_operation_hours()?,
            |_| true,
        )?;

        let snapshots = self.recalculator.recalculate(&work_centers, &ledger);
        let rates: Vec<(String, f64)> = snapshots
            .iter()
            .map(|s| (s.work_center_id.clone(), s.availability_rate))
            .collect();
        self.repos.master_data_repo.update_availability_rates(&rates)?;

        Ok(rates.into_iter().collect())
    }

    /// 由数据库聚合重建本次调用的台账
    fn build_ledger<F>(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
        min_hours: f64,
        include: F,
    ) -> ApiResult<CapacityLedger>
    where
        F: Fn(&str) -> bool,
    {
        let entries = self
            .repos
            .order_repo
            .load_ledger_entries(window_start, window_end, min_hours)?;
        Ok(CapacityLedger::from_entries(
            window_start,
            window_end,
            entries
                .into_iter()
                .filter(|entry| include(&entry.work_center_id)),
        ))
    }
}
