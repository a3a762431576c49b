// ==========================================
// 生产排程与车间执行引擎 - 可用率重算
// ==========================================
// 职责: 按窗口内工作日产能与台账占用计算工作中心可用率
// 红线: 整值重算, 不做增量修补; 可用工时为 0 时可用率为 0
// ==========================================

use crate::domain::capacity::CapacityLedger;
use crate::domain::master::WorkCenter;
use crate::engine::calendar;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    pub work_center_id: String,
    pub available_hours: f64,   // 工作日数 × 日产能
    pub used_hours: f64,        // 台账占用
    pub availability_rate: f64, // 0.0 - 100.0, 一位小数
}

/// 可用率 = clamp(0, 100, (1 - used/available) × 100), 保留一位小数
pub fn availability_rate(available_hours: f64, used_hours: f64) -> f64 {
    if !available_hours.is_finite() || available_hours <= 0.0 {
        return 0.0;
    }
    let rate = ((1.0 - used_hours / available_hours) * 100.0).clamp(0.0, 100.0);
    (rate * 10.0).round() / 10.0
}

pub struct AvailabilityRecalculator {
    // 无状态引擎
}

impl AvailabilityRecalculator {
    pub fn new() -> Self {
        Self {}
    }

    /// 单个工作中心
    pub fn snapshot(&self, work_center: &WorkCenter, ledger: &CapacityLedger) -> AvailabilitySnapshot {
        let business_days =
            calendar::business_days_between(ledger.window_start(), ledger.window_end());
        let available_hours = f64::from(business_days) * work_center.capacity_hours_per_day.max(0.0);
        let used_hours = ledger.total_hours(&work_center.work_center_id);

        AvailabilitySnapshot {
            work_center_id: work_center.work_center_id.clone(),
            available_hours,
            used_hours,
            availability_rate: availability_rate(available_hours, used_hours),
        }
    }

    /// 批量重算 (台账窗口即重算窗口)
    pub fn recalculate(
        &self,
        work_centers: &[WorkCenter],
        ledger: &CapacityLedger,
    ) -> Vec<AvailabilitySnapshot> {
        let snapshots: Vec<AvailabilitySnapshot> = work_centers
            .iter()
            .map(|wc| self.snapshot(wc, ledger))
            .collect();

        debug!(
            work_centers = snapshots.len(),
            window_start = %ledger.window_start(),
            window_end = %ledger.window_end(),
            "可用率重算完成"
        );
        snapshots
    }
}

impl Default for AvailabilityRecalculator {
    fn default() -> Self {
        Self::new()
    }
}
