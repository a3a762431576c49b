// ==========================================
// 生产排程与车间执行引擎 - 产能台账领域模型
// ==========================================
// 红线: 台账只是缓存, 每次排程由未完工且已排程的工序重建, 不落库
// 不变式: committed[wc][date] = Σ hours_needed(工序 | scheduled_start = date)
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// LedgerEntry - 台账聚合行
// ==========================================
// 来源: 仓储层按 (工作中心, 开工日期) 聚合查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub work_center_id: String,
    pub date: NaiveDate,
    pub hours: f64,
}

// ==========================================
// CapacityLedger - 单次排程的产能台账
// ==========================================
// 用途: 值对象, 按引用贯穿一次排程调用, 无进程级共享
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    window_start: NaiveDate,
    window_end: NaiveDate, // 含当日
    committed: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl CapacityLedger {
    /// 创建空台账, 覆盖 [window_start, window_end]
    pub fn new(window_start: NaiveDate, window_end: NaiveDate) -> Self {
        Self {
            window_start,
            window_end,
            committed: HashMap::new(),
        }
    }

    /// 由聚合行构建台账, 窗口外的行被忽略
    pub fn from_entries<I>(window_start: NaiveDate, window_end: NaiveDate, entries: I) -> Self
    where
        I: IntoIterator<Item = LedgerEntry>,
    {
        let mut ledger = Self::new(window_start, window_end);
        for entry in entries {
            ledger.book(&entry.work_center_id, entry.date, entry.hours);
        }
        ledger
    }

    pub fn window_start(&self) -> NaiveDate {
        self.window_start
    }

    pub fn window_end(&self) -> NaiveDate {
        self.window_end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.window_start && date <= self.window_end
    }

    /// 某工作中心某日已占用工时
    pub fn committed_hours(&self, work_center_id: &str, date: NaiveDate) -> f64 {
        self.committed
            .get(work_center_id)
            .and_then(|days| days.get(&date))
            .copied()
            .unwrap_or(0.0)
    }

    /// 记账 (全部工时记在开工日)
    ///
    /// 返回是否入账 (窗口外不入账)
    pub fn book(&mut self, work_center_id: &str, date: NaiveDate, hours: f64) -> bool {
        if !self.contains(date) || !hours.is_finite() {
            return false;
        }
        *self
            .committed
            .entry(work_center_id.to_string())
            .or_default()
            .entry(date)
            .or_insert(0.0) += hours;
        true
    }

    /// 某工作中心窗口内总占用工时
    pub fn total_hours(&self, work_center_id: &str) -> f64 {
        self.committed
            .get(work_center_id)
            .map(|days| days.values().sum())
            .unwrap_or(0.0)
    }

    /// 台账中出现过的工作中心
    pub fn work_center_ids(&self) -> impl Iterator<Item = &String> {
        self.committed.keys()
    }

    /// 某工作中心某日的产能视图
    pub fn day(&self, work_center_id: &str, date: NaiveDate, capacity_hours: f64) -> DayCapacity {
        DayCapacity {
            date,
            capacity_hours,
            committed_hours: self.committed_hours(work_center_id, date),
        }
    }
}

// ==========================================
// DayCapacity - 单日单工作中心产能
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayCapacity {
    pub date: NaiveDate,
    pub capacity_hours: f64,  // 日产能上限
    pub committed_hours: f64, // 已占用
}

// ==========================================
// Trait: CapacityConstraint
// ==========================================
// 用途: 排程器产能门控接口
pub trait CapacityConstraint {
    /// 检查是否可再占用 hours
    fn can_book(&self, hours: f64) -> bool;

    /// 检查是否超限
    fn is_overbooked(&self) -> bool;

    /// 剩余产能
    fn remaining_hours(&self) -> f64;

    /// 占用比例 (0.0 - 1.0+)
    fn utilization_ratio(&self) -> f64;
}

impl CapacityConstraint for DayCapacity {
    fn can_book(&self, hours: f64) -> bool {
        self.capacity_hours - self.committed_hours >= hours
    }

    fn is_overbooked(&self) -> bool {
        self.committed_hours > self.capacity_hours
    }

    fn remaining_hours(&self) -> f64 {
        (self.capacity_hours - self.committed_hours).max(0.0)
    }

    fn utilization_ratio(&self) -> f64 {
        if self.capacity_hours <= 0.0 {
            return 0.0;
        }
        self.committed_hours / self.capacity_hours
    }
}
