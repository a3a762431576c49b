// ==========================================
// 生产排程与车间执行引擎 - 生产订单与工序
// ==========================================
// 职责: ProductionOrder / Operation / OperationDraft
// 红线: 工序序号创建后不可重排; quantity_complete ≤ 订单数量
// ==========================================

use crate::domain::types::{OperationStatus, OrderStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ProductionOrder - 生产订单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub order_id: String,                    // 订单ID
    pub order_number: String,                // 订单号
    pub part_id: String,                     // 生产零件
    pub quantity_ordered: f64,               // 订单数量
    pub status: OrderStatus,                 // 状态
    pub priority: i32,                       // 优先级 (1 最高, 10 最低)
    pub due_date: Option<NaiveDate>,         // 交期
    pub released_at: Option<DateTime<Utc>>,  // 下达时间
    pub completed_at: Option<DateTime<Utc>>, // 完工时间
}

// ==========================================
// Operation - 订单工序
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    // ===== 标识 =====
    pub operation_id: String,
    pub order_id: String,
    pub sequence: i32,                     // 订单内序号 (10 的倍数)

    // ===== 分组 =====
    pub component_part_id: Option<String>, // 对应 BOM 组件 (装配层工序为空)
    pub operation_group: Option<String>,   // 波次分组键 (简单件为空)

    // ===== 工艺 =====
    pub work_center_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_inspection: bool,
    pub setup_hours: f64,                  // 计划准备工时
    pub run_hours: f64,                    // 计划加工工时 (已按数量缩放)

    // ===== 实绩 =====
    pub actual_setup_hours: f64,
    pub actual_run_hours: f64,
    pub quantity_complete: f64,
    pub quantity_scrapped: f64,
    pub status: OperationStatus,

    // ===== 排程 =====
    pub scheduled_start: Option<NaiveDate>,
    pub scheduled_end: Option<NaiveDate>,

    // ===== 执行记录 =====
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub completed_by: Option<String>,
    pub notes: Option<String>,
}

impl Operation {
    /// 分组键
    ///
    /// 未分组工序按自身序号成组, 等价于严格顺序放行
    pub fn group_key(&self) -> String {
        match &self.operation_group {
            Some(group) => group.clone(),
            None => format!("#{}", self.sequence),
        }
    }

    /// 排程所需工时 (准备 + 加工, 不低于下限)
    pub fn hours_needed(&self, min_hours: f64) -> f64 {
        (self.setup_hours + self.run_hours).max(min_hours)
    }

    pub fn is_complete(&self) -> bool {
        self.status == OperationStatus::Complete
    }

    /// 是否已开工过 (决定 resume 的回退状态)
    pub fn has_started(&self) -> bool {
        self.actual_start.is_some()
    }
}

// ==========================================
// OperationDraft - 工艺展开结果
// ==========================================
// 用途: 展开引擎输出, 落库前由 API 层转换为 Operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDraft {
    pub sequence: i32,
    pub component_part_id: Option<String>,
    pub operation_group: Option<String>,
    pub work_center_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_inspection: bool,
    pub setup_hours: f64,
    pub run_hours: f64,
}

impl OperationDraft {
    /// 转换为待落库工序 (初始状态 PENDING)
    pub fn into_operation(self, order_id: &str) -> Operation {
        Operation {
            operation_id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            sequence: self.sequence,
            component_part_id: self.component_part_id,
            operation_group: self.operation_group,
            work_center_id: self.work_center_id,
            name: self.name,
            description: self.description,
            is_inspection: self.is_inspection,
            setup_hours: self.setup_hours,
            run_hours: self.run_hours,
            actual_setup_hours: 0.0,
            actual_run_hours: 0.0,
            quantity_complete: 0.0,
            quantity_scrapped: 0.0,
            status: OperationStatus::Pending,
            scheduled_start: None,
            scheduled_end: None,
            actual_start: None,
            actual_end: None,
            started_by: None,
            completed_by: None,
            notes: None,
        }
    }
}
