// ==========================================
// 生产排程与车间执行引擎 - 主数据领域模型
// ==========================================
// 职责: 零件 / BOM / 工艺路线 / 工作中心
// 红线: 主数据对本引擎只读 (工作中心可用率除外)
// ==========================================

use crate::domain::types::{PartType, RoutingStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// Part - 零件
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub part_id: String,     // 零件ID
    pub part_number: String, // 零件号 (组件分组键来源)
    pub name: String,        // 名称
    pub part_type: PartType, // 零件类型
}

impl Part {
    pub fn is_assembly(&self) -> bool {
        self.part_type == PartType::Assembly
    }
}

// ==========================================
// Bom / BomItem - 物料清单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bom {
    pub bom_id: String,
    pub part_id: String,  // 所属装配件
    pub revision: String, // 版本
    pub is_active: bool,  // 是否生效
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomItem {
    pub line_id: i64,              // 行ID (同 item_number 时的次序)
    pub bom_id: String,
    pub item_number: i32,          // 行号 (展开顺序)
    pub component_part_id: String, // 组件零件
    pub quantity_per: f64,         // 单位用量
}

// ==========================================
// Routing / RoutingOperation - 工艺路线
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routing {
    pub routing_id: String,
    pub part_id: String,
    pub revision: String,
    pub status: RoutingStatus,
}

impl Routing {
    pub fn is_released(&self) -> bool {
        self.status == RoutingStatus::Released
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingOperation {
    pub routing_operation_id: String,
    pub routing_id: String,
    pub sequence: i32,              // 工艺内序号
    pub work_center_id: String,     // 工作中心
    pub name: String,               // 工序名称
    pub description: Option<String>,
    pub setup_hours: f64,           // 准备工时 (不随数量缩放)
    pub run_hours_per_unit: f64,    // 单件加工工时
    pub is_inspection_point: bool,  // 检验点标记
}

// ==========================================
// WorkCenter - 工作中心
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCenter {
    pub work_center_id: String,
    pub code: String,
    pub name: String,
    pub capacity_hours_per_day: f64, // 日产能 (小时)
    pub efficiency_factor: f64,      // 效率系数 (只读展示)
    pub availability_rate: f64,      // 可用率 (%), 由可用率重算器整体覆写
    pub is_active: bool,
}
