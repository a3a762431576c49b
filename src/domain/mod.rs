// ==========================================
// 生产排程与车间执行引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、产能约束接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod capacity;
pub mod master;
pub mod order;
pub mod types;

// 重导出核心类型
pub use capacity::{CapacityConstraint, CapacityLedger, DayCapacity, LedgerEntry};
pub use master::{Bom, BomItem, Part, Routing, RoutingOperation, WorkCenter};
pub use order::{Operation, OperationDraft, ProductionOrder};
pub use types::{
    OperationStatus, OrderStatus, PartType, RoutingStatus, TransitionAction, ASSEMBLY_GROUP,
    INSPECT_GROUP,
};
