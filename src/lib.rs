// ==========================================
// 生产排程与车间执行引擎 - 核心库
// ==========================================
// 组成: 工艺展开 / 工序状态机 / 有限产能排程 / 可用率重算
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// SQL 追踪与耗时统计
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 实例装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{OperationStatus, OrderStatus, PartType, RoutingStatus, TransitionAction};

// 领域实体
pub use domain::{
    Bom, BomItem, CapacityLedger, Operation, OperationDraft, Part, ProductionOrder, Routing,
    RoutingOperation, WorkCenter,
};

// 引擎
pub use engine::{
    AvailabilityRecalculator, FiniteCapacityScheduler, OperationStateMachine,
    RoutingExplosionEngine,
};

// API
pub use api::ProductionApi;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产排程与车间执行引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
