// ==========================================
// 生产排程与车间执行引擎 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 校验失败必须输出原因
// ==========================================

pub mod availability;
pub mod calendar;
pub mod error;
pub mod operation_state;
pub mod repositories;
pub mod routing_explosion;
pub mod scheduler;

// 重导出核心引擎
pub use availability::{AvailabilityRecalculator, AvailabilitySnapshot};
pub use error::{EngineError, EngineResult};
pub use operation_state::{
    GroupIndex, OperationStateMachine, OrderWorkset, TransitionOutcome, TransitionPayload,
};
pub use repositories::ShopFloorRepositories;
pub use routing_explosion::{ExplosionConfig, MasterDataSource, RoutingExplosionEngine};
pub use scheduler::{
    ConflictReason, FiniteCapacityScheduler, ScheduleRequest, ScheduleResult,
    ScheduledOperation, SchedulingConflict,
};
