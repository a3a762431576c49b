// ==========================================
// 生产排程与车间执行引擎 - API 层
// ==========================================
// 职责: 对外暴露工艺展开 / 工序流转 / 排程 / 可用率重算
// ==========================================

pub mod error;
pub mod production_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use production_api::{ProductionApi, ReleaseResponse, SchedulingFilter, TransitionResponse};
