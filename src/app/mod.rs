// ==========================================
// 生产排程与车间执行引擎 - 应用层
// ==========================================
// 职责: 组装共享连接 / 仓储 / 配置 / API 实例
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
