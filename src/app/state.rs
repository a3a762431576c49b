// ==========================================
// 生产排程与车间执行引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::Arc;

use crate::api::ProductionApi;
use crate::config::ConfigManager;
use crate::db::open_shared_connection;
use crate::engine::ShopFloorRepositories;

/// 应用状态
///
/// 所有仓储与配置共享同一个 SQLite 连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 生产执行API
    pub production_api: Arc<ProductionApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Err(String): 初始化错误 (含失败环节)
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn =
            open_shared_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;

        let repos = ShopFloorRepositories::from_connection(conn.clone())
            .map_err(|e| format!("无法创建仓储: {}", e))?;

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        let production_api = Arc::new(ProductionApi::new(repos, config_manager.clone()));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config_manager,
            production_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 `SHOPFLOOR_DB_PATH` > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SHOPFLOOR_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./shopfloor_exec.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("shopfloor-exec");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("shopfloor_exec.db");
        }
    }

    path.to_string_lossy().to_string()
}
