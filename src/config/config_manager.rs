// ==========================================
// 生产排程与车间执行引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约定: 值格式错误时记录 warn 并回退默认值, 不中断业务
// ==========================================

use crate::config::scheduling_config_trait::SchedulingConfigReader;
use crate::db::open_sqlite_connection;
use crate::engine::routing_explosion::{DEFAULT_INSPECTION_KEYWORDS, DEFAULT_MAX_GROUP_KEY_LEN};
use crate::engine::scheduler::{DEFAULT_HORIZON_DAYS, DEFAULT_MIN_OPERATION_HOURS};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建 ConfigManager (config_kv 不存在时创建)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            guard.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS config_kv (
                  scope_id TEXT NOT NULL,
                  key TEXT NOT NULL,
                  value TEXT NOT NULL,
                  updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                  PRIMARY KEY (scope_id, key)
                );
                "#,
            )?;
        }
        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值 (upsert)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 解析配置值, 缺失或格式错误时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有 global 配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// SchedulingConfigReader Trait 实现
// ==========================================
impl SchedulingConfigReader for ConfigManager {
    fn get_horizon_days(&self) -> Result<u32, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::HORIZON_DAYS, DEFAULT_HORIZON_DAYS)
    }

    fn get_optimize_setup(&self) -> Result<bool, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::OPTIMIZE_SETUP, false)
    }

    fn get_min_operation_hours(&self) -> Result<f64, Box<dyn Error>> {
        let hours = self.get_parsed_or_default(
            config_keys::MIN_OPERATION_HOURS,
            DEFAULT_MIN_OPERATION_HOURS,
        )?;
        if hours.is_finite() && hours >= 0.0 {
            Ok(hours)
        } else {
            Ok(DEFAULT_MIN_OPERATION_HOURS)
        }
    }

    fn get_reschedule_on_release(&self) -> Result<bool, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::RESCHEDULE_ON_RELEASE, true)
    }

    fn get_max_group_key_len(&self) -> Result<usize, Box<dyn Error>> {
        let len = self.get_parsed_or_default(config_keys::MAX_GROUP_KEY_LEN, DEFAULT_MAX_GROUP_KEY_LEN)?;
        Ok(len.max(1))
    }

    fn get_inspection_keywords(&self) -> Result<Vec<String>, Box<dyn Error>> {
        let defaults = || {
            DEFAULT_INSPECTION_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
        };
        let Some(raw) = self.get_global_config_value(config_keys::INSPECTION_KEYWORDS)? else {
            return Ok(defaults());
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(keywords) => Ok(keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()),
            Err(_) => {
                tracing::warn!(
                    config_key = config_keys::INSPECTION_KEYWORDS,
                    raw_value = %raw,
                    "检验关键字配置格式错误，使用默认值"
                );
                Ok(defaults())
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 排程
    pub const HORIZON_DAYS: &str = "scheduling/horizon_days";
    pub const OPTIMIZE_SETUP: &str = "scheduling/optimize_setup";
    pub const MIN_OPERATION_HOURS: &str = "scheduling/min_operation_hours";
    pub const RESCHEDULE_ON_RELEASE: &str = "scheduling/reschedule_on_release";

    // 工艺展开
    pub const MAX_GROUP_KEY_LEN: &str = "explosion/max_group_key_len";
    pub const INSPECTION_KEYWORDS: &str = "explosion/inspection_keywords"; // JSON 数组
}
