// ==========================================
// 生产排程与车间执行引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 所有连接统一开启外键, 统一 busy_timeout
// - 仓储共享同一连接 (Arc<Mutex<Connection>>), 事务边界在仓储内部
// ==========================================

use crate::perf;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// foreign_keys 与 busy_timeout 都是连接级设置, 每个连接都要执行
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开供多个仓储共享的连接 (附带 SQL 追踪)
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let mut conn = open_sqlite_connection(db_path)?;
    perf::install_sqlite_tracing(&mut conn);
    Ok(Arc::new(Mutex::new(conn)))
}
