// ==========================================
// 生产排程与车间执行引擎 - 仓储层错误类型
// ==========================================
// 分类依据 SQLite 扩展错误码, 不做消息文本匹配
// ==========================================

use rusqlite::{ffi, ErrorCode};
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    // SQLITE_BUSY / SQLITE_LOCKED: 超过 busy_timeout 仍未拿到锁
    #[error("数据库忙: {0}")]
    Busy(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    // ===== 并发控制 =====
    #[error("记录已被并发修改: {entity} with id={id}")]
    ConcurrentModification { entity: String, id: String },

    // ===== 列值解码 =====
    #[error("列值错误 (column={column}): {message}")]
    InvalidColumn { column: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, msg) => {
                let message = msg.clone().unwrap_or_else(|| err.to_string());
                match failure.code {
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                        RepositoryError::Busy(message)
                    }
                    ErrorCode::ConstraintViolation => match failure.extended_code {
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                            RepositoryError::UniqueConstraintViolation(message)
                        }
                        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                            RepositoryError::ForeignKeyViolation(message)
                        }
                        _ => RepositoryError::DatabaseQueryError(message),
                    },
                    _ => RepositoryError::DatabaseQueryError(message),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::not_found("Row", "-"),
            rusqlite::Error::FromSqlConversionFailure(index, _, cause) => {
                RepositoryError::InvalidColumn {
                    column: format!("#{}", index),
                    message: cause.to_string(),
                }
            }
            rusqlite::Error::InvalidColumnType(_, name, ty) => RepositoryError::InvalidColumn {
                column: name.clone(),
                message: format!("意外的列类型 {}", ty),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
