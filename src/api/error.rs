// ==========================================
// 生产排程与车间执行引擎 - API层错误类型
// ==========================================
// 职责: 将仓储/引擎错误转换为调用方可理解的错误
// 分类: 校验错误 / 状态转换错误 / 完整性错误 / 数据访问错误
// 说明: 排程冲突是结果数据, 不在此列
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 校验错误 (调用方可修正)
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("无效的状态转换: {0}")]
    InvalidStateTransition(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 完整性错误 (正确使用下不应出现)
    // ==========================================
    #[error("数据完整性错误: {0}")]
    IntegrityError(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("并发修改冲突: {0}")]
    ConcurrentModification(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("配置读取失败: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 是否调用方可修正的错误
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            ApiError::ValidationError(_)
                | ApiError::InvalidStateTransition(_)
                | ApiError::NotFound(_)
                | ApiError::BusinessRuleViolation(_)
        )
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::Busy(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ConcurrentModification { entity, id } => {
                ApiError::ConcurrentModification(format!("{}(id={})已被其他操作修改", entity, id))
            }
            RepositoryError::InvalidColumn { column, message } => {
                ApiError::IntegrityError(format!("列{}错误: {}", column, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::InvalidQuantity { .. } | EngineError::MissingMasterData(_) => {
                ApiError::ValidationError(message)
            }
            EngineError::InvalidStateTransition { .. }
            | EngineError::GroupNotReleased { .. }
            | EngineError::PredecessorIncomplete { .. }
            | EngineError::OrderNotActive { .. } => ApiError::InvalidStateTransition(message),
            EngineError::NoRoutingOrBom { .. }
            | EngineError::CircularBom { .. }
            | EngineError::UnknownWorkCenter { .. }
            | EngineError::OperationNotInOrder { .. } => ApiError::IntegrityError(message),
            EngineError::DataSource(msg) => ApiError::DatabaseError(msg),
        }
    }
}

// ==========================================
// 从配置读取错误转换
// ==========================================
impl From<Box<dyn std::error::Error>> for ApiError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
