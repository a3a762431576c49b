// ==========================================
// 生产排程与车间执行引擎 - 引擎层错误类型
// ==========================================
// 分类: 校验错误 (用户可修正) / 完整性错误 (正确使用下不应出现)
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ===== 校验错误 =====
    #[error("数量无效 (field={field}, value={value}): {reason}")]
    InvalidQuantity {
        field: String,
        value: f64,
        reason: String,
    },

    #[error("无效的状态转换: status={from}, action={action}")]
    InvalidStateTransition { from: String, action: String },

    #[error("工序分组尚未放行: group={group}, active_group={active_group}")]
    GroupNotReleased { group: String, active_group: String },

    #[error("前序工序未完工: sequence={sequence}, blocking_sequence={blocking_sequence}")]
    PredecessorIncomplete {
        sequence: i32,
        blocking_sequence: i32,
    },

    #[error("订单状态不允许该操作: order_id={order_id}, status={status}")]
    OrderNotActive { order_id: String, status: String },

    #[error("主数据缺失: {0}")]
    MissingMasterData(String),

    // ===== 完整性错误 =====
    #[error("零件既无已发布工艺也无生效BOM: part_id={part_id}")]
    NoRoutingOrBom { part_id: String },

    #[error("BOM 循环引用: {path}")]
    CircularBom { path: String },

    #[error("工作中心不存在: work_center_id={work_center_id}")]
    UnknownWorkCenter { work_center_id: String },

    #[error("工序不属于订单: operation_id={operation_id}, order_id={order_id}")]
    OperationNotInOrder {
        operation_id: String,
        order_id: String,
    },

    // ===== 数据源错误 =====
    #[error("主数据读取失败: {0}")]
    DataSource(String),
}

impl EngineError {
    /// 是否完整性错误
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            EngineError::NoRoutingOrBom { .. }
                | EngineError::CircularBom { .. }
                | EngineError::UnknownWorkCenter { .. }
                | EngineError::OperationNotInOrder { .. }
        )
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
