// ==========================================
// 生产排程与车间执行引擎 - 领域类型定义
// ==========================================
// 职责: 订单/工序/零件/工艺的封闭状态枚举
// 约定: 数据库存储使用 SCREAMING_SNAKE_CASE
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 生产订单状态 (Order Status)
// ==========================================
// 终态: Complete / Closed / Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,      // 草稿(未下达)
    Released,   // 已下达
    InProgress, // 生产中
    OnHold,     // 暂停
    Complete,   // 完工
    Closed,     // 关闭
    Cancelled,  // 取消
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderStatus {
    /// 从字符串解析订单状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Some(OrderStatus::Draft),
            "RELEASED" => Some(OrderStatus::Released),
            "IN_PROGRESS" => Some(OrderStatus::InProgress),
            "ON_HOLD" => Some(OrderStatus::OnHold),
            "COMPLETE" => Some(OrderStatus::Complete),
            "CLOSED" => Some(OrderStatus::Closed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Released => "RELEASED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::OnHold => "ON_HOLD",
            OrderStatus::Complete => "COMPLETE",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否参与排程 (已下达或生产中)
    pub fn is_schedulable(&self) -> bool {
        matches!(self, OrderStatus::Released | OrderStatus::InProgress)
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Complete | OrderStatus::Closed | OrderStatus::Cancelled
        )
    }
}

// ==========================================
// 工序状态 (Operation Status)
// ==========================================
// 流转: PENDING → READY → IN_PROGRESS → COMPLETE, 任意非完工态可进入 ON_HOLD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,    // 等待前序
    Ready,      // 可开工
    InProgress, // 加工中
    Complete,   // 完工
    OnHold,     // 暂停
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OperationStatus {
    /// 从字符串解析工序状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(OperationStatus::Pending),
            "READY" => Some(OperationStatus::Ready),
            "IN_PROGRESS" => Some(OperationStatus::InProgress),
            "COMPLETE" => Some(OperationStatus::Complete),
            "ON_HOLD" => Some(OperationStatus::OnHold),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Ready => "READY",
            OperationStatus::InProgress => "IN_PROGRESS",
            OperationStatus::Complete => "COMPLETE",
            OperationStatus::OnHold => "ON_HOLD",
        }
    }

    /// 是否可作为排程候选 (尚未开工)
    pub fn is_schedulable(&self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::Ready)
    }
}

// ==========================================
// 工序动作 (Transition Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Start,
    Complete,
    Hold,
    Resume,
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAction::Start => write!(f, "start"),
            TransitionAction::Complete => write!(f, "complete"),
            TransitionAction::Hold => write!(f, "hold"),
            TransitionAction::Resume => write!(f, "resume"),
        }
    }
}

impl TransitionAction {
    /// 从字符串解析动作
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "start" => Some(TransitionAction::Start),
            "complete" => Some(TransitionAction::Complete),
            "hold" => Some(TransitionAction::Hold),
            "resume" => Some(TransitionAction::Resume),
            _ => None,
        }
    }
}

// ==========================================
// 零件类型 (Part Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartType {
    Manufactured, // 自制件
    Purchased,    // 外购件
    Assembly,     // 装配件
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PartType {
    /// 从字符串解析零件类型, 未知类型按自制件处理
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "ASSEMBLY" => PartType::Assembly,
            "PURCHASED" => PartType::Purchased,
            _ => PartType::Manufactured,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PartType::Manufactured => "MANUFACTURED",
            PartType::Purchased => "PURCHASED",
            PartType::Assembly => "ASSEMBLY",
        }
    }
}

// ==========================================
// 工艺路线状态 (Routing Status)
// ==========================================
// 红线: 只有 RELEASED 的工艺可展开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingStatus {
    Draft,
    Released,
    Obsolete,
}

impl fmt::Display for RoutingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl RoutingStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "RELEASED" => RoutingStatus::Released,
            "OBSOLETE" => RoutingStatus::Obsolete,
            _ => RoutingStatus::Draft,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RoutingStatus::Draft => "DRAFT",
            RoutingStatus::Released => "RELEASED",
            RoutingStatus::Obsolete => "OBSOLETE",
        }
    }
}

// ==========================================
// 装配层工序分组标签
// ==========================================
pub const ASSEMBLY_GROUP: &str = "ASSEMBLY";
pub const INSPECT_GROUP: &str = "INSPECT";
