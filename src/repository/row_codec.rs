// ==========================================
// 生产排程与车间执行引擎 - 行编解码
// ==========================================
// 约定: 日期 %Y-%m-%d, 时间戳 RFC3339, 状态 SCREAMING_SNAKE_CASE
// 解析失败返回 FromSqlConversionFailure, 不做静默兜底
// ==========================================

use crate::domain::types::{OperationStatus, OrderStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

pub fn fmt_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

pub fn fmt_timestamp(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

pub fn parse_date(column: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| conversion_error(column, format!("日期格式错误 '{}': {}", s, e)))
    })
    .transpose()
}

pub fn parse_timestamp(
    column: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(column, format!("时间格式错误 '{}': {}", s, e)))
    })
    .transpose()
}

pub fn parse_order_status(column: usize, raw: &str) -> rusqlite::Result<OrderStatus> {
    OrderStatus::from_str(raw)
        .ok_or_else(|| conversion_error(column, format!("未知订单状态: {}", raw)))
}

pub fn parse_operation_status(column: usize, raw: &str) -> rusqlite::Result<OperationStatus> {
    OperationStatus::from_str(raw)
        .ok_or_else(|| conversion_error(column, format!("未知工序状态: {}", raw)))
}
