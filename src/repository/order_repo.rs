// ==========================================
// 生产排程与车间执行引擎 - 生产订单/工序仓储
// ==========================================
// 职责: production_order / production_operation 读写
// 红线:
// - 仓储不含业务规则, 状态流转由引擎决定后整体落库
// - 多行写入一律单事务
// - 排程写入带守卫 (scheduled_start IS NULL), 不覆盖并发写入
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::capacity::LedgerEntry;
use crate::domain::order::{Operation, ProductionOrder};
use crate::domain::types::{OperationStatus, OrderStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{
    fmt_date, fmt_timestamp, parse_date, parse_operation_status, parse_order_status,
    parse_timestamp,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 排程写入行: (工序ID, 开工日, 完工日)
pub type SchedulePlacement<'a> = (&'a str, NaiveDate, NaiveDate);

pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOrderRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_table()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS production_order (
              order_id TEXT PRIMARY KEY,
              order_number TEXT NOT NULL UNIQUE,
              part_id TEXT NOT NULL,
              quantity_ordered REAL NOT NULL,
              status TEXT NOT NULL DEFAULT 'DRAFT',
              priority INTEGER NOT NULL DEFAULT 5,
              due_date TEXT,
              released_at TEXT,
              completed_at TEXT,
              updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS production_operation (
              operation_id TEXT PRIMARY KEY,
              order_id TEXT NOT NULL REFERENCES production_order(order_id) ON DELETE CASCADE,
              sequence INTEGER NOT NULL,
              component_part_id TEXT,
              operation_group TEXT,
              work_center_id TEXT NOT NULL,
              name TEXT NOT NULL,
              description TEXT,
              is_inspection INTEGER NOT NULL DEFAULT 0,
              setup_hours REAL NOT NULL DEFAULT 0,
              run_hours REAL NOT NULL DEFAULT 0,
              actual_setup_hours REAL NOT NULL DEFAULT 0,
              actual_run_hours REAL NOT NULL DEFAULT 0,
              quantity_complete REAL NOT NULL DEFAULT 0,
              quantity_scrapped REAL NOT NULL DEFAULT 0,
              status TEXT NOT NULL DEFAULT 'PENDING',
              scheduled_start TEXT,
              scheduled_end TEXT,
              actual_start TEXT,
              actual_end TEXT,
              started_by TEXT,
              completed_by TEXT,
              notes TEXT,
              UNIQUE(order_id, sequence)
            );

            CREATE INDEX IF NOT EXISTS idx_production_order_status
              ON production_order(status);
            CREATE INDEX IF NOT EXISTS idx_operation_wc_start
              ON production_operation(work_center_id, scheduled_start);
            CREATE INDEX IF NOT EXISTS idx_operation_status
              ON production_operation(status);
            "#,
        )?;
        Ok(())
    }

    // ==========================================
    // 订单
    // ==========================================

    pub fn insert_order(&self, order: &ProductionOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO production_order (
                order_id, order_number, part_id, quantity_ordered, status,
                priority, due_date, released_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                order.order_id,
                order.order_number,
                order.part_id,
                order.quantity_ordered,
                order.status.to_db_str(),
                order.priority,
                fmt_date(order.due_date),
                fmt_timestamp(order.released_at),
                fmt_timestamp(order.completed_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_order(&self, order_id: &str) -> RepositoryResult<Option<ProductionOrder>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                &format!("{} WHERE order_id = ?1", ORDER_SELECT),
                params![order_id],
                map_order,
            )
            .optional()?;
        Ok(order)
    }

    pub fn get_order(&self, order_id: &str) -> RepositoryResult<ProductionOrder> {
        self.find_order(order_id)?
            .ok_or_else(|| RepositoryError::not_found("ProductionOrder", order_id))
    }

    /// 修改订单优先级 (调整后需 unschedule + 重新排程才会生效)
    pub fn update_priority(&self, order_id: &str, priority: i32) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"
            UPDATE production_order
            SET priority = ?1, updated_at = datetime('now')
            WHERE order_id = ?2
            "#,
            params![priority, order_id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::not_found("ProductionOrder", order_id));
        }
        Ok(())
    }

    // ==========================================
    // 工序
    // ==========================================

    pub fn list_operations(&self, order_id: &str) -> RepositoryResult<Vec<Operation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE order_id = ?1 ORDER BY sequence ASC",
            OPERATION_SELECT
        ))?;
        let ops = stmt
            .query_map(params![order_id], map_operation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ops)
    }

    pub fn find_operation(&self, operation_id: &str) -> RepositoryResult<Option<Operation>> {
        let conn = self.get_conn()?;
        let op = conn
            .query_row(
                &format!("{} WHERE operation_id = ?1", OPERATION_SELECT),
                params![operation_id],
                map_operation,
            )
            .optional()?;
        Ok(op)
    }

    /// 已下达/生产中订单及其全部工序 (排程输入)
    pub fn list_active_orders_with_operations(
        &self,
        order_filter: Option<&str>,
    ) -> RepositoryResult<Vec<(ProductionOrder, Vec<Operation>)>> {
        let orders = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(&format!(
                r#"{} WHERE status IN (?1, ?2) AND (?3 IS NULL OR order_id = ?3)
                   ORDER BY order_id ASC"#,
                ORDER_SELECT
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        OrderStatus::Released.to_db_str(),
                        OrderStatus::InProgress.to_db_str(),
                        order_filter
                    ],
                    map_order,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let ops = self.list_operations(&order.order_id)?;
            result.push((order, ops));
        }
        Ok(result)
    }

    // ==========================================
    // 下达: 写入工序 + 订单状态 (单事务)
    // ==========================================

    /// 订单下达
    ///
    /// 仅当订单仍为 DRAFT 时生效, 否则整体回滚
    pub fn release_with_operations(
        &self,
        order_id: &str,
        operations: &[Operation],
        released_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let changed = tx.execute(
            r#"
            UPDATE production_order
            SET status = ?1, released_at = ?2, updated_at = datetime('now')
            WHERE order_id = ?3 AND status = ?4
            "#,
            params![
                OrderStatus::Released.to_db_str(),
                released_at.to_rfc3339(),
                order_id,
                OrderStatus::Draft.to_db_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::ConcurrentModification {
                entity: "ProductionOrder".to_string(),
                id: order_id.to_string(),
            });
        }

        for op in operations {
            insert_operation(&tx, op)?;
        }

        tx.commit()?;
        info!(order_id = %order_id, operations = operations.len(), "订单已下达");
        Ok(())
    }

    // ==========================================
    // 状态流转落库 (单事务)
    // ==========================================

    /// 持久化一次状态流转的全部变更
    pub fn apply_transition(
        &self,
        order: &ProductionOrder,
        changed: &[&Operation],
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        for op in changed {
            let updated = tx.execute(
                r#"
                UPDATE production_operation SET
                    status = ?1,
                    actual_setup_hours = ?2,
                    actual_run_hours = ?3,
                    quantity_complete = ?4,
                    quantity_scrapped = ?5,
                    actual_start = ?6,
                    actual_end = ?7,
                    started_by = ?8,
                    completed_by = ?9,
                    notes = ?10
                WHERE operation_id = ?11
                "#,
                params![
                    op.status.to_db_str(),
                    op.actual_setup_hours,
                    op.actual_run_hours,
                    op.quantity_complete,
                    op.quantity_scrapped,
                    fmt_timestamp(op.actual_start),
                    fmt_timestamp(op.actual_end),
                    op.started_by,
                    op.completed_by,
                    op.notes,
                    op.operation_id,
                ],
            )?;
            if updated == 0 {
                return Err(RepositoryError::not_found("Operation", &op.operation_id));
            }
        }

        tx.execute(
            r#"
            UPDATE production_order
            SET status = ?1, completed_at = ?2, updated_at = datetime('now')
            WHERE order_id = ?3
            "#,
            params![
                order.status.to_db_str(),
                fmt_timestamp(order.completed_at),
                order.order_id,
            ],
        )?;

        tx.commit()?;
        debug!(order_id = %order.order_id, operations = changed.len(), "状态流转已落库");
        Ok(())
    }

    // ==========================================
    // 排程
    // ==========================================

    /// 台账聚合: 窗口内未完工且已排程的工序, 按 (工作中心, 开工日) 求和
    ///
    /// 单工序工时取 max(setup + run, min_hours), 与排程记账口径一致
    pub fn load_ledger_entries(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
        min_hours: f64,
    ) -> RepositoryResult<Vec<LedgerEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT work_center_id,
                   scheduled_start,
                   SUM(MAX(setup_hours + run_hours, ?1)) AS hours
            FROM production_operation
            WHERE status <> ?2
              AND scheduled_start IS NOT NULL
              AND scheduled_start BETWEEN ?3 AND ?4
            GROUP BY work_center_id, scheduled_start
            ORDER BY work_center_id, scheduled_start
            "#,
        )?;
        let entries = stmt
            .query_map(
                params![
                    min_hours,
                    OperationStatus::Complete.to_db_str(),
                    fmt_date(Some(window_start)),
                    fmt_date(Some(window_end)),
                ],
                |row| {
                    let date = parse_date(1, row.get(1)?)?.ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(
                            1,
                            "scheduled_start".to_string(),
                            rusqlite::types::Type::Null,
                        )
                    })?;
                    Ok(LedgerEntry {
                        work_center_id: row.get(0)?,
                        date,
                        hours: row.get(2)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// 写入排程日期 (守卫: scheduled_start IS NULL)
    ///
    /// # 返回
    /// 因已被并发写入而未更新的工序ID
    pub fn write_schedule(&self, placements: &[SchedulePlacement<'_>]) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut rejected = Vec::new();
        for (operation_id, start, end) in placements {
            let changed = tx.execute(
                r#"
                UPDATE production_operation
                SET scheduled_start = ?1, scheduled_end = ?2
                WHERE operation_id = ?3 AND scheduled_start IS NULL
                "#,
                params![fmt_date(Some(*start)), fmt_date(Some(*end)), operation_id],
            )?;
            if changed == 0 {
                rejected.push(operation_id.to_string());
            }
        }

        tx.commit()?;
        Ok(rejected)
    }

    /// 清除订单未开工工序的排程
    ///
    /// # 返回
    /// 受影响的工作中心 (升序)
    pub fn clear_schedule(&self, order_id: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let affected: BTreeSet<String> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT DISTINCT work_center_id
                FROM production_operation
                WHERE order_id = ?1
                  AND status IN (?2, ?3)
                  AND scheduled_start IS NOT NULL
                "#,
            )?;
            let rows = stmt
                .query_map(
                    params![
                        order_id,
                        OperationStatus::Pending.to_db_str(),
                        OperationStatus::Ready.to_db_str()
                    ],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<BTreeSet<_>, _>>()?;
            rows
        };

        tx.execute(
            r#"
            UPDATE production_operation
            SET scheduled_start = NULL, scheduled_end = NULL
            WHERE order_id = ?1 AND status IN (?2, ?3)
            "#,
            params![
                order_id,
                OperationStatus::Pending.to_db_str(),
                OperationStatus::Ready.to_db_str()
            ],
        )?;

        tx.commit()?;
        Ok(affected.into_iter().collect())
    }
}

// ==========================================
// 行映射
// ==========================================

const ORDER_SELECT: &str = r#"
    SELECT order_id, order_number, part_id, quantity_ordered, status,
           priority, due_date, released_at, completed_at
    FROM production_order
"#;

const OPERATION_SELECT: &str = r#"
    SELECT operation_id, order_id, sequence, component_part_id, operation_group,
           work_center_id, name, description, is_inspection, setup_hours, run_hours,
           actual_setup_hours, actual_run_hours, quantity_complete, quantity_scrapped,
           status, scheduled_start, scheduled_end, actual_start, actual_end,
           started_by, completed_by, notes
    FROM production_operation
"#;

fn map_order(row: &Row) -> rusqlite::Result<ProductionOrder> {
    Ok(ProductionOrder {
        order_id: row.get(0)?,
        order_number: row.get(1)?,
        part_id: row.get(2)?,
        quantity_ordered: row.get(3)?,
        status: parse_order_status(4, &row.get::<_, String>(4)?)?,
        priority: row.get(5)?,
        due_date: parse_date(6, row.get(6)?)?,
        released_at: parse_timestamp(7, row.get(7)?)?,
        completed_at: parse_timestamp(8, row.get(8)?)?,
    })
}

fn map_operation(row: &Row) -> rusqlite::Result<Operation> {
    Ok(Operation {
        operation_id: row.get(0)?,
        order_id: row.get(1)?,
        sequence: row.get(2)?,
        component_part_id: row.get(3)?,
        operation_group: row.get(4)?,
        work_center_id: row.get(5)?,
        name: row.get(6)?,
        description: row.get(7)?,
        is_inspection: row.get::<_, i64>(8)? != 0,
        setup_hours: row.get(9)?,
        run_hours: row.get(10)?,
        actual_setup_hours: row.get(11)?,
        actual_run_hours: row.get(12)?,
        quantity_complete: row.get(13)?,
        quantity_scrapped: row.get(14)?,
        status: parse_operation_status(15, &row.get::<_, String>(15)?)?,
        scheduled_start: parse_date(16, row.get(16)?)?,
        scheduled_end: parse_date(17, row.get(17)?)?,
        actual_start: parse_timestamp(18, row.get(18)?)?,
        actual_end: parse_timestamp(19, row.get(19)?)?,
        started_by: row.get(20)?,
        completed_by: row.get(21)?,
        notes: row.get(22)?,
    })
}

fn insert_operation(conn: &Connection, op: &Operation) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT INTO production_operation (
            operation_id, order_id, sequence, component_part_id, operation_group,
            work_center_id, name, description, is_inspection, setup_hours, run_hours,
            actual_setup_hours, actual_run_hours, quantity_complete, quantity_scrapped,
            status, scheduled_start, scheduled_end, actual_start, actual_end,
            started_by, completed_by, notes
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23
        )
        "#,
        params![
            op.operation_id,
            op.order_id,
            op.sequence,
            op.component_part_id,
            op.operation_group,
            op.work_center_id,
            op.name,
            op.description,
            op.is_inspection as i64,
            op.setup_hours,
            op.run_hours,
            op.actual_setup_hours,
            op.actual_run_hours,
            op.quantity_complete,
            op.quantity_scrapped,
            op.status.to_db_str(),
            fmt_date(op.scheduled_start),
            fmt_date(op.scheduled_end),
            fmt_timestamp(op.actual_start),
            fmt_timestamp(op.actual_end),
            op.started_by,
            op.completed_by,
            op.notes,
        ],
    )
}
