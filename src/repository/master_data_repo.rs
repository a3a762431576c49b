// ==========================================
// 生产排程与车间执行引擎 - 主数据仓储
// ==========================================
// 职责: part / bom / bom_item / routing / routing_operation / work_center
// 红线: 主数据只读, 唯一写入为 work_center.availability_rate (整值覆盖)
// 说明: 同一零件存在多个生效 BOM / 已发布工艺时取最高版本
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::master::{Bom, BomItem, Part, Routing, RoutingOperation, WorkCenter};
use crate::domain::types::{PartType, RoutingStatus};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::routing_explosion::MasterDataSource;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct MasterDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MasterDataRepository {
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

    /// 确保主数据表存在
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS work_center (
              work_center_id TEXT PRIMARY KEY,
              code TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              capacity_hours_per_day REAL NOT NULL DEFAULT 8.0,
              efficiency_factor REAL NOT NULL DEFAULT 1.0,
              availability_rate REAL NOT NULL DEFAULT 100.0,
              is_active INTEGER NOT NULL DEFAULT 1,
              updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS part (
              part_id TEXT PRIMARY KEY,
              part_number TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              part_type TEXT NOT NULL DEFAULT 'MANUFACTURED'
            );

            CREATE TABLE IF NOT EXISTS bom (
              bom_id TEXT PRIMARY KEY,
              part_id TEXT NOT NULL REFERENCES part(part_id),
              revision TEXT NOT NULL DEFAULT 'A',
              is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS bom_item (
              line_id INTEGER PRIMARY KEY AUTOINCREMENT,
              bom_id TEXT NOT NULL REFERENCES bom(bom_id) ON DELETE CASCADE,
              item_number INTEGER NOT NULL,
              component_part_id TEXT NOT NULL REFERENCES part(part_id),
              quantity_per REAL NOT NULL DEFAULT 1.0
            );

            CREATE TABLE IF NOT EXISTS routing (
              routing_id TEXT PRIMARY KEY,
              part_id TEXT NOT NULL REFERENCES part(part_id),
              revision TEXT NOT NULL DEFAULT 'A',
              status TEXT NOT NULL DEFAULT 'DRAFT'
            );

            CREATE TABLE IF NOT EXISTS routing_operation (
              routing_operation_id TEXT PRIMARY KEY,
              routing_id TEXT NOT NULL REFERENCES routing(routing_id) ON DELETE CASCADE,
              sequence INTEGER NOT NULL,
              work_center_id TEXT NOT NULL REFERENCES work_center(work_center_id),
              name TEXT NOT NULL,
              description TEXT,
              setup_hours REAL NOT NULL DEFAULT 0,
              run_hours_per_unit REAL NOT NULL DEFAULT 0,
              is_inspection_point INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_bom_part_active ON bom(part_id, is_active);
            CREATE INDEX IF NOT EXISTS idx_bom_item_bom ON bom_item(bom_id, item_number);
            CREATE INDEX IF NOT EXISTS idx_routing_part_status ON routing(part_id, status);
            CREATE INDEX IF NOT EXISTS idx_routing_operation_routing
              ON routing_operation(routing_id, sequence);
            "#,
        )?;
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_part(&self, part_id: &str) -> RepositoryResult<Option<Part>> {
        let conn = self.get_conn()?;
        let part = conn
            .query_row(
                "SELECT part_id, part_number, name, part_type FROM part WHERE part_id = ?1",
                params![part_id],
                |row| {
                    Ok(Part {
                        part_id: row.get(0)?,
                        part_number: row.get(1)?,
                        name: row.get(2)?,
                        part_type: PartType::from_str(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(part)
    }

    /// 零件当前生效 BOM 及其行 (按 item_number, line_id 排序)
    pub fn find_active_bom(&self, part_id: &str) -> RepositoryResult<Option<(Bom, Vec<BomItem>)>> {
        let conn = self.get_conn()?;
        let bom = conn
            .query_row(
                r#"
                SELECT bom_id, part_id, revision, is_active
                FROM bom
                WHERE part_id = ?1 AND is_active = 1
                ORDER BY revision DESC
                LIMIT 1
                "#,
                params![part_id],
                |row| {
                    Ok(Bom {
                        bom_id: row.get(0)?,
                        part_id: row.get(1)?,
                        revision: row.get(2)?,
                        is_active: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;

        let Some(bom) = bom else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT line_id, bom_id, item_number, component_part_id, quantity_per
            FROM bom_item
            WHERE bom_id = ?1
            ORDER BY item_number ASC, line_id ASC
            "#,
        )?;
        let items = stmt
            .query_map(params![bom.bom_id], |row| {
                Ok(BomItem {
                    line_id: row.get(0)?,
                    bom_id: row.get(1)?,
                    item_number: row.get(2)?,
                    component_part_id: row.get(3)?,
                    quantity_per: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some((bom, items)))
    }

    /// 零件已发布工艺及其工序 (按 sequence 排序)
    pub fn find_released_routing(
        &self,
        part_id: &str,
    ) -> RepositoryResult<Option<(Routing, Vec<RoutingOperation>)>> {
        let conn = self.get_conn()?;
        let routing = conn
            .query_row(
                r#"
                SELECT routing_id, part_id, revision, status
                FROM routing
                WHERE part_id = ?1 AND status = ?2
                ORDER BY revision DESC
                LIMIT 1
                "#,
                params![part_id, RoutingStatus::Released.to_db_str()],
                |row| {
                    Ok(Routing {
                        routing_id: row.get(0)?,
                        part_id: row.get(1)?,
                        revision: row.get(2)?,
                        status: RoutingStatus::from_str(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;

        let Some(routing) = routing else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT routing_operation_id, routing_id, sequence, work_center_id, name,
                   description, setup_hours, run_hours_per_unit, is_inspection_point
            FROM routing_operation
            WHERE routing_id = ?1
            ORDER BY sequence ASC
            "#,
        )?;
        let ops = stmt
            .query_map(params![routing.routing_id], |row| {
                Ok(RoutingOperation {
                    routing_operation_id: row.get(0)?,
                    routing_id: row.get(1)?,
                    sequence: row.get(2)?,
                    work_center_id: row.get(3)?,
                    name: row.get(4)?,
                    description: row.get(5)?,
                    setup_hours: row.get(6)?,
                    run_hours_per_unit: row.get(7)?,
                    is_inspection_point: row.get::<_, i64>(8)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some((routing, ops)))
    }

    pub fn find_work_center(&self, work_center_id: &str) -> RepositoryResult<Option<WorkCenter>> {
        let conn = self.get_conn()?;
        let wc = conn
            .query_row(
                &format!("{} WHERE work_center_id = ?1", WORK_CENTER_SELECT),
                params![work_center_id],
                map_work_center,
            )
            .optional()?;
        Ok(wc)
    }

    /// 启用中的工作中心 (按 code 排序)
    pub fn list_active_work_centers(&self) -> RepositoryResult<Vec<WorkCenter>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE is_active = 1 ORDER BY code ASC",
            WORK_CENTER_SELECT
        ))?;
        let rows = stmt
            .query_map([], map_work_center)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 按 ID 批量查询 (不存在的 ID 被忽略)
    pub fn list_work_centers_by_ids(&self, ids: &[String]) -> RepositoryResult<Vec<WorkCenter>> {
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(wc) = self.find_work_center(id)? {
                result.push(wc);
            }
        }
        result.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(result)
    }

    // ==========================================
    // 写入: 可用率
    // ==========================================

    /// 批量覆盖可用率 (单事务)
    pub fn update_availability_rates(&self, rates: &[(String, f64)]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut updated = 0;
        for (work_center_id, rate) in rates {
            updated += tx.execute(
                r#"
                UPDATE work_center
                SET availability_rate = ?1, updated_at = datetime('now')
                WHERE work_center_id = ?2
                "#,
                params![rate, work_center_id],
            )?;
        }

        tx.commit()?;
        debug!(updated, "工作中心可用率已覆盖");
        Ok(updated)
    }
}

const WORK_CENTER_SELECT: &str = r#"
    SELECT work_center_id, code, name, capacity_hours_per_day,
           efficiency_factor, availability_rate, is_active
    FROM work_center
"#;

fn map_work_center(row: &Row) -> rusqlite::Result<WorkCenter> {
    Ok(WorkCenter {
        work_center_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        capacity_hours_per_day: row.get(3)?,
        efficiency_factor: row.get(4)?,
        availability_rate: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

// ==========================================
// 展开引擎数据源
// ==========================================

fn source_error(err: RepositoryError) -> EngineError {
    EngineError::DataSource(err.to_string())
}

impl MasterDataSource for MasterDataRepository {
    fn part(&self, part_id: &str) -> EngineResult<Option<Part>> {
        self.find_part(part_id).map_err(source_error)
    }

    fn active_bom(&self, part_id: &str) -> EngineResult<Option<(Bom, Vec<BomItem>)>> {
        self.find_active_bom(part_id).map_err(source_error)
    }

    fn released_routing(
        &self,
        part_id: &str,
    ) -> EngineResult<Option<(Routing, Vec<RoutingOperation>)>> {
        self.find_released_routing(part_id).map_err(source_error)
    }

    fn work_center(&self, work_center_id: &str) -> EngineResult<Option<WorkCenter>> {
        self.find_work_center(work_center_id).map_err(source_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> MasterDataRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        MasterDataRepository::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    fn seed(repo: &MasterDataRepository, sql: &str) {
        repo.get_conn().unwrap().execute_batch(sql).unwrap();
    }

    #[test]
    fn test_released_routing_prefers_highest_revision() {
        let repo = repo();
        seed(
            &repo,
            r#"
            INSERT INTO work_center (work_center_id, code, name) VALUES ('WC1', 'LATHE', 'Lathe');
            INSERT INTO part (part_id, part_number, name) VALUES ('P1', 'PN-1', 'Shaft');
            INSERT INTO routing VALUES ('R-A', 'P1', 'A', 'RELEASED');
            INSERT INTO routing VALUES ('R-B', 'P1', 'B', 'RELEASED');
            INSERT INTO routing VALUES ('R-C', 'P1', 'C', 'DRAFT');
            INSERT INTO routing_operation VALUES ('RO1', 'R-B', 20, 'WC1', 'Finish', NULL, 0.5, 0.1, 0);
            INSERT INTO routing_operation VALUES ('RO2', 'R-B', 10, 'WC1', 'Rough', NULL, 0.5, 0.2, 0);
            "#,
        );

        let (routing, ops) = repo.find_released_routing("P1").unwrap().unwrap();
        assert_eq!(routing.routing_id, "R-B");
        assert_eq!(
            ops.iter().map(|o| o.sequence).collect::<Vec<_>>(),
            vec![10, 20]
        );
        assert!(repo.find_released_routing("NOPE").unwrap().is_none());
    }

    #[test]
    fn test_active_bom_lines_ordered() {
        let repo = repo();
        seed(
            &repo,
            r#"
            INSERT INTO part (part_id, part_number, name, part_type) VALUES ('A', 'ASM', 'Asm', 'ASSEMBLY');
            INSERT INTO part (part_id, part_number, name) VALUES ('X', 'PN-X', 'X');
            INSERT INTO part (part_id, part_number, name) VALUES ('Y', 'PN-Y', 'Y');
            INSERT INTO bom VALUES ('B1', 'A', 'A', 1);
            INSERT INTO bom_item (bom_id, item_number, component_part_id, quantity_per) VALUES ('B1', 20, 'Y', 1.0);
            INSERT INTO bom_item (bom_id, item_number, component_part_id, quantity_per) VALUES ('B1', 10, 'X', 2.0);
            "#,
        );

        let (bom, items) = repo.find_active_bom("A").unwrap().unwrap();
        assert_eq!(bom.bom_id, "B1");
        assert_eq!(items[0].component_part_id, "X");
        assert_eq!(items[1].component_part_id, "Y");
        assert!(repo.find_part("A").unwrap().unwrap().is_assembly());
    }

    #[test]
    fn test_update_availability_rates() {
        let repo = repo();
        seed(
            &repo,
            r#"
            INSERT INTO work_center (work_center_id, code, name) VALUES ('WC1', 'A', 'A');
            INSERT INTO work_center (work_center_id, code, name, is_active) VALUES ('WC2', 'B', 'B', 0);
            "#,
        );

        let updated = repo
            .update_availability_rates(&[("WC1".to_string(), 62.5), ("GHOST".to_string(), 1.0)])
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(repo.find_work_center("WC1").unwrap().unwrap().availability_rate, 62.5);
        assert_eq!(repo.list_active_work_centers().unwrap().len(), 1);
    }
}
