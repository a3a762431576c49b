// ==========================================
// 生产排程与车间执行引擎 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合执行/排程流程所需的 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{MasterDataRepository, ProductionOrderRepository, RepositoryResult};

/// 车间执行仓储集合
///
/// - `master_data_repo`: 零件/BOM/工艺/工作中心 (只读 + 可用率)
/// - `order_repo`: 生产订单与工序
#[derive(Clone)]
pub struct ShopFloorRepositories {
    pub master_data_repo: Arc<MasterDataRepository>,
    pub order_repo: Arc<ProductionOrderRepository>,
}

impl ShopFloorRepositories {
    pub fn new(
        master_data_repo: Arc<MasterDataRepository>,
        order_repo: Arc<ProductionOrderRepository>,
    ) -> Self {
        Self {
            master_data_repo,
            order_repo,
        }
    }

    /// 基于同一共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        Ok(Self {
            master_data_repo: Arc::new(MasterDataRepository::from_connection(conn.clone())?),
            order_repo: Arc::new(ProductionOrderRepository::from_connection(conn)?),
        })
    }
}

// 注: 聚合结构体本身无逻辑, 其正确性由 ProductionApi 的集成测试覆盖
