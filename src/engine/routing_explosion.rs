// ==========================================
// 生产排程与车间执行引擎 - 工艺展开引擎
// ==========================================
// 职责: 由 BOM + 各零件已发布工艺生成订单工序清单
// 输入: 生产订单 + 主数据源
// 输出: 有序 OperationDraft 列表 (序号 10, 20, 30 ...)
// 红线: 只使用 RELEASED 工艺, 草稿工艺不作兜底
// ==========================================

use crate::domain::master::{Bom, BomItem, Part, Routing, RoutingOperation, WorkCenter};
use crate::domain::order::{OperationDraft, ProductionOrder};
use crate::domain::types::{ASSEMBLY_GROUP, INSPECT_GROUP};
use crate::engine::error::{EngineError, EngineResult};
use tracing::{debug, info, instrument, warn};

/// 序号步长
pub const SEQUENCE_STEP: i32 = 10;

/// 默认分组键最大长度
pub const DEFAULT_MAX_GROUP_KEY_LEN: usize = 50;

/// 默认检验关键字
pub const DEFAULT_INSPECTION_KEYWORDS: &[&str] = &["inspect", "inspection", "qc", "quality", "cmm"];

// ==========================================
// Trait: MasterDataSource
// ==========================================
// 用途: 展开引擎所需主数据读取接口 (引擎不拼 SQL)
// 实现者: MasterDataRepository
pub trait MasterDataSource {
    /// 查询零件
    fn part(&self, part_id: &str) -> EngineResult<Option<Part>>;

    /// 查询零件当前生效 BOM 及其行
    fn active_bom(&self, part_id: &str) -> EngineResult<Option<(Bom, Vec<BomItem>)>>;

    /// 查询零件已发布工艺及其工序
    fn released_routing(&self, part_id: &str)
        -> EngineResult<Option<(Routing, Vec<RoutingOperation>)>>;

    /// 查询工作中心
    fn work_center(&self, work_center_id: &str) -> EngineResult<Option<WorkCenter>>;
}

// ==========================================
// ExplosionConfig - 展开参数
// ==========================================
#[derive(Debug, Clone)]
pub struct ExplosionConfig {
    pub max_group_key_len: usize,
    pub inspection_keywords: Vec<String>,
}

impl Default for ExplosionConfig {
    fn default() -> Self {
        Self {
            max_group_key_len: DEFAULT_MAX_GROUP_KEY_LEN,
            inspection_keywords: DEFAULT_INSPECTION_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

// ==========================================
// RoutingExplosionEngine - 工艺展开引擎
// ==========================================
pub struct RoutingExplosionEngine {
    config: ExplosionConfig,
}

impl RoutingExplosionEngine {
    pub fn new(config: ExplosionConfig) -> Self {
        Self { config }
    }

    /// 展开订单工序
    ///
    /// 规则:
    /// 1) 非装配件或无生效 BOM: 复制自身已发布工艺, 不分组
    /// 2) 装配件: 按 (item_number, line_id) 依次展开组件工艺, 分组键为组件零件号
    /// 3) 装配件自身工艺追加在最后: 非检验工序 ASSEMBLY 组, 检验工序 INSPECT 组
    /// 4) 全局序号按 10 递增
    ///
    /// # 返回
    /// - Ok(drafts): 可能为空 (如组件均无工艺), 由调用方拒绝下达
    /// - Err(NoRoutingOrBom): 零件既无工艺也无 BOM
    #[instrument(skip(self, source), fields(order_id = %order.order_id, part_id = %order.part_id))]
    pub fn explode<S>(&self, order: &ProductionOrder, source: &S) -> EngineResult<Vec<OperationDraft>>
    where
        S: MasterDataSource + ?Sized,
    {
        validate_order_quantity(order.quantity_ordered)?;

        let part = source.part(&order.part_id)?.ok_or_else(|| {
            EngineError::MissingMasterData(format!("零件不存在: part_id={}", order.part_id))
        })?;

        let own_routing = released_only(source.released_routing(&part.part_id)?);
        let bom = if part.is_assembly() {
            source.active_bom(&part.part_id)?.filter(|(bom, _)| bom.is_active)
        } else {
            None
        };

        let mut drafts = Vec::new();

        match bom {
            None => {
                let (_, operations) = own_routing.ok_or_else(|| EngineError::NoRoutingOrBom {
                    part_id: part.part_id.clone(),
                })?;
                for op in sorted_operations(operations) {
                    drafts.push(self.draft_from(source, &op, order.quantity_ordered, None, None)?);
                }
            }
            Some((bom, items)) => {
                ensure_acyclic(source, &part.part_id, Vec::new())?;
                debug!(bom_id = %bom.bom_id, lines = items.len(), "展开装配件 BOM");

                for item in sorted_bom_items(items) {
                    let routing = released_only(source.released_routing(&item.component_part_id)?);
                    let Some((_, operations)) = routing else {
                        debug!(
                            component_part_id = %item.component_part_id,
                            item_number = item.item_number,
                            "组件无已发布工艺, 跳过"
                        );
                        continue;
                    };

                    let component_number = match source.part(&item.component_part_id)? {
                        Some(component) => component.part_number,
                        None => {
                            warn!(component_part_id = %item.component_part_id, "组件零件缺失, 以ID作为分组键");
                            item.component_part_id.clone()
                        }
                    };
                    let group = truncate_group_key(&component_number, self.config.max_group_key_len);
                    let quantity = item.quantity_per * order.quantity_ordered;

                    for op in sorted_operations(operations) {
                        drafts.push(self.draft_from(
                            source,
                            &op,
                            quantity,
                            Some(item.component_part_id.clone()),
                            Some(group.clone()),
                        )?);
                    }
                }

                if let Some((_, operations)) = own_routing {
                    let mut assembly = Vec::new();
                    let mut inspection = Vec::new();
                    for op in sorted_operations(operations) {
                        if self.is_inspection(source, &op)? {
                            inspection.push(op);
                        } else {
                            assembly.push(op);
                        }
                    }
                    for op in assembly {
                        drafts.push(self.draft_from(
                            source,
                            &op,
                            order.quantity_ordered,
                            None,
                            Some(ASSEMBLY_GROUP.to_string()),
                        )?);
                    }
                    for op in inspection {
                        drafts.push(self.draft_from(
                            source,
                            &op,
                            order.quantity_ordered,
                            None,
                            Some(INSPECT_GROUP.to_string()),
                        )?);
                    }
                }
            }
        }

        for (index, draft) in drafts.iter_mut().enumerate() {
            draft.sequence = (index as i32 + 1) * SEQUENCE_STEP;
        }

        info!(operations = drafts.len(), "工艺展开完成");
        Ok(drafts)
    }

    /// 工序是否为检验工序
    ///
    /// 检验点标记, 或名称/描述/工作中心名称包含检验关键字
    pub fn is_inspection<S>(&self, source: &S, op: &RoutingOperation) -> EngineResult<bool>
    where
        S: MasterDataSource + ?Sized,
    {
        if op.is_inspection_point {
            return Ok(true);
        }
        if self.matches_keyword(&op.name) {
            return Ok(true);
        }
        if let Some(description) = &op.description {
            if self.matches_keyword(description) {
                return Ok(true);
            }
        }
        let work_center_name = source.work_center(&op.work_center_id)?.map(|wc| wc.name);
        Ok(work_center_name
            .map(|name| self.matches_keyword(&name))
            .unwrap_or(false))
    }

    fn matches_keyword(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.config
            .inspection_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && text.contains(&keyword.to_lowercase()))
    }

    fn draft_from<S>(
        &self,
        source: &S,
        op: &RoutingOperation,
        quantity: f64,
        component_part_id: Option<String>,
        operation_group: Option<String>,
    ) -> EngineResult<OperationDraft>
    where
        S: MasterDataSource + ?Sized,
    {
        Ok(OperationDraft {
            sequence: 0,
            component_part_id,
            operation_group,
            work_center_id: op.work_center_id.clone(),
            name: op.name.clone(),
            description: op.description.clone(),
            is_inspection: self.is_inspection(source, op)?,
            setup_hours: op.setup_hours,
            run_hours: op.run_hours_per_unit * quantity,
        })
    }
}

impl Default for RoutingExplosionEngine {
    fn default() -> Self {
        Self::new(ExplosionConfig::default())
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn validate_order_quantity(quantity: f64) -> EngineResult<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(EngineError::InvalidQuantity {
            field: "quantity_ordered".to_string(),
            value: quantity,
            reason: "订单数量必须为正的有限数".to_string(),
        });
    }
    Ok(())
}

fn released_only(
    routing: Option<(Routing, Vec<RoutingOperation>)>,
) -> Option<(Routing, Vec<RoutingOperation>)> {
    routing.filter(|(routing, _)| routing.is_released())
}

fn sorted_operations(mut operations: Vec<RoutingOperation>) -> Vec<RoutingOperation> {
    operations.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.routing_operation_id.cmp(&b.routing_operation_id))
    });
    operations
}

fn sorted_bom_items(mut items: Vec<BomItem>) -> Vec<BomItem> {
    items.sort_by_key(|item| (item.item_number, item.line_id));
    items
}

/// 截断分组键 (按字符)
pub fn truncate_group_key(key: &str, max_len: usize) -> String {
    key.chars().take(max_len).collect()
}

/// BOM 循环检测
///
/// path 按值传递, 兄弟分支互不影响
pub fn ensure_acyclic<S>(source: &S, part_id: &str, path: Vec<String>) -> EngineResult<()>
where
    S: MasterDataSource + ?Sized,
{
    if path.iter().any(|visited| visited == part_id) {
        let mut cycle = path;
        cycle.push(part_id.to_string());
        return Err(EngineError::CircularBom {
            path: cycle.join(" -> "),
        });
    }

    let Some((bom, items)) = source.active_bom(part_id)? else {
        return Ok(());
    };
    if !bom.is_active {
        return Ok(());
    }

    let mut path = path;
    path.push(part_id.to_string());
    for item in items {
        ensure_acyclic(source, &item.component_part_id, path.clone())?;
    }
    Ok(())
}
