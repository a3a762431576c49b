// ==========================================
// 生产排程与车间执行引擎 - 排程配置读取 Trait
// ==========================================
// 职责: 定义排程/展开所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use std::error::Error;

// ==========================================
// SchedulingConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
// 测试: MockConfig
pub trait SchedulingConfigReader: Send + Sync {
    // ===== 排程 =====

    /// 排程窗口天数
    ///
    /// # 默认值
    /// - 30
    fn get_horizon_days(&self) -> Result<u32, Box<dyn Error>>;

    /// 是否按零件聚类以减少换型
    ///
    /// # 默认值
    /// - false
    fn get_optimize_setup(&self) -> Result<bool, Box<dyn Error>>;

    /// 单工序排程工时下限 (小时)
    ///
    /// # 默认值
    /// - 1.0
    fn get_min_operation_hours(&self) -> Result<f64, Box<dyn Error>>;

    /// 订单下达后是否立即排程该订单
    ///
    /// # 默认值
    /// - true
    fn get_reschedule_on_release(&self) -> Result<bool, Box<dyn Error>>;

    // ===== 工艺展开 =====

    /// 组件分组键最大长度
    ///
    /// # 默认值
    /// - 50
    fn get_max_group_key_len(&self) -> Result<usize, Box<dyn Error>>;

    /// 检验工序关键字 (大小写不敏感)
    ///
    /// # 默认值
    /// - ["inspect", "inspection", "qc", "quality", "cmm"]
    fn get_inspection_keywords(&self) -> Result<Vec<String>, Box<dyn Error>>;
}
