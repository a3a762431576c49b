// ==========================================
// 生产排程与车间执行引擎 - 维护入口
// ==========================================
// 用法:
//   shopfloor-exec [db_path] [horizon_days]
//
// 执行一次全量排程与可用率重算, 输出 JSON 摘要
// ==========================================

use serde_json::json;

use shopfloor_exec::api::SchedulingFilter;
use shopfloor_exec::app::{get_default_db_path, AppState};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    shopfloor_exec::logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);
    let horizon_days = match args.next() {
        Some(raw) => Some(
            raw.trim()
                .parse::<u32>()
                .map_err(|e| format!("horizon_days 无效 ({}): {}", raw, e))?,
        ),
        None => None,
    };

    tracing::info!(
        db_path = %db_path,
        version = shopfloor_exec::VERSION,
        "{} 维护排程启动",
        shopfloor_exec::APP_NAME
    );

    let state = AppState::new(db_path)?;
    let api = &state.production_api;

    let result = api.run_scheduling(&SchedulingFilter::default(), horizon_days, None)?;
    let rates = api.recalculate_availability(None, horizon_days)?;

    let summary = json!({
        "scheduled": result.scheduled.len(),
        "conflicts": result.conflicts.len(),
        "affected_work_centers": result.affected_work_centers,
        "availability": rates,
        "details": {
            "scheduled": result.scheduled,
            "conflicts": result.conflicts,
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
