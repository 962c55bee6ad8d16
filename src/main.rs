// 导入一个目录下的全部结果工作簿并输出运行摘要（JSON）。
//
// Usage:
//   result-ingest <folder> [db_path] [project] [result_set]
//
// 全选发现的全部工况; 跨文件冲突由排序靠前的文件导入。

use anyhow::{anyhow, Context};
use result_ingest::config::{default_db_path, ConfigManager, ImportSettings};
use result_ingest::db::open_and_init;
use result_ingest::{logging, ImportPipeline};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let folder = match args.next() {
        Some(folder) => PathBuf::from(folder),
        None => {
            eprintln!("usage: result-ingest <folder> [db_path] [project] [result_set]");
            std::process::exit(2);
        }
    };
    let db_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(default_db_path);
    let project = args.next().unwrap_or_else(|| "Default".to_string());

    tracing::info!("{} v{}", result_ingest::APP_NAME, result_ingest::VERSION);
    tracing::info!("使用数据库: {}", db_path.display());

    let conn = open_and_init(&db_path.to_string_lossy())
        .with_context(|| format!("打开数据库失败: {}", db_path.display()))?;
    let conn = Arc::new(Mutex::new(conn));
    let config = ConfigManager::from_connection(conn.clone())
        .map_err(|e| anyhow!("配置初始化失败: {}", e))?;
    let settings = ImportSettings::load(&config)
        .await
        .map_err(|e| anyhow!("导入配置加载失败: {}", e))?;
    let result_set = args
        .next()
        .unwrap_or_else(|| settings.default_result_set.clone());

    let pipeline = Arc::new(ImportPipeline::new(conn, settings));
    let outcome = pipeline
        .import_folder(&folder, &project, &result_set, |event| {
            tracing::info!(
                current = event.current,
                total = event.total,
                "{}",
                event.message
            );
        })
        .await
        .with_context(|| format!("导入目录失败: {}", folder.display()))?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
