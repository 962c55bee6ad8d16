// ==========================================
// 结构分析结果导入系统 - SQLite 连接与 schema
// ==========================================
// 目标:
// - 所有 Connection::open 统一 PRAGMA（外键 / busy_timeout）
// - 集中建表, 测试与命令行共用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;
use tracing::info;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启（项目级联删除依赖它）
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接并确保 schema 存在
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    info!(version = CURRENT_SCHEMA_VERSION, "数据库 schema 已就绪");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

-- ===== 参考数据 =====

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS result_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    analysis_type TEXT NOT NULL DEFAULT 'TH',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    sort_order INTEGER NOT NULL,
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS load_cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS elements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    element_type TEXT NOT NULL,
    name TEXT NOT NULL,
    unique_name TEXT NOT NULL,
    UNIQUE (project_id, element_type, unique_name)
);

-- ===== 事实记录 =====

CREATE TABLE IF NOT EXISTS story_drifts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    load_case_id INTEGER NOT NULL REFERENCES load_cases(id) ON DELETE CASCADE,
    direction TEXT NOT NULL,
    drift REAL NOT NULL,
    max_drift REAL,
    min_drift REAL,
    story_sort_order INTEGER NOT NULL DEFAULT 0,
    source_file TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_story_drifts_rs_lc ON story_drifts(result_set_id, load_case_id);

CREATE TABLE IF NOT EXISTS story_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    result_type TEXT NOT NULL,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    load_case_id INTEGER NOT NULL REFERENCES load_cases(id) ON DELETE CASCADE,
    direction TEXT NOT NULL,
    value REAL NOT NULL,
    max_value REAL,
    min_value REAL,
    story_sort_order INTEGER NOT NULL DEFAULT 0,
    source_file TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_story_results_rs_cat ON story_results(result_set_id, category, load_case_id);

CREATE TABLE IF NOT EXISTS element_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    result_type TEXT NOT NULL,
    element_id INTEGER NOT NULL REFERENCES elements(id) ON DELETE CASCADE,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    load_case_id INTEGER NOT NULL REFERENCES load_cases(id) ON DELETE CASCADE,
    direction TEXT NOT NULL,
    value REAL NOT NULL,
    max_value REAL,
    min_value REAL,
    story_sort_order INTEGER NOT NULL DEFAULT 0,
    source_file TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_element_results_rs_cat ON element_results(result_set_id, category, load_case_id);

CREATE TABLE IF NOT EXISTS column_axials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    element_id INTEGER NOT NULL REFERENCES elements(id) ON DELETE CASCADE,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    load_case_id INTEGER NOT NULL REFERENCES load_cases(id) ON DELETE CASCADE,
    min_axial REAL NOT NULL,
    story_sort_order INTEGER NOT NULL DEFAULT 0,
    source_file TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_column_axials_rs_lc ON column_axials(result_set_id, load_case_id);

-- ===== 宽表缓存 =====

CREATE TABLE IF NOT EXISTS global_results_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    result_type TEXT NOT NULL,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    story_sort_order INTEGER NOT NULL DEFAULT 0,
    results_matrix TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (project_id, result_set_id, result_type, story_id)
);

CREATE TABLE IF NOT EXISTS element_results_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    result_type TEXT NOT NULL,
    element_id INTEGER NOT NULL REFERENCES elements(id) ON DELETE CASCADE,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    story_sort_order INTEGER NOT NULL DEFAULT 0,
    results_matrix TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (project_id, result_set_id, result_type, element_id, story_id)
);

CREATE TABLE IF NOT EXISTS story_drift_abs_maxmin (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    load_case_id INTEGER NOT NULL REFERENCES load_cases(id) ON DELETE CASCADE,
    direction TEXT NOT NULL,
    absolute_max_drift REAL NOT NULL,
    sign TEXT NOT NULL,
    original_max REAL NOT NULL,
    original_min REAL NOT NULL
);

-- ===== 导入审计 =====

CREATE TABLE IF NOT EXISTS import_runs (
    id TEXT PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    result_set_id INTEGER NOT NULL REFERENCES result_sets(id) ON DELETE CASCADE,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    files_json TEXT NOT NULL,
    files_processed INTEGER NOT NULL,
    record_count INTEGER NOT NULL,
    errors_json TEXT NOT NULL,
    cancelled INTEGER NOT NULL DEFAULT 0
);
"#;
