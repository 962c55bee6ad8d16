// ==========================================
// 结构分析结果导入系统 - 参考数据仓储
// ==========================================
// 表: projects / result_sets / stories / load_cases / elements
// 规则:
// - 参考数据只追加, 首次引用时创建, 仅随项目级联删除
// - stories.sort_order 只在首次创建时写入, 之后不覆盖
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::records::{Element, ElementKey, LoadCase, Project, ResultSet, Story};
use crate::domain::types::{AnalysisType, ElementType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct ReferenceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReferenceRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 项目 / 结果集
    // ==========================================

    pub fn get_or_create_project(&self, name: &str) -> RepositoryResult<Project> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO projects (name) VALUES (?1)",
            params![name],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM projects WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(Project {
            id,
            name: name.to_string(),
        })
    }

    pub fn find_project(&self, name: &str) -> RepositoryResult<Option<Project>> {
        let conn = self.get_conn()?;
        let project = conn
            .query_row(
                "SELECT id, name FROM projects WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    /// 删除项目（级联删除其全部参考数据、事实记录与缓存）
    pub fn delete_project(&self, project_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Project".to_string(),
                id: project_id.to_string(),
            });
        }
        Ok(())
    }

    /// 获取或创建结果集
    ///
    /// 已存在时保留原 analysis_type
    pub fn get_or_create_result_set(
        &self,
        project_id: i64,
        name: &str,
        analysis_type: AnalysisType,
    ) -> RepositoryResult<ResultSet> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO result_sets (project_id, name, analysis_type) VALUES (?1, ?2, ?3)",
            params![project_id, name, analysis_type.as_str()],
        )?;
        let result_set = conn.query_row(
            "SELECT id, project_id, name, analysis_type FROM result_sets WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
            |row| {
                Ok(ResultSet {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    analysis_type: AnalysisType::parse(&row.get::<_, String>(3)?),
                })
            },
        )?;
        Ok(result_set)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按规范顺序列出楼层
    pub fn list_stories(&self, project_id: i64) -> RepositoryResult<Vec<Story>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, sort_order FROM stories WHERE project_id = ?1 ORDER BY sort_order, id",
        )?;
        let stories = stmt
            .query_map(params![project_id], |row| {
                Ok(Story {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    sort_order: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stories)
    }

    pub fn find_story(&self, project_id: i64, name: &str) -> RepositoryResult<Option<Story>> {
        let conn = self.get_conn()?;
        let story = conn
            .query_row(
                "SELECT id, project_id, name, sort_order FROM stories WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
                |row| {
                    Ok(Story {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        name: row.get(2)?,
                        sort_order: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(story)
    }

    pub fn list_load_cases(&self, project_id: i64) -> RepositoryResult<Vec<LoadCase>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name FROM load_cases WHERE project_id = ?1 ORDER BY id",
        )?;
        let cases = stmt
            .query_map(params![project_id], |row| {
                Ok(LoadCase {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    pub fn list_elements(
        &self,
        project_id: i64,
        element_type: Option<ElementType>,
    ) -> RepositoryResult<Vec<Element>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, project_id, element_type, name, unique_name
            FROM elements
            WHERE project_id = ?1 AND (?2 IS NULL OR element_type = ?2)
            ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![project_id, element_type.map(|t| t.as_str())],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, project_id, raw_type, name, unique_name)| {
                let element_type =
                    ElementType::parse(&raw_type).ok_or_else(|| RepositoryError::FieldValueError {
                        field: "element_type".to_string(),
                        message: raw_type.clone(),
                    })?;
                Ok(Element {
                    id,
                    project_id,
                    element_type,
                    name,
                    unique_name,
                })
            })
            .collect()
    }

    // ==========================================
    // 事务内 get-or-create（供选择性导入使用）
    // ==========================================

    /// 获取或创建楼层; sort_order 仅首次创建时生效
    pub fn get_or_create_story_tx(
        conn: &Connection,
        project_id: i64,
        name: &str,
        sort_order: i64,
    ) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO stories (project_id, name, sort_order) VALUES (?1, ?2, ?3)",
            params![project_id, name, sort_order],
        )?;
        let id = conn.query_row(
            "SELECT id FROM stories WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_or_create_load_case_tx(
        conn: &Connection,
        project_id: i64,
        name: &str,
    ) -> RepositoryResult<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO load_cases (project_id, name) VALUES (?1, ?2)",
            params![project_id, name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM load_cases WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_or_create_element_tx(
        conn: &Connection,
        project_id: i64,
        key: &ElementKey,
    ) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO elements (project_id, element_type, name, unique_name)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![project_id, key.element_type.as_str(), key.name, key.unique_name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM elements WHERE project_id = ?1 AND element_type = ?2 AND unique_name = ?3",
            params![project_id, key.element_type.as_str(), key.unique_name],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}
