// ==========================================
// 结构分析结果导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口, 屏蔽数据库细节
// 约束: 所有查询使用参数化
// 事务: `_tx` 结尾的关联函数接受调用方持有的连接/事务, 由调用方决定提交边界
// ==========================================

pub mod abs_maxmin_repo;
pub mod cache_repo;
pub mod error;
pub mod fact_repo;
pub mod import_run_repo;
pub mod reference_repo;

pub use abs_maxmin_repo::AbsMaxMinRepository;
pub use cache_repo::{CacheRepository, CacheRowKey};
pub use error::{RepositoryError, RepositoryResult};
pub use fact_repo::{DriftEnvelopeRow, FactKeys, FactRepository};
pub use import_run_repo::{ImportRunEntity, ImportRunRepository};
pub use reference_repo::ReferenceRepository;
