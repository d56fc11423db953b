//! rsfilterset - 日志查看器的行高亮规则引擎（工作集 + 可共享的过滤器目录）

// 导出全局错误类型
pub use self::error::{FilterSetError, FsResult};

// 导出配置模块
pub use self::config::{ConfigManager, CustomConfigBuilder, EquivalencePolicy, FilterConfig};

// 导出规则模块核心接口
pub use self::rule::{evaluate, ColorName, CompiledPattern, Provenance, Rule, WorkingSet};

// 导出目录模块核心接口
pub use self::catalog::{
    Catalog, CatalogRegistry, CrossReferenceEntry, CrossReferenceIndex, CrossReferenceTable,
};

// 导出会话模块核心接口
pub use self::session::{FilterSession, RuleStatus};

// 导出持久化模块核心接口
pub use self::storage::{
    load_session, save_session, AlwaysReload, AutoImportDir, CatalogStorage, FsCatalogStorage,
    JsonFileSettingsStore, MemoryCatalogStorage, MemorySettingsStore, NeverReload, ReloadPrompt,
    SettingsStore,
};

// 导出渲染侧高亮器
pub use self::highlighter::Highlighter;

// 声明所有子模块
pub mod catalog;
pub mod config;
pub mod error;
pub mod highlighter;
pub mod rule;
pub mod session;
pub mod storage;
