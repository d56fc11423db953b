//! 持久化模块：键值存储、目录文件、自动导入、加载/迁移与漂移检测
pub mod auto_import;
pub mod catalog_file;
pub mod format;
pub mod loader;
pub mod prompt;
pub mod store;

pub use self::auto_import::{wildcard_to_regex, AutoImportDir};
pub use self::catalog_file::{CatalogStorage, FsCatalogStorage, MemoryCatalogStorage};
pub use self::loader::{
    load_registry, load_session, load_working_set, reconcile_catalog_drift, save_registry,
    save_session, save_working_set, REGISTRY_KEY, WORKING_SET_KEY,
};
pub use self::prompt::{AlwaysReload, NeverReload, ReloadPrompt};
pub use self::store::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore};
