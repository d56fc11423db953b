//! 键值存储协作者
//! 核心只在会话边界读写两个命名数据块（工作集 / 目录注册表）

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FilterSetError, FsResult};

/// 持久化键值存储
pub trait SettingsStore {
    /// 读取数据块，不存在返回 None
    fn get(&self, key: &str) -> Option<Value>;
    /// 写入数据块
    fn set(&mut self, key: &str, value: Value) -> FsResult<()>;
    /// 删除数据块
    fn remove(&mut self, key: &str) -> FsResult<()>;
}

/// 内存存储（测试/无头场景）
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    blobs: Map<String, Value>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(mut self, key: &str, value: Value) -> Self {
        self.blobs.insert(key.to_string(), value);
        self
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.blobs.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> FsResult<()> {
        self.blobs.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> FsResult<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// 单个 JSON 文件承载的存储，每次写入立即落盘
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    blobs: Map<String, Value>,
}

impl JsonFileSettingsStore {
    /// 打开存储文件；文件不存在视为空存储
    pub fn open(path: impl Into<PathBuf>) -> FsResult<Self> {
        let path = path.into();
        let blobs = if path.exists() {
            let data = fs::read(&path)?;
            match serde_json::from_slice::<Value>(&data)? {
                Value::Object(map) => map,
                _ => {
                    return Err(FilterSetError::Format(format!(
                        "settings file {} is not a JSON object",
                        path.display()
                    )))
                }
            }
        } else {
            debug!("Settings file {} not found, starting empty", path.display());
            Map::new()
        };
        Ok(Self { path, blobs })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sync(&self) -> FsResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&self.blobs)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.blobs.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> FsResult<()> {
        self.blobs.insert(key.to_string(), value);
        self.sync()
    }

    fn remove(&mut self, key: &str) -> FsResult<()> {
        if self.blobs.remove(key).is_some() {
            self.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = JsonFileSettingsStore::open(&path).unwrap();
        assert!(store.get("filterSet").is_none());
        store.set("filterSet", json!({"version": 1})).unwrap();

        let reopened = JsonFileSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get("filterSet"), Some(json!({"version": 1})));
    }

    #[test]
    fn test_json_file_store_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            JsonFileSettingsStore::open(&path),
            Err(FilterSetError::Format(_))
        ));
    }

    #[test]
    fn test_memory_store_remove() {
        let mut store = MemorySettingsStore::new().with_blob("k", json!(1));
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }
}
