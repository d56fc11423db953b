//! 目录文件读写
//! 文件标识即路径；读取失败区分为 NotFound（不可读）与 Format（版本/结构错误）

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::format::{decode_catalog_file, encode_catalog_file};
use crate::error::{FilterSetError, FsResult};
use crate::rule::Rule;

/// 目录文件存取接口
pub trait CatalogStorage {
    /// 读取目录文件中的规则
    fn read_catalog(&self, file_identity: &str) -> FsResult<Vec<Rule>>;
    /// 覆盖写入目录文件
    fn write_catalog(&self, file_identity: &str, rules: &[Rule]) -> FsResult<()>;
}

/// 基于文件系统的目录存储
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCatalogStorage;

impl FsCatalogStorage {
    pub fn new() -> Self {
        Self
    }
}

impl CatalogStorage for FsCatalogStorage {
    fn read_catalog(&self, file_identity: &str) -> FsResult<Vec<Rule>> {
        let data = fs::read(file_identity).map_err(|e| {
            FilterSetError::NotFound(format!("{}: {}", file_identity, e))
        })?;
        let doc: Value = serde_json::from_slice(&data).map_err(|e| {
            FilterSetError::Format(format!("{}: {}", file_identity, e))
        })?;
        let rules = decode_catalog_file(&doc)?;
        debug!("Read {} filters from {}", rules.len(), file_identity);
        Ok(rules)
    }

    fn write_catalog(&self, file_identity: &str, rules: &[Rule]) -> FsResult<()> {
        let path = Path::new(file_identity);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&encode_catalog_file(rules))?;
        fs::write(path, data).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FilterSetError::NotFound(format!("{}: {}", file_identity, e)),
            _ => FilterSetError::Io(e),
        })?;
        debug!("Wrote {} filters to {}", rules.len(), file_identity);
        Ok(())
    }
}

/// 内存目录存储（无头测试用），保存编码后的 JSON 文档
#[derive(Debug, Default)]
pub struct MemoryCatalogStorage {
    files: RefCell<HashMap<String, Value>>,
}

impl MemoryCatalogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入一个目录文件
    pub fn insert_rules(&self, file_identity: &str, rules: &[Rule]) {
        self.files
            .borrow_mut()
            .insert(file_identity.to_string(), encode_catalog_file(rules));
    }

    /// 放入原始文档（可构造错误版本）
    pub fn insert_document(&self, file_identity: &str, doc: Value) {
        self.files.borrow_mut().insert(file_identity.to_string(), doc);
    }

    pub fn remove(&self, file_identity: &str) {
        self.files.borrow_mut().remove(file_identity);
    }

    pub fn document(&self, file_identity: &str) -> Option<Value> {
        self.files.borrow().get(file_identity).cloned()
    }
}

impl CatalogStorage for MemoryCatalogStorage {
    fn read_catalog(&self, file_identity: &str) -> FsResult<Vec<Rule>> {
        let files = self.files.borrow();
        let doc = files
            .get(file_identity)
            .ok_or_else(|| FilterSetError::NotFound(file_identity.to_string()))?;
        decode_catalog_file(doc)
    }

    fn write_catalog(&self, file_identity: &str, rules: &[Rule]) -> FsResult<()> {
        self.insert_rules(file_identity, rules);
        Ok(())
    }
}
