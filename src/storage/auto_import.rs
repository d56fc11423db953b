//! 自动导入目录扫描
//! 目录下所有匹配通配符的文件在启动时作为隐式目录加载，不参与注册表显式保存

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::FilterConfig;
use crate::error::FsResult;

/// 通配符转锚定正则：`*` → `.*`，`?` → `.`，其余字符转义
pub fn wildcard_to_regex(wildcard: &str) -> String {
    let mut out = String::with_capacity(wildcard.len() + 8);
    out.push('^');
    for ch in wildcard.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// 自动导入目录
#[derive(Debug, Clone)]
pub struct AutoImportDir {
    dir: PathBuf,
    wildcard: String,
    regex: Regex,
}

impl AutoImportDir {
    pub fn new(dir: impl Into<PathBuf>, wildcard: &str) -> FsResult<Self> {
        Ok(Self {
            dir: dir.into(),
            regex: Regex::new(&wildcard_to_regex(wildcard))?,
            wildcard: wildcard.to_string(),
        })
    }

    /// 从配置构建；未配置目录或通配符非法时返回 None
    pub fn from_config(config: &FilterConfig) -> Option<Self> {
        let dir = config.auto_import_dir.as_ref()?;
        match Self::new(dir, &config.auto_import_pattern) {
            Ok(auto_import) => Some(auto_import),
            Err(e) => {
                warn!(
                    "Invalid auto-import pattern '{}': {}",
                    config.auto_import_pattern, e
                );
                None
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn wildcard(&self) -> &str {
        &self.wildcard
    }

    fn name_matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.regex.is_match(name))
            .unwrap_or(false)
    }

    /// 扫描目录（不递归），按文件名排序；目录不存在返回空
    pub fn scan(&self) -> Vec<PathBuf> {
        if !self.dir.is_dir() {
            debug!("Auto-import directory {} does not exist", self.dir.display());
            return Vec::new();
        }

        let files: Vec<PathBuf> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable auto-import entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.name_matches(path))
            .collect();

        debug!(
            "Found {} auto-import filter files in {}",
            files.len(),
            self.dir.display()
        );
        files
    }

    /// 文件标识是否属于自动导入目录且匹配通配符
    pub fn contains(&self, file_identity: &str) -> bool {
        let path = Path::new(file_identity);
        path.parent() == Some(self.dir.as_path()) && self.name_matches(path)
    }
}
