//! 全局错误类型定义

use thiserror::Error;
use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

#[derive(Error, Debug)]
pub enum FilterSetError {
    // 格式相关错误（版本标签未知/缺失、数据块无法解码）
    #[error("Unsupported or malformed filter data: {0}")]
    Format(String),
    // 目录文件不可读
    #[error("Filter file not found or unreadable: {0}")]
    NotFound(String),

    // 结构操作参数错误（调用方契约违反）
    #[error("Index {index} out of range for working set of {len} rules")]
    Index { index: usize, len: usize },
    #[error("Catalog rule {catalog_id}:{offset} is already active")]
    DuplicateActivation { catalog_id: usize, offset: usize },
    #[error("Unknown catalog id {0}")]
    UnknownCatalog(usize),
    #[error("Catalog {catalog_id} has no rule at offset {offset}")]
    InvalidOffset { catalog_id: usize, offset: usize },
    #[error("Catalog rule {catalog_id}:{offset} is not active")]
    NotActive { catalog_id: usize, offset: usize },

    // 编译相关错误
    #[error("Regex compilation failed: {0}")]
    Regex(#[from] RegexError),

    // 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    // 基础错误
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

// 全局Result类型
pub type FsResult<T> = Result<T, FilterSetError>;
