//! 目录模块：目录/注册表数据模型与交叉引用表
pub mod model;
pub mod xref;

pub use self::model::{Catalog, CatalogRegistry};
pub use self::xref::{CrossReferenceEntry, CrossReferenceIndex, CrossReferenceTable};
