//! 规则模块：规则数据模型、懒编译模式与工作集匹配
pub mod model;
pub mod pattern;
pub mod working_set;

// 导出核心接口
pub use self::model::{
    ColorName, Provenance, Rule, DEFAULT_BACK_COLOUR, DEFAULT_FORE_COLOUR, DEFAULT_IGNORE_CASE,
    DEFAULT_PATTERN,
};
pub use self::pattern::CompiledPattern;
pub use self::working_set::{evaluate, WorkingSet};
