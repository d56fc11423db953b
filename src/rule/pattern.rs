//! 编译后模式模型
//! 规则正则懒编译：首次匹配时编译并缓存，模式或大小写变更后缓存失效

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::FsResult;

/// 懒编译的规则正则
/// 编译失败的模式缓存为 None，永不匹配
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pattern: String,
    case_insensitive: bool,
    regex: OnceCell<Option<Regex>>,
}

impl CompiledPattern {
    pub fn new(pattern: impl Into<String>, case_insensitive: bool) -> Self {
        Self {
            pattern: pattern.into(),
            case_insensitive,
            regex: OnceCell::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// 修改模式，内容变化时丢弃已编译的正则
    pub fn set_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if pattern != self.pattern {
            self.pattern = pattern;
            self.regex = OnceCell::new();
        }
    }

    /// 修改大小写选项，变化时丢弃已编译的正则
    pub fn set_case_insensitive(&mut self, case_insensitive: bool) {
        if case_insensitive != self.case_insensitive {
            self.case_insensitive = case_insensitive;
            self.regex = OnceCell::new();
        }
    }

    /// 简单匹配判断（正则无效时返回 false）
    #[inline]
    pub fn is_match(&self, input: &str) -> bool {
        self.compiled().is_some_and(|re| re.is_match(input))
    }

    /// 获取编译后的正则（懒加载）
    pub fn compiled(&self) -> Option<&Regex> {
        self.regex
            .get_or_init(|| Self::compile_regex(&self.pattern, self.case_insensitive))
            .as_ref()
    }

    /// 是否已经编译过（含编译失败）
    pub fn is_compiled(&self) -> bool {
        self.regex.get().is_some()
    }

    /// 校验模式语法，返回正则错误详情
    pub fn validate(&self) -> FsResult<()> {
        Self::builder(&self.pattern, self.case_insensitive).build()?;
        Ok(())
    }

    fn builder(pattern: &str, case_insensitive: bool) -> RegexBuilder {
        let mut builder = RegexBuilder::new(pattern);
        builder.case_insensitive(case_insensitive).unicode(true);
        builder
    }

    fn compile_regex(pattern: &str, case_insensitive: bool) -> Option<Regex> {
        Self::builder(pattern, case_insensitive)
            .build()
            .map_err(|e| {
                warn!("Regex compilation failed: pattern={} error={}", pattern, e);
                e
            })
            .ok()
    }
}

// 缓存不参与比较
impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.case_insensitive == other.case_insensitive
    }
}

impl Eq for CompiledPattern {}
