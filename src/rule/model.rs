//! 规则数据模型定义
//! 单条高亮规则：模式 + 前景/背景色 + 来源

use std::fmt;

use super::pattern::CompiledPattern;
use crate::config::EquivalencePolicy;

/// 颜色名称（解析为可渲染颜色由外部负责）
pub type ColorName = String;

pub const DEFAULT_PATTERN: &str = "New Filter";
pub const DEFAULT_IGNORE_CASE: bool = false;
pub const DEFAULT_FORE_COLOUR: &str = "black";
pub const DEFAULT_BACK_COLOUR: &str = "white";

/// 规则来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provenance {
    /// 直接在工作集中创建
    #[default]
    Local,
    /// 从某个目录的指定偏移实例化
    Catalog { catalog_id: usize, offset: usize },
}

impl Provenance {
    pub fn catalog(catalog_id: usize, offset: usize) -> Self {
        Provenance::Catalog { catalog_id, offset }
    }

    /// 目录链接 (catalog_id, offset)
    pub fn catalog_link(&self) -> Option<(usize, usize)> {
        match *self {
            Provenance::Local => None,
            Provenance::Catalog { catalog_id, offset } => Some((catalog_id, offset)),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Provenance::Local)
    }
}

/// 高亮规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    matcher: CompiledPattern,
    fore_color: ColorName,
    back_color: ColorName,
    enabled: bool,
    provenance: Provenance,
}

impl Default for Rule {
    fn default() -> Self {
        Self::new(
            DEFAULT_PATTERN,
            DEFAULT_IGNORE_CASE,
            DEFAULT_FORE_COLOUR,
            DEFAULT_BACK_COLOUR,
        )
    }
}

impl Rule {
    pub fn new(
        pattern: impl Into<String>,
        case_insensitive: bool,
        fore_color: impl Into<ColorName>,
        back_color: impl Into<ColorName>,
    ) -> Self {
        Self {
            matcher: CompiledPattern::new(pattern, case_insensitive),
            fore_color: fore_color.into(),
            back_color: back_color.into(),
            enabled: true,
            provenance: Provenance::Local,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn case_insensitive(&self) -> bool {
        self.matcher.case_insensitive()
    }

    pub fn fore_color(&self) -> &str {
        &self.fore_color
    }

    pub fn back_color(&self) -> &str {
        &self.back_color
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn matcher(&self) -> &CompiledPattern {
        &self.matcher
    }

    pub fn set_pattern(&mut self, pattern: impl Into<String>) {
        self.matcher.set_pattern(pattern);
    }

    pub fn set_case_insensitive(&mut self, case_insensitive: bool) {
        self.matcher.set_case_insensitive(case_insensitive);
    }

    pub fn set_fore_color(&mut self, color: impl Into<ColorName>) {
        self.fore_color = color.into();
    }

    pub fn set_back_color(&mut self, color: impl Into<ColorName>) {
        self.back_color = color.into();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_provenance(&mut self, provenance: Provenance) {
        self.provenance = provenance;
    }

    /// (前景色, 背景色)
    pub fn colors(&self) -> (&str, &str) {
        (&self.fore_color, &self.back_color)
    }

    #[inline]
    pub fn is_match(&self, line: &str) -> bool {
        self.matcher.is_match(line)
    }

    /// 等价判定：来源不参与比较，启用状态由策略决定
    pub fn is_equivalent(&self, other: &Rule, policy: EquivalencePolicy) -> bool {
        let same_content = self.matcher == other.matcher
            && self.fore_color == other.fore_color
            && self.back_color == other.back_color;
        match policy {
            EquivalencePolicy::IgnoreEnabled => same_content,
            EquivalencePolicy::IncludeEnabled => same_content && self.enabled == other.enabled,
        }
    }

    /// 用另一条规则的内容覆盖自身，保留来源
    pub fn apply_content(&mut self, other: &Rule, policy: EquivalencePolicy) {
        self.matcher.set_pattern(other.pattern());
        self.matcher.set_case_insensitive(other.case_insensitive());
        self.fore_color = other.fore_color.clone();
        self.back_color = other.back_color.clone();
        if policy == EquivalencePolicy::IncludeEnabled {
            self.enabled = other.enabled;
        }
    }

    /// 去掉来源的副本（写入目录时使用）
    pub fn detached(&self) -> Rule {
        self.clone().with_provenance(Provenance::Local)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.pattern())?;
        if self.case_insensitive() {
            f.write_str("i")?;
        }
        write!(f, " {} on {}", self.fore_color, self.back_color)?;
        if !self.enabled {
            f.write_str(" (disabled)")?;
        }
        Ok(())
    }
}
