//! 工作集：实际参与行匹配的有序规则序列
//! 位置即地址，首个命中的规则决定颜色

use super::model::Rule;
use crate::error::{FilterSetError, FsResult};

/// 有序规则集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    rules: Vec<Rule>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    /// 逐条匹配，返回首个命中规则的 (前景色, 背景色)
    /// 禁用的规则直接跳过
    pub fn evaluate(&self, line: &str) -> Option<(&str, &str)> {
        self.rules
            .iter()
            .filter(|rule| rule.enabled())
            .find(|rule| rule.is_match(line))
            .map(Rule::colors)
    }

    /// 首个命中规则的位置
    pub fn first_match(&self, line: &str) -> Option<usize> {
        self.rules
            .iter()
            .position(|rule| rule.enabled() && rule.is_match(line))
    }

    pub(crate) fn check_index(&self, index: usize) -> FsResult<()> {
        if index < self.rules.len() {
            Ok(())
        } else {
            Err(FilterSetError::Index {
                index,
                len: self.rules.len(),
            })
        }
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> FsResult<&mut Rule> {
        let len = self.rules.len();
        self.rules
            .get_mut(index)
            .ok_or(FilterSetError::Index { index, len })
    }

    pub(crate) fn push(&mut self, rule: Rule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub(crate) fn remove(&mut self, index: usize) -> FsResult<Rule> {
        self.check_index(index)?;
        Ok(self.rules.remove(index))
    }

    /// 取出 from 处的规则并插入到 to
    pub(crate) fn move_rule(&mut self, from: usize, to: usize) -> FsResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        Ok(())
    }

    pub(crate) fn rules_mut(&mut self) -> std::slice::IterMut<'_, Rule> {
        self.rules.iter_mut()
    }
}

/// 对外的匹配入口：按顺序返回首个命中规则的颜色
pub fn evaluate<'a>(line: &str, rules: &'a WorkingSet) -> Option<(&'a str, &'a str)> {
    rules.evaluate(line)
}

impl<'a> IntoIterator for &'a WorkingSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
