//! 目录数据模型
//! 目录 = 以文件为载体、可导入/回写的命名规则集合

use crate::rule::Rule;

/// 规则目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// 文件标识（路径字符串）
    pub file_identity: String,
    /// 目录内规则，来源一律为 Local（偏移隐含在位置中）
    pub rules: Vec<Rule>,
    /// 加载时未找到文件，仅作占位以保持来源链接有效
    pub is_missing: bool,
}

impl Catalog {
    pub fn new(file_identity: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            file_identity: file_identity.into(),
            rules: rules.iter().map(Rule::detached).collect(),
            is_missing: false,
        }
    }

    /// 缺失文件的占位目录
    pub fn missing(file_identity: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            is_missing: true,
            ..Self::new(file_identity, rules)
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, offset: usize) -> Option<&Rule> {
        self.rules.get(offset)
    }

    /// 规则列表内容是否一致（漂移检测用）
    pub fn same_rules(&self, rules: &[Rule]) -> bool {
        self.rules.len() == rules.len()
            && self.rules.iter().zip(rules).all(|(a, b)| {
                a.pattern() == b.pattern()
                    && a.case_insensitive() == b.case_insensitive()
                    && a.colors() == b.colors()
                    && a.enabled() == b.enabled()
            })
    }
}

/// 目录注册表：显式注册的目录在前，自动导入目录追加在后
/// 位置即 catalog_id，删除目录后其后的 id 整体前移
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRegistry {
    catalogs: Vec<Catalog>,
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalogs(catalogs: Vec<Catalog>) -> Self {
        Self { catalogs }
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    pub fn get(&self, catalog_id: usize) -> Option<&Catalog> {
        self.catalogs.get(catalog_id)
    }

    pub fn get_mut(&mut self, catalog_id: usize) -> Option<&mut Catalog> {
        self.catalogs.get_mut(catalog_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Catalog> {
        self.catalogs.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Catalog> {
        self.catalogs.iter_mut()
    }

    /// 追加目录，返回新的 catalog_id
    pub fn push(&mut self, catalog: Catalog) -> usize {
        self.catalogs.push(catalog);
        self.catalogs.len() - 1
    }

    pub(crate) fn remove(&mut self, catalog_id: usize) -> Option<Catalog> {
        (catalog_id < self.catalogs.len()).then(|| self.catalogs.remove(catalog_id))
    }

    /// 按文件标识查找 catalog_id
    pub fn find_by_identity(&self, file_identity: &str) -> Option<usize> {
        self.catalogs
            .iter()
            .position(|catalog| catalog.file_identity == file_identity)
    }
}

impl<'a> IntoIterator for &'a CatalogRegistry {
    type Item = &'a Catalog;
    type IntoIter = std::slice::Iter<'a, Catalog>;

    fn into_iter(self) -> Self::IntoIter {
        self.catalogs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Provenance;

    #[test]
    fn test_catalog_rules_are_detached() {
        let linked = Rule::new("a", false, "red", "white").with_provenance(Provenance::catalog(1, 0));
        let catalog = Catalog::new("a.conf", vec![linked]);
        assert!(catalog.rules[0].provenance().is_local());
        assert!(!catalog.is_missing);
    }

    #[test]
    fn test_same_rules() {
        let catalog = Catalog::new("a.conf", vec![Rule::new("a", false, "red", "white")]);
        assert!(catalog.same_rules(&[Rule::new("a", false, "red", "white")]));
        assert!(!catalog.same_rules(&[Rule::new("a", false, "red", "black")]));
        assert!(!catalog.same_rules(&[]));
    }

    #[test]
    fn test_registry_positions_shift_on_remove() {
        let mut registry = CatalogRegistry::new();
        registry.push(Catalog::new("a.conf", vec![]));
        registry.push(Catalog::new("b.conf", vec![]));
        registry.push(Catalog::new("c.conf", vec![]));

        assert_eq!(registry.find_by_identity("c.conf"), Some(2));
        let removed = registry.remove(1).unwrap();
        assert_eq!(removed.file_identity, "b.conf");
        assert_eq!(registry.find_by_identity("c.conf"), Some(1));
        assert!(registry.remove(5).is_none());
    }
}
