//! 目录交叉引用表
//! 每个目录、每条目录规则一个条目：记录其在工作集中的位置（弱回指）与脏标记
//! 条目中的位置不会自动更新，由每个结构操作显式修正

use tracing::warn;

use super::model::CatalogRegistry;
use crate::config::EquivalencePolicy;
use crate::rule::WorkingSet;

/// 单条目录规则的交叉引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossReferenceEntry {
    pub catalog_offset: usize,
    /// None = 可用（未实例化）；Some(i) = 已激活于工作集位置 i
    pub working_index: Option<usize>,
    /// 工作集副本与目录原件不等价
    pub dirty: bool,
}

impl CrossReferenceEntry {
    pub fn available(catalog_offset: usize) -> Self {
        Self {
            catalog_offset,
            working_index: None,
            dirty: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.working_index.is_some()
    }
}

/// 单个目录的交叉引用表（按目录偏移索引）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReferenceTable {
    entries: Vec<CrossReferenceEntry>,
}

impl CrossReferenceTable {
    pub fn with_len(len: usize) -> Self {
        Self {
            entries: (0..len).map(CrossReferenceEntry::available).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CrossReferenceEntry] {
        &self.entries
    }

    pub fn entry(&self, offset: usize) -> Option<&CrossReferenceEntry> {
        self.entries.get(offset)
    }

    pub(crate) fn entry_mut(&mut self, offset: usize) -> Option<&mut CrossReferenceEntry> {
        self.entries.get_mut(offset)
    }

    /// 目录是否有未保存的修改（由条目脏标记推导，不单独存储）
    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|entry| entry.dirty)
    }

    pub fn available_offsets(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_active())
            .map(|entry| entry.catalog_offset)
            .collect()
    }

    pub fn active_offsets(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|entry| entry.is_active())
            .map(|entry| entry.catalog_offset)
            .collect()
    }

    pub fn dirty_offsets(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|entry| entry.dirty)
            .map(|entry| entry.catalog_offset)
            .collect()
    }

    /// 所有已激活条目的工作集位置
    pub fn active_working_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter_map(|entry| entry.working_index)
            .collect()
    }

    /// 工作集位置 removed 处的规则被删除：其后的位置全部减一
    fn shift_after_removal(&mut self, removed: usize) {
        for entry in &mut self.entries {
            if let Some(index) = entry.working_index.as_mut() {
                if *index > removed {
                    *index -= 1;
                }
            }
        }
    }
}

/// 全部目录的交叉引用表，与注册表按位置一一对应
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReferenceIndex {
    tables: Vec<CrossReferenceTable>,
}

impl CrossReferenceIndex {
    /// 从工作集和注册表从零重建
    /// 调用方须保证来源链接已校验（越界/重复链接会被跳过）
    pub fn rebuild(
        working_set: &WorkingSet,
        registry: &CatalogRegistry,
        policy: EquivalencePolicy,
    ) -> Self {
        let mut index = Self {
            tables: registry
                .iter()
                .map(|catalog| CrossReferenceTable::with_len(catalog.len()))
                .collect(),
        };

        for (position, rule) in working_set.iter().enumerate() {
            let Some((catalog_id, offset)) = rule.provenance().catalog_link() else {
                continue;
            };
            let Some(original) = registry.get(catalog_id).and_then(|c| c.rule(offset)) else {
                warn!(
                    "Working rule {} links to unknown catalog rule {}:{}",
                    position, catalog_id, offset
                );
                continue;
            };
            let Some(entry) = index.entry_mut(catalog_id, offset) else {
                continue;
            };
            if entry.is_active() {
                warn!(
                    "Catalog rule {}:{} is linked twice, ignoring working rule {}",
                    catalog_id, offset, position
                );
                continue;
            }
            entry.working_index = Some(position);
            entry.dirty = !rule.is_equivalent(original, policy);
        }

        index
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// 按当前位置 catalog_id 取表
    pub fn table(&self, catalog_id: usize) -> Option<&CrossReferenceTable> {
        self.tables.get(catalog_id)
    }

    pub fn tables(&self) -> &[CrossReferenceTable] {
        &self.tables
    }

    pub fn entry(&self, catalog_id: usize, offset: usize) -> Option<&CrossReferenceEntry> {
        self.tables.get(catalog_id)?.entry(offset)
    }

    pub(crate) fn entry_mut(
        &mut self,
        catalog_id: usize,
        offset: usize,
    ) -> Option<&mut CrossReferenceEntry> {
        self.tables.get_mut(catalog_id)?.entry_mut(offset)
    }

    pub(crate) fn push_table(&mut self, len: usize) {
        self.tables.push(CrossReferenceTable::with_len(len));
    }

    pub(crate) fn remove_table(&mut self, catalog_id: usize) -> Option<CrossReferenceTable> {
        (catalog_id < self.tables.len()).then(|| self.tables.remove(catalog_id))
    }

    /// 工作集删除位置 removed 后，修正所有目录的条目
    pub(crate) fn on_working_removed(&mut self, removed: usize) {
        for table in &mut self.tables {
            table.shift_after_removal(removed);
        }
    }
}
