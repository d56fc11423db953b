//! 过滤器编辑会话
//! 持有工作集、目录注册表与交叉引用表，所有结构操作在此完成并同步修正交叉引用
//! 任何失败的操作都不改变会话状态

use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogRegistry, CrossReferenceIndex, CrossReferenceTable};
use crate::config::EquivalencePolicy;
use crate::error::{FilterSetError, FsResult};
use crate::rule::{ColorName, Provenance, Rule, WorkingSet};
use crate::storage::CatalogStorage;

/// 工作集规则的状态（供界面绘制图标）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    /// 本地规则
    Local,
    /// 来自目录且与原件一致
    Loaded,
    /// 来自目录但已在本地修改
    Modified,
}

/// 编辑会话
#[derive(Debug, Clone)]
pub struct FilterSession {
    working_set: WorkingSet,
    registry: CatalogRegistry,
    xref: CrossReferenceIndex,
    policy: EquivalencePolicy,
    registry_needs_save: bool,
}

impl FilterSession {
    /// 创建会话：先校验来源链接（越界或重复的链接降级为本地），再重建交叉引用
    pub fn new(
        working_set: WorkingSet,
        registry: CatalogRegistry,
        policy: EquivalencePolicy,
    ) -> Self {
        let working_set = sanitize_links(working_set, &registry);
        let xref = CrossReferenceIndex::rebuild(&working_set, &registry, policy);
        Self {
            working_set,
            registry,
            xref,
            policy,
            registry_needs_save: false,
        }
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn registry(&self) -> &CatalogRegistry {
        &self.registry
    }

    pub fn xref(&self) -> &CrossReferenceIndex {
        &self.xref
    }

    pub fn policy(&self) -> EquivalencePolicy {
        self.policy
    }

    /// 工作集快照（发布给渲染侧）
    pub fn snapshot(&self) -> WorkingSet {
        self.working_set.clone()
    }

    pub fn into_parts(self) -> (WorkingSet, CatalogRegistry) {
        (self.working_set, self.registry)
    }

    /// 注册表自加载以来是否有变化（漂移重载、导入、删除）
    pub fn registry_needs_save(&self) -> bool {
        self.registry_needs_save
    }

    pub(crate) fn mark_registry_dirty(&mut self) {
        self.registry_needs_save = true;
    }

    pub fn mark_registry_saved(&mut self) {
        self.registry_needs_save = false;
    }

    fn table(&self, catalog_id: usize) -> FsResult<&CrossReferenceTable> {
        self.xref
            .table(catalog_id)
            .ok_or(FilterSetError::UnknownCatalog(catalog_id))
    }

    fn catalog_rule(&self, catalog_id: usize, offset: usize) -> FsResult<&Rule> {
        self.registry
            .get(catalog_id)
            .ok_or(FilterSetError::UnknownCatalog(catalog_id))?
            .rule(offset)
            .ok_or(FilterSetError::InvalidOffset { catalog_id, offset })
    }

    /// 重新计算 index 处规则的脏标记（仅目录来源规则）
    fn refresh_dirty(&mut self, index: usize) {
        let Some(rule) = self.working_set.get(index) else {
            return;
        };
        let Some((catalog_id, offset)) = rule.provenance().catalog_link() else {
            return;
        };
        let Some(original) = self.registry.get(catalog_id).and_then(|c| c.rule(offset)) else {
            return;
        };
        let dirty = !rule.is_equivalent(original, self.policy);
        if let Some(entry) = self.xref.entry_mut(catalog_id, offset) {
            entry.dirty = dirty;
        }
    }

    // ---------------- 工作集结构操作 ----------------

    /// 追加到末尾，返回新位置
    /// 目录来源规则要求该目录规则当前未激活
    pub fn append(&mut self, rule: Rule) -> FsResult<usize> {
        let dirty = match rule.provenance().catalog_link() {
            Some((catalog_id, offset)) => {
                let original = self.catalog_rule(catalog_id, offset)?;
                let dirty = !rule.is_equivalent(original, self.policy);
                let active = self
                    .xref
                    .entry(catalog_id, offset)
                    .is_some_and(|entry| entry.is_active());
                if active {
                    return Err(FilterSetError::DuplicateActivation { catalog_id, offset });
                }
                Some((catalog_id, offset, dirty))
            }
            None => None,
        };

        let index = self.working_set.push(rule);
        if let Some((catalog_id, offset, dirty)) = dirty {
            if let Some(entry) = self.xref.entry_mut(catalog_id, offset) {
                entry.working_index = Some(index);
                entry.dirty = dirty;
            }
        }
        debug!("Appended rule at position {}", index);
        Ok(index)
    }

    /// 追加一条默认规则
    pub fn append_default(&mut self) -> FsResult<usize> {
        self.append(Rule::default())
    }

    /// 删除 index 处的规则，清除其交叉引用并修正其后所有位置
    pub fn remove_at(&mut self, index: usize) -> FsResult<Rule> {
        let rule = self.working_set.remove(index)?;
        if let Some((catalog_id, offset)) = rule.provenance().catalog_link() {
            if let Some(entry) = self.xref.entry_mut(catalog_id, offset) {
                entry.working_index = None;
                entry.dirty = false;
            }
        }
        self.xref.on_working_removed(index);
        debug!("Removed rule at position {}", index);
        Ok(rule)
    }

    /// 将 from 处的规则移动到 to
    /// 移动前先记录受影响区间内所有规则的链接，再统一写回新位置
    pub fn move_to(&mut self, from: usize, to: usize) -> FsResult<()> {
        self.working_set.check_index(from)?;
        self.working_set.check_index(to)?;
        if from == to {
            return Ok(());
        }

        let (lo, hi) = (from.min(to), from.max(to));
        let links: Vec<(usize, (usize, usize))> = (lo..=hi)
            .filter_map(|position| {
                self.working_set
                    .get(position)
                    .and_then(|rule| rule.provenance().catalog_link())
                    .map(|link| (position, link))
            })
            .collect();

        self.working_set.move_rule(from, to)?;

        for (position, (catalog_id, offset)) in links {
            let new_position = if position == from {
                to
            } else if from < to {
                position - 1
            } else {
                position + 1
            };
            if let Some(entry) = self.xref.entry_mut(catalog_id, offset) {
                entry.working_index = Some(new_position);
            }
        }
        debug!("Moved rule from {} to {}", from, to);
        Ok(())
    }

    /// 上移一位，返回新位置（已在顶部则不动）
    pub fn move_up(&mut self, index: usize) -> FsResult<usize> {
        self.working_set.check_index(index)?;
        if index == 0 {
            return Ok(0);
        }
        self.move_to(index, index - 1)?;
        Ok(index - 1)
    }

    /// 下移一位，返回新位置（已在底部则不动）
    pub fn move_down(&mut self, index: usize) -> FsResult<usize> {
        self.working_set.check_index(index)?;
        if index + 1 == self.working_set.len() {
            return Ok(index);
        }
        self.move_to(index, index + 1)?;
        Ok(index + 1)
    }

    /// 原地编辑规则内容，目录来源规则重新计算脏标记
    pub fn edit_rule(
        &mut self,
        index: usize,
        pattern: impl Into<String>,
        case_insensitive: bool,
        fore_color: impl Into<ColorName>,
        back_color: impl Into<ColorName>,
    ) -> FsResult<()> {
        let rule = self.working_set.get_mut(index)?;
        rule.set_pattern(pattern);
        rule.set_case_insensitive(case_insensitive);
        rule.set_fore_color(fore_color);
        rule.set_back_color(back_color);
        self.refresh_dirty(index);
        Ok(())
    }

    /// 启用/禁用规则；是否影响脏标记由等价策略决定
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> FsResult<()> {
        self.working_set.get_mut(index)?.set_enabled(enabled);
        self.refresh_dirty(index);
        Ok(())
    }

    // ---------------- 目录规则激活 ----------------

    /// 将目录规则实例化到工作集末尾
    pub fn activate(&mut self, catalog_id: usize, offset: usize) -> FsResult<usize> {
        let rule = self
            .catalog_rule(catalog_id, offset)?
            .clone()
            .with_provenance(Provenance::catalog(catalog_id, offset));
        self.append(rule)
    }

    /// 从工作集中移除目录规则的实例
    pub fn deactivate(&mut self, catalog_id: usize, offset: usize) -> FsResult<Rule> {
        self.catalog_rule(catalog_id, offset)?;
        let index = self
            .xref
            .entry(catalog_id, offset)
            .and_then(|entry| entry.working_index)
            .ok_or(FilterSetError::NotActive { catalog_id, offset })?;
        self.remove_at(index)
    }

    // ---------------- 目录导入/导出 ----------------

    /// 追加目录及其交叉引用表（所有规则可用、非脏），返回 catalog_id
    pub fn add_catalog(&mut self, catalog: Catalog) -> usize {
        self.xref.push_table(catalog.len());
        let catalog_id = self.registry.push(catalog);
        self.registry_needs_save = true;
        catalog_id
    }

    /// 从存储读取目录文件并注册；读取失败不改变会话
    pub fn import_catalog(
        &mut self,
        storage: &dyn CatalogStorage,
        file_identity: &str,
    ) -> FsResult<usize> {
        let rules = storage.read_catalog(file_identity)?;
        if let Some(existing) = self.registry.find_by_identity(file_identity) {
            warn!(
                "Filter file {} is already registered as catalog {}",
                file_identity, existing
            );
        }
        let catalog_id = self.add_catalog(Catalog::new(file_identity, rules));
        debug!(
            "Imported {} as catalog {} ({} filters)",
            file_identity,
            catalog_id,
            self.registry.get(catalog_id).map_or(0, Catalog::len)
        );
        Ok(catalog_id)
    }

    /// 删除目录：先按工作集位置降序移除其全部激活规则，再删除目录与交叉引用表，
    /// 并将后续目录来源规则的 catalog_id 减一
    pub fn remove_catalog(&mut self, catalog_id: usize) -> FsResult<Catalog> {
        let mut active = self.table(catalog_id)?.active_working_indices();
        active.sort_unstable_by(|a, b| b.cmp(a));
        for index in &active {
            self.remove_at(*index)?;
        }

        self.xref.remove_table(catalog_id);
        let catalog = self
            .registry
            .remove(catalog_id)
            .ok_or(FilterSetError::UnknownCatalog(catalog_id))?;

        for rule in self.working_set.rules_mut() {
            if let Provenance::Catalog { catalog_id: id, offset } = rule.provenance() {
                if id > catalog_id {
                    rule.set_provenance(Provenance::catalog(id - 1, offset));
                }
            }
        }
        self.registry_needs_save = true;
        debug!(
            "Removed catalog {} ({}), deactivated {} rules",
            catalog_id,
            catalog.file_identity,
            active.len()
        );
        Ok(catalog)
    }

    /// 将目录的脏条目回写到目录并保存文件，返回回写条数
    /// 无脏条目时不写文件；写入失败时会话不变
    pub fn commit_catalog_changes(
        &mut self,
        storage: &dyn CatalogStorage,
        catalog_id: usize,
    ) -> FsResult<usize> {
        let dirty = self.table(catalog_id)?.dirty_offsets();
        let catalog = self
            .registry
            .get(catalog_id)
            .ok_or(FilterSetError::UnknownCatalog(catalog_id))?;
        if dirty.is_empty() {
            debug!("Catalog {} has no changes to commit", catalog.file_identity);
            return Ok(0);
        }

        let mut rules = catalog.rules.clone();
        for offset in &dirty {
            let working = self
                .xref
                .entry(catalog_id, *offset)
                .and_then(|entry| entry.working_index)
                .and_then(|index| self.working_set.get(index));
            if let (Some(working), Some(target)) = (working, rules.get_mut(*offset)) {
                target.apply_content(working, self.policy);
            }
        }
        storage.write_catalog(&catalog.file_identity, &rules)?;

        if let Some(catalog) = self.registry.get_mut(catalog_id) {
            catalog.rules = rules;
            catalog.is_missing = false;
        }
        for offset in &dirty {
            if let Some(entry) = self.xref.entry_mut(catalog_id, *offset) {
                entry.dirty = false;
            }
        }
        self.registry_needs_save = true;
        debug!("Committed {} changes to catalog {}", dirty.len(), catalog_id);
        Ok(dirty.len())
    }

    /// 用目录原件覆盖脏的工作集副本，返回还原条数；不触碰目录文件
    pub fn revert_catalog_changes(&mut self, catalog_id: usize) -> FsResult<usize> {
        let dirty = self.table(catalog_id)?.dirty_offsets();
        for offset in &dirty {
            let original = self.catalog_rule(catalog_id, *offset)?.clone();
            let index = self
                .xref
                .entry(catalog_id, *offset)
                .and_then(|entry| entry.working_index);
            if let Some(index) = index {
                self.working_set.get_mut(index)?.apply_content(&original, self.policy);
            }
            if let Some(entry) = self.xref.entry_mut(catalog_id, *offset) {
                entry.dirty = false;
            }
        }
        debug!("Reverted {} changes of catalog {}", dirty.len(), catalog_id);
        Ok(dirty.len())
    }

    /// 将选中的工作集规则导出为独立目录文件（不带来源）
    pub fn export_rules(
        &self,
        storage: &dyn CatalogStorage,
        positions: &[usize],
        file_identity: &str,
    ) -> FsResult<usize> {
        let rules = positions
            .iter()
            .map(|&index| {
                self.working_set
                    .get(index)
                    .map(Rule::detached)
                    .ok_or(FilterSetError::Index {
                        index,
                        len: self.working_set.len(),
                    })
            })
            .collect::<FsResult<Vec<_>>>()?;
        storage.write_catalog(file_identity, &rules)?;
        debug!("Exported {} rules to {}", rules.len(), file_identity);
        Ok(rules.len())
    }

    // ---------------- 状态查询 ----------------

    /// 目录是否有未保存修改
    pub fn catalog_has_changes(&self, catalog_id: usize) -> FsResult<bool> {
        Ok(self.table(catalog_id)?.has_changes())
    }

    pub fn available_offsets(&self, catalog_id: usize) -> FsResult<Vec<usize>> {
        Ok(self.table(catalog_id)?.available_offsets())
    }

    pub fn active_offsets(&self, catalog_id: usize) -> FsResult<Vec<usize>> {
        Ok(self.table(catalog_id)?.active_offsets())
    }

    pub fn rule_status(&self, index: usize) -> FsResult<RuleStatus> {
        self.working_set.check_index(index)?;
        let status = self
            .working_set
            .get(index)
            .and_then(|rule| rule.provenance().catalog_link())
            .and_then(|(catalog_id, offset)| self.xref.entry(catalog_id, offset))
            .map_or(RuleStatus::Local, |entry| {
                if entry.dirty {
                    RuleStatus::Modified
                } else {
                    RuleStatus::Loaded
                }
            });
        Ok(status)
    }
}

/// 越界或重复的目录链接降级为本地规则
fn sanitize_links(working_set: WorkingSet, registry: &CatalogRegistry) -> WorkingSet {
    let mut seen = std::collections::HashSet::new();
    let rules = working_set
        .into_rules()
        .into_iter()
        .enumerate()
        .map(|(position, mut rule)| {
            if let Some((catalog_id, offset)) = rule.provenance().catalog_link() {
                let valid = registry
                    .get(catalog_id)
                    .is_some_and(|catalog| offset < catalog.len());
                if !valid {
                    warn!(
                        "Working rule {} links to unknown catalog rule {}:{}, treating as local",
                        position, catalog_id, offset
                    );
                    rule.set_provenance(Provenance::Local);
                } else if !seen.insert((catalog_id, offset)) {
                    warn!(
                        "Catalog rule {}:{} is linked twice, working rule {} becomes local",
                        catalog_id, offset, position
                    );
                    rule.set_provenance(Provenance::Local);
                }
            }
            rule
        })
        .collect();
    WorkingSet::from_rules(rules)
}
