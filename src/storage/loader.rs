//! 会话加载与保存
//! 注册表 → 漂移检测 → 工作集（旧版迁移、来源解析、缺失占位）→ 会话
//! 所有存储错误在本地恢复：记录日志后跳过或标记缺失，不中断会话

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::auto_import::AutoImportDir;
use super::catalog_file::CatalogStorage;
use super::format::{
    decode_filter_document, decode_legacy_filters, decode_registry_blob, encode_filter_document,
    encode_registry_blob, version_of, FilterEntry, RegistryRecord, FILTERSET_VERSION,
    LEGACY_FILTER_SET_KEY,
};
use super::prompt::ReloadPrompt;
use super::store::SettingsStore;
use crate::catalog::{Catalog, CatalogRegistry};
use crate::config::EquivalencePolicy;
use crate::error::{FilterSetError, FsResult};
use crate::rule::{Provenance, Rule, WorkingSet};
use crate::session::FilterSession;

/// 工作集数据块的键名
pub const WORKING_SET_KEY: &str = "filterSet";
/// 目录注册表数据块的键名
pub const REGISTRY_KEY: &str = "loadedFilterSets";
/// 缺失占位目录可覆盖的偏移上限
const MAX_PLACEHOLDER_OFFSET: usize = 4096;

/// 加载目录注册表：先取显式注册的目录（使用保存时嵌入的副本），再追加自动导入目录中的文件
pub fn load_registry(
    store: &dyn SettingsStore,
    storage: &dyn CatalogStorage,
    auto_import: Option<&AutoImportDir>,
) -> CatalogRegistry {
    let mut registry = CatalogRegistry::new();

    if let Some(blob) = store.get(REGISTRY_KEY) {
        match decode_registry_blob(&blob) {
            Ok(records) => {
                for record in records {
                    let rules = record.filters.iter().map(FilterEntry::to_rule).collect();
                    registry.push(Catalog::new(record.filename, rules));
                }
            }
            Err(e) => error!("Ignoring registered filter sets: {}", e),
        }
    }
    debug!("Loaded {} registered filter sets", registry.len());

    if let Some(auto_import) = auto_import {
        for path in auto_import.scan() {
            let identity = path.to_string_lossy().to_string();
            if registry.find_by_identity(&identity).is_some() {
                continue;
            }
            match storage.read_catalog(&identity) {
                Ok(rules) => {
                    registry.push(Catalog::new(identity, rules));
                }
                Err(e) => warn!("Skipping auto-import filter file {}: {}", identity, e),
            }
        }
    }

    registry
}

/// 对比每个目录的磁盘内容与内存副本
/// 内容不同且用户确认时替换内存副本；返回注册表是否需要重新保存
pub fn reconcile_catalog_drift(
    registry: &mut CatalogRegistry,
    storage: &dyn CatalogStorage,
    prompt: &dyn ReloadPrompt,
) -> bool {
    let mut needs_save = false;

    for catalog in registry.iter_mut() {
        match storage.read_catalog(&catalog.file_identity) {
            Ok(rules) => {
                catalog.is_missing = false;
                if catalog.same_rules(&rules) {
                    continue;
                }
                warn!("Filter file {} changed on disk", catalog.file_identity);
                if prompt.confirm_reload(&catalog.file_identity) {
                    *catalog = Catalog::new(catalog.file_identity.clone(), rules);
                    needs_save = true;
                    debug!("Reloaded {}", catalog.file_identity);
                }
            }
            Err(FilterSetError::NotFound(reason)) => {
                warn!("Filter file missing: {}", reason);
                catalog.is_missing = true;
            }
            Err(e) => warn!("Cannot check {} for changes: {}", catalog.file_identity, e),
        }
    }

    needs_save
}

/// 加载工作集
/// 无版本的旧数据块会被迁移为 v1 并立即写回；未知版本返回格式错误
pub fn load_working_set(
    store: &mut dyn SettingsStore,
    registry: &mut CatalogRegistry,
    storage: &dyn CatalogStorage,
) -> FsResult<WorkingSet> {
    let Some(blob) = store.get(WORKING_SET_KEY) else {
        debug!("No saved filter set");
        return Ok(WorkingSet::new());
    };

    if version_of(&blob).is_none() {
        return Ok(migrate_legacy(store, &blob));
    }

    let entries = decode_filter_document(&blob, FILTERSET_VERSION, "filter set").map_err(|e| {
        error!("Unknown version of filter set, ignoring it: {}", e);
        e
    })?;

    register_unknown_origins(&entries, registry, storage);

    let rules = entries
        .iter()
        .enumerate()
        .map(|(position, entry)| resolve_entry(position, entry, registry))
        .collect();
    Ok(WorkingSet::from_rules(rules))
}

/// 旧版迁移：全部视为本地规则，以 v1 覆盖旧键；失败时工作集为空且不写入
fn migrate_legacy(store: &mut dyn SettingsStore, blob: &Value) -> WorkingSet {
    warn!("Trying to import legacy filters...");
    let decoded = blob
        .get(LEGACY_FILTER_SET_KEY)
        .ok_or_else(|| FilterSetError::Format("legacy filter set has no filter list".to_string()))
        .and_then(decode_legacy_filters);

    let rules = match decoded {
        Ok(rules) => rules,
        Err(e) => {
            warn!("Legacy filter import skipped: {}", e);
            return WorkingSet::new();
        }
    };
    warn!("...imported legacy filter set: {} elements", rules.len());

    let working_set = WorkingSet::from_rules(rules);
    let blob = encode_working_set(&working_set, &CatalogRegistry::new());
    if let Err(e) = store.set(WORKING_SET_KEY, blob) {
        warn!("Could not save migrated filter set: {}", e);
    }
    working_set
}

/// 未注册的来源文件：可读则注册，否则建立缺失占位目录
fn register_unknown_origins(
    entries: &[FilterEntry],
    registry: &mut CatalogRegistry,
    storage: &dyn CatalogStorage,
) {
    let mut unknown: BTreeMap<&str, Vec<(usize, &FilterEntry)>> = BTreeMap::new();
    for entry in entries {
        let (Some(identity), Some(offset)) = (entry.origin_identity(), entry.offset()) else {
            continue;
        };
        if registry.find_by_identity(identity).is_none() {
            unknown.entry(identity).or_default().push((offset, entry));
        }
    }

    for (identity, referenced) in unknown {
        match storage.read_catalog(identity) {
            Ok(rules) => {
                debug!("Registering referenced filter file {}", identity);
                registry.push(Catalog::new(identity, rules));
            }
            Err(e) => {
                warn!("Filter file {} is missing, using placeholder: {}", identity, e);
                let rules = placeholder_rules(identity, &referenced);
                registry.push(Catalog::missing(identity, rules));
            }
        }
    }
}

/// 占位目录的规则：覆盖所有被引用的偏移，被引用处使用工作集副本，空隙为默认规则。
/// 不小于 `MAX_PLACEHOLDER_OFFSET` 的偏移不占位，解析时降级为本地规则
fn placeholder_rules(identity: &str, referenced: &[(usize, &FilterEntry)]) -> Vec<Rule> {
    let mut slots: BTreeMap<usize, Rule> = BTreeMap::new();
    for (offset, entry) in referenced {
        if *offset >= MAX_PLACEHOLDER_OFFSET {
            warn!("Placeholder for {} ignores out-of-range offset {}", identity, offset);
            continue;
        }
        slots.entry(*offset).or_insert_with(|| entry.to_rule());
    }
    let len = slots.keys().next_back().map_or(0, |last| last + 1);
    (0..len)
        .map(|offset| slots.remove(&offset).unwrap_or_default())
        .collect()
}

/// 条目 → 规则，解析来源；非法来源降级为本地
fn resolve_entry(position: usize, entry: &FilterEntry, registry: &CatalogRegistry) -> Rule {
    let rule = entry.to_rule();
    match (entry.origin_identity(), entry.loaded_offset) {
        (Some(identity), offset) => {
            let catalog_id = registry.find_by_identity(identity);
            let valid = catalog_id.zip(entry.offset()).filter(|(catalog_id, offset)| {
                registry
                    .get(*catalog_id)
                    .is_some_and(|catalog| *offset < catalog.len())
            });
            match valid {
                Some((catalog_id, offset)) => {
                    rule.with_provenance(Provenance::catalog(catalog_id, offset))
                }
                None => {
                    warn!(
                        "Loaded filter {} from {} has invalid offset {:?}",
                        position, identity, offset
                    );
                    rule
                }
            }
        }
        (None, Some(offset)) if offset >= 0 => {
            warn!(
                "Loaded filter {} has no origin but loaded_offset {}",
                position, offset
            );
            rule
        }
        (None, _) => rule,
    }
}

fn encode_working_set(working_set: &WorkingSet, registry: &CatalogRegistry) -> Value {
    let entries = working_set
        .iter()
        .map(|rule| {
            let origin = rule
                .provenance()
                .catalog_link()
                .and_then(|(catalog_id, offset)| {
                    registry
                        .get(catalog_id)
                        .map(|catalog| (catalog.file_identity.as_str(), offset))
                });
            FilterEntry::with_origin(rule, origin)
        })
        .collect();
    Value::Object(encode_filter_document(entries, FILTERSET_VERSION))
}

/// 保存工作集（来源以文件标识 + 偏移写出）
pub fn save_working_set(
    store: &mut dyn SettingsStore,
    working_set: &WorkingSet,
    registry: &CatalogRegistry,
) -> FsResult<()> {
    store.set(WORKING_SET_KEY, encode_working_set(working_set, registry))?;
    debug!("Saved filter set with {} filters", working_set.len());
    Ok(())
}

/// 保存注册表；自动导入目录中的文件不显式保存
pub fn save_registry(
    store: &mut dyn SettingsStore,
    registry: &CatalogRegistry,
    auto_import: Option<&AutoImportDir>,
) -> FsResult<()> {
    let records: Vec<RegistryRecord> = registry
        .iter()
        .filter(|catalog| !auto_import.is_some_and(|dir| dir.contains(&catalog.file_identity)))
        .map(|catalog| RegistryRecord {
            filename: catalog.file_identity.clone(),
            filters: catalog.rules.iter().map(FilterEntry::from_rule).collect(),
        })
        .collect();
    let written = records.len();
    store.set(REGISTRY_KEY, encode_registry_blob(records))?;
    debug!(
        "Saved {} of {} filter sets",
        written,
        registry.len()
    );
    Ok(())
}

/// 打开会话：加载注册表并检测漂移，再加载工作集
pub fn load_session(
    store: &mut dyn SettingsStore,
    storage: &dyn CatalogStorage,
    auto_import: Option<&AutoImportDir>,
    prompt: &dyn ReloadPrompt,
    policy: EquivalencePolicy,
) -> FilterSession {
    let mut registry = load_registry(store, storage, auto_import);
    let mut registry_changed = reconcile_catalog_drift(&mut registry, storage, prompt);

    let registered = registry.len();
    let working_set = load_working_set(store, &mut registry, storage).unwrap_or_default();
    registry_changed |= registry.len() != registered;

    let mut session = FilterSession::new(working_set, registry, policy);
    if registry_changed {
        session.mark_registry_dirty();
    }
    debug!(
        "Session opened: {} filters, {} filter sets",
        session.working_set().len(),
        session.registry().len()
    );
    session
}

/// 提交会话：写回注册表与工作集
pub fn save_session(
    store: &mut dyn SettingsStore,
    session: &mut FilterSession,
    auto_import: Option<&AutoImportDir>,
) -> FsResult<()> {
    save_registry(store, session.registry(), auto_import)?;
    save_working_set(store, session.working_set(), session.registry())?;
    session.mark_registry_saved();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AlwaysReload, MemoryCatalogStorage, MemorySettingsStore, NeverReload};
    use serde_json::json;

    fn filter(regexp: &str) -> Value {
        json!({"regexp": regexp, "ignore_case": false, "fore_colour": "red", "back_colour": "white"})
    }

    fn linked(regexp: &str, origin: &str, offset: i64) -> Value {
        json!({
            "regexp": regexp, "ignore_case": false, "fore_colour": "red", "back_colour": "white",
            "origin": origin, "loaded_offset": offset
        })
    }

    fn working_blob(filters: Vec<Value>) -> Value {
        json!({"version": 1, "FilterSet": {"version": 1, "filters": filters}})
    }

    fn registry_blob(sets: Vec<(&str, Vec<Value>)>) -> Value {
        let sets: Vec<Value> = sets
            .into_iter()
            .map(|(name, filters)| {
                json!({"filename": name, "FilterSet": {"version": 1, "filters": filters}})
            })
            .collect();
        json!({"version": 1, "LoadedFilterSets": {"version": 1, "sets": sets}})
    }

    #[test]
    fn test_legacy_migration() {
        let mut store = MemorySettingsStore::new().with_blob(
            WORKING_SET_KEY,
            json!({"filterSet": [filter("a"), filter("b"), filter("c")]}),
        );
        let mut registry = CatalogRegistry::new();
        let storage = MemoryCatalogStorage::new();

        let working_set = load_working_set(&mut store, &mut registry, &storage).unwrap();
        assert_eq!(working_set.len(), 3);
        assert!(working_set.iter().all(|r| r.provenance().is_local()));

        let saved = store.get(WORKING_SET_KEY).unwrap();
        assert_eq!(saved["version"], json!(1));
        assert!(saved.get(LEGACY_FILTER_SET_KEY).is_none());
        assert_eq!(saved["FilterSet"]["filters"][2]["origin"], json!(""));
    }

    #[test]
    fn test_legacy_migration_overwrites_file_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        {
            let mut store = crate::storage::JsonFileSettingsStore::open(&path).unwrap();
            store
                .set(WORKING_SET_KEY, json!({"filterSet": [filter("a")]}))
                .unwrap();
            let mut registry = CatalogRegistry::new();
            load_working_set(&mut store, &mut registry, &MemoryCatalogStorage::new()).unwrap();
        }

        let reopened = crate::storage::JsonFileSettingsStore::open(&path).unwrap();
        let saved = reopened.get(WORKING_SET_KEY).unwrap();
        assert_eq!(saved["version"], json!(1));
        assert!(saved.get(LEGACY_FILTER_SET_KEY).is_none());
        assert_eq!(saved["FilterSet"]["filters"][0]["regexp"], json!("a"));
    }

    #[test]
    fn test_broken_legacy_blob_is_skipped() {
        let original = json!({"filterSet": "not a list"});
        let mut store = MemorySettingsStore::new().with_blob(WORKING_SET_KEY, original.clone());
        let working_set =
            load_working_set(&mut store, &mut CatalogRegistry::new(), &MemoryCatalogStorage::new())
                .unwrap();
        assert!(working_set.is_empty());
        assert_eq!(store.get(WORKING_SET_KEY), Some(original));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut store = MemorySettingsStore::new()
            .with_blob(WORKING_SET_KEY, json!({"version": 3, "FilterSet": {}}));
        let result =
            load_working_set(&mut store, &mut CatalogRegistry::new(), &MemoryCatalogStorage::new());
        assert!(matches!(result, Err(FilterSetError::Format(_))));
    }

    #[test]
    fn test_origin_resolution_and_demotion() {
        let mut store = MemorySettingsStore::new().with_blob(
            WORKING_SET_KEY,
            working_blob(vec![
                linked("a1", "/f/a.conf", 1),
                linked("bad", "/f/a.conf", 9),
                linked("orphan", "", 4),
            ]),
        );
        let mut registry = CatalogRegistry::from_catalogs(vec![Catalog::new(
            "/f/a.conf",
            vec![Rule::new("a0", false, "red", "white"), Rule::new("a1", false, "red", "white")],
        )]);

        let working_set =
            load_working_set(&mut store, &mut registry, &MemoryCatalogStorage::new()).unwrap();
        assert_eq!(working_set.get(0).unwrap().provenance(), Provenance::catalog(0, 1));
        assert!(working_set.get(1).unwrap().provenance().is_local());
        assert!(working_set.get(2).unwrap().provenance().is_local());
    }

    #[test]
    fn test_missing_origin_creates_placeholder() {
        let mut store = MemorySettingsStore::new().with_blob(
            WORKING_SET_KEY,
            working_blob(vec![linked("gone", "/f/gone.conf", 2)]),
        );
        let mut registry = CatalogRegistry::new();

        let working_set =
            load_working_set(&mut store, &mut registry, &MemoryCatalogStorage::new()).unwrap();
        let placeholder = registry.get(0).unwrap();
        assert!(placeholder.is_missing);
        assert_eq!(placeholder.len(), 3);
        assert_eq!(placeholder.rules[2].pattern(), "gone");
        assert_eq!(placeholder.rules[0], Rule::default());
        assert_eq!(working_set.get(0).unwrap().provenance(), Provenance::catalog(0, 2));
    }

    #[test]
    fn test_huge_offset_is_demoted() {
        let mut store = MemorySettingsStore::new().with_blob(
            WORKING_SET_KEY,
            working_blob(vec![
                linked("far", "/f/gone.conf", 9_000_000_000_000_000_000),
                linked("near", "/f/gone.conf", 1),
            ]),
        );
        let mut registry = CatalogRegistry::new();

        let working_set =
            load_working_set(&mut store, &mut registry, &MemoryCatalogStorage::new()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0).unwrap().len(), 2);
        assert!(working_set.get(0).unwrap().provenance().is_local());
        assert_eq!(working_set.get(1).unwrap().provenance(), Provenance::catalog(0, 1));
    }

    #[test]
    fn test_placeholder_with_only_huge_offsets_is_empty() {
        let mut store = MemorySettingsStore::new().with_blob(
            WORKING_SET_KEY,
            working_blob(vec![linked("far", "/f/gone.conf", i64::MAX)]),
        );
        let mut registry = CatalogRegistry::new();

        let working_set =
            load_working_set(&mut store, &mut registry, &MemoryCatalogStorage::new()).unwrap();
        assert!(registry.get(0).unwrap().is_missing);
        assert!(registry.get(0).unwrap().is_empty());
        assert!(working_set.get(0).unwrap().provenance().is_local());
    }

    #[test]
    fn test_unregistered_readable_origin_is_registered() {
        let storage = MemoryCatalogStorage::new();
        storage.insert_rules("/f/x.conf", &[Rule::new("x", false, "red", "white")]);
        let mut store = MemorySettingsStore::new()
            .with_blob(WORKING_SET_KEY, working_blob(vec![linked("x", "/f/x.conf", 0)]));
        let mut registry = CatalogRegistry::new();

        load_working_set(&mut store, &mut registry, &storage).unwrap();
        assert!(!registry.get(0).unwrap().is_missing);
    }

    #[test]
    fn test_registry_uses_embedded_copy_and_appends_auto_import() {
        let dir = tempfile::tempdir().unwrap();
        let auto_path = dir.path().join("auto.conf");
        let auto_identity = auto_path.to_string_lossy().to_string();
        std::fs::write(&auto_path, "").unwrap();

        let storage = MemoryCatalogStorage::new();
        storage.insert_rules(&auto_identity, &[Rule::new("auto", false, "blue", "white")]);
        let store = MemorySettingsStore::new()
            .with_blob(REGISTRY_KEY, registry_blob(vec![("/f/a.conf", vec![filter("a")])]));
        let auto_import = AutoImportDir::new(dir.path(), "*.conf").unwrap();

        let registry = load_registry(&store, &storage, Some(&auto_import));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0).unwrap().rules[0].pattern(), "a");
        assert_eq!(registry.get(1).unwrap().file_identity, auto_identity);

        let mut out = MemorySettingsStore::new();
        save_registry(&mut out, &registry, Some(&auto_import)).unwrap();
        let sets = &out.get(REGISTRY_KEY).unwrap()["LoadedFilterSets"]["sets"];
        assert_eq!(sets.as_array().unwrap().len(), 1);
        assert_eq!(sets[0]["filename"], json!("/f/a.conf"));
    }

    #[test]
    fn test_unknown_registry_version_is_ignored() {
        let store = MemorySettingsStore::new()
            .with_blob(REGISTRY_KEY, json!({"version": 2, "LoadedFilterSets": {}}));
        let registry = load_registry(&store, &MemoryCatalogStorage::new(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drift_prompt_decides_reload() {
        let storage = MemoryCatalogStorage::new();
        storage.insert_rules("/f/a.conf", &[Rule::new("changed", false, "red", "white")]);
        let make = || {
            CatalogRegistry::from_catalogs(vec![
                Catalog::new("/f/a.conf", vec![Rule::new("a", false, "red", "white")]),
                Catalog::new("/f/gone.conf", vec![]),
            ])
        };

        let mut kept = make();
        assert!(!reconcile_catalog_drift(&mut kept, &storage, &NeverReload));
        assert_eq!(kept.get(0).unwrap().rules[0].pattern(), "a");
        assert!(kept.get(1).unwrap().is_missing);

        let mut reloaded = make();
        assert!(reconcile_catalog_drift(&mut reloaded, &storage, &AlwaysReload));
        assert_eq!(reloaded.get(0).unwrap().rules[0].pattern(), "changed");
    }

    #[test]
    fn test_session_roundtrip() {
        let storage = MemoryCatalogStorage::new();
        storage.insert_rules(
            "/f/a.conf",
            &[Rule::new("a0", false, "red", "white"), Rule::new("a1", true, "red", "white")],
        );
        let working = working_blob(vec![filter("local"), linked("a1", "/f/a.conf", 1)]);
        let registry = registry_blob(vec![(
            "/f/a.conf",
            vec![
                filter("a0"),
                json!({"regexp": "a1", "ignore_case": true, "fore_colour": "red", "back_colour": "white"}),
            ],
        )]);
        let mut store = MemorySettingsStore::new()
            .with_blob(WORKING_SET_KEY, working.clone())
            .with_blob(REGISTRY_KEY, registry.clone());

        let mut session =
            load_session(&mut store, &storage, None, &NeverReload, EquivalencePolicy::default());
        assert!(!session.registry_needs_save());
        assert_eq!(session.xref().entry(0, 1).unwrap().working_index, Some(1));

        let mut out = MemorySettingsStore::new();
        save_session(&mut out, &mut session, None).unwrap();
        assert_eq!(out.get(REGISTRY_KEY), Some(registry));
        assert_eq!(
            out.get(WORKING_SET_KEY).unwrap()["FilterSet"]["filters"][1],
            linked("a1", "/f/a.conf", 1)
        );
    }
}
