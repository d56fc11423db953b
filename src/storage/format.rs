//! 持久化格式定义（v1 + 旧版无版本格式）
//! 仅负责 JSON 结构与规则之间的转换，不涉及来源解析

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FilterSetError, FsResult};
use crate::rule::Rule;

pub const FILTERSET_VERSION: u64 = 1;
pub const LOADED_FILTERSET_VERSION: u64 = 1;
pub const FILTERFILE_VERSION: u64 = 1;

/// 过滤器组的键名
pub const FILTER_SET_GROUP: &str = "FilterSet";
/// 目录注册表组的键名
pub const LOADED_FILTER_SETS_GROUP: &str = "LoadedFilterSets";
/// 旧版（无版本）工作集数据块的键名
pub const LEGACY_FILTER_SET_KEY: &str = "filterSet";

const VERSION_KEY: &str = "version";

fn default_enabled() -> bool {
    true
}

fn is_enabled(enabled: &bool) -> bool {
    *enabled
}

/// 单条过滤器的存储结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub regexp: String,
    #[serde(default)]
    pub ignore_case: bool,
    pub fore_colour: String,
    pub back_colour: String,
    #[serde(default = "default_enabled", skip_serializing_if = "is_enabled")]
    pub enabled: bool,
    /// 目录文件标识，空串表示本地规则（仅工作集写入）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// 目录内偏移，-1 表示无（仅工作集写入）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_offset: Option<i64>,
}

impl FilterEntry {
    /// 目录文件中的条目：不带来源
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            regexp: rule.pattern().to_string(),
            ignore_case: rule.case_insensitive(),
            fore_colour: rule.fore_color().to_string(),
            back_colour: rule.back_color().to_string(),
            enabled: rule.enabled(),
            origin: None,
            loaded_offset: None,
        }
    }

    /// 工作集中的条目：带来源文件与偏移
    pub fn with_origin(rule: &Rule, origin: Option<(&str, usize)>) -> Self {
        let (origin, offset) = match origin {
            Some((identity, offset)) => (identity.to_string(), offset as i64),
            None => (String::new(), -1),
        };
        Self {
            origin: Some(origin),
            loaded_offset: Some(offset),
            ..Self::from_rule(rule)
        }
    }

    /// 转换为本地规则（来源由调用方解析）
    pub fn to_rule(&self) -> Rule {
        Rule::new(
            self.regexp.clone(),
            self.ignore_case,
            self.fore_colour.clone(),
            self.back_colour.clone(),
        )
        .with_enabled(self.enabled)
    }

    /// 非空来源标识
    pub fn origin_identity(&self) -> Option<&str> {
        self.origin.as_deref().filter(|origin| !origin.is_empty())
    }

    /// 合法偏移（非负）
    pub fn offset(&self) -> Option<usize> {
        self.loaded_offset
            .filter(|offset| *offset >= 0)
            .map(|offset| offset as usize)
    }
}

/// 旧版过滤器：无来源、无版本
#[derive(Debug, Clone, Deserialize)]
struct LegacyFilter {
    regexp: String,
    #[serde(default)]
    ignore_case: bool,
    fore_colour: String,
    back_colour: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FilterGroup {
    version: u64,
    #[serde(default)]
    filters: Vec<FilterEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedFilterSet {
    filename: String,
    #[serde(rename = "FilterSet")]
    filter_set: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct LoadedGroup {
    version: u64,
    #[serde(default)]
    sets: Vec<NamedFilterSet>,
}

/// 注册表数据块中的单个目录记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    pub filename: String,
    pub filters: Vec<FilterEntry>,
}

/// 读取对象中的版本号，缺失返回 None
pub fn version_of(value: &Value) -> Option<&Value> {
    value.as_object()?.get(VERSION_KEY)
}

/// 校验版本号，缺失或未知均为格式错误
fn expect_version(value: Option<&Value>, expected: u64, what: &str) -> FsResult<()> {
    match value {
        Some(Value::Number(n)) if n.as_u64() == Some(expected) => Ok(()),
        Some(other) => Err(FilterSetError::Format(format!(
            "unknown {} version {}",
            what, other
        ))),
        None => Err(FilterSetError::Format(format!("missing {} version", what))),
    }
}

/// 解码 FilterSet 组：{version, filters:[...]}
pub fn decode_filter_group(group: &Value) -> FsResult<Vec<FilterEntry>> {
    expect_version(version_of(group), FILTERSET_VERSION, "FilterSet")?;
    let group: FilterGroup = serde_json::from_value(group.clone())?;
    Ok(group.filters)
}

pub fn encode_filter_group(filters: Vec<FilterEntry>) -> Value {
    let group = FilterGroup {
        version: FILTERSET_VERSION,
        filters,
    };
    serde_json::to_value(group).unwrap_or(Value::Null)
}

/// 解码带顶层版本号的文档：{version, FilterSet:{...}}
/// 工作集数据块与目录文件共用此结构
pub fn decode_filter_document(doc: &Value, top_version: u64, what: &str) -> FsResult<Vec<FilterEntry>> {
    expect_version(version_of(doc), top_version, what)?;
    let group = doc
        .get(FILTER_SET_GROUP)
        .ok_or_else(|| FilterSetError::Format(format!("{} has no {} group", what, FILTER_SET_GROUP)))?;
    decode_filter_group(group)
}

pub fn encode_filter_document(filters: Vec<FilterEntry>, top_version: u64) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert(VERSION_KEY.to_string(), Value::from(top_version));
    doc.insert(FILTER_SET_GROUP.to_string(), encode_filter_group(filters));
    doc
}

/// 目录文件 → 规则列表
pub fn decode_catalog_file(doc: &Value) -> FsResult<Vec<Rule>> {
    let entries = decode_filter_document(doc, FILTERFILE_VERSION, "filter file")?;
    Ok(entries.iter().map(FilterEntry::to_rule).collect())
}

/// 规则列表 → 目录文件（不带来源）
pub fn encode_catalog_file<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> Value {
    let filters = rules.into_iter().map(FilterEntry::from_rule).collect();
    Value::Object(encode_filter_document(filters, FILTERFILE_VERSION))
}

/// 旧版数据块 → 本地规则
pub fn decode_legacy_filters(blob: &Value) -> FsResult<Vec<Rule>> {
    let filters: Vec<LegacyFilter> = serde_json::from_value(blob.clone())?;
    Ok(filters
        .into_iter()
        .map(|f| Rule::new(f.regexp, f.ignore_case, f.fore_colour, f.back_colour))
        .collect())
}

/// 解码注册表数据块：{version, LoadedFilterSets:{version, sets:[...]}}
pub fn decode_registry_blob(blob: &Value) -> FsResult<Vec<RegistryRecord>> {
    expect_version(version_of(blob), LOADED_FILTERSET_VERSION, "registry")?;
    let group_value = blob.get(LOADED_FILTER_SETS_GROUP).ok_or_else(|| {
        FilterSetError::Format(format!("registry has no {} group", LOADED_FILTER_SETS_GROUP))
    })?;
    expect_version(version_of(group_value), LOADED_FILTERSET_VERSION, LOADED_FILTER_SETS_GROUP)?;
    let group: LoadedGroup = serde_json::from_value(group_value.clone())?;

    group
        .sets
        .into_iter()
        .map(|set| {
            Ok(RegistryRecord {
                filters: decode_filter_group(&set.filter_set)?,
                filename: set.filename,
            })
        })
        .collect()
}

pub fn encode_registry_blob(records: Vec<RegistryRecord>) -> Value {
    let sets = records
        .into_iter()
        .map(|record| NamedFilterSet {
            filename: record.filename,
            filter_set: encode_filter_group(record.filters),
        })
        .collect();
    let group = LoadedGroup {
        version: LOADED_FILTERSET_VERSION,
        sets,
    };

    let mut blob = Map::new();
    blob.insert(VERSION_KEY.to_string(), Value::from(LOADED_FILTERSET_VERSION));
    blob.insert(
        LOADED_FILTER_SETS_GROUP.to_string(),
        serde_json::to_value(group).unwrap_or(Value::Null),
    );
    Value::Object(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_file_has_no_provenance_keys() {
        let rules = vec![Rule::new("ERROR", true, "red", "white")];
        let doc = encode_catalog_file(&rules);
        assert_eq!(
            doc,
            json!({
                "version": 1,
                "FilterSet": {
                    "version": 1,
                    "filters": [
                        {"regexp": "ERROR", "ignore_case": true, "fore_colour": "red", "back_colour": "white"}
                    ]
                }
            })
        );
        assert_eq!(decode_catalog_file(&doc).unwrap(), rules);
    }

    #[test]
    fn test_working_entry_writes_origin_and_offset() {
        let rule = Rule::new("x", false, "red", "white");
        let local = serde_json::to_value(FilterEntry::with_origin(&rule, None)).unwrap();
        assert_eq!(local["origin"], json!(""));
        assert_eq!(local["loaded_offset"], json!(-1));

        let linked = FilterEntry::with_origin(&rule, Some(("/f/a.conf", 3)));
        assert_eq!(linked.origin_identity(), Some("/f/a.conf"));
        assert_eq!(linked.offset(), Some(3));
    }

    #[test]
    fn test_disabled_flag_only_written_when_false() {
        let rule = Rule::new("x", false, "red", "white").with_enabled(false);
        let value = serde_json::to_value(FilterEntry::from_rule(&rule)).unwrap();
        assert_eq!(value["enabled"], json!(false));
        assert!(!FilterEntry::from_rule(&rule).to_rule().enabled());
    }

    #[test]
    fn test_unknown_version_is_format_error() {
        let doc = json!({"version": 2, "FilterSet": {"version": 1, "filters": []}});
        assert!(matches!(decode_catalog_file(&doc), Err(FilterSetError::Format(_))));

        let doc = json!({"version": 1, "FilterSet": {"version": 7, "filters": []}});
        assert!(matches!(decode_catalog_file(&doc), Err(FilterSetError::Format(_))));

        let doc = json!({"FilterSet": {"version": 1, "filters": []}});
        assert!(matches!(decode_catalog_file(&doc), Err(FilterSetError::Format(_))));
    }

    #[test]
    fn test_registry_blob_roundtrip() {
        let records = vec![RegistryRecord {
            filename: "/f/a.conf".to_string(),
            filters: vec![FilterEntry::from_rule(&Rule::new("a", false, "red", "white"))],
        }];
        let blob = encode_registry_blob(records.clone());
        assert_eq!(decode_registry_blob(&blob).unwrap(), records);
    }

    #[test]
    fn test_legacy_filters_decode_as_local() {
        let blob = json!([
            {"regexp": "a", "fore_colour": "red", "back_colour": "white"},
            {"regexp": "b", "ignore_case": true, "fore_colour": "blue", "back_colour": "white"}
        ]);
        let rules = decode_legacy_filters(&blob).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.provenance().is_local()));
        assert!(rules[1].case_insensitive());
    }
}
