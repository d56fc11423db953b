//! 全局配置管理,存储所有可配置项

use std::path::PathBuf;

/// 等价判定策略（决定启用/禁用状态是否参与脏标记计算）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EquivalencePolicy {
    /// 仅比较模式、大小写与前景/背景色
    #[default]
    IgnoreEnabled,
    /// 启用状态不同也视为本地修改
    IncludeEnabled,
}

/// 全局配置
#[derive(Debug, Clone)]
pub struct FilterConfig {
    // 键值存储文件路径（保存工作集与目录注册表）
    pub settings_path: PathBuf,
    // 自动导入目录，None 表示不扫描
    pub auto_import_dir: Option<PathBuf>,
    // 自动导入文件通配符
    pub auto_import_pattern: String,
    // 脏标记等价策略
    pub equivalence: EquivalencePolicy,
    // 是否启用详细日志
    pub verbose: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from("rsfilterset_settings.json"),
            auto_import_dir: default_auto_import_dir(),
            auto_import_pattern: "*.conf".to_string(),
            equivalence: EquivalencePolicy::default(),
            verbose: false,
        }
    }
}

/// 平台用户数据目录 + /filters/
fn default_auto_import_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("rsfilterset").join("filters"))
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> FilterConfig {
        FilterConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器（便于自定义配置）
#[derive(Debug, Clone)]
pub struct CustomConfigBuilder {
    config: FilterConfig,
}

impl Default for CustomConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FilterConfig::default(),
        }
    }

    pub fn settings_path(mut self, path: PathBuf) -> Self {
        self.config.settings_path = path;
        self
    }

    pub fn auto_import_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.auto_import_dir = dir;
        self
    }

    pub fn auto_import_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.auto_import_pattern = pattern.into();
        self
    }

    pub fn equivalence(mut self, policy: EquivalencePolicy) -> Self {
        self.config.equivalence = policy;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> FilterConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = ConfigManager::custom()
            .settings_path(PathBuf::from("/tmp/s.json"))
            .auto_import_dir(None)
            .auto_import_pattern("*.filters")
            .equivalence(EquivalencePolicy::IncludeEnabled)
            .verbose(true)
            .build();

        assert_eq!(config.settings_path, PathBuf::from("/tmp/s.json"));
        assert!(config.auto_import_dir.is_none());
        assert_eq!(config.auto_import_pattern, "*.filters");
        assert_eq!(config.equivalence, EquivalencePolicy::IncludeEnabled);
        assert!(config.verbose);
    }

    #[test]
    fn test_default_pattern_is_conf() {
        let config = ConfigManager::get_default();
        assert_eq!(config.auto_import_pattern, "*.conf");
        assert_eq!(config.equivalence, EquivalencePolicy::IgnoreEnabled);
    }
}
