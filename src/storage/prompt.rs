//! 用户确认协作者
//! 目录文件在磁盘上发生变化时询问是否重新加载；无头场景可固定策略

/// 是否重新加载已变化的目录文件
pub trait ReloadPrompt {
    fn confirm_reload(&self, file_identity: &str) -> bool;
}

/// 总是重新加载
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReload;

impl ReloadPrompt for AlwaysReload {
    fn confirm_reload(&self, _file_identity: &str) -> bool {
        true
    }
}

/// 从不重新加载，保留会话开始时的副本
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReload;

impl ReloadPrompt for NeverReload {
    fn confirm_reload(&self, _file_identity: &str) -> bool {
        false
    }
}

impl<F> ReloadPrompt for F
where
    F: Fn(&str) -> bool,
{
    fn confirm_reload(&self, file_identity: &str) -> bool {
        self(file_identity)
    }
}
