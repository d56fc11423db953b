//! 渲染侧高亮器
//! 渲染线程只读取已发布的工作集快照；编辑会话结束后整体替换快照

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::rule::{ColorName, WorkingSet};

/// 工作集快照的持有者，可在线程间共享
#[derive(Debug, Default)]
pub struct Highlighter {
    snapshot: RwLock<Arc<WorkingSet>>,
}

impl Highlighter {
    pub fn new(working_set: WorkingSet) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(working_set)),
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<WorkingSet> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// 对一行求值，返回首个命中规则的颜色
    pub fn highlight(&self, line: &str) -> Option<(ColorName, ColorName)> {
        let snapshot = self.snapshot();
        snapshot
            .evaluate(line)
            .map(|(fore, back)| (fore.to_string(), back.to_string()))
    }

    /// 发布新的工作集
    pub fn apply(&self, working_set: WorkingSet) {
        let rules = working_set.len();
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(working_set);
        debug!("Highlighter switched to a set of {} filters", rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use std::thread;

    #[test]
    fn test_apply_replaces_snapshot() {
        let highlighter = Highlighter::new(WorkingSet::from_rules(vec![Rule::new(
            "ERROR", false, "red", "white",
        )]));
        let before = highlighter.snapshot();

        highlighter.apply(WorkingSet::from_rules(vec![Rule::new(
            "ERROR", false, "blue", "white",
        )]));
        assert_eq!(
            highlighter.highlight("ERROR here"),
            Some(("blue".to_string(), "white".to_string()))
        );
        assert_eq!(before.evaluate("ERROR here"), Some(("red", "white")));
    }

    #[test]
    fn test_concurrent_readers() {
        let highlighter = Arc::new(Highlighter::new(WorkingSet::from_rules(vec![Rule::new(
            "warn", true, "orange", "black",
        )])));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let highlighter = Arc::clone(&highlighter);
                thread::spawn(move || highlighter.highlight("WARN: low disk").is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
