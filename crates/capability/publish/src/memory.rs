//! 内存发布器
//!
//! 仅用于本地测试和回放，记录所有成功发布的指标。

use crate::{PublishError, Publisher};
use async_trait::async_trait;
use domain::Metric;
use std::collections::HashSet;
use std::sync::Mutex;

/// 内存发布器
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<Metric>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定指标名的发布强制失败
    pub fn fail_metric(&self, name: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(name.to_string());
        }
    }

    pub fn published(&self) -> Vec<Metric> {
        self.published.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// 已发布指标名（按发布顺序）
    pub fn names(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|m| m.iter().map(|metric| metric.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 指定名称的已发布指标条数
    pub fn count(&self, name: &str) -> usize {
        self.published
            .lock()
            .map(|m| m.iter().filter(|metric| metric.name == name).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.published.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, metric: &Metric) -> Result<(), PublishError> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| PublishError::Bus("lock failed".to_string()))?
            .contains(&metric.name);
        if failing {
            return Err(PublishError::Bus(format!("forced failure for {}", metric.name)));
        }
        self.published
            .lock()
            .map_err(|_| PublishError::Bus("lock failed".to_string()))?
            .push(metric.clone());
        Ok(())
    }
}
