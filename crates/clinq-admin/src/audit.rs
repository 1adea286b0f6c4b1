//! 审计日志
//!
//! 保存流转引擎产生的审计条目，并提供按条件检索

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinq_core::{AuditAction, AuditEntry, AuditSink, ClinqError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// 默认最多保留的审计条目数
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// 时间范围（闭区间）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// 排序方式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    /// 时间升序
    Ascending,
    /// 时间降序
    #[default]
    Descending,
}

/// 审计查询过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub actions: Option<Vec<AuditAction>>,
    pub patient_id: Option<String>,
    pub time_range: Option<TimeRange>,
    /// 在详情和操作人姓名中搜索（正则，不区分大小写）
    pub pattern: Option<String>,
    pub limit: Option<usize>,
    pub sort_order: SortOrder,
}

/// 审计统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_entries: usize,
    pub entries_by_action: HashMap<AuditAction, usize>,
    pub entries_by_actor: HashMap<String, usize>,
}

/// 审计日志，最新条目在前
#[derive(Debug)]
pub struct AuditTrail {
    entries: RwLock<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 最近的若干条目
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.read().await.iter().take(limit).cloned().collect()
    }

    /// 按过滤条件查询
    pub async fn query(&self, filter: &AuditFilter) -> clinq_core::Result<Vec<AuditEntry>> {
        let pattern = filter
            .pattern
            .as_deref()
            .map(compile_pattern)
            .transpose()?;

        let entries = self.entries.read().await;
        let mut results: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| matches_filter(entry, filter, pattern.as_ref()))
            .cloned()
            .collect();

        // 应用排序
        match filter.sort_order {
            SortOrder::Ascending => results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
            SortOrder::Descending => results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        }

        // 应用限制
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// 审计统计
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;
        let mut entries_by_action = HashMap::new();
        let mut entries_by_actor = HashMap::new();

        for entry in entries.iter() {
            *entries_by_action.entry(entry.action).or_insert(0) += 1;
            *entries_by_actor.entry(entry.actor_id.clone()).or_insert(0) += 1;
        }

        AuditStats {
            total_entries: entries.len(),
            entries_by_action,
            entries_by_actor,
        }
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for AuditTrail {
    async fn record(&self, entry: AuditEntry) {
        debug!("Audit {} by {}: {}", entry.action, entry.actor_id, entry.detail);

        let mut entries = self.entries.write().await;
        entries.push_front(entry);
        entries.truncate(self.max_entries);
    }
}

fn compile_pattern(pattern: &str) -> clinq_core::Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ClinqError::validation("pattern", e.to_string()))
}

fn matches_filter(entry: &AuditEntry, filter: &AuditFilter, pattern: Option<&Regex>) -> bool {
    if let Some(actor_id) = &filter.actor_id {
        if &entry.actor_id != actor_id {
            return false;
        }
    }

    if let Some(actions) = &filter.actions {
        if !actions.contains(&entry.action) {
            return false;
        }
    }

    if let Some(patient_id) = &filter.patient_id {
        if entry.patient_id.as_ref() != Some(patient_id) {
            return false;
        }
    }

    if let Some(range) = &filter.time_range {
        if !range.contains(entry.timestamp) {
            return false;
        }
    }

    if let Some(regex) = pattern {
        if !regex.is_match(&entry.detail) && !regex.is_match(&entry.actor_name) {
            return false;
        }
    }

    true
}
