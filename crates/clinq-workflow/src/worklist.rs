//! 候诊队列
//!
//! 从一致快照推导出的候诊患者排序视图，不修改任何患者记录

use chrono::{DateTime, Utc};
use clinq_core::{Patient, PatientStatus, UrgencyLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 尚未分诊的患者排在所有已分诊患者之后
const UNTRIAGED_RANK: u8 = 3;

fn queue_rank(patient: &Patient) -> u8 {
    patient
        .urgency()
        .map(UrgencyLevel::rank)
        .unwrap_or(UNTRIAGED_RANK)
}

/// 候诊队列过滤器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFilter {
    pub urgency: Option<Vec<UrgencyLevel>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for QueueFilter {
    fn default() -> Self {
        Self {
            urgency: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

/// 候诊队列统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub by_urgency: HashMap<UrgencyLevel, usize>,
    pub longest_wait_minutes: i64,
    pub average_wait_minutes: f64,
}

/// 生成候诊队列
///
/// 只保留候诊状态的患者，按紧急程度升序、挂号顺序升序排列。
/// 排序是稳定的，同级患者保持挂号先后。
pub fn order_queue(patients: &[Patient]) -> Vec<Patient> {
    let mut queue: Vec<Patient> = patients
        .iter()
        .filter(|patient| patient.status == PatientStatus::AwaitingConsultation)
        .cloned()
        .collect();

    queue.sort_by(|a, b| {
        queue_rank(a)
            .cmp(&queue_rank(b))
            .then_with(|| a.arrival_seq.cmp(&b.arrival_seq))
    });

    queue
}

/// 按过滤条件查询候诊队列
pub fn query_queue(patients: &[Patient], filter: &QueueFilter) -> Vec<Patient> {
    let mut queue = order_queue(patients);

    if let Some(levels) = &filter.urgency {
        queue.retain(|patient| {
            patient
                .urgency()
                .map(|level| levels.contains(&level))
                .unwrap_or(false)
        });
    }

    // 应用分页
    let offset = filter.offset.unwrap_or(0);
    let limit = filter.limit.unwrap_or(50);

    queue.into_iter().skip(offset).take(limit).collect()
}

/// 患者在候诊队列中的位置（从 1 开始）
pub fn position_in_queue(patients: &[Patient], patient_id: &str) -> Option<usize> {
    order_queue(patients)
        .iter()
        .position(|patient| patient.id == patient_id)
        .map(|index| index + 1)
}

/// 计算候诊队列统计
pub fn queue_stats(patients: &[Patient], now: DateTime<Utc>) -> QueueStats {
    let queue = order_queue(patients);

    let mut stats = QueueStats {
        total: queue.len(),
        by_urgency: HashMap::new(),
        longest_wait_minutes: 0,
        average_wait_minutes: 0.0,
    };

    let mut total_wait: i64 = 0;
    for patient in &queue {
        if let Some(level) = patient.urgency() {
            *stats.by_urgency.entry(level).or_insert(0) += 1;
        }

        let wait = patient.wait_minutes(now);
        stats.longest_wait_minutes = stats.longest_wait_minutes.max(wait);
        total_wait += wait;
    }

    if !queue.is_empty() {
        stats.average_wait_minutes = total_wait as f64 / queue.len() as f64;
    }

    stats
}
