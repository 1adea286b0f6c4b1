//! 危急告警处理
//!
//! 分诊结果升为危急时生成告警，并通知订阅方

use chrono::{DateTime, Utc};
use clinq_core::{Actor, ClinqError, Patient, Result, Vitals};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// 广播通道容量，慢订阅方会丢失更早的告警
const ALERT_CHANNEL_CAPACITY: usize = 64;

/// 危急告警
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticalAlert {
    pub id: Uuid,
    pub patient_id: String,
    pub patient_name: String,
    pub vitals: Vitals,
    pub findings: Vec<String>, // 触发的危急条件
    pub raised_at: DateTime<Utc>,
    pub raised_by: String,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl CriticalAlert {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

/// 危急告警处理器
#[derive(Debug)]
pub struct CriticalAlertProcessor {
    alerts: RwLock<HashMap<Uuid, CriticalAlert>>,
    sender: broadcast::Sender<CriticalAlert>,
}

impl CriticalAlertProcessor {
    /// 创建新的危急告警处理器
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            alerts: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// 订阅新告警
    pub fn subscribe(&self) -> broadcast::Receiver<CriticalAlert> {
        self.sender.subscribe()
    }

    /// 生成告警
    pub async fn raise(
        &self,
        patient: &Patient,
        vitals: Vitals,
        findings: Vec<String>,
        raised_by: &Actor,
    ) -> CriticalAlert {
        let alert = CriticalAlert {
            id: Uuid::new_v4(),
            patient_id: patient.id.clone(),
            patient_name: patient.name().to_string(),
            vitals,
            findings,
            raised_at: Utc::now(),
            raised_by: raised_by.id.clone(),
            acknowledged_by: None,
            acknowledged_at: None,
        };

        self.alerts.write().await.insert(alert.id, alert.clone());

        tracing::warn!(
            "Critical alert {} raised for patient {} ({}): {}",
            alert.id,
            alert.patient_id,
            alert.patient_name,
            alert.findings.join(", ")
        );

        // 无订阅方时发送失败，告警仍保留在列表中
        if self.sender.send(alert.clone()).is_err() {
            tracing::debug!("No subscribers for critical alert {}", alert.id);
        }

        alert
    }

    /// 确认告警
    pub async fn acknowledge(&self, alert_id: Uuid, actor: &Actor) -> Result<CriticalAlert> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(&alert_id)
            .ok_or_else(|| ClinqError::NotFound(format!("Critical alert {} not found", alert_id)))?;

        if alert.is_acknowledged() {
            tracing::debug!("Critical alert {} already acknowledged", alert_id);
            return Ok(alert.clone());
        }

        alert.acknowledged_by = Some(actor.id.clone());
        alert.acknowledged_at = Some(Utc::now());

        tracing::info!("Critical alert {} acknowledged by {}", alert_id, actor.id);
        Ok(alert.clone())
    }

    /// 获取未确认的告警，按生成时间排序
    pub async fn unacknowledged(&self) -> Vec<CriticalAlert> {
        let alerts = self.alerts.read().await;
        let mut pending: Vec<CriticalAlert> = alerts
            .values()
            .filter(|alert| !alert.is_acknowledged())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.raised_at.cmp(&b.raised_at));
        pending
    }

    /// 获取某患者的全部告警
    pub async fn alerts_for(&self, patient_id: &str) -> Vec<CriticalAlert> {
        let alerts = self.alerts.read().await;
        let mut found: Vec<CriticalAlert> = alerts
            .values()
            .filter(|alert| alert.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.raised_at.cmp(&b.raised_at));
        found
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }
}

impl Default for CriticalAlertProcessor {
    fn default() -> Self {
        Self::new()
    }
}
