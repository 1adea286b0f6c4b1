//! 审计接口
//!
//! 每次变更操作产生一条审计记录，由外部审计协作方持久化或展示。

use crate::models::{Actor, UrgencyLevel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// 审计动作类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    PatientRegistration,
    VitalsCapture,
    ConsultationNotes,
    TreatmentPlan,
    WardAdmission,
    Discharge,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::PatientRegistration => "PATIENT_REGISTRATION",
            AuditAction::VitalsCapture => "VITALS_CAPTURE",
            AuditAction::ConsultationNotes => "CONSULTATION_NOTES",
            AuditAction::TreatmentPlan => "TREATMENT_PLAN",
            AuditAction::WardAdmission => "WARD_ADMISSION",
            AuditAction::Discharge => "DISCHARGE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub actor_name: String,
    pub action: AuditAction,
    pub detail: String,
    pub patient_id: Option<String>,
    pub ward_id: Option<String>,
    pub urgency_before: Option<UrgencyLevel>,
    pub urgency_after: Option<UrgencyLevel>,
}

impl AuditEntry {
    pub fn new(actor: &Actor, action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            action,
            detail: detail.into(),
            patient_id: None,
            ward_id: None,
            urgency_before: None,
            urgency_after: None,
        }
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_ward(mut self, ward_id: impl Into<String>) -> Self {
        self.ward_id = Some(ward_id.into());
        self
    }

    pub fn with_urgency(
        mut self,
        before: Option<UrgencyLevel>,
        after: Option<UrgencyLevel>,
    ) -> Self {
        self.urgency_before = before;
        self.urgency_after = after;
        self
    }
}

/// 审计记录接收方
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// 记录一条审计条目
    async fn record(&self, entry: AuditEntry);
}

/// 丢弃所有审计条目
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, entry: AuditEntry) {
        tracing::trace!("Discarding audit entry {} ({})", entry.id, entry.action);
    }
}

/// 将审计条目分发给多个接收方
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn record(&self, entry: AuditEntry) {
        for sink in &self.sinks {
            sink.record(entry.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StaffRole;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<AuditEntry>>);

    #[async_trait]
    impl AuditSink for Recording {
        async fn record(&self, entry: AuditEntry) {
            self.0.lock().unwrap().push(entry);
        }
    }

    #[test]
    fn test_entry_builder() {
        let actor = Actor::new("N001", "Nurse Anula", StaffRole::Nurse);
        let entry = AuditEntry::new(&actor, AuditAction::VitalsCapture, "Updated vitals")
            .with_patient("P0001")
            .with_urgency(None, Some(UrgencyLevel::Critical));

        assert_eq!(entry.actor_id, "N001");
        assert_eq!(entry.patient_id.as_deref(), Some("P0001"));
        assert_eq!(entry.urgency_after, Some(UrgencyLevel::Critical));
        assert!(entry.ward_id.is_none());
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_every_sink() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let fanout = FanoutAuditSink::new()
            .with(first.clone())
            .with(second.clone());
        assert_eq!(fanout.len(), 2);

        let actor = Actor::new("D001", "Dr. Perera", StaffRole::Doctor);
        fanout
            .record(AuditEntry::new(&actor, AuditAction::Discharge, "Discharged P0001"))
            .await;

        assert_eq!(first.0.lock().unwrap().len(), 1);
        assert_eq!(second.0.lock().unwrap().len(), 1);
    }
}
