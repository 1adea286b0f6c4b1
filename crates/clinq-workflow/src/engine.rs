//! 患者流转引擎
//!
//! 协调生命体征校验、分诊、状态机、候诊队列和危急告警的核心引擎。
//! 每次变更都从仓储读取最新记录，在内存中应用转换后按期望版本原子提交；
//! 版本冲突时从新的读取重试。

use crate::{
    critical_alert::CriticalAlertProcessor,
    state_machine::{FlowEvent, FlowStateMachine},
    triage::{TriageAssessment, TriageClassifier},
    validator::{
        normalize_demographics, validate_bed_label, validate_discharge_summary,
        validate_treatment_plan, RawVitals, ValidationLimits, VitalsValidator,
    },
    worklist::{self, QueueFilter, QueueStats},
};
use chrono::Utc;
use clinq_core::{
    utils::{format_patient_id, is_blank},
    Actor, AuditAction, AuditEntry, AuditSink, BedAssignment, ClinqError, ConsultationNote,
    Demographics, DischargeSummary, Patient, PatientStatus, Result, TransitionGuard,
    TreatmentPlan, UrgencyLevel, Vitals, VitalsRecord, Ward,
};
use clinq_store::{ChangeSet, CommitReceipt, FlowStore, StoreSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 默认的乐观提交重试次数
pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 8;

/// 患者流转总览（仪表盘）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowOverview {
    pub total_patients: usize,
    pub by_status: HashMap<PatientStatus, usize>,
    pub queue_length: usize,
    pub critical_waiting: usize,
    /// 所有已分诊患者的当前等级分布
    pub triage_distribution: HashMap<UrgencyLevel, usize>,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub occupancy_rate: f64,
    pub wards: Vec<Ward>,
}

impl FlowOverview {
    /// 从一致快照计算总览
    pub fn from_snapshot(snapshot: &StoreSnapshot) -> Self {
        let mut by_status = HashMap::new();
        let mut triage_distribution = HashMap::new();
        let mut queue_length = 0;
        let mut critical_waiting = 0;

        for patient in &snapshot.patients {
            *by_status.entry(patient.status).or_insert(0) += 1;

            if let Some(level) = patient.urgency() {
                *triage_distribution.entry(level).or_insert(0) += 1;
            }

            if patient.status == PatientStatus::AwaitingConsultation {
                queue_length += 1;
                if patient.urgency() == Some(UrgencyLevel::Critical) {
                    critical_waiting += 1;
                }
            }
        }

        let total_beds: u32 = snapshot.wards.iter().map(|w| w.capacity).sum();
        let occupied_beds: u32 = snapshot.wards.iter().map(|w| w.occupied).sum();
        let occupancy_rate = if total_beds == 0 {
            0.0
        } else {
            f64::from(occupied_beds) / f64::from(total_beds)
        };

        Self {
            total_patients: snapshot.patients.len(),
            by_status,
            queue_length,
            critical_waiting,
            triage_distribution,
            total_beds,
            occupied_beds,
            occupancy_rate,
            wards: snapshot.wards.clone(),
        }
    }

    pub fn count(&self, status: PatientStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// 患者流转引擎
///
/// 所有方法只需 `&self`，可通过 `Arc` 在多个任务间共享。
pub struct PatientFlowEngine {
    store: Arc<dyn FlowStore>,
    audit: Arc<dyn AuditSink>,
    validator: VitalsValidator,
    classifier: TriageClassifier,
    state_machine: FlowStateMachine,
    alerts: CriticalAlertProcessor,
    max_commit_retries: u32,
}

impl PatientFlowEngine {
    /// 创建新的流转引擎
    pub fn new(store: Arc<dyn FlowStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            validator: VitalsValidator::default(),
            classifier: TriageClassifier::new(),
            state_machine: FlowStateMachine::new(),
            alerts: CriticalAlertProcessor::new(),
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
        }
    }

    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.validator = VitalsValidator::new(limits);
        self
    }

    pub fn with_max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries.max(1);
        self
    }

    /// 患者挂号
    pub async fn register(&self, actor: &Actor, demographics: Demographics) -> Result<Patient> {
        let demographics = normalize_demographics(demographics, Utc::now().date_naive())?;

        let arrival_seq = self.store.next_arrival().await;
        let now = Utc::now();
        let patient = Patient {
            id: format_patient_id(arrival_seq),
            arrival_seq,
            demographics,
            status: PatientStatus::AwaitingTriage,
            vitals_history: Vec::new(),
            consultation_notes: Vec::new(),
            treatment_plan: None,
            bed: None,
            discharge_summary: None,
            discharged_at: None,
            registered_at: now,
            updated_at: now,
            version: 0,
        };
        let patient_id = patient.id.clone();

        let receipt = self
            .store
            .commit(ChangeSet::new().insert_patient(patient))
            .await?;
        let patient = committed_patient(&receipt, &patient_id)?;

        info!("Registered patient {} ({})", patient.id, patient.name());
        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditAction::PatientRegistration,
                    format!("Registered patient {} ({})", patient.name(), patient.id),
                )
                .with_patient(&patient.id),
            )
            .await;

        Ok(patient)
    }

    /// 提交生命体征
    ///
    /// 校验失败时不做任何修改；成功时追加历史并重算分诊等级。
    pub async fn submit_vitals(
        &self,
        actor: &Actor,
        patient_id: &str,
        raw: &RawVitals,
    ) -> Result<Patient> {
        let vitals = self.validator.validate(raw)?;
        let assessment = self.classifier.assess(&vitals);
        let level = assessment.level;

        let (patient, previous) = self
            .with_retries("submit vitals", move || {
                self.try_submit_vitals(actor, patient_id, vitals, level)
            })
            .await?;

        info!(
            "Vitals recorded for patient {}: {} -> {}",
            patient.id,
            previous.map_or("untriaged", UrgencyLevel::as_str),
            level
        );
        if level == UrgencyLevel::Critical {
            warn!("Patient {} classified CRITICAL: {}", patient.id, assessment.describe());
        }

        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditAction::VitalsCapture,
                    format!("Updated vitals for patient {} - {}", patient.id, level),
                )
                .with_patient(&patient.id)
                .with_urgency(previous, Some(level)),
            )
            .await;

        if level == UrgencyLevel::Critical && previous != Some(UrgencyLevel::Critical) {
            let findings = assessment.findings.iter().map(|c| c.to_string()).collect();
            self.alerts.raise(&patient, vitals, findings, actor).await;
        }

        Ok(patient)
    }

    async fn try_submit_vitals(
        &self,
        actor: &Actor,
        patient_id: &str,
        vitals: Vitals,
        level: UrgencyLevel,
    ) -> Result<(Patient, Option<UrgencyLevel>)> {
        let mut patient = self.store.patient(patient_id).await?;
        let next = self.guarded(&patient, FlowEvent::VitalsSubmitted)?;
        let previous = patient.urgency();
        let expected = patient.version;
        let now = Utc::now();

        patient.vitals_history.push(VitalsRecord {
            vitals,
            urgency: level,
            recorded_at: now,
            recorded_by: actor.id.clone(),
        });
        patient.status = next;
        patient.updated_at = now;

        let receipt = self
            .store
            .commit(ChangeSet::new().update_patient(expected, patient))
            .await?;
        Ok((committed_patient(&receipt, patient_id)?, previous))
    }

    /// 添加会诊记录
    pub async fn add_notes(&self, actor: &Actor, patient_id: &str, notes: &str) -> Result<Patient> {
        if is_blank(notes) {
            return Err(ClinqError::validation("notes", "is required"));
        }
        let notes = notes.trim();

        let patient = self
            .with_retries("add notes", move || self.try_add_notes(actor, patient_id, notes))
            .await?;

        info!("Consultation notes added for patient {}", patient.id);
        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditAction::ConsultationNotes,
                    format!("Added consultation notes for patient {}", patient.id),
                )
                .with_patient(&patient.id),
            )
            .await;

        Ok(patient)
    }

    async fn try_add_notes(&self, actor: &Actor, patient_id: &str, notes: &str) -> Result<Patient> {
        let mut patient = self.store.patient(patient_id).await?;
        self.state_machine.ensure_active(patient.status)?;
        let expected = patient.version;
        let now = Utc::now();

        patient.consultation_notes.push(ConsultationNote {
            text: notes.to_string(),
            written_at: now,
            written_by: actor.id.clone(),
        });
        patient.updated_at = now;

        let receipt = self
            .store
            .commit(ChangeSet::new().update_patient(expected, patient))
            .await?;
        committed_patient(&receipt, patient_id)
    }

    /// 更新治疗方案（整体替换）
    pub async fn update_treatment_plan(
        &self,
        actor: &Actor,
        patient_id: &str,
        plan: TreatmentPlan,
    ) -> Result<Patient> {
        validate_treatment_plan(&plan)?;
        let plan = &plan;

        let patient = self
            .with_retries("update treatment plan", move || {
                self.try_update_treatment_plan(patient_id, plan)
            })
            .await?;

        info!("Treatment plan updated for patient {}", patient.id);
        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditAction::TreatmentPlan,
                    format!("Updated treatment plan for patient {}", patient.id),
                )
                .with_patient(&patient.id),
            )
            .await;

        Ok(patient)
    }

    async fn try_update_treatment_plan(
        &self,
        patient_id: &str,
        plan: &TreatmentPlan,
    ) -> Result<Patient> {
        let mut patient = self.store.patient(patient_id).await?;
        self.state_machine.ensure_active(patient.status)?;
        let expected = patient.version;

        patient.treatment_plan = Some(plan.clone());
        patient.updated_at = Utc::now();

        let receipt = self
            .store
            .commit(ChangeSet::new().update_patient(expected, patient))
            .await?;
        committed_patient(&receipt, patient_id)
    }

    /// 收治入院
    ///
    /// 容量检查与占用递增在同一次提交中完成，并发收治不会超出容量。
    pub async fn admit(
        &self,
        actor: &Actor,
        patient_id: &str,
        ward_id: &str,
        bed_label: &str,
    ) -> Result<Patient> {
        validate_bed_label(bed_label)?;
        let bed_label = bed_label.trim();

        let (patient, ward) = self
            .with_retries("admit", move || {
                self.try_admit(patient_id, ward_id, bed_label)
            })
            .await?;

        info!(
            "Admitted patient {} to ward {}, bed {} ({}/{})",
            patient.id, ward.id, bed_label, ward.occupied, ward.capacity
        );
        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditAction::WardAdmission,
                    format!(
                        "Admitted patient {} to ward {}, bed {}",
                        patient.id, ward.id, bed_label
                    ),
                )
                .with_patient(&patient.id)
                .with_ward(&ward.id),
            )
            .await;

        Ok(patient)
    }

    async fn try_admit(
        &self,
        patient_id: &str,
        ward_id: &str,
        bed_label: &str,
    ) -> Result<(Patient, Ward)> {
        let snapshot = self.store.snapshot().await;

        let mut patient = snapshot
            .patient(patient_id)
            .cloned()
            .ok_or_else(|| ClinqError::NotFound(format!("Patient {} not found", patient_id)))?;
        let next = self.guarded(&patient, FlowEvent::Admit)?;

        let mut ward = snapshot
            .ward(ward_id)
            .cloned()
            .ok_or_else(|| ClinqError::NotFound(format!("Ward {} not found", ward_id)))?;

        if !ward.has_free_bed() {
            warn!(
                "Rejected admission of {}: ward {} at capacity ({}/{})",
                patient_id, ward.id, ward.occupied, ward.capacity
            );
            return Err(TransitionGuard::WardAtCapacity {
                ward_id: ward.id.clone(),
                capacity: ward.capacity,
            }
            .into());
        }

        let bed_taken = snapshot.patients_in(PatientStatus::Admitted).any(|other| {
            other
                .bed
                .as_ref()
                .map_or(false, |bed| bed.ward_id == ward.id && bed.bed_label == bed_label)
        });
        if bed_taken {
            warn!(
                "Rejected admission of {}: bed {} in ward {} occupied",
                patient_id, bed_label, ward.id
            );
            return Err(TransitionGuard::BedOccupied {
                ward_id: ward.id.clone(),
                bed_label: bed_label.to_string(),
            }
            .into());
        }

        let patient_version = patient.version;
        let ward_version = ward.version;
        let now = Utc::now();

        patient.status = next;
        patient.bed = Some(BedAssignment {
            ward_id: ward.id.clone(),
            bed_label: bed_label.to_string(),
            admitted_at: now,
        });
        patient.updated_at = now;
        ward.occupied += 1;

        let receipt = self
            .store
            .commit(
                ChangeSet::new()
                    .update_patient(patient_version, patient)
                    .update_ward(ward_version, ward),
            )
            .await?;

        Ok((
            committed_patient(&receipt, patient_id)?,
            committed_ward(&receipt, ward_id)?,
        ))
    }

    /// 办理出院
    pub async fn discharge(
        &self,
        actor: &Actor,
        patient_id: &str,
        summary: DischargeSummary,
    ) -> Result<Patient> {
        validate_discharge_summary(&summary)?;
        let summary = &summary;

        let (patient, ward) = self
            .with_retries("discharge", move || self.try_discharge(patient_id, summary))
            .await?;

        info!(
            "Discharged patient {} from ward {} ({}/{})",
            patient.id, ward.id, ward.occupied, ward.capacity
        );
        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditAction::Discharge,
                    format!("Discharged patient {} from ward {}", patient.id, ward.id),
                )
                .with_patient(&patient.id)
                .with_ward(&ward.id),
            )
            .await;

        Ok(patient)
    }

    async fn try_discharge(
        &self,
        patient_id: &str,
        summary: &DischargeSummary,
    ) -> Result<(Patient, Ward)> {
        let snapshot = self.store.snapshot().await;

        let mut patient = snapshot
            .patient(patient_id)
            .cloned()
            .ok_or_else(|| ClinqError::NotFound(format!("Patient {} not found", patient_id)))?;
        let next = self.guarded(&patient, FlowEvent::Discharge)?;

        let ward_id = patient
            .ward_id()
            .map(str::to_string)
            .ok_or_else(|| {
                ClinqError::Internal(format!("Admitted patient {} has no bed", patient_id))
            })?;
        let mut ward = snapshot
            .ward(&ward_id)
            .cloned()
            .ok_or_else(|| ClinqError::NotFound(format!("Ward {} not found", ward_id)))?;

        let patient_version = patient.version;
        let ward_version = ward.version;
        let now = Utc::now();

        ward.occupied = ward.occupied.checked_sub(1).ok_or_else(|| {
            ClinqError::Internal(format!(
                "Ward {} occupancy would drop below zero",
                ward.id
            ))
        })?;
        patient.status = next;
        patient.discharge_summary = Some(summary.clone());
        patient.discharged_at = Some(now);
        patient.updated_at = now;

        let receipt = self
            .store
            .commit(
                ChangeSet::new()
                    .update_patient(patient_version, patient)
                    .update_ward(ward_version, ward),
            )
            .await?;

        Ok((
            committed_patient(&receipt, patient_id)?,
            committed_ward(&receipt, &ward_id)?,
        ))
    }

    /// 校验原始生命体征
    pub fn validate_vitals(&self, raw: &RawVitals) -> Result<Vitals> {
        self.validator.validate(raw)
    }

    /// 分诊评估
    pub fn classify(&self, vitals: &Vitals) -> TriageAssessment {
        self.classifier.assess(vitals)
    }

    pub async fn patient(&self, patient_id: &str) -> Result<Patient> {
        self.store.patient(patient_id).await
    }

    pub async fn ward(&self, ward_id: &str) -> Result<Ward> {
        self.store.ward(ward_id).await
    }

    /// 当前候诊队列
    pub async fn priority_queue(&self) -> Vec<Patient> {
        let snapshot = self.store.snapshot().await;
        worklist::order_queue(&snapshot.patients)
    }

    pub async fn query_queue(&self, filter: &QueueFilter) -> Vec<Patient> {
        let snapshot = self.store.snapshot().await;
        worklist::query_queue(&snapshot.patients, filter)
    }

    pub async fn queue_stats(&self) -> QueueStats {
        let snapshot = self.store.snapshot().await;
        worklist::queue_stats(&snapshot.patients, Utc::now())
    }

    /// 获取流转总览
    pub async fn overview(&self) -> FlowOverview {
        let snapshot = self.store.snapshot().await;
        FlowOverview::from_snapshot(&snapshot)
    }

    /// 获取危急告警处理器
    pub fn alerts(&self) -> &CriticalAlertProcessor {
        &self.alerts
    }

    pub fn state_machine(&self) -> &FlowStateMachine {
        &self.state_machine
    }

    fn guarded(&self, patient: &Patient, event: FlowEvent) -> Result<PatientStatus> {
        self.state_machine
            .transition(patient.status, event)
            .map_err(|e| {
                warn!("Rejected {} for patient {}: {}", event, patient.id, e);
                e
            })
    }

    /// 版本冲突时重新执行整个读取-转换-提交过程
    async fn with_retries<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(ClinqError::Conflict(reason)) if tries < self.max_commit_retries => {
                    debug!(
                        "Retrying {} after conflict ({}/{}): {}",
                        operation, tries, self.max_commit_retries, reason
                    );
                    tokio::task::yield_now().await;
                }
                Err(ClinqError::Conflict(reason)) => {
                    warn!("Giving up on {} after {} conflicts: {}", operation, tries, reason);
                    return Err(ClinqError::Conflict(reason));
                }
                other => return other,
            }
        }
    }
}

fn committed_patient(receipt: &CommitReceipt, patient_id: &str) -> Result<Patient> {
    receipt
        .patient(patient_id)
        .cloned()
        .ok_or_else(|| ClinqError::Internal(format!("Commit receipt missing patient {}", patient_id)))
}

fn committed_ward(receipt: &CommitReceipt, ward_id: &str) -> Result<Ward> {
    receipt
        .ward(ward_id)
        .cloned()
        .ok_or_else(|| ClinqError::Internal(format!("Commit receipt missing ward {}", ward_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use clinq_core::{Gender, Medication, StaffRole};
    use clinq_store::InMemoryStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<AuditEntry>>);

    impl RecordingSink {
        fn entries(&self) -> Vec<AuditEntry> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, entry: AuditEntry) {
            self.0.lock().unwrap().push(entry);
        }
    }

    fn nurse() -> Actor {
        Actor::new("N001", "Nurse Anula", StaffRole::Nurse)
    }

    fn doctor() -> Actor {
        Actor::new("D001", "Dr. Perera", StaffRole::Doctor)
    }

    fn demographics(name: &str) -> Demographics {
        Demographics {
            national_id: format!("{}-NIC", name),
            name: name.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1970, 3, 15).unwrap(),
            gender: Gender::Female,
            contact: "0771234567".to_string(),
            address: "Colombo".to_string(),
            symptoms: vec!["chest pain".to_string()],
        }
    }

    fn raw(temperature: f64, pulse: u32, systolic: u32, spo2: u8) -> RawVitals {
        RawVitals::new(temperature, pulse, systolic, 80, 16, spo2)
    }

    fn summary() -> DischargeSummary {
        DischargeSummary {
            diagnosis: "Community acquired pneumonia".to_string(),
            follow_up_date: None,
            advice: "Rest".to_string(),
            prescriptions: vec!["Amoxicillin".to_string()],
        }
    }

    fn setup(wards: Vec<Ward>) -> (Arc<PatientFlowEngine>, Arc<InMemoryStore>, Arc<RecordingSink>) {
        let store = Arc::new(InMemoryStore::with_wards(wards));
        let sink = Arc::new(RecordingSink::default());
        let engine = PatientFlowEngine::new(store.clone(), sink.clone()).with_max_commit_retries(32);
        (Arc::new(engine), store, sink)
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let (engine, _, sink) = setup(vec![Ward::new("W", "General", "GENERAL", 5).with_occupied(2)]);

        let patient = engine.register(&nurse(), demographics("Nimali")).await.unwrap();
        assert_eq!(patient.id, "P0001");
        assert_eq!(patient.status, PatientStatus::AwaitingTriage);
        assert_eq!(patient.urgency(), None);

        let patient = engine
            .submit_vitals(&nurse(), &patient.id, &raw(37.0, 80, 120, 85))
            .await
            .unwrap();
        assert_eq!(patient.status, PatientStatus::AwaitingConsultation);
        assert_eq!(patient.urgency(), Some(UrgencyLevel::Critical));

        let patient = engine.admit(&doctor(), &patient.id, "W", "B-3").await.unwrap();
        assert_eq!(patient.status, PatientStatus::Admitted);
        let ward = engine.ward("W").await.unwrap();
        assert_eq!((ward.occupied, ward.capacity), (3, 5));

        let patient = engine.discharge(&doctor(), &patient.id, summary()).await.unwrap();
        assert_eq!(patient.status, PatientStatus::Discharged);
        assert!(patient.discharged_at.is_some());
        let ward = engine.ward("W").await.unwrap();
        assert_eq!((ward.occupied, ward.capacity), (2, 5));

        let actions: Vec<AuditAction> = sink.entries().iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::PatientRegistration,
                AuditAction::VitalsCapture,
                AuditAction::WardAdmission,
                AuditAction::Discharge,
            ]
        );
        let vitals_entry = &sink.entries()[1];
        assert_eq!(vitals_entry.urgency_before, None);
        assert_eq!(vitals_entry.urgency_after, Some(UrgencyLevel::Critical));
        assert_eq!(vitals_entry.detail, "Updated vitals for patient P0001 - CRITICAL");
        assert_eq!(sink.entries()[2].ward_id.as_deref(), Some("W"));
    }

    #[tokio::test]
    async fn test_discharge_requires_admission() {
        let (engine, store, sink) = setup(vec![Ward::new("W", "General", "GENERAL", 5)]);
        let patient = engine.register(&nurse(), demographics("Sunil")).await.unwrap();

        let err = engine
            .discharge(&doctor(), &patient.id, summary())
            .await
            .unwrap_err();
        assert!(err.is_state_transition());

        let stored = store.patient(&patient.id).await.unwrap();
        assert_eq!(stored.status, PatientStatus::AwaitingTriage);
        assert_eq!(sink.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_full_ward_rejects_admission() {
        let (engine, _, sink) = setup(vec![Ward::new("ICU", "Intensive Care", "ICU", 2).with_occupied(2)]);
        let patient = engine.register(&nurse(), demographics("Ruwan")).await.unwrap();
        engine
            .submit_vitals(&nurse(), &patient.id, &raw(38.8, 90, 120, 97))
            .await
            .unwrap();

        let err = engine.admit(&doctor(), &patient.id, "ICU", "ICU-1").await.unwrap_err();
        assert!(matches!(
            err.guard(),
            Some(TransitionGuard::WardAtCapacity { capacity: 2, .. })
        ));

        let ward = engine.ward("ICU").await.unwrap();
        assert_eq!(ward.occupied, 2);
        let patient = engine.patient(&patient.id).await.unwrap();
        assert_eq!(patient.status, PatientStatus::AwaitingConsultation);
        assert!(patient.bed.is_none());
        assert_eq!(sink.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_admission_requires_consultation_status() {
        let (engine, _, _) = setup(vec![Ward::new("W", "General", "GENERAL", 5)]);
        let patient = engine.register(&nurse(), demographics("Kasun")).await.unwrap();

        let err = engine.admit(&doctor(), &patient.id, "W", "B-1").await.unwrap_err();
        assert!(matches!(
            err.guard(),
            Some(TransitionGuard::InvalidStatus {
                current: PatientStatus::AwaitingTriage,
                ..
            })
        ));
        assert_eq!(engine.ward("W").await.unwrap().occupied, 0);
    }

    #[tokio::test]
    async fn test_bed_already_occupied() {
        let (engine, _, _) = setup(vec![Ward::new("W", "General", "GENERAL", 5)]);
        let first = engine.register(&nurse(), demographics("A")).await.unwrap();
        let second = engine.register(&nurse(), demographics("B")).await.unwrap();
        for id in [&first.id, &second.id] {
            engine.submit_vitals(&nurse(), id, &raw(37.0, 80, 120, 98)).await.unwrap();
        }

        engine.admit(&doctor(), &first.id, "W", "B-1").await.unwrap();
        let err = engine.admit(&doctor(), &second.id, "W", "B-1").await.unwrap_err();
        assert!(matches!(err.guard(), Some(TransitionGuard::BedOccupied { .. })));
        assert_eq!(engine.ward("W").await.unwrap().occupied, 1);

        // 出院后床位可再次分配
        engine.discharge(&doctor(), &first.id, summary()).await.unwrap();
        engine.admit(&doctor(), &second.id, "W", "B-1").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_capacity() {
        let (engine, _, _) = setup(vec![Ward::new("W", "General", "GENERAL", 3)]);

        let mut ids = Vec::new();
        for i in 0..8 {
            let patient = engine.register(&nurse(), demographics(&format!("Patient{}", i))).await.unwrap();
            engine
                .submit_vitals(&nurse(), &patient.id, &raw(37.0, 80, 120, 98))
                .await
                .unwrap();
            ids.push(patient.id);
        }

        let mut handles = Vec::new();
        for (i, id) in ids.into_iter().enumerate() {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.admit(&doctor(), &id, "W", &format!("B-{}", i)).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(
                    matches!(e.guard(), Some(TransitionGuard::WardAtCapacity { .. })),
                    "unexpected error: {}",
                    e
                ),
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(engine.ward("W").await.unwrap().occupied, 3);
        assert_eq!(engine.overview().await.count(PatientStatus::Admitted), 3);
    }

    #[tokio::test]
    async fn test_invalid_vitals_change_nothing() {
        let (engine, store, sink) = setup(Vec::new());
        let patient = engine.register(&nurse(), demographics("Dilani")).await.unwrap();

        let bad = RawVitals::new("37.0", "80", "120", "80", "16", "101");
        let err = engine.submit_vitals(&nurse(), &patient.id, &bad).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("spo2"));

        let stored = store.patient(&patient.id).await.unwrap();
        assert_eq!(stored.status, PatientStatus::AwaitingTriage);
        assert!(stored.vitals_history.is_empty());
        assert_eq!(sink.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_history_keeps_previous_urgency() {
        let (engine, _, sink) = setup(Vec::new());
        let patient = engine.register(&nurse(), demographics("Chamari")).await.unwrap();

        engine
            .submit_vitals(&nurse(), &patient.id, &raw(38.8, 90, 120, 97))
            .await
            .unwrap();
        let patient = engine
            .submit_vitals(&nurse(), &patient.id, &raw(37.0, 80, 120, 98))
            .await
            .unwrap();

        assert_eq!(patient.vitals_history.len(), 2);
        assert_eq!(patient.vitals_history[0].urgency, UrgencyLevel::Urgent);
        assert_eq!(patient.urgency(), Some(UrgencyLevel::NonUrgent));

        let last = sink.entries().pop().unwrap();
        assert_eq!(last.urgency_before, Some(UrgencyLevel::Urgent));
        assert_eq!(last.urgency_after, Some(UrgencyLevel::NonUrgent));
    }

    #[tokio::test]
    async fn test_critical_alert_raised_on_escalation_only() {
        let (engine, _, _) = setup(Vec::new());
        let mut alerts = engine.alerts().subscribe();
        let patient = engine.register(&nurse(), demographics("Pradeep")).await.unwrap();

        engine
            .submit_vitals(&nurse(), &patient.id, &raw(37.0, 135, 120, 98))
            .await
            .unwrap();
        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.patient_id, patient.id);
        assert_eq!(alert.findings, vec!["pulse > 130".to_string()]);

        // 仍为危急，不重复告警
        engine
            .submit_vitals(&nurse(), &patient.id, &raw(37.0, 80, 120, 85))
            .await
            .unwrap();
        assert_eq!(engine.alerts().alerts_for(&patient.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_notes_and_plan() {
        let (engine, _, sink) = setup(vec![Ward::new("W", "General", "GENERAL", 5)]);
        let patient = engine.register(&nurse(), demographics("Lakmal")).await.unwrap();
        engine
            .submit_vitals(&nurse(), &patient.id, &raw(37.0, 80, 120, 98))
            .await
            .unwrap();

        let patient = engine
            .add_notes(&doctor(), &patient.id, "  Mild dehydration  ")
            .await
            .unwrap();
        assert_eq!(patient.latest_note(), Some("Mild dehydration"));
        assert_eq!(patient.status, PatientStatus::AwaitingConsultation);

        let plan = TreatmentPlan {
            medications: vec![Medication {
                name: "ORS".to_string(),
                dosage: "1 sachet".to_string(),
                frequency: "TDS".to_string(),
            }],
            procedures: Vec::new(),
            instructions: "Oral fluids".to_string(),
        };
        let patient = engine
            .update_treatment_plan(&doctor(), &patient.id, plan.clone())
            .await
            .unwrap();
        assert_eq!(patient.treatment_plan, Some(plan.clone()));

        let err = engine.add_notes(&doctor(), &patient.id, "   ").await.unwrap_err();
        assert!(err.is_validation());

        engine.admit(&doctor(), &patient.id, "W", "B-1").await.unwrap();
        engine.discharge(&doctor(), &patient.id, summary()).await.unwrap();

        let err = engine
            .add_notes(&doctor(), &patient.id, "Follow-up call")
            .await
            .unwrap_err();
        assert_eq!(err.guard(), Some(&TransitionGuard::AlreadyDischarged));
        let err = engine
            .update_treatment_plan(&doctor(), &patient.id, plan)
            .await
            .unwrap_err();
        assert!(err.is_state_transition());

        assert_eq!(sink.entries().len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let (engine, _, sink) = setup(vec![Ward::new("W", "General", "GENERAL", 5)]);

        let err = engine
            .submit_vitals(&nurse(), "P9999", &raw(37.0, 80, 120, 98))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let patient = engine.register(&nurse(), demographics("Tharindu")).await.unwrap();
        engine
            .submit_vitals(&nurse(), &patient.id, &raw(37.0, 80, 120, 98))
            .await
            .unwrap();
        let err = engine.admit(&doctor(), &patient.id, "NOPE", "B-1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(sink.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_registration_requires_name() {
        let (engine, store, _) = setup(Vec::new());
        let mut input = demographics("x");
        input.name = "  ".to_string();

        let err = engine.register(&nurse(), input).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.patient_count().await, 0);
    }

    #[tokio::test]
    async fn test_queue_and_overview() {
        let (engine, _, _) = setup(vec![Ward::new("W", "General", "GENERAL", 4).with_occupied(1)]);
        let a = engine.register(&nurse(), demographics("A")).await.unwrap();
        let b = engine.register(&nurse(), demographics("B")).await.unwrap();
        let c = engine.register(&nurse(), demographics("C")).await.unwrap();
        let _untriaged = engine.register(&nurse(), demographics("D")).await.unwrap();

        engine.submit_vitals(&nurse(), &a.id, &raw(38.8, 80, 120, 98)).await.unwrap();
        engine.submit_vitals(&nurse(), &b.id, &raw(37.0, 80, 120, 85)).await.unwrap();
        engine.submit_vitals(&nurse(), &c.id, &raw(38.8, 80, 120, 98)).await.unwrap();

        let queue: Vec<String> = engine.priority_queue().await.into_iter().map(|p| p.id).collect();
        assert_eq!(queue, vec![b.id.clone(), a.id.clone(), c.id.clone()]);

        let stats = engine.queue_stats().await;
        assert_eq!(stats.total, 3);

        let overview = engine.overview().await;
        assert_eq!(overview.total_patients, 4);
        assert_eq!(overview.count(PatientStatus::AwaitingTriage), 1);
        assert_eq!(overview.critical_waiting, 1);
        assert_eq!(overview.triage_distribution.get(&UrgencyLevel::Urgent), Some(&2));
        assert_eq!((overview.total_beds, overview.occupied_beds), (4, 1));
        assert!((overview.occupancy_rate - 0.25).abs() < f64::EPSILON);
    }
}
