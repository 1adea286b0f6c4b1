//! 班次回放
//!
//! 按脚本依次执行挂号、体征采集、会诊、入院和出院操作

use anyhow::{Context, Result};
use clinq_admin::{AuditFilter, AuditTrail, ClinqConfig, FlowMetrics};
use clinq_core::utils::is_valid_patient_id;
use clinq_core::{
    Actor, AuditEntry, ClinqError, Demographics, DischargeSummary, FanoutAuditSink, Patient,
    TreatmentPlan,
};
use clinq_store::InMemoryStore;
use clinq_workflow::{FlowOverview, PatientFlowEngine, RawVitals};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// 回放脚本中的一步操作
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Register {
        actor: Actor,
        demographics: Demographics,
    },
    Vitals {
        actor: Actor,
        patient: String,
        vitals: RawVitals,
    },
    Notes {
        actor: Actor,
        patient: String,
        notes: String,
    },
    Plan {
        actor: Actor,
        patient: String,
        plan: TreatmentPlan,
    },
    Admit {
        actor: Actor,
        patient: String,
        ward: String,
        bed: String,
    },
    Discharge {
        actor: Actor,
        patient: String,
        summary: DischargeSummary,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Register { .. } => "register",
            Step::Vitals { .. } => "vitals",
            Step::Notes { .. } => "notes",
            Step::Plan { .. } => "plan",
            Step::Admit { .. } => "admit",
            Step::Discharge { .. } => "discharge",
        }
    }

    fn patient(&self) -> Option<&str> {
        match self {
            Step::Register { .. } => None,
            Step::Vitals { patient, .. }
            | Step::Notes { patient, .. }
            | Step::Plan { patient, .. }
            | Step::Admit { patient, .. }
            | Step::Discharge { patient, .. } => Some(patient.as_str()),
        }
    }
}

/// 单步执行结果
#[derive(Debug)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub result: std::result::Result<Patient, ClinqError>,
}

/// 回放报告
pub struct ReplayReport {
    pub outcomes: Vec<StepOutcome>,
    pub queue: Vec<Patient>,
    pub overview: FlowOverview,
    pub audit: Vec<AuditEntry>,
    pub metrics: FlowMetrics,
}

impl ReplayReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// 读取回放脚本（JSON数组）
pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay script {}", path.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse replay script {}", path.display()))?;

    for (index, step) in steps.iter().enumerate() {
        if let Some(patient) = step.patient() {
            if !is_valid_patient_id(patient) {
                anyhow::bail!(
                    "Step {} ({}) references malformed patient id '{}'",
                    index + 1,
                    step.name(),
                    patient
                );
            }
        }
    }

    Ok(steps)
}

/// 以配置中的病区执行回放
pub async fn run(config: &ClinqConfig, steps: Vec<Step>, stop_on_error: bool) -> Result<ReplayReport> {
    let store = Arc::new(InMemoryStore::with_wards(config.ward_seed()));
    let trail = Arc::new(AuditTrail::new());
    let metrics = FlowMetrics::new()?;
    let audit = FanoutAuditSink::new()
        .with(trail.clone())
        .with(Arc::new(metrics.clone()));

    let engine = PatientFlowEngine::new(store, Arc::new(audit))
        .with_limits(config.validation.limits())
        .with_max_commit_retries(config.store.max_commit_retries);

    info!(
        "Replaying {} steps for {} with {} wards",
        steps.len(),
        config.hospital.name,
        config.wards.len()
    );

    let mut outcomes = Vec::with_capacity(steps.len());
    for (index, step) in steps.into_iter().enumerate() {
        let action = step.name();
        let result = apply(&engine, step).await;

        if let Err(e) = &result {
            error!("Step {} ({}) failed: {}", index + 1, action, e);
        }
        let failed = result.is_err();
        outcomes.push(StepOutcome {
            index: index + 1,
            action,
            result,
        });
        if failed && stop_on_error {
            break;
        }
    }

    let overview = engine.overview().await;
    metrics.record_overview(&overview);

    Ok(ReplayReport {
        outcomes,
        queue: engine.priority_queue().await,
        overview,
        audit: trail.query(&AuditFilter::default()).await?,
        metrics,
    })
}

async fn apply(engine: &PatientFlowEngine, step: Step) -> clinq_core::Result<Patient> {
    match step {
        Step::Register { actor, demographics } => engine.register(&actor, demographics).await,
        Step::Vitals {
            actor,
            patient,
            vitals,
        } => engine.submit_vitals(&actor, &patient, &vitals).await,
        Step::Notes {
            actor,
            patient,
            notes,
        } => engine.add_notes(&actor, &patient, &notes).await,
        Step::Plan {
            actor,
            patient,
            plan,
        } => engine.update_treatment_plan(&actor, &patient, plan).await,
        Step::Admit {
            actor,
            patient,
            ward,
            bed,
        } => engine.admit(&actor, &patient, &ward, &bed).await,
        Step::Discharge {
            actor,
            patient,
            summary,
        } => engine.discharge(&actor, &patient, summary).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinq_admin::WardConfig;
    use clinq_core::{AuditAction, PatientStatus, UrgencyLevel};
    use std::io::Write;

    const SCRIPT: &str = r#"[
        {"action": "register",
         "actor": {"id": "N001", "name": "Nurse Anula", "role": "NURSE"},
         "demographics": {"national_id": "197512345678", "name": "Kamal Silva",
                          "date_of_birth": "1975-06-01", "gender": "MALE",
                          "contact": "0771234567", "address": "Kandy",
                          "symptoms": ["shortness of breath"]}},
        {"action": "register",
         "actor": {"id": "N001", "name": "Nurse Anula", "role": "NURSE"},
         "demographics": {"national_id": "198811112222", "name": "Nimali Perera",
                          "date_of_birth": "1988-02-11", "gender": "FEMALE",
                          "contact": "", "address": ""}},
        {"action": "vitals",
         "actor": {"id": "N001", "name": "Nurse Anula", "role": "NURSE"},
         "patient": "P0001",
         "vitals": {"temperature": 37, "pulse": 80, "systolic": 120,
                    "diastolic": 80, "respiratory_rate": 16, "spo2": 85}},
        {"action": "vitals",
         "actor": {"id": "N001", "name": "Nurse Anula", "role": "NURSE"},
         "patient": "P0002",
         "vitals": {"temperature": "38.9", "pulse": "96", "systolic": "130",
                    "diastolic": "85", "respiratory_rate": "18", "spo2": "97"}},
        {"action": "admit",
         "actor": {"id": "D001", "name": "Dr. Perera", "role": "DOCTOR"},
         "patient": "P0001", "ward": "W1", "bed": "B-3"},
        {"action": "discharge",
         "actor": {"id": "D001", "name": "Dr. Perera", "role": "DOCTOR"},
         "patient": "P0002",
         "summary": {"diagnosis": "Viral fever", "follow_up_date": null}}
    ]"#;

    fn config() -> ClinqConfig {
        ClinqConfig {
            wards: vec![WardConfig {
                id: "W1".to_string(),
                name: "Medical Ward".to_string(),
                ward_type: "GENERAL".to_string(),
                capacity: 5,
                occupied: 2,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_load_script() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();

        let steps = load_script(file.path()).unwrap();
        assert_eq!(steps.len(), 6);
        assert!(matches!(&steps[2], Step::Vitals { vitals, .. } if vitals.spo2 == "85"));
    }

    #[test]
    fn test_load_script_rejects_malformed_patient_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.replace("\"P0002\"", "\"patient-2\"").as_bytes())
            .unwrap();

        let err = load_script(file.path()).unwrap_err();
        assert!(err.to_string().contains("patient-2"));
    }

    #[tokio::test]
    async fn test_replay_shift() {
        let steps: Vec<Step> = serde_json::from_str(SCRIPT).unwrap();
        let report = run(&config(), steps, false).await.unwrap();

        // 最后一步：候诊患者不能直接出院
        assert_eq!(report.failures(), 1);
        let last = report.outcomes.last().unwrap();
        assert_eq!(last.action, "discharge");
        assert!(last.result.as_ref().unwrap_err().is_state_transition());

        assert_eq!(report.queue.len(), 1);
        assert_eq!(report.queue[0].id, "P0002");
        assert_eq!(report.queue[0].urgency(), Some(UrgencyLevel::Urgent));

        assert_eq!(report.overview.count(PatientStatus::Admitted), 1);
        assert_eq!(report.overview.occupied_beds, 3);

        assert_eq!(report.audit.len(), 5);
        assert_eq!(report.audit[0].action, AuditAction::WardAdmission);
        assert_eq!(report.metrics.action_count(AuditAction::VitalsCapture), 2);
    }

    #[tokio::test]
    async fn test_demo_shift() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos");
        let manager = clinq_admin::ConfigManager::load(Some(&demos.join("clinq.toml"))).unwrap();
        let config = manager.get_config().await;
        let steps = load_script(&demos.join("shift.json")).unwrap();

        let report = run(&config, steps, false).await.unwrap();

        // 非法脉搏、ICU满员、候诊患者出院
        assert_eq!(report.failures(), 3);
        assert!(report.outcomes[5].result.as_ref().unwrap_err().is_validation());
        assert_eq!(report.queue.len(), 2);
        assert_eq!(report.queue[0].id, "P0002");
        assert_eq!(report.overview.count(PatientStatus::Discharged), 1);
        assert_eq!(report.overview.occupied_beds, 4);
    }

    #[tokio::test]
    async fn test_stop_on_error() {
        let mut steps: Vec<Step> = serde_json::from_str(SCRIPT).unwrap();
        steps.insert(
            0,
            Step::Notes {
                actor: Actor::new("D001", "Dr. Perera", clinq_core::StaffRole::Doctor),
                patient: "P0404".to_string(),
                notes: "missing".to_string(),
            },
        );

        let report = run(&config(), steps, true).await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].result.as_ref().unwrap_err().is_not_found());
        assert_eq!(report.overview.total_patients, 0);
    }
}
