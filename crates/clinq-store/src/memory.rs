//! 内存仓储实现

use crate::store::{ChangeSet, CommitReceipt, FlowStore, PendingWrite, StoreSnapshot};
use async_trait::async_trait;
use clinq_core::{ClinqError, Patient, Result, Ward};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct StoreState {
    patients: HashMap<String, Patient>,
    wards: BTreeMap<String, Ward>,
}

/// 内存仓储
///
/// 单个写锁内完成版本校验与写入，病区容量检查与占用递增因此不会交错。
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    arrivals: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定病区初始化
    pub fn with_wards(wards: impl IntoIterator<Item = Ward>) -> Self {
        let wards = wards
            .into_iter()
            .map(|ward| (ward.id.clone(), ward))
            .collect();

        Self {
            state: RwLock::new(StoreState {
                patients: HashMap::new(),
                wards,
            }),
            arrivals: AtomicU64::new(0),
        }
    }

    pub async fn patient_count(&self) -> usize {
        self.state.read().await.patients.len()
    }

    fn check_version<T>(
        kind: &str,
        id: &str,
        current: Option<u64>,
        write: &PendingWrite<T>,
    ) -> Result<()> {
        match (write.expected_version, current) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(ClinqError::Conflict(format!("{} {} already exists", kind, id))),
            (Some(_), None) => Err(ClinqError::NotFound(format!("{} {} not found", kind, id))),
            (Some(expected), Some(actual)) if expected == actual => Ok(()),
            (Some(expected), Some(actual)) => Err(ClinqError::Conflict(format!(
                "{} {} changed concurrently (expected version {}, found {})",
                kind, id, expected, actual
            ))),
        }
    }

    fn next_version(expected: Option<u64>) -> u64 {
        expected.map_or(0, |v| v + 1)
    }
}

#[async_trait]
impl FlowStore for InMemoryStore {
    async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;

        let mut patients: Vec<Patient> = state.patients.values().cloned().collect();
        patients.sort_by_key(|p| p.arrival_seq);

        StoreSnapshot {
            patients,
            wards: state.wards.values().cloned().collect(),
        }
    }

    async fn patient(&self, id: &str) -> Result<Patient> {
        self.state
            .read()
            .await
            .patients
            .get(id)
            .cloned()
            .ok_or_else(|| ClinqError::NotFound(format!("Patient {} not found", id)))
    }

    async fn ward(&self, id: &str) -> Result<Ward> {
        self.state
            .read()
            .await
            .wards
            .get(id)
            .cloned()
            .ok_or_else(|| ClinqError::NotFound(format!("Ward {} not found", id)))
    }

    async fn next_arrival(&self) -> u64 {
        self.arrivals.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt> {
        let mut state = self.state.write().await;

        // 先校验全部版本，任何一项失败都不写入
        for write in &changes.patients {
            let id = &write.record.id;
            let current = state.patients.get(id).map(|p| p.version);
            if let Err(e) = Self::check_version("Patient", id, current, write) {
                warn!("Rejected commit: {}", e);
                return Err(e);
            }
        }
        for write in &changes.wards {
            let id = &write.record.id;
            let current = state.wards.get(id).map(|w| w.version);
            if let Err(e) = Self::check_version("Ward", id, current, write) {
                warn!("Rejected commit: {}", e);
                return Err(e);
            }
        }

        let mut receipt = CommitReceipt::default();

        for write in changes.patients {
            let mut patient = write.record;
            patient.version = Self::next_version(write.expected_version);
            state.patients.insert(patient.id.clone(), patient.clone());
            receipt.patients.push(patient);
        }
        for write in changes.wards {
            let mut ward = write.record;
            ward.version = Self::next_version(write.expected_version);
            state.wards.insert(ward.id.clone(), ward.clone());
            receipt.wards.push(ward);
        }

        debug!(
            "Committed {} patient and {} ward records",
            receipt.patients.len(),
            receipt.wards.len()
        );
        Ok(receipt)
    }
}
