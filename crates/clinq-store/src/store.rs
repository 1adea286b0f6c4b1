//! 仓储接口

use async_trait::async_trait;
use clinq_core::{Patient, PatientStatus, Result, Ward};
use serde::{Deserialize, Serialize};

/// 一次一致性读取得到的全部患者与病区
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// 按挂号顺序排列
    pub patients: Vec<Patient>,
    /// 按病区ID排列
    pub wards: Vec<Ward>,
}

impl StoreSnapshot {
    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn ward(&self, id: &str) -> Option<&Ward> {
        self.wards.iter().find(|w| w.id == id)
    }

    pub fn patients_in(&self, status: PatientStatus) -> impl Iterator<Item = &Patient> {
        self.patients.iter().filter(move |p| p.status == status)
    }
}

/// 待写入的记录及其期望版本；`expected_version` 为 `None` 表示新增
#[derive(Debug, Clone)]
pub struct PendingWrite<T> {
    pub expected_version: Option<u64>,
    pub record: T,
}

/// 原子提交的变更集
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub patients: Vec<PendingWrite<Patient>>,
    pub wards: Vec<PendingWrite<Ward>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增患者，要求ID尚不存在
    pub fn insert_patient(mut self, patient: Patient) -> Self {
        self.patients.push(PendingWrite {
            expected_version: None,
            record: patient,
        });
        self
    }

    /// 更新患者，要求存储中的版本仍为 `expected_version`
    pub fn update_patient(mut self, expected_version: u64, patient: Patient) -> Self {
        self.patients.push(PendingWrite {
            expected_version: Some(expected_version),
            record: patient,
        });
        self
    }

    pub fn insert_ward(mut self, ward: Ward) -> Self {
        self.wards.push(PendingWrite {
            expected_version: None,
            record: ward,
        });
        self
    }

    pub fn update_ward(mut self, expected_version: u64, ward: Ward) -> Self {
        self.wards.push(PendingWrite {
            expected_version: Some(expected_version),
            record: ward,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty() && self.wards.is_empty()
    }
}

/// 提交成功后的记录（版本号已由存储更新）
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    pub patients: Vec<Patient>,
    pub wards: Vec<Ward>,
}

impl CommitReceipt {
    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn ward(&self, id: &str) -> Option<&Ward> {
        self.wards.iter().find(|w| w.id == id)
    }
}

/// 患者流转仓储接口
///
/// 实现必须保证 `commit` 的原子性：所有期望版本均匹配时全部写入，
/// 否则返回 [`clinq_core::ClinqError::Conflict`] 且不写入任何记录。
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// 一致性快照
    async fn snapshot(&self) -> StoreSnapshot;

    /// 按ID读取患者
    async fn patient(&self, id: &str) -> Result<Patient>;

    /// 按ID读取病区
    async fn ward(&self, id: &str) -> Result<Ward>;

    /// 分配下一个挂号序号（从1开始单调递增）
    async fn next_arrival(&self) -> u64;

    /// 原子提交变更集
    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt>;
}
