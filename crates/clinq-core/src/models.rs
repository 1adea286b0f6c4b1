//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 性别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// 医护人员角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Nurse,
    Doctor,
    Admin,
    ItSupport,
}

/// 操作人（用于审计）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: StaffRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: StaffRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
}

/// 挂号时采集的人口学信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Demographics {
    pub national_id: String, // 身份证号 (NIC)
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub contact: String,
    pub address: String,
    #[serde(default)]
    pub symptoms: Vec<String>, // 主诉症状
}

/// 生命体征快照
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    pub temperature: f64,      // 摄氏度
    pub pulse: u32,            // 次/分
    pub systolic: u32,         // mmHg
    pub diastolic: u32,        // mmHg
    pub respiratory_rate: u32, // 次/分
    pub spo2: u8,              // %
}

/// 生命体征历史条目，记录后不可修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalsRecord {
    pub vitals: Vitals,
    pub urgency: UrgencyLevel, // 采集时计算出的分诊等级
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: String,
}

/// 分诊紧急程度
///
/// 声明顺序即优先级顺序：`Critical < Urgent < NonUrgent`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Critical,  // 危急（红）
    Urgent,    // 紧急（黄）
    NonUrgent, // 非紧急（绿）
}

impl UrgencyLevel {
    /// 排序等级，数值越小越优先
    pub fn rank(self) -> u8 {
        match self {
            UrgencyLevel::Critical => 0,
            UrgencyLevel::Urgent => 1,
            UrgencyLevel::NonUrgent => 2,
        }
    }

    pub fn all() -> [UrgencyLevel; 3] {
        [
            UrgencyLevel::Critical,
            UrgencyLevel::Urgent,
            UrgencyLevel::NonUrgent,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::Critical => "CRITICAL",
            UrgencyLevel::Urgent => "URGENT",
            UrgencyLevel::NonUrgent => "NON_URGENT",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 患者流转状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientStatus {
    AwaitingTriage,       // 待分诊
    AwaitingConsultation, // 候诊
    Admitted,             // 已入院
    Discharged,           // 已出院
}

impl PatientStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PatientStatus::Discharged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::AwaitingTriage => "AWAITING_TRIAGE",
            PatientStatus::AwaitingConsultation => "AWAITING_CONSULTATION",
            PatientStatus::Admitted => "ADMITTED",
            PatientStatus::Discharged => "DISCHARGED",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会诊记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsultationNote {
    pub text: String,
    pub written_at: DateTime<Utc>,
    pub written_by: String,
}

/// 处方药物
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
}

/// 治疗方案
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreatmentPlan {
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub procedures: Vec<String>,
    #[serde(default)]
    pub instructions: String,
}

/// 床位分配
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BedAssignment {
    pub ward_id: String,
    pub bed_label: String,
    pub admitted_at: DateTime<Utc>,
}

/// 出院小结
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DischargeSummary {
    pub diagnosis: String,
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default)]
    pub advice: String,
    #[serde(default)]
    pub prescriptions: Vec<String>,
}

/// 患者记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: String,
    pub arrival_seq: u64, // 挂号顺序，用于同级排序
    pub demographics: Demographics,
    pub status: PatientStatus,
    pub vitals_history: Vec<VitalsRecord>,
    pub consultation_notes: Vec<ConsultationNote>,
    pub treatment_plan: Option<TreatmentPlan>,
    pub bed: Option<BedAssignment>,
    pub discharge_summary: Option<DischargeSummary>,
    pub discharged_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Patient {
    pub fn name(&self) -> &str {
        &self.demographics.name
    }

    /// 最新生命体征
    pub fn latest_vitals(&self) -> Option<&Vitals> {
        self.vitals_history.last().map(|record| &record.vitals)
    }

    /// 当前分诊等级；首次采集生命体征前为 `None`
    pub fn urgency(&self) -> Option<UrgencyLevel> {
        self.vitals_history.last().map(|record| record.urgency)
    }

    pub fn latest_note(&self) -> Option<&str> {
        self.consultation_notes.last().map(|note| note.text.as_str())
    }

    pub fn ward_id(&self) -> Option<&str> {
        self.bed.as_ref().map(|bed| bed.ward_id.as_str())
    }

    /// 自挂号以来的等待分钟数
    pub fn wait_minutes(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.registered_at)
            .num_minutes()
            .max(0)
    }
}

/// 病区
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ward {
    pub id: String,
    pub name: String,
    pub ward_type: String,
    pub capacity: u32,
    pub occupied: u32,
    #[serde(default)]
    pub version: u64,
}

impl Ward {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        ward_type: impl Into<String>,
        capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ward_type: ward_type.into(),
            capacity,
            occupied: 0,
            version: 0,
        }
    }

    pub fn with_occupied(mut self, occupied: u32) -> Self {
        self.occupied = occupied;
        self
    }

    pub fn has_free_bed(&self) -> bool {
        self.occupied < self.capacity
    }

    pub fn free_beds(&self) -> u32 {
        self.capacity.saturating_sub(self.occupied)
    }
}
