//! 错误定义模块

use crate::models::PatientStatus;
use thiserror::Error;

/// 患者流转系统统一错误类型
#[derive(Error, Debug)]
pub enum ClinqError {
    #[error("验证错误: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("无效状态转换: {0}")]
    StateTransition(TransitionGuard),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("并发冲突: {0}")]
    Conflict(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 未满足的状态转换守卫条件
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionGuard {
    #[error("cannot {action} a patient in status {current}")]
    InvalidStatus {
        current: PatientStatus,
        action: String,
    },

    #[error("patient already discharged")]
    AlreadyDischarged,

    #[error("ward {ward_id} at capacity ({capacity} beds)")]
    WardAtCapacity { ward_id: String, capacity: u32 },

    #[error("bed {bed_label} in ward {ward_id} already occupied")]
    BedOccupied { ward_id: String, bed_label: String },
}

impl ClinqError {
    /// 构造字段验证错误
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClinqError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClinqError::Validation { .. })
    }

    pub fn is_state_transition(&self) -> bool {
        matches!(self, ClinqError::StateTransition(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClinqError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClinqError::Conflict(_))
    }

    /// 返回未满足的守卫条件（仅状态转换错误）
    pub fn guard(&self) -> Option<&TransitionGuard> {
        match self {
            ClinqError::StateTransition(guard) => Some(guard),
            _ => None,
        }
    }
}

impl From<TransitionGuard> for ClinqError {
    fn from(guard: TransitionGuard) -> Self {
        ClinqError::StateTransition(guard)
    }
}

/// 患者流转系统统一结果类型
pub type Result<T> = std::result::Result<T, ClinqError>;
