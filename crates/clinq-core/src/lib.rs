//! # ClinQ Core
//!
//! 患者流转系统的核心模块，提供基础数据结构、错误定义、审计接口和通用工具。

pub mod audit;
pub mod error;
pub mod models;
pub mod utils;

pub use audit::{AuditAction, AuditEntry, AuditSink, FanoutAuditSink, NullAuditSink};
pub use error::{ClinqError, Result, TransitionGuard};
pub use models::*;
