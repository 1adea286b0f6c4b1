//! # ClinQ管理模块
//!
//! 提供配置管理、日志初始化、审计检索和流转监控等运维功能

pub mod audit;
pub mod config;
pub mod logging;
pub mod monitoring;

pub use audit::{AuditFilter, AuditStats, AuditTrail, SortOrder, TimeRange};
pub use config::{ClinqConfig, ConfigManager, ConfigValidator, LoggingConfig, WardConfig};
pub use logging::init_tracing;
pub use monitoring::FlowMetrics;
