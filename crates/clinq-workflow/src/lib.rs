//! # ClinQ患者流转模块
//!
//! 提供从挂号到出院的患者流转管理功能，包括：
//! - 生命体征校验：规范化并检查床旁录入的原始数值
//! - 分诊分类：按规则级联把生命体征映射为紧急程度
//! - 候诊队列：按紧急程度和挂号顺序稳定排序
//! - 流转状态机：管理患者状态及合法转换
//! - 危急告警：分诊结果升为危急时通知相关人员

pub mod critical_alert;
pub mod engine;
pub mod state_machine;
pub mod triage;
pub mod validator;
pub mod worklist;

// 重新导出主要类型
pub use critical_alert::{CriticalAlert, CriticalAlertProcessor};
pub use engine::{FlowOverview, PatientFlowEngine};
pub use state_machine::{FlowEvent, FlowStateMachine};
pub use triage::{classify, TriageAssessment, TriageClassifier, TriageCriterion, VitalSign};
pub use validator::{RawVitals, ValidationLimits, VitalsValidator};
pub use worklist::{order_queue, position_in_queue, query_queue, queue_stats, QueueFilter, QueueStats};
