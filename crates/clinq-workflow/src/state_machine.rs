//! 患者流转状态机
//!
//! 管理患者从待分诊到出院的状态转换

use clinq_core::{PatientStatus, Result, TransitionGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 触发状态转换的事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FlowEvent {
    VitalsSubmitted,
    Admit,
    Discharge,
}

impl FlowEvent {
    /// 用于错误信息的动作描述
    pub fn action(self) -> &'static str {
        match self {
            FlowEvent::VitalsSubmitted => "submit vitals for",
            FlowEvent::Admit => "admit",
            FlowEvent::Discharge => "discharge",
        }
    }
}

impl fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// 患者流转状态机
#[derive(Debug)]
pub struct FlowStateMachine {
    transitions: HashMap<(PatientStatus, FlowEvent), PatientStatus>,
}

impl FlowStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert(
            (PatientStatus::AwaitingTriage, FlowEvent::VitalsSubmitted),
            PatientStatus::AwaitingConsultation,
        );
        // 候诊期间可重复采集，分诊等级随之重算
        transitions.insert(
            (PatientStatus::AwaitingConsultation, FlowEvent::VitalsSubmitted),
            PatientStatus::AwaitingConsultation,
        );
        transitions.insert(
            (PatientStatus::AwaitingConsultation, FlowEvent::Admit),
            PatientStatus::Admitted,
        );
        transitions.insert(
            (PatientStatus::Admitted, FlowEvent::Discharge),
            PatientStatus::Discharged,
        );

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: PatientStatus, event: FlowEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: PatientStatus, event: FlowEvent) -> Result<PatientStatus> {
        if from.is_terminal() {
            return Err(TransitionGuard::AlreadyDischarged.into());
        }

        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(TransitionGuard::InvalidStatus {
                current: from,
                action: event.action().to_string(),
            }
            .into()),
        }
    }

    /// 非状态变更操作（会诊记录、治疗方案）要求患者尚未出院
    pub fn ensure_active(&self, status: PatientStatus) -> Result<()> {
        if status.is_terminal() {
            return Err(TransitionGuard::AlreadyDischarged.into());
        }
        Ok(())
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<PatientStatus> {
        vec![
            PatientStatus::AwaitingTriage,
            PatientStatus::AwaitingConsultation,
            PatientStatus::Admitted,
            PatientStatus::Discharged,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: PatientStatus) -> Vec<FlowEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for FlowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinq_core::ClinqError;

    #[test]
    fn test_valid_transitions() {
        let sm = FlowStateMachine::new();

        assert!(sm.can_transition(PatientStatus::AwaitingTriage, FlowEvent::VitalsSubmitted));
        assert!(sm.can_transition(PatientStatus::AwaitingConsultation, FlowEvent::VitalsSubmitted));
        assert!(sm.can_transition(PatientStatus::AwaitingConsultation, FlowEvent::Admit));
        assert!(sm.can_transition(PatientStatus::Admitted, FlowEvent::Discharge));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = FlowStateMachine::new();

        assert!(!sm.can_transition(PatientStatus::AwaitingTriage, FlowEvent::Admit));
        assert!(!sm.can_transition(PatientStatus::AwaitingTriage, FlowEvent::Discharge));
        assert!(!sm.can_transition(PatientStatus::Admitted, FlowEvent::VitalsSubmitted));
        for event in [FlowEvent::VitalsSubmitted, FlowEvent::Admit, FlowEvent::Discharge] {
            assert!(!sm.can_transition(PatientStatus::Discharged, event));
        }
    }

    #[test]
    fn test_state_execution() {
        let sm = FlowStateMachine::new();

        let result = sm.transition(PatientStatus::AwaitingTriage, FlowEvent::VitalsSubmitted);
        assert_eq!(result.unwrap(), PatientStatus::AwaitingConsultation);

        let err = sm
            .transition(PatientStatus::AwaitingTriage, FlowEvent::Discharge)
            .unwrap_err();
        assert!(matches!(
            err,
            ClinqError::StateTransition(TransitionGuard::InvalidStatus {
                current: PatientStatus::AwaitingTriage,
                ..
            })
        ));
        assert!(err.to_string().contains("cannot discharge"));
    }

    #[test]
    fn test_discharged_is_terminal() {
        let sm = FlowStateMachine::new();

        let err = sm
            .transition(PatientStatus::Discharged, FlowEvent::Admit)
            .unwrap_err();
        assert_eq!(err.guard(), Some(&TransitionGuard::AlreadyDischarged));
        assert!(sm.ensure_active(PatientStatus::Discharged).is_err());
        assert!(sm.ensure_active(PatientStatus::Admitted).is_ok());
        assert!(sm.get_possible_events(PatientStatus::Discharged).is_empty());
    }
}
