//! 分诊分类规则
//!
//! 规则按级联顺序求值，首个命中的等级即为结果：
//! 危急条件优先于紧急条件，均未命中则为非紧急。

use clinq_core::{UrgencyLevel, Vitals};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// 参与分诊的生命体征
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VitalSign {
    Temperature,
    Pulse,
    Systolic,
    Spo2,
}

impl VitalSign {
    fn read(self, vitals: &Vitals) -> f64 {
        match self {
            VitalSign::Temperature => vitals.temperature,
            VitalSign::Pulse => f64::from(vitals.pulse),
            VitalSign::Systolic => f64::from(vitals.systolic),
            VitalSign::Spo2 => f64::from(vitals.spo2),
        }
    }

    fn label(self) -> &'static str {
        match self {
            VitalSign::Temperature => "temperature",
            VitalSign::Pulse => "pulse",
            VitalSign::Systolic => "systolic BP",
            VitalSign::Spo2 => "SpO2",
        }
    }
}

/// 阈值比较方式（严格不等）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Threshold {
    Below(f64),
    Above(f64),
}

/// 单项分诊条件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TriageCriterion {
    pub sign: VitalSign,
    pub threshold: Threshold,
}

impl TriageCriterion {
    pub const fn below(sign: VitalSign, limit: f64) -> Self {
        Self {
            sign,
            threshold: Threshold::Below(limit),
        }
    }

    pub const fn above(sign: VitalSign, limit: f64) -> Self {
        Self {
            sign,
            threshold: Threshold::Above(limit),
        }
    }

    pub fn matches(&self, vitals: &Vitals) -> bool {
        let value = self.sign.read(vitals);
        match self.threshold {
            Threshold::Below(limit) => value < limit,
            Threshold::Above(limit) => value > limit,
        }
    }
}

impl fmt::Display for TriageCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.threshold {
            Threshold::Below(limit) => write!(f, "{} < {}", self.sign.label(), limit),
            Threshold::Above(limit) => write!(f, "{} > {}", self.sign.label(), limit),
        }
    }
}

/// 危急条件
pub const CRITICAL_CRITERIA: [TriageCriterion; 5] = [
    TriageCriterion::below(VitalSign::Spo2, 90.0),
    TriageCriterion::above(VitalSign::Pulse, 130.0),
    TriageCriterion::below(VitalSign::Pulse, 40.0),
    TriageCriterion::below(VitalSign::Systolic, 90.0),
    TriageCriterion::above(VitalSign::Temperature, 39.5),
];

/// 紧急条件
pub const URGENT_CRITERIA: [TriageCriterion; 4] = [
    TriageCriterion::below(VitalSign::Spo2, 94.0),
    TriageCriterion::above(VitalSign::Pulse, 110.0),
    TriageCriterion::above(VitalSign::Systolic, 160.0),
    TriageCriterion::above(VitalSign::Temperature, 38.5),
];

/// 分诊评估结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageAssessment {
    pub level: UrgencyLevel,
    /// 命中等级中被触发的条件；非紧急时为空
    pub findings: Vec<TriageCriterion>,
}

impl TriageAssessment {
    pub fn describe(&self) -> String {
        if self.findings.is_empty() {
            return self.level.to_string();
        }
        let findings: Vec<String> = self.findings.iter().map(|c| c.to_string()).collect();
        format!("{} ({})", self.level, findings.join(", "))
    }
}

/// 分诊分类器
#[derive(Debug, Clone, Copy, Default)]
pub struct TriageClassifier;

impl TriageClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 级联规则表
    pub fn rules() -> [(UrgencyLevel, &'static [TriageCriterion]); 2] {
        [
            (UrgencyLevel::Critical, &CRITICAL_CRITERIA[..]),
            (UrgencyLevel::Urgent, &URGENT_CRITERIA[..]),
        ]
    }

    /// 计算紧急程度
    pub fn classify(&self, vitals: &Vitals) -> UrgencyLevel {
        self.assess(vitals).level
    }

    /// 计算紧急程度并给出命中条件
    pub fn assess(&self, vitals: &Vitals) -> TriageAssessment {
        for (level, criteria) in Self::rules() {
            let findings: Vec<TriageCriterion> = criteria
                .iter()
                .filter(|criterion| criterion.matches(vitals))
                .copied()
                .collect();

            if !findings.is_empty() {
                debug!("Triage rule {} matched on {} criteria", level, findings.len());
                return TriageAssessment { level, findings };
            }
        }

        TriageAssessment {
            level: UrgencyLevel::NonUrgent,
            findings: Vec::new(),
        }
    }
}

/// 按标准规则分类
pub fn classify(vitals: &Vitals) -> UrgencyLevel {
    TriageClassifier.classify(vitals)
}
