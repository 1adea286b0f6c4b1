//! 生命体征与录入数据校验
//!
//! 对床旁录入的原始数值做解析、规范化和范围检查。

use chrono::NaiveDate;
use clinq_core::utils::is_blank;
use clinq_core::{ClinqError, Demographics, DischargeSummary, Result, TreatmentPlan, Vitals};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

/// 床旁录入的原始生命体征（文本形式）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawVitals {
    #[serde(deserialize_with = "number_or_text")]
    pub temperature: String,
    #[serde(deserialize_with = "number_or_text")]
    pub pulse: String,
    #[serde(deserialize_with = "number_or_text")]
    pub systolic: String,
    #[serde(deserialize_with = "number_or_text")]
    pub diastolic: String,
    #[serde(deserialize_with = "number_or_text")]
    pub respiratory_rate: String,
    #[serde(deserialize_with = "number_or_text")]
    pub spo2: String,
}

impl RawVitals {
    pub fn new(
        temperature: impl ToString,
        pulse: impl ToString,
        systolic: impl ToString,
        diastolic: impl ToString,
        respiratory_rate: impl ToString,
        spo2: impl ToString,
    ) -> Self {
        Self {
            temperature: temperature.to_string(),
            pulse: pulse.to_string(),
            systolic: systolic.to_string(),
            diastolic: diastolic.to_string(),
            respiratory_rate: respiratory_rate.to_string(),
            spo2: spo2.to_string(),
        }
    }

    fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("temperature", self.temperature.as_str()),
            ("pulse", self.pulse.as_str()),
            ("systolic", self.systolic.as_str()),
            ("diastolic", self.diastolic.as_str()),
            ("respiratory_rate", self.respiratory_rate.as_str()),
            ("spo2", self.spo2.as_str()),
        ]
    }
}

impl From<Vitals> for RawVitals {
    fn from(vitals: Vitals) -> Self {
        Self::new(
            vitals.temperature,
            vitals.pulse,
            vitals.systolic,
            vitals.diastolic,
            vitals.respiratory_rate,
            vitals.spo2,
        )
    }
}

/// 接受JSON数值或文本
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

fn number_or_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Int(v) => v.to_string(),
        NumberOrText::Float(v) => v.to_string(),
        NumberOrText::Text(v) => v,
    })
}

/// 合理性上限；`None` 表示不检查
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValidationLimits {
    pub max_temperature: Option<f64>,
    pub max_pulse: Option<u32>,
    pub max_systolic: Option<u32>,
    pub max_diastolic: Option<u32>,
    pub max_respiratory_rate: Option<u32>,
}

impl ValidationLimits {
    /// 仅检查非负与血氧范围
    pub fn permissive() -> Self {
        Self {
            max_temperature: None,
            max_pulse: None,
            max_systolic: None,
            max_diastolic: None,
            max_respiratory_rate: None,
        }
    }

    fn integer_limit(&self, field: &str) -> Option<u32> {
        match field {
            "pulse" => self.max_pulse,
            "systolic" => self.max_systolic,
            "diastolic" => self.max_diastolic,
            "respiratory_rate" => self.max_respiratory_rate,
            _ => None,
        }
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_temperature: Some(45.0),
            max_pulse: Some(300),
            max_systolic: Some(300),
            max_diastolic: Some(250),
            max_respiratory_rate: Some(100),
        }
    }
}

/// 单个字段的校验错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

/// 校验报告
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    fn add_error(&mut self, field: &'static str, reason: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            reason: reason.into(),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// 第一个错误转为统一错误类型
    pub fn into_result(self) -> Result<()> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ClinqError::validation(error.field, error.reason)),
            None => Ok(()),
        }
    }
}

/// 生命体征校验器
#[derive(Debug, Clone, Default)]
pub struct VitalsValidator {
    limits: ValidationLimits,
}

impl VitalsValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// 检查全部字段，收集所有错误
    pub fn check(&self, raw: &RawVitals) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (field, text) in raw.fields() {
            if let Err(reason) = self.check_field(field, text) {
                report.add_error(field, reason);
            }
        }
        report
    }

    /// 校验并转换为生命体征快照；失败时返回第一个出错的字段
    pub fn validate(&self, raw: &RawVitals) -> Result<Vitals> {
        let report = self.check(raw);
        if !report.is_valid() {
            warn!("Vitals rejected with {} invalid fields", report.error_count());
            report.into_result()?;
        }

        // 以上已逐字段检查，此处解析不会失败
        let vitals = Vitals {
            temperature: parse_real(&raw.temperature).map_err(|r| ClinqError::validation("temperature", r))?,
            pulse: parse_whole(&raw.pulse).map_err(|r| ClinqError::validation("pulse", r))?,
            systolic: parse_whole(&raw.systolic).map_err(|r| ClinqError::validation("systolic", r))?,
            diastolic: parse_whole(&raw.diastolic).map_err(|r| ClinqError::validation("diastolic", r))?,
            respiratory_rate: parse_whole(&raw.respiratory_rate)
                .map_err(|r| ClinqError::validation("respiratory_rate", r))?,
            spo2: parse_whole(&raw.spo2)
                .and_then(|v| u8::try_from(v).map_err(|_| "must lie between 0 and 100".to_string()))
                .map_err(|r| ClinqError::validation("spo2", r))?,
        };

        debug!("Vitals validated: {:?}", vitals);
        Ok(vitals)
    }

    fn check_field(&self, field: &'static str, text: &str) -> std::result::Result<(), String> {
        match field {
            "temperature" => {
                let value = parse_real(text)?;
                if let Some(max) = self.limits.max_temperature {
                    if value > max {
                        return Err(format!("must not exceed {}", max));
                    }
                }
            }
            "spo2" => {
                let value = parse_whole(text)?;
                if value > 100 {
                    return Err("must lie between 0 and 100".to_string());
                }
            }
            _ => {
                let value = parse_whole(text)?;
                if let Some(max) = self.limits.integer_limit(field) {
                    if value > max {
                        return Err(format!("must not exceed {}", max));
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_number(text: &str) -> std::result::Result<f64, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("is required".to_string());
    }
    let value: f64 = text
        .parse()
        .map_err(|_| format!("'{}' is not a number", text))?;
    if !value.is_finite() {
        return Err(format!("'{}' is not a number", text));
    }
    if value < 0.0 {
        return Err("must not be negative".to_string());
    }
    Ok(value)
}

fn parse_real(text: &str) -> std::result::Result<f64, String> {
    parse_number(text)
}

fn parse_whole(text: &str) -> std::result::Result<u32, String> {
    let value = parse_number(text)?;
    if value.fract() != 0.0 {
        return Err("must be a whole number".to_string());
    }
    if value > f64::from(u32::MAX) {
        return Err("is out of range".to_string());
    }
    Ok(value as u32)
}

/// 校验并规范化挂号信息（去除空白、过滤空症状）
pub fn normalize_demographics(demographics: Demographics, today: NaiveDate) -> Result<Demographics> {
    if is_blank(&demographics.name) {
        return Err(ClinqError::validation("name", "is required"));
    }
    if is_blank(&demographics.national_id) {
        return Err(ClinqError::validation("national_id", "is required"));
    }
    if demographics.date_of_birth > today {
        return Err(ClinqError::validation("date_of_birth", "must not be in the future"));
    }

    Ok(Demographics {
        national_id: demographics.national_id.trim().to_string(),
        name: demographics.name.trim().to_string(),
        contact: demographics.contact.trim().to_string(),
        address: demographics.address.trim().to_string(),
        symptoms: demographics
            .symptoms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        ..demographics
    })
}

/// 校验治疗方案
pub fn validate_treatment_plan(plan: &TreatmentPlan) -> Result<()> {
    for medication in &plan.medications {
        if is_blank(&medication.name) {
            return Err(ClinqError::validation("medications.name", "is required"));
        }
    }
    Ok(())
}

/// 校验出院小结
pub fn validate_discharge_summary(summary: &DischargeSummary) -> Result<()> {
    if is_blank(&summary.diagnosis) {
        return Err(ClinqError::validation("diagnosis", "is required"));
    }
    Ok(())
}

/// 校验床位标签
pub fn validate_bed_label(bed_label: &str) -> Result<()> {
    if is_blank(bed_label) {
        return Err(ClinqError::validation("bed_label", "is required"));
    }
    Ok(())
}
