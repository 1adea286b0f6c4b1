//! 通用工具函数

/// 按挂号顺序生成患者ID，如 `P0001`
pub fn format_patient_id(arrival_seq: u64) -> String {
    format!("P{:04}", arrival_seq)
}

/// 验证患者ID格式
pub fn is_valid_patient_id(id: &str) -> bool {
    id.len() >= 5 && id.starts_with('P') && id[1..].chars().all(|c| c.is_ascii_digit())
}

/// 去除首尾空白后为空
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
