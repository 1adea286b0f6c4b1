//! 配置管理
//!
//! 从可选配置文件与 `CLINQ__*` 环境变量加载配置，并在加载后统一校验

use anyhow::{Context, Result};
use clinq_core::Ward;
use clinq_workflow::ValidationLimits;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// ClinQ完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinqConfig {
    /// 医院信息
    pub hospital: HospitalConfig,
    /// 初始病区
    pub wards: Vec<WardConfig>,
    /// 生命体征校验
    pub validation: ValidationConfig,
    /// 仓储配置
    pub store: StoreConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HospitalConfig {
    pub name: String,
}

/// 病区配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WardConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_ward_type")]
    pub ward_type: String,
    pub capacity: u32,
    #[serde(default)]
    pub occupied: u32,
}

fn default_ward_type() -> String {
    "GENERAL".to_string()
}

impl WardConfig {
    pub fn to_ward(&self) -> Ward {
        Ward::new(&self.id, &self.name, &self.ward_type, self.capacity).with_occupied(self.occupied)
    }
}

/// 生命体征合理性上限
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// 关闭后只检查非负与血氧范围
    pub enforce_upper_bounds: bool,
    pub max_temperature: f64,
    pub max_pulse: u32,
    pub max_systolic: u32,
    pub max_diastolic: u32,
    pub max_respiratory_rate: u32,
}

impl ValidationConfig {
    pub fn limits(&self) -> ValidationLimits {
        if !self.enforce_upper_bounds {
            return ValidationLimits::permissive();
        }
        ValidationLimits {
            max_temperature: Some(self.max_temperature),
            max_pulse: Some(self.max_pulse),
            max_systolic: Some(self.max_systolic),
            max_diastolic: Some(self.max_diastolic),
            max_respiratory_rate: Some(self.max_respiratory_rate),
        }
    }
}

/// 仓储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// 乐观提交冲突后的最大尝试次数
    pub max_commit_retries: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令，`RUST_LOG` 优先
    pub level: String,
    /// JSON格式输出
    pub json: bool,
    /// 显示日志目标
    pub with_target: bool,
}

impl ClinqConfig {
    /// 初始病区列表
    pub fn ward_seed(&self) -> Vec<Ward> {
        self.wards.iter().map(WardConfig::to_ward).collect()
    }

    /// 渲染为TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

impl Default for HospitalConfig {
    fn default() -> Self {
        Self {
            name: "ClinQ General Hospital".to_string(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enforce_upper_bounds: true,
            max_temperature: 45.0,
            max_pulse: 300,
            max_systolic: 300,
            max_diastolic: 250,
            max_respiratory_rate: 100,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: clinq_workflow::engine::DEFAULT_MAX_COMMIT_RETRIES,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: false,
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<ClinqConfig>>,
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载并校验配置；未指定文件时只读取环境变量
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let validator = ConfigValidator::new();
        let config = Self::load_config(config_path)?;
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(Path::to_path_buf),
            validator,
        })
    }

    /// 从已有配置创建（不读取文件与环境变量）
    pub fn from_config(config: ClinqConfig) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: None,
            validator,
        })
    }

    fn load_config(config_path: Option<&Path>) -> Result<ClinqConfig> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("CLINQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let config: ClinqConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path.display()),
            None => info!("Configuration loaded from environment and defaults"),
        }
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> ClinqConfig {
        self.config.read().await.clone()
    }

    /// 更新配置
    pub async fn update_config(&self, new_config: ClinqConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        *self.config.write().await = new_config;

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.update_config(new_config).await
    }

    /// 验证配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }

    /// 当前配置的TOML表示
    pub async fn to_toml(&self) -> Result<String> {
        self.config.read().await.to_toml()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&ClinqConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "hospital.name",
                validator: |config| {
                    if config.hospital.name.trim().is_empty() {
                        Err(anyhow::anyhow!("Hospital name cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid hospital name",
            },
            ValidationRule {
                field_path: "wards.id",
                validator: |config| {
                    let mut seen = HashSet::new();
                    for ward in &config.wards {
                        if ward.id.trim().is_empty() {
                            return Err(anyhow::anyhow!("Ward id cannot be empty"));
                        }
                        if !seen.insert(ward.id.as_str()) {
                            return Err(anyhow::anyhow!("Duplicate ward id {}", ward.id));
                        }
                    }
                    Ok(())
                },
                error_message: "Invalid ward id",
            },
            ValidationRule {
                field_path: "wards.capacity",
                validator: |config| {
                    for ward in &config.wards {
                        if ward.capacity == 0 {
                            return Err(anyhow::anyhow!("Ward {} capacity cannot be 0", ward.id));
                        }
                        if ward.occupied > ward.capacity {
                            return Err(anyhow::anyhow!(
                                "Ward {} occupied {} exceeds capacity {}",
                                ward.id,
                                ward.occupied,
                                ward.capacity
                            ));
                        }
                    }
                    Ok(())
                },
                error_message: "Invalid ward capacity",
            },
            ValidationRule {
                field_path: "validation",
                validator: |config| {
                    let v = &config.validation;
                    if !v.enforce_upper_bounds {
                        return Ok(());
                    }
                    if !(v.max_temperature.is_finite() && v.max_temperature > 0.0) {
                        return Err(anyhow::anyhow!("max_temperature must be positive"));
                    }
                    let integers = [
                        ("max_pulse", v.max_pulse),
                        ("max_systolic", v.max_systolic),
                        ("max_diastolic", v.max_diastolic),
                        ("max_respiratory_rate", v.max_respiratory_rate),
                    ];
                    for (name, value) in integers {
                        if value == 0 {
                            return Err(anyhow::anyhow!("{} must be positive", name));
                        }
                    }
                    Ok(())
                },
                error_message: "Invalid validation limits",
            },
            ValidationRule {
                field_path: "store.max_commit_retries",
                validator: |config| {
                    if config.store.max_commit_retries == 0 {
                        Err(anyhow::anyhow!("Store max commit retries cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid store retries",
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    EnvFilter::try_new(&config.logging.level)
                        .map(|_| ())
                        .map_err(|e| anyhow::anyhow!("{}", e))
                },
                error_message: "Invalid log level",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &ClinqConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_match_validator_limits() {
        let config = ClinqConfig::default();
        assert_eq!(config.validation.limits(), ValidationLimits::default());
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let file = write_config(
            r#"
[hospital]
name = "Base Hospital Kandy"

[[wards]]
id = "W1"
name = "Medical Ward"
capacity = 20
occupied = 4

[[wards]]
id = "ICU"
name = "Intensive Care"
ward_type = "ICU"
capacity = 6

[store]
max_commit_retries = 3
"#,
        );

        let manager = ConfigManager::load(Some(file.path())).unwrap();
        let config = manager.get_config().await;

        assert_eq!(config.hospital.name, "Base Hospital Kandy");
        assert_eq!(config.store.max_commit_retries, 3);
        assert_eq!(config.logging, LoggingConfig::default());

        let wards = config.ward_seed();
        assert_eq!(wards.len(), 2);
        assert_eq!(wards[0].occupied, 4);
        assert_eq!(wards[1].ward_type, "ICU");
        assert_eq!(wards[1].occupied, 0);
    }

    #[test]
    fn test_rejects_invalid_wards() {
        let overfull = write_config(
            r#"
[[wards]]
id = "W1"
name = "Medical Ward"
capacity = 2
occupied = 3
"#,
        );
        let err = ConfigManager::load(Some(overfull.path())).unwrap_err();
        assert!(err.to_string().contains("Invalid ward capacity"));

        let mut config = ClinqConfig::default();
        config.wards = vec![
            WardConfig {
                id: "W1".to_string(),
                name: "A".to_string(),
                ward_type: default_ward_type(),
                capacity: 2,
                occupied: 0,
            },
            WardConfig {
                id: "W1".to_string(),
                name: "B".to_string(),
                ward_type: default_ward_type(),
                capacity: 2,
                occupied: 0,
            },
        ];
        let err = ConfigManager::from_config(config).unwrap_err();
        assert!(err.to_string().contains("Duplicate ward id"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(ConfigManager::load(Some(&path)).is_err());
    }

    #[test]
    fn test_permissive_validation() {
        let mut config = ClinqConfig::default();
        config.validation.enforce_upper_bounds = false;
        config.validation.max_pulse = 0;

        assert_eq!(config.validation.limits(), ValidationLimits::permissive());
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[tokio::test]
    async fn test_update_and_render() {
        let manager = ConfigManager::from_config(ClinqConfig::default()).unwrap();

        let mut bad = manager.get_config().await;
        bad.store.max_commit_retries = 0;
        assert!(manager.update_config(bad).await.is_err());
        assert_eq!(manager.get_config().await.store, StoreConfig::default());

        let rendered = manager.to_toml().await.unwrap();
        assert!(rendered.contains("[hospital]"));
        assert!(rendered.contains("max_commit_retries"));

        let parsed: ClinqConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, manager.get_config().await);
    }
}
