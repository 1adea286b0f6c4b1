//! 日志初始化

use crate::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// 解析日志过滤器；`RUST_LOG` 有效时优先于配置
fn resolve_filter(env_directive: Option<&str>, level: &str) -> EnvFilter {
    env_directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// 安装全局tracing订阅者
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_directive = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = resolve_filter(env_directive.as_deref(), &config.level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
