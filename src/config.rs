use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of environment variables that override the config file
pub const ENV_PREFIX: &str = "AI_ENGINE_";

/// 主配置结构体
///
/// 包含日志、提供商实例和嵌入批处理配置，从配置文件和环境变量加载
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// 日志配置（可选，有默认值）
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 提供商实例配置映射（实例名 -> 实例配置）
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// 嵌入批处理配置（可选，有默认值）
    #[serde(default)]
    pub embedding: EmbeddingBatchConfig,
}

/// One configured provider instance
///
/// `connection` and `settings` stay free-form; the factory layers them over
/// the registered template of `type_name`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProviderEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub connection: HashMap<String, Value>,
    #[serde(default)]
    pub settings: HashMap<String, Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EmbeddingBatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

// Default value functions
fn default_enabled() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }
fn default_batch_size() -> usize { 16 }
fn default_concurrency_limit() -> usize { 4 }
fn default_max_retries() -> u32 { 3 }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for EmbeddingBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency_limit: default_concurrency_limit(),
            max_retries: default_max_retries(),
        }
    }
}

/// 加载配置文件和环境变量
///
/// ## 功能说明
/// 从指定的TOML文件和环境变量（前缀AI_ENGINE_）加载配置，环境变量会覆盖配置文件中的相同设置
///
/// ## 内部实现逻辑
/// 1. 使用Figment库创建配置加载器
/// 2. 首先加载TOML文件中的配置（文件不存在时跳过）
/// 3. 然后加载以AI_ENGINE_开头的环境变量，`__` 分隔嵌套键
/// 4. 将配置反序列化为Config结构体
/// 5. 调用validate()方法验证配置的有效性
///
/// ## 执行例子
/// ```rust,ignore
/// // AI_ENGINE_PROVIDERS__MAIN__CONNECTION__API_KEY=sk-... 会覆盖文件中的密钥
/// let config = load_config("config.toml")?;
/// println!("{} provider instances configured", config.providers.len());
/// ```
///
/// ## 错误处理
/// - 配置文件格式错误时返回解析错误
/// - 配置验证失败时返回验证错误
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {} or environment variables", path.display()))?;

    config.validate().context("Configuration validation failed")?;

    Ok(config)
}

impl Config {
    /// 验证整个配置的有效性
    ///
    /// ## 内部实现逻辑
    /// 1. 检查至少配置了一个提供商实例
    /// 2. 逐个验证每个实例的配置
    /// 3. 验证日志配置和嵌入批处理配置
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(anyhow::anyhow!("At least one provider must be configured"));
        }

        for (name, provider) in &self.providers {
            provider
                .validate()
                .with_context(|| format!("Provider '{}' configuration validation failed", name))?;
        }

        self.logging
            .validate()
            .context("Logging configuration validation failed")?;

        self.embedding
            .validate()
            .context("Embedding configuration validation failed")?;

        Ok(())
    }

    /// Look up an enabled provider instance by name
    pub fn provider(&self, name: &str) -> Result<&ProviderEntry> {
        match self.providers.get(name) {
            Some(entry) if entry.enabled => Ok(entry),
            Some(_) => Err(anyhow::anyhow!("Provider '{}' is disabled", name)),
            None => Err(anyhow::anyhow!(
                "Provider '{}' is not configured (known: {:?})",
                name,
                self.provider_names()
            )),
        }
    }

    /// Configured instance names, sorted
    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ProviderEntry {
    /// 验证单个提供商实例的配置
    ///
    /// ## 参数验证规则
    /// - `type`: 不能为空
    /// - `connection.base_url`: 如果提供，必须以http://或https://开头
    /// - `connection.timeout`: 如果提供，1-600秒之间
    /// - `connection.max_retries`: 如果提供，0-10次之间
    ///
    /// 类型名是否已注册由工厂在创建实例时检查
    pub fn validate(&self) -> Result<()> {
        if self.type_name.is_empty() {
            return Err(anyhow::anyhow!("Provider type cannot be empty"));
        }

        if let Some(base_url) = self.connection.get("base_url") {
            let base_url = base_url
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Provider base_url must be a string"))?;
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(anyhow::anyhow!("Provider base_url must start with http:// or https://"));
            }
        }

        if let Some(timeout) = self.connection.get("timeout") {
            let timeout = timeout
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("Provider timeout must be a positive integer"))?;
            if timeout == 0 {
                return Err(anyhow::anyhow!("Provider timeout must be greater than 0"));
            }
            if timeout > 600 {
                return Err(anyhow::anyhow!("Provider timeout cannot exceed 600 seconds"));
            }
        }

        if let Some(max_retries) = self.connection.get("max_retries") {
            let max_retries = max_retries
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("Provider max_retries must be a non-negative integer"))?;
            if max_retries > 10 {
                return Err(anyhow::anyhow!("Provider max retries cannot exceed 10"));
            }
        }

        Ok(())
    }
}

impl LoggingConfig {
    /// 验证日志配置参数
    ///
    /// ## 参数验证规则
    /// - `level`: 必须是 "trace", "debug", "info", "warn", "error" 之一
    /// - `format`: 必须是 "json", "pretty", "compact" 之一
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}': must be one of {:?}",
                self.level, valid_levels
            ));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}': must be one of {:?}",
                self.format, valid_formats
            ));
        }

        Ok(())
    }
}

impl EmbeddingBatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("Embedding batch size must be greater than 0"));
        }

        if self.concurrency_limit == 0 {
            return Err(anyhow::anyhow!("Embedding concurrency limit must be greater than 0"));
        }

        if self.max_retries > 10 {
            return Err(anyhow::anyhow!("Embedding max retries cannot exceed 10"));
        }

        Ok(())
    }
}
