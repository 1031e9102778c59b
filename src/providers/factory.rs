use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    errors::{AppError, AppResult},
    providers::{
        ChatProvider, EmbeddingProvider, ProviderInstance, RerankProvider,
        registry::{ProviderConstructor, ProviderMetadata, ProviderRegistry},
        types::{CapabilityKind, ConnectionConfig, ModelSettings},
    },
};

/// Builds provider instances from registry entries
///
/// Every call constructs a fresh instance; callers that want reuse cache it.
#[derive(Clone)]
pub struct ProviderFactory {
    registry: Arc<ProviderRegistry>,
}

impl ProviderFactory {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Factory over the process-wide registry
    pub fn global() -> AppResult<Self> {
        ProviderRegistry::global().map(Self::new)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// 创建提供商实例
    ///
    /// ## 内部实现逻辑
    /// 1. 通过注册表解析类型名，未注册时返回 `UnknownProviderType`
    /// 2. 校验构造函数产出的能力与请求能力一致，否则返回 `CapabilityMismatch`
    /// 3. 调用构造函数：聊天提供商接收连接配置和模型设置，嵌入/重排序提供商只接收连接配置
    /// 4. 构造失败时包装为 `ProviderInstantiationFailure`
    pub fn create(
        &self,
        type_name: &str,
        connection: ConnectionConfig,
        settings: ModelSettings,
        required: CapabilityKind,
    ) -> AppResult<ProviderInstance> {
        let metadata = self.resolve(type_name, required)?;

        let instance = match metadata.constructor {
            ProviderConstructor::Chat(construct) => construct(connection, settings).map(ProviderInstance::Chat),
            ProviderConstructor::Embedding(construct) => construct(connection).map(ProviderInstance::Embedding),
            ProviderConstructor::Rerank(construct) => construct(connection).map(ProviderInstance::Rerank),
        }
        .map_err(|e| {
            tracing::error!(type_name, error = %e, "Failed to create provider instance");
            AppError::ProviderInstantiationFailure {
                type_name: type_name.to_string(),
                source: e.into(),
            }
        })?;

        tracing::info!(type_name, capability = %required, "Created provider instance");
        Ok(instance)
    }

    /// Create from free-form maps layered over the registered config template
    ///
    /// Keys in `connection` override the template; a map that does not
    /// deserialise into the typed config is an instantiation failure.
    pub fn create_from_maps(
        &self,
        type_name: &str,
        connection: &HashMap<String, Value>,
        settings: &HashMap<String, Value>,
        required: CapabilityKind,
    ) -> AppResult<ProviderInstance> {
        let metadata = self.resolve(type_name, required)?;

        let mut merged = metadata.default_config_template.clone();
        merged.extend(connection.iter().map(|(k, v)| (k.clone(), v.clone())));

        let instantiation_failure = |e: anyhow::Error| AppError::ProviderInstantiationFailure {
            type_name: type_name.to_string(),
            source: e.into(),
        };

        let connection = ConnectionConfig::from_map(&merged).map_err(instantiation_failure)?;
        let settings = ModelSettings::from_map(settings).map_err(instantiation_failure)?;

        self.create(type_name, connection, settings, required)
    }

    pub fn create_chat(
        &self,
        type_name: &str,
        connection: ConnectionConfig,
        settings: ModelSettings,
    ) -> AppResult<Box<dyn ChatProvider>> {
        self.create(type_name, connection, settings, CapabilityKind::ChatCompletion)?
            .into_chat()
    }

    pub fn create_embedding(
        &self,
        type_name: &str,
        connection: ConnectionConfig,
    ) -> AppResult<Box<dyn EmbeddingProvider>> {
        self.create(type_name, connection, ModelSettings::default(), CapabilityKind::Embedding)?
            .into_embedding()
    }

    pub fn create_rerank(
        &self,
        type_name: &str,
        connection: ConnectionConfig,
    ) -> AppResult<Box<dyn RerankProvider>> {
        self.create(type_name, connection, ModelSettings::default(), CapabilityKind::Rerank)?
            .into_rerank()
    }

    fn resolve(&self, type_name: &str, required: CapabilityKind) -> AppResult<Arc<ProviderMetadata>> {
        let metadata = self.registry.lookup(type_name)?;

        let actual = metadata.constructor.capability();
        if actual != required {
            tracing::warn!(type_name, %required, %actual, "Provider capability mismatch");
            return Err(AppError::CapabilityMismatch {
                type_name: type_name.to_string(),
                required,
                actual,
            });
        }

        Ok(metadata)
    }
}
