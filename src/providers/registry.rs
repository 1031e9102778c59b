use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use serde::Serialize;
use serde_json::Value;

use crate::{
    errors::{AppError, AppResult},
    providers::{
        ChatProvider, EmbeddingProvider, RerankProvider,
        builtin::register_builtin_providers,
        types::{CapabilityKind, ConnectionConfig, ModelSettings},
    },
};

pub type ChatConstructor = fn(ConnectionConfig, ModelSettings) -> anyhow::Result<Box<dyn ChatProvider>>;
pub type EmbeddingConstructor = fn(ConnectionConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>>;
pub type RerankConstructor = fn(ConnectionConfig) -> anyhow::Result<Box<dyn RerankProvider>>;

/// Constructor of a backend, tagged with the capability it produces
///
/// Chat constructors receive the model settings; embedding and rerank
/// constructors take the connection config only.
#[derive(Clone, Copy)]
pub enum ProviderConstructor {
    Chat(ChatConstructor),
    Embedding(EmbeddingConstructor),
    Rerank(RerankConstructor),
}

impl ProviderConstructor {
    pub fn capability(&self) -> CapabilityKind {
        match self {
            ProviderConstructor::Chat(_) => CapabilityKind::ChatCompletion,
            ProviderConstructor::Embedding(_) => CapabilityKind::Embedding,
            ProviderConstructor::Rerank(_) => CapabilityKind::Rerank,
        }
    }
}

impl fmt::Debug for ProviderConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderConstructor::{}", self.capability())
    }
}

/// Registration record of one backend type
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMetadata {
    pub type_name: String,
    pub description: String,
    pub capability_kind: CapabilityKind,
    pub default_config_template: HashMap<String, Value>,
    pub display_name: String,
    #[serde(skip)]
    pub constructor: ProviderConstructor,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<Arc<ProviderMetadata>>,
    index: HashMap<String, usize>,
}

/// Provider metadata registry
///
/// Maps a backend type name to its metadata and constructor. Written once at
/// start-up, then only read.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

static GLOBAL_REGISTRY: OnceLock<Result<Arc<ProviderRegistry>, String>> = OnceLock::new();

impl ProviderRegistry {
    /// 创建一个空的提供商注册表
    ///
    /// ## 功能说明
    /// 创建不包含任何提供商的注册表实例，主要用于测试或自定义注册列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建包含全部内置提供商的注册表
    ///
    /// ## 功能说明
    /// 创建新的注册表并执行内置注册列表（openai / openai_embedding / rerank_api）
    ///
    /// ## 返回值
    /// - `Ok(ProviderRegistry)`: 已注册内置提供商的注册表
    /// - `Err(AppError)`: 内置注册列表存在重复类型名或能力不一致
    pub fn with_builtin_providers() -> AppResult<Self> {
        let registry = Self::new();
        register_builtin_providers(&registry)?;
        Ok(registry)
    }

    /// 获取进程级全局注册表
    ///
    /// ## 功能说明
    /// 首次调用时构建注册表并执行内置注册列表，之后的调用返回同一个实例。
    /// 初始化是幂等的，并发调用也只会构建一次。
    ///
    /// ## 返回值
    /// - `Ok(Arc<ProviderRegistry>)`: 共享的全局注册表
    /// - `Err(AppError::ConfigError)`: 内置注册列表执行失败；失败结果同样被缓存，
    ///   之后每次调用都返回同一个错误，而不是一个空注册表
    ///
    /// ## 执行例子
    /// ```rust,ignore
    /// let registry = ProviderRegistry::global()?;
    /// let metadata = registry.lookup("openai")?;
    /// ```
    pub fn global() -> AppResult<Arc<ProviderRegistry>> {
        GLOBAL_REGISTRY
            .get_or_init(|| Self::build_shared(register_builtin_providers))
            .clone()
            .map_err(AppError::ConfigError)
    }

    fn build_shared(register: fn(&ProviderRegistry) -> AppResult<()>) -> Result<Arc<ProviderRegistry>, String> {
        let registry = ProviderRegistry::new();
        match register(&registry) {
            Ok(()) => Ok(Arc::new(registry)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to register built-in providers");
                Err(format!("Built-in provider registration failed: {}", e))
            }
        }
    }

    /// 注册提供商适配器
    ///
    /// ## 功能说明
    /// 将一个后端类型登记到注册表，记录其描述、能力类型、默认配置模板、显示名称和构造函数
    ///
    /// ## 内部实现逻辑
    /// 1. 校验类型名不能为空
    /// 2. 校验声明的能力类型与构造函数产出的能力一致
    /// 3. 在写锁内检查类型名是否已存在，重复注册直接拒绝（不会覆盖）
    /// 4. 追加到有序列表并建立类型名索引
    ///
    /// ## 参数说明
    /// - `type_name`: 唯一类型名，如 "openai"
    /// - `description`: 简短描述
    /// - `capability_kind`: 能力类型（chat_completion / embedding / rerank）
    /// - `default_config_template`: 默认配置模板（键 -> 默认值）
    /// - `display_name`: 显示名称
    /// - `constructor`: 构造函数
    ///
    /// ## 返回值
    /// - `Ok(())`: 注册成功
    /// - `Err(AppError::DuplicateProviderType)`: 类型名已注册
    /// - `Err(AppError::CapabilityMismatch)`: 声明能力与构造函数不一致
    pub fn register(
        &self,
        type_name: impl Into<String>,
        description: impl Into<String>,
        capability_kind: CapabilityKind,
        default_config_template: HashMap<String, Value>,
        display_name: impl Into<String>,
        constructor: ProviderConstructor,
    ) -> AppResult<()> {
        let type_name = type_name.into();
        let display_name = display_name.into();

        if type_name.is_empty() {
            return Err(AppError::validation("Provider type name cannot be empty"));
        }

        if constructor.capability() != capability_kind {
            return Err(AppError::CapabilityMismatch {
                type_name,
                required: capability_kind,
                actual: constructor.capability(),
            });
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.index.contains_key(&type_name) {
            tracing::warn!(type_name = %type_name, "Rejected duplicate provider registration");
            return Err(AppError::DuplicateProviderType(type_name));
        }

        let metadata = ProviderMetadata {
            type_name: type_name.clone(),
            description: description.into(),
            capability_kind,
            default_config_template,
            display_name: display_name.clone(),
            constructor,
        };

        let position = inner.entries.len();
        inner.entries.push(Arc::new(metadata));
        inner.index.insert(type_name.clone(), position);

        tracing::info!(
            type_name = %type_name,
            display_name = %display_name,
            capability = %capability_kind,
            "Registered provider adapter"
        );

        Ok(())
    }

    /// 根据类型名称查找提供商元数据
    ///
    /// ## 返回值
    /// - `Ok(Arc<ProviderMetadata>)`: 找到的元数据
    /// - `Err(AppError::UnknownProviderType)`: 类型名未注册
    pub fn lookup(&self, type_name: &str) -> AppResult<Arc<ProviderMetadata>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .index
            .get(type_name)
            .map(|&position| inner.entries[position].clone())
            .ok_or_else(|| AppError::UnknownProviderType(type_name.to_string()))
    }

    /// 获取所有已注册提供商的快照（按注册顺序）
    pub fn list_all(&self) -> Vec<Arc<ProviderMetadata>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
