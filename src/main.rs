use std::{
    io::Write,
    path::PathBuf,
};

use ai_provider_engine::{
    AppError, ChatProvider, EmbeddingProvider, ProviderFactory, RerankProvider,
    config::{Config, LoggingConfig, ProviderEntry},
    load_config,
    providers::{CapabilityKind, ChatRequest, LLMResponse, ProviderInstance},
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line front end for the provider engine
#[derive(Parser, Debug)]
#[command(name = "ai-engine", version, about)]
struct Cli {
    /// Configuration file (TOML); AI_ENGINE_* variables override it
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered provider types
    Providers,
    /// List the models a chat instance reports
    Models { instance: String },
    /// Run the connectivity test of an instance
    Test {
        instance: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Send a chat prompt
    Chat {
        instance: String,
        prompt: String,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        stream: bool,
    },
    /// Embed one or more texts
    Embed {
        instance: String,
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Rerank documents against a query
    Rerank {
        instance: String,
        query: String,
        #[arg(required = true)]
        documents: Vec<String>,
        #[arg(long)]
        top_n: Option<usize>,
    },
}

/// 主函数 - 命令行入口
///
/// 负责解析命令行参数、加载配置、初始化日志系统并执行子命令
#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    // `providers` only reads the registry and works without a config file
    if let Command::Providers = cli.command {
        init_tracing(&LoggingConfig::default())?;
        return list_provider_types();
    }

    let config = load_config(&cli.config)
        .map_err(|e| AppError::ConfigError(format!("加载配置失败: {:#}", e)))?;

    init_tracing(&config.logging)?;

    tracing::info!(
        config = %cli.config.display(),
        providers_count = config.providers.len(),
        "Configuration loaded successfully"
    );

    run(cli.command, &config).await
}

async fn run(command: Command, config: &Config) -> Result<(), AppError> {
    match command {
        Command::Providers => list_provider_types(),
        Command::Models { instance } => {
            let provider = build(config, &instance, CapabilityKind::ChatCompletion)?.into_chat()?;
            for model in provider.list_models().await? {
                println!("{}", model);
            }
            Ok(())
        }
        Command::Test { instance, model } => {
            let entry = config.provider(&instance)?;
            let capability = ProviderFactory::global()?
                .registry()
                .lookup(&entry.type_name)?
                .capability_kind;
            let provider = build(config, &instance, capability)?;
            let model = model.as_deref();
            match &provider {
                ProviderInstance::Chat(p) => p.test(model).await?,
                ProviderInstance::Embedding(p) => p.test(model).await?,
                ProviderInstance::Rerank(p) => p.test(model).await?,
            }
            println!("{} ({}) is reachable", instance, provider.meta().type_name);
            Ok(())
        }
        Command::Chat {
            instance,
            prompt,
            system,
            stream,
        } => {
            let provider = build(config, &instance, CapabilityKind::ChatCompletion)?.into_chat()?;
            let mut request = ChatRequest::new(prompt);
            if let Some(system) = system {
                request = request.with_system_prompt(system);
            }
            chat(provider.as_ref(), request, stream).await
        }
        Command::Embed { instance, texts } => {
            let provider = build(config, &instance, CapabilityKind::Embedding)?.into_embedding()?;
            embed(provider.as_ref(), &texts, config).await
        }
        Command::Rerank {
            instance,
            query,
            documents,
            top_n,
        } => {
            let provider = build(config, &instance, CapabilityKind::Rerank)?.into_rerank()?;
            for result in provider.rerank(&query, &documents, top_n).await? {
                println!("{:.4}\t{}", result.relevance_score, documents[result.index]);
            }
            Ok(())
        }
    }
}

fn build(config: &Config, instance: &str, required: CapabilityKind) -> Result<ProviderInstance, AppError> {
    let ProviderEntry {
        type_name,
        connection,
        settings,
        ..
    } = config.provider(instance)?;

    ProviderFactory::global()?.create_from_maps(type_name, connection, settings, required)
}

fn list_provider_types() -> Result<(), AppError> {
    for metadata in ProviderFactory::global()?.registry().list_all() {
        println!(
            "{:<20} {:<16} {}",
            metadata.type_name, metadata.capability_kind, metadata.description
        );
    }
    Ok(())
}

async fn chat(provider: &dyn ChatProvider, request: ChatRequest, stream: bool) -> Result<(), AppError> {
    if !stream {
        let response = provider.chat(request).await?;
        if let Some(reasoning) = &response.reasoning_content {
            eprintln!("[reasoning] {}", reasoning);
        }
        println!("{}", response.content);
        for (id, name, args) in response.tool_calls() {
            println!("[tool call {}] {}({})", id, name, args);
        }
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    provider
        .stream_chat_realtime(request, &mut |chunk: LLMResponse| {
            if chunk.finished {
                let _ = writeln!(stdout);
            } else {
                let _ = write!(stdout, "{}", chunk.delta);
            }
            let _ = stdout.flush();
        })
        .await
}

async fn embed(provider: &dyn EmbeddingProvider, texts: &[String], config: &Config) -> Result<(), AppError> {
    let batch = &config.embedding;
    let vectors = provider
        .embed_batched(texts, batch.batch_size, batch.concurrency_limit, batch.max_retries)
        .await?;

    for (text, vector) in texts.iter().zip(&vectors) {
        let preview: Vec<String> = vector.iter().take(4).map(|v| format!("{:.4}", v)).collect();
        println!("{}\t[{}, ...] ({} dims)", text, preview.join(", "), vector.len());
    }
    Ok(())
}

/// 初始化结构化日志系统
///
/// 配置tracing和tracing-subscriber，支持：
/// - RUST_LOG环境变量控制日志级别（默认取配置中的level）
/// - json / pretty / compact 三种输出格式
/// - 日志写入stderr，不干扰stdout上的命令输出
fn init_tracing(logging: &LoggingConfig) -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ai_provider_engine={0},ai_engine={0}", logging.level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match logging.format.as_str() {
        "json" => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true).json())
            .try_init(),
        "pretty" => registry
            .with(fmt::layer().with_writer(std::io::stderr).pretty())
            .try_init(),
        _ => registry
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .try_init(),
    };

    result.map_err(|e| AppError::ConfigError(format!("Failed to initialize tracing: {}", e)))?;

    tracing::debug!("Structured logging system initialized");
    Ok(())
}
