use std::collections::HashMap;

use figment::Jail;
use serde_json::json;

use ai_provider_engine::config::*;

// Helper function to create a valid config for testing
fn create_valid_config() -> Config {
    let mut providers = HashMap::new();
    providers.insert(
        "main".to_string(),
        ProviderEntry {
            type_name: "openai".to_string(),
            connection: HashMap::from([
                ("api_key".to_string(), json!("sk-test")),
                ("base_url".to_string(), json!("https://api.example.com/v1")),
                ("timeout".to_string(), json!(30)),
                ("max_retries".to_string(), json!(2)),
            ]),
            settings: HashMap::from([("model".to_string(), json!("gpt-4o-mini"))]),
            enabled: true,
        },
    );

    Config {
        logging: LoggingConfig::default(),
        providers,
        embedding: EmbeddingBatchConfig::default(),
    }
}

const SAMPLE_CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"

[providers.main]
type = "openai"

[providers.main.connection]
api_key = "sk-file"
base_url = "https://api.example.com/v1"
timeout = 30

[providers.main.settings]
model = "gpt-4o-mini"
temperature = 0.3

[providers.embedder]
type = "openai_embedding"

[providers.embedder.connection]
model = "text-embedding-3-large"
dimensions = 1024

[providers.old]
type = "openai"
enabled = false
"#;

#[test]
fn test_load_config_from_file() {
    Jail::expect_with(|jail| {
        jail.create_file("engine.toml", SAMPLE_CONFIG)?;

        let config = load_config("engine.toml").map_err(|e| format!("{:#}", e))?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.providers.len(), 3);

        let main = &config.providers["main"];
        assert_eq!(main.type_name, "openai");
        assert_eq!(main.connection["api_key"], json!("sk-file"));
        assert_eq!(main.connection["timeout"], json!(30));
        assert_eq!(main.settings["model"], json!("gpt-4o-mini"));
        assert!(main.enabled);

        let embedder = &config.providers["embedder"];
        assert_eq!(embedder.connection["dimensions"], json!(1024));

        // Defaults for the omitted section
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.embedding.concurrency_limit, 4);
        assert_eq!(config.embedding.max_retries, 3);
        Ok(())
    });
}

#[test]
fn test_env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("engine.toml", SAMPLE_CONFIG)?;
        jail.set_env("AI_ENGINE_PROVIDERS__MAIN__CONNECTION__API_KEY", "sk-env");
        jail.set_env("AI_ENGINE_EMBEDDING__BATCH_SIZE", "32");
        jail.set_env("AI_ENGINE_LOGGING__LEVEL", "warn");

        let config = load_config("engine.toml").map_err(|e| format!("{:#}", e))?;

        assert_eq!(config.providers["main"].connection["api_key"], json!("sk-env"));
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.logging.level, "warn");
        Ok(())
    });
}

#[test]
fn test_config_from_env_only() {
    Jail::expect_with(|jail| {
        jail.set_env("AI_ENGINE_PROVIDERS__ONLY__TYPE", "rerank_api");

        let config = load_config("missing.toml").map_err(|e| format!("{:#}", e))?;
        assert_eq!(config.providers["only"].type_name, "rerank_api");
        assert!(config.providers["only"].connection.is_empty());
        Ok(())
    });
}

#[test]
fn test_load_config_rejects_invalid_values() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "engine.toml",
            r#"
            [providers.main]
            type = "openai"

            [providers.main.connection]
            timeout = 0
            "#,
        )?;

        let err = load_config("engine.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("timeout"));
        Ok(())
    });
}

#[test]
fn test_load_config_requires_providers() {
    Jail::expect_with(|jail| {
        jail.create_file("engine.toml", "[logging]\nlevel = \"info\"\n")?;

        let err = load_config("engine.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("At least one provider"));
        Ok(())
    });
}

#[test]
fn test_config_validation_valid() {
    let config = create_valid_config();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_bad_base_url() {
    let mut config = create_valid_config();
    config
        .providers
        .get_mut("main")
        .unwrap()
        .connection
        .insert("base_url".to_string(), json!("api.example.com"));

    let err = config.validate().unwrap_err();
    assert!(format!("{:#}", err).contains("http://"));
}

#[test]
fn test_config_validation_limits() {
    let mut config = create_valid_config();
    let main = config.providers.get_mut("main").unwrap();
    main.connection.insert("timeout".to_string(), json!(601));
    assert!(config.validate().is_err());

    let mut config = create_valid_config();
    let main = config.providers.get_mut("main").unwrap();
    main.connection.insert("max_retries".to_string(), json!(11));
    assert!(config.validate().is_err());

    let mut config = create_valid_config();
    config.providers.get_mut("main").unwrap().type_name.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_logging_validation() {
    let mut logging = LoggingConfig::default();
    assert!(logging.validate().is_ok());

    logging.level = "verbose".to_string();
    assert!(logging.validate().is_err());

    logging.level = "trace".to_string();
    logging.format = "xml".to_string();
    assert!(logging.validate().is_err());
}

#[test]
fn test_embedding_validation() {
    let mut embedding = EmbeddingBatchConfig::default();
    assert!(embedding.validate().is_ok());

    embedding.batch_size = 0;
    assert!(embedding.validate().is_err());
}

#[test]
fn test_provider_lookup() {
    let mut config = create_valid_config();
    config.providers.insert(
        "disabled".to_string(),
        ProviderEntry {
            type_name: "openai".to_string(),
            connection: HashMap::new(),
            settings: HashMap::new(),
            enabled: false,
        },
    );

    assert!(config.provider("main").is_ok());
    assert!(format!("{}", config.provider("disabled").unwrap_err()).contains("disabled"));
    assert!(format!("{}", config.provider("absent").unwrap_err()).contains("not configured"));
    assert_eq!(config.provider_names(), vec!["disabled", "main"]);
}
