use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = load_existing_config(temp_dir.path());

    assert_eq!(config, Config::with_base_dir(temp_dir.path()));
}

#[test]
fn load_existing_config_ignores_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "[ollama\n").expect("should write");

    let config = load_existing_config(temp_dir.path());

    assert_eq!(config.ollama, OllamaConfig::default());
}

#[test]
fn describe_config_lists_models_and_file() {
    let config = Config::with_base_dir("/etc/admissions-rag");

    let text = describe_config(&config).join("\n");

    assert!(text.contains(&config.ollama.embedding_model));
    assert!(text.contains(&config.ollama.chat_model));
    assert!(text.contains("config.toml"));
    assert!(text.contains("Context Cap: 12"));
}

#[test]
fn model_names_must_not_be_blank() {
    assert!(validate_model_name(&"  ".to_string()).is_err());
    assert!(validate_model_name(&"bge-m3:latest".to_string()).is_ok());
}

#[test]
fn connection_test_fails_without_server() {
    let ollama = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        ..OllamaConfig::default()
    };

    assert!(test_ollama_connection(&ollama).is_err());
}
