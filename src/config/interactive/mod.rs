#[cfg(test)]
mod tests;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, OllamaConfig};
use crate::embeddings::OllamaClient;

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Admissions Assistant Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for embeddings and answers.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_ollama_connection(&config.ollama) {
        Ok(()) => eprintln!("{}", style("✓ Ollama connection and models verified!").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style(format!("⚠ Warning: Ollama check failed: {:#}", e)).yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running with both models pulled before ingesting.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    for line in describe_config(&config) {
        eprintln!("{}", line);
    }

    Ok(())
}

/// Human-readable summary of the effective configuration
fn describe_config(config: &Config) -> Vec<String> {
    let mut lines = vec![
        style("📋 Current Configuration").bold().cyan().to_string(),
        String::new(),
        style("Ollama Settings:").bold().yellow().to_string(),
        format!("  Host: {}", style(&config.ollama.host).cyan()),
        format!("  Port: {}", style(config.ollama.port).cyan()),
        format!("  Embedding Model: {}", style(&config.ollama.embedding_model).cyan()),
        format!("  Chat Model: {}", style(&config.ollama.chat_model).cyan()),
        format!(
            "  Embedding Dimension: {}",
            style(config.ollama.embedding_dimension).cyan()
        ),
    ];

    match config.ollama_url() {
        Ok(url) => lines.push(format!("  Ollama URL: {}", style(url).cyan())),
        Err(e) => lines.push(format!("  Ollama URL: {} ({})", style("Invalid").red(), e)),
    }

    lines.extend([
        String::new(),
        style("Retrieval Settings:").bold().yellow().to_string(),
        format!(
            "  Semantic: threshold {} / limit {}",
            config.retrieval.semantic_threshold, config.retrieval.semantic_limit
        ),
        format!(
            "  Code: threshold {} / limit {}",
            config.retrieval.code_threshold, config.retrieval.code_limit
        ),
        format!("  Context Cap: {}", config.retrieval.context_cap),
        format!("  Ingest Batch Size: {}", config.ingest.batch_size),
        String::new(),
        format!(
            "Config file: {}",
            style(config.config_file_path().display()).dim()
        ),
    ]);

    lines
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Config::with_base_dir(config_dir)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.ollama_url().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(validate_model_name)
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(ollama.chat_model.clone())
        .validate_with(validate_model_name)
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 1 and 8192")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_chat_model(chat_model)?;
    ollama.set_embedding_dimension(embedding_dimension)?;

    Ok(())
}

fn validate_model_name(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<()> {
    OllamaClient::new(ollama)?
        .with_timeout(CONNECTION_TEST_TIMEOUT)
        .with_retry_attempts(1)
        .health_check()
}
