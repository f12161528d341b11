use std::net::SocketAddr;
use std::path::PathBuf;

use crate::constants::*;
use crate::error::AppError;

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f64,
    pub connect_base_url: String,
    /// Instruction documents concatenated into the system prompt.
    pub instructions_paths: Vec<PathBuf>,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            AppError::Internal("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let bind_addr = env_or("COPILOT_BIND_ADDR", "127.0.0.1:11419")
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Internal(format!("Invalid COPILOT_BIND_ADDR: {e}")))?;

        let temperature = match std::env::var("OPENAI_TEMPERATURE") {
            Ok(raw) => raw
                .parse::<f64>()
                .map_err(|e| AppError::Internal(format!("Invalid OPENAI_TEMPERATURE: {e}")))?,
            Err(_) => DEFAULT_TEMPERATURE,
        };

        let instructions_paths = std::env::var("COPILOT_INSTRUCTIONS_PATH")
            .map(|raw| parse_paths(&raw))
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            model: env_or("OPENAI_MODEL", DEFAULT_MODEL),
            temperature,
            connect_base_url: env_or("CONNECTPLUS_BASE_URL", DEFAULT_CONNECT_BASE_URL),
            instructions_paths,
            log_filter: env_or("COPILOT_LOG", "connect_copilot=debug,info"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_paths_split_on_colon_and_skip_blanks() {
        let paths = parse_paths("docs/copilot.md: :docs/dataflow.md");
        assert_eq!(
            paths,
            vec![
                PathBuf::from("docs/copilot.md"),
                PathBuf::from("docs/dataflow.md")
            ]
        );
    }
}
