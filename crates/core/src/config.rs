use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f32(profile: &str, key: &str, default: f32) -> f32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `DEEPTHINK_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("DEEPTHINK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Model identifier of the active provider.
    pub fn active_model(&self) -> &str {
        match self.llm.provider.as_str() {
            "openai" => &self.llm.openai_model,
            "anthropic" | "claude" => &self.llm.anthropic_model,
            "ollama" => &self.ollama.model,
            _ => &self.llm.mistral_model,
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}, cors_origin={}", self.server.host, self.server.port, self.server.cors_origin);
        tracing::info!(
            "  llm:         provider={}, model={}, temperature={}, configured={}",
            self.llm.provider,
            self.active_model(),
            self.llm.temperature,
            self.llm.is_configured()
        );
        if self.llm.provider == "ollama" {
            tracing::info!("  ollama:      url={}", self.ollama.url);
        }
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "llm": {
                "provider": self.llm.provider,
                "model": self.active_model(),
                "configured": self.llm.is_configured(),
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origin; `*` allows any.
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 5001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "http://localhost:4200"),
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "mistral", "openai", "anthropic", "ollama"
    pub provider: String,
    pub mistral_api_key: Option<String>,
    pub mistral_model: String,
    pub mistral_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "mistral").to_lowercase(),
            mistral_api_key: profiled_env_opt(p, "MISTRAL_API_KEY"),
            mistral_model: profiled_env_or(p, "MISTRAL_MODEL", "mistral-tiny"),
            mistral_base_url: profiled_env_or(p, "MISTRAL_BASE_URL", "https://api.mistral.ai"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            temperature: profiled_env_f32(p, "LLM_TEMPERATURE", 0.0),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "mistral" => self.mistral_api_key.is_some(),
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own profile prefix so parallel tests never share keys.

    #[test]
    fn profiled_key_wins_over_plain_key() {
        env::set_var("CFGTESTA_PORT", "6100");
        env::set_var("CFGTESTA_LLM_PROVIDER", "Ollama");
        env::set_var("CFGTESTA_OLLAMA_MODEL", "qwen2.5");

        let config = Config::for_profile("cfgtesta");
        assert_eq!(config.profile, "CFGTESTA");
        assert_eq!(config.server.port, 6100);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.active_model(), "qwen2.5");
        assert!(config.llm.is_configured());
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        env::set_var("CFGTESTB_LLM_TEMPERATURE", "warm");
        env::set_var("CFGTESTB_LLM_MAX_TOKENS", "-3");

        assert_eq!(profiled_env_f32("CFGTESTB", "LLM_TEMPERATURE", 0.0), 0.0);
        assert_eq!(profiled_env_u32("CFGTESTB", "LLM_MAX_TOKENS", 4096), 4096);
    }

    #[test]
    fn empty_values_are_treated_as_unset() {
        env::set_var("CFGTESTC_MISTRAL_API_KEY", "");
        assert_eq!(env_opt("CFGTESTC_MISTRAL_API_KEY"), None);
    }

    #[test]
    fn provider_without_key_is_not_configured() {
        let llm = LlmConfig {
            provider: "mistral".into(),
            mistral_api_key: None,
            mistral_model: "mistral-tiny".into(),
            mistral_base_url: "https://api.mistral.ai".into(),
            openai_api_key: None,
            openai_model: "gpt-4o".into(),
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_model: "claude".into(),
            temperature: 0.0,
            max_tokens: 4096,
        };
        assert!(!llm.is_configured());
        assert!(!LlmConfig { provider: "bard".into(), ..llm }.is_configured());
    }

    #[test]
    fn redacted_summary_has_no_secrets() {
        env::set_var("CFGTESTD_MISTRAL_API_KEY", "sk-secret-value");
        let config = Config::for_profile("cfgtestd");
        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("sk-secret-value"));
        assert_eq!(config.redacted_summary()["profile"], "CFGTESTD");
    }
}
