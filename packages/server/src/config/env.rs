//! Environment variable overrides.

use super::{AppConfig, ConfigError, StoreBackend};

/// Variables read from the environment, applied over file values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub openai_api_key: Option<String>,
    pub chat_model: Option<String>,
    pub transcribe_model: Option<String>,
    pub tts_model: Option<String>,
    pub realtime_model: Option<String>,
    pub system_prompt: Option<String>,
    pub cors_allow_origin: Option<String>,
    pub owner_secret: Option<String>,
    pub global_daily_budget: Option<String>,
    pub redis_url: Option<String>,
}

impl EnvOverrides {
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            chat_model: get("CHAT_MODEL"),
            transcribe_model: get("TRANSCRIBE_MODEL"),
            tts_model: get("TTS_MODEL"),
            realtime_model: get("REALTIME_MODEL"),
            system_prompt: get("CONSIA_SYSTEM_PROMPT"),
            cors_allow_origin: get("CORS_ALLOW_ORIGIN"),
            owner_secret: get("CONSIA_OWNER_SECRET"),
            global_daily_budget: get("CONSIA_GLOBAL_DAILY_BUDGET"),
            redis_url: get("REDIS_URL"),
        }
    }

    pub fn apply(self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(key) = self.openai_api_key {
            config.provider.api_key = Some(key);
        }
        if let Some(model) = self.chat_model {
            config.provider.chat_model = model;
        }
        if let Some(model) = self.transcribe_model {
            config.provider.transcribe_model = model;
        }
        if let Some(model) = self.tts_model {
            config.provider.tts_model = model;
        }
        if let Some(model) = self.realtime_model {
            config.provider.realtime_model = model;
        }
        if let Some(prompt) = self.system_prompt {
            config.provider.system_prompt = prompt;
        }
        if let Some(origins) = self.cors_allow_origin {
            config.cors.allow_origins = origins
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        if let Some(secret) = self.owner_secret {
            config.auth.owner_secret = Some(secret);
        }
        if let Some(raw) = self.global_daily_budget {
            let budget = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: "CONSIA_GLOBAL_DAILY_BUDGET",
                    value: raw.clone(),
                })?;
            config.budget.global_daily = Some(budget);
        }
        if let Some(url) = self.redis_url {
            config.store.redis_url = Some(url);
            config.store.backend = StoreBackend::Redis;
        }
        Ok(())
    }
}
