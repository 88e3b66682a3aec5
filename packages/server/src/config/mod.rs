//! Server configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional YAML file,
//! `.env` (via `dotenvy`), then process environment variables.
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8080
//! cors:
//!   allow_origins: ["https://app.consia.example"]
//! auth:
//!   owner_secret: "change-me"
//!   devices:
//!     - id: "kiosk"
//!       secret: "device-secret"
//!       plan: PRO
//!   hmac_clients:
//!     - id: "billing"
//!       secret: "shared-secret"
//!       plan: BUSINESS
//!   freshness_window_secs: 300
//!   anonymous:
//!     allowed: true
//!     plan: FREE
//! plans:
//!   FREE: { max_requests: 100, max_ai_calls: 50, max_spend: 0.5 }
//! budget:
//!   global_daily: 25.0
//! rooms:
//!   relay_mode: others
//!   max_members: 50
//! store:
//!   backend: redis
//!   redis_url: "redis://127.0.0.1/"
//! ```

mod env;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    domain::{Money, PlanLimitTable, PlanLimits, PlanTier, Pricing, RelayMode},
    infrastructure::{OpenAiSettings, RoomHubSettings},
    usecase::{AiSettings, DEFAULT_SYSTEM_PROMPT},
};

pub use env::EnvOverrides;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerSection,
    pub cors: CorsSection,
    pub auth: AuthSection,
    /// Plans missing here fall back to the built-in table entry
    pub plans: HashMap<PlanTier, PlanLimits>,
    pub budget: BudgetSection,
    pub pricing: Pricing,
    pub provider: ProviderSection,
    pub rooms: RoomsSection,
    pub rate_limit: RateLimitSection,
    pub idempotency: IdempotencySection,
    pub audit: AuditSection,
    pub usage: UsageSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsSection {
    /// `*` allows any origin
    pub allow_origins: Vec<String>,
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
        }
    }
}

/// A caller that authenticates with a static secret or an HMAC key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientCredential {
    pub id: String,
    pub secret: String,
    #[serde(default)]
    pub plan: PlanTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnonymousPolicy {
    /// When false, protected routes answer 401 without credentials
    pub allowed: bool,
    pub plan: PlanTier,
}

impl Default for AnonymousPolicy {
    fn default() -> Self {
        Self {
            allowed: false,
            plan: PlanTier::Free,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    pub owner_secret: Option<String>,
    pub devices: Vec<ClientCredential>,
    pub hmac_clients: Vec<ClientCredential>,
    /// Accepted clock skew of signed requests
    pub freshness_window_secs: u64,
    pub anonymous: AnonymousPolicy,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            owner_secret: None,
            devices: Vec::new(),
            hmac_clients: Vec::new(),
            freshness_window_secs: 300,
            anonymous: AnonymousPolicy::default(),
        }
    }
}

impl AuthSection {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetSection {
    /// Aggregate daily spend cap across every identity
    pub global_daily: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub transcribe_model: String,
    pub tts_model: String,
    pub realtime_model: String,
    pub voice: String,
    pub tts_format: String,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        let ai = AiSettings::default();
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: ai.chat_model,
            transcribe_model: "gpt-4o-mini-transcribe".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            realtime_model: ai.realtime_model,
            voice: ai.voice,
            tts_format: ai.tts_format,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout_secs: ai.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoomsSection {
    pub max_name_len: usize,
    /// `None` leaves rooms unbounded
    pub max_members: Option<usize>,
    pub relay_mode: RelayMode,
    pub ping_interval_secs: u64,
}

impl Default for RoomsSection {
    fn default() -> Self {
        Self {
            max_name_len: crate::domain::value_object::DEFAULT_ROOM_NAME_MAX_LEN,
            max_members: None,
            relay_mode: RelayMode::Others,
            ping_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    /// Per identity; 0 disables the limiter
    pub requests_per_minute: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdempotencySection {
    pub ttl_secs: u64,
    pub capacity: u64,
}

impl Default for IdempotencySection {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    /// Oldest entries beyond this count are trimmed
    pub max_entries: usize,
    /// Entries included in `/admin/metrics`
    pub recent_in_metrics: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            recent_in_metrics: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsageSection {
    pub retention_days: u64,
}

impl Default for UsageSection {
    fn default() -> Self {
        Self { retention_days: 14 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    /// Prefix of every Redis key
    pub namespace: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
            namespace: "consia".to_string(),
        }
    }
}

/// Finite and non-negative
fn is_amount(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl AppConfig {
    /// Load defaults, then `path` if given, then `.env` and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(dotenv) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", dotenv.display());
        }
        EnvOverrides::from_process().apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if let Some(secret) = &self.auth.owner_secret
            && secret.trim().is_empty()
        {
            return invalid("auth.owner_secret must not be empty");
        }
        for credential in self.auth.devices.iter().chain(&self.auth.hmac_clients) {
            if credential.id.trim().is_empty() || credential.secret.is_empty() {
                return invalid("auth credentials need a non-empty id and secret");
            }
        }
        if self.auth.freshness_window_secs == 0 {
            return invalid("auth.freshness_window_secs must be positive");
        }

        for (tier, limits) in &self.plans {
            if limits.max_spend.is_some_and(|spend| !is_amount(spend)) {
                return Err(ConfigError::Invalid(format!(
                    "plans.{tier}.max_spend must be a non-negative number"
                )));
            }
        }
        if self
            .budget
            .global_daily
            .is_some_and(|budget| !is_amount(budget))
        {
            return invalid("budget.global_daily must be a non-negative number");
        }

        let prices = [
            self.pricing.per_1k_tokens,
            self.pricing.completion_estimate,
            self.pricing.per_voice_session,
            self.pricing.per_1k_tts_chars,
            self.pricing.per_transcription,
        ];
        if !prices.into_iter().all(is_amount) {
            return invalid("pricing values must be non-negative numbers");
        }

        if self.provider.timeout_secs == 0 {
            return invalid("provider.timeout_secs must be positive");
        }
        if self.rooms.max_name_len == 0 {
            return invalid("rooms.max_name_len must be positive");
        }
        if self.rooms.max_members == Some(0) {
            return invalid("rooms.max_members must be positive when set");
        }
        if self.rooms.ping_interval_secs == 0 {
            return invalid("rooms.ping_interval_secs must be positive");
        }
        if self.idempotency.ttl_secs == 0 || self.idempotency.capacity == 0 {
            return invalid("idempotency.ttl_secs and idempotency.capacity must be positive");
        }
        if self.audit.max_entries == 0 {
            return invalid("audit.max_entries must be positive");
        }
        if self.usage.retention_days == 0 {
            return invalid("usage.retention_days must be positive");
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return invalid("store.redis_url is required for the redis backend");
        }
        Ok(())
    }

    /// Built-in limits overlaid with the configured plans
    pub fn plan_table(&self) -> PlanLimitTable {
        let defaults = PlanLimitTable::default();
        let limits = PlanTier::ALL
            .into_iter()
            .map(|tier| {
                let limits = self
                    .plans
                    .get(&tier)
                    .cloned()
                    .unwrap_or_else(|| defaults.limits_for(tier));
                (tier, limits)
            })
            .collect();
        PlanLimitTable::new(limits)
    }

    pub fn global_budget(&self) -> Option<Money> {
        self.budget.global_daily.map(Money::from_units)
    }

    pub fn ai_settings(&self) -> AiSettings {
        AiSettings {
            chat_model: self.provider.chat_model.clone(),
            realtime_model: self.provider.realtime_model.clone(),
            voice: self.provider.voice.clone(),
            tts_format: self.provider.tts_format.clone(),
            system_prompt: self.provider.system_prompt.clone(),
            timeout: Duration::from_secs(self.provider.timeout_secs),
        }
    }

    pub fn openai_settings(&self) -> OpenAiSettings {
        OpenAiSettings {
            base_url: self.provider.base_url.clone(),
            api_key: self.provider.api_key.clone(),
            transcribe_model: self.provider.transcribe_model.clone(),
            tts_model: self.provider.tts_model.clone(),
            timeout: Duration::from_secs(self.provider.timeout_secs),
        }
    }

    pub fn room_hub_settings(&self) -> RoomHubSettings {
        RoomHubSettings {
            relay_mode: self.rooms.relay_mode,
            capacity: self.rooms.max_members,
        }
    }

    pub fn usage_retention(&self) -> Duration {
        Duration::from_secs(self.usage.retention_days * 24 * 3600)
    }
}
