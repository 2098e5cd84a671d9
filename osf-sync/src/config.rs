use std::time::Duration;

use osf_core::paths::{self, DEFAULT_PROVIDER, DEFAULT_PROVIDERS};
use osf_core::{DEFAULT_BASE_URL, OsfError, OsfSession, SessionConfig};

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub known_providers: Vec<String>,
    pub default_provider: String,
    pub session: SessionConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            known_providers: DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            default_provider: DEFAULT_PROVIDER.to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to
    /// its value. Unset, empty and unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let known_providers = read("KNOWN_PROVIDERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.known_providers);
        let connect_timeout =
            read_secs(read("OSF_CONNECT_TIMEOUT_SECS")).unwrap_or(defaults.session.connect_timeout);
        let read_timeout = read_secs(read("OSF_READ_TIMEOUT_SECS"));

        Self {
            api_url: read("OSF_API_URL").unwrap_or(defaults.api_url),
            token: read("OSF_TOKEN"),
            known_providers,
            default_provider: read("OSF_DEFAULT_PROVIDER").unwrap_or(defaults.default_provider),
            session: SessionConfig {
                connect_timeout,
                read_timeout,
            },
        }
    }

    pub fn split_provider(&self, path: &str) -> (String, String) {
        paths::split_provider(path, &self.known_providers, &self.default_provider)
    }

    pub fn session(&self) -> Result<OsfSession, OsfError> {
        OsfSession::with_config(&self.api_url, self.token.clone(), self.session)
    }
}

fn read_secs(value: Option<String>) -> Option<Duration> {
    value?
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
