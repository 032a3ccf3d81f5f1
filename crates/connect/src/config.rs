//! Runtime configuration for linking and syncing.
//!
//! Configuration is an explicit value handed to services at construction.
//! Nothing in this crate reads the environment except [`ConnectConfig::from_env`].

use std::collections::HashMap;
use std::time::Duration;

use banklink_core::connections::BankProvider;
use log::warn;

use crate::oauth::OriginPolicy;

/// Default base URL of the banking backend.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Popup sizing and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupConfig {
    pub width: u32,
    pub height: u32,
    /// How often the popup is checked for user closure.
    pub poll_interval: Duration,
    /// Delay between a success message and closing the popup, so the
    /// provider's own completion page can render.
    pub success_close_delay: Duration,
    pub close_on_error: bool,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 700,
            poll_interval: Duration::from_millis(500),
            success_close_delay: Duration::from_millis(1000),
            close_on_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Origin of the page embedding the flow, e.g. `https://app.example.org`.
    pub app_origin: String,
    /// Root domain serving each provider's consent pages.
    pub provider_domains: HashMap<BankProvider, String>,
    pub popup: PopupConfig,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        let provider_domains = BankProvider::LINKABLE
            .iter()
            .filter_map(|provider| {
                default_provider_domain(*provider).map(|domain| (*provider, domain.to_string()))
            })
            .collect();
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            app_origin: "http://localhost:1420".to_string(),
            provider_domains,
            popup: PopupConfig::default(),
        }
    }
}

fn default_provider_domain(provider: BankProvider) -> Option<&'static str> {
    match provider {
        BankProvider::Manual => None,
        BankProvider::SaltEdge => Some("saltedge.com"),
        BankProvider::Tink => Some("tink.com"),
        BankProvider::Yapily => Some("yapily.com"),
        BankProvider::TrueLayer => Some("truelayer.com"),
    }
}

impl ConnectConfig {
    /// Loads `.env` if present, then reads `BANKLINK_*` variables over the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing keys keep their
    /// defaults; unparsable numbers fall back to defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = value("BANKLINK_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        config.api_token = value("BANKLINK_API_TOKEN");
        if let Some(origin) = value("BANKLINK_APP_ORIGIN") {
            config.app_origin = origin;
        }

        for provider in BankProvider::LINKABLE {
            let key = format!("BANKLINK_{}_DOMAIN", provider.as_str());
            if let Some(domain) = value(&key) {
                config.provider_domains.insert(provider, domain);
            }
        }

        let popup = &mut config.popup;
        popup.width = parse_or(value("BANKLINK_POPUP_WIDTH"), "BANKLINK_POPUP_WIDTH", popup.width);
        popup.height = parse_or(
            value("BANKLINK_POPUP_HEIGHT"),
            "BANKLINK_POPUP_HEIGHT",
            popup.height,
        );
        let poll_ms = parse_or(
            value("BANKLINK_POPUP_POLL_MS"),
            "BANKLINK_POPUP_POLL_MS",
            popup.poll_interval.as_millis() as u64,
        );
        // A zero interval would spin.
        popup.poll_interval = Duration::from_millis(poll_ms.max(1));
        let delay_ms = parse_or(
            value("BANKLINK_POPUP_CLOSE_DELAY_MS"),
            "BANKLINK_POPUP_CLOSE_DELAY_MS",
            popup.success_close_delay.as_millis() as u64,
        );
        popup.success_close_delay = Duration::from_millis(delay_ms);
        popup.close_on_error = parse_or(
            value("BANKLINK_POPUP_CLOSE_ON_ERROR"),
            "BANKLINK_POPUP_CLOSE_ON_ERROR",
            popup.close_on_error,
        );

        config
    }

    pub fn provider_domain(&self, provider: BankProvider) -> Option<&str> {
        self.provider_domains.get(&provider).map(String::as_str)
    }

    /// Origin policy for messages during a link flow with `provider`.
    ///
    /// A provider without a configured domain only trusts the app's own origin.
    pub fn origin_policy(&self, provider: BankProvider) -> OriginPolicy {
        OriginPolicy::new(&self.app_origin, self.provider_domain(provider).unwrap_or(""))
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ConnectConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.provider_domain(BankProvider::Tink), Some("tink.com"));
        assert_eq!(config.provider_domain(BankProvider::TrueLayer), Some("truelayer.com"));
        assert_eq!(config.provider_domain(BankProvider::Manual), None);
        assert_eq!(config.popup.poll_interval, Duration::from_millis(500));
        assert!(!config.popup.close_on_error);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ConnectConfig::from_lookup(lookup(&[
            ("BANKLINK_API_URL", "https://bank.example.org/"),
            ("BANKLINK_API_TOKEN", "secret"),
            ("BANKLINK_APP_ORIGIN", "https://app.example.org"),
            ("BANKLINK_TINK_DOMAIN", "tink.test"),
            ("BANKLINK_POPUP_WIDTH", "800"),
            ("BANKLINK_POPUP_POLL_MS", "250"),
            ("BANKLINK_POPUP_CLOSE_ON_ERROR", "true"),
        ]));

        assert_eq!(config.api_base_url, "https://bank.example.org");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.app_origin, "https://app.example.org");
        assert_eq!(config.provider_domain(BankProvider::Tink), Some("tink.test"));
        assert_eq!(config.provider_domain(BankProvider::Yapily), Some("yapily.com"));
        assert_eq!(config.popup.width, 800);
        assert_eq!(config.popup.height, 700);
        assert_eq!(config.popup.poll_interval, Duration::from_millis(250));
        assert!(config.popup.close_on_error);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = ConnectConfig::from_lookup(lookup(&[
            ("BANKLINK_POPUP_WIDTH", "wide"),
            ("BANKLINK_POPUP_POLL_MS", "0"),
            ("BANKLINK_POPUP_CLOSE_DELAY_MS", "-5"),
            ("BANKLINK_POPUP_CLOSE_ON_ERROR", "maybe"),
        ]));

        assert_eq!(config.popup.width, 600);
        assert_eq!(config.popup.poll_interval, Duration::from_millis(1));
        assert_eq!(config.popup.success_close_delay, Duration::from_millis(1000));
        assert!(!config.popup.close_on_error);
    }

    #[test]
    fn test_origin_policy_uses_provider_domain() {
        let config = ConnectConfig {
            app_origin: "https://app.example.org".to_string(),
            ..ConnectConfig::default()
        };
        let policy = config.origin_policy(BankProvider::SaltEdge);
        assert!(policy.is_trusted("https://www.saltedge.com"));
        assert!(!policy.is_trusted("https://tink.com"));
        assert!(policy.is_trusted("https://app.example.org"));

        let manual = config.origin_policy(BankProvider::Manual);
        assert!(!manual.is_trusted("https://www.saltedge.com"));
        assert!(manual.is_trusted("https://app.example.org"));
    }
}
