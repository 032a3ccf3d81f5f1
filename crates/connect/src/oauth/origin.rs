//! Origin validation for cross-window messages.

use url::Url;

/// Decides which message origins may drive the OAuth flow.
///
/// A message is trusted when its origin equals the embedding page's origin,
/// or its hostname is the provider root domain or a dot-qualified subdomain
/// of it. Hostnames that merely contain the domain (`evilprovider.com`) are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    app_origin: Option<String>,
    provider_domain: String,
}

impl OriginPolicy {
    pub fn new(app_origin: &str, provider_domain: &str) -> Self {
        Self {
            app_origin: normalize_origin(app_origin),
            provider_domain: normalize_domain(provider_domain),
        }
    }

    pub fn provider_domain(&self) -> &str {
        &self.provider_domain
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        let Ok(url) = Url::parse(origin.trim()) else {
            return false;
        };

        let serialized = url.origin().ascii_serialization();
        if self.app_origin.as_deref() == Some(serialized.as_str()) {
            return true;
        }

        if self.provider_domain.is_empty() {
            return false;
        }
        match url.host_str() {
            Some(host) => {
                host == self.provider_domain
                    || host
                        .strip_suffix(self.provider_domain.as_str())
                        .map(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
                        .unwrap_or(false)
            }
            None => false,
        }
    }
}

/// Scheme + host + port as browsers serialize it; `None` for opaque origins.
fn normalize_origin(origin: &str) -> Option<String> {
    let url = Url::parse(origin.trim()).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_matches('.')
        .to_ascii_lowercase()
}
