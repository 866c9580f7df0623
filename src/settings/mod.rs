//! Per-tenant runtime settings.
//!
//! # Data Flow
//! ```text
//! admin write (SettingsInput)
//!     → sanitize.rs (coerce, clean, drop invalid rules)
//!     → store.rs (JSON blob in {prefix}options, cache invalidated)
//!
//! request
//!     → store.rs (cached Arc<Settings>)
//!     → routing pipeline (read-only)
//! ```
//!
//! # Design Decisions
//! - One JSON blob per tenant holds the general settings and the ordered
//!   domain-redirect rule list
//! - Reads are lenient: unknown status codes fall back to safe defaults
//!   instead of failing the whole blob

pub mod sanitize;
pub mod store;

use serde::{Deserialize, Deserializer, Serialize};

use crate::routing::host::{self, DEFAULT_EXCLUDED_SUBDOMAINS};

pub use sanitize::{sanitize_settings, ListInput, RedirectRuleInput, SettingsInput};
pub use store::{SettingsCache, SettingsError, SettingsStore};

/// Option name of the settings blob in the options table.
pub const SETTINGS_OPTION: &str = "settings";

/// Log retention periods the admin surface accepts, in days (0 = keep forever).
pub const VALID_RETENTION_DAYS: [u32; 8] = [0, 7, 14, 30, 60, 90, 180, 365];

/// HTTP status used for a redirect.
///
/// 301/308 are permanent and cacheable, 302/307 temporary.
/// 307/308 preserve the request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "u16")]
pub enum RedirectCode {
    #[default]
    MovedPermanently,
    Found,
    TemporaryRedirect,
    PermanentRedirect,
}

impl RedirectCode {
    /// Parse a numeric status code, `None` if it is not a redirect we emit.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            301 => Some(Self::MovedPermanently),
            302 => Some(Self::Found),
            307 => Some(Self::TemporaryRedirect),
            308 => Some(Self::PermanentRedirect),
            _ => None,
        }
    }

    /// Parse `code`, substituting `fallback` for anything unrecognized.
    pub fn coerce(code: impl TryInto<u16>, fallback: Self) -> Self {
        code.try_into().ok().and_then(Self::from_u16).unwrap_or(fallback)
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::MovedPermanently => 301,
            Self::Found => 302,
            Self::TemporaryRedirect => 307,
            Self::PermanentRedirect => 308,
        }
    }
}

impl From<RedirectCode> for u16 {
    fn from(code: RedirectCode) -> Self {
        code.as_u16()
    }
}

impl<'de> Deserialize<'de> for RedirectCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(Self::coerce(raw, Self::MovedPermanently))
    }
}

fn unmapped_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RedirectCode, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    Ok(RedirectCode::coerce(raw, RedirectCode::Found))
}

/// What to do with a subdomain that has neither a mapping nor matching content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedBehavior {
    Redirect,
    #[default]
    #[serde(other)]
    Show,
}

/// Whole-domain forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRedirectRule {
    #[serde(alias = "domain")]
    pub from_domain: String,
    pub target_url: String,
    #[serde(default, alias = "redirect_code")]
    pub status_code: RedirectCode,
    #[serde(default = "default_true")]
    pub keep_path: bool,
    #[serde(default = "default_true")]
    pub keep_query: bool,
}

fn default_true() -> bool {
    true
}

impl DomainRedirectRule {
    /// The rule's domain, lowercased and without `www.`.
    pub fn normalized_domain(&self) -> String {
        host::normalize_host(&self.from_domain)
    }

    /// Statistics/log key for this rule: `@` + normalized domain.
    pub fn stat_key(&self) -> String {
        format!("@{}", self.normalized_domain())
    }

    /// Whether the rule forwards onto its own domain.
    ///
    /// Such a rule would loop forever, so it never matches.
    pub fn targets_itself(&self) -> bool {
        url::Url::parse(&self.target_url)
            .ok()
            .and_then(|u| u.host_str().map(host::normalize_host))
            .is_some_and(|target| target == self.normalized_domain())
    }

    /// Returns true if `host` (raw Host header) is this rule's domain,
    /// with or without `www.`.
    pub fn matches(&self, host: &str) -> bool {
        let from = self.normalized_domain();
        !from.is_empty()
            && !self.target_url.is_empty()
            && host::normalize_host(host) == from
            && !self.targets_itself()
    }

    /// Build the redirect location for a request path and query string.
    pub fn build_target(&self, path: &str, query: Option<&str>) -> String {
        let mut target = self.target_url.clone();

        if self.keep_path && !path.is_empty() && path != "/" {
            target = format!("{}{}", target.trim_end_matches('/'), path);
        }

        if self.keep_query {
            if let Some(query) = query.filter(|q| !q.is_empty()) {
                target.push(if target.contains('?') { '&' } else { '?' });
                target.push_str(query);
            }
        }

        target
    }
}

/// The full settings blob of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub logging_enabled: bool,
    pub excluded_subdomains: Vec<String>,
    pub aliased_domains: Vec<String>,
    pub unmapped_behavior: UnmappedBehavior,
    #[serde(deserialize_with = "unmapped_code")]
    pub unmapped_redirect_code: RedirectCode,
    pub redirect_domains: Vec<DomainRedirectRule>,
    pub log_retention_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            logging_enabled: false,
            excluded_subdomains: DEFAULT_EXCLUDED_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            aliased_domains: Vec::new(),
            unmapped_behavior: UnmappedBehavior::Show,
            unmapped_redirect_code: RedirectCode::Found,
            redirect_domains: Vec::new(),
            log_retention_days: 0,
        }
    }
}
