//! Settings sanitizer.
//!
//! Every admin write passes through here before it reaches storage. Absent
//! fields keep their current value; present fields are coerced into range
//! rather than rejected.

use serde::{Deserialize, Serialize};

use super::{DomainRedirectRule, RedirectCode, Settings, UnmappedBehavior, VALID_RETENTION_DAYS};

/// A list given either as one comma/newline separated string or as an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListInput {
    Text(String),
    Items(Vec<String>),
}

impl ListInput {
    fn entries(&self) -> Vec<&str> {
        match self {
            ListInput::Text(text) => text.split([',', '\n']).collect(),
            ListInput::Items(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Raw domain-redirect rule as submitted by an admin client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectRuleInput {
    #[serde(alias = "domain")]
    pub from_domain: String,
    pub target_url: String,
    #[serde(alias = "redirect_code")]
    pub status_code: Option<i64>,
    pub keep_path: Option<bool>,
    pub keep_query: Option<bool>,
}

/// Partial settings update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsInput {
    pub enabled: Option<bool>,
    pub logging_enabled: Option<bool>,
    pub excluded_subdomains: Option<ListInput>,
    pub aliased_domains: Option<ListInput>,
    pub unmapped_behavior: Option<String>,
    pub unmapped_redirect_code: Option<i64>,
    pub redirect_domains: Option<Vec<RedirectRuleInput>>,
    pub log_retention_days: Option<i64>,
}

impl From<&Settings> for SettingsInput {
    fn from(settings: &Settings) -> Self {
        Self {
            enabled: Some(settings.enabled),
            logging_enabled: Some(settings.logging_enabled),
            excluded_subdomains: Some(ListInput::Items(settings.excluded_subdomains.clone())),
            aliased_domains: Some(ListInput::Items(settings.aliased_domains.clone())),
            unmapped_behavior: Some(
                match settings.unmapped_behavior {
                    UnmappedBehavior::Redirect => "redirect",
                    UnmappedBehavior::Show => "show",
                }
                .to_string(),
            ),
            unmapped_redirect_code: Some(settings.unmapped_redirect_code.as_u16().into()),
            redirect_domains: Some(settings.redirect_domains.iter().map(RedirectRuleInput::from).collect()),
            log_retention_days: Some(settings.log_retention_days.into()),
        }
    }
}

impl From<&DomainRedirectRule> for RedirectRuleInput {
    fn from(rule: &DomainRedirectRule) -> Self {
        Self {
            from_domain: rule.from_domain.clone(),
            target_url: rule.target_url.clone(),
            status_code: Some(rule.status_code.as_u16().into()),
            keep_path: Some(rule.keep_path),
            keep_query: Some(rule.keep_query),
        }
    }
}

/// Apply `input` on top of `current`, coercing every present field.
pub fn sanitize_settings(input: &SettingsInput, current: &Settings) -> Settings {
    let mut out = current.clone();

    if let Some(enabled) = input.enabled {
        out.enabled = enabled;
    }
    if let Some(logging) = input.logging_enabled {
        out.logging_enabled = logging;
    }
    if let Some(list) = &input.excluded_subdomains {
        out.excluded_subdomains = dedup(list.entries().into_iter().map(sanitize_key));
    }
    if let Some(list) = &input.aliased_domains {
        out.aliased_domains = dedup(list.entries().into_iter().map(clean_domain));
    }
    if let Some(behavior) = &input.unmapped_behavior {
        out.unmapped_behavior = match behavior.trim().to_ascii_lowercase().as_str() {
            "redirect" => UnmappedBehavior::Redirect,
            _ => UnmappedBehavior::Show,
        };
    }
    if let Some(code) = input.unmapped_redirect_code {
        out.unmapped_redirect_code = RedirectCode::coerce(code, RedirectCode::Found);
    }
    if let Some(rules) = &input.redirect_domains {
        out.redirect_domains = rules.iter().filter_map(sanitize_rule).collect();
    }
    if let Some(days) = input.log_retention_days {
        out.log_retention_days = u32::try_from(days)
            .ok()
            .filter(|d| VALID_RETENTION_DAYS.contains(d))
            .unwrap_or(0);
    }

    out
}

/// Clean one rule, `None` when its domain or target is unusable.
pub fn sanitize_rule(input: &RedirectRuleInput) -> Option<DomainRedirectRule> {
    let from_domain = clean_domain(&input.from_domain);
    let target_url = clean_url(&input.target_url)?;
    if from_domain.is_empty() {
        return None;
    }

    Some(DomainRedirectRule {
        from_domain,
        target_url,
        status_code: input
            .status_code
            .map(|c| RedirectCode::coerce(c, RedirectCode::MovedPermanently))
            .unwrap_or_default(),
        keep_path: input.keep_path.unwrap_or(true),
        keep_query: input.keep_query.unwrap_or(true),
    })
}

/// Lowercase and drop every character outside `[a-z0-9_-]`.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Reduce `https://www.Example.org/` to `example.org`.
pub fn clean_domain(raw: &str) -> String {
    let mut domain = raw.trim();
    for scheme in ["https://", "http://"] {
        if domain.get(..scheme.len()).is_some_and(|p| p.eq_ignore_ascii_case(scheme)) {
            domain = &domain[scheme.len()..];
            break;
        }
    }
    let domain = domain.trim_end_matches('/');
    crate::routing::host::strip_www(domain).to_ascii_lowercase()
}

/// Absolute http(s) URL or nothing.
fn clean_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = url::Url::parse(raw).ok()?;
    let web = matches!(url.scheme(), "http" | "https") && url.host_str().is_some();
    web.then(|| raw.to_string())
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
