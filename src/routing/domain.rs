//! Whole-domain redirect planning, shared by the pipeline and the early handler.

use crate::routing::context::RequestContext;
use crate::settings::{DomainRedirectRule, RedirectCode};

/// A domain redirect ready to be recorded and emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRedirectPlan {
    pub location: String,
    pub status: RedirectCode,
    /// Statistic/log key (`@domain`).
    pub key: String,
    /// Recorded target description.
    pub description: String,
}

/// First rule matching the request host, in list order.
pub fn find_domain_redirect<'a>(rules: &'a [DomainRedirectRule], host: &str) -> Option<&'a DomainRedirectRule> {
    rules.iter().find(|rule| rule.matches(host))
}

pub fn plan_domain_redirect(rule: &DomainRedirectRule, ctx: &RequestContext) -> DomainRedirectPlan {
    DomainRedirectPlan {
        location: rule.build_target(&ctx.path, ctx.query.as_deref()),
        status: rule.status_code,
        key: rule.stat_key(),
        description: format!("→ {}", rule.target_url),
    }
}
