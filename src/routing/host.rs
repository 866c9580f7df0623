//! Host header parsing and subdomain detection.
//!
//! # Responsibilities
//! - Normalize the Host header (port stripped, case folded, `www.` handling)
//! - Match a host against the ordered list of base/alias domains
//! - Extract and validate the subdomain label
//!
//! # Design Decisions
//! - Matching is case-insensitive (RFC 4343), labels are returned lowercase
//! - Exclusions are compared case-sensitively against the configured list
//! - Domain order is preserved: the first structurally matching domain wins
//! - No regex: the label grammar is simple enough to check byte by byte

/// Subdomains that are never routed unless the operator overrides the list.
pub const DEFAULT_EXCLUDED_SUBDOMAINS: [&str; 5] = ["www", "mail", "ftp", "cpanel", "webmail"];

/// Strip a `:port` suffix (everything after the first colon).
pub fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or_default()
}

/// Strip a leading `www.` (case-insensitive).
pub fn strip_www(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => &host[4..],
        _ => host,
    }
}

/// Lowercase, port-free, `www.`-free form used for whole-domain comparisons.
pub fn normalize_host(host: &str) -> String {
    strip_www(strip_port(host.trim())).to_ascii_lowercase()
}

/// Returns true if `label` is a single DNS label made of `[a-z0-9-]`
/// that neither starts nor ends with a hyphen.
pub fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    edge_ok(bytes[0])
        && edge_ok(bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Build the ordered candidate list: main domain first, then aliases.
///
/// Each entry has its `www.` prefix removed; empty and duplicate entries are
/// dropped without disturbing the configured order.
pub fn valid_domains<'a>(main_domain: &'a str, aliases: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    let candidates = std::iter::once(main_domain).chain(aliases.into_iter().map(String::as_str));
    for candidate in candidates {
        let domain = strip_www(candidate.trim()).to_ascii_lowercase();
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

/// Detect the subdomain label of `host` relative to `valid_domains`.
///
/// Returns `None` for the bare domain, its `www.` form, hosts that belong to
/// none of the domains, multi-label prefixes and excluded labels.
pub fn detect_subdomain(host: &str, valid_domains: &[String], excluded: &[String]) -> Option<String> {
    let host = strip_port(host.trim());
    if host.is_empty() {
        return None;
    }

    for domain in valid_domains {
        if host.eq_ignore_ascii_case(domain) || host.eq_ignore_ascii_case(&format!("www.{domain}")) {
            continue;
        }

        let Some(label) = label_before(host, domain) else {
            continue;
        };

        if excluded.iter().any(|e| e == &label) {
            return None;
        }
        return Some(label);
    }

    None
}

/// Returns the lowercased label if `host` is exactly `<label>.<domain>`.
fn label_before(host: &str, domain: &str) -> Option<String> {
    let split = host.len().checked_sub(domain.len() + 1)?;
    if !host.is_char_boundary(split) {
        return None;
    }
    let (label, rest) = host.split_at(split);
    let suffix = rest.strip_prefix('.')?;
    if !suffix.eq_ignore_ascii_case(domain) {
        return None;
    }
    let label = label.to_ascii_lowercase();
    is_valid_label(&label).then_some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    fn default_excluded() -> Vec<String> {
        DEFAULT_EXCLUDED_SUBDOMAINS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detects_simple_label() {
        let d = domains(&["example.com"]);
        assert_eq!(
            detect_subdomain("tickets.example.com", &d, &default_excluded()),
            Some("tickets".to_string())
        );
    }

    #[test]
    fn test_label_is_case_folded_and_port_stripped() {
        let d = domains(&["example.com"]);
        assert_eq!(
            detect_subdomain("Tickets.EXAMPLE.com:8080", &d, &default_excluded()),
            Some("tickets".to_string())
        );
    }

    #[test]
    fn test_bare_and_www_hosts_have_no_subdomain() {
        let d = domains(&["example.com"]);
        assert_eq!(detect_subdomain("example.com", &d, &default_excluded()), None);
        assert_eq!(detect_subdomain("www.example.com", &d, &default_excluded()), None);
        assert_eq!(detect_subdomain("", &d, &default_excluded()), None);
    }

    #[test]
    fn test_excluded_labels_are_ignored() {
        let d = domains(&["example.com"]);
        for label in DEFAULT_EXCLUDED_SUBDOMAINS {
            let host = format!("{label}.example.com");
            assert_eq!(detect_subdomain(&host, &d, &default_excluded()), None, "{host}");
        }
        // Exclusions compare against the configured list exactly.
        let custom = vec!["shop".to_string()];
        assert_eq!(detect_subdomain("shop.example.com", &d, &custom), None);
        assert_eq!(
            detect_subdomain("mail.example.com", &d, &custom),
            Some("mail".to_string())
        );
    }

    #[test]
    fn test_rejects_malformed_labels_and_foreign_hosts() {
        let d = domains(&["example.com"]);
        let ex = default_excluded();
        assert_eq!(detect_subdomain("-bad.example.com", &d, &ex), None);
        assert_eq!(detect_subdomain("bad-.example.com", &d, &ex), None);
        assert_eq!(detect_subdomain("a.b.example.com", &d, &ex), None);
        assert_eq!(detect_subdomain("tickets.other.com", &d, &ex), None);
        assert_eq!(detect_subdomain("ticketsexample.com", &d, &ex), None);
        assert_eq!(detect_subdomain("my-shop2.example.com", &d, &ex), Some("my-shop2".into()));
    }

    #[test]
    fn test_alias_domains_in_configured_order() {
        let aliases = vec!["www.example.org".to_string(), "example.net".to_string()];
        let d = valid_domains("example.com", &aliases);
        assert_eq!(d, domains(&["example.com", "example.org", "example.net"]));

        let ex = default_excluded();
        assert_eq!(detect_subdomain("promo.example.org", &d, &ex), Some("promo".into()));
        assert_eq!(detect_subdomain("promo.example.net", &d, &ex), Some("promo".into()));
        assert_eq!(detect_subdomain("www.example.net", &d, &ex), None);
    }

    #[test]
    fn test_first_structural_match_wins() {
        // "shop.example.com" is both <shop>.example.com and the bare alias;
        // the earlier entry decides.
        let d = domains(&["example.com", "shop.example.com"]);
        assert_eq!(
            detect_subdomain("shop.example.com", &d, &[]),
            Some("shop".to_string())
        );

        let d = domains(&["shop.example.com", "example.com"]);
        assert_eq!(detect_subdomain("shop.example.com", &d, &[]), Some("shop".to_string()));
    }

    #[test]
    fn test_valid_domains_dedupes() {
        let aliases = vec!["EXAMPLE.com".to_string(), String::new()];
        assert_eq!(valid_domains("www.example.com", &aliases), domains(&["example.com"]));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("WWW.Example.org:443"), "example.org");
        assert_eq!(normalize_host("example.org"), "example.org");
        assert_eq!(strip_port("example.org:80"), "example.org");
    }
}
