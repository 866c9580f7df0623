//! Immutable per-request input to the routing engine.

use serde::Serialize;

/// What the routing engine is allowed to know about a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// `http` or `https`.
    pub scheme: String,
    /// Raw Host header, port included if the client sent one.
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    /// Client address as text; empty when unknown.
    pub client_ip: String,
    pub user_agent: String,
    pub referer: String,
}

impl RequestContext {
    /// The URL the visitor asked for.
    pub fn source_url(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        match self.query.as_deref().filter(|q| !q.is_empty()) {
            Some(query) => format!("{}://{}{}?{}", self.scheme, self.host, path, query),
            None => format!("{}://{}{}", self.scheme, self.host, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_url() {
        let mut ctx = RequestContext {
            scheme: "https".into(),
            host: "tickets.example.com".into(),
            path: "".into(),
            ..Default::default()
        };
        assert_eq!(ctx.source_url(), "https://tickets.example.com/");

        ctx.path = "/a".into();
        ctx.query = Some("x=1".into());
        assert_eq!(ctx.source_url(), "https://tickets.example.com/a?x=1");
    }
}
