use crate::{LimitConfig, LimitKey};

/// The pieces of an incoming request needed to derive a limiter key.
///
/// The host pipeline fills this in from whatever request type it has; the
/// crate never sees the request itself.
///
/// # Examples
///
/// ```
/// use apopeira::{LimitConfig, RequestIdentity};
///
/// let config = LimitConfig::default();
/// let key = RequestIdentity {
///     remote_addr: "10.0.0.1",
///     forwarded_for: None,
///     path: "/login",
/// }
/// .resolve(&config);
///
/// assert_eq!(&*key, "10.0.0.1:/login");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct RequestIdentity<'a> {
    /// The raw network source address of the connection.
    pub remote_addr: &'a str,
    /// The comma-separated forwarded-address header value, if present.
    pub forwarded_for: Option<&'a str>,
    /// The target resource path.
    pub path: &'a str,
}

impl RequestIdentity<'_> {
    /// Derive the stable limiter key for this request: `address:path`.
    ///
    /// When `config.trust_proxy` is set and a forwarded-for chain is present,
    /// the address is the *last* entry of the chain (the value appended by
    /// the immediate upstream proxy), never the attacker-controlled leftmost
    /// entries. Otherwise the raw connection address is used. Entries are
    /// whitespace-trimmed; an empty trailing entry falls back to the
    /// connection address.
    ///
    /// The path is taken verbatim: matching is case-sensitive and exact, so
    /// `/Login` and `/login` are separate counters. Normalizing here would
    /// silently merge routes the host considers distinct.
    pub fn resolve(&self, config: &LimitConfig) -> LimitKey {
        let address = self.client_address(config.trust_proxy);
        LimitKey::from_resolved(format!("{address}:{}", self.path))
    }

    fn client_address(&self, trust_proxy: bool) -> &str {
        if !trust_proxy {
            return self.remote_addr;
        }

        match self.forwarded_for.and_then(|chain| chain.rsplit(',').next()) {
            Some(last_hop) if !last_hop.trim().is_empty() => last_hop.trim(),
            _ => self.remote_addr,
        }
    }
}
