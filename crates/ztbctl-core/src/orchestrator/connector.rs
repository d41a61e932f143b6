// ── App connector hook ──
//
// Obtaining a provision key is environment-specific (a cloud API, a
// vault lookup, a shell script). The orchestrator only sees this trait.

use futures_util::future::BoxFuture;

use crate::model::SiteRecord;

/// Produces an app-connector provision key for a site.
pub trait ConnectorHook: Send + Sync {
    fn provision<'a>(&'a self, site: &'a SiteRecord) -> BoxFuture<'a, Result<String, String>>;
}

/// Hook that hands out a fixed key. Handy for lab tenants and tests.
#[derive(Debug, Clone)]
pub struct StaticKey(pub String);

impl ConnectorHook for StaticKey {
    fn provision<'a>(&'a self, _site: &'a SiteRecord) -> BoxFuture<'a, Result<String, String>> {
        let key = self.0.clone();
        Box::pin(async move { Ok(key) })
    }
}
