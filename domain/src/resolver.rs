//! Redirect resolution: request path to redirect decision.
//!
//! The resolver is deliberately forgiving. An empty path, an unknown code,
//! and an empty stored value all resolve to the root URL, so a mistyped
//! link lands on the landing page instead of a 404. Only a failing store
//! surfaces as an error.

use crate::value::LinkValue;
use crate::{CoreError, KvStore, UtmParams};

/// Outcome of resolving one request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No mapping applies; send the client to the landing page.
    Root { location: String },
    /// A stored mapping was found.
    Destination(ResolvedLink),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLink {
    pub short_code: String,
    pub destination: String,
    pub utm: UtmParams,
}

pub struct Resolver<S: KvStore> {
    store: S,
    root_url: String,
}

impl<S: KvStore> Resolver<S> {
    pub fn new(store: S, root_url: impl Into<String>) -> Self {
        Self {
            store,
            root_url: root_url.into(),
        }
    }

    /// Resolve a request path such as `/` or `/abc123`.
    pub async fn resolve(&self, path: &str) -> Result<Resolution, CoreError> {
        let code = short_code_from_path(path);
        if code.is_empty() {
            return Ok(self.root());
        }

        let Some(raw) = self.store.get(code).await? else {
            return Ok(self.root());
        };

        let value = LinkValue::parse(&raw);
        if value.destination().is_empty() {
            return Ok(self.root());
        }
        Ok(Resolution::Destination(ResolvedLink {
            short_code: code.to_string(),
            destination: value.destination().to_string(),
            utm: value.utm(),
        }))
    }

    fn root(&self) -> Resolution {
        Resolution::Root {
            location: self.root_url.clone(),
        }
    }
}

/// The short code is the path with its leading slash removed. Anything
/// after that, nested slashes included, is part of the opaque key.
pub fn short_code_from_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}
