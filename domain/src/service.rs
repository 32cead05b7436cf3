use crate::validate::{validate_long_url, validate_short_code};
use crate::value::LinkValue;
use crate::{CodeGenerator, CoreError, KvStore, Mapping, NewMapping, ShortCode};

/// Attempts at finding a free generated code before giving up.
const MAX_GENERATE_ATTEMPTS: usize = 10;

/// Application service behind the management surfaces.
///
/// Generic over the key-value store and the code generator so the same
/// logic runs against the managed store in production and an in-memory map
/// in tests. The redirect path does not go through here; see
/// [`crate::resolver::Resolver`].
pub struct MappingService<S: KvStore, G: CodeGenerator> {
    store: S,
    codes: G,
}

impl<S: KvStore, G: CodeGenerator> MappingService<S, G> {
    pub fn new(store: S, codes: G) -> Self {
        Self { store, codes }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every mapping in the store, decoded, in key order.
    ///
    /// Keys deleted between the listing and the read are skipped.
    pub async fn list_all(&self) -> Result<Vec<Mapping>, CoreError> {
        let keys = self.store.list().await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                out.push(LinkValue::parse(&raw).into_mapping(&key));
            }
        }
        out.sort_by(|a, b| a.short_code.cmp(&b.short_code));
        Ok(out)
    }

    pub async fn get(&self, code: &str) -> Result<Mapping, CoreError> {
        match self.store.get(code).await? {
            Some(raw) => Ok(LinkValue::parse(&raw).into_mapping(code)),
            None => Err(CoreError::NotFound),
        }
    }

    /// Case-insensitive substring match on code and destination URL.
    pub async fn search(&self, term: &str) -> Result<Vec<Mapping>, CoreError> {
        let all = self.list_all().await?;
        Ok(filter_mappings(all, term))
    }

    /// Create a mapping under the custom code, or under a generated one.
    pub async fn create(&self, input: NewMapping) -> Result<Mapping, CoreError> {
        validate_long_url(&input.long_url)?;

        if let Some(ref custom) = input.custom_code {
            let code = validate_short_code(custom.as_str())?;
            if self.store.get(code.as_str()).await?.is_some() {
                return Err(CoreError::AlreadyExists);
            }
            return self.persist(&code, &input).await;
        }

        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let code = self.codes.next_code();
            if self.store.get(code.as_str()).await?.is_none() {
                return self.persist(&code, &input).await;
            }
        }
        Err(CoreError::Store("failed to generate unique short code".into()))
    }

    /// Overwrite the mapping under `code`. Creates it if it does not exist.
    pub async fn update(&self, code: &str, input: NewMapping) -> Result<Mapping, CoreError> {
        let code = validate_short_code(code)?;
        validate_long_url(&input.long_url)?;
        self.persist(&code, &input).await
    }

    /// Remove a mapping. Removing a missing code succeeds.
    pub async fn delete(&self, code: &str) -> Result<(), CoreError> {
        self.store.delete(code).await
    }

    async fn persist(&self, code: &ShortCode, input: &NewMapping) -> Result<Mapping, CoreError> {
        let value = LinkValue::structured(input);
        self.store.put(code.as_str(), &value.encode()).await?;
        Ok(value.into_mapping(code.as_str()))
    }
}

/// Filter already-loaded mappings the same way [`MappingService::search`]
/// does. An empty term matches everything.
pub fn filter_mappings(mappings: Vec<Mapping>, term: &str) -> Vec<Mapping> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return mappings;
    }
    mappings
        .into_iter()
        .filter(|m| {
            m.short_code.to_lowercase().contains(&needle)
                || m.long_url.to_lowercase().contains(&needle)
        })
        .collect()
}
