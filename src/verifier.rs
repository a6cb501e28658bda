// Out-of-band handle verification via DNS TXT and the well-known endpoint

use crate::constants::{user_agent, HTTP_VERIFIER_TIMEOUT_SECS};
use crate::error::{MirageError, Result};
use crate::ident::validate_did;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;

/// Resolves a handle to the DID its owner actually publishes, independent of
/// the mirror's own state. Used to disambiguate handle collisions; every
/// failure here is advisory, never fatal to the pipeline.
pub struct HandleVerifier {
    resolver: TokioAsyncResolver,
    client: reqwest::Client,
}

impl HandleVerifier {
    pub fn new() -> Result<Self> {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_VERIFIER_TIMEOUT_SECS))
            .user_agent(user_agent())
            .build()?;
        Ok(Self { resolver, client })
    }

    /// Resolve a handle: DNS TXT on `_atproto.<handle>` first, then
    /// `https://<handle>/.well-known/atproto-did`. Returns the first DID
    /// either source yields.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String> {
        if let Some(did) = self.resolve_dns(handle).await {
            return Ok(did);
        }
        self.resolve_well_known(handle).await
    }

    async fn resolve_dns(&self, handle: &str) -> Option<String> {
        let name = format!("_atproto.{}", handle);
        let lookup = self.resolver.txt_lookup(name).await.ok()?;
        for record in lookup.iter() {
            let text = record.to_string();
            if let Some(did) = text.strip_prefix("did=") {
                if validate_did(did).is_ok() {
                    return Some(did.to_string());
                }
            }
        }
        None
    }

    async fn resolve_well_known(&self, handle: &str) -> Result<String> {
        let url = format!("https://{}/.well-known/atproto-did", handle);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(MirageError::Upstream(format!(
                "well-known lookup for {} returned {}",
                handle,
                response.status()
            )));
        }

        let did = response.text().await?.trim().to_string();
        validate_did(&did)?;
        Ok(did)
    }
}
