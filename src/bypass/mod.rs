//! Bypass client - ordered provider fallback
//!
//! Providers are tried strictly one after another in priority order. The
//! first usable payload wins; failures are collected and only surfaced when
//! the whole chain is exhausted.

/// Provider configuration and request building
pub mod provider;
mod response;
/// HTTP transport seam
pub mod transport;

#[cfg(test)]
mod tests;

use crate::config::Settings;
use crate::denylist::Denylist;
use crate::resolution::{
    truncate_chars, Resolution, ResolutionFailure, ResolvedLink, MAX_REASON_CHARS,
};
use provider::{ProviderConfig, ProviderStatus};
use response::ProviderReply;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use transport::{HttpTransport, Transport, TransportError};

/// Message returned when no provider could be attempted
pub const NO_PROVIDERS_MESSAGE: &str = "no providers configured";
/// Message returned when a payload hits the denylist
pub const DENIED_PAYLOAD_MESSAGE: &str = "result matched a blocked pattern";
/// Separator between per-provider failure reasons
pub const FAILURE_SEPARATOR: &str = " | ";

/// Why a single provider attempt failed
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-200 response; `body` is truncated
    #[error("API error {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, at most 200 characters
        body: String,
    },
    /// Network failure or timeout
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The body is not JSON
    #[error("malformed response: {0}")]
    Malformed(String),
    /// No known shape yielded a payload
    #[error("no result from API: {0}")]
    EmptyResult(String),
    /// The provider does not handle this kind of link
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The provider reported an error
    #[error("{0}")]
    Rejected(String),
    /// The provider entry itself is unusable
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
}

/// Resolves links through the configured provider chain
pub struct BypassClient {
    providers: Vec<ProviderConfig>,
    transport: Arc<dyn Transport>,
    denylist: Denylist,
}

impl BypassClient {
    /// Create a client over `providers`, in priority order.
    #[must_use]
    pub fn new(
        providers: Vec<ProviderConfig>,
        transport: Arc<dyn Transport>,
        denylist: Denylist,
    ) -> Self {
        Self {
            providers,
            transport,
            denylist,
        }
    }

    /// Create a client with the built-in provider chain and an HTTP transport.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let transport = Arc::new(HttpTransport::new(settings.provider_timeout()));
        Self::new(
            settings.provider_configs(),
            transport,
            Denylist::new(&settings.denylist_pattern),
        )
    }

    /// Configured providers in priority order
    #[must_use]
    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Readiness of every configured provider
    #[must_use]
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.providers.iter().map(ProviderConfig::status).collect()
    }

    /// Resolve `link`, falling back through providers until one succeeds.
    ///
    /// A payload that hits the denylist ends the call with a denylist
    /// failure; the remaining providers are not tried.
    #[instrument(skip(self))]
    pub async fn resolve(&self, link: &str) -> Resolution {
        let mut failures = Vec::new();

        for provider in &self.providers {
            if !provider.is_ready() {
                debug!(provider = %provider.name, "Skipping provider: credential missing");
                continue;
            }

            let start = std::time::Instant::now();
            match self.attempt(provider, link).await {
                Ok(payload) => {
                    if self.denylist.matches(&payload) {
                        warn!(
                            provider = %provider.name,
                            pattern = self.denylist.pattern(),
                            "Provider result matched denylist"
                        );
                        return Resolution::Failure(ResolutionFailure::denied(
                            DENIED_PAYLOAD_MESSAGE,
                        ));
                    }

                    let resolved = ResolvedLink::new(payload, &provider.name);
                    info!(
                        provider = %provider.name,
                        kind = %resolved.kind,
                        duration_ms = start.elapsed().as_millis(),
                        "Link resolved"
                    );
                    return Resolution::Success(resolved);
                }
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        duration_ms = start.elapsed().as_millis(),
                        error = %e,
                        "Provider attempt failed"
                    );
                    failures.push(format!("{}: {e}", provider.display_name));
                }
            }
        }

        if failures.is_empty() {
            warn!("No provider could be attempted");
            return Resolution::Failure(ResolutionFailure::new(NO_PROVIDERS_MESSAGE));
        }

        Resolution::Failure(ResolutionFailure::new(&failures.join(FAILURE_SEPARATOR)))
    }

    async fn attempt(
        &self,
        provider: &ProviderConfig,
        link: &str,
    ) -> Result<String, ProviderError> {
        let request = provider.build_request(link)?;
        debug!(provider = %provider.name, method = ?request.method, "Sending provider request");

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(ProviderError::Status {
                status: response.status,
                body: truncate_chars(response.body.trim(), MAX_REASON_CHARS),
            });
        }

        match response::decode_body(&response.body)? {
            ProviderReply::Payload(payload) => Ok(payload),
            ProviderReply::Unsupported(message) => Err(ProviderError::Unsupported(truncate_chars(
                &message,
                MAX_REASON_CHARS,
            ))),
            ProviderReply::Error(message) => Err(ProviderError::Rejected(truncate_chars(
                &message,
                MAX_REASON_CHARS,
            ))),
        }
    }
}
