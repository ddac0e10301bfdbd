//! Provider configuration and request building.

use super::ProviderError;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

/// Placeholder replaced with the URL-encoded link in GET templates
pub const LINK_PLACEHOLDER: &str = "{url}";

/// How the link is sent to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
    /// GET with the encoded link substituted into `url_template`
    Get {
        /// Endpoint containing [`LINK_PLACEHOLDER`]
        url_template: String,
    },
    /// POST with a JSON body `{ link_field: link }`
    PostJson {
        /// Endpoint URL
        endpoint: String,
        /// Body field carrying the link
        link_field: String,
    },
}

/// Where the credential goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAuth {
    /// No credential is sent
    None,
    /// Appended as a query parameter with this name
    QueryParam(String),
    /// `Authorization: Bearer <credential>`
    Bearer,
    /// Sent in a custom header with this name
    Header(String),
}

/// One entry of the ordered provider chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Stable identifier used in logs and statistics
    pub name: String,
    /// Human-readable name used in failure messages
    pub display_name: String,
    /// Secret, if configured
    pub credential: Option<String>,
    /// Skip the provider when no credential is configured
    pub requires_credential: bool,
    /// Request layout
    pub request: RequestShape,
    /// Credential placement
    pub auth: ProviderAuth,
}

/// HTTP method of a provider request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

/// A fully built provider request
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Method
    pub method: HttpMethod,
    /// Absolute URL including query
    pub url: String,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// JSON body for POST requests
    pub body: Option<Value>,
}

/// Readiness of a provider, for configuration displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    /// Provider identifier
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Whether a credential is mandatory
    pub requires_credential: bool,
    /// Whether a credential is configured
    pub has_credential: bool,
    /// Whether the provider will be attempted
    pub ready: bool,
}

impl ProviderConfig {
    /// Returns true if a non-empty credential is configured
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Returns true if the provider will be attempted
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.requires_credential || self.has_credential()
    }

    /// Status summary
    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            requires_credential: self.requires_credential,
            has_credential: self.has_credential(),
            ready: self.is_ready(),
        }
    }

    /// Build the request for `link`, attaching the credential if present.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::InvalidConfig` if the endpoint is not a valid URL.
    pub fn build_request(&self, link: &str) -> Result<ProviderRequest, ProviderError> {
        let (method, raw_url, body) = match &self.request {
            RequestShape::Get { url_template } => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(link.as_bytes()).collect();
                (
                    HttpMethod::Get,
                    url_template.replace(LINK_PLACEHOLDER, &encoded),
                    None,
                )
            }
            RequestShape::PostJson {
                endpoint,
                link_field,
            } => {
                let mut fields = Map::new();
                fields.insert(link_field.clone(), Value::String(link.to_string()));
                (HttpMethod::Post, endpoint.clone(), Some(Value::Object(fields)))
            }
        };

        let mut url = Url::parse(&raw_url)
            .map_err(|e| ProviderError::InvalidConfig(format!("{}: {e}", self.name)))?;
        let mut headers = Vec::new();

        if let Some(credential) = self.credential.as_deref().filter(|c| !c.is_empty()) {
            match &self.auth {
                ProviderAuth::None => {}
                ProviderAuth::QueryParam(param) => {
                    url.query_pairs_mut().append_pair(param, credential);
                }
                ProviderAuth::Bearer => {
                    headers.push(("Authorization".to_string(), format!("Bearer {credential}")));
                }
                ProviderAuth::Header(header) => {
                    headers.push((header.clone(), credential.to_string()));
                }
            }
        }

        Ok(ProviderRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }
}
