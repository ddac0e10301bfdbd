use super::provider::{HttpMethod, ProviderAuth, RequestShape};
use super::transport::{HttpTransport, MockTransport, TransportResponse};
use super::*;
use crate::resolution::ResultKind;
use serde_json::json;
use std::time::Duration;

fn get_provider(name: &str, credential: Option<&str>, requires_credential: bool) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        credential: credential.map(ToString::to_string),
        requires_credential,
        request: RequestShape::Get {
            url_template: format!("https://{name}.example/api/bypass?url={{url}}"),
        },
        auth: ProviderAuth::QueryParam("apikey".to_string()),
    }
}

fn reply(status: u16, body: &str) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status,
        body: body.to_string(),
    })
}

fn client(providers: Vec<ProviderConfig>, transport: MockTransport) -> BypassClient {
    BypassClient::new(providers, Arc::new(transport), Denylist::new("luarmor"))
}

#[test]
fn test_get_request_encodes_link_and_query_credential() -> Result<(), ProviderError> {
    let provider = get_provider("ace", Some("s3cret"), true);
    let request = provider.build_request("https://linkvertise.com/1/a b?x=1&y=2")?;

    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(
        request.url,
        concat!(
            "https://ace.example/api/bypass",
            "?url=https%3A%2F%2Flinkvertise.com%2F1%2Fa+b%3Fx%3D1%26y%3D2&apikey=s3cret"
        )
    );
    assert!(request.headers.is_empty());
    assert!(request.body.is_none());
    Ok(())
}

#[test]
fn test_post_request_with_bearer() -> Result<(), ProviderError> {
    let provider = ProviderConfig {
        name: "post".to_string(),
        display_name: "Post".to_string(),
        credential: Some("tok".to_string()),
        requires_credential: true,
        request: RequestShape::PostJson {
            endpoint: "https://post.example/bypass".to_string(),
            link_field: "link".to_string(),
        },
        auth: ProviderAuth::Bearer,
    };
    let request = provider.build_request("https://bit.ly/x")?;

    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "https://post.example/bypass");
    assert_eq!(
        request.headers,
        vec![("Authorization".to_string(), "Bearer tok".to_string())]
    );
    assert_eq!(request.body, Some(json!({"link": "https://bit.ly/x"})));
    Ok(())
}

#[test]
fn test_custom_header_only_when_credential_present() -> Result<(), ProviderError> {
    let mut provider = get_provider("trw", None, false);
    provider.auth = ProviderAuth::Header("x-api-key".to_string());

    assert!(provider.build_request("https://bit.ly/x")?.headers.is_empty());

    provider.credential = Some("k".to_string());
    assert_eq!(
        provider.build_request("https://bit.ly/x")?.headers,
        vec![("x-api-key".to_string(), "k".to_string())]
    );
    Ok(())
}

#[test]
fn test_invalid_template_is_config_error() {
    let mut provider = get_provider("bad", None, false);
    provider.request = RequestShape::Get {
        url_template: "not a url {url}".to_string(),
    };
    assert!(matches!(
        provider.build_request("https://bit.ly/x"),
        Err(ProviderError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_fallback_reaches_third_provider() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(3).returning(|request| {
        if request.url.starts_with("https://one.") {
            reply(500, "internal error")
        } else if request.url.starts_with("https://two.") {
            reply(200, r#"{"unexpected": true}"#)
        } else {
            reply(200, r#"{"destination": "https://final.example/page"}"#)
        }
    });

    let client = client(
        vec![
            get_provider("one", None, false),
            get_provider("two", None, false),
            get_provider("three", None, false),
        ],
        transport,
    );

    let result = client.resolve("https://linkvertise.com/1/abc").await;
    assert_eq!(
        result,
        Resolution::Success(ResolvedLink {
            kind: ResultKind::DestinationUrl,
            payload: "https://final.example/page".to_string(),
            provider: "three".to_string(),
        })
    );
}

#[tokio::test]
async fn test_first_success_short_circuits() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_| reply(200, r#"{"loadstring": "loadstring(game:HttpGet('x'))()"}"#));

    let client = client(
        vec![get_provider("one", None, false), get_provider("two", None, false)],
        transport,
    );

    let result = client.resolve("https://work.ink/abc").await;
    let Some(resolved) = result.as_success() else {
        panic!("expected success, got {result:?}");
    };
    assert_eq!(resolved.kind, ResultKind::ScriptPayload);
    assert_eq!(resolved.provider, "one");
}

#[tokio::test]
async fn test_providers_without_credentials_are_skipped() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .withf(|request| request.url.starts_with("https://open."))
        .returning(|_| reply(200, r#"{"url": "https://dest.example"}"#));

    let client = client(
        vec![get_provider("locked", None, true), get_provider("open", None, false)],
        transport,
    );

    assert!(client.resolve("https://bit.ly/x").await.is_success());
}

#[tokio::test]
async fn test_no_ready_providers() {
    let mut transport = MockTransport::new();
    transport.expect_send().never();

    let client = client(
        vec![get_provider("a", None, true), get_provider("b", Some(""), true)],
        transport,
    );

    let result = client.resolve("https://bit.ly/x").await;
    let Some(failure) = result.as_failure() else {
        panic!("expected failure");
    };
    assert_eq!(failure.reason(), NO_PROVIDERS_MESSAGE);
    assert!(!failure.is_denied_pattern());
}

#[tokio::test]
async fn test_all_failures_are_aggregated() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(2).returning(|request| {
        if request.url.starts_with("https://one.") {
            Err(TransportError::Timeout(30))
        } else {
            reply(200, r#"{"status": "error", "message": "Link not supported"}"#)
        }
    });

    let client = client(
        vec![get_provider("one", None, false), get_provider("two", None, false)],
        transport,
    );

    let result = client.resolve("https://unknown.example/x").await;
    let Some(failure) = result.as_failure() else {
        panic!("expected failure");
    };
    assert_eq!(
        failure.reason(),
        "ONE: request timed out after 30s | TWO: unsupported: Link not supported"
    );
}

#[tokio::test]
async fn test_error_bodies_are_truncated() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .returning(|_| reply(502, &"e".repeat(5000)));

    let client = client(vec![get_provider("one", None, false)], transport);

    let result = client.resolve("https://bit.ly/x").await;
    let Some(failure) = result.as_failure() else {
        panic!("expected failure");
    };
    assert!(failure.reason().starts_with("ONE: API error 502: eee"));
    assert!(failure.reason().chars().count() <= MAX_REASON_CHARS);
}

#[tokio::test]
async fn test_denylisted_payload_is_terminal() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_| reply(200, r#"{"destination": "https://ads.LUARMOR.net/get_key"}"#));

    let client = client(
        vec![get_provider("one", None, false), get_provider("two", None, false)],
        transport,
    );

    let result = client.resolve("https://bit.ly/x").await;
    let Some(failure) = result.as_failure() else {
        panic!("expected failure");
    };
    assert!(failure.is_denied_pattern());
    assert_eq!(failure.reason(), DENIED_PAYLOAD_MESSAGE);
}

#[test]
fn test_provider_status_report() {
    let client = client(
        vec![get_provider("locked", None, true), get_provider("keyed", Some("k"), true)],
        MockTransport::new(),
    );

    let status = client.provider_status();
    assert!(!status[0].ready);
    assert!(!status[0].has_credential);
    assert!(status[1].ready);
    assert!(status[1].has_credential);
}

#[tokio::test]
async fn test_network_failure_does_not_leak_query_credential() {
    let provider = ProviderConfig {
        name: "ace-bypass".to_string(),
        display_name: "Ace Bypass".to_string(),
        credential: Some("k3y-never-shown".to_string()),
        requires_credential: true,
        // Port 9 (discard) on loopback refuses connections
        request: RequestShape::Get {
            url_template: "http://127.0.0.1:9/api/bypass?url={url}".to_string(),
        },
        auth: ProviderAuth::QueryParam("apikey".to_string()),
    };
    let client = BypassClient::new(
        vec![provider],
        Arc::new(HttpTransport::new(Duration::from_secs(2))),
        Denylist::new("luarmor"),
    );

    let result = client.resolve("https://bit.ly/x").await;
    let Some(failure) = result.as_failure() else {
        panic!("expected failure, got {result:?}");
    };
    assert!(failure.reason().starts_with("Ace Bypass: "));
    assert!(!failure.reason().contains("k3y-never-shown"), "{}", failure.reason());
    assert!(!failure.reason().contains("apikey="), "{}", failure.reason());
}
