//! Catalog of known link shortener services.

use url::Url;

/// Services the providers are known to handle
pub const SUPPORTED_SERVICES: &[&str] = &[
    "codex",
    "trigon",
    "rekonise",
    "linkvertise",
    "paster-so",
    "cuttlinks",
    "boost-ink-and-bst-gg",
    "keyguardian",
    "bstshrt",
    "nicuse-getkey",
    "adfoc.us",
    "bit.do",
    "bit.ly",
    "blox-script",
    "boost.ink",
    "cl.gy",
    "cuty-cuttlinks",
    "getpolsec",
    "goo.gl",
    "is.gd",
    "junkie-development.flow",
    "ldnesfspublic",
    "link-hub.net",
    "link-unlock-complete",
    "link4m.com",
    "linkunlock",
    "linkunlocker.com",
    "lockr",
    "mboost",
    "mediafire",
    "overdrivehub",
    "paste-drop.com",
    "pastebin.com",
    "pastes_io",
    "quartyz",
    "rebrand.ly",
    "rekonise.com",
    "rentry.co",
    "rinku-pro",
    "rkns.link",
    "shorteners-and-direct",
    "shorter.me",
    "socialwolvez.com",
    "sub2get.com",
    "sub2unlock.net",
    "sub4unlock.com",
    "subfinal",
    "t.co",
    "t.ly",
    "tiny.cc",
    "tinylink.onl",
    "tinyurl.com",
    "tpi.li",
    "unlocknow.net",
    "v.gd",
    "work-ink",
    "ytsubme",
    "ace-bypass.com",
];

/// Name used for links whose host cannot be determined
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Lowercase host with any `www.` removed, port included.
fn domain(url: &str) -> Option<String> {
    let parsed = Url::parse(&url.to_lowercase()).ok()?;
    let host = parsed.host_str()?;
    let mut domain = host.replace("www.", "");
    if let Some(port) = parsed.port() {
        domain.push_str(&format!(":{port}"));
    }
    (!domain.is_empty()).then_some(domain)
}

fn catalog_match(domain: &str) -> Option<&'static str> {
    SUPPORTED_SERVICES
        .iter()
        .copied()
        .find(|service| domain.contains(service) || service.contains(domain))
}

/// Service a link belongs to.
///
/// Returns the catalog entry when the host matches one (in either
/// direction), otherwise the bare domain, or [`UNKNOWN_SERVICE`] when the
/// link has no host.
#[must_use]
pub fn service_name(url: &str) -> String {
    match domain(url) {
        Some(domain) => catalog_match(&domain)
            .map_or(domain, ToString::to_string),
        None => UNKNOWN_SERVICE.to_string(),
    }
}

/// Returns true if the link's host matches a catalog entry
#[must_use]
pub fn is_supported_service(url: &str) -> bool {
    domain(url).is_some_and(|domain| catalog_match(&domain).is_some())
}
