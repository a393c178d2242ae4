// Tests for host identity resolution and party classification

use flowgraph_core::identity::{
    HostResolver, IdentityMode, Rejection, parse_web_url, second_level_domain, subdomain,
};
use flowgraph_source::{Header, HttpResponse, RequestRecord};

fn create_request(initiator: Option<&str>, url: Option<&str>) -> RequestRecord {
    let mut record = RequestRecord::default();
    record.request.initiator = initiator.map(String::from);
    record.request.url = url.map(String::from);
    record
}

fn third_party() -> HostResolver {
    HostResolver::new(IdentityMode::Fqdn, false)
}

// ============================================================================
// Target / Source Resolution Tests
// ============================================================================

#[test]
fn test_resolve_initiator_and_url() {
    let record = create_request(Some("https://www.a.com"), Some("https://cdn.b.com/x.js"));
    let resolved = third_party().resolve(&record).unwrap();

    assert_eq!(resolved.source, "www.a.com");
    assert_eq!(resolved.target, "cdn.b.com");
    assert_eq!(resolved.source_sld, "a.com");
    assert_eq!(resolved.target_sld, "b.com");
    assert!(!resolved.is_first_party);
}

#[test]
fn test_resolve_target_falls_back_to_response_url() {
    let mut record = create_request(Some("https://a.com"), None);
    record.response = Some(HttpResponse {
        url: Some("https://b.com/pixel".to_string()),
        response_headers: vec![],
    });

    let resolved = third_party().resolve(&record).unwrap();
    assert_eq!(resolved.target, "b.com");
    assert_eq!(resolved.target_url.path(), "/pixel");
}

#[test]
fn test_resolve_missing_target() {
    let record = create_request(Some("https://a.com"), None);
    assert_eq!(third_party().resolve(&record).unwrap_err(), Rejection::MissingTarget);
}

#[test]
fn test_resolve_source_from_referer_case_insensitive() {
    let mut record = create_request(None, Some("https://b.com/"));
    record
        .request
        .request_headers
        .push(Header::new("REFERER", "https://a.com/page"));

    let resolved = third_party().resolve(&record).unwrap();
    assert_eq!(resolved.source, "a.com");
}

#[test]
fn test_resolve_referer_preferred_over_origin() {
    let mut record = create_request(None, Some("https://b.com/"));
    record.request.request_headers = vec![
        Header::new("Origin", "https://origin.com"),
        Header::new("Referer", "https://referer.com/"),
    ];

    let resolved = third_party().resolve(&record).unwrap();
    assert_eq!(resolved.source, "referer.com");
}

#[test]
fn test_resolve_source_from_origin() {
    let mut record = create_request(None, Some("https://b.com/"));
    record
        .request
        .request_headers
        .push(Header::new("origin", "https://a.com"));

    let resolved = third_party().resolve(&record).unwrap();
    assert_eq!(resolved.source, "a.com");
}

#[test]
fn test_resolve_initiator_preferred_over_headers() {
    let mut record = create_request(Some("https://init.com"), Some("https://b.com/"));
    record
        .request
        .request_headers
        .push(Header::new("Referer", "https://referer.com/"));

    let resolved = third_party().resolve(&record).unwrap();
    assert_eq!(resolved.source, "init.com");
}

#[test]
fn test_resolve_missing_source() {
    let record = create_request(None, Some("https://b.com/"));
    assert_eq!(third_party().resolve(&record).unwrap_err(), Rejection::MissingSource);
}

#[test]
fn test_resolve_empty_initiator_is_absent() {
    let record = create_request(Some(""), Some("https://b.com/"));
    assert_eq!(third_party().resolve(&record).unwrap_err(), Rejection::MissingSource);
}

// ============================================================================
// URL Validation Tests
// ============================================================================

#[test]
fn test_resolve_rejects_non_web_schemes() {
    let cases = [
        ("chrome-extension://abcdef", "https://b.com/"),
        ("https://a.com", "ftp://b.com/file"),
        ("https://a.com", "data:text/plain,hi"),
        ("https://a.com", "b.com/no-scheme"),
        ("null", "https://b.com/"),
    ];

    for (source, target) in cases {
        let record = create_request(Some(source), Some(target));
        assert_eq!(
            third_party().resolve(&record).unwrap_err(),
            Rejection::InvalidUrl,
            "{} -> {}",
            source,
            target
        );
    }
}

#[test]
fn test_parse_web_url_requires_explicit_scheme() {
    assert!(parse_web_url("http://example.com").is_ok());
    assert!(parse_web_url("HTTPS://example.com/a?b=c").is_ok());
    assert_eq!(parse_web_url("http:example.com"), Err(Rejection::InvalidUrl));
    assert_eq!(parse_web_url("//example.com"), Err(Rejection::InvalidUrl));
    assert_eq!(parse_web_url(""), Err(Rejection::InvalidUrl));
}

// ============================================================================
// First / Third Party Policy Tests
// ============================================================================

#[test]
fn test_first_party_excluded_by_default() {
    let record = create_request(Some("https://a.b.com"), Some("https://c.b.com/x"));
    assert_eq!(third_party().resolve(&record).unwrap_err(), Rejection::FirstParty);
}

#[test]
fn test_first_party_included_when_configured() {
    let record = create_request(Some("https://a.b.com"), Some("https://c.b.com/x"));
    let resolved = HostResolver::new(IdentityMode::Fqdn, true)
        .resolve(&record)
        .unwrap();

    assert!(resolved.is_first_party);
    assert_eq!(resolved.source, "a.b.com");
    assert_eq!(resolved.target, "c.b.com");
}

#[test]
fn test_same_host_is_never_an_edge() {
    let record = create_request(Some("https://x.com"), Some("https://x.com/app.js"));

    assert_eq!(third_party().resolve(&record).unwrap_err(), Rejection::FirstParty);
    assert_eq!(
        HostResolver::new(IdentityMode::Fqdn, true)
            .resolve(&record)
            .unwrap_err(),
        Rejection::SelfLoop
    );
}

#[test]
fn test_sld_mode_collapses_same_site_to_self_loop() {
    let record = create_request(Some("https://a.b.com"), Some("https://c.b.com/x"));
    let resolver = HostResolver::new(IdentityMode::Sld, true);

    assert_eq!(resolver.resolve(&record).unwrap_err(), Rejection::SelfLoop);
}

#[test]
fn test_sld_mode_identities() {
    let record = create_request(
        Some("https://img.cdn.tracker.com"),
        Some("https://www.site.com/"),
    );
    let resolved = HostResolver::new(IdentityMode::Sld, false)
        .resolve(&record)
        .unwrap();

    assert_eq!(resolved.source, "tracker.com");
    assert_eq!(resolved.target, "site.com");
    assert_eq!(resolved.source_host, "img.cdn.tracker.com");
    assert_eq!(resolved.target_host, "www.site.com");
}

// ============================================================================
// Domain Helper Tests
// ============================================================================

#[test]
fn test_second_level_domain() {
    assert_eq!(second_level_domain("a.b.c.d.com"), "d.com");
    assert_eq!(second_level_domain("www.bbc.co.uk"), "bbc.co.uk");
    assert_eq!(second_level_domain("example.org"), "example.org");
    assert_eq!(second_level_domain("127.0.0.1"), "127.0.0.1");
    assert_eq!(second_level_domain("localhost"), "localhost");
}

#[test]
fn test_subdomain_depth() {
    let record = create_request(Some("https://site.com"), Some("https://a.b.c.d.com/"));
    let resolved = third_party().resolve(&record).unwrap();

    assert_eq!(resolved.target_subdomain(), "a.b.c");
    assert_eq!(resolved.target_subdomain_depth(), 3);
}

#[test]
fn test_subdomain_of_bare_domain_is_empty() {
    assert_eq!(subdomain("d.com", "d.com"), "");
    assert_eq!(subdomain("www.d.com", "d.com"), "www");
}

#[test]
fn test_ip_hosts_resolve() {
    let record = create_request(Some("http://10.0.0.1:8080"), Some("http://127.0.0.1/x"));
    let resolved = third_party().resolve(&record).unwrap();

    assert_eq!(resolved.source, "10.0.0.1");
    assert_eq!(resolved.target, "127.0.0.1");
    assert_eq!(resolved.target_subdomain_depth(), 0);
}
