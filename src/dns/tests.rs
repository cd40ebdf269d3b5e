use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{DnsError, DohResolver, LookupTxt, MxRecord, RecordType, ResolverOptions};

fn resolver_for(server: &MockServer) -> DohResolver {
    resolver_with(server, ResolverOptions::new())
}

fn resolver_with(server: &MockServer, options: ResolverOptions) -> DohResolver {
    let options = options.with_endpoint(format!("{}/dns-query", server.uri()));
    DohResolver::new(options).expect("client builds")
}

fn doh_body(status: u32, name: &str, answers: &[(u16, &str)]) -> Value {
    let answers: Vec<Value> = answers
        .iter()
        .map(|(rr_type, data)| json!({ "name": name, "type": rr_type, "TTL": 300, "data": data }))
        .collect();
    json!({
        "Status": status,
        "TC": false,
        "RD": true,
        "RA": true,
        "Question": [{ "name": name, "type": 16 }],
        "Answer": answers
    })
}

async fn mount(server: &MockServer, name: &str, rr: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/dns-query"))
        .and(query_param("name", name))
        .and(query_param("type", rr))
        .and(header("accept", "application/dns-json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body)
                .insert_header("content-type", "application/dns-json"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn txt_answers_reconstructed_one_per_answer() {
    let server = MockServer::start().await;
    mount(
        &server,
        "example.com",
        "TXT",
        doh_body(
            0,
            "example.com",
            &[
                (16, r#""v=spf1 ip4:192.0.2.1" "-all""#),
                (5, "alias.example.net."),
                (16, r#""google-site-verification=abc""#),
            ],
        ),
    )
    .await;

    let resolver = resolver_for(&server);
    let records = resolver.lookup_txt("example.com").await.expect("lookup succeeds");
    assert_eq!(
        records,
        vec![
            "v=spf1 ip4:192.0.2.1 -all".to_string(),
            "google-site-verification=abc".to_string(),
        ]
    );
}

#[tokio::test]
async fn status_zero_without_answers_is_empty() {
    let server = MockServer::start().await;
    mount(&server, "example.com", "TXT", json!({ "Status": 0 })).await;

    let records = resolver_for(&server).resolve_txt("example.com").await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn nxdomain_maps_to_name_not_found() {
    let server = MockServer::start().await;
    mount(&server, "missing.example", "TXT", doh_body(3, "missing.example", &[])).await;

    let err = resolver_for(&server)
        .resolve_txt("missing.example")
        .await
        .expect_err("NXDOMAIN is an error");
    assert!(err.is_name_not_found(), "{err:?}");
}

#[tokio::test]
async fn other_dns_status_maps_to_resolution_error() {
    let server = MockServer::start().await;
    mount(&server, "broken.example", "A", doh_body(2, "broken.example", &[])).await;

    let err = resolver_for(&server).resolve_a("broken.example").await.unwrap_err();
    assert_eq!(
        err,
        DnsError::Resolution {
            name: "broken.example".into(),
            record_type: RecordType::A,
            status: 2,
        }
    );
}

#[tokio::test]
async fn http_failure_maps_to_transport_error_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = resolver_for(&server).resolve_txt("example.com").await.unwrap_err();
    match err {
        DnsError::Transport {
            status, message, ..
        } => {
            assert_eq!(status, Some(503));
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_body_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let err = resolver_for(&server).resolve_txt("example.com").await.unwrap_err();
    assert!(matches!(err, DnsError::Transport { status: Some(200), .. }), "{err:?}");
}

#[tokio::test]
async fn slow_server_yields_timeout_with_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(doh_body(0, "slow.example", &[]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let options = ResolverOptions::new().with_query_timeout(Duration::from_millis(150));
    let err = resolver_with(&server, options)
        .resolve_txt("slow.example")
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert!(err.to_string().contains("150 ms"), "{err}");
}

#[tokio::test]
async fn invalid_names_rejected_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": 0 })))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = resolver_for(&server);
    let empty = resolver.resolve_txt("   ").await.unwrap_err();
    assert!(matches!(empty, DnsError::InvalidInput { .. }));

    let long = format!("{}.com", "a".repeat(260));
    let too_long = resolver.resolve_txt(&long).await.unwrap_err();
    assert!(matches!(too_long, DnsError::InvalidInput { .. }));
}

#[tokio::test]
async fn url_length_cap_enforced() {
    let server = MockServer::start().await;
    let options = ResolverOptions::new().with_max_url_len(32);
    let err = resolver_with(&server, options)
        .resolve_txt("example.com")
        .await
        .unwrap_err();
    match err {
        DnsError::InvalidInput { reason, .. } => assert!(reason.contains("URL length")),
        other => panic!("expected invalid input, got {other:?}"),
    }
}

#[tokio::test]
async fn mx_sorted_and_malformed_entries_dropped() {
    let server = MockServer::start().await;
    mount(
        &server,
        "example.com",
        "MX",
        doh_body(
            0,
            "example.com",
            &[
                (15, "20 mx2.example.com."),
                (15, "bogus"),
                (15, "10 mx1.example.com."),
            ],
        ),
    )
    .await;

    let records = resolver_for(&server).resolve_mx("example.com").await;
    assert_eq!(
        records,
        vec![
            MxRecord::new(10, "mx1.example.com"),
            MxRecord::new(20, "mx2.example.com"),
        ]
    );
}

#[tokio::test]
async fn mx_and_cname_failures_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let resolver = resolver_for(&server);
    assert!(resolver.resolve_mx("example.com").await.is_empty());
    assert!(resolver.resolve_cname("www.example.com").await.is_empty());
}

#[tokio::test]
async fn cname_targets_trimmed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "www.example.com",
        "CNAME",
        doh_body(0, "www.example.com", &[(5, "Edge.Example.NET.")]),
    )
    .await;

    let targets = resolver_for(&server).resolve_cname("www.example.com").await;
    assert_eq!(targets, vec!["edge.example.net".to_string()]);
}

#[tokio::test]
async fn aaaa_returns_raw_addresses() {
    let server = MockServer::start().await;
    mount(
        &server,
        "example.com",
        "AAAA",
        doh_body(0, "example.com", &[(28, "2001:db8::1")]),
    )
    .await;

    let addrs = resolver_for(&server).resolve_aaaa("example.com").await.unwrap();
    assert_eq!(addrs, vec!["2001:db8::1".to_string()]);
}
