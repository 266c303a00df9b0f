use std::time::Duration;

use novelmill_engine::{FailureKind, FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetcher_returns_html_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chapter"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/chapter", server.uri());

    let output = fetcher.fetch(&url).await.expect("fetch ok");
    assert_eq!(output.metadata.original_url, url);
    assert_eq!(output.metadata.final_url, output.metadata.original_url);
    assert_eq!(output.metadata.redirect_count, 0);
    assert!(output
        .metadata
        .content_type
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(output.bytes, b"<html>ok</html>");
    assert_eq!(output.metadata.byte_len, 14);
}

/// The configured User-Agent goes out on the wire; the mock only answers
/// requests that carry it.
#[tokio::test]
async fn fetcher_sends_the_configured_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chapter"))
        .and(header("User-Agent", DEFAULT_USER_AGENT))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/chapter", server.uri());
    fetcher.fetch(&url).await.expect("fetch ok");

    let bot = ReqwestFetcher::new(FetchSettings {
        user_agent: "novelmill/0.1".to_string(),
        ..FetchSettings::default()
    });
    let err = bot.fetch(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn fetcher_fails_on_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/missing", server.uri());

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn fetcher_rejects_invalid_urls() {
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher.fetch("not a url").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn fetcher_times_out_on_slow_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(50),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);
    let url = format!("{}/slow", server.uri());

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn fetcher_rejects_too_large_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html")
                .insert_header("Content-Length", "11")
                .set_body_string("01234567890"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_bytes: 10,
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);
    let url = format!("{}/large", server.uri());

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::TooLarge {
            max_bytes: 10,
            actual: Some(11)
        }
    );
}

#[tokio::test]
async fn fetcher_rejects_unsupported_content_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 4], "image/png"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/image", server.uri());

    let err = fetcher.fetch(&url).await.unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::UnsupportedContentType {
            content_type: "image/png".to_string()
        }
    );
}
