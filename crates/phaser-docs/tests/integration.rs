//! Integration tests for Phaser Docs using wiremock

use phaser_docs::{
    ApiReferenceRequest, DocsConfig, DocsError, FetchClient, PageFetcher,
    ReadDocumentationRequest, SearchDocumentationRequest, Tool, DEFAULT_USER_AGENT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Route library logs to the test harness; set RUST_LOG to see them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_for(server: &MockServer) -> DocsConfig {
    init_tracing();
    DocsConfig {
        base_url: server.uri(),
        allowed_domains: vec!["127.0.0.1".to_string()],
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Some(Duration::from_millis(10)),
        timeout: Duration::from_secs(5),
        ..DocsConfig::default()
    }
}

fn client_for(server: &MockServer) -> FetchClient {
    FetchClient::new(Arc::new(config_for(server))).unwrap()
}

fn tool_for(server: &MockServer) -> Tool {
    Tool::builder().config(config_for(server)).build().unwrap()
}

fn sample_html() -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Sample | Phaser Documentation</title></head>
<body>
    <nav><a href="/">Home</a></nav>
    <main><p>{}</p></main>
    <footer>Footer</footer>
</body>
</html>"#,
        "abcdefghij".repeat(25)
    )
}

#[tokio::test]
async fn test_fetch_html_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/phaser/sample"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sample_html(), "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = assert_ok!(
        client
            .fetch(&format!("{}/phaser/sample", mock_server.uri()))
            .await
    );

    assert_eq!(result.status_code, 200);
    assert_eq!(result.content_type, "text/html");
    assert!(result.text().contains("abcdefghij"));
}

#[tokio::test]
async fn test_sends_user_agent_and_cookies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .and(header("cookie", "cf_clearance=token; session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server);
    config
        .cookies
        .insert("session".to_string(), "abc".to_string());
    config
        .cookies
        .insert("cf_clearance".to_string(), "token".to_string());
    let client = FetchClient::new(Arc::new(config)).unwrap();

    let result = assert_ok!(client.fetch(&format!("{}/", mock_server.uri())).await);
    assert_eq!(result.text(), "ok");
}

#[tokio::test]
async fn test_server_error_retried_up_to_cap() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/flaky", mock_server.uri())).await);

    match err {
        DocsError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, DocsError::ServerError { status: 503, .. }));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/missing", mock_server.uri())).await);
    assert!(matches!(err, DocsError::NotFound { .. }));
}

#[tokio::test]
async fn test_forbidden_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/private", mock_server.uri())).await);
    assert!(matches!(err, DocsError::Forbidden { status: 403, .. }));
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recover"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/recover"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>back</p>", "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = assert_ok!(client.fetch(&format!("{}/recover", mock_server.uri())).await);
    assert!(result.text().contains("back"));
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    assert_ok!(client.fetch(&format!("{}/limited", mock_server.uri())).await);
}

#[tokio::test]
async fn test_content_length_over_cap_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![b'a'; 2_000_000], "text/html"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server);
    config.max_response_size = 1_000_000;
    let client = FetchClient::new(Arc::new(config)).unwrap();

    let err = assert_err!(client.fetch(&format!("{}/huge", mock_server.uri())).await);
    match err {
        DocsError::ContentTooLarge { size, max } => {
            assert_eq!(size, 2_000_000);
            assert_eq!(max, 1_000_000);
        }
        other => panic!("expected ContentTooLarge, got {:?}", other),
    }
}

/// Serve one chunked response of `body_len` bytes, with no Content-Length
async fn serve_chunked(body_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 8192];
        let _ = socket.read(&mut request).await;

        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\
                    Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let chunk = vec![b'a'; 64 * 1024];
        let mut sent = 0;
        while sent < body_len {
            let n = chunk.len().min(body_len - sent);
            let mut frame = format!("{:x}\r\n", n).into_bytes();
            frame.extend_from_slice(&chunk[..n]);
            frame.extend_from_slice(b"\r\n");
            // The client hangs up once the cap is exceeded
            if socket.write_all(&frame).await.is_err() {
                return;
            }
            sent += n;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_streamed_body_over_size_cap_without_content_length() {
    init_tracing();
    let uri = serve_chunked(2_000_000).await;
    let config = DocsConfig {
        base_url: uri.clone(),
        allowed_domains: vec!["127.0.0.1".to_string()],
        max_retries: 0,
        max_response_size: 1_000_000,
        timeout: Duration::from_secs(5),
        ..DocsConfig::default()
    };
    let client = FetchClient::new(Arc::new(config)).unwrap();

    let err = assert_err!(client.fetch(&format!("{}/streamed", uri)).await);
    match err {
        DocsError::ContentTooLarge { size, max } => {
            assert_eq!(max, 1_000_000);
            assert!(size > max && size <= 2_000_000, "size = {}", size);
        }
        other => panic!("expected ContentTooLarge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_streamed_body_under_size_cap() {
    init_tracing();
    let uri = serve_chunked(300_000).await;
    let config = DocsConfig {
        base_url: uri.clone(),
        allowed_domains: vec!["127.0.0.1".to_string()],
        max_retries: 0,
        max_response_size: 1_000_000,
        timeout: Duration::from_secs(5),
        ..DocsConfig::default()
    };
    let client = FetchClient::new(Arc::new(config)).unwrap();

    let result = assert_ok!(client.fetch(&format!("{}/streamed", uri)).await);
    assert_eq!(result.body.len(), 300_000);
}

#[tokio::test]
async fn test_unsupported_content_type_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/data.json", mock_server.uri())).await);
    assert!(matches!(err, DocsError::UnsupportedContentType(ref ct) if ct == "application/json"));
}

#[tokio::test]
async fn test_page_with_challenge_script_is_fetched() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><head><title>Sprite - Phaser</title></head><body>
<main><p>Real docs content</p></main>
<script src="/cdn-cgi/challenge-platform/scripts/jsd/main.js"></script>
</body></html>"#;

    Mock::given(method("GET"))
        .and(path("/phaser/sprite"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = assert_ok!(
        client
            .fetch(&format!("{}/phaser/sprite", mock_server.uri()))
            .await
    );
    assert!(result.text().contains("Real docs content"));
}

#[tokio::test]
async fn test_challenge_page_detected() {
    let mock_server = MockServer::start().await;

    let html = r#"<html><head><title>Just a moment...</title></head>
<body><div id="cf-browser-verification">Checking your browser</div></body></html>"#;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/guarded", mock_server.uri())).await);
    assert!(matches!(err, DocsError::ChallengePage { .. }));
}

#[tokio::test]
async fn test_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("late", "text/plain")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let mut config = config_for(&mock_server);
    config.timeout = Duration::from_millis(100);
    config.max_retries = 0;
    let client = FetchClient::new(Arc::new(config)).unwrap();

    let err = assert_err!(client.fetch(&format!("{}/slow", mock_server.uri())).await);
    assert!(matches!(err, DocsError::Timeout(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_redirect_within_allowed_host() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>moved</p>", "text/html"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = assert_ok!(client.fetch(&format!("{}/old", mock_server.uri())).await);
    assert!(result.final_url.ends_with("/new"));
}

#[tokio::test]
async fn test_redirect_to_disallowed_host_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/escape"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "http://evil.example.com/"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/escape", mock_server.uri())).await);
    assert!(matches!(err, DocsError::InvalidUrl(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_redirect_follows_url_allow_list() {
    let mock_server = MockServer::start().await;
    let port = mock_server.address().port();

    Mock::given(method("GET"))
        .and(path("/hop"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("http://localhost:{}/landing", port).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<main>Landed</main>", "text/html"))
        .mount(&mock_server)
        .await;

    // "localhost" is not on the default test allow-list
    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch(&format!("{}/hop", mock_server.uri())).await);
    assert!(matches!(err, DocsError::InvalidUrl(_)), "got {:?}", err);

    let mut config = config_for(&mock_server);
    config.allowed_domains.push("localhost".to_string());
    let client = FetchClient::new(Arc::new(config)).unwrap();
    let result = assert_ok!(client.fetch(&format!("{}/hop", mock_server.uri())).await);
    assert_eq!(result.final_url, format!("http://localhost:{}/landing", port));
}

#[tokio::test]
async fn test_disallowed_domain_never_requested() {
    let mock_server = MockServer::start().await;

    let client = client_for(&mock_server);
    let err = assert_err!(client.fetch("https://example.com/").await);
    assert!(err.is_validation());
    let err = assert_err!(client.fetch("ftp://127.0.0.1/file").await);
    assert!(err.is_validation());

    let received = mock_server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tool = tool_for(&mock_server);
    assert_eq!(assert_ok!(tool.health_check().await), 200);
}

#[tokio::test]
async fn test_tool_read_documentation_paginates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/phaser/sample"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sample_html(), "text/html"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let tool = tool_for(&mock_server);
    let full = "abcdefghij".repeat(25);

    let first = assert_ok!(
        tool.read_documentation(ReadDocumentationRequest::new("/phaser/sample").max_length(100))
            .await
    );
    assert_eq!(first.content, full[..100]);
    assert!(first.has_more);
    assert_eq!(first.title, "Sample");

    let second = assert_ok!(
        tool.read_documentation(
            ReadDocumentationRequest::new("/phaser/sample")
                .max_length(100)
                .start_index(100)
        )
        .await
    );
    assert_eq!(second.content, full[100..200]);
    assert!(second.has_more);

    let third = assert_ok!(
        tool.read_documentation(
            ReadDocumentationRequest::new(format!("{}/phaser/sample", mock_server.uri()))
                .max_length(100)
                .start_index(200)
        )
        .await
    );
    assert_eq!(third.content, full[200..]);
    assert!(!third.has_more);
}

#[tokio::test]
async fn test_tool_read_strips_chrome_and_converts() {
    let mock_server = MockServer::start().await;

    let html = r#"<!DOCTYPE html>
<html>
<head><title>Scenes - Phaser</title><script>var tracking = 1;</script></head>
<body>
    <div class="sidebar">Sidebar links</div>
    <div class="content">
        <h1>Scenes</h1>
        <p>A <strong>Scene</strong> is where your game lives.</p>
        <pre><code class="language-javascript">this.add.image(400, 300, 'sky');</code></pre>
        <ul><li>preload</li><li>create</li></ul>
    </div>
</body>
</html>"#;

    Mock::given(method("GET"))
        .and(path("/phaser/concepts/scenes"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(&mock_server)
        .await;

    let tool = tool_for(&mock_server);
    let page = assert_ok!(
        tool.read_documentation(ReadDocumentationRequest::new("/phaser/concepts/scenes"))
            .await
    );

    assert!(page.content.starts_with("# Scenes"));
    assert!(page.content.contains("**Scene**"));
    assert!(page.content.contains("```javascript\nthis.add.image(400, 300, 'sky');\n```"));
    assert!(page.content.contains("- preload\n- create"));
    assert!(!page.content.contains("Sidebar"));
    assert!(!page.content.contains("tracking"));
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_tool_read_not_found_is_prefixed() {
    let mock_server = MockServer::start().await;

    let tool = tool_for(&mock_server);
    let err = assert_err!(
        tool.read_documentation(ReadDocumentationRequest::new("/nowhere"))
            .await
    );
    assert!(err.is_not_found());
    assert!(err
        .to_string()
        .starts_with("Failed to read documentation: Page not found"));
}

#[tokio::test]
async fn test_tool_search_uses_base_url() {
    let mock_server = MockServer::start().await;

    let tool = tool_for(&mock_server);
    let hits = assert_ok!(tool.search_documentation(SearchDocumentationRequest::new("scene")));
    assert!(!hits.is_empty());
    assert!(hits[0].url.starts_with(&mock_server.uri()));

    let err = assert_err!(tool.search_documentation(SearchDocumentationRequest::new("")));
    assert!(err.is_validation());

    let received = mock_server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_tool_api_reference() {
    let mock_server = MockServer::start().await;

    let html = r#"<!DOCTYPE html>
<html>
<body>
    <main>
        <h1>Phaser.GameObjects.Sprite</h1>
        <p class="class-description">A Sprite Game Object is used to display a texture.</p>
        <div class="inheritance">Sprite extends Phaser.GameObjects.GameObject</div>
        <h2>Properties</h2>
        <ul><li>anims : Phaser.Animations.AnimationState</li></ul>
        <h2>Methods</h2>
        <h3>setTexture(key, [frame])</h3>
        <h3>setPosition(x, y)</h3>
        <h3>play(key)</h3>
        <h2>Examples</h2>
        <pre>const sprite = this.add.sprite(400, 300, 'player');
sprite.play('walk');</pre>
    </main>
</body>
</html>"#;

    // api/Sprite and api/Phaser.Sprite fall through to wiremock's default 404
    Mock::given(method("GET"))
        .and(path("/api/Phaser.GameObjects.Sprite"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tool = tool_for(&mock_server);
    let markdown = assert_ok!(
        tool.get_api_reference(ApiReferenceRequest::new("Sprite"))
            .await
    );

    assert!(markdown.starts_with("# Phaser.GameObjects.Sprite\n\nA Sprite Game Object is used to display a texture."));
    assert!(markdown.contains("**Extends:** Phaser.GameObjects.GameObject"));
    assert!(markdown.contains("**Namespace:** Phaser.GameObjects"));
    assert!(markdown.contains("## Methods\n\n- setTexture\n- setPosition\n- play"));
    assert!(markdown.contains("## Properties\n\n- anims"));
    assert!(markdown.contains(
        "```javascript\nconst sprite = this.add.sprite(400, 300, 'player');\nsprite.play('walk');\n```"
    ));
}

#[tokio::test]
async fn test_tool_api_reference_class_not_found() {
    let mock_server = MockServer::start().await;

    let tool = tool_for(&mock_server);
    let err = assert_err!(
        tool.get_api_reference(ApiReferenceRequest::new("DoesNotExist"))
            .await
    );
    assert!(err.is_not_found());
    assert_eq!(
        err.to_string(),
        "Failed to get API reference: Class not found: DoesNotExist"
    );

    let received = mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 4);
}
