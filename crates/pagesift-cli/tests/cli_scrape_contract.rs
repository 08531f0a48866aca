use axum::{http::header, routing::get, Router};
use std::net::SocketAddr;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn pagesift() -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(assert_cmd::cargo::cargo_bin!("pagesift"));
    cmd.env("PAGESIFT_DOTENV", "0")
        .env_remove("PAGESIFT_BROWSER_ENDPOINT")
        .env_remove("PAGESIFT_BROWSER_LOCAL");
    cmd
}

#[tokio::test]
async fn scrape_static_prints_clean_text_json() {
    let app = Router::new().route(
        "/page",
        get(|| async {
            (
                [(header::CONTENT_TYPE, "text/html")],
                "<html><body><script>track()</script><h1>Title</h1>\n\n<p>  Body text  </p></body></html>",
            )
        }),
    );
    let addr = serve(app).await;

    let out = pagesift()
        .args(["scrape", &format!("http://{addr}/page"), "--strategy", "static"])
        .output()
        .await
        .expect("run pagesift scrape");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse scrape json");
    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("scrape"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["strategy"].as_str(), Some("static"));
    assert_eq!(v["status"].as_u64(), Some(200));
    assert_eq!(v["text"].as_str(), Some("Title\nBody text"));
    assert_eq!(v["truncated"].as_bool(), Some(false));
}

#[tokio::test]
async fn scrape_preview_is_bounded() {
    let app = Router::new().route(
        "/",
        get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<body><p>abcdefghij</p></body>") }),
    );
    let addr = serve(app).await;

    let out = pagesift()
        .args([
            "scrape",
            &format!("http://{addr}/"),
            "--strategy",
            "static",
            "--preview-chars",
            "4",
        ])
        .output()
        .await
        .expect("run pagesift scrape");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse scrape json");
    assert_eq!(v["text"].as_str(), Some("abcd"));
    assert_eq!(v["text_chars"].as_u64(), Some(10));
    assert_eq!(v["truncated"].as_bool(), Some(true));
    assert!(v["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|w| w == "preview_truncated"));
}

#[tokio::test]
async fn scrape_unreachable_host_exits_1_with_fetch_failed() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let out = pagesift()
        .args(["scrape", &format!("http://{addr}/"), "--strategy", "static"])
        .output()
        .await
        .expect("run pagesift scrape");
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse error json");
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert_eq!(v["error"]["code"].as_str(), Some("fetch_failed"));
}

#[tokio::test]
async fn scrape_rendered_without_browser_is_not_configured() {
    let out = pagesift()
        .args(["scrape", "https://example.com/", "--strategy", "rendered"])
        .output()
        .await
        .expect("run pagesift scrape");
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse error json");
    assert_eq!(v["error"]["code"].as_str(), Some("not_configured"));
}

#[tokio::test]
async fn scrape_rejects_unknown_strategy() {
    let out = pagesift()
        .args(["scrape", "https://example.com/", "--strategy", "carrier-pigeon"])
        .output()
        .await
        .expect("run pagesift scrape");
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse error json");
    assert_eq!(v["error"]["code"].as_str(), Some("invalid_params"));
}
