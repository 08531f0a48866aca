use pagesift_core::{Error, FetchStrategy, PageFetcher, RawPage, Result};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod dispatch;
pub mod normalize;
pub mod ollama;
pub mod openai_compat;
pub mod pipeline;
pub mod prompts;
pub mod render_playwright;

pub use dispatch::ExtractionDispatcher;
pub use normalize::{normalize_html, ContentNormalizer};
pub use pipeline::{Pipeline, PipelineOutput, ScrapedPage};
pub use render_playwright::{RenderConfig, RenderedFetcher};

/// Parse and check an absolute http(s) URL.
pub(crate) fn parse_http_url(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidUrl(format!(
            "unsupported scheme {other:?} (expected http or https)"
        ))),
    }
}

/// Static fetch strategy: one GET with a browser-like identity.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            // Avoid hanging forever on DNS/TLS/body stalls.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&config::user_agent_from_env())
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Static
    }

    async fn fetch(&self, url: &str) -> Result<RawPage> {
        let url = parse_http_url(url)?;
        let t0 = std::time::Instant::now();
        tracing::info!(%url, "fetching page");

        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status} for {final_url}")));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        // An empty document is "no content available", never success.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Fetch(format!("empty response body for {final_url}")));
        }

        tracing::debug!(
            %url,
            status = status.as_u16(),
            bytes = bytes.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "fetched page"
        );
        Ok(RawPage {
            url: url.to_string(),
            final_url,
            strategy: FetchStrategy::Static,
            status: Some(status.as_u16()),
            html: String::from_utf8_lossy(&bytes).into_owned(),
            captcha_detected: false,
        })
    }
}

/// Routes a fetch to the requested strategy. Both handles are injected so tests can swap
/// either one.
#[derive(Clone)]
pub struct Fetcher {
    static_fetcher: Arc<dyn PageFetcher>,
    rendered_fetcher: Arc<dyn PageFetcher>,
}

impl Fetcher {
    pub fn new(
        static_fetcher: Arc<dyn PageFetcher>,
        rendered_fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            static_fetcher,
            rendered_fetcher,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpFetcher::from_env()?),
            Arc::new(RenderedFetcher::from_env()),
        ))
    }

    pub async fn fetch(&self, url: &str, strategy: FetchStrategy) -> Result<RawPage> {
        let backend = match strategy {
            FetchStrategy::Static => &self.static_fetcher,
            FetchStrategy::Rendered => &self.rendered_fetcher,
        };
        backend.fetch(url).await
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("static", &self.static_fetcher.strategy())
            .field("rendered", &self.rendered_fetcher.strategy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn static_fetch_returns_body_verbatim_with_browser_user_agent() {
        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                let ua = headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                if !ua.starts_with("Mozilla/5.0") {
                    return (StatusCode::FORBIDDEN, "bot".to_string());
                }
                (
                    StatusCode::OK,
                    "<html><body>  <p>raw  body</p>\n</body></html>".to_string(),
                )
            }),
        );
        let addr = serve(app).await;

        let f = HttpFetcher::new(config::DEFAULT_USER_AGENT).unwrap();
        let page = f.fetch(&format!("http://{addr}/")).await.unwrap();
        assert_eq!(page.status, Some(200));
        assert_eq!(page.strategy, FetchStrategy::Static);
        assert_eq!(page.html, "<html><body>  <p>raw  body</p>\n</body></html>");
        assert!(!page.captcha_detected);
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let app = Router::new().route("/", get(|| async { (StatusCode::NOT_FOUND, "gone") }));
        let addr = serve(app).await;

        let f = HttpFetcher::new(config::DEFAULT_USER_AGENT).unwrap();
        let err = f.fetch(&format!("http://{addr}/")).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(ref m) if m.contains("404")), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_or_blank_body_is_a_fetch_error() {
        let app = Router::new()
            .route("/empty", get(|| async { "" }))
            .route("/blank", get(|| async { " \n\t " }));
        let addr = serve(app).await;

        let f = HttpFetcher::new(config::DEFAULT_USER_AGENT).unwrap();
        for path in ["empty", "blank"] {
            let err = f.fetch(&format!("http://{addr}/{path}")).await.unwrap_err();
            assert!(
                matches!(err, Error::Fetch(ref m) if m.contains("empty response body")),
                "{path}: got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let f = HttpFetcher::new(config::DEFAULT_USER_AGENT).unwrap();
        let err = f.fetch(&format!("http://{addr}/")).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let f = HttpFetcher::new(config::DEFAULT_USER_AGENT).unwrap();
        assert!(matches!(
            f.fetch("not a url").await.unwrap_err(),
            Error::InvalidUrl(_)
        ));
        assert!(matches!(
            f.fetch("file:///etc/passwd").await.unwrap_err(),
            Error::InvalidUrl(_)
        ));
    }

    #[tokio::test]
    async fn fetcher_routes_on_strategy() {
        let app = Router::new().route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<body>ok</body>") }),
        );
        let addr = serve(app).await;

        let fetcher = Fetcher::new(
            Arc::new(HttpFetcher::new(config::DEFAULT_USER_AGENT).unwrap()),
            Arc::new(RenderedFetcher::new(RenderConfig::default())),
        );
        let url = format!("http://{addr}/");
        let page = fetcher.fetch(&url, FetchStrategy::Static).await.unwrap();
        assert_eq!(page.html, "<body>ok</body>");

        let err = fetcher
            .fetch(&url, FetchStrategy::Rendered)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");
    }
}
