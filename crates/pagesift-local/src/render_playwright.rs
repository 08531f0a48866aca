//! Rendered fetch strategy: Node + Playwright driving a headless Chromium.
//!
//! The browser session is opened and closed inside one child process per fetch. The script
//! closes the browser in `finally`, and the Rust side kills the child on drop or on the hard
//! wall-clock guard, so no exit path leaves a remote session open.

use crate::config::{env, env_truthy, env_u64};
use pagesift_core::{Error, FetchStrategy, PageFetcher, RawPage, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_SETTLE_MS: u64 = 5_000;
pub const DEFAULT_CAPTCHA_WAIT_MS: u64 = 10_000;
pub const DEFAULT_CAPTCHA_SELECTOR: &str = "#captcha";
pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 60_000;

/// Navigation + settle + challenge wait, plus a minute of slack for browser startup/teardown.
fn default_hard_timeout_ms(nav_timeout_ms: u64, settle_ms: u64, captcha_wait_ms: u64) -> u64 {
    nav_timeout_ms
        .saturating_add(settle_ms)
        .saturating_add(captcha_wait_ms)
        .saturating_add(60_000)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// CDP websocket of a remote browser session (e.g. a hosted scraping browser).
    pub endpoint: Option<String>,
    /// Launch a local headless Chromium when no endpoint is configured.
    pub launch_local: bool,
    pub settle_ms: u64,
    pub captcha_selector: Option<String>,
    pub captcha_wait_ms: u64,
    pub nav_timeout_ms: u64,
    pub hard_timeout_ms: u64,
    pub node_bin: String,
    pub node_path: Option<String>,
    pub disabled: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            launch_local: false,
            settle_ms: DEFAULT_SETTLE_MS,
            captcha_selector: Some(DEFAULT_CAPTCHA_SELECTOR.to_string()),
            captcha_wait_ms: DEFAULT_CAPTCHA_WAIT_MS,
            nav_timeout_ms: DEFAULT_NAV_TIMEOUT_MS,
            hard_timeout_ms: default_hard_timeout_ms(
                DEFAULT_NAV_TIMEOUT_MS,
                DEFAULT_SETTLE_MS,
                DEFAULT_CAPTCHA_WAIT_MS,
            ),
            node_bin: "node".to_string(),
            node_path: None,
            disabled: false,
        }
    }
}

impl RenderConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        let settle_ms = env_u64("PAGESIFT_SETTLE_MS", base.settle_ms);
        let captcha_wait_ms = env_u64("PAGESIFT_CAPTCHA_WAIT_MS", base.captcha_wait_ms);
        let nav_timeout_ms = env_u64("PAGESIFT_NAV_TIMEOUT_MS", base.nav_timeout_ms);
        // "none"/"off" disables the challenge lookup entirely.
        let captcha_selector = match env("PAGESIFT_CAPTCHA_SELECTOR") {
            Some(s) if matches!(s.to_ascii_lowercase().as_str(), "none" | "off") => None,
            Some(s) => Some(s),
            None => base.captcha_selector,
        };
        Self {
            endpoint: env("PAGESIFT_BROWSER_ENDPOINT"),
            launch_local: env_truthy("PAGESIFT_BROWSER_LOCAL"),
            settle_ms,
            captcha_selector,
            captcha_wait_ms,
            nav_timeout_ms,
            hard_timeout_ms: env_u64(
                "PAGESIFT_RENDER_HARD_TIMEOUT_MS",
                default_hard_timeout_ms(nav_timeout_ms, settle_ms, captcha_wait_ms),
            ),
            node_bin: env("PAGESIFT_NODE").unwrap_or(base.node_bin),
            node_path: env("PAGESIFT_NODE_PATH"),
            disabled: env_truthy("PAGESIFT_RENDER_DISABLE"),
        }
    }

    /// Checked before any process is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.disabled {
            return Err(Error::NotConfigured(
                "render backend disabled (PAGESIFT_RENDER_DISABLE)".to_string(),
            ));
        }
        if self.endpoint.is_none() && !self.launch_local {
            return Err(Error::NotConfigured(
                "rendered fetch needs PAGESIFT_BROWSER_ENDPOINT (remote CDP browser) or PAGESIFT_BROWSER_LOCAL=1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.validate().is_ok()
    }
}

const JS: &str = r#"
const fs = require('fs');

function ok(obj) { process.stdout.write(JSON.stringify(obj)); }
function bad(code, message, hint) { ok({ ok: false, error: { code, message, hint } }); }

async function main() {
  let arg = '';
  try { arg = fs.readFileSync(0, 'utf8'); } catch (_) {}
  let req;
  try { req = JSON.parse(arg); } catch (e) { return bad('invalid_params', 'bad JSON args', 'Internal error: could not parse render args.'); }

  let pw;
  try { pw = require('playwright'); } catch (e) {
    return bad('not_configured',
      'Playwright is not installed for Node.js (require("playwright") failed)',
      'Install Playwright (Node): `npm i -g playwright` (and `npx playwright install chromium` for local mode).');
  }

  const url = String(req.url || '').trim();
  if (!url) return bad('invalid_params', 'url must be non-empty', 'Pass an absolute URL like https://example.com.');

  const endpoint = String(req.endpoint || '').trim();
  const settleMs = Number(req.settle_ms || 0);
  const captchaSelector = String(req.captcha_selector || '').trim();
  const captchaWaitMs = Number(req.captcha_wait_ms || 0);
  const navTimeoutMs = Number(req.nav_timeout_ms || 60000);

  const t0 = Date.now();
  let browser;
  try {
    let mode = 'remote';
    if (endpoint) {
      browser = await pw.chromium.connectOverCDP(endpoint);
    } else {
      mode = 'local';
      browser = await pw.chromium.launch({ headless: true, args: ['--no-sandbox', '--disable-dev-shm-usage'] });
    }
    const contexts = browser.contexts ? browser.contexts() : [];
    const context = (contexts && contexts.length > 0) ? contexts[0] : await browser.newContext();
    const page = await context.newPage();

    const resp = await page.goto(url, { waitUntil: 'domcontentloaded', timeout: navTimeoutMs });
    if (settleMs > 0) await page.waitForTimeout(settleMs);

    // Optional lookup: absence is a normal outcome, not an error.
    let captchaDetected = false;
    if (captchaSelector) {
      let el = null;
      try { el = await page.$(captchaSelector); } catch (_) { el = null; }
      captchaDetected = !!el;
      if (captchaDetected && captchaWaitMs > 0) await page.waitForTimeout(captchaWaitMs);
    }

    const html = await page.content();
    ok({
      ok: true,
      mode,
      final_url: page.url(),
      status: resp ? resp.status() : null,
      html,
      elapsed_ms: Date.now() - t0,
      captcha_detected: captchaDetected,
    });
  } catch (e) {
    bad('fetch_failed', String(e && e.message ? e.message : e), 'Browser session failed. Check PAGESIFT_BROWSER_ENDPOINT and the URL.');
  } finally {
    try { if (browser) await browser.close(); } catch (_) {}
  }
}

main().catch((e) => bad('fetch_failed', String(e && e.message ? e.message : e), 'Playwright render failed.'));
"#;

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub status: Option<u16>,
    pub html: String,
    pub elapsed_ms: u64,
    pub captcha_detected: bool,
    pub mode: String,
}

fn render_args(url: &str, cfg: &RenderConfig) -> serde_json::Value {
    serde_json::json!({
        "url": url,
        "endpoint": cfg.endpoint.clone().unwrap_or_default(),
        "settle_ms": cfg.settle_ms,
        "captcha_selector": cfg.captcha_selector.clone().unwrap_or_default(),
        "captcha_wait_ms": cfg.captcha_wait_ms,
        "nav_timeout_ms": cfg.nav_timeout_ms,
    })
}

/// Map the script's JSON reply to a page or a typed error.
fn parse_render_output(url: &str, stdout: &str, stderr: &str) -> Result<RenderedPage> {
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).map_err(|e| {
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Error::Fetch(format!("render script returned invalid JSON: {e}"))
        } else {
            Error::Fetch(format!(
                "render script returned invalid JSON: {e}. stderr: {stderr}"
            ))
        }
    })?;

    if v.get("ok").and_then(|x| x.as_bool()) != Some(true) {
        let code = v
            .pointer("/error/code")
            .and_then(|x| x.as_str())
            .unwrap_or("fetch_failed");
        let message = v
            .pointer("/error/message")
            .and_then(|x| x.as_str())
            .unwrap_or("render failed");
        let hint = v
            .pointer("/error/hint")
            .and_then(|x| x.as_str())
            .unwrap_or("")
            .trim();
        let message = if hint.is_empty() {
            message.to_string()
        } else {
            format!("{message}. {hint}")
        };
        return Err(match code {
            "not_configured" => Error::NotConfigured(message),
            "invalid_params" => Error::InvalidUrl(message),
            _ => Error::Fetch(message),
        });
    }

    let html = v
        .get("html")
        .and_then(|x| x.as_str())
        .unwrap_or("")
        .to_string();
    // Empty markup is "no content available", never success.
    if html.trim().is_empty() {
        return Err(Error::Fetch("rendered page returned empty HTML".to_string()));
    }

    Ok(RenderedPage {
        final_url: v
            .get("final_url")
            .and_then(|x| x.as_str())
            .unwrap_or(url)
            .to_string(),
        status: v.get("status").and_then(|x| x.as_u64()).map(|n| n as u16),
        html,
        elapsed_ms: v.get("elapsed_ms").and_then(|x| x.as_u64()).unwrap_or(0),
        captcha_detected: v
            .get("captcha_detected")
            .and_then(|x| x.as_bool())
            .unwrap_or(false),
        mode: v
            .get("mode")
            .and_then(|x| x.as_str())
            .unwrap_or("remote")
            .to_string(),
    })
}

pub async fn render_html_playwright(url: &str, cfg: &RenderConfig) -> Result<RenderedPage> {
    cfg.validate()?;

    let args_json = render_args(url, cfg).to_string();
    let mut cmd = tokio::process::Command::new(&cfg.node_bin);
    if let Some(node_path) = &cfg.node_path {
        cmd.env("NODE_PATH", node_path);
    }
    let mut child = cmd
        .arg("-e")
        .arg(JS)
        .kill_on_drop(true)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::NotConfigured(format!(
                "rendered fetch requires Node.js (`{}`) and the Playwright npm package: {e}",
                cfg.node_bin
            ))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A failed write surfaces as the script's own JSON error.
        let _ = stdin.write_all(args_json.as_bytes()).await;
        let _ = stdin.shutdown().await;
    }

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Fetch("render: missing stdout pipe".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Fetch("render: missing stderr pipe".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stderr, &mut buf).await;
        buf
    });

    match tokio::time::timeout(Duration::from_millis(cfg.hard_timeout_ms), child.wait()).await {
        Ok(r) => {
            r.map_err(|e| Error::Fetch(format!("render process wait failed: {e}")))?;
        }
        Err(_) => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(Error::Fetch(format!(
                "render hard timeout after {}ms",
                cfg.hard_timeout_ms
            )));
        }
    }

    let out_stdout = stdout_task.await.unwrap_or_default();
    let out_stderr = stderr_task.await.unwrap_or_default();
    parse_render_output(
        url,
        &String::from_utf8_lossy(&out_stdout),
        &String::from_utf8_lossy(&out_stderr),
    )
}

#[derive(Debug, Clone, Default)]
pub struct RenderedFetcher {
    config: RenderConfig,
}

impl RenderedFetcher {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(RenderConfig::from_env())
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl PageFetcher for RenderedFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Rendered
    }

    async fn fetch(&self, url: &str) -> Result<RawPage> {
        let url = crate::parse_http_url(url)?;
        tracing::info!(%url, settle_ms = self.config.settle_ms, "rendering page");
        let page = render_html_playwright(url.as_str(), &self.config).await?;
        if page.captcha_detected {
            tracing::warn!(
                %url,
                wait_ms = self.config.captcha_wait_ms,
                "challenge element detected; waited without solving"
            );
        }
        tracing::debug!(
            %url,
            mode = %page.mode,
            elapsed_ms = page.elapsed_ms,
            html_bytes = page.html.len(),
            "rendered page"
        );
        Ok(RawPage {
            url: url.to_string(),
            final_url: page.final_url,
            strategy: FetchStrategy::Rendered,
            status: page.status,
            html: page.html,
            captcha_detected: page.captcha_detected,
        })
    }
}
