use pagesift_core::Error;
use serde::Serialize;

pub const SCHEMA_VERSION: u64 = 1;

/// Human-readable guidance for a warning code carried in a payload's `warnings` list.
pub fn warning_hint(code: &str) -> Option<&'static str> {
    match code {
        "captcha_detected" => Some(
            "A challenge element was present after the settle interval. The page was read anyway; content may be a challenge wall. Try again later or use a different browser endpoint.",
        ),
        "empty_page" => Some(
            "The page produced no visible text. If it relies on scripts, use --strategy rendered.",
        ),
        "preview_truncated" => Some(
            "Only the first --preview-chars characters are shown. Raise --preview-chars to see more.",
        ),
        "chunks_failed" => Some(
            "Some chunks failed at the model and were skipped; the result covers the remaining chunks. Check that the model backend is reachable and not overloaded.",
        ),
        "empty_result" => Some(
            "No chunk produced a match. Rephrase the description or widen the category.",
        ),
        _ => None,
    }
}

pub fn warning_hints_from(codes: &[&'static str]) -> serde_json::Value {
    let mut m = serde_json::Map::new();
    for c in codes {
        if let Some(h) = warning_hint(c) {
            m.insert((*c).to_string(), serde_json::json!(h));
        }
    }
    serde_json::Value::Object(m)
}

fn error_hint(err: &Error) -> &'static str {
    match err {
        Error::InvalidUrl(_) => "Pass an absolute http(s) URL.",
        Error::InvalidParams(_) => "Check the command-line arguments.",
        Error::Fetch(_) => {
            "The page could not be retrieved. Check the URL, network access, and (for --strategy rendered) the browser endpoint."
        }
        Error::Extraction(_) => "The model call failed. Check that the model backend is running.",
        Error::NotConfigured(_) => "Run `pagesift doctor` to see which settings are missing.",
        Error::NotSupported(_) => "",
    }
}

fn retryable(err: &Error) -> bool {
    matches!(err, Error::Fetch(_) | Error::Extraction(_))
}

pub fn error_obj(err: &Error) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject<'a> {
        code: &'static str,
        message: String,
        hint: &'a str,
        retryable: bool,
    }

    let e = ErrorObject {
        code: err.code(),
        message: err.to_string(),
        hint: error_hint(err),
        retryable: retryable(err),
    };
    serde_json::to_value(e).unwrap_or_else(|_| {
        serde_json::json!({
            "code": err.code(),
            "message": err.to_string(),
        })
    })
}

pub fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub fn error_payload(kind: &str, err: &Error, elapsed_ms: u128) -> serde_json::Value {
    let mut v = serde_json::json!({
        "ok": false,
        "error": error_obj(err),
    });
    add_envelope_fields(&mut v, kind, elapsed_ms);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_to_a_stable_retryable_code() {
        let v = error_payload("scrape", &Error::Fetch("connection refused".into()), 3);
        assert_eq!(v["ok"], false);
        assert_eq!(v["schema_version"], SCHEMA_VERSION);
        assert_eq!(v["kind"], "scrape");
        assert_eq!(v["error"]["code"], "fetch_failed");
        assert_eq!(v["error"]["retryable"], true);
        assert!(v["error"]["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        let v = error_obj(&Error::NotConfigured("PAGESIFT_BROWSER_ENDPOINT".into()));
        assert_eq!(v["code"], "not_configured");
        assert_eq!(v["retryable"], false);
        assert!(v["hint"].as_str().unwrap().contains("doctor"));
    }

    #[test]
    fn hints_only_for_known_codes() {
        let v = warning_hints_from(&["captcha_detected", "nope"]);
        assert!(v.get("captcha_detected").is_some());
        assert!(v.get("nope").is_none());
    }
}
