use std::io::Write;

fn html_file(html: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(".html")
        .tempfile()
        .expect("tempfile");
    f.write_all(html.as_bytes()).expect("write html");
    f
}

#[test]
fn clean_strips_scripts_and_prints_visible_lines() {
    let f = html_file("<html><body><script>x</script><h1>Hello</h1><p>World</p></body></html>");
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("pagesift"))
        .args(["clean", "--file"])
        .arg(f.path())
        .env("PAGESIFT_DOTENV", "0")
        .assert()
        .success()
        .stdout("Hello\nWorld\n");
}

#[test]
fn clean_json_output_reports_char_count() {
    let f = html_file(
        "<html><head><style>p{}</style></head><body>\n  <p>  a  </p>\n\n<p>b</p></body></html>",
    );
    let out = std::process::Command::new(assert_cmd::cargo::cargo_bin!("pagesift"))
        .args(["clean", "--output", "json", "--file"])
        .arg(f.path())
        .env("PAGESIFT_DOTENV", "0")
        .output()
        .expect("run pagesift clean");
    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse clean json");
    assert_eq!(v["kind"].as_str(), Some("clean"));
    assert_eq!(v["text"].as_str(), Some("a\nb"));
    assert_eq!(v["text_chars"].as_u64(), Some(3));
}

#[test]
fn clean_missing_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("pagesift"))
        .args(["clean", "--file"])
        .arg(dir.path().join("missing.html"))
        .env("PAGESIFT_DOTENV", "0")
        .assert()
        .code(1)
        .stderr(predicates::str::contains("error: invalid params: cannot read"));
}

#[test]
fn clean_missing_file_json_uses_error_envelope() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = std::process::Command::new(assert_cmd::cargo::cargo_bin!("pagesift"))
        .args(["clean", "--output", "json", "--file"])
        .arg(dir.path().join("missing.html"))
        .env("PAGESIFT_DOTENV", "0")
        .output()
        .expect("run pagesift clean");
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse clean error json");
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert_eq!(v["kind"].as_str(), Some("clean"));
    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["error"]["code"].as_str(), Some("invalid_params"));
    assert!(v["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("missing.html"));
    assert_eq!(v["error"]["retryable"].as_bool(), Some(false));
}
