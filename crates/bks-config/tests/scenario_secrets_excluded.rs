//! Secret literals are rejected; env var names pass through untouched.

use bks_config::load_layered_yaml_from_strings;

fn assert_secret_rejected(yaml: &str) {
    let result = load_layered_yaml_from_strings(&[yaml]);
    let err_msg = result.expect_err("secret literal must be rejected").to_string();
    assert!(
        err_msg.contains("CONFIG_SECRET_DETECTED"),
        "error should contain CONFIG_SECRET_DETECTED, got: {err_msg}"
    );
    assert!(
        err_msg.contains("REDACTED"),
        "error must not echo the value, got: {err_msg}"
    );
}

#[test]
fn notion_token_literal_rejected() {
    assert_secret_rejected(
        r#"
account: "U1"
notion:
  token_env: "secret_AbCdEfGhIjKlMnOpQrStUv"
"#,
    );
}

#[test]
fn google_access_token_literal_rejected() {
    assert_secret_rejected(
        r#"
account: "U1"
sheets:
  access_token_env: "ya29.a0AfH6SMBx-fake-token"
"#,
    );
}

#[test]
fn secret_in_array_rejected() {
    assert_secret_rejected(
        r#"
account: "U1"
extra:
  - name: "x"
    token: "ntn_1234567890abcdef"
"#,
    );
}

#[test]
fn env_var_names_accepted() {
    let loaded = load_layered_yaml_from_strings(&[r#"
account: "U1"
notion:
  token_env: "NOTION_TOKEN"
sheets:
  access_token_env: "SHEETS_ACCESS_TOKEN"
"#])
    .expect("env var names are not secrets");

    assert_eq!(
        loaded
            .config_json
            .pointer("/notion/token_env")
            .and_then(|v| v.as_str()),
        Some("NOTION_TOKEN")
    );
    assert!(loaded.canonical_json.contains("SHEETS_ACCESS_TOKEN"));
}

#[test]
fn secret_in_overlay_is_caught_after_merge() {
    let base = r#"
account: "U1"
notion:
  token_env: "NOTION_TOKEN"
"#;
    let overlay = r#"
notion:
  token_env: "secret_sneaky_override_value"
"#;
    assert!(load_layered_yaml_from_strings(&[base, overlay]).is_err());
}
