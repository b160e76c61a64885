//! End-to-end validation runs against a shell script standing in for the
//! compiler front end.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::common::{MAIN_URI, RECV_TIMEOUT, TestClient, leftover_snapshots, shell_analyzer_config};

const MIAN_CHECKER: &str = r#"
if grep -q mian "$1"; then
    echo "[1:4] unknown identifier 'mian'" >&2
    exit 1
fi
"#;

/// Wait for every snapshot artifact to be released.
async fn assert_snapshots_released(client: &TestClient) {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while leftover_snapshots(client.snapshot_dir()) > 0 {
        assert!(
            Instant::now() < deadline,
            "snapshot artifacts were not released"
        );
        time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn typo_is_reported_then_cleared_when_fixed() {
    let mut client = TestClient::initialized(MIAN_CHECKER).await;
    client.open(MAIN_URI, 1, "fn mian() {}").await;

    let params = client.diagnostics().await;
    assert_eq!(params["uri"], MAIN_URI);
    assert_eq!(params["version"], 1);
    let diags = params["diagnostics"].as_array().unwrap();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0]["message"], "unknown identifier 'mian'");
    assert_eq!(diags[0]["severity"], 1);
    assert_eq!(diags[0]["source"], "epsilon-frontend");
    assert_eq!(diags[0]["range"]["start"]["line"], 0);
    assert_eq!(diags[0]["range"]["start"]["character"], 3);
    assert_eq!(diags[0]["range"]["end"]["line"], 0);
    assert_eq!(diags[0]["range"]["end"]["character"], 7);

    client.edit(MAIN_URI, 2, (0, 3), (0, 7), "main").await;
    let params = client.diagnostics().await;
    assert_eq!(params["version"], 2);
    assert_eq!(params["diagnostics"], serde_json::json!([]));

    assert_snapshots_released(&client).await;
}

#[tokio::test]
async fn fixed_width_span_without_refinement() {
    let snapshots = tempfile::tempdir().unwrap();
    let mut config = shell_analyzer_config(MIAN_CHECKER, snapshots.path());
    config.precise_spans = false;
    let mut client = TestClient::start_with(config, snapshots);
    client.request("initialize", serde_json::json!({})).await;

    client.open(MAIN_URI, 1, "fn mian() {}").await;
    let params = client.diagnostics().await;
    assert_eq!(params["diagnostics"][0]["range"]["start"]["character"], 3);
    assert_eq!(params["diagnostics"][0]["range"]["end"]["character"], 13);
}

#[tokio::test]
async fn noise_on_stderr_is_ignored() {
    let script = r#"
echo "Picked up JAVA_TOOL_OPTIONS: -Xmx64m" >&2
echo "[3:5] unexpected token" >&2
echo "    at com.epsilon.frontend.Parser.expect(Parser.java:88)" >&2
echo "[10:1] missing semicolon" >&2
echo "stdout is not diagnostics: [1:1] nope"
exit 1
"#;
    let mut client = TestClient::initialized(script).await;
    client.open(MAIN_URI, 1, "var x = 1;\n").await;

    let params = client.diagnostics().await;
    let diags = params["diagnostics"].as_array().unwrap();
    assert_eq!(diags.len(), 2);
    assert_eq!(diags[0]["message"], "unexpected token");
    assert_eq!(diags[0]["range"]["start"]["line"], 2);
    assert_eq!(diags[0]["range"]["start"]["character"], 4);
    // Beyond the document text: fixed-width span.
    assert_eq!(diags[0]["range"]["end"]["character"], 14);
    assert_eq!(diags[1]["message"], "missing semicolon");
    assert_eq!(diags[1]["range"]["start"]["line"], 9);
    assert_eq!(diags[1]["range"]["end"]["character"], 10);
}

#[tokio::test]
async fn slow_stale_run_never_overwrites_newer_result() {
    let script = r#"
if grep -q slow "$1"; then
    sleep 1
    echo "[1:1] stale" >&2
else
    echo "[1:1] fresh" >&2
fi
"#;
    let mut client = TestClient::initialized(script).await;
    client.open(MAIN_URI, 1, "slow").await;
    client.replace(MAIN_URI, 2, "fast").await;

    let params = client.diagnostics().await;
    assert_eq!(params["version"], 2);
    assert_eq!(params["diagnostics"][0]["message"], "fresh");

    // Give the slow run time to finish, then round-trip a request so the
    // server has processed it.
    time::sleep(Duration::from_millis(1500)).await;
    client
        .request("textDocument/completion", serde_json::json!({}))
        .await;
    assert!(
        client.pending_diagnostics().is_empty(),
        "stale diagnostics published: {:?}",
        client.pending_diagnostics()
    );
    assert_snapshots_released(&client).await;
}

#[tokio::test]
async fn close_clears_and_suppresses_in_flight_run() {
    let script = r#"
sleep 1
echo "[1:1] late" >&2
"#;
    let mut client = TestClient::initialized(script).await;
    client.open(MAIN_URI, 1, "var x = 1;").await;
    client.close(MAIN_URI).await;

    let params = client.diagnostics().await;
    assert_eq!(params["uri"], MAIN_URI);
    assert_eq!(params["diagnostics"], serde_json::json!([]));
    assert!(params.get("version").is_none());

    time::sleep(Duration::from_millis(1500)).await;
    client
        .request("textDocument/completion", serde_json::json!({}))
        .await;
    assert!(client.pending_diagnostics().is_empty());
    assert_snapshots_released(&client).await;
}

#[tokio::test]
async fn save_revalidates_current_text() {
    let script = r#"echo "[1:1] checked $(cat "$1")" >&2"#;
    let mut client = TestClient::initialized(script).await;
    client.open(MAIN_URI, 1, "one").await;
    assert_eq!(
        client.diagnostics().await["diagnostics"][0]["message"],
        "checked one"
    );

    client.replace(MAIN_URI, 2, "two").await;
    assert_eq!(
        client.diagnostics().await["diagnostics"][0]["message"],
        "checked two"
    );

    client
        .notify(
            "textDocument/didSave",
            serde_json::json!({ "textDocument": { "uri": MAIN_URI } }),
        )
        .await;
    let params = client.diagnostics().await;
    assert_eq!(params["version"], 2);
    assert_eq!(params["diagnostics"][0]["message"], "checked two");
}

#[tokio::test]
async fn documents_validate_independently() {
    let script = r#"echo "[1:1] in $(cat "$1")" >&2"#;
    let mut client = TestClient::initialized(script).await;
    let other = "file:///work/lib.epsilon";
    client.open(MAIN_URI, 1, "main").await;
    client.open(other, 1, "lib").await;

    let mut seen = HashSet::new();
    for _ in 0..2 {
        let params = client.diagnostics().await;
        let uri = params["uri"].as_str().unwrap().to_string();
        let message = params["diagnostics"][0]["message"].as_str().unwrap().to_string();
        seen.insert((uri, message));
    }
    assert_eq!(
        seen,
        HashSet::from([
            (MAIN_URI.to_string(), "in main".to_string()),
            (other.to_string(), "in lib".to_string()),
        ])
    );
    assert_snapshots_released(&client).await;
}

#[tokio::test]
async fn missing_analyzer_publishes_nothing_and_keeps_serving() {
    let snapshots = tempfile::tempdir().unwrap();
    let mut config = shell_analyzer_config("true", snapshots.path());
    config.analyzer.command = "epsilon-frontend-that-is-not-installed".to_string();
    let mut client = TestClient::start_with(config, snapshots);
    client.request("initialize", serde_json::json!({})).await;

    client.open(MAIN_URI, 1, "fn main() {}").await;
    let resp = client
        .request("textDocument/completion", serde_json::json!({}))
        .await;
    assert!(resp["result"].is_array());

    assert_snapshots_released(&client).await;
    assert!(client.pending_diagnostics().is_empty());
}

#[tokio::test]
async fn snapshot_holds_document_text_with_configured_extension() {
    let script = r#"
case "$1" in
    */diag_*.epsilon) ;;
    *) echo "[1:1] bad name $1" >&2 ;;
esac
grep -qx 'print "λ";' "$1" || echo "[1:1] bad text" >&2
"#;
    let mut client = TestClient::initialized(script).await;
    client.open(MAIN_URI, 1, "print \"λ\";").await;
    let params = client.diagnostics().await;
    assert_eq!(params["diagnostics"], serde_json::json!([]));
}
