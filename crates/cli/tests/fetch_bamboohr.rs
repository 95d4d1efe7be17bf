// Integration tests for `rgrid fetch bamboohr` and `rgrid populate --bamboohr`.
// Run with: cargo test -p rostergrid-cli --test fetch_bamboohr

use std::fs;
use std::process::Command;

use httpmock::prelude::*;
use rostergrid_engine::sheet::Sheet;
use rostergrid_engine::validation::{ListSource, ValidationType};
use rostergrid_engine::workbook::Workbook;
use rostergrid_io::xlsx;
use tempfile::TempDir;

const DIRECTORY_PATH: &str = "/api/gateway.php/acme/v1/employees/directory";

fn rgrid() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rgrid"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    // Clear env to avoid leaking a real key or config into tests
    cmd.env_remove("BAMBOOHR_API_KEY");
    cmd.env_remove("BAMBOOHR_SUBDOMAIN");
    cmd.env_remove("BAMBOOHR_BASE_URL");
    cmd.env_remove("RGRID_CONFIG");
    cmd.env("XDG_CONFIG_HOME", "/nonexistent");
    cmd.env("HOME", "/nonexistent");
    cmd
}

fn mock_directory(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path(DIRECTORY_PATH);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({
                "fields": [],
                "employees": [
                    { "id": "2379", "displayName": "Hanifah Abolais", "supervisorId": null,
                      "jobTitle": "Support Lead", "location": "Lagos" },
                    { "id": "2345", "displayName": "Byron Andino", "supervisorId": "2379",
                      "jobTitle": "Support Agent", "location": "Remote" },
                    { "id": "2227", "displayName": "Dean Antonio", "supervisorId": "1",
                      "jobTitle": "Support Agent", "location": "Remote" }
                ]
            }));
    })
}

#[test]
fn missing_api_key_exits_50() {
    let output = rgrid()
        .args(["fetch", "bamboohr", "--subdomain", "acme", "--quiet"])
        .output()
        .expect("failed to run rgrid");

    assert_eq!(
        output.status.code(),
        Some(50),
        "expected exit 50, got {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr),
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing BambooHR API key"), "stderr: {}", stderr);
}

#[test]
fn missing_subdomain_exits_50() {
    let output = rgrid()
        .args(["fetch", "bamboohr", "--api-key", "k", "--quiet"])
        .output()
        .expect("failed to run rgrid");

    assert_eq!(output.status.code(), Some(50));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing BambooHR subdomain"), "stderr: {}", stderr);
}

#[test]
fn unknown_view_exits_2() {
    let output = rgrid()
        .args(["fetch", "bamboohr", "departments", "--api-key", "k", "--subdomain", "acme"])
        .output()
        .expect("failed to run rgrid");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn reports_to_json_to_stdout() {
    let server = MockServer::start();
    let m = mock_directory(&server);

    let output = rgrid()
        .args(["fetch", "bamboohr", "reports-to", "--quiet"])
        .env("BAMBOOHR_API_KEY", "test_key")
        .env("BAMBOOHR_SUBDOMAIN", "acme")
        .env("BAMBOOHR_BASE_URL", server.base_url())
        .output()
        .expect("failed to run rgrid");

    m.assert();
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr),
    );
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["employee_id"], "2379");
    assert_eq!(rows[0]["supervisor_name"], serde_json::Value::Null);
    assert_eq!(rows[1]["supervisor_name"], "Hanifah Abolais");
    assert_eq!(rows[2]["supervisor_id"], "1");
    assert_eq!(rows[2]["supervisor_name"], "Unknown");
}

#[test]
fn job_titles_csv_file() {
    let server = MockServer::start();
    mock_directory(&server);
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("titles.csv");

    let output = rgrid()
        .args(["fetch", "bamboohr", "job-titles", "--api-key", "test_key", "--subdomain", "acme", "--quiet"])
        .arg("--out")
        .arg(&out)
        .env("BAMBOOHR_BASE_URL", server.base_url())
        .output()
        .expect("failed to run rgrid");

    assert_eq!(output.status.code(), Some(0));
    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(csv, "job_title\nSupport Agent\nSupport Lead\n");
}

#[test]
fn employees_json_feeds_populate() {
    let server = MockServer::start();
    mock_directory(&server);
    let dir = TempDir::new().unwrap();
    let roster = dir.path().join("roster.json");

    let output = rgrid()
        .args(["fetch", "bamboohr", "--api-key", "test_key", "--subdomain", "acme", "--quiet"])
        .arg("--out")
        .arg(&roster)
        .env("BAMBOOHR_BASE_URL", server.base_url())
        .output()
        .expect("failed to run rgrid");
    assert_eq!(output.status.code(), Some(0));

    let output = rgrid()
        .arg("labels")
        .arg("--roster")
        .arg(&roster)
        .output()
        .expect("failed to run rgrid");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Hanifah Abolais (2379)\nByron Andino (2345)\nDean Antonio (2227)\n"
    );
}

#[test]
fn auth_failure_exits_51() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(DIRECTORY_PATH);
        then.status(401).header("x-bamboohr-error-message", "Invalid API key");
    });

    let output = rgrid()
        .args(["fetch", "bamboohr", "--api-key", "bad", "--subdomain", "acme", "--quiet"])
        .env("BAMBOOHR_BASE_URL", server.base_url())
        .output()
        .expect("failed to run rgrid");

    assert_eq!(output.status.code(), Some(51));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("BambooHR auth failed (401): Invalid API key"), "stderr: {}", stderr);
    assert!(stderr.contains("hint:"), "stderr: {}", stderr);
}

#[test]
fn populate_from_bamboohr() {
    let server = MockServer::start();
    let m = mock_directory(&server);
    let dir = TempDir::new().unwrap();

    let mut sheet = Sheet::new("Sheet1");
    for row in 0..4 {
        sheet.set_value(row, 0, "x");
    }
    let book = dir.path().join("onboarding.xlsx");
    xlsx::export(&Workbook::from_sheets(vec![sheet], 0), &book).unwrap();

    let output = rgrid()
        .arg("populate")
        .arg(&book)
        .args(["--bamboohr", "--api-key", "test_key", "--subdomain", "acme", "--quiet"])
        .env("BAMBOOHR_BASE_URL", server.base_url())
        .output()
        .expect("failed to run rgrid");

    m.assert();
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr),
    );

    let (workbook, _) = xlsx::import(&book).unwrap();
    let (range, rule) = workbook.sheets()[0].validations.iter().next().unwrap();
    assert_eq!(range.to_a1(), "L2:L5");
    match &rule.rule_type {
        ValidationType::List(ListSource::Inline(items)) => {
            assert_eq!(items[1], "Byron Andino (2345)");
        }
        other => panic!("unexpected rule {:?}", other),
    }
}
