//! Integration tests for dnslog-analyzer.
//!
//! These tests drive the compiled binary end to end with temporary input
//! files and check the artifact, the summary and the exit codes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::str;
use tempfile::{NamedTempFile, TempDir, tempdir};

const ROUTEROS_LOG: &str = "\
2024-01-15T10:23:45+00:00 dns query from 192.168.88.10:53211: #1 ads.example.com. A
2024-01-15T10:24:10+00:00 dns query from 192.168.88.10:53212: #2 www.example.org. AAAA
jan/15/2024 10:40:00 dns query from 192.168.88.11:40000: #3 44.8.0.10.in-addr.arpa. PTR
2024-01-15T10:41:00+00:00 system,info user admin logged in
";

const NEXTDNS_CSV: &str = "\
timestamp,domain,query_type,dnssec,protocol,client_ip,status,reasons
2024-01-15T11:00:00Z,tracker.example.net,A,false,DNS-over-HTTPS,192.168.88.10,Blocked,\"Ads, Trackers\"
2024-01-15T11:05:00Z,tracker.example.net,A,false,DNS-over-HTTPS,192.168.88.12,BLOCKED,\"Ads, Trackers\"
2024-01-15T11:06:00Z,www.example.org,AAAA,true,DNS-over-HTTPS,192.168.88.12,default,
not-a-timestamp,broken.example.com,A,false,DNS-over-HTTPS,192.168.88.12,default,
";

const BLOCKLIST: &str = "\
# ad and tracking hosts
^ads\\.
tracker
(unclosed
";

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dnslog-analyzer"))
}

/// Helper to create a temporary input file with test content
fn input_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn run(args: &[&str]) -> Output {
    Command::new(binary())
        .args(args)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute binary")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

struct Inputs {
    routeros: NamedTempFile,
    nextdns: NamedTempFile,
    blocklist: NamedTempFile,
    out_dir: TempDir,
}

impl Inputs {
    fn new() -> Self {
        Self {
            routeros: input_file(ROUTEROS_LOG),
            nextdns: input_file(NEXTDNS_CSV),
            blocklist: input_file(BLOCKLIST),
            out_dir: tempdir().unwrap(),
        }
    }

    fn artifact(&self) -> PathBuf {
        self.out_dir.path().join("analysis.json")
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_full_run_writes_artifact() {
    let inputs = Inputs::new();
    let artifact = inputs.artifact();
    let output = run(&[
        "--routeros",
        path_str(inputs.routeros.path()),
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "--blocklist",
        path_str(inputs.blocklist.path()),
        "--output",
        path_str(&artifact),
        "--routeros-date",
        "2024-01-15",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        str::from_utf8(&output.stderr).unwrap()
    );

    let value = read_json(&artifact);
    for key in [
        "stats",
        "devices",
        "time_series",
        "suspicious_domains",
        "relationships",
    ] {
        assert!(value.get(key).is_some(), "missing top-level key {key}");
    }

    let stats = &value["stats"];
    assert_eq!(stats["total_queries"], 6);
    assert_eq!(stats["source_distribution"]["routeros"], 3);
    assert_eq!(stats["source_distribution"]["nextdns"], 3);
    assert_eq!(stats["status_distribution"]["blocked"], 2);
    assert_eq!(stats["suspicious_count"], 3);

    let devices = value["devices"]["devices"].as_array().unwrap();
    let total: u64 = devices
        .iter()
        .map(|d| d["query_count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 6);

    let d12 = devices
        .iter()
        .find(|d| d["ip"] == "192.168.88.12")
        .unwrap();
    assert_eq!(d12["blocked_count"], 1);
    assert_eq!(d12["blocked_percentage"], 50.0);

    let suspicious = value["suspicious_domains"].as_array().unwrap();
    assert_eq!(suspicious[0]["domain"], "ads.example.com");
    assert_eq!(suspicious[0]["matched_pattern"], "^ads\\.");

    let ptr = value["relationships"]["domain_to_ips"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["domain"] == "in-addr.arpa");
    assert!(ptr, "reverse lookups should land in their own bucket");
}

#[test]
fn test_summary_reports_skips_and_discards() {
    let inputs = Inputs::new();
    let artifact = inputs.artifact();
    let output = run(&[
        "--routeros",
        path_str(inputs.routeros.path()),
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "--blocklist",
        path_str(inputs.blocklist.path()),
        "-o",
        path_str(&artifact),
    ]);
    assert!(output.status.success());

    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("RouterOS"), "stderr: {stderr}");
    assert!(stderr.contains("1 skipped"), "stderr: {stderr}");
    assert!(stderr.contains("2 patterns loaded, 1 discarded"), "stderr: {stderr}");
    assert!(stderr.contains("analysis.json"), "stderr: {stderr}");
}

#[test]
fn test_stdout_output_and_compact() {
    let inputs = Inputs::new();
    let output = run(&[
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "--compact",
        "--no-summary",
    ]);
    assert!(output.status.success());

    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert_eq!(stdout.trim_end().lines().count(), 1);
    let value: serde_json::Value = serde_json::from_str(stdout).unwrap();
    assert_eq!(value["stats"]["total_queries"], 3);
}

#[test]
fn test_partial_analysis_when_one_source_is_missing() {
    let inputs = Inputs::new();
    let artifact = inputs.artifact();
    let output = run(&[
        "--routeros",
        "/definitely/not/here.log",
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "-o",
        path_str(&artifact),
    ]);
    assert!(output.status.success());

    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("failed"), "stderr: {stderr}");

    let value = read_json(&artifact);
    let dist = value["stats"]["source_distribution"].as_object().unwrap();
    assert!(dist.get("routeros").is_none());
    assert_eq!(dist["nextdns"], 3);
}

#[test]
fn test_no_usable_source_fails_without_artifact() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("analysis.json");
    let output = run(&[
        "--routeros",
        "/definitely/not/here.log",
        "-o",
        path_str(&artifact),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!artifact.exists());

    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("No usable log source"), "stderr: {stderr}");
}

#[test]
fn test_match_target_base() {
    let inputs = Inputs::new();
    let list = input_file("^example\\.net$\n");
    let output = run(&[
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "--blocklist",
        path_str(list.path()),
        "--match-target",
        "base",
        "--no-summary",
    ]);
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_str(str::from_utf8(&output.stdout).unwrap()).unwrap();
    assert_eq!(value["stats"]["suspicious_count"], 2);
}

#[test]
fn test_yaml_output() {
    let inputs = Inputs::new();
    let output = run(&[
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "--format",
        "yaml",
        "--no-summary",
    ]);
    assert!(output.status.success());
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("suspicious_domains:"));
    assert!(stdout.contains("total_queries: 3"));
}

#[test]
fn test_generate_schema() {
    let output = run(&["--generate-schema"]);
    assert!(output.status.success());
    let schema: serde_json::Value =
        serde_json::from_str(str::from_utf8(&output.stdout).unwrap()).unwrap();
    assert_eq!(schema["title"], "AnalysisOutput");
}

#[test]
fn test_missing_arguments() {
    let output = run(&[]);
    assert!(!output.status.success());
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("--routeros") || stderr.contains("--nextdns"));
}

#[test]
fn test_invalid_configuration() {
    let inputs = Inputs::new();
    let output = run(&["--nextdns", path_str(inputs.nextdns.path()), "--top", "0"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("Configuration error"), "stderr: {stderr}");
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let inputs = Inputs::new();
    let args = [
        "--routeros",
        path_str(inputs.routeros.path()),
        "--nextdns",
        path_str(inputs.nextdns.path()),
        "--blocklist",
        path_str(inputs.blocklist.path()),
        "--routeros-date",
        "2024-01-15",
        "--no-summary",
    ];
    let first = run(&args);
    let second = run(&args);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_version_output() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
