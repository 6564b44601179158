use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const ENV_OVERRIDES: [&str; 6] = [
    "KBA_LLM_BASE_URL",
    "KBA_LLM_MODEL",
    "KBA_EMBED_BASE_URL",
    "KBA_EMBED_MODEL",
    "KBA_KB_PATH",
    "RUST_LOG",
];

const METADATA_CSV: &str = "\
filepath,filename,file_type,description,tags,last_modified,status,department,author,in_manifest,supersedes,conflict_with,embedding
hr/pto_2023.md,pto_2023.md,md,PTO policy for senior engineers: 15 days,pto|hr,2023-01-01,outdated,HR,Dana,True,,,\"[1.0, 0.0, 0.0]\"
hr/pto_2024.md,pto_2024.md,md,Updated PTO policy for senior engineers: 20 days,pto|hr,2024-06-01,current,HR,Dana,True,hr/pto_2023.md,,\"[0.9, 0.1, 0.0]\"
slack/general.json,general.json,json,Office chatter about snacks,social,2024-02-02,current,,,False,,,
";

fn kba_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_kba"))
}

fn setup_test_env_with(csv: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let rag_dir = root.join("rag");
    fs::create_dir_all(&rag_dir).unwrap();
    fs::write(rag_dir.join("metadata.csv"), csv).unwrap();
    fs::write(
        rag_dir.join("master_tags.json"),
        r#"{"PTO": "pto", "vacation": "pto", "HR": "hr", "social": "social"}"#,
    )
    .unwrap();

    let kb = root.join("kb");
    fs::create_dir_all(kb.join("hr")).unwrap();
    fs::create_dir_all(kb.join("slack")).unwrap();
    fs::write(
        kb.join("hr/pto_2024.md"),
        "# PTO\n\nSenior engineers receive 20 days of PTO per year.",
    )
    .unwrap();
    fs::write(
        kb.join("slack/general.json"),
        r#"[{"timestamp": "2024-02-02T09:30:00Z", "user": "sam", "channel": "general", "text": "snacks are here"}]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[paths]
kb_root = "{root}/kb"
metadata_csv = "{root}/rag/metadata.csv"
master_tags_json = "{root}/rag/master_tags.json"

[embedding]
dims = 3

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kba.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn setup_test_env() -> (TempDir, PathBuf) {
    setup_test_env_with(METADATA_CSV)
}

fn run_kba(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kba_binary();
    let mut command = Command::new(&binary);
    for var in ENV_OVERRIDES {
        command.env_remove(var);
    }
    let output = command
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kba binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_index_summary() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kba(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Documents:   3"), "{stdout}");
    assert!(stdout.contains("Tags:        3"), "{stdout}");
    assert!(stdout.contains("Embedded:    2 / 3 (dims 3)"), "{stdout}");
    assert!(stdout.contains("hr/pto_2023.md <-> hr/pto_2024.md"), "{stdout}");
}

#[test]
fn test_index_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kba(&config_path, &["index", "--json"]);
    assert!(success, "index --json failed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["summary"]["documents"], 3);
    assert_eq!(value["summary"]["conflict_pairs"], 1);
    assert_eq!(value["by_status"]["current"], 2);
    assert_eq!(value["by_status"]["outdated"], 1);
    assert_eq!(
        value["conflicts"],
        serde_json::json!([["hr/pto_2023.md", "hr/pto_2024.md"]])
    );
}

#[test]
fn test_get_document_body() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kba(&config_path, &["get", "hr/pto_2024.md"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("status:        current"));
    assert!(stdout.contains("supersedes:    hr/pto_2023.md"));
    assert!(stdout.contains("conflicts:     hr/pto_2023.md"));
    assert!(stdout.contains("Senior engineers receive 20 days"));
}

#[test]
fn test_get_flattens_message_log() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_kba(&config_path, &["get", "slack/general.json"]);
    assert!(success);
    assert!(stdout.contains("[2024-02-02T09:30] #general sam: snacks are here"));
}

#[test]
fn test_get_indexed_but_missing_file() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_kba(&config_path, &["get", "hr/pto_2023.md"]);
    assert!(success);
    assert!(stdout.contains("[File not found: hr/pto_2023.md]"));
}

#[test]
fn test_get_unknown_path_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_kba(&config_path, &["get", "nope.md"]);
    assert!(!success);
    assert!(stderr.contains("document not found in index"));
}

#[test]
fn test_empty_description_is_fatal() {
    let csv = "filepath,description,tags\na.md,,\n";
    let (_tmp, config_path) = setup_test_env_with(csv);

    let (_, stderr, success) = run_kba(&config_path, &["index"]);
    assert!(!success);
    assert!(stderr.contains("a.md"), "{stderr}");
}

#[test]
fn test_inconsistent_embedding_dims_is_fatal() {
    let csv = "filepath,description,embedding\na.md,A,\"[1.0, 0.0]\"\nb.md,B,\"[1.0, 0.0, 0.0]\"\n";
    let (_tmp, config_path) = setup_test_env_with(csv);

    let (_, _, success) = run_kba(&config_path, &["index"]);
    assert!(!success);
}

#[test]
fn test_ask_requires_endpoints() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_kba(&config_path, &["ask", "How many PTO days?"]);
    assert!(!success);
    assert!(stderr.contains("embedding.base_url must be set"), "{stderr}");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_kba(&tmp.path().join("missing.toml"), &["index"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_value_fails() {
    let (_tmp, config_path) = setup_test_env();
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[retrieval]\ntop_k = 0\n");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_kba(&config_path, &["index"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.top_k"), "{stderr}");
}
