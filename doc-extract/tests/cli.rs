use std::io::Write;
use std::process::{Command, Stdio};

fn doc_extract() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_doc-extract"));
    cmd.env_remove("GEMINI_API_KEY");
    cmd
}

#[test]
fn cli_prints_text_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("surfactant_overview.txt");
    std::fs::write(&path, "# Surfactant\n\nLowers alveolar surface tension.\n").expect("write");

    let output = doc_extract().arg(&path).output().expect("run CLI");
    assert!(
        output.status.success(),
        "cli exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "# Surfactant\n\nLowers alveolar surface tension.\n"
    );
}

#[test]
fn cli_reads_stdin_when_no_args() {
    let mut child = doc_extract()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn CLI");
    child
        .stdin
        .as_mut()
        .expect("stdin open")
        .write_all(b"  Asthma narrows the airways.  ")
        .expect("write stdin");

    let output = child.wait_with_output().expect("read CLI output");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Asthma narrows the airways.\n"
    );
}

#[test]
fn cli_requires_key_for_binary_documents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("guide.pdf");
    std::fs::write(&path, b"%PDF-1.4").expect("write");

    let output = doc_extract().arg(&path).output().expect("run CLI");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("GEMINI_API_KEY"), "stderr: {stderr}");
}

#[test]
fn cli_reports_missing_files() {
    let output = doc_extract()
        .arg("does/not/exist.txt")
        .output()
        .expect("run CLI");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
}

#[test]
fn cli_rejects_zero_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "Bronchodilators relax airway muscle.").expect("write");

    let output = doc_extract()
        .arg("--timeout-secs")
        .arg("0")
        .arg(&path)
        .output()
        .expect("run CLI");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--timeout-secs"), "stderr: {stderr}");
}

#[test]
fn cli_prints_help() {
    let output = doc_extract().arg("--help").output().expect("run CLI");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}
