//! Integration tests for the `docmerge` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// CLI command isolated from any user or project configuration
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docmerge"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .env_remove("DOCMERGE_MIN_SIZE_RATIO");
    cmd
}

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{p}</w:t></w:r></w:p>"#))
        .collect();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    write!(
        zip,
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
    .unwrap();
    fs::write(path, zip.finish().unwrap().into_inner()).unwrap();
}

fn document_xml(path: &Path) -> String {
    let bytes = fs::read(path).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    cli(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("preview"));
}

#[test]
fn test_extract_json() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("offer.docx");
    write_docx(&template, &["Hello {{first name}}, your code is {{code-1}}."]);

    let output = cli(dir.path())
        .args(["extract", "offer.docx", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        json["templateText"],
        "Hello {{first name}}, your code is {{code-1}}."
    );
    assert_eq!(json["detectedVariables"][0]["name"], "first_name");
    assert_eq!(json["detectedVariables"][1]["label"], "Code 1");
    assert_eq!(json["extractionDegraded"], false);
}

#[test]
fn test_extract_rejects_invalid_placeholder() {
    let dir = TempDir::new().unwrap();
    write_docx(&dir.path().join("bad.docx"), &["Dear {{1st}}"]);

    cli(dir.path())
        .args(["extract", "bad.docx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid placeholder tokens: 1st"));
}

#[test]
fn test_merge_writes_document() {
    let dir = TempDir::new().unwrap();
    write_docx(&dir.path().join("offer.docx"), &["Dear {{first_name}} &amp; co"]);
    fs::write(dir.path().join("ana.json"), r#"{"first_name": "Ana <A>"}"#).unwrap();

    cli(dir.path())
        .args(["merge", "offer.docx", "--entry", "ana.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("offer-merged.docx"));

    let xml = document_xml(&dir.path().join("offer-merged.docx"));
    assert!(xml.contains("Dear Ana &lt;A&gt; &amp; co"), "{xml}");
}

#[test]
fn test_merge_preview_to_stdout() {
    let dir = TempDir::new().unwrap();
    write_docx(&dir.path().join("offer.docx"), &["Dear {{first_name}}"]);
    fs::write(
        dir.path().join("entry.json"),
        r#"{"id": "e1", "values": {"first_name": "Bo"}}"#,
    )
    .unwrap();

    cli(dir.path())
        .args(["merge", "offer.docx", "-e", "entry.json", "--preview"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<p>Dear Bo</p>"));
    assert!(!dir.path().join("offer-merged.docx").exists());
}

#[test]
fn test_strict_merge_fails_when_degraded() {
    let dir = TempDir::new().unwrap();
    write_docx(&dir.path().join("t.docx"), &["Hi {{a}} {{b}}"]);
    fs::write(dir.path().join("e.json"), r#"{"a": "{{b}}"}"#).unwrap();

    cli(dir.path())
        .args(["merge", "t.docx", "-e", "e.json", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Merge degraded"));

    // without --strict the unmerged template is written
    cli(dir.path())
        .args(["merge", "t.docx", "-e", "e.json", "-o", "out.docx"])
        .assert()
        .success()
        .stderr(predicate::str::contains("unresolved: b"));
    assert_eq!(
        fs::read(dir.path().join("out.docx")).unwrap(),
        fs::read(dir.path().join("t.docx")).unwrap()
    );
}

#[test]
fn test_merge_of_non_document_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), "Hi {{a}}").unwrap();
    fs::write(dir.path().join("e.json"), "{}").unwrap();

    cli(dir.path())
        .args(["merge", "notes.txt", "-e", "e.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Format error"));
}

#[test]
fn test_config_init_and_show() {
    let dir = TempDir::new().unwrap();

    cli(dir.path())
        .args(["config", "init"])
        .assert()
        .success();
    let written = fs::read_to_string(dir.path().join("docmerge.toml")).unwrap();
    assert!(written.contains("min_size_ratio"));

    // second init without --force refuses
    cli(dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    fs::write(
        dir.path().join("docmerge.toml"),
        "[ocr]\nlanguage = \"deu\"\n",
    )
    .unwrap();
    cli(dir.path())
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"language\": \"deu\""));
}
