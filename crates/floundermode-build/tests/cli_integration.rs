use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use floundermode_core::digest;
use jsonschema::JSONSchema;
use serde_json::Value;

const MVP_THEATER: &str = r#"{
  "term": "MVP Theater",
  "related": ["startup"],
  "definition": "Shipping a clickable demo and calling it a product.",
  "usage": "The launch was pure MVP theater."
}
"#;

struct Site {
    root: PathBuf,
}

impl Site {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("flounder-build-cli-{}", ulid::Ulid::new()));
        for dir in [root.join("terms"), root.join("templates")] {
            fs::create_dir_all(&dir)
                .unwrap_or_else(|err| panic!("failed to create {}: {err}", dir.display()));
        }
        let template = repo_root().join("templates/term.html");
        fs::copy(&template, root.join("templates/term.html"))
            .unwrap_or_else(|err| panic!("failed to copy {}: {err}", template.display()));
        Self { root }
    }

    fn write_term(&self, name: &str, content: &str) {
        fs::write(self.root.join("terms").join(name), content)
            .unwrap_or_else(|err| panic!("failed to write {name}: {err}"));
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("site/terms-manifest.json")
    }

    fn page(&self, stem: &str) -> PathBuf {
        self.root.join("site/terms").join(format!("{stem}.html"))
    }

    fn run<I, S>(&self, args: I) -> Output
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(env!("CARGO_BIN_EXE_flounder-build"))
            .args(args)
            .current_dir(&self.root)
            .env_remove("FLOUNDER_CONFIG")
            .env_remove("FLOUNDER_TERMS_DIR")
            .env_remove("FLOUNDER_OUTPUT_DIR")
            .env_remove("FLOUNDER_TEMPLATE")
            .env_remove("FLOUNDER_MANIFEST")
            .env("FLOUNDER_BASE_URL", "https://floundermode.example")
            .env("RUST_LOG", "warn")
            .output()
            .unwrap_or_else(|err| panic!("failed to execute flounder-build: {err}"))
    }

    fn run_ok<I, S>(&self, args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(args);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!(
                "flounder-build failed (status={}):\nstdout:\n{stdout}\nstderr:\n{stderr}",
                output.status
            );
        }
        stdout
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read JSON file {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("invalid JSON in {}: {err}", path.display()))
}

fn validate_manifest(instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas/manifest.schema.json");
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("manifest failed schema validation:\n{}", errors.join("\n"));
    }
}

fn stdout_lines(stdout: &str) -> Vec<&str> {
    stdout.lines().map(str::trim).collect()
}

// Test IDs: TBLD-001
#[test]
fn first_run_renders_new_term_and_records_its_digest() {
    let site = Site::new();
    site.write_term("mvp-theater.json", MVP_THEATER);

    let stdout = site.run_ok(std::iter::empty::<&str>());
    assert!(stdout.starts_with("Build complete: 1 new, 0 changed, 0 regenerated, 0 unchanged, 0 failed"));
    assert!(stdout_lines(&stdout).contains(&"new: mvp-theater.json"));

    let page = fs::read_to_string(site.page("mvp-theater"))
        .unwrap_or_else(|err| panic!("page was not written: {err}"));
    assert!(page.contains("MVP Theater"));
    assert!(page.contains("Shipping a clickable demo and calling it a product."));
    assert!(page.contains("https://floundermode.example/terms/mvp-theater.html"));
    assert!(!page.contains("{{"));

    let manifest = read_json_file(&site.manifest_path());
    validate_manifest(&manifest);
    assert_eq!(
        manifest["termHashes"]["mvp-theater.json"],
        Value::String(digest(MVP_THEATER.as_bytes()).to_hex())
    );
    assert_eq!(manifest["terms"], serde_json::json!(["mvp-theater.json"]));
    assert_eq!(manifest["version"], "2.0");
}

// Test IDs: TBLD-002
#[test]
fn second_run_without_edits_writes_nothing() {
    let site = Site::new();
    site.write_term("mvp-theater.json", MVP_THEATER);
    site.run_ok(std::iter::empty::<&str>());

    let page = site.page("mvp-theater");
    let before = fs::metadata(&page)
        .and_then(|meta| meta.modified())
        .unwrap_or_else(|err| panic!("failed to stat page: {err}"));

    let stdout = site.run_ok(["--verbose"]);
    assert!(stdout.starts_with("Build complete: 0 new, 0 changed, 0 regenerated, 1 unchanged"));
    assert!(stdout_lines(&stdout).contains(&"unchanged: mvp-theater.json"));

    let after = fs::metadata(&page)
        .and_then(|meta| meta.modified())
        .unwrap_or_else(|err| panic!("failed to stat page: {err}"));
    assert_eq!(before, after);

    let quiet = site.run_ok(std::iter::empty::<&str>());
    assert!(!quiet.contains("unchanged: mvp-theater.json"));
}

// Test IDs: TBLD-003
#[test]
fn edits_force_and_deletions_are_classified() {
    let site = Site::new();
    site.write_term("mvp-theater.json", MVP_THEATER);
    site.write_term(
        "pivot.json",
        r#"{"term":"Pivot","related":[],"definition":"Admitting the plan failed, with a slide.","usage":""}"#,
    );
    site.run_ok(std::iter::empty::<&str>());

    let edited = MVP_THEATER.replace("clickable demo", "slide deck");
    site.write_term("mvp-theater.json", &edited);
    let stdout = site.run_ok(std::iter::empty::<&str>());
    assert!(stdout.starts_with("Build complete: 0 new, 1 changed, 0 regenerated, 1 unchanged"));

    let stdout = site.run_ok(["-f"]);
    assert!(stdout.starts_with("Build complete: 0 new, 0 changed, 2 regenerated, 0 unchanged"));

    fs::remove_file(site.root.join("terms/pivot.json"))
        .unwrap_or_else(|err| panic!("failed to delete term file: {err}"));
    let stdout = site.run_ok(std::iter::empty::<&str>());
    assert!(stdout.contains("1 pruned"));

    let manifest = read_json_file(&site.manifest_path());
    validate_manifest(&manifest);
    assert!(manifest["termHashes"].get("pivot.json").is_none());
    assert_eq!(
        manifest["termHashes"]["mvp-theater.json"],
        Value::String(digest(edited.as_bytes()).to_hex())
    );
}

// Test IDs: TBLD-004
#[test]
fn broken_file_is_reported_without_aborting_the_build() {
    let site = Site::new();
    site.write_term("mvp-theater.json", MVP_THEATER);
    site.write_term("broken.json", "{ not json");

    let stdout = site.run_ok(std::iter::empty::<&str>());
    assert!(stdout.contains("1 new"));
    assert!(stdout.contains("1 failed"));
    assert!(stdout_lines(&stdout).iter().any(|line| line.starts_with("failed: broken.json")));

    let manifest = read_json_file(&site.manifest_path());
    assert!(manifest["termHashes"].get("broken.json").is_none());
}

// Test IDs: TBLD-005
#[test]
fn missing_terms_dir_exits_non_zero() {
    let site = Site::new();
    fs::remove_dir_all(site.root.join("terms"))
        .unwrap_or_else(|err| panic!("failed to remove terms dir: {err}"));

    let output = site.run(std::iter::empty::<&str>());
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("terms"), "stderr was: {stderr}");
    assert!(!site.manifest_path().exists());
}

// Test IDs: TBLD-006
#[test]
fn help_lists_flags() {
    let site = Site::new();
    let stdout = site.run_ok(["--help"]);
    assert!(stdout.contains("--force"));
    assert!(stdout.contains("--verbose"));
}

// Test IDs: TBLD-007
#[test]
fn share_links_use_the_file_stem_when_it_differs_from_the_slug() {
    let site = Site::new();
    site.write_term(
        "growth.json",
        r#"{"term":"Growth Hacking","related":[],"definition":"Buying users and calling it virality.","usage":""}"#,
    );
    site.run_ok(std::iter::empty::<&str>());

    let page = fs::read_to_string(site.page("growth"))
        .unwrap_or_else(|err| panic!("page was not written: {err}"));
    assert!(page.contains("https://floundermode.example/terms/growth.html"));
    assert!(!page.contains("growth-hacking.html"));
}
