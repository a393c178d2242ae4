use flowgraph::commands::command_argument_builder;
use flowgraph::handlers::*;
use flowgraph_core::IdentityMode;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::level_filters::LevelFilter;

const BATCH: &str = r#"[
    {"request": {"url": "https://tracker.com/p", "initiator": "https://www.site.com"},
     "response": {"responseHeaders": [{"name": "Set-Cookie", "value": "id=1"}]}},
    {"request": {"url": "https://cdn.site.com/app.js", "initiator": "https://www.site.com"}}
]"#;

fn config_from(args: &[&str]) -> RunConfig {
    let matches = command_argument_builder()
        .try_get_matches_from(std::iter::once("flowgraph").chain(args.iter().copied()))
        .unwrap();
    RunConfig::from_matches(&matches)
}

fn config_for(input: &Path, output: &Path) -> RunConfig {
    config_from(&[
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--silent",
    ])
}

// ============================================================================
// Argument Parsing Tests
// ============================================================================

#[test]
fn test_defaults() {
    let config = config_from(&["captures"]);

    assert_eq!(config.input_dir, PathBuf::from("captures"));
    assert_eq!(config.output, PathBuf::from("graph.gexf"));
    assert_eq!(config.identity, IdentityMode::Fqdn);
    assert!(!config.include_first_party);
    assert!(!config.silent);
    assert_eq!(config.base_dir, None);
    assert_eq!(config.verbosity, 0);
}

#[test]
fn test_all_options() {
    let config = config_from(&[
        "captures",
        "--output",
        "out.gexf",
        "--sld",
        "--first-party",
        "-s",
        "-b",
        "/data",
        "-vv",
    ]);

    assert_eq!(config.output, PathBuf::from("out.gexf"));
    assert_eq!(config.identity, IdentityMode::Sld);
    assert!(config.include_first_party);
    assert!(config.silent);
    assert_eq!(config.base_dir, Some(PathBuf::from("/data")));
    assert_eq!(config.verbosity, 2);
}

#[test]
fn test_input_dir_required() {
    let result = command_argument_builder().try_get_matches_from(["flowgraph"]);
    assert!(result.is_err());
}

#[test]
fn test_verbosity_level() {
    assert_eq!(verbosity_level(0), LevelFilter::WARN);
    assert_eq!(verbosity_level(1), LevelFilter::INFO);
    assert_eq!(verbosity_level(2), LevelFilter::DEBUG);
    assert_eq!(verbosity_level(7), LevelFilter::TRACE);
}

#[test]
fn test_expand_path_tilde() {
    let expanded = expand_path("~/captures");
    assert!(!expanded.to_string_lossy().starts_with('~'));
    assert!(expanded.ends_with("captures"));

    assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
}

// ============================================================================
// Input Resolution Tests
// ============================================================================

#[test]
fn test_resolve_existing_input_ignores_base_dir() {
    let dir = TempDir::new().unwrap();
    let resolved = resolve_input_dir(dir.path(), Some(Path::new("/elsewhere")));
    assert_eq!(resolved, dir.path());
}

#[test]
fn test_resolve_relative_input_under_base_dir() {
    let base = TempDir::new().unwrap();
    fs::create_dir(base.path().join("captures-2024")).unwrap();

    let resolved = resolve_input_dir(Path::new("captures-2024"), Some(base.path()));
    assert_eq!(resolved, base.path().join("captures-2024"));
}

#[test]
fn test_resolve_missing_input_without_base_dir() {
    let resolved = resolve_input_dir(Path::new("does-not-exist-here"), None);
    assert_eq!(resolved, PathBuf::from("does-not-exist-here"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[tokio::test]
async fn test_run_missing_input() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("graph.gexf");
    let config = config_for(&dir.path().join("missing"), &output);

    let err = run(&config).await.unwrap_err();
    assert!(format!("{:#}", err).contains("does not exist"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_run_input_not_a_directory() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("batch.json");
    fs::write(&file, BATCH).unwrap();
    let output = dir.path().join("graph.gexf");

    assert!(run(&config_for(&file, &output)).await.is_err());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_run_no_batches() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("notes.txt"), "nothing here").unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("graph.gexf");

    let err = run(&config_for(input.path(), &output)).await.unwrap_err();
    assert!(format!("{:#}", err).contains(".json"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_run_invalid_batch_writes_nothing() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("batch.json"), "[{\"request\": ").unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("graph.gexf");

    assert!(run(&config_for(input.path(), &output)).await.is_err());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_run_unwritable_output() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("batch.json"), BATCH).unwrap();
    let output = input.path().join("missing").join("graph.gexf");

    let err = run(&config_for(input.path(), &output)).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Cannot save graph"));
}

#[tokio::test]
async fn test_run_writes_gexf() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("batch.json"), BATCH).unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("graph.gexf");

    let outcome = run(&config_for(input.path(), &output)).await.unwrap();

    // cdn.site.com is first-party and excluded by default.
    assert_eq!(outcome.graph.node_count(), 2);
    assert_eq!(outcome.graph.edge_count(), 1);
    assert_eq!(outcome.stats.records, 2);

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains(r#"source="www.site.com" target="tracker.com""#));
}

#[tokio::test]
async fn test_run_resolves_input_under_base_dir() {
    let base = TempDir::new().unwrap();
    fs::create_dir(base.path().join("run-01")).unwrap();
    fs::write(base.path().join("run-01").join("batch.json"), BATCH).unwrap();
    let output = base.path().join("graph.gexf");

    let config = config_from(&[
        "run-01",
        "--base-dir",
        base.path().to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--sld",
        "--first-party",
        "-s",
    ]);
    let outcome = run(&config).await.unwrap();

    // In SLD mode the first-party request collapses to a self-loop.
    assert_eq!(outcome.graph.edge_count(), 1);
    assert!(outcome.graph.edge("site.com", "tracker.com").is_some());
    assert!(output.exists());
}
