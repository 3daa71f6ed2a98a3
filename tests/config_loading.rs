mod common;
use crate::common::builders::{ConfigFileBuilder, StepConfigBuilder};

use std::error::Error;
use std::io::Write;

use flowwatch::config::{load_and_validate, validate::validate_config};
use flowwatch::errors::FlowwatchError;
use flowwatch::types::SinkKind;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn full_config_loads_with_defaults_filled_in() -> TestResult {
    let file = write_config(
        r#"
[tracker]
poll_interval_ms = 250

[sink]
kind = "jsonl"
path = "events.jsonl"

[flow]
id = "wordcount"

[step.tokenize]
map_tasks = 4
features = ["Each", "GroupBy"]

[step.count]
after = ["tokenize"]
reduce_tasks = 2
"#,
    )?;

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.tracker.poll_interval_ms, 250);
    assert!(cfg.tracker.cancel_pollers_on_completion);
    assert_eq!(cfg.sink.kind, SinkKind::Jsonl);
    assert_eq!(cfg.sink.path.as_deref(), Some("events.jsonl"));
    assert_eq!(cfg.flow.id, "wordcount");

    let count = &cfg.step["count"];
    assert_eq!(count.after, vec!["tokenize"]);
    assert_eq!(count.map_tasks, 1);
    assert_eq!(count.reduce_tasks, 2);
    assert_eq!(cfg.step["tokenize"].features, vec!["Each", "GroupBy"]);
    Ok(())
}

#[test]
fn minimal_config_uses_log_sink_and_default_flow_id() -> TestResult {
    let file = write_config("[step.only]\n")?;
    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.sink.kind, SinkKind::Log);
    assert_eq!(cfg.flow.id, "flow");
    assert_eq!(cfg.tracker.poll_interval_ms, 100);
    Ok(())
}

#[test]
fn cyclic_steps_are_rejected() -> TestResult {
    let file = write_config(
        r#"
[step.a]
after = ["b"]

[step.b]
after = ["a"]
"#,
    )?;
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, FlowwatchError::DagCycle(_)), "got {err:?}");
    Ok(())
}

#[test]
fn unknown_dependency_is_rejected() -> TestResult {
    let file = write_config("[step.a]\nafter = [\"missing\"]\n")?;
    let err = load_and_validate(file.path()).unwrap_err();
    match err {
        FlowwatchError::ConfigError(msg) => assert!(msg.contains("missing"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let file = write_config("[step.a\nmap_tasks = 1\n")?;
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, FlowwatchError::TomlError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Flowwatch.toml").unwrap_err();
    assert!(matches!(err, FlowwatchError::IoError(_)), "got {err:?}");
}

#[test]
fn semantic_checks_reject_bad_sections() {
    let no_steps = ConfigFileBuilder::new().build_raw();
    assert!(matches!(
        validate_config(&no_steps),
        Err(FlowwatchError::ConfigError(_))
    ));

    let zero_poll = ConfigFileBuilder::new()
        .with_poll_interval_ms(0)
        .with_step("a", StepConfigBuilder::new().build())
        .build_raw();
    assert!(validate_config(&zero_poll).is_err());

    let self_dep = ConfigFileBuilder::new()
        .with_step("a", StepConfigBuilder::new().after("a").build())
        .build_raw();
    assert!(validate_config(&self_dep).is_err());

    let no_tasks = ConfigFileBuilder::new()
        .with_step("a", StepConfigBuilder::new().tasks(0, 0).build())
        .build_raw();
    assert!(validate_config(&no_tasks).is_err());

    let mut log_with_path = ConfigFileBuilder::new()
        .with_step("a", StepConfigBuilder::new().build())
        .build_raw();
    log_with_path.sink.path = Some("events.jsonl".to_string());
    assert!(validate_config(&log_with_path).is_err());

    let jsonl_stdout = ConfigFileBuilder::new()
        .with_jsonl_sink(None)
        .with_step("a", StepConfigBuilder::new().build())
        .build_raw();
    assert!(validate_config(&jsonl_stdout).is_ok());
}
