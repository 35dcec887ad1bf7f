// Parser behavior: extraction-pattern variable binding, per-line entry
// construction, exact float time semantics, and the process trust boundary.
use serde_json::json;

use labelscript::{EngineError, LabelerProfile, ParserContext, PluginRunner};

// sinsy-style labels: "<left> <right> <name>" with 100ns units, converted to
// milliseconds by the script.
fn sinsy_like_labeler(language: &str, script: &str) -> LabelerProfile {
    serde_json::from_value(json!({
        "name": "sinsy-like",
        "extension": "lab",
        "defaultValues": [0.0, 1000.0],
        "fields": [],
        "language": language,
        "parser": {
            "extractionPattern": "^([\\d.]+) ([\\d.]+) (\\S+)$",
            "variableNames": ["left", "right", "name"],
            "script": script
        }
    }))
    .unwrap()
}

const PARSER_RHAI: &str = r#"
let sample = "";
if sampleFileNames.len() > 0 {
    sample = sampleFileNames[0];
}
entry = #{
    sample: sample,
    name: name,
    start: parse_float(left) / 10000.0,
    end: parse_float(right) / 10000.0
};
"#;

const PARSER_LUA: &str = r#"
local sample = sampleFileNames[1] or ""
entry = Entry(sample, name, tonumber(left) / 10000.0, tonumber(right) / 10000.0, {}, {})
"#;

fn context() -> ParserContext {
    ParserContext {
        input_file_name: Some("song.lab".to_string()),
        sample_file_names: vec!["song.wav".to_string()],
        overrides: Default::default(),
        encoding: None,
    }
}

#[test]
fn test_sinsy_time_scale_is_exact() {
    for (language, script) in [("rhai", PARSER_RHAI), ("lua", PARSER_LUA)] {
        let runner = PluginRunner::new(sinsy_like_labeler(language, script));
        let entry = runner
            .parse_line("1.0 2.0 a", &context())
            .unwrap()
            .expect("line should match");
        assert_eq!(entry.start, 1.0 / 10000.0, "{language}");
        assert_eq!(entry.end, 2.0 / 10000.0, "{language}");
        assert_eq!(entry.start, 0.0001, "{language}");
        assert_eq!(entry.end, 0.0002, "{language}");
        assert_eq!(entry.name, "a");
        assert_eq!(entry.sample, "song.wav");
    }
}

#[test]
fn test_non_matching_lines_are_skipped() {
    let runner = PluginRunner::new(sinsy_like_labeler("rhai", PARSER_RHAI));
    let lines = vec![
        "# comment".to_string(),
        "1.0 2.0 a".to_string(),
        String::new(),
        "2.0 3.0 i".to_string(),
    ];
    let entries = runner.parse_lines(&lines, &context()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "a");
    assert_eq!(entries[1].name, "i");
}

#[test]
fn test_parser_without_entry_output_is_shape_error() {
    let runner = PluginRunner::new(sinsy_like_labeler("rhai", "let x = 1;"));
    let error = runner.parse_line("1.0 2.0 a", &context()).unwrap_err();
    match error {
        EngineError::Execution(execution) => {
            assert!(!execution.is_expected());
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[test]
fn test_parser_cannot_execute_commands() {
    let script = r#"
        let out = execute_command(["echo", "hi"]);
        entry = #{name: out, start: 0.0, end: 1.0};
    "#;
    let runner = PluginRunner::new(sinsy_like_labeler("rhai", script));
    let error = runner.parse_line("1.0 2.0 a", &context()).unwrap_err();
    match error {
        EngineError::Execution(execution) => {
            assert!(!execution.is_expected());
            assert!(execution.user_message("en").contains("not permitted"));
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[test]
fn test_parser_entry_fields_must_match_labeler() {
    // The labeler declares zero point fields; a parser emitting one is a bug.
    let script = r#"entry = #{name: name, start: 0.0, end: 1.0, points: [5.0]};"#;
    let runner = PluginRunner::new(sinsy_like_labeler("rhai", script));
    let error = runner.parse_line("1.0 2.0 a", &context()).unwrap_err();
    assert!(matches!(error, EngineError::Execution(_)));
}
