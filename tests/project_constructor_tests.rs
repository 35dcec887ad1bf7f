// Project constructor behavior: directory scans producing module
// definitions, and the empty-result contract.
use serde_json::json;
use std::fs;

use labelscript::{EngineError, LabelerProfile, ParamOverrides, PluginRunner};

const CONSTRUCTOR_RHAI: &str = r#"
modules = [];
for dir in root.list_child_directories() {
    let samples = [];
    for f in dir.list_child_files() {
        if f.extension() in acceptedSampleExtensions {
            samples.push(f.name());
        }
    }
    if samples.len() > 0 {
        modules.push(ModuleDefinition(dir.name(), dir.absolute_path(), samples));
    }
}
"#;

const CONSTRUCTOR_LUA: &str = r#"
modules = {}
for i, dir in ipairs(root:list_child_directories()) do
    local samples = {}
    for j, f in ipairs(dir:list_child_files()) do
        for k, accepted in ipairs(acceptedSampleExtensions) do
            if f:extension() == accepted then
                table.insert(samples, f:name())
            end
        end
    end
    if #samples > 0 then
        table.insert(modules, ModuleDefinition(dir:name(), dir:absolute_path(), samples))
    end
end
"#;

fn labeler(language: &str, script: &str) -> LabelerProfile {
    serde_json::from_value(json!({
        "name": "singer",
        "extension": "ini",
        "defaultValues": [0.0, 1000.0],
        "fields": [],
        "language": language,
        "parser": {"script": "entry = 0"},
        "projectConstructor": {"script": script}
    }))
    .unwrap()
}

fn wav_extensions() -> Vec<String> {
    vec!["wav".to_string()]
}

#[test]
fn test_one_matching_file_yields_one_module_definition() {
    let temp = tempfile::TempDir::new().unwrap();
    fs::create_dir(temp.path().join("C4")).unwrap();
    fs::write(temp.path().join("C4/a.wav"), b"").unwrap();
    fs::write(temp.path().join("C4/readme.txt"), b"").unwrap();

    let runner = PluginRunner::new(labeler("rhai", CONSTRUCTOR_RHAI));
    let outcome = runner
        .run_project_constructor(temp.path(), &ParamOverrides::new(), None, &wav_extensions())
        .unwrap();

    assert_eq!(outcome.value.len(), 1);
    let definition = &outcome.value[0];
    assert_eq!(definition.name, "C4");
    assert_eq!(definition.sample_files.len(), 1);
    assert_eq!(definition.sample_files[0].file_name().unwrap(), "a.wav");
}

#[test]
fn test_no_matching_samples_is_expected_failure() {
    let temp = tempfile::TempDir::new().unwrap();
    fs::create_dir(temp.path().join("empty")).unwrap();

    let runner = PluginRunner::new(labeler("rhai", CONSTRUCTOR_RHAI));
    let error = runner
        .run_project_constructor(temp.path(), &ParamOverrides::new(), None, &wav_extensions())
        .unwrap_err();
    match error {
        EngineError::Execution(execution) => {
            assert!(execution.is_expected());
            assert!(!execution.user_message("en").is_empty());
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[test]
fn test_lua_constructor_matches_rhai_contract() {
    let temp = tempfile::TempDir::new().unwrap();
    fs::create_dir(temp.path().join("C4")).unwrap();
    fs::create_dir(temp.path().join("E4")).unwrap();
    fs::write(temp.path().join("C4/a.wav"), b"").unwrap();
    fs::write(temp.path().join("E4/b.wav"), b"").unwrap();

    let runner = PluginRunner::new(labeler("lua", CONSTRUCTOR_LUA));
    let outcome = runner
        .run_project_constructor(temp.path(), &ParamOverrides::new(), None, &wav_extensions())
        .unwrap();

    let mut names: Vec<&str> = outcome
        .value
        .iter()
        .map(|definition| definition.name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["C4", "E4"]);
}

#[test]
fn test_constructor_sees_labeler_parameters() {
    let temp = tempfile::TempDir::new().unwrap();
    fs::create_dir(temp.path().join("C4")).unwrap();
    fs::write(temp.path().join("C4/a.wav"), b"").unwrap();

    let mut profile = labeler(
        "rhai",
        r#"
            modules = [];
            if params.deep {
                for dir in root.list_child_directories() {
                    let samples = [];
                    for f in dir.list_child_files() {
                        if f.extension() in acceptedSampleExtensions {
                            samples.push(f.name());
                        }
                    }
                    if samples.len() > 0 {
                        modules.push(ModuleDefinition(dir.name(), dir.absolute_path(), samples));
                    }
                }
            }
        "#,
    );
    profile.parameters = vec![serde_json::from_value(
        json!({"type": "boolean", "name": "deep", "defaultValue": false}),
    )
    .unwrap()];

    let runner = PluginRunner::new(profile);

    // Default (false) constructs nothing -> expected failure
    let error = runner
        .run_project_constructor(temp.path(), &ParamOverrides::new(), None, &wav_extensions())
        .unwrap_err();
    assert!(matches!(error, EngineError::Execution(execution) if execution.is_expected()));

    // Override flips the behavior
    let mut overrides = ParamOverrides::new();
    overrides.insert("deep".to_string(), json!(true));
    let outcome = runner
        .run_project_constructor(temp.path(), &overrides, None, &wav_extensions())
        .unwrap();
    assert_eq!(outcome.value.len(), 1);
}

#[test]
fn test_missing_constructor_is_reported() {
    let profile: LabelerProfile = serde_json::from_value(json!({
        "name": "flat",
        "extension": "ini",
        "defaultValues": [0.0, 1000.0],
        "fields": [],
        "parser": {"script": "entry = 0"}
    }))
    .unwrap();
    let temp = tempfile::TempDir::new().unwrap();
    let runner = PluginRunner::new(profile);
    let error = runner
        .run_project_constructor(temp.path(), &ParamOverrides::new(), None, &wav_extensions())
        .unwrap_err();
    assert!(matches!(error, EngineError::Labeler(_)));
}
