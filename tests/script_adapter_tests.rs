// Adapter contract tests: both languages must satisfy the same observable
// behavior at the marshal boundary.
use serde_json::Value;

use labelscript::{
    adapter_for, Entry, EngineError, HostContext, Notes, ScriptAdapter, ScriptJob, ScriptLanguage,
};

fn sample_entry() -> Entry {
    Entry {
        sample: "ka.wav".to_string(),
        name: "ka".to_string(),
        start: 100.25,
        end: 0.0,
        points: vec![],
        extras: vec![None, Some("value".to_string())],
        notes: Notes {
            done: true,
            star: false,
            tag: "checked".to_string(),
        },
        need_sync: true,
    }
}

fn copy_script(language: ScriptLanguage) -> &'static str {
    match language {
        ScriptLanguage::Rhai => "output = entries;",
        ScriptLanguage::Lua => "output = entries",
    }
}

#[test]
fn test_entry_round_trip_both_languages() {
    for language in [ScriptLanguage::Rhai, ScriptLanguage::Lua] {
        let adapter = adapter_for(language);
        let original = vec![sample_entry()];
        let job = ScriptJob::new(HostContext::new(false))
            .bind("entries", serde_json::to_value(&original).unwrap())
            .collect("output")
            .with_source("copy", copy_script(language));
        let mut output = adapter.run(job).unwrap();
        let round_tripped: Vec<Entry> =
            serde_json::from_value(output.take("output").unwrap()).unwrap();
        assert_eq!(round_tripped, original, "{} round trip", language.as_str());
    }
}

#[test]
fn test_numbers_marshal_as_floats() {
    let cases = [
        (ScriptLanguage::Rhai, "result = 1.0 / 10000.0;"),
        (ScriptLanguage::Lua, "result = 1.0 / 10000.0"),
    ];
    for (language, script) in cases {
        let adapter = adapter_for(language);
        let job = ScriptJob::new(HostContext::new(false))
            .collect("result")
            .with_source("math", script);
        let mut output = adapter.run(job).unwrap();
        let value = output.take("result").unwrap();
        assert_eq!(value.as_f64().unwrap(), 1.0 / 10000.0);
        assert_eq!(value.as_f64().unwrap(), 0.0001);
    }
}

#[test]
fn test_no_state_leaks_between_runs() {
    for language in [ScriptLanguage::Rhai, ScriptLanguage::Lua] {
        let adapter = adapter_for(language);

        let first = ScriptJob::new(HostContext::new(false))
            .collect("leak")
            .with_source("set", "leak = 42");
        let mut output = adapter.run(first).unwrap();
        assert_eq!(output.take("leak"), Some(Value::from(42)));

        let second_script = match language {
            ScriptLanguage::Rhai => "let unrelated = 1;",
            ScriptLanguage::Lua => "local unrelated = 1",
        };
        let second = ScriptJob::new(HostContext::new(false))
            .collect("leak")
            .with_source("read", second_script);
        let output = adapter.run(second).unwrap();
        assert!(
            output.get("leak").is_none(),
            "{} leaked state between executions",
            language.as_str()
        );
    }
}

#[test]
fn test_deterministic_outputs_for_equal_inputs() {
    for language in [ScriptLanguage::Rhai, ScriptLanguage::Lua] {
        let adapter = adapter_for(language);
        let script = match language {
            ScriptLanguage::Rhai => {
                "let result = []; for (entry, index) in entries { let e = entry; e.start += 1.5; result.push(e); } output = result;"
            }
            ScriptLanguage::Lua => {
                "output = {} for i, e in ipairs(entries) do e.start = e.start + 1.5 table.insert(output, e) end"
            }
        };
        let run = || {
            let job = ScriptJob::new(HostContext::new(false))
                .bind(
                    "entries",
                    serde_json::to_value(vec![sample_entry()]).unwrap(),
                )
                .collect("output")
                .with_source("edit", script);
            adapter.run(job).unwrap().take("output").unwrap()
        };
        assert_eq!(run(), run(), "{} must be deterministic", language.as_str());
    }
}

#[test]
fn test_error_payload_is_localized_in_both_languages() {
    let cases = [
        (
            ScriptLanguage::Rhai,
            r#"error(#{en: "No samples found.", ja: "サンプルが見つかりません。"});"#,
        ),
        (
            ScriptLanguage::Lua,
            r#"error({en = "No samples found.", ja = "サンプルが見つかりません。"})"#,
        ),
    ];
    for (language, script) in cases {
        let adapter = adapter_for(language);
        let job = ScriptJob::new(HostContext::new(false)).with_source("fail", script);
        let error = adapter.run(job).unwrap_err();
        match error {
            EngineError::Execution(execution) => {
                assert!(execution.is_expected());
                assert_eq!(execution.user_message("ja"), "サンプルが見つかりません。");
                assert_eq!(execution.user_message("en"), "No samples found.");
                assert_eq!(execution.user_message("de"), "No samples found.");
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }
}

#[test]
fn test_report_and_playback_requests_are_collected() {
    let cases = [
        (
            ScriptLanguage::Rhai,
            r#"report("done"); request_audio_playback("a.wav");"#,
        ),
        (
            ScriptLanguage::Lua,
            r#"report("done") request_audio_playback("a.wav")"#,
        ),
    ];
    for (language, script) in cases {
        let adapter = adapter_for(language);
        let host = HostContext::new(false);
        let job = ScriptJob::new(host.clone()).with_source("side", script);
        adapter.run(job).unwrap();
        assert_eq!(host.take_report().unwrap().default_text(), "done");
        let requests = host.take_playback_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "a.wav");
    }
}

#[test]
fn test_debug_flag_is_an_explicit_binding() {
    for language in [ScriptLanguage::Rhai, ScriptLanguage::Lua] {
        let adapter = adapter_for(language);
        let script = match language {
            ScriptLanguage::Rhai => "seen = debug;",
            ScriptLanguage::Lua => "seen = debug",
        };
        let job = ScriptJob::new(HostContext::new(true))
            .bind("debug", Value::from(true))
            .collect("seen")
            .with_source("probe", script);
        let mut output = adapter.run(job).unwrap();
        assert_eq!(output.take("seen"), Some(Value::from(true)));
    }
}

#[test]
fn test_file_api_reads_and_lists() {
    let temp = tempfile::TempDir::new().unwrap();
    std::fs::write(temp.path().join("b.txt"), "second").unwrap();
    std::fs::write(temp.path().join("a.txt"), "first").unwrap();

    let cases = [
        (
            ScriptLanguage::Rhai,
            r#"
                let children = root.list_child_files();
                names = [];
                for child in children { names.push(child.name()); }
                first = children[0].read_text();
            "#,
        ),
        (
            ScriptLanguage::Lua,
            r#"
                local children = root:list_child_files()
                names = {}
                for i, child in ipairs(children) do table.insert(names, child:name()) end
                first = children[1]:read_text()
            "#,
        ),
    ];
    for (language, script) in cases {
        let adapter = adapter_for(language);
        let job = ScriptJob::new(HostContext::new(false))
            .bind_file("root", temp.path())
            .collect("names")
            .collect("first")
            .with_source("listing", script);
        let mut output = adapter.run(job).unwrap();
        assert_eq!(
            output.take("names").unwrap(),
            serde_json::json!(["a.txt", "b.txt"]),
            "{} listing must be sorted",
            language.as_str()
        );
        assert_eq!(output.take("first"), Some(Value::from("first")));
    }
}
