// Rhai backend for the script execution adapter
use ::rhai::serde::{from_dynamic, to_dynamic};
use ::rhai::{Array, Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{ExecutionError, Result};
use crate::filesystem::FileSystem;
use crate::host::{AudioPlaybackRequest, EnvProbe, HostContext};
use crate::process::{self, ProcessConfig};
use crate::script::{failure_from, localized_from_json, ScriptAdapter, ScriptJob, ScriptLanguage, ScriptOutput};

/// Host file handle exposed to Rhai scripts as the `File` type.
#[derive(Debug, Clone)]
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    fn new(path: PathBuf) -> Self {
        ScriptFile { path }
    }
}

pub struct RhaiAdapter;

impl ScriptAdapter for RhaiAdapter {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Rhai
    }

    fn run(&self, job: ScriptJob) -> Result<ScriptOutput> {
        let mut engine = Engine::new();
        register_host_functions(&mut engine, &job.host);

        let mut scope = Scope::new();
        for (name, value) in &job.bindings {
            let dynamic = to_dynamic(value)
                .map_err(|e| ExecutionError::unexpected(format!("marshal-in of '{name}': {e}")))?;
            scope.push_dynamic(name.clone(), dynamic);
        }
        for (name, path) in &job.file_bindings {
            scope.push_dynamic(name.clone(), Dynamic::from(ScriptFile::new(path.clone())));
        }
        // Output variables are pre-declared so scripts can assign without `let`.
        for name in &job.outputs {
            if !scope.contains(name) {
                scope.push_dynamic(name.clone(), Dynamic::UNIT);
            }
        }

        for source in &job.sources {
            tracing::debug!(script = %source.name, "launching rhai script");
            engine
                .run_with_scope(&mut scope, &source.text)
                .map_err(|e| failure_from(&job.host, format!("{}: {e}", source.name)))?;
            tracing::debug!(script = %source.name, "finished rhai script");
        }

        let mut output = ScriptOutput::default();
        for name in &job.outputs {
            let Some(dynamic) = scope.get(name) else {
                continue;
            };
            if dynamic.is_unit() {
                continue;
            }
            let value = from_dynamic::<Value>(dynamic)
                .map_err(|e| ExecutionError::unexpected(format!("marshal-out of '{name}': {e}")))?;
            output.insert(name.clone(), value);
        }
        Ok(output)
    }

    fn eval_number(&self, expression: &str, bindings: &[(String, Value)]) -> Result<f64> {
        let engine = Engine::new();
        let mut scope = Scope::new();
        for (name, value) in bindings {
            let dynamic = to_dynamic(value)
                .map_err(|e| ExecutionError::unexpected(format!("marshal-in of '{name}': {e}")))?;
            scope.push_dynamic(name.clone(), dynamic);
        }
        let result = engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, expression)
            .map_err(|e| ExecutionError::unexpected(format!("expression failed: {e}")))?;
        number_of(&result)
            .ok_or_else(|| ExecutionError::unexpected("expression did not yield a number").into())
    }
}

fn number_of(dynamic: &Dynamic) -> Option<f64> {
    dynamic
        .as_float()
        .ok()
        .or_else(|| dynamic.as_int().ok().map(|int_value| int_value as f64))
}

fn eval_error(error: impl std::fmt::Display) -> Box<EvalAltResult> {
    error.to_string().into()
}

fn register_host_functions(engine: &mut Engine, host: &HostContext) {
    // error(message): record the localized payload, then abort the script.
    let ctx = host.clone();
    engine.register_fn(
        "error",
        move |message: Dynamic| -> std::result::Result<(), Box<EvalAltResult>> {
            let value = from_dynamic::<Value>(&message).unwrap_or(Value::Null);
            let payload = localized_from_json(value);
            let text = payload.default_text().to_string();
            ctx.signal_error(payload);
            Err(eval_error(text))
        },
    );

    let ctx = host.clone();
    engine.register_fn("report", move |message: Dynamic| {
        let value = from_dynamic::<Value>(&message).unwrap_or(Value::Null);
        ctx.set_report(localized_from_json(value));
    });

    let ctx = host.clone();
    engine.register_fn("log", move |message: Dynamic| {
        ctx.log(&message.to_string());
    });
    let ctx = host.clone();
    engine.on_print(move |text| ctx.log(text));

    let ctx = host.clone();
    engine.register_fn(
        "execute_command",
        move |args: Array| -> std::result::Result<String, Box<EvalAltResult>> {
            if !ctx.allow_process_execution {
                return Err(eval_error(
                    "execute_command is not permitted for this plugin kind",
                ));
            }
            let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
            let (command, rest) = args
                .split_first()
                .ok_or_else(|| eval_error("execute_command requires a command"))?;
            let mut config = ProcessConfig::new(command).with_args(rest.to_vec());
            if let Some(dir) = &ctx.working_dir {
                config = config.with_working_dir(dir.clone());
            }
            process::execute_for_stdout(&config).map_err(eval_error)
        },
    );

    let ctx = host.clone();
    engine.register_fn("request_audio_playback", move |path: &str| {
        ctx.request_audio_playback(AudioPlaybackRequest {
            path: path.to_string(),
            offset: None,
            duration: None,
        });
    });
    let ctx = host.clone();
    engine.register_fn(
        "request_audio_playback",
        move |path: &str, offset: Dynamic, duration: Dynamic| {
            ctx.request_audio_playback(AudioPlaybackRequest {
                path: path.to_string(),
                offset: number_of(&offset),
                duration: number_of(&duration),
            });
        },
    );

    // Environment probe
    engine.register_fn("os_name", || EnvProbe::os_name().to_string());
    engine.register_fn("is_windows", EnvProbe::is_windows);
    engine.register_fn("is_mac", EnvProbe::is_mac);
    engine.register_fn("is_linux", EnvProbe::is_linux);
    engine.register_fn("get_system_property", |name: &str| -> Dynamic {
        match EnvProbe::system_property(name) {
            Some(value) => value.into(),
            None => Dynamic::UNIT,
        }
    });

    register_file_api(engine, host);
    register_constructors(engine);
}

fn register_file_api(engine: &mut Engine, host: &HostContext) {
    engine.register_type_with_name::<ScriptFile>("File");

    let working_dir = host.working_dir.clone();
    engine.register_fn("file", move |path: &str| {
        let path = PathBuf::from(path);
        let path = match (&working_dir, path.is_relative()) {
            (Some(dir), true) => dir.join(path),
            _ => path,
        };
        ScriptFile::new(path)
    });

    engine.register_fn("resolve", |file: &mut ScriptFile, child: &str| {
        ScriptFile::new(file.path.join(child))
    });
    engine.register_fn("parent", |file: &mut ScriptFile| {
        let parent = file
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| file.path.clone());
        ScriptFile::new(parent)
    });
    engine.register_fn("exists", |file: &mut ScriptFile| file.path.exists());
    engine.register_fn("is_file", |file: &mut ScriptFile| file.path.is_file());
    engine.register_fn("is_directory", |file: &mut ScriptFile| file.path.is_dir());
    engine.register_fn("name", |file: &mut ScriptFile| FileSystem::file_name(&file.path));
    engine.register_fn("name_without_extension", |file: &mut ScriptFile| {
        FileSystem::name_without_extension(&file.path)
    });
    engine.register_fn("extension", |file: &mut ScriptFile| {
        FileSystem::extension(&file.path)
    });
    engine.register_fn("path", |file: &mut ScriptFile| {
        file.path.display().to_string()
    });
    engine.register_fn("absolute_path", |file: &mut ScriptFile| {
        file.path
            .canonicalize()
            .unwrap_or_else(|_| file.path.clone())
            .display()
            .to_string()
    });

    engine.register_fn("list_children", |file: &mut ScriptFile| -> Array {
        FileSystem::list_children(&file.path)
            .into_iter()
            .map(|child| Dynamic::from(ScriptFile::new(child)))
            .collect()
    });
    engine.register_fn("list_child_files", |file: &mut ScriptFile| -> Array {
        FileSystem::list_child_files(&file.path)
            .into_iter()
            .map(|child| Dynamic::from(ScriptFile::new(child)))
            .collect()
    });
    engine.register_fn("list_child_directories", |file: &mut ScriptFile| -> Array {
        FileSystem::list_child_directories(&file.path)
            .into_iter()
            .map(|child| Dynamic::from(ScriptFile::new(child)))
            .collect()
    });

    engine.register_fn(
        "read_text",
        |file: &mut ScriptFile| -> std::result::Result<String, Box<EvalAltResult>> {
            FileSystem::read_text(&file.path, None).map_err(eval_error)
        },
    );
    engine.register_fn(
        "read_text",
        |file: &mut ScriptFile, encoding: &str| -> std::result::Result<String, Box<EvalAltResult>> {
            FileSystem::read_text(&file.path, Some(encoding)).map_err(eval_error)
        },
    );
    engine.register_fn(
        "read_lines",
        |file: &mut ScriptFile| -> std::result::Result<Array, Box<EvalAltResult>> {
            let lines = FileSystem::read_lines(&file.path, None).map_err(eval_error)?;
            Ok(lines.into_iter().map(Dynamic::from).collect())
        },
    );
    engine.register_fn(
        "read_lines",
        |file: &mut ScriptFile, encoding: &str| -> std::result::Result<Array, Box<EvalAltResult>> {
            let lines = FileSystem::read_lines(&file.path, Some(encoding)).map_err(eval_error)?;
            Ok(lines.into_iter().map(Dynamic::from).collect())
        },
    );
    engine.register_fn(
        "write_text",
        |file: &mut ScriptFile, text: &str| -> std::result::Result<(), Box<EvalAltResult>> {
            FileSystem::write_text(&file.path, text).map_err(eval_error)
        },
    );
    engine.register_fn(
        "delete",
        |file: &mut ScriptFile| -> std::result::Result<(), Box<EvalAltResult>> {
            FileSystem::delete(&file.path).map_err(eval_error)
        },
    );

    // Path helpers that do not need a File handle
    engine.register_fn("get_name_without_extension", |path: &str| {
        FileSystem::name_without_extension(Path::new(path))
    });
    engine.register_fn("get_extension", |path: &str| {
        FileSystem::extension(Path::new(path))
    });
}

// Constructors build plain object maps so the marshal-out path sees exactly
// the wire field names.
fn register_constructors(engine: &mut Engine) {
    engine.register_fn(
        "Entry",
        |sample: Dynamic,
         name: Dynamic,
         start: Dynamic,
         end: Dynamic,
         points: Dynamic,
         extras: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            entry_value(&[sample, name, start, end, points, extras], None, None)
        },
    );
    engine.register_fn(
        "Entry",
        |sample: Dynamic,
         name: Dynamic,
         start: Dynamic,
         end: Dynamic,
         points: Dynamic,
         extras: Dynamic,
         notes: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            entry_value(&[sample, name, start, end, points, extras], Some(notes), None)
        },
    );
    engine.register_fn(
        "Entry",
        |sample: Dynamic,
         name: Dynamic,
         start: Dynamic,
         end: Dynamic,
         points: Dynamic,
         extras: Dynamic,
         notes: Dynamic,
         need_sync: bool|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            entry_value(
                &[sample, name, start, end, points, extras],
                Some(notes),
                Some(need_sync),
            )
        },
    );

    engine.register_fn("Notes", || -> std::result::Result<Dynamic, Box<EvalAltResult>> {
        to_dynamic(serde_json::json!({"done": false, "star": false, "tag": ""}))
    });
    engine.register_fn(
        "Notes",
        |done: bool, star: bool, tag: &str| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            to_dynamic(serde_json::json!({"done": done, "star": star, "tag": tag}))
        },
    );

    engine.register_fn(
        "Module",
        |name: &str,
         sample_directory: &str,
         entries: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            let entries = from_dynamic::<Value>(&entries).map_err(eval_error)?;
            to_dynamic(serde_json::json!({
                "name": name,
                "sampleDirectory": sample_directory,
                "entries": entries,
                "currentIndex": 0,
                "rawFilePath": null,
                "entryFilter": null,
                "extras": {},
            }))
        },
    );

    engine.register_fn(
        "ModuleDefinition",
        |name: &str,
         sample_directory_path: &str,
         sample_file_names: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            module_definition_value(name, sample_directory_path, sample_file_names, None, None)
        },
    );
    engine.register_fn(
        "ModuleDefinition",
        |name: &str,
         sample_directory_path: &str,
         sample_file_names: Dynamic,
         input_file_paths: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            module_definition_value(
                name,
                sample_directory_path,
                sample_file_names,
                Some(input_file_paths),
                None,
            )
        },
    );
    engine.register_fn(
        "ModuleDefinition",
        |name: &str,
         sample_directory_path: &str,
         sample_file_names: Dynamic,
         input_file_paths: Dynamic,
         label_file_path: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            module_definition_value(
                name,
                sample_directory_path,
                sample_file_names,
                Some(input_file_paths),
                Some(label_file_path),
            )
        },
    );

    engine.register_fn(
        "EntryFilter",
        |search_text: &str| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            to_dynamic(serde_json::json!({"searchText": search_text, "star": null, "done": null}))
        },
    );
    engine.register_fn(
        "EntryFilter",
        |search_text: &str,
         star: Dynamic,
         done: Dynamic|
         -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            let star = from_dynamic::<Value>(&star).map_err(eval_error)?;
            let done = from_dynamic::<Value>(&done).map_err(eval_error)?;
            to_dynamic(serde_json::json!({"searchText": search_text, "star": star, "done": done}))
        },
    );
}

fn entry_value(
    fields: &[Dynamic],
    notes: Option<Dynamic>,
    need_sync: Option<bool>,
) -> std::result::Result<Dynamic, Box<EvalAltResult>> {
    let mut values: Vec<Value> = fields
        .iter()
        .map(from_dynamic::<Value>)
        .collect::<std::result::Result<_, _>>()
        .map_err(eval_error)?;
    let extras = values.pop().unwrap_or(Value::Null);
    let points = values.pop().unwrap_or(Value::Null);
    let end = values.pop().unwrap_or(Value::Null);
    let start = values.pop().unwrap_or(Value::Null);
    let name = values.pop().unwrap_or(Value::Null);
    let sample = values.pop().unwrap_or(Value::Null);
    let notes = match notes {
        Some(notes) => from_dynamic::<Value>(&notes).map_err(eval_error)?,
        None => Value::Null,
    };
    let notes = if notes.is_null() {
        serde_json::json!({"done": false, "star": false, "tag": ""})
    } else {
        notes
    };
    to_dynamic(serde_json::json!({
        "sample": sample,
        "name": name,
        "start": start,
        "end": end,
        "points": points,
        "extras": extras,
        "notes": notes,
        "needSync": need_sync.unwrap_or(false),
    }))
}

fn module_definition_value(
    name: &str,
    sample_directory_path: &str,
    sample_file_names: Dynamic,
    input_file_paths: Option<Dynamic>,
    label_file_path: Option<Dynamic>,
) -> std::result::Result<Dynamic, Box<EvalAltResult>> {
    let sample_file_names = from_dynamic::<Value>(&sample_file_names).map_err(eval_error)?;
    let input_file_paths = match input_file_paths {
        Some(paths) => from_dynamic::<Value>(&paths).map_err(eval_error)?,
        None => Value::Null,
    };
    let label_file_path = match label_file_path {
        Some(path) => from_dynamic::<Value>(&path).map_err(eval_error)?,
        None => Value::Null,
    };
    to_dynamic(serde_json::json!({
        "name": name,
        "sampleDirectoryPath": sample_directory_path,
        "sampleFileNames": sample_file_names,
        "inputFilePaths": input_file_paths,
        "labelFilePath": label_file_path,
    }))
}
