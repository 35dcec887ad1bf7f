// Lua 5.4 backend for the script execution adapter.
// The runtime is built with a reduced stdlib (no io/os/package/debug) so the
// registered host functions are the only effect channel. JSON null maps to
// the `null` sentinel because nil holes are not representable in Lua arrays.
use mlua::{
    Lua, LuaOptions, LuaSerdeExt, StdLib, Table, UserData, UserDataMethods, Value as LuaValue,
    Variadic,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{ExecutionError, Result};
use crate::filesystem::FileSystem;
use crate::host::{AudioPlaybackRequest, EnvProbe, HostContext};
use crate::process::{self, ProcessConfig};
use crate::script::{failure_from, localized_from_json, ScriptAdapter, ScriptJob, ScriptLanguage, ScriptOutput};

/// Host file handle exposed to Lua scripts.
#[derive(Debug, Clone)]
struct LuaFile {
    path: PathBuf,
}

impl UserData for LuaFile {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("resolve", |_, this, child: String| {
            Ok(LuaFile {
                path: this.path.join(child),
            })
        });
        methods.add_method("parent", |_, this, ()| {
            let parent = this
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| this.path.clone());
            Ok(LuaFile { path: parent })
        });
        methods.add_method("exists", |_, this, ()| Ok(this.path.exists()));
        methods.add_method("is_file", |_, this, ()| Ok(this.path.is_file()));
        methods.add_method("is_directory", |_, this, ()| Ok(this.path.is_dir()));
        methods.add_method("name", |_, this, ()| Ok(FileSystem::file_name(&this.path)));
        methods.add_method("name_without_extension", |_, this, ()| {
            Ok(FileSystem::name_without_extension(&this.path))
        });
        methods.add_method("extension", |_, this, ()| {
            Ok(FileSystem::extension(&this.path))
        });
        methods.add_method("path", |_, this, ()| Ok(this.path.display().to_string()));
        methods.add_method("absolute_path", |_, this, ()| {
            Ok(this
                .path
                .canonicalize()
                .unwrap_or_else(|_| this.path.clone())
                .display()
                .to_string())
        });
        methods.add_method("list_children", |_, this, ()| {
            Ok(FileSystem::list_children(&this.path)
                .into_iter()
                .map(|path| LuaFile { path })
                .collect::<Vec<_>>())
        });
        methods.add_method("list_child_files", |_, this, ()| {
            Ok(FileSystem::list_child_files(&this.path)
                .into_iter()
                .map(|path| LuaFile { path })
                .collect::<Vec<_>>())
        });
        methods.add_method("list_child_directories", |_, this, ()| {
            Ok(FileSystem::list_child_directories(&this.path)
                .into_iter()
                .map(|path| LuaFile { path })
                .collect::<Vec<_>>())
        });
        methods.add_method("read_text", |_, this, encoding: Option<String>| {
            FileSystem::read_text(&this.path, encoding.as_deref()).map_err(mlua::Error::external)
        });
        methods.add_method("read_lines", |_, this, encoding: Option<String>| {
            FileSystem::read_lines(&this.path, encoding.as_deref()).map_err(mlua::Error::external)
        });
        methods.add_method("write_text", |_, this, text: String| {
            FileSystem::write_text(&this.path, &text).map_err(mlua::Error::external)
        });
        methods.add_method("delete", |_, this, ()| {
            FileSystem::delete(&this.path).map_err(mlua::Error::external)
        });
    }
}

pub struct LuaAdapter;

impl ScriptAdapter for LuaAdapter {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Lua
    }

    fn run(&self, job: ScriptJob) -> Result<ScriptOutput> {
        let lua = new_runtime().map_err(|e| ExecutionError::unexpected(e.to_string()))?;
        register_host_functions(&lua, &job.host)
            .map_err(|e| ExecutionError::unexpected(e.to_string()))?;

        let globals = lua.globals();
        for (name, value) in &job.bindings {
            let lua_value = lua
                .to_value(value)
                .map_err(|e| ExecutionError::unexpected(format!("marshal-in of '{name}': {e}")))?;
            globals
                .set(name.as_str(), lua_value)
                .map_err(|e| ExecutionError::unexpected(e.to_string()))?;
        }
        for (name, path) in &job.file_bindings {
            globals
                .set(name.as_str(), LuaFile { path: path.clone() })
                .map_err(|e| ExecutionError::unexpected(e.to_string()))?;
        }

        for source in &job.sources {
            tracing::debug!(script = %source.name, "launching lua script");
            lua.load(&source.text)
                .set_name(source.name.clone())
                .exec()
                .map_err(|e| failure_from(&job.host, format!("{}: {e}", source.name)))?;
            tracing::debug!(script = %source.name, "finished lua script");
        }

        let mut output = ScriptOutput::default();
        for name in &job.outputs {
            let value: LuaValue = globals
                .get(name.as_str())
                .map_err(|e| ExecutionError::unexpected(e.to_string()))?;
            if matches!(value, LuaValue::Nil) {
                continue;
            }
            let json: Value = lua
                .from_value(value)
                .map_err(|e| ExecutionError::unexpected(format!("marshal-out of '{name}': {e}")))?;
            output.insert(name.clone(), json);
        }
        Ok(output)
    }

    fn eval_number(&self, expression: &str, bindings: &[(String, Value)]) -> Result<f64> {
        let lua = new_runtime().map_err(|e| ExecutionError::unexpected(e.to_string()))?;
        let globals = lua.globals();
        for (name, value) in bindings {
            let lua_value = lua
                .to_value(value)
                .map_err(|e| ExecutionError::unexpected(format!("marshal-in of '{name}': {e}")))?;
            globals
                .set(name.as_str(), lua_value)
                .map_err(|e| ExecutionError::unexpected(e.to_string()))?;
        }
        lua.load(format!("return ({expression})"))
            .eval::<f64>()
            .map_err(|e| ExecutionError::unexpected(format!("expression failed: {e}")).into())
    }
}

fn new_runtime() -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::UTF8,
        LuaOptions::default(),
    )?;
    // Base-library file loaders bypass the host surface.
    let globals = lua.globals();
    globals.set("dofile", LuaValue::Nil)?;
    globals.set("loadfile", LuaValue::Nil)?;
    globals.set("null", lua.null())?;
    drop(globals);
    Ok(lua)
}

fn register_host_functions(lua: &Lua, host: &HostContext) -> mlua::Result<()> {
    let globals = lua.globals();

    // error(message): record the localized payload, then abort the script.
    let ctx = host.clone();
    globals.set(
        "error",
        lua.create_function(move |lua, message: LuaValue| -> mlua::Result<()> {
            let value: Value = lua.from_value(message).unwrap_or(Value::Null);
            let payload = localized_from_json(value);
            let text = payload.default_text().to_string();
            ctx.signal_error(payload);
            Err(mlua::Error::RuntimeError(text))
        })?,
    )?;

    let ctx = host.clone();
    globals.set(
        "report",
        lua.create_function(move |lua, message: LuaValue| {
            let value: Value = lua.from_value(message).unwrap_or(Value::Null);
            ctx.set_report(localized_from_json(value));
            Ok(())
        })?,
    )?;

    let ctx = host.clone();
    globals.set(
        "log",
        lua.create_function(move |lua, args: Variadic<LuaValue>| {
            ctx.log(&join_for_log(lua, &args)?);
            Ok(())
        })?,
    )?;
    let ctx = host.clone();
    globals.set(
        "print",
        lua.create_function(move |lua, args: Variadic<LuaValue>| {
            ctx.log(&join_for_log(lua, &args)?);
            Ok(())
        })?,
    )?;

    let ctx = host.clone();
    globals.set(
        "execute_command",
        lua.create_function(move |_, args: Variadic<String>| {
            if !ctx.allow_process_execution {
                return Err(mlua::Error::RuntimeError(
                    "execute_command is not permitted for this plugin kind".to_string(),
                ));
            }
            let (command, rest) = args.split_first().ok_or_else(|| {
                mlua::Error::RuntimeError("execute_command requires a command".to_string())
            })?;
            let mut config = ProcessConfig::new(command).with_args(rest.to_vec());
            if let Some(dir) = &ctx.working_dir {
                config = config.with_working_dir(dir.clone());
            }
            process::execute_for_stdout(&config).map_err(mlua::Error::external)
        })?,
    )?;

    let ctx = host.clone();
    globals.set(
        "request_audio_playback",
        lua.create_function(
            move |_, (path, offset, duration): (String, Option<f64>, Option<f64>)| {
                ctx.request_audio_playback(AudioPlaybackRequest {
                    path,
                    offset,
                    duration,
                });
                Ok(())
            },
        )?,
    )?;

    // Environment probe
    globals.set(
        "os_name",
        lua.create_function(|_, ()| Ok(EnvProbe::os_name().to_string()))?,
    )?;
    globals.set(
        "is_windows",
        lua.create_function(|_, ()| Ok(EnvProbe::is_windows()))?,
    )?;
    globals.set(
        "is_mac",
        lua.create_function(|_, ()| Ok(EnvProbe::is_mac()))?,
    )?;
    globals.set(
        "is_linux",
        lua.create_function(|_, ()| Ok(EnvProbe::is_linux()))?,
    )?;
    globals.set(
        "get_system_property",
        lua.create_function(|_, name: String| Ok(EnvProbe::system_property(&name)))?,
    )?;

    // File API
    let working_dir = host.working_dir.clone();
    globals.set(
        "file",
        lua.create_function(move |_, path: String| {
            let path = PathBuf::from(path);
            let path = match (&working_dir, path.is_relative()) {
                (Some(dir), true) => dir.join(path),
                _ => path,
            };
            Ok(LuaFile { path })
        })?,
    )?;
    globals.set(
        "get_name_without_extension",
        lua.create_function(|_, path: String| {
            Ok(FileSystem::name_without_extension(Path::new(&path)))
        })?,
    )?;
    globals.set(
        "get_extension",
        lua.create_function(|_, path: String| Ok(FileSystem::extension(Path::new(&path))))?,
    )?;

    register_constructors(lua)?;
    Ok(())
}

fn join_for_log(lua: &Lua, args: &[LuaValue]) -> mlua::Result<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let text = match lua.coerce_string(arg.clone())? {
            Some(lua_string) => lua_string.to_string_lossy().into_owned(),
            None => format!("<{}>", arg.type_name()),
        };
        parts.push(text);
    }
    Ok(parts.join("\t"))
}

// Constructors build plain tables with the wire field names. List-valued
// fields get the array metatable so empty lists marshal out as arrays.
fn register_constructors(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        "Entry",
        lua.create_function(
            |lua,
             (sample, name, start, end, points, extras, notes, need_sync): (
                LuaValue,
                LuaValue,
                f64,
                f64,
                Option<Table>,
                Option<Table>,
                Option<Table>,
                Option<bool>,
            )| {
                let table = lua.create_table()?;
                table.set("sample", sample)?;
                table.set("name", name)?;
                table.set("start", start)?;
                table.set("end", end)?;
                table.set("points", as_array(lua, points)?)?;
                table.set("extras", as_array(lua, extras)?)?;
                table.set("notes", notes_or_default(lua, notes)?)?;
                table.set("needSync", need_sync.unwrap_or(false))?;
                Ok(table)
            },
        )?,
    )?;

    globals.set(
        "Notes",
        lua.create_function(
            |lua, (done, star, tag): (Option<bool>, Option<bool>, Option<String>)| {
                let table = lua.create_table()?;
                table.set("done", done.unwrap_or(false))?;
                table.set("star", star.unwrap_or(false))?;
                table.set("tag", tag.unwrap_or_default())?;
                Ok(table)
            },
        )?,
    )?;

    globals.set(
        "Module",
        lua.create_function(
            |lua, (name, sample_directory, entries): (String, String, Option<Table>)| {
                let table = lua.create_table()?;
                table.set("name", name)?;
                table.set("sampleDirectory", sample_directory)?;
                table.set("entries", as_array(lua, entries)?)?;
                table.set("currentIndex", 0)?;
                table.set("rawFilePath", lua.null())?;
                table.set("entryFilter", lua.null())?;
                table.set("extras", lua.create_table()?)?;
                Ok(table)
            },
        )?,
    )?;

    globals.set(
        "ModuleDefinition",
        lua.create_function(
            |lua,
             (name, sample_directory_path, sample_file_names, input_file_paths, label_file_path): (
                String,
                String,
                Option<Table>,
                Option<Table>,
                Option<String>,
            )| {
                let table = lua.create_table()?;
                table.set("name", name)?;
                table.set("sampleDirectoryPath", sample_directory_path)?;
                table.set("sampleFileNames", as_array(lua, sample_file_names)?)?;
                match input_file_paths {
                    Some(paths) => {
                        table.set("inputFilePaths", as_array(lua, Some(paths))?)?;
                    }
                    None => table.set("inputFilePaths", lua.null())?,
                }
                match label_file_path {
                    Some(path) => table.set("labelFilePath", path)?,
                    None => table.set("labelFilePath", lua.null())?,
                }
                Ok(table)
            },
        )?,
    )?;

    globals.set(
        "EntryFilter",
        lua.create_function(
            |lua, (search_text, star, done): (Option<String>, Option<bool>, Option<bool>)| {
                let table = lua.create_table()?;
                table.set("searchText", search_text.unwrap_or_default())?;
                match star {
                    Some(star) => table.set("star", star)?,
                    None => table.set("star", lua.null())?,
                }
                match done {
                    Some(done) => table.set("done", done)?,
                    None => table.set("done", lua.null())?,
                }
                Ok(table)
            },
        )?,
    )?;

    Ok(())
}

fn as_array<'lua>(lua: &'lua Lua, table: Option<Table<'lua>>) -> mlua::Result<Table<'lua>> {
    let table = match table {
        Some(table) => table,
        None => lua.create_table()?,
    };
    if table.get_metatable().is_none() {
        table.set_metatable(Some(lua.array_metatable()));
    }
    Ok(table)
}

fn notes_or_default<'lua>(lua: &'lua Lua, notes: Option<Table<'lua>>) -> mlua::Result<Table<'lua>> {
    match notes {
        Some(notes) => Ok(notes),
        None => {
            let table = lua.create_table()?;
            table.set("done", false)?;
            table.set("star", false)?;
            table.set("tag", "")?;
            Ok(table)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptJob;

    fn run_script(script: &str, outputs: &[&str]) -> Result<ScriptOutput> {
        let host = HostContext::new(false);
        let mut job = ScriptJob::new(host).with_source("test.lua", script);
        for output in outputs {
            job = job.collect(*output);
        }
        LuaAdapter.run(job)
    }

    #[test]
    fn test_output_collection() {
        let output = run_script("result = 1 + 2", &["result"]).unwrap();
        assert_eq!(output.get("result"), Some(&Value::from(3)));
    }

    #[test]
    fn test_unset_output_is_absent() {
        let output = run_script("local x = 1", &["result"]).unwrap();
        assert!(output.get("result").is_none());
    }

    #[test]
    fn test_float_values_stay_floats() {
        let output = run_script("result = 1.0 / 10000.0", &["result"]).unwrap();
        assert_eq!(output.get("result"), Some(&Value::from(0.0001)));
    }

    #[test]
    fn test_error_call_is_expected_failure() {
        let error = run_script("error({en = \"stop here\"})", &[]).unwrap_err();
        match error {
            crate::error::EngineError::Execution(execution) => {
                assert!(execution.is_expected());
                assert_eq!(execution.user_message("en"), "stop here");
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn test_runtime_error_is_unexpected_failure() {
        let error = run_script("result = nil + 1", &[]).unwrap_err();
        match error {
            crate::error::EngineError::Execution(execution) => {
                assert!(!execution.is_expected());
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn test_entry_constructor_wire_shape() {
        let output = run_script(
            "entry = Entry(\"a.wav\", \"a\", 1.5, 2.5, {2.0}, {\"x\", null})",
            &["entry"],
        )
        .unwrap();
        let entry = output.get("entry").unwrap();
        assert_eq!(entry["sample"], "a.wav");
        assert_eq!(entry["needSync"], false);
        assert_eq!(entry["extras"][1], Value::Null);
        assert_eq!(entry["points"][0], Value::from(2.0));
    }

    #[test]
    fn test_empty_constructor_lists_marshal_as_arrays() {
        let output = run_script(
            "entry = Entry(\"a.wav\", \"a\", 0.0, 1.0, {}, {})",
            &["entry"],
        )
        .unwrap();
        let entry = output.get("entry").unwrap();
        assert!(entry["points"].as_array().unwrap().is_empty());
        assert!(entry["extras"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_io_and_os_are_absent() {
        let output = run_script("result = tostring(io) .. \"/\" .. tostring(os)", &["result"]).unwrap();
        assert_eq!(output.get("result"), Some(&Value::from("nil/nil")));
    }

    #[test]
    fn test_process_execution_denied_by_default() {
        let error = run_script("result = execute_command(\"echo\", \"hi\")", &[]).unwrap_err();
        match error {
            crate::error::EngineError::Execution(execution) => {
                assert!(!execution.is_expected());
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn test_eval_number() {
        let bindings = vec![
            ("start".to_string(), Value::from(100.0)),
            ("end_value".to_string(), Value::from(250.0)),
        ];
        let value = LuaAdapter
            .eval_number("(start + end_value) / 2.0", &bindings)
            .unwrap();
        assert!((value - 175.0).abs() < f64::EPSILON);
    }
}
