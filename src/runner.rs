// Plugin runner: orchestrates one execution of one plugin kind, supplies the
// kind's host objects, schema-checks the declared outputs and translates
// failures into the error taxonomy. One linear pass per execution:
// Idle -> ParamsResolved -> Executing -> {Succeeded | ExpectedFailure |
// UnexpectedFailure}. No retries; a failed execution commits nothing.
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EngineError, ExecutionError, LabelerError, Result};
use crate::filesystem::FileSystem;
use crate::host::{AudioPlaybackRequest, HostContext};
use crate::localization::LocalizedString;
use crate::manifest::{MacroOutputMode, PluginKind, PluginManifest};
use crate::model::{Entry, FlatEntry, LabelerProfile, Module, ModuleDefinition, RawModuleDefinition};
use crate::params::{resolve_params, ParamMap};
use crate::script::{adapter_for, ScriptAdapter, ScriptJob, ScriptOutput};

/// Raw parameter overrides as collected from a form or a CLI flag.
pub type ParamOverrides = BTreeMap<String, Value>;

/// Phases of one execution, logged as the run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ParamsResolved,
    Executing,
    Succeeded,
    ExpectedFailure,
    UnexpectedFailure,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::ParamsResolved => "params-resolved",
            RunPhase::Executing => "executing",
            RunPhase::Succeeded => "succeeded",
            RunPhase::ExpectedFailure => "expected-failure",
            RunPhase::UnexpectedFailure => "unexpected-failure",
        }
    }
}

/// A successful execution's value plus the messages collected on the way.
#[derive(Debug, Clone)]
pub struct RunOutcome<T> {
    pub value: T,
    pub report: Option<LocalizedString>,
    pub playback_requests: Vec<AudioPlaybackRequest>,
}

/// Result of a macro execution: the full replacement entry list. The caller
/// owns committing it back to the module.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroResult {
    pub entries: Vec<Entry>,
    pub current_index: usize,
}

/// Result of a template execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateResult {
    Entries(Vec<Entry>),
    RawLines(Vec<String>),
}

/// Inputs for parser executions, shared across the lines of one label file.
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    pub input_file_name: Option<String>,
    pub sample_file_names: Vec<String>,
    pub overrides: ParamOverrides,
    pub encoding: Option<String>,
}

/// One edit record of a macro plugin in edit-list mode. A missing index marks
/// an insertion; a missing entry marks a deletion of the indexed entry.
#[derive(Debug, Clone, Deserialize)]
struct EditRecord {
    #[serde(default)]
    index: Option<i64>,
    #[serde(default)]
    entry: Option<Entry>,
}

/// Executes plugins against one labeler profile.
///
/// The runner is written against the [`ScriptAdapter`] trait only; the
/// concrete language comes from the plugin manifest or the labeler profile.
/// `run` is blocking; asynchronous dispatch, cancellation and timeouts are
/// caller concerns.
pub struct PluginRunner {
    labeler: LabelerProfile,
    debug: bool,
}

impl PluginRunner {
    pub fn new(labeler: LabelerProfile) -> Self {
        PluginRunner {
            labeler,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn labeler(&self) -> &LabelerProfile {
        &self.labeler
    }

    /// Run a macro plugin against a module's entry list. Either the full
    /// kind-specific effect is returned, or the error leaves the module
    /// untouched.
    pub fn run_macro(
        &self,
        plugin: &PluginManifest,
        overrides: &ParamOverrides,
        module: &Module,
    ) -> Result<RunOutcome<MacroResult>> {
        self.expect_kind(plugin, PluginKind::Macro)?;
        plugin.check_labeler(&self.labeler)?;

        let params = resolve_params(plugin.parameter_defs(), overrides)?;
        trace_phase(&plugin.name, RunPhase::ParamsResolved);
        let params_json = params.resolve_for_script(Some(&module.entries))?;

        let host = self.host_for(PluginKind::Macro, plugin.directory.as_deref());
        let mut job = ScriptJob::new(host.clone())
            .bind("debug", Value::from(self.debug))
            .bind("labeler", serde_json::to_value(&self.labeler)?)
            .bind("params", params_json)
            .bind("resources", Value::from(plugin.read_resource_texts()?))
            .bind("entries", serde_json::to_value(&module.entries)?)
            .bind("currentEntryIndex", Value::from(module.current_index as i64));
        job = match plugin.output_mode {
            MacroOutputMode::EditList => job.collect("output"),
            MacroOutputMode::ReplaceAll => job.collect("entries").collect("currentEntryIndex"),
        };
        for source in plugin.read_script_sources()? {
            job = job.with_source(source.name, source.text);
        }

        trace_phase(&plugin.name, RunPhase::Executing);
        let adapter = adapter_for(plugin.language);
        let mut output = self.execute(&plugin.name, adapter.as_ref(), job)?;

        let result = match plugin.output_mode {
            MacroOutputMode::EditList => {
                self.apply_edit_list(module, output.take("output"))?
            }
            MacroOutputMode::ReplaceAll => self.apply_replacement(
                module,
                output.take("entries"),
                output.take("currentEntryIndex"),
            )?,
        };
        trace_phase(&plugin.name, RunPhase::Succeeded);
        Ok(RunOutcome {
            value: result,
            report: host.take_report(),
            playback_requests: host.take_playback_requests(),
        })
    }

    /// Run a template plugin over freeform input files, producing new
    /// entries. Template scripts never see existing entries.
    pub fn run_template(
        &self,
        plugin: &PluginManifest,
        overrides: &ParamOverrides,
        input_files: &[&Path],
        encoding: Option<&str>,
        sample_names: &[String],
    ) -> Result<RunOutcome<TemplateResult>> {
        self.expect_kind(plugin, PluginKind::Template)?;
        plugin.check_labeler(&self.labeler)?;
        if plugin.require_input_file && input_files.is_empty() {
            return Err(ExecutionError::expected(input_file_required_message()).into());
        }

        let params = resolve_params(plugin.parameter_defs(), overrides)?;
        trace_phase(&plugin.name, RunPhase::ParamsResolved);
        let params_json = params.resolve_for_script(None)?;

        let input_texts = input_files
            .iter()
            .map(|path| FileSystem::read_text(path, encoding))
            .collect::<Result<Vec<String>>>()?;

        let host = self.host_for(PluginKind::Template, plugin.directory.as_deref());
        let mut job = ScriptJob::new(host.clone())
            .bind("debug", Value::from(self.debug))
            .bind("labeler", serde_json::to_value(&self.labeler)?)
            .bind("inputs", Value::from(input_texts))
            .bind("samples", Value::from(sample_names.to_vec()))
            .bind("params", params_json)
            .bind("resources", Value::from(plugin.read_resource_texts()?))
            .collect("output");
        for source in plugin.read_script_sources()? {
            job = job.with_source(source.name, source.text);
        }

        trace_phase(&plugin.name, RunPhase::Executing);
        let adapter = adapter_for(plugin.language);
        let mut output = self.execute(&plugin.name, adapter.as_ref(), job)?;

        let value = output.take("output").ok_or_else(|| {
            shape(PluginKind::Template, "script did not set the `output` variable")
        })?;
        let result = if plugin.output_raw_entry {
            let lines: Vec<String> = from_list(PluginKind::Template, value)?;
            TemplateResult::RawLines(lines)
        } else {
            let flat_entries: Vec<FlatEntry> = from_list(PluginKind::Template, value)?;
            let fallback = sample_names.first().cloned().unwrap_or_default();
            let entries: Vec<Entry> = flat_entries
                .into_iter()
                .map(|flat_entry| flat_entry.into_entry(&fallback))
                .collect();
            self.check_entries(PluginKind::Template, &entries)?;
            TemplateResult::Entries(entries)
        };
        trace_phase(&plugin.name, RunPhase::Succeeded);
        Ok(RunOutcome {
            value: result,
            report: host.take_report(),
            playback_requests: host.take_playback_requests(),
        })
    }

    /// Run the labeler's project constructor over a root sample directory.
    pub fn run_project_constructor(
        &self,
        root: &Path,
        overrides: &ParamOverrides,
        encoding: Option<&str>,
        accepted_sample_extensions: &[String],
    ) -> Result<RunOutcome<Vec<ModuleDefinition>>> {
        let constructor = self.labeler.project_constructor.clone().ok_or_else(|| {
            EngineError::from(LabelerError::Invalid {
                message: format!("labeler '{}' has no project constructor", self.labeler.name),
                path: None,
            })
        })?;

        let params = resolve_params(&self.labeler.parameters, overrides)?;
        trace_phase(&self.labeler.name, RunPhase::ParamsResolved);
        let params_json = params.resolve_for_script(None)?;

        let host = self.host_for(PluginKind::ProjectConstructor, None);
        let job = ScriptJob::new(host.clone())
            .bind("debug", Value::from(self.debug))
            .bind("params", params_json)
            .bind("encoding", encoding.map(Value::from).unwrap_or(Value::Null))
            .bind(
                "acceptedSampleExtensions",
                Value::from(accepted_sample_extensions.to_vec()),
            )
            .bind_file("root", root)
            .collect("modules")
            .with_source("projectConstructor", constructor.script.source());

        trace_phase(&self.labeler.name, RunPhase::Executing);
        let adapter = adapter_for(self.labeler.language);
        let mut output = self.execute(&self.labeler.name, adapter.as_ref(), job)?;

        let value = output.take("modules").ok_or_else(|| {
            shape(
                PluginKind::ProjectConstructor,
                "script did not set the `modules` variable",
            )
        })?;
        let raw_definitions: Vec<RawModuleDefinition> =
            from_list(PluginKind::ProjectConstructor, value)?;
        if raw_definitions.is_empty() {
            return Err(ExecutionError::expected(no_modules_message()).into());
        }
        let definitions = raw_definitions
            .into_iter()
            .map(RawModuleDefinition::resolve)
            .collect();
        trace_phase(&self.labeler.name, RunPhase::Succeeded);
        Ok(RunOutcome {
            value: definitions,
            report: host.take_report(),
            playback_requests: host.take_playback_requests(),
        })
    }

    /// Parse one raw label line into an entry with the labeler's parser
    /// script. Returns `Ok(None)` when the extraction pattern does not match
    /// the line; such lines are skipped.
    pub fn parse_line(&self, line: &str, context: &ParserContext) -> Result<Option<Entry>> {
        let params = resolve_params(&self.labeler.parameters, &context.overrides)?;
        let pattern = self.extraction_pattern()?;
        self.parse_line_with_params(line, context, &params, pattern.as_ref())
    }

    /// Parse a whole label file's lines, skipping non-matching lines.
    pub fn parse_lines(&self, lines: &[String], context: &ParserContext) -> Result<Vec<Entry>> {
        let params = resolve_params(&self.labeler.parameters, &context.overrides)?;
        trace_phase(&self.labeler.name, RunPhase::ParamsResolved);
        let pattern = self.extraction_pattern()?;
        let mut entries = Vec::new();
        for line in lines {
            if let Some(entry) =
                self.parse_line_with_params(line, context, &params, pattern.as_ref())?
            {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn extraction_pattern(&self) -> Result<Option<regex::Regex>> {
        let pattern = &self.labeler.parser.extraction_pattern;
        if pattern.is_empty() {
            return Ok(None);
        }
        regex::Regex::new(pattern).map(Some).map_err(|e| {
            EngineError::from(LabelerError::Invalid {
                message: format!("invalid extraction pattern: {e}"),
                path: None,
            })
        })
    }

    fn parse_line_with_params(
        &self,
        line: &str,
        context: &ParserContext,
        params: &ParamMap,
        pattern: Option<&regex::Regex>,
    ) -> Result<Option<Entry>> {
        let parser = &self.labeler.parser;
        let mut extracted: Vec<(String, Value)> = Vec::new();
        if let Some(pattern) = pattern {
            let Some(captures) = pattern.captures(line) else {
                return Ok(None);
            };
            for (group_index, variable) in parser.variable_names.iter().enumerate() {
                let captured = captures
                    .get(group_index + 1)
                    .map(|group| group.as_str())
                    .unwrap_or_default();
                extracted.push((variable.clone(), Value::from(captured)));
            }
        }

        let params_json = params.resolve_for_script(None)?;
        let host = self.host_for(PluginKind::Parser, None);
        let mut job = ScriptJob::new(host)
            .bind("debug", Value::from(self.debug))
            .bind(
                "inputFileName",
                context
                    .input_file_name
                    .as_deref()
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            )
            .bind(
                "sampleFileNames",
                Value::from(context.sample_file_names.to_vec()),
            )
            .bind("params", params_json)
            .bind(
                "encoding",
                context
                    .encoding
                    .as_deref()
                    .or(Some(parser.default_encoding.as_str()))
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            );
        for (variable, value) in extracted {
            job = job.bind(variable, value);
        }
        job = job
            .collect("entry")
            .with_source("parser", parser.script.source());

        let adapter = adapter_for(self.labeler.language);
        let mut output = self.execute(&self.labeler.name, adapter.as_ref(), job)?;

        let value = output
            .take("entry")
            .ok_or_else(|| shape(PluginKind::Parser, "script did not set the `entry` variable"))?;
        let flat_entry: FlatEntry = serde_json::from_value(value)
            .map_err(|e| shape(PluginKind::Parser, format!("`entry` is not an entry: {e}")))?;
        let fallback = context
            .sample_file_names
            .first()
            .cloned()
            .unwrap_or_default();
        let entry = flat_entry.into_entry(&fallback);
        self.check_entries(PluginKind::Parser, std::slice::from_ref(&entry))?;
        Ok(Some(entry))
    }

    /// Compute one labeler property's new value for one entry from a numeric
    /// expression, then apply the property's setter script. Entry-derived
    /// locals (`sample`, `name`, `start`, `end`, `duration` and each point
    /// field by name) are bound before the expression is evaluated.
    pub fn run_property_setter(
        &self,
        property_name: &str,
        expression: &str,
        entry: &Entry,
    ) -> Result<Entry> {
        let property = self.labeler.property(property_name)?;
        let setter = property.value_setter.clone().ok_or_else(|| {
            EngineError::from(LabelerError::Invalid {
                message: format!(
                    "property '{property_name}' of labeler '{}' has no value setter",
                    self.labeler.name
                ),
                path: None,
            })
        })?;

        let mut bindings: Vec<(String, Value)> = vec![
            ("sample".to_string(), Value::from(entry.sample.clone())),
            ("name".to_string(), Value::from(entry.name.clone())),
            ("start".to_string(), Value::from(entry.start)),
            ("end".to_string(), Value::from(entry.end)),
            (
                "duration".to_string(),
                Value::from(entry.end - entry.start),
            ),
        ];
        for (field, point) in self.labeler.fields.iter().zip(&entry.points) {
            bindings.push((field.clone(), Value::from(*point)));
        }

        let adapter = adapter_for(self.labeler.language);
        trace_phase(&self.labeler.name, RunPhase::Executing);
        let value = adapter.eval_number(expression, &bindings).map_err(|error| {
            tracing::info!(%error, expression, "property expression evaluation failed");
            EngineError::from(ExecutionError::expected(format!(
                "Failed to evaluate the expression '{expression}'"
            )))
        })?;

        let job = ScriptJob::new(self.host_for(PluginKind::PropertySetter, None))
            .bind("debug", Value::from(self.debug))
            .bind("value", Value::from(value))
            .bind("entry", serde_json::to_value(entry)?)
            .collect("entry")
            .with_source("valueSetter", setter.source());
        let mut output = self.execute(&self.labeler.name, adapter.as_ref(), job)?;

        let value = output.take("entry").ok_or_else(|| {
            shape(
                PluginKind::PropertySetter,
                "setter script did not set the `entry` variable",
            )
        })?;
        let updated: Entry = serde_json::from_value(value).map_err(|e| {
            shape(
                PluginKind::PropertySetter,
                format!("`entry` is not an entry: {e}"),
            )
        })?;
        if updated.points.len() != entry.points.len() {
            return Err(shape(
                PluginKind::PropertySetter,
                format!(
                    "setter changed the points length from {} to {}",
                    entry.points.len(),
                    updated.points.len()
                ),
            )
            .into());
        }
        self.check_entries(PluginKind::PropertySetter, std::slice::from_ref(&updated))?;
        trace_phase(&self.labeler.name, RunPhase::Succeeded);
        Ok(updated)
    }

    fn expect_kind(&self, plugin: &PluginManifest, kind: PluginKind) -> Result<()> {
        if plugin.kind != kind {
            return Err(ExecutionError::unexpected(format!(
                "plugin '{}' is a {} plugin, expected {}",
                plugin.name,
                plugin.kind.as_str(),
                kind.as_str()
            ))
            .into());
        }
        Ok(())
    }

    fn host_for(&self, kind: PluginKind, directory: Option<&Path>) -> HostContext {
        let mut host =
            HostContext::new(self.debug).with_process_execution(kind.allows_process_execution());
        if let Some(directory) = directory {
            host = host.with_working_dir(directory);
        }
        host
    }

    /// Run the adapter and log the failure class per the taxonomy: expected
    /// failures at info without a stack trace, everything else with the full
    /// diagnostic.
    fn execute(
        &self,
        name: &str,
        adapter: &dyn ScriptAdapter,
        job: ScriptJob,
    ) -> Result<ScriptOutput> {
        adapter.run(job).map_err(|error| {
            if let EngineError::Execution(execution) = &error {
                if execution.is_expected() {
                    trace_phase(name, RunPhase::ExpectedFailure);
                    tracing::info!(plugin = %name, message = %execution, "plugin aborted");
                } else {
                    trace_phase(name, RunPhase::UnexpectedFailure);
                    tracing::error!(plugin = %name, diagnostic = %execution, "plugin failed");
                }
            }
            error
        })
    }

    fn apply_edit_list(&self, module: &Module, value: Option<Value>) -> Result<MacroResult> {
        let Some(value) = value else {
            // No output produced: the module is unchanged.
            return Ok(MacroResult {
                entries: module.entries.clone(),
                current_index: module.current_index,
            });
        };
        let records: Vec<EditRecord> = from_list(PluginKind::Macro, value)?;

        let input_len = module.entries.len();
        let mut seen = vec![false; input_len];
        for record in &records {
            match record.index {
                Some(index) => {
                    if index < 0 || (index as usize) >= input_len {
                        return Err(shape(
                            PluginKind::Macro,
                            format!("edit record index {index} is out of range 0..{input_len}"),
                        )
                        .into());
                    }
                    let index = index as usize;
                    if seen[index] {
                        return Err(shape(
                            PluginKind::Macro,
                            format!("duplicate edit record index {index}"),
                        )
                        .into());
                    }
                    seen[index] = true;
                }
                None => {
                    if record.entry.is_none() {
                        return Err(shape(
                            PluginKind::Macro,
                            "edit record has neither an index nor an entry",
                        )
                        .into());
                    }
                }
            }
        }
        if let Some(missing) = seen.iter().position(|covered| !covered) {
            return Err(shape(
                PluginKind::Macro,
                format!(
                    "edit list covers {} of {input_len} entries; index {missing} is missing",
                    seen.iter().filter(|covered| **covered).count()
                ),
            )
            .into());
        }

        let entries: Vec<Entry> = records
            .into_iter()
            .filter_map(|record| record.entry)
            .collect();
        if entries.is_empty() && input_len > 0 {
            return Err(ExecutionError::expected(cannot_remove_all_message()).into());
        }
        self.check_entries(PluginKind::Macro, &entries)?;
        Ok(MacroResult {
            current_index: clamp_index(module.current_index, entries.len()),
            entries,
        })
    }

    fn apply_replacement(
        &self,
        module: &Module,
        entries_value: Option<Value>,
        current_index_value: Option<Value>,
    ) -> Result<MacroResult> {
        let Some(entries_value) = entries_value else {
            return Ok(MacroResult {
                entries: module.entries.clone(),
                current_index: module.current_index,
            });
        };
        let entries: Vec<Entry> = from_list(PluginKind::Macro, entries_value)?;
        if entries.is_empty() && !module.entries.is_empty() {
            return Err(ExecutionError::expected(cannot_remove_all_message()).into());
        }
        self.check_entries(PluginKind::Macro, &entries)?;

        let current_index = current_index_value
            .and_then(|value| value.as_i64())
            .map(|index| index.max(0) as usize)
            .unwrap_or(module.current_index);
        Ok(MacroResult {
            current_index: clamp_index(current_index, entries.len()),
            entries,
        })
    }

    fn check_entries(&self, kind: PluginKind, entries: &[Entry]) -> Result<()> {
        for entry in entries {
            if let Err(reason) = self.labeler.check_entry(entry) {
                return Err(shape(kind, reason).into());
            }
        }
        Ok(())
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        index.min(len - 1)
    }
}

fn trace_phase(name: &str, phase: RunPhase) {
    tracing::debug!(plugin = %name, phase = phase.as_str(), "run phase");
}

fn shape(kind: PluginKind, reason: impl Into<String>) -> ExecutionError {
    ExecutionError::shape(kind.as_str(), reason)
}

/// Deserialize a list-valued output variable. An empty Lua table marshals as
/// an empty object, so `{}` is accepted as the empty list.
fn from_list<T: serde::de::DeserializeOwned>(kind: PluginKind, value: Value) -> Result<Vec<T>> {
    let value = match value {
        Value::Object(object) if object.is_empty() => Value::Array(Vec::new()),
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| shape(kind, format!("output is not the expected list: {e}")).into())
}

fn cannot_remove_all_message() -> LocalizedString {
    let mut map = BTreeMap::new();
    map.insert("en".to_string(), "Could not remove all entries.".to_string());
    map.insert("zh".to_string(), "不能删除所有条目。".to_string());
    map.insert("ja".to_string(), "すべてのエントリを削除できません。".to_string());
    map.insert("ko".to_string(), "모든 엔트리를 삭제할 수 없습니다.".to_string());
    LocalizedString::Localized(map)
}

fn no_modules_message() -> LocalizedString {
    let mut map = BTreeMap::new();
    map.insert(
        "en".to_string(),
        "No modules were constructed from the given directory.".to_string(),
    );
    map.insert("zh".to_string(), "无法从所选目录构建任何模块。".to_string());
    map.insert(
        "ja".to_string(),
        "指定されたディレクトリからモジュールを構築できませんでした。".to_string(),
    );
    LocalizedString::Localized(map)
}

fn input_file_required_message() -> LocalizedString {
    let mut map = BTreeMap::new();
    map.insert(
        "en".to_string(),
        "This plugin requires an input file.".to_string(),
    );
    map.insert("ja".to_string(), "このプラグインには入力ファイルが必要です。".to_string());
    LocalizedString::Localized(map)
}
