// Plugin manifest loading, validation and directory discovery
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ManifestError, Result};
use crate::localization::LocalizedString;
use crate::model::LabelerProfile;
use crate::params::ParameterDef;
use crate::script::{ScriptLanguage, ScriptSource};

pub const PLUGIN_MANIFEST_FILE: &str = "plugin.json";
pub const PLUGIN_DISABLED_MARKER: &str = ".disabled";

/// The five plugin kinds the runner executes. Standalone plugin directories
/// declare `macro` or `template`; the other kinds are owned by the labeler
/// profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginKind {
    #[serde(rename = "parser")]
    Parser,
    #[serde(rename = "projectConstructor")]
    ProjectConstructor,
    #[serde(rename = "macro")]
    Macro,
    #[serde(rename = "template")]
    Template,
    #[serde(rename = "propertySetter")]
    PropertySetter,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Parser => "parser",
            PluginKind::ProjectConstructor => "projectConstructor",
            PluginKind::Macro => "macro",
            PluginKind::Template => "template",
            PluginKind::PropertySetter => "propertySetter",
        }
    }

    /// Whether scripts of this kind may call `execute_command`.
    pub fn allows_process_execution(&self) -> bool {
        matches!(self, PluginKind::Macro | PluginKind::Template)
    }
}

/// How a macro plugin reports its result: a sparse edit list in `output`, or
/// a full reassignment of `entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MacroOutputMode {
    #[serde(rename = "editList")]
    EditList,
    #[default]
    #[serde(rename = "replaceAll")]
    ReplaceAll,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterList {
    #[serde(default)]
    pub list: Vec<ParameterDef>,
}

/// A plugin's `plugin.json` manifest. Only deserialization is supported.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    #[serde(default)]
    pub displayed_name: Option<LocalizedString>,
    pub author: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub description: Option<LocalizedString>,
    #[serde(default)]
    pub website: String,
    pub supported_label_file_extension: String,
    #[serde(default)]
    pub input_file_extension: Option<String>,
    #[serde(default)]
    pub require_input_file: bool,
    #[serde(default)]
    pub output_raw_entry: bool,
    #[serde(default)]
    pub output_mode: MacroOutputMode,
    pub language: ScriptLanguage,
    #[serde(default)]
    pub parameters: Option<ParameterList>,
    pub script_files: Vec<String>,
    #[serde(default)]
    pub resource_files: Vec<String>,
    #[serde(skip)]
    pub directory: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

impl PluginManifest {
    /// Load and validate a plugin from its directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if dir.join(PLUGIN_DISABLED_MARKER).exists() {
            return Err(ManifestError::Disabled {
                plugin: dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }
            .into());
        }
        let manifest_path = dir.join(PLUGIN_MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(ManifestError::NotFound {
                path: manifest_path,
            }
            .into());
        }
        let text = std::fs::read_to_string(&manifest_path)?;
        let mut manifest: PluginManifest =
            serde_json::from_str(&text).map_err(|e| ManifestError::InvalidJson {
                message: e.to_string(),
                path: Some(manifest_path),
            })?;
        manifest.directory = Some(dir.to_path_buf());
        manifest.expand_file_defaults()?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn parameter_defs(&self) -> &[ParameterDef] {
        self.parameters
            .as_ref()
            .map(|parameters| parameters.list.as_slice())
            .unwrap_or_default()
    }

    /// A string parameter default of the form `file::<relative path>` is
    /// replaced by the (trimmed) contents of that file in the plugin
    /// directory.
    fn expand_file_defaults(&mut self) -> Result<()> {
        let Some(directory) = self.directory.clone() else {
            return Ok(());
        };
        let plugin = self.name.clone();
        let Some(parameters) = self.parameters.as_mut() else {
            return Ok(());
        };
        for def in &mut parameters.list {
            if let ParameterDef::String {
                name,
                default_value,
                ..
            } = def
            {
                if let Some(file_name) = default_value.strip_prefix("file::") {
                    let path = directory.join(file_name);
                    let content =
                        std::fs::read_to_string(&path).map_err(|e| {
                            ManifestError::InvalidParameterDef {
                                plugin: plugin.clone(),
                                key: name.clone(),
                                reason: format!(
                                    "default value file '{file_name}' could not be read: {e}"
                                ),
                            }
                        })?;
                    *default_value = content.trim().to_string();
                }
            }
        }
        Ok(())
    }

    /// Structural validation: referenced files exist, parameter keys are
    /// unique and definitions are internally consistent.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.kind, PluginKind::Macro | PluginKind::Template) {
            return Err(ManifestError::InvalidJson {
                message: format!(
                    "standalone plugins must be of type 'macro' or 'template', got '{}'",
                    self.kind.as_str()
                ),
                path: self.directory.as_ref().map(|d| d.join(PLUGIN_MANIFEST_FILE)),
            }
            .into());
        }
        if let Some(directory) = &self.directory {
            if self.script_files.is_empty() {
                return Err(ManifestError::MissingScriptFile {
                    plugin: self.name.clone(),
                    file: "<none declared>".to_string(),
                }
                .into());
            }
            for file in &self.script_files {
                if !directory.join(file).is_file() {
                    return Err(ManifestError::MissingScriptFile {
                        plugin: self.name.clone(),
                        file: file.clone(),
                    }
                    .into());
                }
            }
            for file in &self.resource_files {
                if !directory.join(file).is_file() {
                    return Err(ManifestError::MissingResourceFile {
                        plugin: self.name.clone(),
                        file: file.clone(),
                    }
                    .into());
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for def in self.parameter_defs() {
            if !seen.insert(def.name().to_string()) {
                return Err(ManifestError::DuplicateParameterKey {
                    plugin: self.name.clone(),
                    key: def.name().to_string(),
                }
                .into());
            }
            self.validate_parameter_def(def)?;
        }
        Ok(())
    }

    fn validate_parameter_def(&self, def: &ParameterDef) -> Result<()> {
        let reject = |reason: String| -> Result<()> {
            Err(ManifestError::InvalidParameterDef {
                plugin: self.name.clone(),
                key: def.name().to_string(),
                reason,
            }
            .into())
        };
        match def {
            ParameterDef::Integer { min, max, default_value, .. } => {
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return reject(format!("min {min} is greater than max {max}"));
                    }
                }
                if min.is_some_and(|min| *default_value < min)
                    || max.is_some_and(|max| *default_value > max)
                {
                    return reject(format!("default {default_value} is out of range"));
                }
            }
            ParameterDef::Float { min, max, default_value, .. } => {
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return reject(format!("min {min} is greater than max {max}"));
                    }
                }
                if default_value.is_nan() {
                    return reject("default must not be NaN".to_string());
                }
            }
            ParameterDef::Enum { options, default_value, .. } => {
                if options.is_empty() {
                    return reject("enum must declare at least one option".to_string());
                }
                if !options.contains(default_value) {
                    return reject(format!("default '{default_value}' is not an option"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Check this plugin against the active labeler's label file extension.
    pub fn check_labeler(&self, labeler: &LabelerProfile) -> Result<()> {
        if self.supported_label_file_extension != "*"
            && self.supported_label_file_extension != labeler.extension
        {
            return Err(ManifestError::UnsupportedLabelExtension {
                plugin: self.name.clone(),
                extension: labeler.extension.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn read_script_sources(&self) -> Result<Vec<ScriptSource>> {
        let directory = self.directory.clone().unwrap_or_default();
        self.script_files
            .iter()
            .map(|file| {
                let text = std::fs::read_to_string(directory.join(file))?;
                Ok(ScriptSource::new(file.clone(), text))
            })
            .collect()
    }

    pub fn read_resource_texts(&self) -> Result<Vec<String>> {
        let directory = self.directory.clone().unwrap_or_default();
        self.resource_files
            .iter()
            .map(|file| Ok(std::fs::read_to_string(directory.join(file))?))
            .collect()
    }

    pub fn displayed_name_text(&self) -> &str {
        self.displayed_name
            .as_ref()
            .map(|name| name.default_text())
            .unwrap_or(&self.name)
    }
}

/// Default plugin search directories under the platform data dir: the user's
/// custom plugins shadow the installed ones.
pub fn default_plugin_dirs() -> Vec<PathBuf> {
    let Some(data_dir) = dirs::data_dir() else {
        return Vec::new();
    };
    let base = data_dir.join("labelscript");
    vec![base.join("custom-plugins"), base.join("plugins")]
}

/// Discover plugins across search directories. Earlier directories take
/// precedence for duplicate plugin names; disabled and unreadable plugins are
/// skipped with a log line.
pub fn discover_plugins(search_dirs: &[PathBuf]) -> Vec<PluginManifest> {
    let mut seen = std::collections::HashSet::new();
    let mut plugins = Vec::new();
    for search_dir in search_dirs {
        let Ok(children) = std::fs::read_dir(search_dir) else {
            continue;
        };
        let mut child_dirs: Vec<PathBuf> = children
            .filter_map(|dir_entry| dir_entry.ok())
            .map(|dir_entry| dir_entry.path())
            .filter(|path| path.is_dir())
            .collect();
        child_dirs.sort();
        for dir in child_dirs {
            let dir_name = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if seen.contains(&dir_name) {
                continue;
            }
            match PluginManifest::load_from_dir(&dir) {
                Ok(manifest) => {
                    tracing::info!(plugin = %manifest.name, path = %dir.display(), "loaded plugin");
                    seen.insert(dir_name);
                    plugins.push(manifest);
                }
                Err(error) => {
                    if matches!(
                        &error,
                        crate::error::EngineError::Manifest(manifest_error)
                            if matches!(**manifest_error, ManifestError::Disabled { .. })
                    ) {
                        tracing::info!(path = %dir.display(), "skipping disabled plugin");
                        seen.insert(dir_name);
                    } else {
                        tracing::warn!(path = %dir.display(), %error, "failed to load plugin");
                    }
                }
            }
        }
    }
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    plugins
}
