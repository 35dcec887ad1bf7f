// Core data model shared between the host and plugin scripts.
// Field names are the wire contract: scripts read and construct these objects
// by name, so renaming a serde field is a breaking change.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LabelerError, Result};
use crate::filter::EntryFilter;
use crate::script::ScriptLanguage;

/// One time-labeled segment over an audio sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Sample file name the segment belongs to
    pub sample: String,
    /// Name or alias of the entry
    pub name: String,
    /// Label start time (milliseconds)
    pub start: f64,
    /// Label end time (milliseconds). Zero or negative values are relative to
    /// the sample file's end until resolved by the host.
    pub end: f64,
    /// Additional points (milliseconds) defined by the labeler's fields
    #[serde(default)]
    pub points: Vec<f64>,
    /// Extra values defined by the labeler's extra fields
    #[serde(default)]
    pub extras: Vec<Option<String>>,
    #[serde(default)]
    pub notes: Notes,
    /// Recompute `end` from the sample length before the entry is used
    #[serde(default)]
    pub need_sync: bool,
}

impl Entry {
    pub fn new(sample: impl Into<String>, name: impl Into<String>, start: f64, end: f64) -> Self {
        Entry {
            sample: sample.into(),
            name: name.into(),
            start,
            end,
            points: Vec::new(),
            extras: Vec::new(),
            notes: Notes::default(),
            need_sync: false,
        }
    }

    /// Build an entry from a labeler profile's default values.
    pub fn from_defaults(
        sample: impl Into<String>,
        name: impl Into<String>,
        labeler: &LabelerProfile,
    ) -> Self {
        let defaults = &labeler.default_values;
        let points = if defaults.len() >= 2 {
            defaults[1..defaults.len() - 1].to_vec()
        } else {
            Vec::new()
        };
        Entry {
            sample: sample.into(),
            name: name.into(),
            start: defaults.first().copied().unwrap_or(0.0),
            end: defaults.last().copied().unwrap_or(0.0),
            points,
            extras: labeler.default_extras(),
            notes: Notes::default(),
            need_sync: false,
        }
    }

    /// Sample file name without its extension.
    pub fn sample_name_without_extension(&self) -> &str {
        match self.sample.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.sample,
        }
    }
}

/// Host-only metadata attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Notes {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub star: bool,
    #[serde(default)]
    pub tag: String,
}

/// A template plugin's output record: like [`Entry`] but with an optional
/// sample that falls back to a host-chosen sample file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatEntry {
    #[serde(default)]
    pub sample: Option<String>,
    pub name: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub points: Vec<f64>,
    #[serde(default)]
    pub extras: Vec<Option<String>>,
    #[serde(default)]
    pub notes: Notes,
    #[serde(default)]
    pub need_sync: bool,
}

impl FlatEntry {
    pub fn into_entry(self, fallback_sample: &str) -> Entry {
        Entry {
            sample: self.sample.unwrap_or_else(|| fallback_sample.to_string()),
            name: self.name,
            start: self.start,
            end: self.end,
            points: self.points,
            extras: self.extras,
            notes: self.notes,
            need_sync: self.need_sync,
        }
    }
}

/// A named group of entries sharing one sample directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub name: String,
    pub sample_directory: PathBuf,
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub raw_file_path: Option<PathBuf>,
    #[serde(default)]
    pub entry_filter: Option<EntryFilter>,
    /// Free-form key/value data declared by the labeler
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl Module {
    pub fn new(name: impl Into<String>, sample_directory: impl Into<PathBuf>) -> Self {
        Module {
            name: name.into(),
            sample_directory: sample_directory.into(),
            entries: Vec::new(),
            current_index: 0,
            raw_file_path: None,
            entry_filter: None,
            extras: BTreeMap::new(),
        }
    }
}

/// Module descriptor as produced by project-constructor scripts. Paths are
/// plain strings until resolved host-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModuleDefinition {
    pub name: String,
    pub sample_directory_path: String,
    pub sample_file_names: Vec<String>,
    #[serde(default)]
    pub input_file_paths: Option<Vec<String>>,
    #[serde(default)]
    pub label_file_path: Option<String>,
}

impl RawModuleDefinition {
    pub fn resolve(self) -> ModuleDefinition {
        let sample_directory = PathBuf::from(&self.sample_directory_path);
        let sample_files = self
            .sample_file_names
            .iter()
            .map(|name| sample_directory.join(name))
            .collect();
        let input_files = self.input_file_paths.map(|paths| {
            paths
                .into_iter()
                .map(PathBuf::from)
                .filter(|path| path.is_file())
                .collect()
        });
        let label_file = self.label_file_path.map(PathBuf::from);
        ModuleDefinition {
            name: self.name,
            sample_directory,
            sample_files,
            input_files,
            label_file,
        }
    }
}

/// Resolved module descriptor, ready to be parsed into a [`Module`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDefinition {
    pub name: String,
    pub sample_directory: PathBuf,
    pub sample_files: Vec<PathBuf>,
    pub input_files: Option<Vec<PathBuf>>,
    pub label_file: Option<PathBuf>,
}

/// Script source declared by a labeler profile: either inline lines or a
/// single source string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddedScript {
    Source(String),
    Lines(Vec<String>),
}

impl EmbeddedScript {
    pub fn source(&self) -> String {
        match self {
            EmbeddedScript::Source(text) => text.clone(),
            EmbeddedScript::Lines(lines) => lines.join("\n"),
        }
    }
}

/// Declares how one raw label line is turned into an [`Entry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserDef {
    #[serde(default = "default_encoding")]
    pub default_encoding: String,
    /// Regex whose capture groups feed [`ParserDef::variable_names`]
    #[serde(default)]
    pub extraction_pattern: String,
    /// Variable names bound to the extracted groups, in group order
    #[serde(default)]
    pub variable_names: Vec<String>,
    pub script: EmbeddedScript,
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

/// Declares how a project layout is constructed from a sample directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConstructorDef {
    pub script: EmbeddedScript,
}

/// A derived numeric property of an entry, with scripts to read and
/// optionally write it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub name: String,
    pub value_getter: EmbeddedScript,
    #[serde(default)]
    pub value_setter: Option<EmbeddedScript>,
}

/// Definition of one extra (string) field carried by every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraFieldDef {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
}

/// The labeler contract the engine consumes: field counts, defaults and the
/// labeler-owned scripts (parser, project constructor, properties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelerProfile {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Label file extension, without the leading dot
    pub extension: String,
    /// Default values for start, each point field, and end, in order
    pub default_values: Vec<f64>,
    /// Names of the point fields, matching `Entry::points` by index
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub extra_fields: Vec<ExtraFieldDef>,
    #[serde(default = "ScriptLanguage::default_for_profile")]
    pub language: ScriptLanguage,
    /// Configurable parameters of the labeler, fed to its parser and project
    /// constructor scripts
    #[serde(default)]
    pub parameters: Vec<crate::params::ParameterDef>,
    pub parser: ParserDef,
    #[serde(default)]
    pub project_constructor: Option<ProjectConstructorDef>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Keys allowed in `Module::extras`
    #[serde(default)]
    pub module_extra_keys: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl LabelerProfile {
    /// Number of point values every entry must carry.
    pub fn point_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of extra values every entry must carry.
    pub fn extra_count(&self) -> usize {
        self.extra_fields.len()
    }

    pub fn default_extras(&self) -> Vec<Option<String>> {
        self.extra_fields
            .iter()
            .map(|field| field.default.clone())
            .collect()
    }

    pub fn property(&self, name: &str) -> Result<&PropertyDef> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .ok_or_else(|| {
                LabelerError::UnknownProperty {
                    labeler: self.name.clone(),
                    property: name.to_string(),
                }
                .into()
            })
    }

    /// Check an entry against the declared field counts. Returns the
    /// violation reason, if any; shape errors are raised by the caller.
    pub fn check_entry(&self, entry: &Entry) -> std::result::Result<(), String> {
        if entry.points.len() != self.point_count() {
            return Err(format!(
                "entry '{}' has {} points, labeler '{}' declares {}",
                entry.name,
                entry.points.len(),
                self.name,
                self.point_count()
            ));
        }
        if entry.extras.len() != self.extra_count() {
            return Err(format!(
                "entry '{}' has {} extras, labeler '{}' declares {}",
                entry.name,
                entry.extras.len(),
                self.name,
                self.extra_count()
            ));
        }
        for (field, extra) in self.extra_fields.iter().zip(&entry.extras) {
            if extra.is_none() && !field.is_optional {
                return Err(format!(
                    "entry '{}' has null value for non-optional extra field '{}'",
                    entry.name, field.name
                ));
            }
        }
        Ok(())
    }

    /// Load a labeler profile from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(LabelerError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let text = std::fs::read_to_string(path)?;
        let profile: LabelerProfile =
            serde_json::from_str(&text).map_err(|e| LabelerError::Invalid {
                message: e.to_string(),
                path: Some(path.to_path_buf()),
            })?;
        profile.validate()?;
        Ok(profile)
    }

    /// Validate internal consistency of the profile.
    pub fn validate(&self) -> Result<()> {
        if self.default_values.len() != self.point_count() + 2 {
            return Err(LabelerError::Invalid {
                message: format!(
                    "defaultValues has {} values, expected {} (start, {} fields, end)",
                    self.default_values.len(),
                    self.point_count() + 2,
                    self.point_count()
                ),
                path: None,
            }
            .into());
        }
        let mut seen = std::collections::HashSet::new();
        for field in self.fields.iter().chain(
            self.extra_fields
                .iter()
                .map(|extra_field| &extra_field.name),
        ) {
            if !seen.insert(field.as_str()) {
                return Err(LabelerError::Invalid {
                    message: format!("duplicate field name '{field}'"),
                    path: None,
                }
                .into());
            }
        }
        if !self.parser.extraction_pattern.is_empty() {
            regex::Regex::new(&self.parser.extraction_pattern).map_err(|e| {
                LabelerError::Invalid {
                    message: format!("invalid extraction pattern: {e}"),
                    path: None,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn oto_like_profile() -> LabelerProfile {
        LabelerProfile {
            name: "oto".to_string(),
            version: 1,
            extension: "ini".to_string(),
            default_values: vec![0.0, 100.0, 200.0, 300.0, 400.0],
            fields: vec!["fixed".to_string(), "preutterance".to_string(), "overlap".to_string()],
            extra_fields: vec![],
            language: ScriptLanguage::Rhai,
            parameters: vec![],
            parser: ParserDef {
                default_encoding: "UTF-8".to_string(),
                extraction_pattern: String::new(),
                variable_names: vec![],
                script: EmbeddedScript::Source("entry = 0".to_string()),
            },
            project_constructor: None,
            properties: vec![],
            module_extra_keys: vec![],
        }
    }

    #[test]
    fn test_entry_wire_names() {
        let entry = Entry {
            sample: "a.wav".to_string(),
            name: "a".to_string(),
            start: 100.0,
            end: 200.0,
            points: vec![150.0],
            extras: vec![None, Some("x".to_string())],
            notes: Notes::default(),
            need_sync: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("needSync").is_some());
        assert_eq!(json["extras"][0], serde_json::Value::Null);
        let back: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_entry_defaults_on_deserialize() {
        let entry: Entry =
            serde_json::from_str(r#"{"sample": "a.wav", "name": "a", "start": 0.0, "end": 1.5}"#)
                .unwrap();
        assert!(entry.points.is_empty());
        assert!(!entry.need_sync);
        assert!(!entry.notes.done);
    }

    #[test]
    fn test_sample_name_without_extension() {
        assert_eq!(
            Entry::new("a.b.wav", "x", 0.0, 0.0).sample_name_without_extension(),
            "a.b"
        );
        assert_eq!(
            Entry::new("noext", "x", 0.0, 0.0).sample_name_without_extension(),
            "noext"
        );
    }

    #[test]
    fn test_check_entry_field_counts() {
        let labeler = oto_like_profile();
        let mut entry = Entry::new("a.wav", "a", 0.0, 100.0);
        assert!(labeler.check_entry(&entry).is_err());

        entry.points = vec![10.0, 20.0, 30.0];
        assert!(labeler.check_entry(&entry).is_ok());
    }

    #[test]
    fn test_profile_validation_rejects_bad_default_values() {
        let mut labeler = oto_like_profile();
        labeler.default_values = vec![0.0, 1.0];
        assert!(labeler.validate().is_err());
    }

    #[test]
    fn test_raw_module_definition_resolution() {
        let raw = RawModuleDefinition {
            name: "C4".to_string(),
            sample_directory_path: "/voices/C4".to_string(),
            sample_file_names: vec!["a.wav".to_string(), "i.wav".to_string()],
            input_file_paths: None,
            label_file_path: Some("/voices/C4/oto.ini".to_string()),
        };
        let resolved = raw.resolve();
        assert_eq!(resolved.sample_files[1], PathBuf::from("/voices/C4/i.wav"));
        assert_eq!(resolved.label_file, Some(PathBuf::from("/voices/C4/oto.ini")));
    }
}
