// Parameter model: typed, named, defaulted and constrained plugin inputs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ParameterError, Result};
use crate::filesystem;
use crate::filter::EntryFilter;
use crate::localization::LocalizedString;
use crate::model::Entry;

/// A file path plus the encoding to read it with. An empty/absent file marks
/// an unset optional parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileWithEncoding {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl FileWithEncoding {
    pub fn new(file: impl Into<String>) -> Self {
        FileWithEncoding {
            file: Some(file.into()),
            encoding: None,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.file.as_deref().map_or(true, str::is_empty)
    }
}

/// One declared plugin parameter. The `type` tag and the field names are the
/// manifest wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParameterDef {
    #[serde(rename = "integer", rename_all = "camelCase")]
    Integer {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        default_value: i64,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    #[serde(rename = "float", rename_all = "camelCase")]
    Float {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        default_value: f64,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    #[serde(rename = "boolean", rename_all = "camelCase")]
    Boolean {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        default_value: bool,
    },
    #[serde(rename = "string", rename_all = "camelCase")]
    String {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        default_value: String,
        #[serde(default)]
        multi_line: bool,
        #[serde(default)]
        optional: bool,
        /// Token the value must contain, e.g. a placeholder in a rename
        /// pattern
        #[serde(default)]
        must_contain: Option<String>,
    },
    #[serde(rename = "enum", rename_all = "camelCase")]
    Enum {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        default_value: String,
        options: Vec<String>,
    },
    #[serde(rename = "file", rename_all = "camelCase")]
    File {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        #[serde(default)]
        default_value: FileWithEncoding,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        accept_extensions: Option<Vec<String>>,
    },
    #[serde(rename = "rawFile", rename_all = "camelCase")]
    RawFile {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        #[serde(default)]
        default_value: String,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        accept_extensions: Option<Vec<String>>,
        #[serde(default)]
        is_folder: bool,
    },
    #[serde(rename = "entryFilter", rename_all = "camelCase")]
    EntryFilter {
        name: String,
        #[serde(default)]
        label: Option<LocalizedString>,
        #[serde(default)]
        description: Option<LocalizedString>,
        #[serde(default)]
        default_value: EntryFilter,
    },
}

impl ParameterDef {
    pub fn name(&self) -> &str {
        match self {
            ParameterDef::Integer { name, .. }
            | ParameterDef::Float { name, .. }
            | ParameterDef::Boolean { name, .. }
            | ParameterDef::String { name, .. }
            | ParameterDef::Enum { name, .. }
            | ParameterDef::File { name, .. }
            | ParameterDef::RawFile { name, .. }
            | ParameterDef::EntryFilter { name, .. } => name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterDef::Integer { .. } => "integer",
            ParameterDef::Float { .. } => "float",
            ParameterDef::Boolean { .. } => "boolean",
            ParameterDef::String { .. } => "string",
            ParameterDef::Enum { .. } => "enum",
            ParameterDef::File { .. } => "file",
            ParameterDef::RawFile { .. } => "rawFile",
            ParameterDef::EntryFilter { .. } => "entryFilter",
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self {
            ParameterDef::Integer { default_value, .. } => ParamValue::Int(*default_value),
            ParameterDef::Float { default_value, .. } => ParamValue::Float(*default_value),
            ParameterDef::Boolean { default_value, .. } => ParamValue::Bool(*default_value),
            ParameterDef::String { default_value, .. }
            | ParameterDef::Enum { default_value, .. }
            | ParameterDef::RawFile { default_value, .. } => {
                ParamValue::Text(default_value.clone())
            }
            ParameterDef::File { default_value, .. } => ParamValue::File(default_value.clone()),
            ParameterDef::EntryFilter { default_value, .. } => {
                ParamValue::Filter(default_value.clone())
            }
        }
    }

    /// Convert a raw JSON override into a typed value. Returns the rejection
    /// reason on a type mismatch.
    fn coerce(&self, raw: &Value) -> std::result::Result<ParamValue, String> {
        match self {
            ParameterDef::Integer { .. } => raw
                .as_i64()
                .map(ParamValue::Int)
                .ok_or_else(|| format!("expected an integer, got {raw}")),
            ParameterDef::Float { .. } => raw
                .as_f64()
                .map(ParamValue::Float)
                .ok_or_else(|| format!("expected a number, got {raw}")),
            ParameterDef::Boolean { .. } => raw
                .as_bool()
                .map(ParamValue::Bool)
                .ok_or_else(|| format!("expected a boolean, got {raw}")),
            ParameterDef::String { .. } | ParameterDef::Enum { .. } | ParameterDef::RawFile { .. } => {
                raw.as_str()
                    .map(|text| ParamValue::Text(text.to_string()))
                    .ok_or_else(|| format!("expected a string, got {raw}"))
            }
            ParameterDef::File { .. } => serde_json::from_value(raw.clone())
                .map(ParamValue::File)
                .map_err(|e| format!("expected a file object: {e}")),
            ParameterDef::EntryFilter { .. } => serde_json::from_value(raw.clone())
                .map(ParamValue::Filter)
                .map_err(|e| format!("expected an entry filter object: {e}")),
        }
    }

    /// Check one typed value against this definition's constraints. Pure and
    /// side-effect-free so it can run on every form edit.
    pub fn check(&self, value: &ParamValue) -> std::result::Result<(), String> {
        match (self, value) {
            (ParameterDef::Integer { min, max, .. }, ParamValue::Int(int_value)) => {
                if let Some(min) = min {
                    if int_value < min {
                        return Err(format!("{int_value} is less than the minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if int_value > max {
                        return Err(format!("{int_value} is greater than the maximum {max}"));
                    }
                }
                Ok(())
            }
            (ParameterDef::Float { min, max, .. }, ParamValue::Float(float_value)) => {
                if float_value.is_nan() {
                    return Err("value must not be NaN".to_string());
                }
                if let Some(min) = min {
                    if float_value < min {
                        return Err(format!("{float_value} is less than the minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if float_value > max {
                        return Err(format!("{float_value} is greater than the maximum {max}"));
                    }
                }
                Ok(())
            }
            (ParameterDef::Boolean { .. }, ParamValue::Bool(_)) => Ok(()),
            (
                ParameterDef::String {
                    multi_line,
                    optional,
                    must_contain,
                    ..
                },
                ParamValue::Text(text),
            ) => {
                if text.is_empty() && !optional {
                    return Err("value must not be empty".to_string());
                }
                if !multi_line && text.lines().count() > 1 {
                    return Err("value must be a single line".to_string());
                }
                if let Some(token) = must_contain {
                    if !text.is_empty() && !text.contains(token.as_str()) {
                        return Err(format!("value must contain '{token}'"));
                    }
                }
                Ok(())
            }
            (ParameterDef::Enum { options, .. }, ParamValue::Text(text)) => {
                if options.iter().any(|option| option == text) {
                    Ok(())
                } else {
                    Err(format!(
                        "'{text}' is not one of the declared options [{}]",
                        options.join(", ")
                    ))
                }
            }
            (
                ParameterDef::File {
                    optional,
                    accept_extensions,
                    ..
                },
                ParamValue::File(file),
            ) => {
                if file.is_unset() {
                    return if *optional {
                        Ok(())
                    } else {
                        Err("a file is required".to_string())
                    };
                }
                let path = std::path::Path::new(file.file.as_deref().unwrap_or_default());
                if !path.is_file() {
                    return Err(format!("file does not exist: {}", path.display()));
                }
                check_extension(path, accept_extensions.as_deref())
            }
            (
                ParameterDef::RawFile {
                    optional,
                    accept_extensions,
                    is_folder,
                    ..
                },
                ParamValue::Text(text),
            ) => {
                if text.is_empty() {
                    return if *optional {
                        Ok(())
                    } else {
                        Err("a path is required".to_string())
                    };
                }
                let path = std::path::Path::new(text);
                if !path.exists() {
                    return Err(format!("path does not exist: {}", path.display()));
                }
                if path.is_dir() != *is_folder {
                    return Err(if *is_folder {
                        format!("expected a directory: {}", path.display())
                    } else {
                        format!("expected a file: {}", path.display())
                    });
                }
                if !is_folder {
                    check_extension(path, accept_extensions.as_deref())?;
                }
                Ok(())
            }
            (ParameterDef::EntryFilter { .. }, ParamValue::Filter(_)) => Ok(()),
            _ => Err(format!(
                "value does not match the declared type '{}'",
                self.type_name()
            )),
        }
    }
}

fn check_extension(
    path: &std::path::Path,
    accepted: Option<&[String]>,
) -> std::result::Result<(), String> {
    let Some(accepted) = accepted else {
        return Ok(());
    };
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default();
    if accepted.iter().any(|accept| accept == extension) {
        Ok(())
    } else {
        Err(format!(
            "extension '{extension}' is not one of [{}]",
            accepted.join(", ")
        ))
    }
}

/// A resolved, typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    File(FileWithEncoding),
    Filter(EntryFilter),
}

/// Resolved parameters keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamMap {
    map: BTreeMap<String, ParamValue>,
}

impl ParamMap {
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.map.get(key)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(ParamValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn get_filter(&self, key: &str) -> Option<&EntryFilter> {
        match self.map.get(key) {
            Some(ParamValue::Filter(filter)) => Some(filter),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.map.iter()
    }

    /// Produce the JSON object handed to scripts as `params`.
    ///
    /// File parameters resolve to the referenced file's decoded contents (or
    /// null when unset); entry-filter parameters resolve to the selected
    /// entry indices against `entries`.
    pub fn resolve_for_script(&self, entries: Option<&[Entry]>) -> Result<Value> {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.map {
            let resolved = match value {
                ParamValue::Bool(bool_value) => Value::from(*bool_value),
                ParamValue::Int(int_value) => Value::from(*int_value),
                ParamValue::Float(float_value) => Value::from(*float_value),
                ParamValue::Text(text) => Value::from(text.clone()),
                ParamValue::File(file) => {
                    if file.is_unset() {
                        Value::Null
                    } else {
                        let path =
                            std::path::Path::new(file.file.as_deref().unwrap_or_default());
                        let text =
                            filesystem::read_text(path, file.encoding.as_deref())?;
                        Value::from(text)
                    }
                }
                ParamValue::Filter(filter) => match entries {
                    Some(entries) => Value::from(
                        filter
                            .select(entries)
                            .into_iter()
                            .map(|index| index as u64)
                            .collect::<Vec<_>>(),
                    ),
                    None => {
                        tracing::warn!(key = %key, "entry filter parameter used without entries");
                        Value::Null
                    }
                },
            };
            object.insert(key.clone(), resolved);
        }
        Ok(Value::Object(object))
    }
}

impl FromIterator<(String, ParamValue)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        ParamMap {
            map: iter.into_iter().collect(),
        }
    }
}

/// Resolve declared parameters against raw user overrides.
///
/// Every definition takes its override when present and well-typed, else its
/// default. Unknown override keys are ignored. The whole resolution is pure:
/// it can be re-run on every edit of a parameter form.
pub fn resolve_params(
    defs: &[ParameterDef],
    overrides: &BTreeMap<String, Value>,
) -> Result<ParamMap> {
    let mut map = BTreeMap::new();
    for def in defs {
        let value = match overrides.get(def.name()) {
            Some(raw) => def.coerce(raw).map_err(|reason| ParameterError::InvalidValue {
                key: def.name().to_string(),
                reason,
            })?,
            None => def.default_value(),
        };
        def.check(&value).map_err(|reason| ParameterError::InvalidValue {
            key: def.name().to_string(),
            reason,
        })?;
        map.insert(def.name().to_string(), value);
    }
    Ok(ParamMap { map })
}

/// The defaults of a definition list, as raw override values.
pub fn defaults_of(defs: &[ParameterDef]) -> BTreeMap<String, Value> {
    defs.iter()
        .map(|def| {
            let value = serde_json::to_value(def.default_value())
                .unwrap_or(Value::Null);
            (def.name().to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_def(name: &str, default: &str, optional: bool) -> ParameterDef {
        ParameterDef::String {
            name: name.to_string(),
            label: None,
            description: None,
            default_value: default.to_string(),
            multi_line: false,
            optional,
            must_contain: None,
        }
    }

    fn int_def(name: &str, default: i64, min: Option<i64>, max: Option<i64>) -> ParameterDef {
        ParameterDef::Integer {
            name: name.to_string(),
            label: None,
            description: None,
            default_value: default,
            min,
            max,
        }
    }

    #[test]
    fn test_defaults_apply_when_no_override() {
        let defs = vec![string_def("suffix", "_2", false), int_def("repeat", 2, Some(1), None)];
        let params = resolve_params(&defs, &BTreeMap::new()).unwrap();
        assert_eq!(params.get_text("suffix"), Some("_2"));
        assert_eq!(params.get("repeat"), Some(&ParamValue::Int(2)));
    }

    #[test]
    fn test_resolving_defaults_equals_resolving_empty() {
        let defs = vec![string_def("suffix", "_2", false), int_def("repeat", 2, Some(1), None)];
        let from_empty = resolve_params(&defs, &BTreeMap::new()).unwrap();
        let from_defaults = resolve_params(&defs, &defaults_of(&defs)).unwrap();
        assert_eq!(from_empty, from_defaults);
    }

    #[test]
    fn test_unknown_override_keys_are_ignored() {
        let defs = vec![int_def("repeat", 2, None, None)];
        let mut overrides = BTreeMap::new();
        overrides.insert("unknown".to_string(), Value::from("x"));
        assert!(resolve_params(&defs, &overrides).is_ok());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let defs = vec![int_def("repeat", 2, None, None)];
        let mut overrides = BTreeMap::new();
        overrides.insert("repeat".to_string(), Value::from("three"));
        let error = resolve_params(&defs, &overrides).unwrap_err();
        assert!(error.to_string().contains("repeat"));
    }

    #[test]
    fn test_int_range_constraint() {
        let defs = vec![int_def("repeat", 2, Some(1), Some(10))];
        let mut overrides = BTreeMap::new();
        overrides.insert("repeat".to_string(), Value::from(0));
        assert!(resolve_params(&defs, &overrides).is_err());
        overrides.insert("repeat".to_string(), Value::from(10));
        assert!(resolve_params(&defs, &overrides).is_ok());
    }

    #[test]
    fn test_required_string_must_not_be_empty() {
        let defs = vec![string_def("suffix", "_2", false)];
        let mut overrides = BTreeMap::new();
        overrides.insert("suffix".to_string(), Value::from(""));
        assert!(resolve_params(&defs, &overrides).is_err());

        let optional_defs = vec![string_def("suffix", "", true)];
        assert!(resolve_params(&optional_defs, &BTreeMap::new()).is_ok());
    }

    #[test]
    fn test_single_line_string_rejects_line_breaks() {
        let defs = vec![string_def("name", "a", false)];
        let mut overrides = BTreeMap::new();
        overrides.insert("name".to_string(), Value::from("a\nb"));
        assert!(resolve_params(&defs, &overrides).is_err());
    }

    #[test]
    fn test_must_contain_token() {
        let defs = vec![ParameterDef::String {
            name: "pattern".to_string(),
            label: None,
            description: None,
            default_value: "{name}_rep".to_string(),
            multi_line: false,
            optional: false,
            must_contain: Some("{name}".to_string()),
        }];
        let mut overrides = BTreeMap::new();
        overrides.insert("pattern".to_string(), Value::from("rep"));
        let error = resolve_params(&defs, &overrides).unwrap_err();
        assert!(error.to_string().contains("{name}"));
    }

    #[test]
    fn test_enum_value_must_be_declared_option() {
        let defs = vec![ParameterDef::Enum {
            name: "mode".to_string(),
            label: None,
            description: None,
            default_value: "prefix".to_string(),
            options: vec!["prefix".to_string(), "suffix".to_string()],
        }];
        let mut overrides = BTreeMap::new();
        overrides.insert("mode".to_string(), Value::from("infix"));
        assert!(resolve_params(&defs, &overrides).is_err());
    }

    #[test]
    fn test_file_param_requires_existing_file() {
        let defs = vec![ParameterDef::File {
            name: "dictionary".to_string(),
            label: None,
            description: None,
            default_value: FileWithEncoding::default(),
            optional: false,
            accept_extensions: None,
        }];
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "dictionary".to_string(),
            serde_json::json!({"file": "/nonexistent/dict.txt"}),
        );
        assert!(resolve_params(&defs, &overrides).is_err());
    }

    #[test]
    fn test_entry_filter_resolves_to_indices() {
        let defs = vec![ParameterDef::EntryFilter {
            name: "selector".to_string(),
            label: None,
            description: None,
            default_value: EntryFilter::default(),
        }];
        let params = resolve_params(&defs, &BTreeMap::new()).unwrap();
        let entries = vec![
            Entry::new("a.wav", "a", 0.0, 1.0),
            Entry::new("b.wav", "b", 0.0, 1.0),
        ];
        let resolved = params.resolve_for_script(Some(&entries)).unwrap();
        assert_eq!(resolved["selector"], serde_json::json!([0, 1]));
    }

    #[test]
    fn test_manifest_wire_format() {
        let def: ParameterDef = serde_json::from_str(
            r#"{
                "type": "integer",
                "name": "repeat",
                "label": "Repeat count",
                "defaultValue": 2,
                "min": 1
            }"#,
        )
        .unwrap();
        assert_eq!(def.name(), "repeat");
        assert_eq!(def.default_value(), ParamValue::Int(2));
    }
}
