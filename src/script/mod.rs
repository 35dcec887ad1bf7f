// Script execution adapters: two interchangeable embedded languages behind
// one observable contract. The runner is written against `ScriptAdapter`
// only and never names a concrete language.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ExecutionError, Result};
use crate::host::HostContext;
use crate::localization::LocalizedString;

pub mod lua;
pub mod rhai;

pub use self::lua::LuaAdapter;
pub use self::rhai::RhaiAdapter;

/// The scripting language a plugin or labeler is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    Rhai,
    Lua,
}

impl ScriptLanguage {
    pub fn file_extension(&self) -> &'static str {
        match self {
            ScriptLanguage::Rhai => "rhai",
            ScriptLanguage::Lua => "lua",
        }
    }

    pub fn from_file_extension(extension: &str) -> Option<Self> {
        match extension {
            "rhai" => Some(ScriptLanguage::Rhai),
            "lua" => Some(ScriptLanguage::Lua),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptLanguage::Rhai => "rhai",
            ScriptLanguage::Lua => "lua",
        }
    }

    pub(crate) fn default_for_profile() -> Self {
        ScriptLanguage::Rhai
    }
}

/// One script source file: display name plus body text.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub name: String,
    pub text: String,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        ScriptSource {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// The language-agnostic input bundle for one script execution.
///
/// `bindings` are deep-converted JSON values; `file_bindings` become native
/// host File handles. Every name in `outputs` is pre-declared in the script
/// scope and collected after execution; a variable the script never set is
/// simply absent from the result.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    pub sources: Vec<ScriptSource>,
    pub bindings: Vec<(String, Value)>,
    pub file_bindings: Vec<(String, PathBuf)>,
    pub outputs: Vec<String>,
    pub host: HostContext,
}

impl ScriptJob {
    pub fn new(host: HostContext) -> Self {
        ScriptJob {
            sources: Vec::new(),
            bindings: Vec::new(),
            file_bindings: Vec::new(),
            outputs: Vec::new(),
            host,
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.push(ScriptSource::new(name, text));
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.push((name.into(), value));
        self
    }

    pub fn bind_file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.file_bindings.push((name.into(), path.into()));
        self
    }

    pub fn collect(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }
}

/// Output variables read back from the script's top-level scope.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    values: BTreeMap<String, Value>,
}

impl ScriptOutput {
    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One execution of one script body against one input bundle. Adapters are
/// stateless: every `run` builds a fresh interpreter, so nothing leaks
/// between executions.
pub trait ScriptAdapter: Send + Sync {
    fn language(&self) -> ScriptLanguage;

    fn run(&self, job: ScriptJob) -> Result<ScriptOutput>;

    /// Evaluate a single numeric expression with the given bindings. Used by
    /// property setters; runs without host functions.
    fn eval_number(&self, expression: &str, bindings: &[(String, Value)]) -> Result<f64>;
}

/// The adapter for a language.
pub fn adapter_for(language: ScriptLanguage) -> Box<dyn ScriptAdapter> {
    match language {
        ScriptLanguage::Rhai => Box::new(RhaiAdapter),
        ScriptLanguage::Lua => Box::new(LuaAdapter),
    }
}

/// Classify a script failure: if the host context holds an `error(...)`
/// payload the failure is expected and carries the script's message,
/// otherwise it is an unexpected failure with the runtime diagnostic.
pub(crate) fn failure_from(host: &HostContext, diagnostic: String) -> ExecutionError {
    match host.take_expected_error() {
        Some(message) => ExecutionError::Expected { message },
        None => ExecutionError::unexpected(diagnostic),
    }
}

/// Interpret an `error(...)` / `report(...)` payload: a plain string or a
/// locale-to-string map.
pub(crate) fn localized_from_json(value: Value) -> LocalizedString {
    serde_json::from_value(value.clone())
        .unwrap_or_else(|_| LocalizedString::Plain(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_serde_tags() {
        let language: ScriptLanguage = serde_json::from_str("\"lua\"").unwrap();
        assert_eq!(language, ScriptLanguage::Lua);
        assert_eq!(serde_json::to_string(&ScriptLanguage::Rhai).unwrap(), "\"rhai\"");
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(
            ScriptLanguage::from_file_extension("rhai"),
            Some(ScriptLanguage::Rhai)
        );
        assert_eq!(ScriptLanguage::from_file_extension("js"), None);
    }

    #[test]
    fn test_localized_from_json_accepts_both_forms() {
        let plain = localized_from_json(Value::from("oops"));
        assert_eq!(plain.default_text(), "oops");

        let map = localized_from_json(serde_json::json!({"en": "oops", "ja": "エラー"}));
        assert_eq!(map.get("ja"), "エラー");
    }

    #[test]
    fn test_failure_classification() {
        let host = HostContext::new(false);
        let unexpected = failure_from(&host, "boom".to_string());
        assert!(!unexpected.is_expected());

        host.signal_error(LocalizedString::plain("told you"));
        let expected = failure_from(&host, "boom".to_string());
        assert!(expected.is_expected());
    }
}
