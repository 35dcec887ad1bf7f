// labelscript - plugin scripting engine for time-aligned audio labeling tools
// This file contains the core library surface

pub mod cli;
pub mod error;
pub mod filesystem;
pub mod filter;
pub mod host;
pub mod localization;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod params;
pub mod process;
pub mod runner;
pub mod script;

// Re-export main types for easier access
pub use error::{
    exit_codes, EngineError, ExecutionError, LabelerError, ManifestError, ParameterError,
    ProcessError, Result,
};
pub use filesystem::FileSystem;
pub use filter::EntryFilter;
pub use host::{AudioPlaybackRequest, EnvProbe, HostContext};
pub use localization::{LocalizedString, DEFAULT_LOCALE};
pub use logging::{ColorConfig, LogConfig, LogFormat};
pub use manifest::{
    discover_plugins, MacroOutputMode, PluginKind, PluginManifest, PLUGIN_DISABLED_MARKER,
    PLUGIN_MANIFEST_FILE,
};
pub use model::{
    EmbeddedScript, Entry, ExtraFieldDef, FlatEntry, LabelerProfile, Module, ModuleDefinition,
    Notes, ParserDef, ProjectConstructorDef, PropertyDef, RawModuleDefinition,
};
pub use params::{
    defaults_of, resolve_params, FileWithEncoding, ParamMap, ParamValue, ParameterDef,
};
pub use process::{ProcessConfig, ProcessResult};
pub use runner::{
    MacroResult, ParamOverrides, ParserContext, PluginRunner, RunOutcome, RunPhase, TemplateResult,
};
pub use script::{
    adapter_for, LuaAdapter, RhaiAdapter, ScriptAdapter, ScriptJob, ScriptLanguage, ScriptOutput,
    ScriptSource,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

// Build information (set by build script)
pub const BUILD_DATE: &str = env!("BUILD_DATE");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const RUST_VERSION: &str = env!("RUST_VERSION");

/// Get formatted version string with build information
pub fn version_info() -> String {
    format!("{NAME} {VERSION} (commit: {GIT_COMMIT}, built: {BUILD_DATE}, rustc: {RUST_VERSION})")
}
