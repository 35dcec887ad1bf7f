// Host-side execution state shared by both script backends.
// Scripts interact with the outside world only through the functions that
// close over a HostContext; the runtimes themselves carry no IO primitives.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::localization::LocalizedString;

/// An audio-preview request recorded by a script via
/// `request_audio_playback(...)`. Playback itself belongs to the host
/// application; the engine only collects the requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPlaybackRequest {
    pub path: String,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Default)]
struct HostState {
    expected_error: Option<LocalizedString>,
    report: Option<LocalizedString>,
    playback_requests: Vec<AudioPlaybackRequest>,
}

/// Per-execution host state. Cheap to clone; all clones share one state so
/// host functions registered on a script engine observe the same run.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub debug: bool,
    pub allow_process_execution: bool,
    pub working_dir: Option<PathBuf>,
    state: Arc<Mutex<HostState>>,
}

impl HostContext {
    pub fn new(debug: bool) -> Self {
        HostContext {
            debug,
            allow_process_execution: false,
            working_dir: None,
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_process_execution(mut self, allow: bool) -> Self {
        self.allow_process_execution = allow;
        self
    }

    /// Record the payload of a script's `error(...)` call. The adapter aborts
    /// execution right after; the runner reads this back to classify the
    /// failure as expected.
    pub fn signal_error(&self, message: LocalizedString) {
        let mut state = self.state.lock().expect("host state poisoned");
        state.expected_error = Some(message);
    }

    pub fn take_expected_error(&self) -> Option<LocalizedString> {
        let mut state = self.state.lock().expect("host state poisoned");
        state.expected_error.take()
    }

    /// Record an informational report. A later call replaces an earlier one.
    pub fn set_report(&self, message: LocalizedString) {
        let mut state = self.state.lock().expect("host state poisoned");
        state.report = Some(message);
    }

    pub fn take_report(&self) -> Option<LocalizedString> {
        let mut state = self.state.lock().expect("host state poisoned");
        state.report.take()
    }

    pub fn request_audio_playback(&self, request: AudioPlaybackRequest) {
        let mut state = self.state.lock().expect("host state poisoned");
        state.playback_requests.push(request);
    }

    pub fn take_playback_requests(&self) -> Vec<AudioPlaybackRequest> {
        let mut state = self.state.lock().expect("host state poisoned");
        std::mem::take(&mut state.playback_requests)
    }

    /// Script console logging: a no-op unless this run's debug flag is set.
    pub fn log(&self, message: &str) {
        if self.debug {
            tracing::debug!(target: "labelscript::script", "{message}");
        }
    }
}

/// Environment probe exposed to scripts
pub struct EnvProbe;

impl EnvProbe {
    /// OS family name: `windows`, `mac`, `linux` or the raw std identifier.
    pub fn os_name() -> &'static str {
        match std::env::consts::OS {
            "macos" => "mac",
            other => other,
        }
    }

    pub fn is_windows() -> bool {
        cfg!(target_os = "windows")
    }

    pub fn is_mac() -> bool {
        cfg!(target_os = "macos")
    }

    pub fn is_linux() -> bool {
        cfg!(target_os = "linux")
    }

    /// Read a host environment variable. Escape hatch; use sparingly.
    pub fn system_property(name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}
