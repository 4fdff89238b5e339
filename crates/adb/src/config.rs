use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the adb layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdbConfig {
    /// Explicit adb binary; when unset the binary is located via the
    /// `ADB` environment variable, `PATH`, then conventional SDK spots.
    pub adb_path: Option<PathBuf>,
    /// Interval for per-transfer progress polling.
    pub progress_poll_ms: u64,
    /// Interval for the device tracker's `adb devices` polling.
    pub device_poll_ms: u64,
    /// Device-side staging directory for the permission fallback.
    pub scratch_dir: String,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: None,
            progress_poll_ms: 100,
            device_poll_ms: 1000,
            scratch_dir: "/data/local/tmp/.droidfiles".to_string(),
        }
    }
}

impl AdbConfig {
    pub fn progress_poll(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms)
    }

    pub fn device_poll(&self) -> Duration {
        Duration::from_millis(self.device_poll_ms)
    }

    /// Locates the adb binary. Falls back to the bare name `adb` so the
    /// OS resolves it at spawn time.
    pub fn resolve_adb_path(&self) -> PathBuf {
        if let Some(ref path) = self.adb_path {
            return path.clone();
        }
        if let Some(path) = std::env::var_os("ADB") {
            return PathBuf::from(path);
        }
        if let Some(path) = search_path(adb_binary_name()) {
            return path;
        }
        for candidate in sdk_candidates() {
            if candidate.exists() {
                return candidate;
            }
        }
        PathBuf::from(adb_binary_name())
    }
}

fn adb_binary_name() -> &'static str {
    if cfg!(windows) { "adb.exe" } else { "adb" }
}

fn search_path(binary: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Conventional platform-tools locations, most likely first.
fn sdk_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        candidates.push(home.join("Android/Sdk/platform-tools/adb"));
        candidates.push(home.join("Library/Android/sdk/platform-tools/adb"));
    }
    if let Some(local) = std::env::var_os("LOCALAPPDATA").map(PathBuf::from) {
        candidates.push(local.join("Android\\Sdk\\platform-tools\\adb.exe"));
    }
    candidates.push(PathBuf::from("/usr/lib/android-sdk/platform-tools/adb"));
    candidates.push(PathBuf::from("/opt/android-sdk/platform-tools/adb"));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AdbConfig::default();
        assert_eq!(config.progress_poll(), Duration::from_millis(100));
        assert_eq!(config.device_poll(), Duration::from_millis(1000));
        assert_eq!(config.scratch_dir, "/data/local/tmp/.droidfiles");
        assert!(config.adb_path.is_none());
    }

    #[test]
    fn explicit_path_wins() {
        let config = AdbConfig {
            adb_path: Some(PathBuf::from("/custom/adb")),
            ..Default::default()
        };
        assert_eq!(config.resolve_adb_path(), PathBuf::from("/custom/adb"));
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = AdbConfig {
            progress_poll_ms: 250,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"progressPollMs\":250"));
        let back: AdbConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.progress_poll_ms, 250);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let back: AdbConfig = serde_json::from_str("{\"devicePollMs\": 2000}").unwrap();
        assert_eq!(back.device_poll_ms, 2000);
        assert_eq!(back.progress_poll_ms, 100);
    }
}
