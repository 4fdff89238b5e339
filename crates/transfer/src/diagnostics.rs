//! Classification of adb and device-shell diagnostics.
//!
//! adb reports everything on stderr, including conditions that are not
//! failures; Android shell tools print errors to stdout as often as not.
//! Substring matching is the only contract available.

/// Markers that make a shell command's output a genuine failure. Matched
/// case-insensitively; empty output is success.
const FAILURE_MARKERS: &[&str] = &[
    "no such",
    "not found",
    "cannot",
    "failed",
    "permission denied",
    "not permitted",
    "error",
];

/// Whether the captured output of a device shell command (`cp`, `mv`,
/// `rm`, `mkdir`) indicates the command failed.
pub fn shell_output_indicates_error(output: &str) -> bool {
    if output.trim().is_empty() {
        return false;
    }
    let lowered = output.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Known-harmless transfer stderr: warnings, or an explicit success
/// confirmation ("1 file pushed", "2 files pulled") despite a nonzero
/// exit.
pub fn is_benign_transfer_stderr(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("warning") || lowered.contains("pushed") || lowered.contains("pulled")
}

/// The ownership-repair rejection some devices produce after a push whose
/// data copy succeeded. Not a transfer failure, but the device needs the
/// scratch fallback from here on.
pub fn is_ownership_repair_rejection(stderr: &str) -> bool {
    stderr.to_lowercase().contains("fchown failed")
}
