//! Quoting for paths embedded in device shell commands.
//!
//! Two styles, matching how Android's toybox tools behave: single quotes
//! for commands that modify files (`rm`, `cp`, `mv`, `chmod`), double
//! quotes for `ls`/`readlink`/`test`, which handle them better on some
//! Android builds.

/// Wraps `path` in single quotes, escaping embedded single quotes
/// (`'` becomes `'\''`). Used for mutating commands.
pub fn single_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

/// Wraps `path` in double quotes, escaping `"`, `$` and backtick.
/// Used for listing and probe commands.
pub fn double_quote(path: &str) -> String {
    let escaped = path
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`");
    format!("\"{escaped}\"")
}

/// Parent directory of a device path (`/sdcard/DCIM/a.jpg` ->
/// `/sdcard/DCIM`); `/` for top-level entries.
pub fn remote_parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => "/",
    }
}

/// Final component of a device path.
pub fn remote_file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}
