//! Remote directory listing.
//!
//! `ls -la` is parsed line by line. Android ships several ls flavors, so
//! the parser is forgiving: entries it cannot make sense of are dropped,
//! inaccessible entries (all-question-mark permissions) are kept but
//! flagged, and embedded per-entry `Permission denied` noise does not
//! fail the listing. Symlinks are classified as directories by probing
//! the device, since the link line alone cannot tell.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use droidfiles_transfer::shell::double_quote;
use droidfiles_transfer::{DeviceTransport, DirectoryEnumerator, RemoteEntry, TransferError};

use crate::FileOpsError;

/// One entry of a device directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub name: String,
    pub full_path: String,
    pub size: u64,
    pub modified: Option<NaiveDateTime>,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub symlink_target: Option<String>,
    /// `false` for entries ls could not stat (shown but not enterable).
    pub is_accessible: bool,
}

/// Lists device directories over a [`DeviceTransport`].
pub struct RemoteLister {
    transport: Arc<dyn DeviceTransport>,
}

impl RemoteLister {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self { transport }
    }

    /// Lists `path`, resolving it through symlinks first.
    ///
    /// Entries under a symlinked directory keep the path the caller asked
    /// for, so the explorer's breadcrumbs stay stable.
    pub async fn entries(&self, path: &str) -> Result<Vec<FileItem>, FileOpsError> {
        let resolved = self.resolve_symlink(path).await;
        let command = format!("ls -la {} 2>&1", double_quote(&resolved));
        let output = self.transport.shell(&command).await?;

        if output.contains("Permission denied") && !output.contains("total") {
            return Err(FileOpsError::PermissionDenied(path.to_string()));
        }

        let mut items = Vec::new();
        for line in output.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with("total ") {
                continue;
            }
            if line.contains("Permission denied") {
                // Per-entry noise; salvage anything parseable before it.
                if let Some((before, _)) = line.split_once("ls:")
                    && !before.trim().is_empty()
                    && let Some(item) = parse_ls_line(before.trim_end(), &resolved)
                {
                    items.push(item);
                }
                continue;
            }
            if let Some(item) = parse_ls_line(line, &resolved) {
                items.push(item);
            }
        }

        if path != resolved {
            for item in &mut items {
                if let Some(rest) = item.full_path.strip_prefix(&resolved) {
                    item.full_path = format!("{path}{rest}");
                }
            }
        }

        for item in &mut items {
            if item.is_symlink && !item.is_directory {
                item.is_directory = self.symlink_is_directory(&item.full_path).await;
            }
        }

        Ok(items)
    }

    async fn resolve_symlink(&self, path: &str) -> String {
        let command = format!("readlink -f {} 2>/dev/null", double_quote(path));
        match self.transport.shell(&command).await {
            Ok(output) => {
                let resolved = output.trim();
                if resolved.is_empty() || output.contains("No such file") || resolved == path {
                    path.to_string()
                } else {
                    debug!(path, resolved, "resolved symlink");
                    resolved.to_string()
                }
            }
            Err(_) => path.to_string(),
        }
    }

    async fn symlink_is_directory(&self, path: &str) -> bool {
        let command = format!(
            "test -d {} 2>/dev/null && echo dir || echo file",
            double_quote(path)
        );
        match self.transport.shell(&command).await {
            Ok(output) => output.trim() == "dir",
            // Unknowable: treat as a directory so the user can try it.
            Err(_) => true,
        }
    }
}

impl DirectoryEnumerator for RemoteLister {
    fn list<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RemoteEntry>, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let items = self
                .entries(path)
                .await
                .map_err(|e| TransferError::Transport(e.to_string()))?;
            Ok(items
                .into_iter()
                .map(|item| RemoteEntry {
                    name: item.name,
                    is_directory: item.is_directory,
                    size: item.size,
                })
                .collect())
        })
    }
}

/// Parses one `ls -la` line into a [`FileItem`]. Returns `None` for `.`,
/// `..`, and lines no known ls flavor explains.
pub fn parse_ls_line(line: &str, parent_path: &str) -> Option<FileItem> {
    if line.ends_with(" .") || line.ends_with(" ..") {
        return None;
    }

    // Entries ls could not stat come back as all question marks.
    if line.contains("?????????") {
        let name = line.split_whitespace().last()?;
        if name == "?" || name == "." || name == ".." {
            return None;
        }
        return Some(FileItem {
            name: name.to_string(),
            full_path: join_remote(parent_path, name),
            size: 0,
            modified: None,
            permissions: "d?????????".to_string(),
            owner: "?".to_string(),
            group: "?".to_string(),
            // Assume directory so the explorer offers to enter it.
            is_directory: true,
            is_symlink: false,
            symlink_target: None,
            is_accessible: false,
        });
    }

    let mut fields = Fields::new(line);
    let permissions = fields.next()?;
    if !is_mode_string(permissions) {
        return None;
    }
    let links = fields.next()?;
    if links.parse::<u32>().is_err() {
        return None;
    }
    let owner = fields.next()?;
    let group = fields.next()?;
    let size: u64 = fields.next()?.parse().ok()?;

    let (date_str, mut name) = split_date_and_name(fields.remainder())?;

    let mut symlink_target = None;
    if let Some((link_name, target)) = name.split_once(" -> ") {
        name = link_name;
        symlink_target = Some(target.to_string());
    }
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let is_symlink = permissions.starts_with('l');
    Some(FileItem {
        name: name.to_string(),
        full_path: join_remote(parent_path, name),
        size,
        modified: parse_android_date(&date_str),
        permissions: permissions.to_string(),
        owner: owner.to_string(),
        group: group.to_string(),
        is_directory: permissions.starts_with('d'),
        is_symlink,
        symlink_target,
        is_accessible: !permissions.contains('?'),
    })
}

/// Whitespace-separated field cursor that keeps the untouched remainder,
/// so file names keep their internal spacing.
struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn remainder(&self) -> &'a str {
        self.rest.trim_start()
    }
}

fn is_mode_string(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(kind) = chars.next() else {
        return false;
    };
    matches!(kind, 'd' | 'l' | 'c' | 'b' | 'p' | 's' | '-') && token.len() >= 10
}

/// Splits `"2024-03-05 19:02 video clip.mp4"` or `"Aug  9 14:57 notes.txt"`
/// into date text and name.
fn split_date_and_name(rest: &str) -> Option<(String, &str)> {
    let bytes = rest.as_bytes();
    let looks_iso = bytes.len() >= 16
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[10] == b' '
        && bytes[13] == b':';
    if looks_iso {
        let date = &rest[..16];
        return Some((date.to_string(), rest[16..].trim_start()));
    }

    // Month-name form: three tokens, then the name.
    let mut fields = Fields::new(rest);
    let month = fields.next()?;
    let day = fields.next()?;
    let time = fields.next()?;
    Some((format!("{month} {day} {time}"), fields.remainder()))
}

fn parse_android_date(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Some(parsed);
        }
    }
    // Month-name dates omit the year; assume the current one.
    let with_year = format!("{} {cleaned}", Utc::now().year());
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M").ok()
}

fn join_remote(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", parent.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    use droidfiles_transfer::{ProgressFn, TransportStatus};

    #[test]
    fn parses_regular_file() {
        let item = parse_ls_line(
            "-rw-rw----  1 root sdcard_rw 1048576 2024-03-05 19:02 clip.mp4",
            "/sdcard",
        )
        .unwrap();
        assert_eq!(item.name, "clip.mp4");
        assert_eq!(item.full_path, "/sdcard/clip.mp4");
        assert_eq!(item.size, 1_048_576);
        assert!(!item.is_directory);
        assert!(!item.is_symlink);
        assert!(item.is_accessible);
        assert_eq!(item.owner, "root");
        assert_eq!(item.group, "sdcard_rw");
        let modified = item.modified.unwrap();
        assert_eq!(modified.format("%Y-%m-%d %H:%M").to_string(), "2024-03-05 19:02");
    }

    #[test]
    fn parses_directory() {
        let item = parse_ls_line(
            "drwxrwx--x  2 root sdcard_rw 4096 2024-03-02 08:15 DCIM",
            "/sdcard",
        )
        .unwrap();
        assert!(item.is_directory);
        assert_eq!(item.full_path, "/sdcard/DCIM");
    }

    #[test]
    fn keeps_spaces_in_names() {
        let item = parse_ls_line(
            "-rw-rw----  1 root sdcard_rw 2048 2024-03-05 19:02 video  clip final.mp4",
            "/sdcard",
        )
        .unwrap();
        assert_eq!(item.name, "video  clip final.mp4");
    }

    #[test]
    fn parses_month_name_dates() {
        let item = parse_ls_line(
            "-rw-rw----  1 root sdcard_rw 2048 Aug  9 14:57 notes.txt",
            "/sdcard",
        )
        .unwrap();
        assert_eq!(item.name, "notes.txt");
        let modified = item.modified.unwrap();
        assert_eq!(modified.month(), 8);
        assert_eq!(modified.day(), 9);
    }

    #[test]
    fn parses_symlink_with_target() {
        let item = parse_ls_line(
            "lrwxrwxrwx  1 root root 21 2024-03-01 12:00 sdcard -> /storage/self/primary",
            "/",
        )
        .unwrap();
        assert_eq!(item.name, "sdcard");
        assert_eq!(item.full_path, "/sdcard");
        assert!(item.is_symlink);
        assert_eq!(item.symlink_target.as_deref(), Some("/storage/self/primary"));
        // Directory-ness of a link is unknown from the line alone.
        assert!(!item.is_directory);
    }

    #[test]
    fn skips_dot_entries() {
        assert!(parse_ls_line("drwxrwx--x 4 root sdcard_rw 4096 2024-03-01 12:30 .", "/sdcard").is_none());
        assert!(parse_ls_line("drwxrwx--x 21 root sdcard_rw 4096 2024-03-01 12:29 ..", "/sdcard").is_none());
    }

    #[test]
    fn keeps_inaccessible_entries_flagged() {
        let item = parse_ls_line(
            "d?????????   ? ?      ?       ?                ? secure",
            "/data",
        )
        .unwrap();
        assert_eq!(item.name, "secure");
        assert_eq!(item.full_path, "/data/secure");
        assert!(!item.is_accessible);
        assert!(item.is_directory);
        assert_eq!(item.size, 0);
    }

    #[test]
    fn drops_unparseable_lines() {
        assert!(parse_ls_line("garbage line", "/sdcard").is_none());
        assert!(parse_ls_line("", "/sdcard").is_none());
        // Character devices carry "major, minor" instead of a size.
        assert!(
            parse_ls_line("crw-rw-rw- 1 root root 1, 3 2024-03-01 12:00 null", "/dev").is_none()
        );
    }

    #[test]
    fn root_paths_join_cleanly() {
        assert_eq!(join_remote("/", "sdcard"), "/sdcard");
        assert_eq!(join_remote("/sdcard/", "DCIM"), "/sdcard/DCIM");
    }

    #[test]
    fn file_item_serialization() {
        let item = parse_ls_line(
            "drwxrwx--x  2 root sdcard_rw 4096 2024-03-02 08:15 DCIM",
            "/sdcard",
        )
        .unwrap();
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"name\":\"DCIM\""));
        assert!(json.contains("\"fullPath\":\"/sdcard/DCIM\""));
        assert!(json.contains("\"isDirectory\":true"));
    }

    // ---------------------------------------------------------------
    // RemoteLister against a scripted transport
    // ---------------------------------------------------------------

    struct ScriptedTransport {
        responses: Mutex<VecDeque<String>>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    impl DeviceTransport for ScriptedTransport {
        fn serial(&self) -> &str {
            "emulator-5554"
        }

        fn shell<'a>(
            &'a self,
            command: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>> {
            self.commands.lock().unwrap().push(command.to_string());
            let response = self.responses.lock().unwrap().pop_front();
            Box::pin(async move { Ok(response.unwrap_or_default()) })
        }

        fn push<'a>(
            &'a self,
            _local: &'a Path,
            _remote: &'a str,
            _progress: ProgressFn,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<TransportStatus, TransferError>> + Send + 'a>>
        {
            Box::pin(async move {
                Ok(TransportStatus {
                    exit_code: 0,
                    stderr: String::new(),
                })
            })
        }

        fn pull<'a>(
            &'a self,
            _remote: &'a str,
            _local: &'a Path,
            _progress: ProgressFn,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<TransportStatus, TransferError>> + Send + 'a>>
        {
            Box::pin(async move {
                Ok(TransportStatus {
                    exit_code: 0,
                    stderr: String::new(),
                })
            })
        }
    }

    const LISTING: &str = "\
total 24
drwxrwx--x  4 root sdcard_rw 4096 2024-03-01 12:30 .
drwxrwx--x 21 root sdcard_rw 4096 2024-03-01 12:29 ..
drwxrwx--x  2 root sdcard_rw 4096 2024-03-02 08:15 DCIM
-rw-rw----  1 root sdcard_rw 2048 2024-03-05 19:02 notes.txt
";

    #[tokio::test]
    async fn lister_returns_entries() {
        // readlink response, then the listing.
        let transport = Arc::new(ScriptedTransport::new(&["/sdcard\n", LISTING]));
        let lister = RemoteLister::new(transport.clone());

        let items = lister.entries("/sdcard").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "DCIM");
        assert!(items[0].is_directory);
        assert_eq!(items[1].name, "notes.txt");
        assert_eq!(items[1].size, 2048);

        let commands = transport.commands.lock().unwrap();
        assert!(commands[0].starts_with("readlink -f"));
        assert!(commands[1].starts_with("ls -la"));
    }

    #[tokio::test]
    async fn lister_rewrites_paths_under_symlinked_dirs() {
        let transport = Arc::new(ScriptedTransport::new(&[
            "/storage/self/primary\n",
            "\
total 8
drwxrwx--x  2 root sdcard_rw 4096 2024-03-02 08:15 DCIM
",
        ]));
        let lister = RemoteLister::new(transport);

        let items = lister.entries("/sdcard").await.unwrap();
        assert_eq!(items[0].full_path, "/sdcard/DCIM");
    }

    #[tokio::test]
    async fn lister_probes_symlink_directories() {
        let transport = Arc::new(ScriptedTransport::new(&[
            "/\n",
            "\
total 8
lrwxrwxrwx  1 root root 21 2024-03-01 12:00 sdcard -> /storage/self/primary
",
            "dir\n",
        ]));
        let lister = RemoteLister::new(transport);

        let items = lister.entries("/").await.unwrap();
        assert!(items[0].is_symlink);
        assert!(items[0].is_directory);
    }

    #[tokio::test]
    async fn fully_denied_directory_is_an_error() {
        let transport = Arc::new(ScriptedTransport::new(&[
            "/data/secret\n",
            "ls: /data/secret: Permission denied\n",
        ]));
        let lister = RemoteLister::new(transport);

        let result = lister.entries("/data/secret").await;
        assert!(matches!(result, Err(FileOpsError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn per_entry_noise_does_not_fail_the_listing() {
        let transport = Arc::new(ScriptedTransport::new(&[
            "/sdcard\n",
            "\
total 16
drwxrwx--x  2 root sdcard_rw 4096 2024-03-02 08:15 DCIM
ls: /sdcard/Android/obb: Permission denied
-rw-rw----  1 root sdcard_rw 2048 2024-03-05 19:02 notes.txt
",
        ]));
        let lister = RemoteLister::new(transport);

        let items = lister.entries("/sdcard").await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn enumerator_contract_maps_items() {
        let transport = Arc::new(ScriptedTransport::new(&["/sdcard\n", LISTING]));
        let lister = RemoteLister::new(transport);

        let entries = lister.list("/sdcard").await.unwrap();
        assert_eq!(
            entries[0],
            RemoteEntry {
                name: "DCIM".into(),
                is_directory: true,
                size: 4096,
            }
        );
        assert_eq!(entries[1].size, 2048);
    }
}
