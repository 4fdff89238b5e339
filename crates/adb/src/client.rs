use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use droidfiles_transfer::ProgressFn;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::AdbError;
use crate::config::AdbConfig;
use crate::devices::{Device, parse_devices};

/// Captured result of one adb invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// Invokes the adb binary, one subprocess per command.
///
/// Holds the currently selected device the way the explorer UI does:
/// device-addressed commands fail with [`AdbError::NoDevice`] until
/// [`set_device`](Self::set_device) is called.
pub struct AdbClient {
    adb_path: PathBuf,
    serial: RwLock<Option<String>>,
    poll_interval: Duration,
}

impl AdbClient {
    pub fn new(config: &AdbConfig) -> Self {
        let adb_path = config.resolve_adb_path();
        debug!(path = %adb_path.display(), "using adb binary");
        Self {
            adb_path,
            serial: RwLock::new(None),
            poll_interval: config.progress_poll(),
        }
    }

    /// Selects the device subsequent commands address.
    pub fn set_device(&self, serial: &str) {
        *self.serial.write().unwrap() = Some(serial.to_string());
    }

    pub fn selected_device(&self) -> Option<String> {
        self.serial.read().unwrap().clone()
    }

    fn require_device(&self) -> Result<String, AdbError> {
        self.selected_device().ok_or(AdbError::NoDevice)
    }

    /// Runs adb with `args` and captures its output.
    pub async fn run(&self, args: &[&str]) -> Result<CommandOutput, AdbError> {
        let output = Command::new(&self.adb_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Runs a shell command on the selected device and returns its stdout.
    ///
    /// Android tools report many errors on stdout, so callers classify the
    /// returned text themselves; stderr is only logged.
    pub async fn shell(&self, command: &str) -> Result<String, AdbError> {
        let serial = self.require_device()?;
        let output = self.run(&["-s", &serial, "shell", command]).await?;
        if !output.stderr.trim().is_empty() {
            debug!(command, stderr = %output.stderr.trim(), "shell stderr");
        }
        Ok(output.stdout)
    }

    /// Lists devices known to the adb server.
    pub async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
        let output = self.run(&["devices", "-l"]).await?;
        Ok(parse_devices(&output.stdout))
    }

    /// Pushes a local file or directory to the device.
    ///
    /// Progress is derived from adb's incremental `[ NN%]` output ticks,
    /// scaled against the local size, and delivered as cumulative bytes.
    /// Cancellation kills the subprocess; the reader task is drained
    /// before returning either way.
    pub async fn push_with_progress(
        &self,
        local: &Path,
        remote: &str,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, AdbError> {
        let serial = self.require_device()?;
        let total = {
            let local = local.to_path_buf();
            tokio::task::spawn_blocking(move || local_total_size(&local))
                .await
                .unwrap_or(0)
        };

        let local_arg = local.to_string_lossy().into_owned();
        let mut child = Command::new(&self.adb_path)
            .args(["-s", &serial, "push", &local_arg, remote])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let reader = tokio::spawn(read_push_progress(stdout, total, Arc::clone(&progress)));

        tokio::select! {
            result = child.wait_with_output() => {
                let output = result?;
                let stdout_text = reader.await.unwrap_or_default();
                Ok(CommandOutput {
                    stdout: stdout_text,
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code().unwrap_or(-1),
                })
            }
            _ = cancel.cancelled() => {
                // Dropping the wait future drops the child; kill_on_drop
                // terminates the subprocess.
                reader.abort();
                let _ = reader.await;
                Err(AdbError::Cancelled)
            }
        }
    }

    /// Pulls a device file or directory to the local filesystem.
    ///
    /// Progress comes from polling the growing destination at the
    /// configured interval from a task scoped to this call; it is stopped
    /// and joined before the method returns.
    pub async fn pull_with_progress(
        &self,
        remote: &str,
        local: &Path,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, AdbError> {
        let serial = self.require_device()?;
        if let Some(parent) = local.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let local_arg = local.to_string_lossy().into_owned();
        let child = Command::new(&self.adb_path)
            .args(["-s", &serial, "pull", remote, &local_arg])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stop = CancellationToken::new();
        let poller = tokio::spawn(poll_local_size(
            local.to_path_buf(),
            self.poll_interval,
            progress,
            stop.clone(),
        ));

        let result = tokio::select! {
            result = child.wait_with_output() => match result {
                Ok(output) => Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code().unwrap_or(-1),
                }),
                Err(e) => Err(AdbError::Io(e)),
            },
            _ = cancel.cancelled() => Err(AdbError::Cancelled),
        };

        stop.cancel();
        let _ = poller.await;
        result
    }
}

/// Reads a push child's stdout, forwarding the latest `[ NN%]` tick as a
/// byte count and collecting the full text for the caller.
async fn read_push_progress(
    stdout: Option<tokio::process::ChildStdout>,
    total: u64,
    progress: ProgressFn,
) -> String {
    let Some(mut stdout) = stdout else {
        return String::new();
    };
    let mut collected = String::new();
    let mut buf = [0u8; 4096];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if total > 0
                    && let Some(pct) = last_progress_percent(&chunk)
                {
                    progress(total.saturating_mul(pct as u64) / 100);
                }
                collected.push_str(&chunk);
            }
        }
    }
    collected
}

/// Most recent percentage in a chunk of adb progress output. Ticks are
/// carriage-return separated: `[ 42%] /sdcard/file`.
fn last_progress_percent(chunk: &str) -> Option<u8> {
    chunk
        .rsplit(['\r', '\n'])
        .find_map(parse_progress_fragment)
}

fn parse_progress_fragment(fragment: &str) -> Option<u8> {
    let rest = fragment.trim_start().strip_prefix('[')?;
    let end = rest.find('%')?;
    rest[..end].trim().parse().ok().filter(|p| *p <= 100)
}

/// Polls a growing local file and forwards its size until stopped, with a
/// final read on shutdown so the last tick is never older than the file.
async fn poll_local_size(
    path: PathBuf,
    interval: Duration,
    progress: ProgressFn,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Ok(meta) = tokio::fs::metadata(&path).await {
                    progress(meta.len());
                }
            }
            _ = stop.cancelled() => {
                if let Ok(meta) = tokio::fs::metadata(&path).await {
                    progress(meta.len());
                }
                return;
            }
        }
    }
}

/// Size of a local file, or of every regular file under a directory.
fn local_total_size(path: &Path) -> u64 {
    let Ok(meta) = std::fs::metadata(path) else {
        return 0;
    };
    if meta.is_file() {
        return meta.len();
    }
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    let mut size = 0u64;
    for entry in entries.flatten() {
        size += local_total_size(&entry.path());
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn percent_parsing() {
        assert_eq!(parse_progress_fragment("[ 42%] /sdcard/file"), Some(42));
        assert_eq!(parse_progress_fragment("[100%] /sdcard/file"), Some(100));
        assert_eq!(parse_progress_fragment("[  5%] x"), Some(5));
        assert_eq!(parse_progress_fragment("no progress here"), None);
        assert_eq!(parse_progress_fragment("[999%] bogus"), None);
    }

    #[test]
    fn last_percent_wins_in_chunk() {
        let chunk = "[ 10%] /sdcard/f\r[ 55%] /sdcard/f\r[ 80%] /sdcard/f";
        assert_eq!(last_progress_percent(chunk), Some(80));
    }

    #[test]
    fn local_total_size_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 10]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b"), vec![0u8; 7]).unwrap();
        assert_eq!(local_total_size(dir.path()), 17);
        assert_eq!(local_total_size(&dir.path().join("a")), 10);
        assert_eq!(local_total_size(Path::new("/no/such/path")), 0);
    }

    #[tokio::test]
    async fn shell_requires_device() {
        let client = AdbClient::new(&AdbConfig::default());
        let result = client.shell("ls /sdcard").await;
        assert!(matches!(result, Err(AdbError::NoDevice)));
    }

    #[tokio::test]
    async fn run_missing_binary_is_io_error() {
        let client = AdbClient::new(&AdbConfig {
            adb_path: Some(PathBuf::from("/definitely/not/adb")),
            ..Default::default()
        });
        assert!(matches!(client.run(&["version"]).await, Err(AdbError::Io(_))));
    }

    // The remaining tests drive the client against a stub adb script.
    #[cfg(unix)]
    mod with_stub {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn stub_client(script_body: &str) -> (tempfile::TempDir, AdbClient) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("adb");
            std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            let client = AdbClient::new(&AdbConfig {
                adb_path: Some(path),
                progress_poll_ms: 20,
                ..Default::default()
            });
            (dir, client)
        }

        fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<u64>>>) {
            let values = Arc::new(Mutex::new(Vec::new()));
            let recorded = Arc::clone(&values);
            let progress: ProgressFn = Arc::new(move |bytes| {
                recorded.lock().unwrap().push(bytes);
            });
            (progress, values)
        }

        #[tokio::test]
        async fn run_captures_streams_and_exit_code() {
            let (_dir, client) = stub_client("echo out; echo err >&2; exit 3");
            let output = client.run(&["version"]).await.unwrap();
            assert_eq!(output.stdout, "out\n");
            assert_eq!(output.stderr, "err\n");
            assert_eq!(output.exit_code, 3);
            assert!(!output.ok());
        }

        #[tokio::test]
        async fn shell_addresses_selected_device() {
            let (_dir, client) = stub_client("echo \"$@\"");
            client.set_device("emulator-5554");
            let stdout = client.shell("ls /sdcard").await.unwrap();
            assert_eq!(stdout.trim(), "-s emulator-5554 shell ls /sdcard");
        }

        #[tokio::test]
        async fn list_devices_parses_server_output() {
            let (_dir, client) = stub_client(concat!(
                "echo 'List of devices attached'\n",
                "echo 'emulator-5554       device product:sdk model:Pixel_6 device:emu64x'\n",
                "echo 'R58M123456          unauthorized'",
            ));
            let devices = client.list_devices().await.unwrap();
            assert_eq!(devices.len(), 2);
            assert_eq!(devices[0].serial, "emulator-5554");
            assert_eq!(devices[0].model.as_deref(), Some("Pixel_6"));
        }

        #[tokio::test]
        async fn pull_polls_destination_size() {
            // Stub writes the destination ($5: -s SERIAL pull REMOTE LOCAL)
            // then lingers so the poller sees the final size.
            let (_dir, client) =
                stub_client("printf '0123456789' > \"$5\"\nsleep 0.3\nexit 0");
            client.set_device("emulator-5554");

            let dest_dir = tempfile::tempdir().unwrap();
            let dest = dest_dir.path().join("pulled.bin");
            let (progress, values) = recording_progress();

            let output = client
                .pull_with_progress("/sdcard/x.bin", &dest, progress, CancellationToken::new())
                .await
                .unwrap();

            assert!(output.ok());
            let values = values.lock().unwrap();
            assert_eq!(values.last(), Some(&10));
        }

        #[tokio::test]
        async fn push_scales_percent_ticks_to_bytes() {
            let (_dir, client) = stub_client(
                "printf '[ 10%%] f\\r'\nsleep 0.15\nprintf '[100%%] f\\n'\nexit 0",
            );
            client.set_device("emulator-5554");

            let src_dir = tempfile::tempdir().unwrap();
            let src = src_dir.path().join("clip.bin");
            std::fs::write(&src, vec![0u8; 1000]).unwrap();
            let (progress, values) = recording_progress();

            let output = client
                .push_with_progress(&src, "/sdcard/clip.bin", progress, CancellationToken::new())
                .await
                .unwrap();

            assert!(output.ok());
            let values = values.lock().unwrap();
            assert!(values.contains(&100));
            assert_eq!(values.last(), Some(&1000));
        }

        #[tokio::test]
        async fn cancellation_kills_a_hung_transfer() {
            let (_dir, client) = stub_client("sleep 10");
            client.set_device("emulator-5554");

            let dest_dir = tempfile::tempdir().unwrap();
            let dest = dest_dir.path().join("never.bin");
            let (progress, _values) = recording_progress();
            let cancel = CancellationToken::new();

            let started = std::time::Instant::now();
            let pull = client.pull_with_progress("/sdcard/huge.bin", &dest, progress, cancel.clone());
            tokio::pin!(pull);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(100)) => cancel.cancel(),
                _ = &mut pull => panic!("pull finished before cancellation"),
            }
            let result = pull.await;
            assert!(matches!(result, Err(AdbError::Cancelled)));
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
