use super::output::{LineClass, OutputFilter};
use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{
    fs::OpenOptions,
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::Command,
    sync::{mpsc, oneshot, watch},
};
use tracing::{debug, error, info, warn};

/// Everything needed to start the engine.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub binary: PathBuf,
    pub config_dir: PathBuf,
    pub config_file: String,
    pub log_path: PathBuf,
    pub total_providers: u64,
    pub progress_every: u64,
    pub progress_interval: Duration,
}

/// How the engine process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub description: String,
}

impl ExitInfo {
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        Self { code: status.code(), description: status.to_string() }
    }
}

/// Handle on a launched engine.
///
/// Created with [`EngineHandle::channel`]; the launcher keeps the [`ProcessControl`] half
/// and reports the exit through it.
pub struct EngineHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

/// Launcher-side half of an [`EngineHandle`].
pub struct ProcessControl {
    pub kill_rx: oneshot::Receiver<()>,
    pub exit_tx: watch::Sender<Option<ExitInfo>>,
}

impl EngineHandle {
    #[must_use]
    pub fn channel(pid: Option<u32>) -> (Self, ProcessControl) {
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        (Self { pid, kill_tx: Some(kill_tx), exit_rx }, ProcessControl { kill_rx, exit_tx })
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit_rx.borrow().clone()
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// A receiver that resolves when the process exits.
    #[must_use]
    pub fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_rx.clone()
    }

    /// Requests termination and waits up to `grace` for the exit.
    pub async fn kill(&mut self, grace: Duration) -> Option<ExitInfo> {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }

        let mut exit_rx = self.exit_rx.clone();
        let exit = match tokio::time::timeout(grace, exit_rx.wait_for(Option::is_some)).await {
            Ok(Ok(info)) => info.clone(),
            Ok(Err(_)) | Err(_) => None,
        };
        exit
    }
}

/// Starts the engine process.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Resolves the engine binary, or `None` when it cannot be found.
    fn resolve_binary(&self, binary: &Path) -> Option<PathBuf> {
        resolve_binary(binary)
    }

    async fn launch(&self, spec: &LaunchSpec) -> io::Result<EngineHandle>;
}

/// Looks `binary` up on `PATH` unless it already contains a directory component.
#[must_use]
pub fn resolve_binary(binary: &Path) -> Option<PathBuf> {
    if binary.components().count() > 1 {
        return binary.is_file().then(|| binary.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).map(|dir| dir.join(binary)).find(|candidate| candidate.is_file())
    })
}

/// Spawns the real engine binary with `tokio::process`.
#[derive(Debug, Default)]
pub struct CommandLauncher;

#[async_trait]
impl EngineLauncher for CommandLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> io::Result<EngineHandle> {
        if let Some(parent) = spec.log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let log_file = OpenOptions::new().create(true).append(true).open(&spec.log_path).await?;

        let mut child = Command::new(&spec.binary)
            .arg("-d")
            .arg(&spec.config_dir)
            .arg("-f")
            .arg(spec.config_dir.join(&spec.config_file))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        info!(pid, binary = %spec.binary.display(), "engine process spawned");

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, line_tx));
        }

        let filter = OutputFilter::new(spec.total_providers, spec.progress_every, spec.progress_interval);
        tokio::spawn(write_output(line_rx, log_file, filter));

        let (handle, control) = EngineHandle::channel(pid);
        tokio::spawn(async move {
            let ProcessControl { kill_rx, exit_tx } = control;
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "failed to signal engine process");
                    }
                    child.wait().await
                }
            };

            let info = match status {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => ExitInfo { code: None, description: format!("wait failed: {e}") },
            };
            debug!(code = ?info.code, "engine process exited");
            let _ = exit_tx.send(Some(info));
        });

        Ok(handle)
    }
}

async fn pump_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "engine output stream failed");
                break;
            }
        }
    }
}

async fn write_output(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut log_file: tokio::fs::File,
    mut filter: OutputFilter,
) {
    let mut file_ok = true;
    while let Some(line) = rx.recv().await {
        if file_ok {
            let write = async {
                log_file.write_all(line.as_bytes()).await?;
                log_file.write_all(b"\n").await
            };
            if let Err(e) = write.await {
                error!(error = %e, "engine log file write failed; continuing without it");
                file_ok = false;
            }
        }

        let (class, progress) = filter.observe(&line);
        match class {
            LineClass::Error => error!(target: "engine", "{line}"),
            LineClass::Warning => warn!(target: "engine", "{line}"),
            LineClass::Milestone => info!(target: "engine", "{line}"),
            LineClass::ProviderInitialized | LineClass::Noise | LineClass::Other => {
                debug!(target: "engine", "{line}");
            }
        }
        if let Some(progress) = progress {
            info!(
                initialized = progress.initialized,
                total = progress.total,
                "{} of {} providers initialized",
                progress.initialized,
                progress.total
            );
        }
    }
    let _ = log_file.flush().await;
}
