//! Backing Service Supervisor
//!
//! Launches the Streamlit process that serves the content window, drains its
//! output into the log, polls its URL until it answers and tears it down on
//! exit. Nothing here returns an error to the caller: a broken service shows
//! up as a `Failed` state and, downstream, as a content-window load failure.

use crate::config::ServiceConfig;
use crate::port_reaper::PortReaper;
use async_trait::async_trait;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

/// How long `stop` waits for the killed process to be reaped.
const STOP_REAP_TIMEOUT: Duration = Duration::from_secs(3);
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Starting,
    Ready,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

impl ServiceStatus {
    fn starting() -> Self {
        Self {
            state: ServiceState::Starting,
            pid: None,
            exit_code: None,
        }
    }
}

/// What to launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let working_dir = config
            .entry_script
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty() && dir.is_dir())
            .map(PathBuf::from);
        Self {
            program: config.interpreter.clone(),
            args: config.args(),
            working_dir,
        }
    }
}

/// A running child process the supervisor owns.
#[async_trait]
pub trait ServiceProcess: Send {
    fn id(&self) -> Option<u32>;
    fn take_stdout(&mut self) -> Option<OutputStream>;
    fn take_stderr(&mut self) -> Option<OutputStream>;
    /// Send the termination signal without waiting.
    fn start_kill(&mut self) -> io::Result<()>;
    /// Wait for exit; `None` when killed by a signal.
    async fn wait(&mut self) -> io::Result<Option<i32>>;
}

#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ServiceProcess>>;
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// True once something accepts HTTP requests at `url`.
    async fn is_ready(&self, url: &str) -> bool;
}

pub struct TokioSpawner;

#[async_trait]
impl ProcessSpawner for TokioSpawner {
    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ServiceProcess>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        Ok(Box::new(command.spawn()?))
    }
}

#[async_trait]
impl ServiceProcess for tokio::process::Child {
    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take().map(|s| Box::pin(s) as OutputStream)
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take().map(|s| Box::pin(s) as OutputStream)
    }

    fn start_kill(&mut self) -> io::Result<()> {
        tokio::process::Child::start_kill(self)
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(tokio::process::Child::wait(self).await?.code())
    }
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn is_ready(&self, url: &str) -> bool {
        // Any status code means the server is accepting connections.
        self.client.get(url).send().await.is_ok()
    }
}

/// Read side of the supervised process, handed to whoever needs the URL or
/// wants to watch the state.
#[derive(Debug, Clone)]
pub struct BackingServiceHandle {
    url: String,
    status: watch::Receiver<ServiceStatus>,
}

impl BackingServiceHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ServiceStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ServiceState {
        self.status.borrow().state
    }

    pub fn pid(&self) -> Option<u32> {
        self.status.borrow().pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.borrow().exit_code
    }
}

pub struct BackingServiceSupervisor {
    config: ServiceConfig,
    reaper: PortReaper,
    spawner: Box<dyn ProcessSpawner>,
    probe: Box<dyn ReadinessProbe>,
    status_tx: Arc<watch::Sender<ServiceStatus>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    stop_requested: AtomicBool,
}

impl BackingServiceSupervisor {
    pub fn new(
        config: ServiceConfig,
        reaper: PortReaper,
        spawner: Box<dyn ProcessSpawner>,
        probe: Box<dyn ReadinessProbe>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ServiceStatus::starting());
        Self {
            config,
            reaper,
            spawner,
            probe,
            status_tx: Arc::new(status_tx),
            kill_tx: Mutex::new(None),
            watcher: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Real processes, real ports, real HTTP.
    pub fn system(config: ServiceConfig) -> Self {
        let reaper = PortReaper::system(config.port_release_timeout);
        Self::new(config, reaper, Box::new(TokioSpawner), Box::new(HttpProbe::new()))
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn handle(&self) -> BackingServiceHandle {
        BackingServiceHandle {
            url: self.config.url(),
            status: self.status_tx.subscribe(),
        }
    }

    pub async fn start(&self) -> BackingServiceHandle {
        if self.stop_requested.load(Ordering::SeqCst) {
            tracing::info!("[supervisor] stop already requested, not launching");
            self.mark_stopped();
            return self.handle();
        }
        self.reaper.reclaim(self.config.port).await;

        let spec = LaunchSpec::from_config(&self.config);
        tracing::info!(
            "[supervisor] launching {} {}",
            spec.program,
            spec.args.join(" ")
        );

        let mut process = match self.spawner.spawn(&spec).await {
            Ok(process) => process,
            Err(e) => {
                tracing::error!("[supervisor] failed to spawn backing service: {}", e);
                self.status_tx.send_modify(|s| s.state = ServiceState::Failed);
                return self.handle();
            }
        };

        let pid = process.id();
        self.status_tx.send_modify(|s| s.pid = pid);
        tracing::info!("[supervisor] backing service started (pid {:?})", pid);

        if let Some(stdout) = process.take_stdout() {
            tokio::spawn(drain_output(stdout, "stdout"));
        }
        if let Some(stderr) = process.take_stderr() {
            tokio::spawn(drain_output(stderr, "stderr"));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_process(process, kill_rx, self.status_tx.clone()));
        if let Ok(mut slot) = self.watcher.lock() {
            *slot = Some(watcher);
        }
        if let Ok(mut slot) = self.kill_tx.lock() {
            *slot = Some(kill_tx);
        }
        // stop() may have run while we were spawning.
        if self.stop_requested.load(Ordering::SeqCst) {
            self.send_kill();
            return self.handle();
        }

        self.wait_until_ready().await;
        self.handle()
    }

    async fn wait_until_ready(&self) {
        let url = self.config.url();
        let deadline = Instant::now() + self.config.ready_timeout;
        let mut status_rx = self.status_tx.subscribe();

        loop {
            if status_rx.borrow_and_update().state != ServiceState::Starting {
                tracing::warn!("[supervisor] backing service exited before becoming ready");
                return;
            }
            if self.probe.is_ready(&url).await {
                let promoted = self.status_tx.send_if_modified(|s| {
                    if s.state == ServiceState::Starting {
                        s.state = ServiceState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if promoted {
                    tracing::info!("[supervisor] backing service ready at {}", url);
                }
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "[supervisor] {} not ready after {:?}, continuing anyway",
                    url,
                    self.config.ready_timeout
                );
                return;
            }
            let pause = self.config.ready_interval.min(deadline - now);
            // Wake early if the process dies while we wait.
            let _ = timeout(pause, status_rx.changed()).await;
        }
    }

    /// Kill the backing service. Safe to call more than once; only the first
    /// call sends the signal.
    pub async fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("[supervisor] stopping backing service");
        self.send_kill();

        let watcher = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(watcher) = watcher {
            if timeout(STOP_REAP_TIMEOUT, watcher).await.is_err() {
                tracing::warn!("[supervisor] backing service did not exit within {:?}", STOP_REAP_TIMEOUT);
            }
        }
        self.mark_stopped();
    }

    fn mark_stopped(&self) {
        self.status_tx.send_if_modified(|s| {
            if s.state == ServiceState::Stopped {
                false
            } else {
                s.state = ServiceState::Stopped;
                true
            }
        });
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn send_kill(&self) {
        let kill_tx = self.kill_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = kill_tx {
            let _ = tx.send(());
        }
    }
}

async fn watch_process(
    mut process: Box<dyn ServiceProcess>,
    kill_rx: oneshot::Receiver<()>,
    status_tx: Arc<watch::Sender<ServiceStatus>>,
) {
    let result = tokio::select! {
        result = process.wait() => result,
        _ = kill_rx => {
            if let Err(e) = process.start_kill() {
                tracing::warn!("[supervisor] kill failed: {}", e);
            }
            process.wait().await
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!("[supervisor] failed to reap backing service: {}", e);
            None
        }
    };
    tracing::info!("[supervisor] backing service exited with code {:?}", exit_code);

    status_tx.send_modify(|s| {
        s.exit_code = exit_code;
        s.state = match s.state {
            ServiceState::Starting | ServiceState::Failed => ServiceState::Failed,
            ServiceState::Ready | ServiceState::Stopped => ServiceState::Stopped,
        };
    });
}

/// Log the child's output line by line until the pipe closes. Lines that are
/// not UTF-8 are logged lossily; the pipe is read to the end either way so
/// the child never blocks on a full buffer. Returns the number of lines read.
async fn drain_output(stream: OutputStream, name: &'static str) -> usize {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut lines = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                lines += 1;
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\r', '\n']);
                match name {
                    "stderr" => tracing::warn!(target: "backing_service", "[{}] {}", name, line),
                    _ => tracing::info!(target: "backing_service", "[{}] {}", name, line),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::debug!(target: "backing_service", "[{}] read error: {}", name, e);
                break;
            }
        }
    }
    lines
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::port_reaper::PortInspector;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    pub struct FreePorts;

    #[async_trait]
    impl PortInspector for FreePorts {
        async fn listeners(&self, _port: u16) -> io::Result<Vec<u32>> {
            Ok(Vec::new())
        }

        async fn kill(&self, _pid: u32) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct Counters {
        pub spawns: AtomicUsize,
        pub kills: AtomicUsize,
        pub reaped: AtomicUsize,
        /// Fires once per reaped process.
        pub reaped_signal: Notify,
        /// Fires when a spawn begins, before any gate is waited on.
        pub spawn_entered: Notify,
    }

    struct FakeProcess {
        counters: Arc<Counters>,
        killed: Arc<Notify>,
        exit_early: Option<i32>,
        stdout: Option<&'static [u8]>,
    }

    #[async_trait]
    impl ServiceProcess for FakeProcess {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }

        fn take_stdout(&mut self) -> Option<OutputStream> {
            self.stdout.take().map(|bytes| Box::pin(bytes) as OutputStream)
        }

        fn take_stderr(&mut self) -> Option<OutputStream> {
            None
        }

        fn start_kill(&mut self) -> io::Result<()> {
            self.counters.kills.fetch_add(1, Ordering::SeqCst);
            self.killed.notify_one();
            Ok(())
        }

        async fn wait(&mut self) -> io::Result<Option<i32>> {
            let code = match self.exit_early {
                Some(code) => Some(code),
                None => {
                    self.killed.notified().await;
                    None
                }
            };
            self.counters.reaped.fetch_add(1, Ordering::SeqCst);
            self.counters.reaped_signal.notify_one();
            Ok(code)
        }
    }

    pub struct FakeSpawner {
        pub counters: Arc<Counters>,
        pub exit_early: Option<i32>,
        pub fail: bool,
        /// Holds the spawn until notified.
        pub gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ProcessSpawner for FakeSpawner {
        async fn spawn(&self, _spec: &LaunchSpec) -> io::Result<Box<dyn ServiceProcess>> {
            self.counters.spawn_entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "python not found"));
            }
            self.counters.spawns.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeProcess {
                counters: self.counters.clone(),
                killed: Arc::new(Notify::new()),
                exit_early: self.exit_early,
                stdout: Some(b"You can now view your Streamlit app\n"),
            }))
        }
    }

    pub struct FakeProbe {
        pub ready_after: Option<usize>,
        pub calls: AtomicUsize,
    }

    impl FakeProbe {
        /// Ready from the `ready_after`th call on; never when `None`.
        pub fn new(ready_after: Option<usize>) -> Self {
            Self {
                ready_after,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReadinessProbe for FakeProbe {
        async fn is_ready(&self, _url: &str) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.ready_after.is_some_and(|after| n >= after)
        }
    }

    pub fn test_config() -> ServiceConfig {
        ServiceConfig {
            ready_timeout: Duration::from_millis(300),
            ready_interval: Duration::from_millis(10),
            port_release_timeout: Duration::from_millis(50),
            ..ServiceConfig::default()
        }
    }

    pub fn supervisor(
        counters: &Arc<Counters>,
        exit_early: Option<i32>,
        fail: bool,
        ready_after: Option<usize>,
    ) -> BackingServiceSupervisor {
        build(counters, exit_early, fail, ready_after, None)
    }

    /// A supervisor whose spawn parks until `gate` is notified.
    pub fn gated_supervisor(counters: &Arc<Counters>, gate: Arc<Notify>) -> BackingServiceSupervisor {
        build(counters, None, false, Some(1), Some(gate))
    }

    fn build(
        counters: &Arc<Counters>,
        exit_early: Option<i32>,
        fail: bool,
        ready_after: Option<usize>,
        gate: Option<Arc<Notify>>,
    ) -> BackingServiceSupervisor {
        let config = test_config();
        let reaper = PortReaper::new(Box::new(FreePorts), config.port_release_timeout);
        BackingServiceSupervisor::new(
            config,
            reaper,
            Box::new(FakeSpawner {
                counters: counters.clone(),
                exit_early,
                fail,
                gate,
            }),
            Box::new(FakeProbe::new(ready_after)),
        )
    }
}
