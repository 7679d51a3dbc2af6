//! Port Reaper - frees the backing service's TCP port before a fresh launch.
//!
//! One discovery + kill pass, then a bounded wait for the OS to release the
//! socket. Never fails: anything that goes wrong is logged and the caller
//! carries on (a later bind failure belongs to the supervisor).

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{sleep, Instant};

const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Platform view of who is listening on a port.
#[async_trait]
pub trait PortInspector: Send + Sync {
    /// PIDs holding `port` in a listening state.
    async fn listeners(&self, port: u16) -> io::Result<Vec<u32>>;
    /// Forcefully terminate `pid`.
    async fn kill(&self, pid: u32) -> io::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub discovered: Vec<u32>,
    pub killed: Vec<u32>,
    pub released: bool,
}

pub struct PortReaper {
    inspector: Box<dyn PortInspector>,
    release_timeout: Duration,
}

impl PortReaper {
    pub fn new(inspector: Box<dyn PortInspector>, release_timeout: Duration) -> Self {
        Self {
            inspector,
            release_timeout,
        }
    }

    pub fn system(release_timeout: Duration) -> Self {
        Self::new(Box::new(SystemPortInspector), release_timeout)
    }

    pub async fn reclaim(&self, port: u16) -> ReclaimOutcome {
        let discovered = match self.inspector.listeners(port).await {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!("[port_reaper] could not inspect port {}: {}", port, e);
                return ReclaimOutcome::default();
            }
        };

        if discovered.is_empty() {
            tracing::debug!("[port_reaper] port {} is free", port);
            return ReclaimOutcome {
                released: true,
                ..ReclaimOutcome::default()
            };
        }

        let mut killed = Vec::with_capacity(discovered.len());
        for &pid in &discovered {
            match self.inspector.kill(pid).await {
                Ok(()) => {
                    tracing::info!("[port_reaper] killed pid {} holding port {}", pid, port);
                    killed.push(pid);
                }
                // Usually the process exited between discovery and kill.
                Err(e) => tracing::warn!("[port_reaper] failed to kill pid {}: {}", pid, e),
            }
        }

        let released = self.wait_for_release(port).await;
        if !released {
            tracing::warn!(
                "[port_reaper] port {} still held after {:?}, continuing anyway",
                port,
                self.release_timeout
            );
        }

        ReclaimOutcome {
            discovered,
            killed,
            released,
        }
    }

    async fn wait_for_release(&self, port: u16) -> bool {
        let deadline = Instant::now() + self.release_timeout;
        loop {
            match self.inspector.listeners(port).await {
                Ok(pids) if pids.is_empty() => return true,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("[port_reaper] release check failed: {}", e);
                    return false;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(RELEASE_POLL_INTERVAL).await;
        }
    }
}

/// `lsof` / `kill` on Unix, `netstat` / `taskkill` on Windows.
pub struct SystemPortInspector;

#[async_trait]
impl PortInspector for SystemPortInspector {
    #[cfg(unix)]
    async fn listeners(&self, port: u16) -> io::Result<Vec<u32>> {
        let output = Command::new("lsof")
            .arg("-nP")
            .arg(format!("-iTCP:{port}"))
            .arg("-sTCP:LISTEN")
            .arg("-t")
            .output()
            .await?;
        // lsof exits 1 when nothing matches; stdout is empty then.
        Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)))
    }

    #[cfg(windows)]
    async fn listeners(&self, port: u16) -> io::Result<Vec<u32>> {
        let output = Command::new("netstat")
            .args(["-ano", "-p", "TCP"])
            .output()
            .await?;
        Ok(parse_netstat_listeners(
            &String::from_utf8_lossy(&output.stdout),
            port,
        ))
    }

    #[cfg(unix)]
    async fn kill(&self, pid: u32) -> io::Result<()> {
        let status = Command::new("kill")
            .arg("-9")
            .arg(pid.to_string())
            .status()
            .await?;
        exit_to_result(status, pid)
    }

    #[cfg(windows)]
    async fn kill(&self, pid: u32) -> io::Result<()> {
        let status = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .status()
            .await?;
        exit_to_result(status, pid)
    }
}

fn exit_to_result(status: std::process::ExitStatus, pid: u32) -> io::Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("kill of pid {pid} exited with {status}"),
        ))
    }
}

/// One PID per line, as printed by `lsof -t`.
pub fn parse_lsof_pids(stdout: &str) -> Vec<u32> {
    let mut pids = Vec::new();
    for pid in stdout.lines().filter_map(|l| l.trim().parse::<u32>().ok()) {
        if !pids.contains(&pid) {
            pids.push(pid);
        }
    }
    pids
}

/// Rows of `netstat -ano` in the LISTENING state whose local address is on
/// `port`. Covers both `0.0.0.0:8501` and `[::]:8501` forms.
pub fn parse_netstat_listeners(stdout: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");
    let mut pids = Vec::new();
    for line in stdout.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let [proto, local, _remote, state, pid] = cols.as_slice() else {
            continue;
        };
        if !proto.eq_ignore_ascii_case("TCP") || *state != "LISTENING" || !local.ends_with(&suffix) {
            continue;
        }
        // PID 0 is the idle process on Windows; never a real owner.
        if let Ok(pid) = pid.parse::<u32>() {
            if pid != 0 && !pids.contains(&pid) {
                pids.push(pid);
            }
        }
    }
    pids
}
