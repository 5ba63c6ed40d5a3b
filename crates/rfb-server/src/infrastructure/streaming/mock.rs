//! Test doubles for the streaming boundaries.
//!
//! [`MockLauncher`] records every launch and hands out fake processes whose
//! state tests can inspect and drive through [`LaunchedProcess`].
//! [`StaticResolver`] resolves from a fixed table plus IP literals.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::streaming::{
    AddressResolver, LaunchError, ProcessHandle, ProcessLauncher, ResolutionError,
};

const FIRST_FAKE_PID: u32 = 40_000;

/// Test-side view of one fake process.
#[derive(Debug, Clone)]
pub struct LaunchedProcess {
    inner: Arc<FakeProcessState>,
}

#[derive(Debug)]
struct FakeProcessState {
    pid: u32,
    command_line: String,
    log_output: bool,
    alive: AtomicBool,
    terminations: AtomicU32,
}

impl LaunchedProcess {
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn command_line(&self) -> &str {
        &self.inner.command_line
    }

    /// Whether the launch asked for the child's output to be kept.
    pub fn logs_output(&self) -> bool {
        self.inner.log_output
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Simulates the process exiting on its own.
    pub fn exit(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
    }

    /// Number of times `terminate()` killed this process.
    pub fn termination_count(&self) -> u32 {
        self.inner.terminations.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    state: Arc<FakeProcessState>,
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> u32 {
        self.state.pid
    }

    fn is_alive(&mut self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.state.alive.swap(false, Ordering::SeqCst) {
            self.state.terminations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A [`ProcessLauncher`] that never touches the OS.
pub struct MockLauncher {
    launched: Mutex<Vec<LaunchedProcess>>,
    next_pid: AtomicU32,
    fail: AtomicBool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(FIRST_FAKE_PID),
            fail: AtomicBool::new(false),
        }
    }

    /// While `true`, every launch fails with a spawn error.
    pub fn fail_next_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Handles for every successful launch, oldest first.
    pub fn launched(&self) -> Vec<LaunchedProcess> {
        self.launched.lock().clone()
    }

    /// Number of launched processes still alive.
    pub fn alive_count(&self) -> usize {
        self.launched.lock().iter().filter(|p| p.is_alive()).count()
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(
        &self,
        command_line: &str,
        log_output: bool,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        if command_line.trim().is_empty() {
            return Err(LaunchError::EmptyCommandLine);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(LaunchError::Spawn {
                program: command_line
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock launch failure"),
            });
        }

        let state = Arc::new(FakeProcessState {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            command_line: command_line.to_string(),
            log_output,
            alive: AtomicBool::new(true),
            terminations: AtomicU32::new(0),
        });
        self.launched.lock().push(LaunchedProcess {
            inner: Arc::clone(&state),
        });
        Ok(Box::new(FakeProcess { state }))
    }
}

/// Resolves names from a fixed table.  IP literals always resolve.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, ip: IpAddr) -> Self {
        self.hosts.insert(host.to_string(), ip);
        self
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolutionError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        self.hosts
            .get(host)
            .copied()
            .ok_or_else(|| ResolutionError::NoAddress(host.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_launcher_records_launches() {
        // Arrange
        let launcher = MockLauncher::new();

        // Act
        let mut first = launcher.launch("ffmpeg -i a", false).unwrap();
        let second = launcher.launch("ffmpeg -i b", true).unwrap();

        // Assert
        assert_ne!(first.id(), second.id());
        assert!(first.is_alive());
        let launches = launcher.launched();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[1].command_line(), "ffmpeg -i b");
        assert!(!launches[0].logs_output());
        assert!(launches[1].logs_output());
    }

    #[test]
    fn test_terminate_counts_only_live_kills() {
        let launcher = MockLauncher::new();
        let mut process = launcher.launch("ffmpeg", false).unwrap();

        process.terminate().unwrap();
        process.terminate().unwrap();

        assert!(!process.is_alive());
        assert_eq!(launcher.launched()[0].termination_count(), 1);
        assert_eq!(launcher.alive_count(), 0);
    }

    #[test]
    fn test_failure_toggle() {
        let launcher = MockLauncher::new();
        launcher.fail_next_launches(true);
        assert!(launcher.launch("ffmpeg", false).is_err());

        launcher.fail_next_launches(false);
        assert!(launcher.launch("ffmpeg", false).is_ok());
        assert_eq!(launcher.launched().len(), 1);
    }

    #[test]
    fn test_static_resolver() {
        let ip: IpAddr = "10.1.1.1".parse().unwrap();
        let resolver = StaticResolver::new().with_host("desk", ip);

        assert_eq!(resolver.resolve("desk").unwrap(), ip);
        assert_eq!(
            resolver.resolve("10.9.9.9").unwrap(),
            "10.9.9.9".parse::<IpAddr>().unwrap()
        );
        assert!(resolver.resolve("unknown").is_err());
    }
}
