//! OS adapters for the streaming boundaries.
//!
//! - [`SystemLauncher`] spawns the encoder with [`std::process::Command`].
//! - [`SystemResolver`] resolves host names through the platform resolver.
//!
//! Test doubles live in [`mock`].

use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::application::streaming::{
    AddressResolver, LaunchError, ProcessHandle, ProcessLauncher, ResolutionError,
};

pub mod mock;

// ── Process launching ─────────────────────────────────────────────────────────

/// Spawns streaming processes as OS children.
///
/// Children are killed when their handle is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(
        &self,
        command_line: &str,
        log_output: bool,
    ) -> Result<Box<dyn ProcessHandle>, LaunchError> {
        let mut args = split_command_line(command_line)?;
        if args.is_empty() {
            return Err(LaunchError::EmptyCommandLine);
        }
        let program = args.remove(0);

        let (stdout, stderr) = if log_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: program.clone(),
                source,
            })?;

        info!(pid = child.id(), "spawned {program}");
        Ok(Box::new(SystemProcess { child, exited: false }))
    }
}

/// Owned [`Child`] wrapper.
struct SystemProcess {
    child: Child,
    exited: bool,
}

impl ProcessHandle for SystemProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = self.child.id(), "streaming process exited with {status}");
                self.exited = true;
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        self.child.kill()?;
        // Reap so the child does not linger as a zombie.
        self.child.wait()?;
        self.exited = true;
        Ok(())
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(pid = self.child.id(), "failed to kill streaming process on drop: {e}");
        }
    }
}

/// Splits a command line on whitespace, keeping double-quoted runs together.
///
/// Quotes are removed from the resulting arguments.  Inside quotes `\"` and
/// `\\` stand for a literal `"` and `\`; any other backslash is kept as is.
pub fn split_command_line(command_line: &str) -> Result<Vec<String>, LaunchError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    let mut chars = command_line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes && matches!(chars.peek(), Some('"' | '\\')) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err(LaunchError::UnbalancedQuote);
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

// ── Address resolution ────────────────────────────────────────────────────────

/// Resolves through the OS resolver, preferring IPv4 results.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl AddressResolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, ResolutionError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs: Vec<IpAddr> = (host, 0)
            .to_socket_addrs()
            .map_err(|source| ResolutionError::Lookup {
                host: host.to_string(),
                source,
            })?
            .map(|a| a.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ResolutionError::NoAddress(host.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use rfb_core::config::{CaptureMode, StreamingSettings};

    use crate::application::streaming::command::{build_command_line, CaptureBackend};

    // ── Splitting ────────────────────────────────────────────────────────────

    #[test]
    fn test_split_plain_arguments() {
        let args = split_command_line("ffmpeg -f gdigrab  -i desktop").unwrap();
        assert_eq!(args, ["ffmpeg", "-f", "gdigrab", "-i", "desktop"]);
    }

    #[test]
    fn test_split_keeps_quoted_argument_together() {
        let args = split_command_line("ffmpeg -i \"title=My Window\" out").unwrap();
        assert_eq!(args, ["ffmpeg", "-i", "title=My Window", "out"]);
    }

    #[test]
    fn test_split_keeps_empty_quoted_argument() {
        let args = split_command_line("a \"\" b").unwrap();
        assert_eq!(args, ["a", "", "b"]);
    }

    #[test]
    fn test_split_rejects_unbalanced_quote() {
        assert!(matches!(
            split_command_line("ffmpeg -i \"oops"),
            Err(LaunchError::UnbalancedQuote)
        ));
    }

    #[test]
    fn test_split_unescapes_quotes_and_backslashes_inside_quotes() {
        let args = split_command_line(r#"a "x\"y\\z" c\d"#).unwrap();
        assert_eq!(args, ["a", r#"x"y\z"#, r"c\d"]);
    }

    // ── Command line round trip ──────────────────────────────────────────────

    fn window_capture_args(title: &str) -> Vec<String> {
        let settings = StreamingSettings {
            capture_mode: CaptureMode::Window,
            captured_window_title: title.to_string(),
            ..StreamingSettings::default()
        };
        let destination: SocketAddr = "10.0.0.5:5920".parse().unwrap();
        let line = build_command_line(&settings, destination, CaptureBackend::GdiGrab);
        split_command_line(&line).unwrap()
    }

    #[test]
    fn test_title_with_single_embedded_quote_survives_split() {
        // Arrange / Act
        let args = window_capture_args(r#"Report"v2"#);

        // Assert
        assert_eq!(
            args,
            [
                "ffmpeg", "-f", "gdigrab", "-framerate", "25", "-i",
                r#"title=Report"v2"#, "-f", "mpegts", "udp://10.0.0.5:5920",
            ]
        );
    }

    #[test]
    fn test_title_with_quoted_words_survives_split() {
        let args = window_capture_args(r#"My "Doc""#);
        assert_eq!(args[6], r#"title=My "Doc""#);
        assert_eq!(args.len(), 10);
    }

    #[test]
    fn test_x11_display_name_with_backslashes_survives_split() {
        // Arrange
        let settings = StreamingSettings {
            captured_display_device_name: r"\\.\DISPLAY2".to_string(),
            ..StreamingSettings::default()
        };
        let destination: SocketAddr = "10.0.0.5:5920".parse().unwrap();

        // Act
        let line = build_command_line(&settings, destination, CaptureBackend::X11Grab);
        let args = split_command_line(&line).unwrap();

        // Assert
        assert_eq!(args[6], r"\\.\DISPLAY2");
    }

    // ── Launching ────────────────────────────────────────────────────────────

    #[test]
    fn test_launch_empty_command_line_fails() {
        let result = SystemLauncher::new().launch("   ", false);
        assert!(matches!(result, Err(LaunchError::EmptyCommandLine)));
    }

    #[test]
    fn test_launch_missing_program_reports_spawn_error() {
        let result = SystemLauncher::new().launch("rfb-server-no-such-program-xyz --help", false);
        match result {
            Err(LaunchError::Spawn { program, .. }) => {
                assert_eq!(program, "rfb-server-no-such-program-xyz")
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("spawning a missing program must fail"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dropping_handle_kills_child() {
        // Arrange
        let mut handle = SystemLauncher::new().launch("sleep 30", false).unwrap();
        assert!(handle.is_alive());
        let proc_dir = std::path::PathBuf::from(format!("/proc/{}", handle.id()));
        assert!(proc_dir.exists());

        // Act
        drop(handle);

        // Assert: killed and reaped, so no zombie entry remains
        assert!(!proc_dir.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_terminate_then_drop_is_harmless() {
        let mut handle = SystemLauncher::new().launch("sleep 30", true).unwrap();

        handle.terminate().unwrap();
        assert!(!handle.is_alive());

        drop(handle);
    }

    // ── Address resolution ───────────────────────────────────────────────────

    #[test]
    fn test_resolver_accepts_ip_literals() {
        let resolver = SystemResolver;
        assert_eq!(
            resolver.resolve("192.168.0.10").unwrap(),
            "192.168.0.10".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolver.resolve("::1").unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_resolver_resolves_localhost() {
        let ip = SystemResolver.resolve("localhost").unwrap();
        assert!(ip.is_loopback());
    }
}
