//! Encoder command-line construction.
//!
//! The streamer is ffmpeg reading the desktop through the platform screen
//! grabber and writing MPEG-TS to the client:
//!
//! ```text
//! ffmpeg -f gdigrab -framerate 25 -i desktop -f mpegts udp://10.0.0.5:5920
//! ```
//!
//! With SRTP selected the output becomes
//! `-f rtp_mpegts -srtp_out_suite AES_CM_128_HMAC_SHA1_80 -srtp_out_params "<key>" srtp://ip:port`.
//!
//! Every value taken from the configuration (window title, display name,
//! SRTP key) is wrapped in double quotes with `\` and `"` backslash-escaped,
//! which is the form `infrastructure::streaming::split_command_line` undoes.

use std::net::SocketAddr;

use rfb_core::config::{CaptureMode, StreamingSettings};
use tracing::warn;

/// Fixed encoder program name.
pub const STREAMER_PROGRAM: &str = "ffmpeg";

const SRTP_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";
const DEFAULT_X11_DISPLAY: &str = ":0.0";

/// ffmpeg input device used to grab the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    /// Windows GDI grabber.
    GdiGrab,
    /// X11 grabber.
    X11Grab,
}

impl CaptureBackend {
    /// The grabber for the platform this binary was built for.
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            Self::GdiGrab
        } else {
            Self::X11Grab
        }
    }

    fn format_name(self) -> &'static str {
        match self {
            Self::GdiGrab => "gdigrab",
            Self::X11Grab => "x11grab",
        }
    }
}

/// Builds the full encoder command line for one destination.
pub fn build_command_line(
    settings: &StreamingSettings,
    destination: SocketAddr,
    backend: CaptureBackend,
) -> String {
    let mut args: Vec<String> = vec![
        STREAMER_PROGRAM.to_string(),
        "-f".to_string(),
        backend.format_name().to_string(),
        "-framerate".to_string(),
        settings.framerate.to_string(),
    ];

    args.extend(capture_args(settings, backend));

    if settings.use_udp {
        args.extend(["-f".to_string(), "mpegts".to_string()]);
        args.push(format!("udp://{destination}"));
    } else {
        args.extend([
            "-f".to_string(),
            "rtp_mpegts".to_string(),
            "-srtp_out_suite".to_string(),
            SRTP_SUITE.to_string(),
            "-srtp_out_params".to_string(),
            quote(&settings.encryption_key),
        ]);
        args.push(format!("srtp://{destination}"));
    }

    args.join(" ")
}

fn capture_args(settings: &StreamingSettings, backend: CaptureBackend) -> Vec<String> {
    let area = settings.captured_area;
    match (backend, settings.capture_mode) {
        (CaptureBackend::GdiGrab, CaptureMode::Display) => {
            vec!["-i".to_string(), "desktop".to_string()]
        }
        (CaptureBackend::GdiGrab, CaptureMode::Area) => vec![
            "-offset_x".to_string(),
            area.x.to_string(),
            "-offset_y".to_string(),
            area.y.to_string(),
            "-video_size".to_string(),
            format!("{}x{}", area.width, area.height),
            "-i".to_string(),
            "desktop".to_string(),
        ],
        (CaptureBackend::GdiGrab, CaptureMode::Window) => vec![
            "-i".to_string(),
            quote(&format!("title={}", settings.captured_window_title)),
        ],
        (CaptureBackend::X11Grab, CaptureMode::Area) => vec![
            "-video_size".to_string(),
            format!("{}x{}", area.width, area.height),
            "-i".to_string(),
            quote(&format!("{}+{},{}", x11_display(settings), area.x, area.y)),
        ],
        (CaptureBackend::X11Grab, mode) => {
            if mode == CaptureMode::Window {
                warn!("x11grab cannot capture a window by title; capturing the whole display");
            }
            vec!["-i".to_string(), quote(&x11_display(settings))]
        }
    }
}

fn x11_display(settings: &StreamingSettings) -> String {
    if settings.captured_display_device_name.is_empty() {
        DEFAULT_X11_DISPLAY.to_string()
    } else {
        settings.captured_display_device_name.clone()
    }
}

/// Wraps `value` in double quotes, escaping `\` and `"` with a backslash.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
