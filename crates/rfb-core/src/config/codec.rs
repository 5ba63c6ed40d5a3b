//! Versioned binary snapshot format for [`ConfigState`].
//!
//! Snapshot layout:
//! ```text
//! [magic:4 = "RFBC"][version:1][reserved:3][payload_len:4][payload:N]
//! ```
//! Header size is 12 bytes.  All multi-byte integers are big-endian.
//!
//! # Payload primitives
//!
//! | Primitive | Encoding |
//! |-----------|----------|
//! | `bool`    | 1 byte, `0x00` or `0x01` (anything else is malformed) |
//! | `u8/u16/u32/i32` | fixed width, big-endian |
//! | `string`  | `u32` byte length + UTF-8 bytes |
//! | `list<T>` | `u32` element count + elements |
//!
//! # Version 1 field order
//!
//! 1. rfb_port u16, http_port u16, rfb_ssl bool
//! 2. file_transfers bool, removing_wallpaper bool, mirror_allowed bool, disconnect_action u8
//! 3. accepting_rfb bool, accepting_http bool
//! 4. credentials × 3 (primary, read-only, control): is_set bool + secret `[u8; 8]`
//! 5. using_authentication bool, only_loopback bool, applet_param_in_url bool,
//!    log_level u8, control_auth bool, control_auth_always_checking bool
//! 6. always_shared bool, never_shared bool, disconnecting_existing bool
//! 7. polling_interval u32
//! 8. blocking_remote_input bool, local_input_priority bool,
//!    local_input_priority_timeout u32, blocking_local_input bool
//! 9. query_timeout u32, default_action_accept bool
//! 10. port_mappings list<(port u16, rect 4×i32)>
//! 11. access_control list<(first_ip u32, last_ip u32, action u8)>, loopback_allowed bool
//! 12. video_class_names list<string>, video_rects list<4×i32>, video_recognition_interval u32
//! 13. idle_timeout u32, save_log_to_all_users bool, grab_transparent bool,
//!     tray_icon_shown bool, log_file_dir string
//! 14. bonjour: enabled bool, name string, port u16, type string, use_os_user bool
//! 15. streaming: enabled bool, udp_port u16, srtp_port u16, encryption_key string,
//!     use_udp bool, framerate u16, start_delay_ms u16, rfb_video_off bool,
//!     window_hidden bool, display_device string, area 4×i32, window_title string,
//!     capture_mode u8, log_process_output bool
//!
//! Any change to this order must bump [`SNAPSHOT_VERSION`].

use std::io::{ErrorKind, Read, Write};
use std::net::Ipv4Addr;

use thiserror::Error;

use super::containers::{IpAccessAction, IpAccessRule, PortMapping, Rect};
use super::credential::{CredentialKind, PASSWORD_SIZE};
use super::state::{
    BonjourSettings, CaptureMode, CapturedArea, ConfigState, DisconnectAction, StreamingSettings,
};

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RFBC";
/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;
/// Size of the fixed snapshot header in bytes.
pub const SNAPSHOT_HEADER_SIZE: usize = 12;
/// Upper bound on the payload length accepted from a stream.
pub const MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;

/// Errors raised while writing or reading a configuration snapshot.
#[derive(Debug, Error)]
pub enum ConfigIoError {
    /// The underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before the declared snapshot length.
    #[error("snapshot stream ended early")]
    Truncated,

    /// The stream does not start with [`SNAPSHOT_MAGIC`].
    #[error("not a configuration snapshot")]
    BadMagic,

    /// The header carries a version this build cannot read.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u8),

    /// The header declares a payload larger than [`MAX_PAYLOAD_SIZE`].
    #[error("snapshot payload of {0} bytes exceeds the size limit")]
    PayloadTooLarge(usize),

    /// A field ran past the end of the payload.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A field value is out of range (bad enum, bad bool, invalid UTF-8, ...).
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// The payload was fully decoded but bytes were left over.
    #[error("{0} unexpected bytes after the last field")]
    TrailingBytes(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Writes `state` as a complete snapshot (header + payload) to `output`.
///
/// # Errors
///
/// Returns [`ConfigIoError::Io`] if writing fails.
pub fn write_snapshot<W: Write>(state: &ConfigState, output: &mut W) -> Result<(), ConfigIoError> {
    let payload = encode_state(state);
    let mut header = [0u8; SNAPSHOT_HEADER_SIZE];
    header[..4].copy_from_slice(&SNAPSHOT_MAGIC);
    header[4] = SNAPSHOT_VERSION;
    // header[5..8] reserved
    header[8..12].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    output.write_all(&header)?;
    output.write_all(&payload)?;
    output.flush()?;
    Ok(())
}

/// Reads one complete snapshot from `input` into a fresh [`ConfigState`].
///
/// Nothing outside the returned value is touched, so a failure leaves every
/// existing configuration as it was.
///
/// # Errors
///
/// Returns a [`ConfigIoError`] describing the first problem found.
pub fn read_snapshot<R: Read>(input: &mut R) -> Result<ConfigState, ConfigIoError> {
    let mut header = [0u8; SNAPSHOT_HEADER_SIZE];
    read_exact_or_truncated(input, &mut header)?;

    if header[..4] != SNAPSHOT_MAGIC {
        return Err(ConfigIoError::BadMagic);
    }
    if header[4] != SNAPSHOT_VERSION {
        return Err(ConfigIoError::UnsupportedVersion(header[4]));
    }

    let payload_len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ConfigIoError::PayloadTooLarge(payload_len));
    }

    let mut payload = vec![0u8; payload_len];
    read_exact_or_truncated(input, &mut payload)?;
    decode_state(&payload)
}

fn read_exact_or_truncated<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<(), ConfigIoError> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ConfigIoError::Truncated
        } else {
            ConfigIoError::Io(e)
        }
    })
}

// ── Payload encoding ──────────────────────────────────────────────────────────

/// Encodes the snapshot payload (no header).
pub fn encode_state(state: &ConfigState) -> Vec<u8> {
    let mut enc = Encoder::default();

    enc.u16(state.rfb_port());
    enc.u16(state.http_port());
    enc.bool(state.is_rfb_ssl_enabled());

    enc.bool(state.is_file_transfers_enabled());
    enc.bool(state.is_removing_wallpaper_enabled());
    enc.bool(state.is_mirror_allowed());
    enc.u8(state.disconnect_action() as u8);

    enc.bool(state.is_accepting_rfb_connections());
    enc.bool(state.is_accepting_http_connections());

    for kind in CredentialKind::ALL {
        let credential = state.credentials().get(kind);
        enc.bool(credential.is_set());
        enc.bytes(&credential.secret());
    }

    enc.bool(state.is_using_authentication());
    enc.bool(state.is_only_loopback_connections());
    enc.bool(state.is_applet_param_in_url_enabled());
    enc.u8(state.log_level());
    enc.bool(state.is_control_auth_enabled());
    enc.bool(state.is_control_auth_always_checking());

    enc.bool(state.is_always_shared());
    enc.bool(state.is_never_shared());
    enc.bool(state.is_disconnecting_existing_clients());

    enc.u32(state.polling_interval());

    enc.bool(state.is_blocking_remote_input());
    enc.bool(state.is_local_input_priority_enabled());
    enc.u32(state.local_input_priority_timeout());
    enc.bool(state.is_blocking_local_input());

    enc.u32(state.query_timeout());
    enc.bool(state.is_default_action_accept());

    let mappings = state.port_mappings().mappings();
    enc.len(mappings.len());
    for mapping in mappings {
        enc.u16(mapping.port);
        enc.rect(&mapping.rect);
    }

    let rules = state.access_control().rules();
    enc.len(rules.len());
    for rule in rules {
        enc.u32(u32::from(rule.first_ip));
        enc.u32(u32::from(rule.last_ip));
        enc.u8(rule.action as u8);
    }
    enc.bool(state.is_loopback_connections_allowed());

    let class_names = state.video_class_names();
    enc.len(class_names.len());
    for name in class_names {
        enc.string(name);
    }
    let rects = state.video_rects();
    enc.len(rects.len());
    for rect in rects {
        enc.rect(rect);
    }
    enc.u32(state.video_recognition_interval());

    enc.u32(state.idle_timeout());
    enc.bool(state.is_saving_log_to_all_users_path());
    enc.bool(state.is_grabbing_transparent_windows());
    enc.bool(state.is_tray_icon_shown());
    enc.string(state.log_file_dir());

    let bonjour = state.bonjour();
    enc.bool(bonjour.enabled);
    enc.string(&bonjour.service_name);
    enc.u16(bonjour.port);
    enc.string(&bonjour.service_type);
    enc.bool(bonjour.use_os_user_as_name);

    let streaming = state.streaming();
    enc.bool(streaming.enabled);
    enc.u16(streaming.udp_port);
    enc.u16(streaming.srtp_port);
    enc.string(&streaming.encryption_key);
    enc.bool(streaming.use_udp);
    enc.u16(streaming.framerate);
    enc.u16(streaming.start_delay_ms);
    enc.bool(streaming.rfb_video_turned_off);
    enc.bool(streaming.window_hidden);
    enc.string(&streaming.captured_display_device_name);
    enc.i32(streaming.captured_area.x);
    enc.i32(streaming.captured_area.y);
    enc.i32(streaming.captured_area.width);
    enc.i32(streaming.captured_area.height);
    enc.string(&streaming.captured_window_title);
    enc.u8(streaming.capture_mode as u8);
    enc.bool(streaming.log_process_output);

    enc.buf
}

// ── Payload decoding ──────────────────────────────────────────────────────────

/// Decodes a snapshot payload (no header) into a fresh [`ConfigState`].
///
/// Bounded fields go through their setters, so out-of-range values are
/// clamped exactly as a live setter call would.
///
/// # Errors
///
/// Returns [`ConfigIoError`] on truncation, bad field values or trailing bytes.
pub fn decode_state(payload: &[u8]) -> Result<ConfigState, ConfigIoError> {
    let mut dec = Decoder::new(payload);
    let mut state = ConfigState::default();

    state.set_rfb_port(dec.u16()?);
    state.set_http_port(dec.u16()?);
    state.set_rfb_ssl_enabled(dec.bool()?);

    state.set_file_transfers_enabled(dec.bool()?);
    state.set_removing_wallpaper_enabled(dec.bool()?);
    state.set_mirror_allowed(dec.bool()?);
    let action = dec.u8()?;
    state.set_disconnect_action(
        DisconnectAction::try_from(action)
            .map_err(|v| ConfigIoError::Malformed(format!("unknown disconnect action {v}")))?,
    );

    state.set_accepting_rfb_connections(dec.bool()?);
    state.set_accepting_http_connections(dec.bool()?);

    for kind in CredentialKind::ALL {
        let is_set = dec.bool()?;
        let secret = dec.secret()?;
        state
            .credentials_mut()
            .set(kind, is_set.then_some(&secret));
    }

    state.set_using_authentication(dec.bool()?);
    state.set_only_loopback_connections(dec.bool()?);
    state.set_applet_param_in_url_enabled(dec.bool()?);
    state.set_log_level(dec.u8()?);
    state.set_control_auth_enabled(dec.bool()?);
    state.set_control_auth_always_checking(dec.bool()?);

    state.set_always_shared(dec.bool()?);
    state.set_never_shared(dec.bool()?);
    state.set_disconnecting_existing_clients(dec.bool()?);

    state.set_polling_interval(dec.u32()?);

    state.set_blocking_remote_input(dec.bool()?);
    state.set_local_input_priority_enabled(dec.bool()?);
    state.set_local_input_priority_timeout(dec.u32()?);
    state.set_blocking_local_input(dec.bool()?);

    state.set_query_timeout(dec.u32()?);
    state.set_default_action_accept(dec.bool()?);

    for _ in 0..dec.len()? {
        let port = dec.u16()?;
        let rect = dec.rect()?;
        state.port_mappings_mut().push(PortMapping { port, rect });
    }

    for _ in 0..dec.len()? {
        let first_ip = Ipv4Addr::from(dec.u32()?);
        let last_ip = Ipv4Addr::from(dec.u32()?);
        let action = IpAccessAction::try_from(dec.u8()?)
            .map_err(|v| ConfigIoError::Malformed(format!("unknown access action {v}")))?;
        state.access_control_mut().push(IpAccessRule {
            first_ip,
            last_ip,
            action,
        });
    }
    state.set_loopback_connections_allowed(dec.bool()?);

    for _ in 0..dec.len()? {
        let name = dec.string()?;
        state.video_class_names_mut().push(name);
    }
    for _ in 0..dec.len()? {
        let rect = dec.rect()?;
        state.video_rects_mut().push(rect);
    }
    state.set_video_recognition_interval(dec.u32()?);

    state.set_idle_timeout(dec.u32()?);
    state.set_saving_log_to_all_users_path(dec.bool()?);
    state.set_grabbing_transparent_windows(dec.bool()?);
    state.set_tray_icon_shown(dec.bool()?);
    state.set_log_file_dir(dec.string()?);

    state.set_bonjour(BonjourSettings {
        enabled: dec.bool()?,
        service_name: dec.string()?,
        port: dec.u16()?,
        service_type: dec.string()?,
        use_os_user_as_name: dec.bool()?,
    });

    let enabled = dec.bool()?;
    let udp_port = dec.u16()?;
    let srtp_port = dec.u16()?;
    let encryption_key = dec.string()?;
    let use_udp = dec.bool()?;
    let framerate = dec.u16()?;
    let start_delay_ms = dec.u16()?;
    let rfb_video_turned_off = dec.bool()?;
    let window_hidden = dec.bool()?;
    let captured_display_device_name = dec.string()?;
    let captured_area = CapturedArea {
        x: dec.i32()?,
        y: dec.i32()?,
        width: dec.i32()?,
        height: dec.i32()?,
    };
    let captured_window_title = dec.string()?;
    let mode = dec.u8()?;
    let capture_mode = CaptureMode::try_from(mode)
        .map_err(|v| ConfigIoError::Malformed(format!("unknown capture mode {v}")))?;
    let log_process_output = dec.bool()?;
    state.set_streaming(StreamingSettings {
        enabled,
        udp_port,
        srtp_port,
        encryption_key,
        use_udp,
        framerate,
        start_delay_ms,
        rfb_video_turned_off,
        window_hidden,
        captured_display_device_name,
        captured_area,
        captured_window_title,
        capture_mode,
        log_process_output,
    });

    let left = dec.remaining();
    if left != 0 {
        return Err(ConfigIoError::TrailingBytes(left));
    }
    Ok(state)
}

// ── Primitive helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn len(&mut self, n: usize) {
        self.u32(n as u32);
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn string(&mut self, v: &str) {
        self.len(v.len());
        self.buf.extend_from_slice(v.as_bytes());
    }

    fn rect(&mut self, r: &Rect) {
        self.i32(r.left);
        self.i32(r.top);
        self.i32(r.right);
        self.i32(r.bottom);
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ConfigIoError> {
        if self.remaining() < n {
            return Err(ConfigIoError::InsufficientData {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ConfigIoError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, ConfigIoError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ConfigIoError::Malformed(format!(
                "invalid bool byte 0x{other:02X}"
            ))),
        }
    }

    fn u16(&mut self) -> Result<u16, ConfigIoError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ConfigIoError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, ConfigIoError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a list length and checks it against the bytes left, so a
    /// garbage count fails fast instead of looping.
    fn len(&mut self) -> Result<usize, ConfigIoError> {
        let n = self.u32()? as usize;
        if n > self.remaining() {
            return Err(ConfigIoError::Malformed(format!(
                "length {n} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn secret(&mut self) -> Result<[u8; PASSWORD_SIZE], ConfigIoError> {
        let mut out = [0u8; PASSWORD_SIZE];
        out.copy_from_slice(self.take(PASSWORD_SIZE)?);
        Ok(out)
    }

    fn string(&mut self) -> Result<String, ConfigIoError> {
        let n = self.len()?;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ConfigIoError::Malformed(format!("invalid UTF-8: {e}")))
    }

    fn rect(&mut self) -> Result<Rect, ConfigIoError> {
        Ok(Rect {
            left: self.i32()?,
            top: self.i32()?,
            right: self.i32()?,
            bottom: self.i32()?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
