//! The process-wide, lock-guarded server configuration.
//!
//! # Two access surfaces
//!
//! [`ServerConfig`] is read and written by every connection thread at once,
//! so all access goes through one lock.  It offers two ways in:
//!
//! - **Atomic accessors** (`config.rfb_port()`, `config.set_polling_interval(..)`)
//!   take the lock for exactly one field read or write.  Each call is
//!   individually thread-safe, but two calls in a row may observe different
//!   states if another thread writes in between.
//!
//! - **Guarded handle** ([`ServerConfig::lock`] → [`ConfigGuard`]) holds the
//!   lock for the guard's lifetime.  Use it whenever several fields must be
//!   read or written as one consistent unit.  The port-mapping, access-control
//!   and video-region containers are *only* reachable through the guard,
//!   because handing out a reference to them without the lock held would be
//!   unsound.
//!
//! ```rust
//! use rfb_core::ServerConfig;
//!
//! let config = ServerConfig::new();
//! config.set_rfb_port(5901);                   // atomic
//!
//! let guard = config.lock();                   // multi-field window
//! let sharing = {
//!     let state = guard.state();
//!     (state.is_always_shared(), state.is_never_shared())
//! };
//! assert_eq!(sharing, (false, false));
//! assert_eq!(config.rfb_port(), 5901);         // reentrant: same thread
//! ```
//!
//! # Reentrancy
//!
//! The lock is a [`parking_lot::ReentrantMutex`]: a thread that holds a
//! [`ConfigGuard`] may still call atomic accessors.  The state itself sits in
//! a `RefCell`, so on the same thread:
//!
//! - a `Ref` from [`ConfigGuard::state`] must be dropped before calling an
//!   atomic setter;
//! - a `RefMut` from [`ConfigGuard::state_mut`] or a container handle must be
//!   dropped before calling any atomic accessor.
//!
//! Breaking either rule panics with a `BorrowMutError` / `BorrowError`.
//! Copy what you need out of the borrow first:
//!
//! ```rust
//! use rfb_core::ServerConfig;
//!
//! let config = ServerConfig::new();
//! let guard = config.lock();
//! let always = guard.state().is_always_shared(); // borrow ends here
//! if !always {
//!     config.set_never_shared(true);
//! }
//! drop(guard);
//! assert!(config.is_never_shared());
//! ```
//!
//! # Long-held operations
//!
//! [`ServerConfig::serialize`] keeps the lock for the entire encode-and-write,
//! including blocking I/O on the output stream.  [`ServerConfig::deserialize`]
//! reads and decodes without the lock and only takes it for the final swap.

use std::cell::{Ref, RefCell, RefMut};
use std::io::{Read, Write};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use super::codec::{self, ConfigIoError};
use super::containers::{IpAccessControl, PortMappingContainer, Rect};
use super::credential::{CredentialKind, PASSWORD_SIZE};
use super::state::{BonjourSettings, ConfigState, DisconnectAction, StreamingSettings};
use crate::password::{self, PasswordFormatError};

/// Generates atomic (self-locking) wrappers around `ConfigState` accessors.
macro_rules! atomic_accessors {
    ($( $getter:ident, $setter:ident: $ty:ty; )*) => {
        $(
            pub fn $getter(&self) -> $ty {
                self.read(|s| s.$getter())
            }

            pub fn $setter(&self, value: $ty) {
                self.write(|s| s.$setter(value))
            }
        )*
    };
}

/// The server configuration record behind a reentrant lock.
pub struct ServerConfig {
    state: ReentrantMutex<RefCell<ConfigState>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig").finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::from_state(ConfigState::default())
    }

    pub fn from_state(state: ConfigState) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(state)),
        }
    }

    /// Acquires the configuration lock for a multi-field access window.
    ///
    /// Blocks while another thread holds the lock.  Re-entering from the
    /// thread that already holds it does not block.
    pub fn lock(&self) -> ConfigGuard<'_> {
        ConfigGuard {
            inner: self.state.lock(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&ConfigState) -> T) -> T {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut ConfigState) -> T) -> T {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Copies the whole record under one lock window.
    pub fn snapshot(&self) -> ConfigState {
        self.read(ConfigState::clone)
    }

    /// Replaces the whole record under one lock window.
    pub fn replace_with(&self, state: ConfigState) {
        self.write(|s| *s = state);
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Writes a versioned snapshot of the configuration to `output`.
    ///
    /// Holds the configuration lock until the write completes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigIoError::Io`] if the output fails.
    pub fn serialize<W: Write>(&self, output: &mut W) -> Result<(), ConfigIoError> {
        let guard = self.state.lock();
        let state = guard.borrow();
        codec::write_snapshot(&state, output)
    }

    /// Replaces the configuration with the snapshot read from `input`.
    ///
    /// The snapshot is decoded into a temporary record first; the live state
    /// is swapped only when decoding succeeded, so a failed call leaves the
    /// previous configuration untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigIoError`] for I/O failures, truncated or malformed data.
    pub fn deserialize<R: Read>(&self, input: &mut R) -> Result<(), ConfigIoError> {
        let decoded = codec::read_snapshot(input)?;
        self.replace_with(decoded);
        Ok(())
    }

    // ── Scalar fields ─────────────────────────────────────────────────────────

    atomic_accessors! {
        rfb_port, set_rfb_port: u16;
        http_port, set_http_port: u16;
        is_rfb_ssl_enabled, set_rfb_ssl_enabled: bool;
        is_file_transfers_enabled, set_file_transfers_enabled: bool;
        is_removing_wallpaper_enabled, set_removing_wallpaper_enabled: bool;
        is_mirror_allowed, set_mirror_allowed: bool;
        disconnect_action, set_disconnect_action: DisconnectAction;
        is_accepting_rfb_connections, set_accepting_rfb_connections: bool;
        is_accepting_http_connections, set_accepting_http_connections: bool;
        is_using_authentication, set_using_authentication: bool;
        is_only_loopback_connections, set_only_loopback_connections: bool;
        is_applet_param_in_url_enabled, set_applet_param_in_url_enabled: bool;
        log_level, set_log_level: u8;
        is_control_auth_enabled, set_control_auth_enabled: bool;
        is_control_auth_always_checking, set_control_auth_always_checking: bool;
        is_always_shared, set_always_shared: bool;
        is_never_shared, set_never_shared: bool;
        is_disconnecting_existing_clients, set_disconnecting_existing_clients: bool;
        polling_interval, set_polling_interval: u32;
        is_blocking_remote_input, set_blocking_remote_input: bool;
        is_local_input_priority_enabled, set_local_input_priority_enabled: bool;
        local_input_priority_timeout, set_local_input_priority_timeout: u32;
        is_blocking_local_input, set_blocking_local_input: bool;
        query_timeout, set_query_timeout: u32;
        is_default_action_accept, set_default_action_accept: bool;
        is_loopback_connections_allowed, set_loopback_connections_allowed: bool;
        video_recognition_interval, set_video_recognition_interval: u32;
        idle_timeout, set_idle_timeout: u32;
        is_saving_log_to_all_users_path, set_saving_log_to_all_users_path: bool;
        is_grabbing_transparent_windows, set_grabbing_transparent_windows: bool;
        is_tray_icon_shown, set_tray_icon_shown: bool;
    }

    pub fn log_file_dir(&self) -> String {
        self.read(|s| s.log_file_dir().to_string())
    }

    pub fn set_log_file_dir(&self, value: impl Into<String>) {
        let value = value.into();
        self.write(|s| s.set_log_file_dir(value));
    }

    pub fn bonjour_settings(&self) -> BonjourSettings {
        self.read(|s| s.bonjour().clone())
    }

    pub fn set_bonjour_settings(&self, value: BonjourSettings) {
        self.write(|s| s.set_bonjour(value));
    }

    // ── Streaming ─────────────────────────────────────────────────────────────

    /// Copies the streaming sub-configuration under one lock window.
    pub fn streaming_settings(&self) -> StreamingSettings {
        self.read(|s| s.streaming().clone())
    }

    pub fn set_streaming_settings(&self, value: StreamingSettings) {
        self.write(|s| s.set_streaming(value));
    }

    pub fn is_streaming_enabled(&self) -> bool {
        self.read(|s| s.streaming().enabled)
    }

    pub fn set_streaming_enabled(&self, enabled: bool) {
        self.update_streaming(|st| st.enabled = enabled);
    }

    pub fn streaming_framerate(&self) -> u16 {
        self.read(|s| s.streaming().framerate)
    }

    /// Values below the minimum framerate are clamped.
    pub fn set_streaming_framerate(&self, framerate: u16) {
        self.update_streaming(|st| st.framerate = framerate);
    }

    pub fn streaming_start_delay_ms(&self) -> u16 {
        self.read(|s| s.streaming().start_delay_ms)
    }

    pub fn set_streaming_start_delay_ms(&self, delay_ms: u16) {
        self.update_streaming(|st| st.start_delay_ms = delay_ms);
    }

    pub fn streaming_destination_port(&self) -> u16 {
        self.read(|s| s.streaming().destination_port())
    }

    fn update_streaming(&self, f: impl FnOnce(&mut StreamingSettings)) {
        self.write(|s| {
            let mut settings = s.streaming().clone();
            f(&mut settings);
            s.set_streaming(settings);
        });
    }

    // ── Credentials ───────────────────────────────────────────────────────────

    /// Returns the raw secret for `kind` (all zeroes when unset).
    pub fn password(&self, kind: CredentialKind) -> [u8; PASSWORD_SIZE] {
        self.read(|s| s.credentials().get(kind).secret())
    }

    /// Sets the secret and its presence flag; `None` is the same as
    /// [`ServerConfig::delete_password`].
    pub fn set_password(&self, kind: CredentialKind, value: Option<&[u8; PASSWORD_SIZE]>) {
        self.write(|s| s.credentials_mut().set(kind, value));
    }

    pub fn has_password(&self, kind: CredentialKind) -> bool {
        self.read(|s| s.credentials().get(kind).is_set())
    }

    /// Zeroes the secret and clears its presence flag.
    pub fn delete_password(&self, kind: CredentialKind) {
        self.write(|s| s.credentials_mut().get_mut(kind).clear());
    }

    /// Returns the obfuscated text form of the credential, or `None` when unset.
    pub fn obfuscated_password(&self, kind: CredentialKind) -> Option<String> {
        self.read(|s| {
            let credential = s.credentials().get(kind);
            credential
                .is_set()
                .then(|| password::encode(&credential.secret()))
        })
    }

    /// Decodes `obfuscated` and stores it as the credential for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordFormatError`] when the text is not 16 hex characters;
    /// the stored credential is left unchanged in that case.
    pub fn set_password_from_obfuscated(
        &self,
        kind: CredentialKind,
        obfuscated: &str,
    ) -> Result<(), PasswordFormatError> {
        let plain = password::decode(obfuscated)?;
        self.set_password(kind, Some(&plain));
        Ok(())
    }
}

/// Scoped hold on the configuration lock.
///
/// Dropping the guard releases the lock.  Borrows handed out by the guard
/// cannot outlive it.
pub struct ConfigGuard<'a> {
    inner: ReentrantMutexGuard<'a, RefCell<ConfigState>>,
}

impl ConfigGuard<'_> {
    /// Read access to every field.
    ///
    /// # Panics
    ///
    /// Panics if a `RefMut` from this guard is still alive.  While the
    /// returned `Ref` is alive, calling an atomic *setter* on the same thread
    /// panics; atomic getters are fine.
    pub fn state(&self) -> Ref<'_, ConfigState> {
        self.inner.borrow()
    }

    /// Write access to every field.  Setters still enforce minimums.
    ///
    /// # Panics
    ///
    /// Panics if any borrow from this guard is still alive.  While the
    /// returned `RefMut` is alive, calling *any* atomic accessor on the same
    /// thread panics.
    pub fn state_mut(&self) -> RefMut<'_, ConfigState> {
        self.inner.borrow_mut()
    }

    /// Port-mapping container.  Not reachable without the lock.
    ///
    /// Same borrow rules as [`state_mut`](Self::state_mut).
    pub fn port_mappings(&self) -> RefMut<'_, PortMappingContainer> {
        RefMut::map(self.inner.borrow_mut(), ConfigState::port_mappings_mut)
    }

    /// IP access-control container.  Not reachable without the lock.
    pub fn access_control(&self) -> RefMut<'_, IpAccessControl> {
        RefMut::map(self.inner.borrow_mut(), ConfigState::access_control_mut)
    }

    pub fn video_class_names(&self) -> RefMut<'_, Vec<String>> {
        RefMut::map(self.inner.borrow_mut(), ConfigState::video_class_names_mut)
    }

    pub fn video_rects(&self) -> RefMut<'_, Vec<Rect>> {
        RefMut::map(self.inner.borrow_mut(), ConfigState::video_rects_mut)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::containers::{IpAccessAction, IpAccessRule, PortMapping};
    use crate::config::state::MINIMAL_POLLING_INTERVAL;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_rfb_port_then_get_returns_same_value() {
        let config = ServerConfig::new();
        for port in [0u16, 1, 5900, 5901, u16::MAX] {
            config.set_rfb_port(port);
            assert_eq!(config.rfb_port(), port);
        }
    }

    #[test]
    fn test_polling_interval_below_minimum_is_clamped() {
        let config = ServerConfig::new();
        config.set_polling_interval(10);
        assert_eq!(config.polling_interval(), MINIMAL_POLLING_INTERVAL);
    }

    #[test]
    fn test_password_set_has_get_delete() {
        // Arrange
        let config = ServerConfig::new();
        let secret = *b"\x01\x02\x03\x04\x05\x06\x07\x08";

        // Act
        config.set_password(CredentialKind::Primary, Some(&secret));

        // Assert
        assert!(config.has_password(CredentialKind::Primary));
        assert_eq!(config.password(CredentialKind::Primary), secret);
        assert!(!config.has_password(CredentialKind::ReadOnly));

        config.delete_password(CredentialKind::Primary);
        assert!(!config.has_password(CredentialKind::Primary));
        assert_eq!(config.password(CredentialKind::Primary), [0u8; PASSWORD_SIZE]);
    }

    #[test]
    fn test_set_password_none_is_delete() {
        let config = ServerConfig::new();
        config.set_password(CredentialKind::Control, Some(b"control!"));

        config.set_password(CredentialKind::Control, None);

        assert!(!config.has_password(CredentialKind::Control));
    }

    #[test]
    fn test_obfuscated_password_round_trips_through_config() {
        let config = ServerConfig::new();
        assert_eq!(config.obfuscated_password(CredentialKind::ReadOnly), None);

        config.set_password(CredentialKind::ReadOnly, Some(b"viewonly"));
        let text = config
            .obfuscated_password(CredentialKind::ReadOnly)
            .expect("password is set");

        let other = ServerConfig::new();
        other
            .set_password_from_obfuscated(CredentialKind::ReadOnly, &text)
            .expect("valid hex");
        assert_eq!(other.password(CredentialKind::ReadOnly), *b"viewonly");
    }

    #[test]
    fn test_bad_obfuscated_password_leaves_credential_unchanged() {
        let config = ServerConfig::new();
        config.set_password(CredentialKind::Primary, Some(b"original"));

        let result = config.set_password_from_obfuscated(CredentialKind::Primary, "zz");

        assert!(result.is_err());
        assert_eq!(config.password(CredentialKind::Primary), *b"original");
    }

    #[test]
    fn test_atomic_accessor_is_reentrant_while_guard_held() {
        let config = ServerConfig::new();
        let guard = config.lock();

        // Same thread: must not deadlock.
        config.set_http_port(8080);
        assert_eq!(guard.state().http_port(), 8080);
        drop(guard);

        assert_eq!(config.http_port(), 8080);
    }

    #[test]
    fn test_atomic_getter_is_allowed_while_state_ref_held() {
        let config = ServerConfig::new();
        config.set_rfb_port(5907);
        let guard = config.lock();

        let state = guard.state();

        assert_eq!(config.rfb_port(), state.rfb_port());
    }

    #[test]
    fn test_setter_after_copying_out_of_state_ref() {
        // Arrange
        let config = ServerConfig::new();
        let guard = config.lock();

        // Act: the temporary Ref ends with the statement
        if !guard.state().is_always_shared() {
            config.set_never_shared(true);
        }
        drop(guard);

        // Assert
        assert!(config.is_never_shared());
    }

    #[test]
    #[should_panic]
    fn test_setter_while_state_ref_held_panics() {
        let config = ServerConfig::new();
        let guard = config.lock();
        let _state = guard.state();

        config.set_never_shared(true);
    }

    #[test]
    #[should_panic]
    fn test_getter_while_state_mut_held_panics() {
        let config = ServerConfig::new();
        let guard = config.lock();
        let _state = guard.state_mut();

        let _ = config.rfb_port();
    }

    #[test]
    fn test_guard_gives_consistent_multi_field_write() {
        // Arrange
        let config = Arc::new(ServerConfig::new());

        // Act: flip all three sharing flags inside one lock window
        {
            let guard = config.lock();
            let mut state = guard.state_mut();
            state.set_always_shared(true);
            state.set_never_shared(false);
            state.set_disconnecting_existing_clients(false);
        }

        // Assert
        let guard = config.lock();
        let state = guard.state();
        assert!(state.is_always_shared());
        assert!(!state.is_never_shared());
        assert!(!state.is_disconnecting_existing_clients());
    }

    #[test]
    fn test_containers_are_reachable_through_guard() {
        let config = ServerConfig::new();
        {
            let guard = config.lock();
            guard.port_mappings().push(PortMapping {
                port: 5901,
                rect: Rect::new(0, 0, 800, 600),
            });
            guard.access_control().push(IpAccessRule {
                first_ip: Ipv4Addr::new(192, 168, 0, 1),
                last_ip: Ipv4Addr::new(192, 168, 0, 254),
                action: IpAccessAction::Allow,
            });
            guard.video_class_names().push("VideoRenderer".to_string());
            guard.video_rects().push(Rect::new(10, 10, 330, 250));
        }

        let snapshot = config.snapshot();
        assert_eq!(snapshot.port_mappings().len(), 1);
        assert_eq!(snapshot.access_control().len(), 1);
        assert_eq!(snapshot.video_class_names(), ["VideoRenderer".to_string()]);
        assert_eq!(snapshot.video_rects().len(), 1);
    }

    #[test]
    fn test_streaming_setters_update_sub_record() {
        let config = ServerConfig::new();
        config.set_streaming_enabled(true);
        config.set_streaming_framerate(0);
        config.set_streaming_start_delay_ms(250);

        let settings = config.streaming_settings();
        assert!(settings.enabled);
        assert_eq!(settings.framerate, 1);
        assert_eq!(settings.start_delay_ms, 250);
        assert!(config.is_streaming_enabled());
        assert_eq!(config.streaming_destination_port(), settings.udp_port);
    }

    #[test]
    fn test_concurrent_writers_never_tear_guarded_pairs() {
        // Arrange: writers keep http_port == rfb_port + 1 inside the guard
        let config = Arc::new(ServerConfig::new());
        config.set_rfb_port(100);
        config.set_http_port(101);

        let writers: Vec<_> = (0..4u16)
            .map(|t| {
                let config = Arc::clone(&config);
                thread::spawn(move || {
                    for i in 0..500u16 {
                        let guard = config.lock();
                        let mut state = guard.state_mut();
                        let base = t * 1000 + i;
                        state.set_rfb_port(base);
                        state.set_http_port(base + 1);
                    }
                })
            })
            .collect();

        // Act / Assert: every guarded read sees a consistent pair
        for _ in 0..500 {
            let guard = config.lock();
            let state = guard.state();
            assert_eq!(state.http_port(), state.rfb_port() + 1);
        }
        for w in writers {
            w.join().expect("writer thread");
        }
    }

    #[test]
    fn test_failed_deserialize_leaves_state_untouched() {
        // Arrange
        let config = ServerConfig::new();
        config.set_rfb_port(6000);
        config.set_password(CredentialKind::Primary, Some(b"keepme!!"));
        let before = config.snapshot();

        let other = ServerConfig::new();
        other.set_rfb_port(7000);
        let mut bytes = Vec::new();
        other.serialize(&mut bytes).expect("serialize");
        bytes.truncate(bytes.len() - 3);

        // Act
        let result = config.deserialize(&mut bytes.as_slice());

        // Assert
        assert!(result.is_err());
        assert_eq!(config.snapshot(), before);
    }
}
