//! The plain configuration record.
//!
//! [`ConfigState`] holds every operating parameter of the server and knows
//! nothing about locking.  It is what [`super::ServerConfig`] guards, what a
//! [`super::ConfigGuard`] hands out, and what the snapshot codec reads and
//! writes.
//!
//! Fields are private so that every timing value goes through a setter that
//! enforces its documented minimum.  Values below the minimum are **clamped**
//! rather than rejected; deserialization uses the same setters.

use super::containers::{IpAccessControl, PortMappingContainer, Rect};
use super::credential::CredentialStore;

/// Smallest accepted screen polling interval, in milliseconds.
pub const MINIMAL_POLLING_INTERVAL: u32 = 30;
/// Smallest accepted local-input-priority timeout, in seconds.
pub const MINIMAL_LOCAL_INPUT_PRIORITY_TIMEOUT: u32 = 1;
/// Smallest accepted query timeout, in seconds.
pub const MINIMAL_QUERY_TIMEOUT: u32 = 1;
/// Smallest accepted streaming framerate, in frames per second.
pub const MINIMAL_STREAMING_FRAMERATE: u16 = 1;
/// Largest log verbosity level.
pub const MAXIMAL_LOG_LEVEL: u8 = 9;

/// What the server does when the last client disconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectAction {
    #[default]
    DoNothing = 0,
    LockWorkstation = 1,
    LogoutWorkstation = 2,
}

impl TryFrom<u8> for DisconnectAction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::DoNothing),
            1 => Ok(Self::LockWorkstation),
            2 => Ok(Self::LogoutWorkstation),
            other => Err(other),
        }
    }
}

/// Which part of the desktop the streaming process captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureMode {
    /// A whole display device (or the full desktop when no device is named).
    #[default]
    Display = 1,
    /// A fixed rectangle, see [`StreamingSettings::captured_area`].
    Area = 2,
    /// A single top-level window matched by title.
    Window = 3,
}

impl TryFrom<u8> for CaptureMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Display),
            2 => Ok(Self::Area),
            3 => Ok(Self::Window),
            other => Err(other),
        }
    }
}

/// Rectangle captured in [`CaptureMode::Area`], as origin plus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturedArea {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Screen streaming sub-configuration.
///
/// Only `framerate` has a lower bound; [`ConfigState::set_streaming`]
/// applies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingSettings {
    pub enabled: bool,
    /// Destination port used when `use_udp` is set.
    pub udp_port: u16,
    /// Destination port used for SRTP.
    pub srtp_port: u16,
    /// Base64 SRTP master key, passed through to the streamer.
    pub encryption_key: String,
    /// Plain MPEG-TS over UDP when `true`, SRTP otherwise.
    pub use_udp: bool,
    pub framerate: u16,
    /// Delay before the streamer is launched, in milliseconds.
    pub start_delay_ms: u16,
    pub rfb_video_turned_off: bool,
    pub window_hidden: bool,
    pub captured_display_device_name: String,
    pub captured_area: CapturedArea,
    pub captured_window_title: String,
    pub capture_mode: CaptureMode,
    pub log_process_output: bool,
}

impl StreamingSettings {
    /// The port the streamer sends to for the selected transport.
    pub fn destination_port(&self) -> u16 {
        if self.use_udp {
            self.udp_port
        } else {
            self.srtp_port
        }
    }

    fn normalized(mut self) -> Self {
        self.framerate = self.framerate.max(MINIMAL_STREAMING_FRAMERATE);
        self
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            udp_port: 5920,
            srtp_port: 5922,
            encryption_key: String::new(),
            use_udp: true,
            framerate: 25,
            start_delay_ms: 0,
            rfb_video_turned_off: false,
            window_hidden: true,
            captured_display_device_name: String::new(),
            captured_area: CapturedArea::default(),
            captured_window_title: String::new(),
            capture_mode: CaptureMode::Display,
            log_process_output: false,
        }
    }
}

/// Zero-configuration (mDNS) advertisement settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonjourSettings {
    pub enabled: bool,
    pub service_name: String,
    pub port: u16,
    pub service_type: String,
    /// Advertise under the logged-in OS user name instead of `service_name`.
    pub use_os_user_as_name: bool,
}

impl Default for BonjourSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: String::new(),
            port: 5900,
            service_type: "_rfb._tcp".to_string(),
            use_os_user_as_name: false,
        }
    }
}

/// Generates a getter/setter pair for a `Copy` field with no constraints.
macro_rules! plain_accessors {
    ($( $field:ident: $ty:ty => $getter:ident, $setter:ident; )*) => {
        $(
            pub fn $getter(&self) -> $ty {
                self.$field
            }

            pub fn $setter(&mut self, value: $ty) {
                self.$field = value;
            }
        )*
    };
}

/// Every operating parameter of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigState {
    rfb_port: u16,
    http_port: u16,
    rfb_ssl_enabled: bool,

    file_transfers_enabled: bool,
    removing_wallpaper_enabled: bool,
    mirror_allowed: bool,
    disconnect_action: DisconnectAction,

    accepting_rfb_connections: bool,
    accepting_http_connections: bool,
    credentials: CredentialStore,

    using_authentication: bool,
    only_loopback_connections: bool,
    applet_param_in_url_enabled: bool,
    log_level: u8,
    control_auth_enabled: bool,
    control_auth_always_checking: bool,

    always_shared: bool,
    never_shared: bool,
    disconnecting_existing_clients: bool,

    polling_interval: u32,

    blocking_remote_input: bool,
    local_input_priority_enabled: bool,
    local_input_priority_timeout: u32,
    blocking_local_input: bool,

    query_timeout: u32,
    default_action_accept: bool,

    port_mappings: PortMappingContainer,
    access_control: IpAccessControl,
    loopback_connections_allowed: bool,

    video_class_names: Vec<String>,
    video_rects: Vec<Rect>,
    video_recognition_interval: u32,

    idle_timeout: u32,
    saving_log_to_all_users_path: bool,
    grabbing_transparent_windows: bool,
    tray_icon_shown: bool,
    log_file_dir: String,

    bonjour: BonjourSettings,
    streaming: StreamingSettings,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            rfb_port: 5900,
            http_port: 5800,
            rfb_ssl_enabled: false,
            file_transfers_enabled: true,
            removing_wallpaper_enabled: true,
            mirror_allowed: true,
            disconnect_action: DisconnectAction::DoNothing,
            accepting_rfb_connections: true,
            accepting_http_connections: true,
            credentials: CredentialStore::new(),
            using_authentication: true,
            only_loopback_connections: false,
            applet_param_in_url_enabled: true,
            log_level: 0,
            control_auth_enabled: false,
            control_auth_always_checking: false,
            always_shared: false,
            never_shared: false,
            disconnecting_existing_clients: true,
            polling_interval: 1000,
            blocking_remote_input: false,
            local_input_priority_enabled: false,
            local_input_priority_timeout: 3,
            blocking_local_input: false,
            query_timeout: 30,
            default_action_accept: false,
            port_mappings: PortMappingContainer::new(),
            access_control: IpAccessControl::new(),
            loopback_connections_allowed: false,
            video_class_names: Vec::new(),
            video_rects: Vec::new(),
            video_recognition_interval: 3000,
            idle_timeout: 0,
            saving_log_to_all_users_path: false,
            grabbing_transparent_windows: true,
            tray_icon_shown: true,
            log_file_dir: String::new(),
            bonjour: BonjourSettings::default(),
            streaming: StreamingSettings::default(),
        }
    }
}

impl ConfigState {
    plain_accessors! {
        rfb_port: u16 => rfb_port, set_rfb_port;
        http_port: u16 => http_port, set_http_port;
        rfb_ssl_enabled: bool => is_rfb_ssl_enabled, set_rfb_ssl_enabled;
        file_transfers_enabled: bool => is_file_transfers_enabled, set_file_transfers_enabled;
        removing_wallpaper_enabled: bool => is_removing_wallpaper_enabled, set_removing_wallpaper_enabled;
        mirror_allowed: bool => is_mirror_allowed, set_mirror_allowed;
        disconnect_action: DisconnectAction => disconnect_action, set_disconnect_action;
        accepting_rfb_connections: bool => is_accepting_rfb_connections, set_accepting_rfb_connections;
        accepting_http_connections: bool => is_accepting_http_connections, set_accepting_http_connections;
        using_authentication: bool => is_using_authentication, set_using_authentication;
        only_loopback_connections: bool => is_only_loopback_connections, set_only_loopback_connections;
        applet_param_in_url_enabled: bool => is_applet_param_in_url_enabled, set_applet_param_in_url_enabled;
        control_auth_enabled: bool => is_control_auth_enabled, set_control_auth_enabled;
        control_auth_always_checking: bool => is_control_auth_always_checking, set_control_auth_always_checking;
        always_shared: bool => is_always_shared, set_always_shared;
        never_shared: bool => is_never_shared, set_never_shared;
        disconnecting_existing_clients: bool => is_disconnecting_existing_clients, set_disconnecting_existing_clients;
        blocking_remote_input: bool => is_blocking_remote_input, set_blocking_remote_input;
        local_input_priority_enabled: bool => is_local_input_priority_enabled, set_local_input_priority_enabled;
        blocking_local_input: bool => is_blocking_local_input, set_blocking_local_input;
        default_action_accept: bool => is_default_action_accept, set_default_action_accept;
        loopback_connections_allowed: bool => is_loopback_connections_allowed, set_loopback_connections_allowed;
        video_recognition_interval: u32 => video_recognition_interval, set_video_recognition_interval;
        idle_timeout: u32 => idle_timeout, set_idle_timeout;
        saving_log_to_all_users_path: bool => is_saving_log_to_all_users_path, set_saving_log_to_all_users_path;
        grabbing_transparent_windows: bool => is_grabbing_transparent_windows, set_grabbing_transparent_windows;
        tray_icon_shown: bool => is_tray_icon_shown, set_tray_icon_shown;
    }

    // ── Bounded fields ────────────────────────────────────────────────────────

    pub fn log_level(&self) -> u8 {
        self.log_level
    }

    /// Values above [`MAXIMAL_LOG_LEVEL`] are clamped.
    pub fn set_log_level(&mut self, value: u8) {
        self.log_level = value.min(MAXIMAL_LOG_LEVEL);
    }

    pub fn polling_interval(&self) -> u32 {
        self.polling_interval
    }

    /// Values below [`MINIMAL_POLLING_INTERVAL`] are clamped.
    pub fn set_polling_interval(&mut self, value: u32) {
        self.polling_interval = value.max(MINIMAL_POLLING_INTERVAL);
    }

    pub fn local_input_priority_timeout(&self) -> u32 {
        self.local_input_priority_timeout
    }

    /// Values below [`MINIMAL_LOCAL_INPUT_PRIORITY_TIMEOUT`] are clamped.
    pub fn set_local_input_priority_timeout(&mut self, value: u32) {
        self.local_input_priority_timeout = value.max(MINIMAL_LOCAL_INPUT_PRIORITY_TIMEOUT);
    }

    pub fn query_timeout(&self) -> u32 {
        self.query_timeout
    }

    /// Values below [`MINIMAL_QUERY_TIMEOUT`] are clamped.
    pub fn set_query_timeout(&mut self, value: u32) {
        self.query_timeout = value.max(MINIMAL_QUERY_TIMEOUT);
    }

    // ── Strings and sub-records ───────────────────────────────────────────────

    pub fn log_file_dir(&self) -> &str {
        &self.log_file_dir
    }

    pub fn set_log_file_dir(&mut self, value: impl Into<String>) {
        self.log_file_dir = value.into();
    }

    pub fn bonjour(&self) -> &BonjourSettings {
        &self.bonjour
    }

    pub fn set_bonjour(&mut self, value: BonjourSettings) {
        self.bonjour = value;
    }

    pub fn streaming(&self) -> &StreamingSettings {
        &self.streaming
    }

    /// Stores `value` with its framerate clamped to
    /// [`MINIMAL_STREAMING_FRAMERATE`].
    pub fn set_streaming(&mut self, value: StreamingSettings) {
        self.streaming = value.normalized();
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    // ── Containers ────────────────────────────────────────────────────────────

    pub fn port_mappings(&self) -> &PortMappingContainer {
        &self.port_mappings
    }

    pub fn port_mappings_mut(&mut self) -> &mut PortMappingContainer {
        &mut self.port_mappings
    }

    pub fn access_control(&self) -> &IpAccessControl {
        &self.access_control
    }

    pub fn access_control_mut(&mut self) -> &mut IpAccessControl {
        &mut self.access_control
    }

    pub fn video_class_names(&self) -> &[String] {
        &self.video_class_names
    }

    pub fn video_class_names_mut(&mut self) -> &mut Vec<String> {
        &mut self.video_class_names
    }

    pub fn video_rects(&self) -> &[Rect] {
        &self.video_rects
    }

    pub fn video_rects_mut(&mut self) -> &mut Vec<Rect> {
        &mut self.video_rects
    }
}
