//! Server configuration: the record, its lock, its credentials and its
//! persistence format.

pub mod codec;
pub mod containers;
pub mod credential;
pub mod server;
pub mod state;

pub use codec::{ConfigIoError, SNAPSHOT_VERSION};
pub use containers::{IpAccessAction, IpAccessControl, IpAccessRule, PortMapping, PortMappingContainer, Rect};
pub use credential::{Credential, CredentialKind, CredentialStore, PASSWORD_SIZE};
pub use server::{ConfigGuard, ServerConfig};
pub use state::{
    BonjourSettings, CaptureMode, CapturedArea, ConfigState, DisconnectAction, StreamingSettings,
    MAXIMAL_LOG_LEVEL, MINIMAL_LOCAL_INPUT_PRIORITY_TIMEOUT, MINIMAL_POLLING_INTERVAL,
    MINIMAL_QUERY_TIMEOUT, MINIMAL_STREAMING_FRAMERATE,
};
