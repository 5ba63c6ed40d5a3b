//! Fixed-size VNC secrets with an explicit presence flag.
//!
//! A VNC password is always exactly [`PASSWORD_SIZE`] bytes on the wire (the
//! DES key used in the RFB challenge/response).  The server keeps three of
//! them:
//!
//! - **primary** – full-control access,
//! - **read-only** – view-only access,
//! - **control** – protects the administration interface.
//!
//! # "Unset" versus "empty"
//!
//! A credential whose bytes are all zero is *not* the same as a missing
//! credential.  `is_set` records whether the administrator configured a
//! password at all, so "no password configured" and "empty password
//! configured" stay distinguishable.

/// Length of a VNC password in bytes.
pub const PASSWORD_SIZE: usize = 8;

/// Which of the three server credentials an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Primary,
    ReadOnly,
    Control,
}

impl CredentialKind {
    /// All kinds in storage order.
    pub const ALL: [CredentialKind; 3] = [
        CredentialKind::Primary,
        CredentialKind::ReadOnly,
        CredentialKind::Control,
    ];
}

/// One secret plus its presence flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    secret: [u8; PASSWORD_SIZE],
    is_set: bool,
}

impl Credential {
    /// Returns the raw secret bytes.  All zeroes when unset.
    pub fn secret(&self) -> [u8; PASSWORD_SIZE] {
        self.secret
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Stores `value` and marks the credential as set.
    pub fn set(&mut self, value: &[u8; PASSWORD_SIZE]) {
        self.secret = *value;
        self.is_set = true;
    }

    /// Zeroes the secret and clears the presence flag.
    pub fn clear(&mut self) {
        self.secret.fill(0);
        self.is_set = false;
    }
}

/// The three independent server credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    primary: Credential,
    read_only: Credential,
    control: Credential,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: CredentialKind) -> &Credential {
        match kind {
            CredentialKind::Primary => &self.primary,
            CredentialKind::ReadOnly => &self.read_only,
            CredentialKind::Control => &self.control,
        }
    }

    pub fn get_mut(&mut self, kind: CredentialKind) -> &mut Credential {
        match kind {
            CredentialKind::Primary => &mut self.primary,
            CredentialKind::ReadOnly => &mut self.read_only,
            CredentialKind::Control => &mut self.control,
        }
    }

    /// Sets the credential, or clears it when `value` is `None`.
    pub fn set(&mut self, kind: CredentialKind, value: Option<&[u8; PASSWORD_SIZE]>) {
        match value {
            Some(bytes) => self.get_mut(kind).set(bytes),
            None => self.get_mut(kind).clear(),
        }
    }
}
