//! Opaque containers owned by the server configuration.
//!
//! Rule evaluation and port-mapping semantics belong to the connection
//! layer.  The configuration only stores, copies and persists these lists,
//! so the types here are deliberately thin.

use std::net::Ipv4Addr;

/// Screen rectangle in desktop coordinates (exclusive right/bottom edge).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Saturates instead of overflowing on extreme decoded coordinates.
    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// What the server does with a connection matched by an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IpAccessAction {
    Allow = 0,
    Deny = 1,
    /// Ask the local user, falling back to the default action on timeout.
    Query = 2,
}

impl TryFrom<u8> for IpAccessAction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Allow),
            1 => Ok(Self::Deny),
            2 => Ok(Self::Query),
            other => Err(other),
        }
    }
}

/// An inclusive IPv4 range with its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpAccessRule {
    pub first_ip: Ipv4Addr,
    pub last_ip: Ipv4Addr,
    pub action: IpAccessAction,
}

/// Ordered list of access rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAccessControl {
    rules: Vec<IpAccessRule>,
}

impl IpAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: IpAccessRule) {
        self.rules.push(rule);
    }

    pub fn remove(&mut self, index: usize) -> Option<IpAccessRule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn rules(&self) -> &[IpAccessRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Maps an extra listening port to a region of the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub port: u16,
    pub rect: Rect,
}

/// Ordered list of port mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMappingContainer {
    mappings: Vec<PortMapping>,
}

impl PortMappingContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mapping: PortMapping) {
        self.mappings.push(mapping);
    }

    pub fn remove(&mut self, index: usize) -> Option<PortMapping> {
        (index < self.mappings.len()).then(|| self.mappings.remove(index))
    }

    pub fn clear(&mut self) {
        self.mappings.clear();
    }

    /// Finds the mapping registered for `port`.
    pub fn find_by_port(&self, port: u16) -> Option<&PortMapping> {
        self.mappings.iter().find(|m| m.port == port)
    }

    pub fn mappings(&self) -> &[PortMapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
