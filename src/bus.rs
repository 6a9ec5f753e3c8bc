use std::collections::HashMap;

use thiserror::Error;

/// Well-known bus name prefix shared by every MPRIS player.
pub const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
pub const MPRIS_OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
pub const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
const NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    /// The addressed player is no longer on the bus.
    #[error("no active player: {0}")]
    NoActivePlayer(String),
    #[error("bus call failed: {0}")]
    Transport(String),
}

impl BusError {
    /// Maps a D-Bus error name onto the two failure classes the session cares about.
    pub fn from_error_name(name: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match name {
            SERVICE_UNKNOWN | NAME_HAS_NO_OWNER => BusError::NoActivePlayer(detail),
            _ => BusError::Transport(format!("{name}: {detail}")),
        }
    }

    pub fn is_no_active_player(&self) -> bool {
        matches!(self, BusError::NoActivePlayer(_))
    }
}

/// Loosely typed property value as read off the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<BusValue>),
    Map(HashMap<String, BusValue>),
    Unsupported,
}

impl BusValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BusValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Int(value) => Some(*value as f64),
            BusValue::Float(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, BusValue>> {
        match self {
            BusValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Strings from a list value; a bare string counts as a one-element list.
    pub fn string_list(&self) -> Vec<&str> {
        match self {
            BusValue::Str(value) => vec![value.as_str()],
            BusValue::List(items) => items.iter().filter_map(BusValue::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// The three calls the session manager needs from a message bus.
pub trait MediaBus {
    fn list_service_names(&self) -> Result<Vec<String>, BusError>;

    fn get_property(
        &self,
        service: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError>;

    fn invoke_method(&self, service: &str, interface: &str, method: &str)
        -> Result<(), BusError>;
}
