use std::fmt;

use crate::cast::PlayerState;
use crate::session::SessionState;

/// Default TCP port of the Cast control channel.
pub const DEFAULT_CAST_PORT: u16 = 8009;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A receiver reported by discovery.
///
/// The registry owns the entry; everyone else works on clones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub friendly_name: String,
    pub host: String,
    pub port: u16,
    pub model_name: Option<String>,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        friendly_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: DeviceId(id.into()),
            friendly_name: friendly_name.into(),
            host: host.into(),
            port,
            model_name: None,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Discovery intensity.
///
/// `Passive` is the resting mode; `Active` is meant for the time a device
/// picker is on screen.
///
/// Both modes send mDNS queries: `Passive` only spaces them out
/// (`MdnsSettings::passive_interval`, 30 s by default) instead of going
/// silent, so receivers that never announce spontaneously still show up
/// and presence expiry keeps working. `Active` queries every
/// `MdnsSettings::active_interval`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ScanMode {
    #[default]
    Passive,
    Active,
}

/// Restricts discovery to receivers able to run a given application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub receiver_app_id: String,
}

impl DiscoveryFilter {
    pub fn for_application(receiver_app_id: impl Into<String>) -> Self {
        Self {
            receiver_app_id: receiver_app_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryEvent {
    DeviceAppeared(Device),
    DeviceDisappeared(Device),
}

/// Correlates a dispatcher call with its `QueueLoadResult` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(pub u64);

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueLoadOutcome {
    /// The receiver accepted the load and reported its media session.
    Loaded { media_session_id: Option<i64> },
    /// The receiver or the transport refused the load.
    Failed(String),
    /// A newer load replaced this one before it completed.
    Superseded,
    /// The session went away while the load was in flight.
    Cancelled,
    /// The load never left the client.
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    QueueLoadResult {
        load_id: LoadId,
        outcome: QueueLoadOutcome,
    },
    PlaybackToggled {
        state: PlayerState,
    },
}
