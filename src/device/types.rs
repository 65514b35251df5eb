use std::fmt;
use futures::channel::mpsc::{Sender, TrySendError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Subscribed,
    Disconnected,
    Error,
}

impl SessionState {
    /// States from which a new scan may be started.
    pub fn accepts_scan(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Disconnected | SessionState::Error)
    }

    /// States in which a connection has been requested or is established.
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::DiscoveringServices
                | SessionState::DiscoveringCharacteristics
                | SessionState::Subscribed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Connecting => "connecting",
            SessionState::DiscoveringServices => "discovering services",
            SessionState::DiscoveringCharacteristics => "discovering characteristics",
            SessionState::Subscribed => "subscribed",
            SessionState::Disconnected => "disconnected",
            SessionState::Error => "error",
        };

        write!(f, "{}", result)
    }
}

/// Identifies one scan/connect attempt. Transport traffic belonging to an older attempt is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttemptId(pub u64);

impl AttemptId {
    pub fn next(self) -> AttemptId {
        AttemptId(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    pub low_energy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalsReading {
    pub temperature: f64,
    pub heart_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub message: String,
    pub scanning: bool,
}

/// The part of the connection sequence a transport failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Connection,
    Subscription,
}

/// Output of the session, delivered to every observer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(String),
    ScanningChanged(bool),
    StateChanged(SessionState),
    VitalsUpdated(VitalsReading),
}

/// Fire-and-forget requests from the session to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    StartDiscovery,
    StopDiscovery,
    Connect(DeviceId),
    DiscoverServices,
    DiscoverCharacteristics(Uuid),
    EnableNotifications {
        characteristic: Uuid,
        descriptor: Uuid,
        value: [u8; 2],
    },
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCommand {
    pub attempt: AttemptId,
    pub request: TransportRequest,
}

/// Completions and notifications reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    DeviceDiscovered(DiscoveredDevice),
    DiscoveryFinished,
    Connected,
    Disconnected,
    ServiceDiscovered(Uuid),
    ServiceDiscoveryFinished(Vec<Uuid>),
    CharacteristicsReady(Vec<DiscoveredCharacteristic>),
    Notification(Vec<u8>),
    Failed {
        stage: Stage,
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptEvent {
    pub attempt: AttemptId,
    pub event: TransportEvent,
}

/// User initiated commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    StartScan,
    Disconnect,
}

/// Cloneable handle the presentation layer uses to drive the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(sender: Sender<SessionCommand>) -> Self {
        SessionHandle { sender }
    }

    pub fn request(&mut self, command: SessionCommand) -> Result<(), TrySendError<SessionCommand>> {
        self.sender.try_send(command)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Ready(SessionHandle),
    Session(SessionEvent),
}
