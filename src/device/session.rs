use std::collections::VecDeque;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::device::constants::{TargetIdentity, CLIENT_CHARACTERISTIC_CONFIGURATION, ENABLE_NOTIFICATION_VALUE};
use crate::device::parser::parse_vitals;
use crate::device::types::{
    AttemptEvent, AttemptId, DeviceId, DiscoveredCharacteristic, DiscoveredDevice, SessionEvent, SessionState,
    SessionStatus, Stage, TransportCommand, TransportEvent, TransportRequest, VitalsReading,
};
use crate::error::SessionError;

const STATUS_READY: &str = "Ready to scan.";
const STATUS_DISCONNECTED: &str = "Disconnected. Ready to scan.";

/// Fan-out of session events. Delivery happens inside the handler call that produced the event;
/// observer queues are unbounded so a slow reader never loses an event.
#[derive(Default)]
struct Observers {
    senders: Vec<UnboundedSender<SessionEvent>>,
}

impl Observers {
    fn subscribe(&mut self) -> UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = unbounded();
        self.senders.push(sender);
        receiver
    }

    fn emit(&mut self, event: SessionEvent) {
        // the only possible failure is a dropped receiver
        self.senders.retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }
}

/// The BLE session state machine.
///
/// The session performs no IO. Operations queue [`TransportCommand`]s which the owner drains with
/// [`Session::take_commands`] and hands to a transport; the transport reports back through
/// [`Session::handle`].
pub struct Session {
    target: TargetIdentity,
    state: SessionState,
    status: SessionStatus,
    attempt: AttemptId,

    // held from Connecting until teardown
    peer: Option<DeviceId>,
    // held only in DiscoveringCharacteristics and Subscribed
    service: Option<Uuid>,
    // held only in Subscribed
    subscription: Option<Uuid>,

    latest_reading: Option<VitalsReading>,
    commands: VecDeque<TransportCommand>,
    observers: Observers,
}

impl Session {
    pub fn new(target: TargetIdentity) -> Self {
        Session {
            target,
            state: SessionState::Idle,
            status: SessionStatus {
                message: STATUS_READY.to_string(),
                scanning: false,
            },
            attempt: AttemptId::default(),
            peer: None,
            service: None,
            subscription: None,
            latest_reading: None,
            commands: VecDeque::new(),
            observers: Observers::default(),
        }
    }

    /// Every event emitted after this call is queued on the returned receiver until it is read.
    pub fn subscribe(&mut self) -> UnboundedReceiver<SessionEvent> {
        self.observers.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn latest_reading(&self) -> Option<VitalsReading> {
        self.latest_reading
    }

    pub fn has_connection(&self) -> bool {
        self.peer.is_some()
    }

    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn take_commands(&mut self) -> Vec<TransportCommand> {
        self.commands.drain(..).collect()
    }

    pub fn start_scan(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Scanning {
            debug!("Already scanning");
            return Ok(());
        }

        if !self.state.accepts_scan() {
            let err = SessionError::Busy { state: self.state };
            self.set_status(err.to_string());
            return Err(err);
        }

        self.teardown();
        self.attempt = self.attempt.next();

        self.set_status(format!("Scanning for {}...", self.target.device_name));
        self.set_scanning(true);
        self.set_state(SessionState::Scanning);
        self.request(TransportRequest::StartDiscovery);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.teardown();
        self.set_state(SessionState::Disconnected);
        self.set_status(STATUS_DISCONNECTED);
    }

    /// Routes a transport event to its handler, dropping events of a previous attempt.
    pub fn handle(&mut self, event: AttemptEvent) {
        if event.attempt != self.attempt {
            debug!("Dropping stale event of attempt {:?}: {:?}", event.attempt, event.event);
            return;
        }

        match event.event {
            TransportEvent::DeviceDiscovered(candidate) => self.on_device_discovered(&candidate),
            TransportEvent::DiscoveryFinished => self.on_discovery_finished(),
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::ServiceDiscovered(uuid) => self.on_service_discovered(uuid),
            TransportEvent::ServiceDiscoveryFinished(services) => self.on_service_discovery_finished(&services),
            TransportEvent::CharacteristicsReady(characteristics) => self.on_characteristics_ready(&characteristics),
            TransportEvent::Notification(payload) => self.on_notification(&payload),
            TransportEvent::Failed { stage, detail } => self.on_transport_error(stage, detail),
        }
    }

    pub fn on_device_discovered(&mut self, candidate: &DiscoveredDevice) {
        if self.state != SessionState::Scanning {
            return;
        }

        let name_matches = candidate.name.as_deref() == Some(self.target.device_name);
        if !name_matches || !candidate.low_energy {
            debug!("Ignoring peripheral {} {:?}", candidate.id, candidate.name);
            return;
        }

        info!("Found target peripheral {}", candidate.id);
        self.set_status("Target found. Connecting...");
        self.request(TransportRequest::StopDiscovery);
        self.set_scanning(false);

        self.peer = Some(candidate.id.clone());
        self.set_state(SessionState::Connecting);
        self.request(TransportRequest::Connect(candidate.id.clone()));
    }

    pub fn on_discovery_finished(&mut self) {
        if self.state != SessionState::Scanning {
            return;
        }

        self.set_scanning(false);
        self.set_state(SessionState::Idle);
        self.set_status("Scan finished. Device not found.");
    }

    pub fn on_connected(&mut self) {
        if self.state != SessionState::Connecting {
            debug!("Ignoring connected event while {}", self.state);
            return;
        }

        self.set_state(SessionState::DiscoveringServices);
        self.set_status("Connected. Discovering services...");
        self.request(TransportRequest::DiscoverServices);
    }

    pub fn on_service_discovered(&mut self, uuid: Uuid) {
        if self.state == SessionState::DiscoveringServices && uuid == self.target.service {
            self.set_status("Target service found.");
        }
    }

    pub fn on_service_discovery_finished(&mut self, services: &[Uuid]) {
        if self.state != SessionState::DiscoveringServices {
            debug!("Ignoring service discovery result while {}", self.state);
            return;
        }

        if !services.contains(&self.target.service) {
            warn!("Peripheral does not offer service {}", self.target.service);
            self.set_status("Target service not found.");
            self.teardown();
            self.set_state(SessionState::Disconnected);
            return;
        }

        self.service = Some(self.target.service);
        self.set_state(SessionState::DiscoveringCharacteristics);
        self.set_status("Service details discovered.");
        self.request(TransportRequest::DiscoverCharacteristics(self.target.service));
    }

    pub fn on_characteristics_ready(&mut self, characteristics: &[DiscoveredCharacteristic]) {
        if self.state != SessionState::DiscoveringCharacteristics {
            debug!("Ignoring characteristics while {}", self.state);
            return;
        }

        self.set_status("Subscribing to characteristic...");

        let data_char = characteristics.iter().find(|c| c.uuid == self.target.characteristic);
        let Some(data_char) = data_char else {
            self.fail(SessionError::MissingCharacteristic);
            return;
        };

        if !data_char.descriptors.contains(&CLIENT_CHARACTERISTIC_CONFIGURATION) {
            warn!("Characteristic {} has no notification descriptor", data_char.uuid);
            self.set_status("Warning: Cannot subscribe (CCCD not found).");
            return;
        }

        info!("Subscribing to characteristic {}", data_char.uuid);
        self.request(TransportRequest::EnableNotifications {
            characteristic: data_char.uuid,
            descriptor: CLIENT_CHARACTERISTIC_CONFIGURATION,
            value: ENABLE_NOTIFICATION_VALUE,
        });
        self.subscription = Some(data_char.uuid);
        self.set_state(SessionState::Subscribed);
        self.set_status("Subscribed successfully. Waiting for data...");
    }

    pub fn on_notification(&mut self, payload: &[u8]) {
        if self.state != SessionState::Subscribed {
            debug!("Ignoring notification while {}", self.state);
            return;
        }

        match parse_vitals(payload) {
            Ok(reading) => {
                debug!("Vitals: {:?}", reading);
                self.latest_reading = Some(reading);
                self.observers.emit(SessionEvent::VitalsUpdated(reading));
            },
            Err(err) => warn!("{} ({:?})", err, String::from_utf8_lossy(payload)),
        }
    }

    pub fn on_transport_error(&mut self, stage: Stage, detail: impl Into<String>) {
        self.fail(SessionError::from_stage(stage, detail));
    }

    pub fn on_disconnected(&mut self) {
        if self.peer.is_none() && !self.state.is_linked() {
            debug!("Ignoring disconnected event while {}", self.state);
            return;
        }

        info!("Peripheral disconnected");
        // the link is already gone, so only local resources are released
        self.peer = None;
        self.release();
        self.set_state(SessionState::Disconnected);
        if !self.status.scanning {
            self.set_status(STATUS_DISCONNECTED);
        }
    }

    fn fail(&mut self, error: SessionError) {
        match error.stage() {
            Some(stage) => warn!("Session failed during {:?}: {}", stage, error),
            None => warn!("Session failed: {}", error),
        }
        self.teardown();
        self.set_state(SessionState::Error);
        self.set_status(error.to_string());
    }

    /// Stops any discovery and releases every transport resource. Safe to call repeatedly.
    fn teardown(&mut self) {
        if self.status.scanning {
            self.request(TransportRequest::StopDiscovery);
            self.set_scanning(false);
        }

        if let Some(peer) = self.peer.take() {
            info!("Releasing connection to {}", peer);
            self.request(TransportRequest::Disconnect);
        }

        self.release();
    }

    fn release(&mut self) {
        self.service = None;
        self.subscription = None;
        // anything the transport still reports for the released attempt is stale
        self.attempt = self.attempt.next();
    }

    fn request(&mut self, request: TransportRequest) {
        self.commands.push_back(TransportCommand { attempt: self.attempt, request });
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Session {} -> {}", self.state, state);
            self.state = state;
            self.observers.emit(SessionEvent::StateChanged(state));
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.status.message != message {
            self.status.message = message.clone();
            self.observers.emit(SessionEvent::StatusChanged(message));
        }
    }

    fn set_scanning(&mut self, scanning: bool) {
        if self.status.scanning != scanning {
            self.status.scanning = scanning;
            self.observers.emit(SessionEvent::ScanningChanged(scanning));
        }
    }
}
