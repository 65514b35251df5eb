use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::Sender;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{DISCONNECT_DEADLINE, ENABLE_NOTIFICATION_VALUE};
use crate::device::types::{
    AttemptEvent, AttemptId, DeviceId, DiscoveredCharacteristic, DiscoveredDevice, Stage, TransportCommand,
    TransportEvent, TransportRequest,
};
use crate::error::DeviceError;

/// Executes session requests. Implementations must not block: completions are reported later as
/// [`AttemptEvent`]s tagged with the attempt of the command that caused them.
pub trait Transport {
    fn execute(&mut self, command: TransportCommand);
}

type DeviceMap = Arc<Mutex<HashMap<DeviceId, (Adapter, Peripheral)>>>;

struct Link<P> {
    attempt: AttemptId,
    peripheral: P,
    cancel: CancellationToken,
}

/// The current connection, shared with the task that watches it so a dropped peer is forgotten.
#[derive(Clone)]
struct LinkSlot<P> {
    link: Arc<Mutex<Option<Link<P>>>>,
}

impl<P: Clone> LinkSlot<P> {
    fn new() -> Self {
        LinkSlot { link: Arc::new(Mutex::new(None)) }
    }

    fn install(&self, link: Link<P>) {
        *self.link.lock().expect("Failed to lock link") = Some(link);
    }

    fn take(&self) -> Option<Link<P>> {
        self.link.lock().expect("Failed to lock link").take()
    }

    fn get(&self, attempt: AttemptId) -> Option<(P, CancellationToken)> {
        match &*self.link.lock().expect("Failed to lock link") {
            Some(link) if link.attempt == attempt => Some((link.peripheral.clone(), link.cancel.clone())),
            _ => None,
        }
    }

    /// Forgets the link of `attempt` and stops its tasks. A newer link is left alone.
    fn release(&self, attempt: AttemptId) -> bool {
        let mut slot = self.link.lock().expect("Failed to lock link");
        match slot.take() {
            Some(link) if link.attempt == attempt => {
                link.cancel.cancel();
                true
            },
            other => {
                *slot = other;
                false
            },
        }
    }
}

/// [`Transport`] backed by the platform Bluetooth stack through btleplug.
pub struct BtleTransport {
    manager: Manager,
    events: Sender<AttemptEvent>,
    scan_timeout: Duration,
    scan_cancel: Option<CancellationToken>,
    devices: DeviceMap,
    links: LinkSlot<Peripheral>,
    // the last disconnect, a new connect waits for it
    pending_disconnect: Option<JoinHandle<()>>,
}

async fn post(events: &mut Sender<AttemptEvent>, attempt: AttemptId, event: TransportEvent) {
    if let Err(err) = events.send(AttemptEvent { attempt, event }).await {
        debug!("Session loop is gone, dropping transport event: {}", err);
    }
}

async fn post_failure(events: &mut Sender<AttemptEvent>, attempt: AttemptId, stage: Stage, err: DeviceError) {
    warn!("{:?} failed: {:?}", stage, err);
    post(events, attempt, TransportEvent::Failed { stage, detail: err.to_string() }).await;
}

fn device_id(id: &PeripheralId) -> DeviceId {
    DeviceId(format!("{:?}", id))
}

async fn describe_peripheral(adapter: &Adapter, id: &PeripheralId) -> Result<(DiscoveredDevice, Peripheral), DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    let name = peripheral.properties().await?.and_then(|properties| properties.local_name);

    let device = DiscoveredDevice {
        id: device_id(id),
        name,
        // btleplug only reports low energy peripherals
        low_energy: true,
    };
    Ok((device, peripheral))
}

async fn stop_scan(adapter: &Adapter) {
    if let Err(err) = adapter.stop_scan().await {
        warn!("Failed to stop scanning: {:?}", err);
    }
}

async fn scan(
    manager: Manager,
    devices: DeviceMap,
    mut events: Sender<AttemptEvent>,
    attempt: AttemptId,
    scan_timeout: Duration,
    cancel: CancellationToken,
) -> Result<(), DeviceError> {
    let adapter = manager.adapters().await?
        .into_iter()
        .next()
        .ok_or(DeviceError::NoAdapter)?;

    info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
    let mut central_events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;

    let deadline = sleep(scan_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                stop_scan(&adapter).await;
                return Ok(());
            },
            _ = &mut deadline => {
                info!("Scan window closed");
                stop_scan(&adapter).await;
                post(&mut events, attempt, TransportEvent::DiscoveryFinished).await;
                return Ok(());
            },
            event = central_events.next() => match event {
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    match describe_peripheral(&adapter, &id).await {
                        Ok((device, peripheral)) => {
                            devices.lock()
                                .expect("Failed to lock discovered devices")
                                .insert(device.id.clone(), (adapter.clone(), peripheral));
                            post(&mut events, attempt, TransportEvent::DeviceDiscovered(device)).await;
                        },
                        Err(err) => warn!("Could not query peripheral for properties: {:?}", err),
                    }
                },
                Some(_) => {},
                None => {
                    warn!("Adapter event stream ended");
                    post(&mut events, attempt, TransportEvent::DiscoveryFinished).await;
                    return Ok(());
                },
            },
        }
    }
}

async fn disconnect_peripheral(peripheral: Peripheral) {
    tokio::select! {
        _ = sleep(Duration::from_millis(DISCONNECT_DEADLINE)) => {
            warn!("Disconnecting from peripheral took too long");
        }
        result = peripheral.disconnect() => {
            match result {
                Ok(()) => info!("Disconnected from peripheral"),
                Err(err) => warn!("Failed to disconnect from peripheral: {:?}", err),
            }
        }
    };
}

/// Runs `connect` unless `cancel` fires first. Returns whether the link may be used.
///
/// The platform can finish a connect after it was abandoned, so every cancelled attempt ends with
/// `undo`.
async fn connect_unless_cancelled<C, U, F>(connect: C, cancel: &CancellationToken, undo: U) -> Result<bool, DeviceError>
where
    C: Future<Output = Result<(), DeviceError>>,
    U: FnOnce() -> F,
    F: Future<Output = ()>,
{
    let connected = tokio::select! {
        _ = cancel.cancelled() => false,
        result = connect => {
            result?;
            true
        },
    };

    if connected && !cancel.is_cancelled() {
        return Ok(true);
    }

    info!("Connect was cancelled");
    undo().await;
    Ok(false)
}

async fn connect_and_watch(
    adapter: Adapter,
    peripheral: Peripheral,
    mut events: Sender<AttemptEvent>,
    attempt: AttemptId,
    cancel: CancellationToken,
    links: LinkSlot<Peripheral>,
) -> Result<(), DeviceError> {
    info!("Connecting to peripheral...");
    // subscribe before connecting so an early drop is not missed
    let mut central_events = adapter.events().await?;

    let connect = async { peripheral.connect().await.map_err(DeviceError::from) };
    if !connect_unless_cancelled(connect, &cancel, || disconnect_peripheral(peripheral.clone())).await? {
        return Ok(());
    }

    post(&mut events, attempt, TransportEvent::Connected).await;

    let id = peripheral.id();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            event = central_events.next() => match event {
                Some(CentralEvent::DeviceDisconnected(disconnected)) if disconnected == id => {
                    warn!("Connection lost");
                    links.release(attempt);
                    post(&mut events, attempt, TransportEvent::Disconnected).await;
                    return Ok(());
                },
                Some(_) => {},
                None => return Ok(()),
            },
        }
    }
}

async fn discover_services(peripheral: &Peripheral, events: &mut Sender<AttemptEvent>, attempt: AttemptId) -> Result<(), DeviceError> {
    info!("Discovering services...");
    peripheral.discover_services().await?;

    let mut uuids = Vec::new();
    for service in peripheral.services() {
        post(events, attempt, TransportEvent::ServiceDiscovered(service.uuid)).await;
        uuids.push(service.uuid);
    }

    post(events, attempt, TransportEvent::ServiceDiscoveryFinished(uuids)).await;
    Ok(())
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral.characteristics().into_iter().find(|characteristic| characteristic.uuid == uuid)
}

async fn read_notifications(
    peripheral: Peripheral,
    characteristic: Uuid,
    descriptor: Uuid,
    value: [u8; 2],
    mut events: Sender<AttemptEvent>,
    attempt: AttemptId,
    cancel: CancellationToken,
) -> Result<(), DeviceError> {
    let data_char = find_characteristic(&peripheral, characteristic)
        .ok_or(DeviceError::MissingCharacteristic)?;

    let mut notification_stream = peripheral.notifications().await?;

    if value == ENABLE_NOTIFICATION_VALUE {
        // btleplug writes the client characteristic configuration itself and routes the updates
        peripheral.subscribe(&data_char).await?;
    }
    else {
        let descriptor = data_char.descriptors.iter()
            .find(|d| d.uuid == descriptor)
            .ok_or(DeviceError::MissingCharacteristic)?;
        peripheral.write_descriptor(descriptor, &value).await?;
    }

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            data = notification_stream.next() => match data {
                Some(data) => {
                    if data.uuid.eq(&characteristic) {
                        post(&mut events, attempt, TransportEvent::Notification(data.value)).await;
                    }
                },
                None => break 'mainloop,
            },
        }
    }

    Ok(())
}

impl BtleTransport {
    pub async fn new(events: Sender<AttemptEvent>, scan_timeout: Duration) -> Result<Self, DeviceError> {
        let manager = Manager::new().await?;

        Ok(BtleTransport {
            manager,
            events,
            scan_timeout,
            scan_cancel: None,
            devices: Arc::new(Mutex::new(HashMap::new())),
            links: LinkSlot::new(),
            pending_disconnect: None,
        })
    }

    fn start_discovery(&mut self, attempt: AttemptId) {
        self.stop_discovery();
        self.devices.lock().expect("Failed to lock discovered devices").clear();

        let cancel = CancellationToken::new();
        self.scan_cancel = Some(cancel.clone());

        let manager = self.manager.clone();
        let devices = self.devices.clone();
        let events = self.events.clone();
        let scan_timeout = self.scan_timeout;

        spawn(async move {
            let mut failure_events = events.clone();
            if let Err(err) = scan(manager, devices, events, attempt, scan_timeout, cancel).await {
                post_failure(&mut failure_events, attempt, Stage::Discovery, err).await;
            }
        });
    }

    fn stop_discovery(&mut self) {
        if let Some(cancel) = self.scan_cancel.take() {
            cancel.cancel();
        }
    }

    fn connect(&mut self, attempt: AttemptId, id: DeviceId) {
        self.disconnect();
        let teardown = self.pending_disconnect.take();

        let entry = self.devices.lock()
            .expect("Failed to lock discovered devices")
            .get(&id)
            .cloned();

        let mut events = self.events.clone();
        let Some((adapter, peripheral)) = entry else {
            spawn(async move {
                post_failure(&mut events, attempt, Stage::Connection, DeviceError::UnknownDevice(id.0)).await;
            });
            return;
        };

        let cancel = CancellationToken::new();
        self.links.install(Link { attempt, peripheral: peripheral.clone(), cancel: cancel.clone() });
        let links = self.links.clone();

        spawn(async move {
            // the previous link has to be gone before the adapter connects again
            if let Some(teardown) = teardown {
                if let Err(err) = teardown.await {
                    warn!("Disconnect task failed: {:?}", err);
                }
            }

            let mut failure_events = events.clone();
            if let Err(err) = connect_and_watch(adapter, peripheral, events, attempt, cancel, links).await {
                post_failure(&mut failure_events, attempt, Stage::Connection, err).await;
            }
        });
    }

    /// Returns the linked peripheral, or reports that there is none.
    fn linked(&self, attempt: AttemptId, stage: Stage) -> Option<(Peripheral, CancellationToken)> {
        let linked = self.links.get(attempt);
        if linked.is_none() {
            let mut events = self.events.clone();
            spawn(async move {
                post_failure(&mut events, attempt, stage, DeviceError::NotConnected).await;
            });
        }
        linked
    }

    fn discover_services(&mut self, attempt: AttemptId) {
        let Some((peripheral, cancel)) = self.linked(attempt, Stage::Connection) else { return; };
        let mut events = self.events.clone();

        spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = discover_services(&peripheral, &mut events, attempt) => result,
            };
            if let Err(err) = result {
                post_failure(&mut events, attempt, Stage::Connection, err).await;
            }
        });
    }

    fn discover_characteristics(&mut self, attempt: AttemptId, service_uuid: Uuid) {
        let Some((peripheral, _)) = self.linked(attempt, Stage::Subscription) else { return; };
        let mut events = self.events.clone();

        spawn(async move {
            let service = peripheral.services().into_iter().find(|service| service.uuid == service_uuid);
            let Some(service) = service else {
                post_failure(&mut events, attempt, Stage::Subscription, DeviceError::MissingService).await;
                return;
            };

            let characteristics = service.characteristics.iter()
                .map(|characteristic| DiscoveredCharacteristic {
                    uuid: characteristic.uuid,
                    descriptors: characteristic.descriptors.iter().map(|d| d.uuid).collect(),
                })
                .collect();
            post(&mut events, attempt, TransportEvent::CharacteristicsReady(characteristics)).await;
        });
    }

    fn enable_notifications(&mut self, attempt: AttemptId, characteristic: Uuid, descriptor: Uuid, value: [u8; 2]) {
        let Some((peripheral, cancel)) = self.linked(attempt, Stage::Subscription) else { return; };
        let events = self.events.clone();

        spawn(async move {
            let mut failure_events = events.clone();
            let result = read_notifications(peripheral, characteristic, descriptor, value, events, attempt, cancel).await;
            if let Err(err) = result {
                post_failure(&mut failure_events, attempt, Stage::Subscription, err).await;
            }
        });
    }

    fn disconnect(&mut self) {
        let Some(link) = self.links.take() else { return; };
        link.cancel.cancel();

        self.pending_disconnect = Some(spawn(disconnect_peripheral(link.peripheral)));
    }
}

impl Transport for BtleTransport {
    fn execute(&mut self, command: TransportCommand) {
        debug!("Transport request {:?}", command);
        let attempt = command.attempt;

        match command.request {
            TransportRequest::StartDiscovery => self.start_discovery(attempt),
            TransportRequest::StopDiscovery => self.stop_discovery(),
            TransportRequest::Connect(id) => self.connect(attempt, id),
            TransportRequest::DiscoverServices => self.discover_services(attempt),
            TransportRequest::DiscoverCharacteristics(service) => self.discover_characteristics(attempt, service),
            TransportRequest::EnableNotifications { characteristic, descriptor, value } => {
                self.enable_notifications(attempt, characteristic, descriptor, value)
            },
            TransportRequest::Disconnect => self.disconnect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use super::*;

    fn link(attempt: u64) -> Link<&'static str> {
        Link { attempt: AttemptId(attempt), peripheral: "vitals", cancel: CancellationToken::new() }
    }

    #[tokio::test]
    async fn connect_that_is_not_cancelled_is_kept() {
        let cancel = CancellationToken::new();
        let undone = Cell::new(0);

        let result = connect_unless_cancelled(async { Ok::<(), DeviceError>(()) }, &cancel, || async { undone.set(undone.get() + 1) }).await;

        assert!(matches!(result, Ok(true)));
        assert_eq!(undone.get(), 0);
    }

    #[tokio::test]
    async fn cancel_before_connect_finishes_is_undone() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let undone = Cell::new(0);

        let result = connect_unless_cancelled(
            futures::future::pending(),
            &cancel,
            || async { undone.set(undone.get() + 1) },
        ).await;

        assert!(matches!(result, Ok(false)));
        assert_eq!(undone.get(), 1);
    }

    #[tokio::test]
    async fn connect_completing_after_cancel_is_undone() {
        let cancel = CancellationToken::new();
        let undone = Cell::new(0);

        // the user disconnects while the platform is still connecting
        let connect = async {
            cancel.cancel();
            Ok::<(), DeviceError>(())
        };
        let result = connect_unless_cancelled(connect, &cancel, || async { undone.set(undone.get() + 1) }).await;

        assert!(matches!(result, Ok(false)));
        assert_eq!(undone.get(), 1);
    }

    #[tokio::test]
    async fn failed_connect_is_reported() {
        let cancel = CancellationToken::new();
        let undone = Cell::new(0);

        let result = connect_unless_cancelled(
            async { Err(DeviceError::NoAdapter) },
            &cancel,
            || async { undone.set(undone.get() + 1) },
        ).await;

        assert!(matches!(result, Err(DeviceError::NoAdapter)));
        assert_eq!(undone.get(), 0);
    }

    #[test]
    fn peer_drop_releases_only_its_own_link() {
        let links = LinkSlot::new();
        let first = link(1);
        let first_cancel = first.cancel.clone();
        links.install(first);

        assert!(!links.release(AttemptId(2)));
        assert!(links.get(AttemptId(1)).is_some());

        assert!(links.release(AttemptId(1)));
        assert!(first_cancel.is_cancelled());
        assert!(links.get(AttemptId(1)).is_none());
        assert!(links.take().is_none());
    }

    #[test]
    fn released_link_is_not_disconnected_again() {
        let links = LinkSlot::new();
        links.install(link(1));

        // the peer went away, then the session reconnects
        links.release(AttemptId(1));
        assert!(links.take().is_none());

        let second = link(2);
        let second_cancel = second.cancel.clone();
        links.install(second);
        assert!(!links.release(AttemptId(1)));
        assert!(!second_cancel.is_cancelled());
        assert_eq!(links.get(AttemptId(2)).map(|(peripheral, _)| peripheral), Some("vitals"));
    }
}
