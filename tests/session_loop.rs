use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::{channel, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vitals_monitor::device::connection::run_session_loop;
use vitals_monitor::device::constants::{TARGET, CLIENT_CHARACTERISTIC_CONFIGURATION, VITALS_DATA_CHARACTERISTIC, VITALS_SERVICE};
use vitals_monitor::device::session::Session;
use vitals_monitor::device::transport::Transport;
use vitals_monitor::device::types::{
    AttemptEvent, DeviceEvent, DeviceId, DiscoveredCharacteristic, DiscoveredDevice, SessionCommand, SessionEvent,
    SessionHandle, SessionState, TransportCommand, TransportEvent, TransportRequest, VitalsReading,
};

/// Answers every request the way a well behaved vitals peripheral would.
struct ScriptedTransport {
    events: Sender<AttemptEvent>,
    requests: Sender<TransportRequest>,
}

impl ScriptedTransport {
    fn reply(&mut self, command: &TransportCommand, event: TransportEvent) {
        self.events.try_send(AttemptEvent { attempt: command.attempt, event }).unwrap();
    }
}

impl Transport for ScriptedTransport {
    fn execute(&mut self, command: TransportCommand) {
        self.requests.try_send(command.request.clone()).unwrap();

        match &command.request {
            TransportRequest::StartDiscovery => self.reply(&command, TransportEvent::DeviceDiscovered(DiscoveredDevice {
                id: DeviceId("AA:BB:CC:DD:EE:01".to_string()),
                name: Some(TARGET.device_name.to_string()),
                low_energy: true,
            })),
            TransportRequest::Connect(_) => self.reply(&command, TransportEvent::Connected),
            TransportRequest::DiscoverServices => {
                self.reply(&command, TransportEvent::ServiceDiscoveryFinished(vec![VITALS_SERVICE]))
            },
            TransportRequest::DiscoverCharacteristics(_) => {
                self.reply(&command, TransportEvent::CharacteristicsReady(vec![DiscoveredCharacteristic {
                    uuid: VITALS_DATA_CHARACTERISTIC,
                    descriptors: vec![CLIENT_CHARACTERISTIC_CONFIGURATION],
                }]))
            },
            TransportRequest::EnableNotifications { .. } => {
                self.reply(&command, TransportEvent::Notification(b"37.5,120".to_vec()))
            },
            TransportRequest::StopDiscovery | TransportRequest::Disconnect => {},
        }
    }
}

struct Harness {
    handle: SessionHandle,
    output: Receiver<DeviceEvent>,
    requests: Receiver<TransportRequest>,
    cancel: CancellationToken,
    session_loop: JoinHandle<()>,
}

fn start() -> Harness {
    let (event_sender, event_receiver) = channel(64);
    let (request_sender, requests) = channel(64);
    let (command_sender, command_receiver) = channel::<SessionCommand>(64);
    let (output_sender, output) = channel::<DeviceEvent>(64);
    let cancel = CancellationToken::new();

    let transport = ScriptedTransport { events: event_sender, requests: request_sender };
    let session_loop = tokio::spawn(run_session_loop(
        Session::new(TARGET),
        transport,
        command_receiver,
        event_receiver,
        output_sender,
        cancel.clone(),
    ));

    Harness {
        handle: SessionHandle::new(command_sender),
        output,
        requests,
        cancel,
        session_loop,
    }
}

impl Harness {
    /// Collects session events until `stop` matches one, which is included.
    async fn events_until(&mut self, stop: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = self.output.next().await {
                if let DeviceEvent::Session(event) = event {
                    let done = stop(&event);
                    events.push(event);
                    if done {
                        return;
                    }
                }
            }
        }).await.unwrap();
        events
    }

    /// Stops the loop and returns every request the transport received.
    async fn shutdown(self) -> Vec<TransportRequest> {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.session_loop).await.unwrap().unwrap();
        drop(self.handle);
        self.requests.collect().await
    }
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events.iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn is_reading(event: &SessionEvent) -> bool {
    matches!(event, SessionEvent::VitalsUpdated(_))
}

#[tokio::test]
async fn scan_to_first_reading_and_shutdown() {
    let mut harness = start();
    harness.handle.request(SessionCommand::StartScan).unwrap();

    let events = harness.events_until(is_reading).await;

    assert_eq!(events.last(), Some(&SessionEvent::VitalsUpdated(VitalsReading { temperature: 37.5, heart_rate: 120.0 })));
    assert_eq!(states(&events), vec![
        SessionState::Idle,
        SessionState::Scanning,
        SessionState::Connecting,
        SessionState::DiscoveringServices,
        SessionState::DiscoveringCharacteristics,
        SessionState::Subscribed,
    ]);

    let requests = harness.shutdown().await;
    assert_eq!(requests.first(), Some(&TransportRequest::StartDiscovery));
    assert_eq!(requests.last(), Some(&TransportRequest::Disconnect));
}

#[tokio::test]
async fn scan_request_while_subscribed_is_reported() {
    let mut harness = start();
    harness.handle.request(SessionCommand::StartScan).unwrap();
    harness.events_until(is_reading).await;

    harness.handle.request(SessionCommand::StartScan).unwrap();
    let events = harness.events_until(|event| matches!(event, SessionEvent::StatusChanged(_))).await;

    assert_eq!(events, vec![SessionEvent::StatusChanged("Can not start a scan while subscribed".to_string())]);

    let requests = harness.shutdown().await;
    let discoveries = requests.iter().filter(|request| **request == TransportRequest::StartDiscovery).count();
    assert_eq!(discoveries, 1);
    assert_eq!(requests.last(), Some(&TransportRequest::Disconnect));
}
