use futures::channel::mpsc::UnboundedReceiver;
use vitals_monitor::device::constants::{TARGET, CLIENT_CHARACTERISTIC_CONFIGURATION, VITALS_DATA_CHARACTERISTIC, VITALS_SERVICE};
use vitals_monitor::device::session::Session;
use vitals_monitor::device::types::{
    AttemptEvent, DeviceId, DiscoveredCharacteristic, DiscoveredDevice, SessionEvent, SessionState,
    TransportEvent, TransportRequest, VitalsReading,
};
use uuid::Uuid;

fn deliver(session: &mut Session, event: TransportEvent) {
    let attempt = session.attempt();
    session.handle(AttemptEvent { attempt, event });
}

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut result = Vec::new();
    while let Ok(Some(event)) = events.try_next() {
        result.push(event);
    }
    result
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events.iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn device(id: &str, name: Option<&str>, low_energy: bool) -> DiscoveredDevice {
    DiscoveredDevice {
        id: DeviceId(id.to_string()),
        name: name.map(str::to_string),
        low_energy,
    }
}

fn target() -> DiscoveredDevice {
    device("AA:BB:CC:DD:EE:01", Some(TARGET.device_name), true)
}

fn vitals_characteristic() -> DiscoveredCharacteristic {
    DiscoveredCharacteristic {
        uuid: VITALS_DATA_CHARACTERISTIC,
        descriptors: vec![CLIENT_CHARACTERISTIC_CONFIGURATION],
    }
}

fn subscribe(session: &mut Session) {
    session.start_scan().unwrap();
    deliver(session, TransportEvent::DeviceDiscovered(target()));
    deliver(session, TransportEvent::Connected);
    deliver(session, TransportEvent::ServiceDiscovered(VITALS_SERVICE));
    deliver(session, TransportEvent::ServiceDiscoveryFinished(vec![VITALS_SERVICE]));
    deliver(session, TransportEvent::CharacteristicsReady(vec![vitals_characteristic()]));
}

#[test]
fn reaches_subscribed_through_every_stage_in_order() {
    let mut session = Session::new(TARGET);
    let mut first = session.subscribe();
    let mut second = session.subscribe();

    subscribe(&mut session);

    let expected = vec![
        SessionState::Scanning,
        SessionState::Connecting,
        SessionState::DiscoveringServices,
        SessionState::DiscoveringCharacteristics,
        SessionState::Subscribed,
    ];
    assert_eq!(states(&drain(&mut first)), expected);
    assert_eq!(states(&drain(&mut second)), expected);
    assert!(session.has_subscription());
}

#[test]
fn callbacks_from_a_later_stage_are_ignored() {
    let mut session = Session::new(TARGET);
    let mut events = session.subscribe();

    session.start_scan().unwrap();
    deliver(&mut session, TransportEvent::CharacteristicsReady(vec![vitals_characteristic()]));
    deliver(&mut session, TransportEvent::ServiceDiscoveryFinished(vec![VITALS_SERVICE]));
    deliver(&mut session, TransportEvent::Connected);
    deliver(&mut session, TransportEvent::Notification(b"37.5,120".to_vec()));

    assert_eq!(session.state(), SessionState::Scanning);
    assert_eq!(states(&drain(&mut events)), vec![SessionState::Scanning]);
    assert_eq!(session.latest_reading(), None);
}

#[test]
fn first_matching_candidate_wins() {
    let mut session = Session::new(TARGET);
    session.start_scan().unwrap();
    session.take_commands();

    deliver(&mut session, TransportEvent::DeviceDiscovered(device("1", Some("Headphones"), true)));
    deliver(&mut session, TransportEvent::DeviceDiscovered(device("2", None, true)));
    deliver(&mut session, TransportEvent::DeviceDiscovered(device("3", Some(TARGET.device_name), false)));
    assert_eq!(session.state(), SessionState::Scanning);

    deliver(&mut session, TransportEvent::DeviceDiscovered(target()));
    deliver(&mut session, TransportEvent::DeviceDiscovered(device("4", Some(TARGET.device_name), true)));
    deliver(&mut session, TransportEvent::Connected);

    assert_eq!(session.state(), SessionState::DiscoveringServices);
    let connects: Vec<_> = session.take_commands().into_iter()
        .filter_map(|command| match command.request {
            TransportRequest::Connect(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(connects, vec![target().id]);
}

#[test]
fn scan_without_match_reports_device_not_found() {
    let mut session = Session::new(TARGET);
    let mut events = session.subscribe();

    session.start_scan().unwrap();
    deliver(&mut session, TransportEvent::DeviceDiscovered(device("1", Some("Headphones"), true)));
    deliver(&mut session, TransportEvent::DiscoveryFinished);

    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.status().scanning);
    assert_eq!(session.status().message, "Scan finished. Device not found.");

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::ScanningChanged(true)));
    assert_eq!(events.last(), Some(&SessionEvent::StatusChanged("Scan finished. Device not found.".to_string())));
}

#[test]
fn notifications_while_subscribed() {
    let mut session = Session::new(TARGET);
    subscribe(&mut session);
    let mut events = session.subscribe();

    deliver(&mut session, TransportEvent::Notification(b"37.5,120".to_vec()));
    let expected = VitalsReading { temperature: 37.5, heart_rate: 120.0 };
    assert_eq!(drain(&mut events), vec![SessionEvent::VitalsUpdated(expected)]);

    deliver(&mut session, TransportEvent::Notification(b"abc,xyz".to_vec()));
    deliver(&mut session, TransportEvent::Notification(b"37.5".to_vec()));
    deliver(&mut session, TransportEvent::Notification(b"37.5,120,1".to_vec()));
    assert_eq!(drain(&mut events), vec![]);
    assert_eq!(session.state(), SessionState::Subscribed);
    assert_eq!(session.latest_reading(), Some(expected));
}

#[test]
fn absent_target_service_disconnects() {
    let mut session = Session::new(TARGET);
    session.start_scan().unwrap();
    deliver(&mut session, TransportEvent::DeviceDiscovered(target()));
    deliver(&mut session, TransportEvent::Connected);
    session.take_commands();

    let other_service = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
    deliver(&mut session, TransportEvent::ServiceDiscovered(other_service));
    deliver(&mut session, TransportEvent::ServiceDiscoveryFinished(vec![other_service]));

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.status().message, "Target service not found.");
    assert!(!session.has_connection());
    assert!(!session.has_service());
    let requests: Vec<_> = session.take_commands().into_iter().map(|command| command.request).collect();
    assert_eq!(requests, vec![TransportRequest::Disconnect]);
}

#[test]
fn disconnect_twice_from_subscribed() {
    let mut session = Session::new(TARGET);
    subscribe(&mut session);
    session.take_commands();

    session.disconnect();
    let state = (session.state(), session.status().clone());
    let first: Vec<_> = session.take_commands().into_iter().map(|command| command.request).collect();

    session.disconnect();
    let second = session.take_commands();

    assert_eq!(state.0, SessionState::Disconnected);
    assert_eq!((session.state(), session.status().clone()), state);
    assert_eq!(first, vec![TransportRequest::Disconnect]);
    assert!(second.is_empty());
    assert!(!session.has_connection() && !session.has_service() && !session.has_subscription());
}

#[test]
fn rescan_after_disconnect_ignores_the_old_link() {
    let mut session = Session::new(TARGET);
    subscribe(&mut session);
    let old_attempt = session.attempt();

    session.disconnect();
    session.start_scan().unwrap();
    let mut events = session.subscribe();

    // the transport confirms the old disconnect late and delivers a last notification
    session.handle(AttemptEvent { attempt: old_attempt, event: TransportEvent::Disconnected });
    session.handle(AttemptEvent { attempt: old_attempt, event: TransportEvent::Notification(b"36.6,110".to_vec()) });

    assert_eq!(session.state(), SessionState::Scanning);
    assert_eq!(drain(&mut events), vec![]);
}
