use std::convert::Infallible;
use std::time::Duration;
use iced::subscription::{self, Subscription};
use futures::{StreamExt, SinkExt};
use futures::channel::mpsc::{channel, Receiver, Sender, UnboundedReceiver};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::device::constants::{TARGET, EVENT_CHANNEL_SIZE};
use crate::device::session::Session;
use crate::device::transport::{BtleTransport, Transport};
use crate::device::types::{AttemptEvent, DeviceEvent, SessionCommand, SessionEvent, SessionHandle};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub scan_timeout: Duration,
}

async fn forward(output: &mut Sender<DeviceEvent>, event: SessionEvent) {
    if let Err(err) = output.send(DeviceEvent::Session(event)).await {
        debug!("Nobody is listening for session events: {}", err);
    }
}

/// Hands queued requests to the transport and session events to the gui.
async fn flush<T: Transport>(
    session: &mut Session,
    transport: &mut T,
    session_events: &mut UnboundedReceiver<SessionEvent>,
    output: &mut Sender<DeviceEvent>,
) {
    for command in session.take_commands() {
        transport.execute(command);
    }

    while let Ok(Some(event)) = session_events.try_next() {
        forward(output, event).await;
    }
}

/// Serially feeds user commands and transport events into the session until `cancel` fires.
///
/// This is the only place the session is touched, so its handlers never run concurrently.
pub async fn run_session_loop<T: Transport>(
    mut session: Session,
    mut transport: T,
    mut commands: Receiver<SessionCommand>,
    mut transport_events: Receiver<AttemptEvent>,
    mut output: Sender<DeviceEvent>,
    cancel: CancellationToken,
) {
    let mut session_events = session.subscribe();

    forward(&mut output, SessionEvent::StatusChanged(session.status().message.clone())).await;
    forward(&mut output, SessionEvent::StateChanged(session.state())).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing BLE session");
                session.disconnect();
                flush(&mut session, &mut transport, &mut session_events, &mut output).await;
                return;
            },
            Some(command) = commands.next() => match command {
                SessionCommand::StartScan => {
                    // the session reports the refusal through its status line
                    if let Err(err) = session.start_scan() {
                        warn!("{}", err);
                    }
                },
                SessionCommand::Disconnect => session.disconnect(),
            },
            Some(event) = transport_events.next() => session.handle(event),
        }

        flush(&mut session, &mut transport, &mut session_events, &mut output).await;
    }
}

async fn run_session(options: SessionOptions, cancel: CancellationToken, mut output: Sender<DeviceEvent>) -> Infallible {
    let (command_sender, command_receiver) = channel::<SessionCommand>(EVENT_CHANNEL_SIZE);
    let (event_sender, event_receiver) = channel::<AttemptEvent>(EVENT_CHANNEL_SIZE);

    if let Err(err) = output.send(DeviceEvent::Ready(SessionHandle::new(command_sender))).await {
        warn!("Failed to hand out the session handle: {}", err);
    }

    match BtleTransport::new(event_sender, options.scan_timeout).await {
        Ok(transport) => {
            let session = Session::new(TARGET);
            run_session_loop(session, transport, command_receiver, event_receiver, output, cancel).await;
        },
        Err(err) => {
            error!("Failed to initialize bluetooth: {:?}", err);
            forward(&mut output, SessionEvent::StatusChanged(format!("Bluetooth unavailable: {}", err))).await;
        },
    }

    // note: subscription::channel expects the future to never resolve (Infallible)
    futures::future::pending().await
}

pub fn session_subscription(options: SessionOptions, cancel: CancellationToken) -> Subscription<DeviceEvent> {
    struct Connect;

    subscription::channel(
        std::any::TypeId::of::<Connect>(),
        EVENT_CHANNEL_SIZE,
        move |output| run_session(options, cancel, output),
    )
}
