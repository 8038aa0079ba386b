//! Waiting on the event queue and the filesystem with bounded timeouts.

use pb_protocol::ipc::{Event, StageInstanceId};
use pb_protocol::EventReceiver;
use std::time::Duration;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Next event, failing the test if none arrives in time.
#[allow(dead_code)]
pub async fn next_event(rx: &mut EventReceiver) -> Event {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event queue closed")
}

/// Events for `instance` up to and including its `ProcessExited`.
#[allow(dead_code)]
pub async fn events_until_exit(rx: &mut EventReceiver, instance: StageInstanceId) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        if event.instance() != Some(instance) {
            continue;
        }
        let exited = matches!(event, Event::ProcessExited { .. });
        events.push(event);
        if exited {
            return events;
        }
    }
}

/// Poll `condition` until it holds, failing the test after `EVENT_TIMEOUT`.
#[allow(dead_code)]
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
