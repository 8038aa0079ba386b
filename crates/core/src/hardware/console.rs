//! Manual override console.
//!
//! Reads one command per line:
//! - `s`: start a visitor flow
//! - `b`: take the photo
//! - `q`: shut the kiosk down

use pb_protocol::ipc::Event;
use pb_protocol::stage_models::OverrideCommand;
use pb_protocol::EventSender;
use std::pin::Pin;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Turn console input into events.
///
/// Blank lines are skipped and unknown commands logged. The stream ends
/// after a quit command or at end of input.
pub fn override_commands<R>(reader: R) -> Pin<Box<dyn Stream<Item = Event> + Send>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Console read failed");
                    break;
                }
            };

            let command = line.trim();
            if command.is_empty() {
                continue;
            }

            if command.eq_ignore_ascii_case("q") || command.eq_ignore_ascii_case("quit") {
                yield Event::Shutdown;
                break;
            }

            match OverrideCommand::from_console(command) {
                Some(command) => yield Event::ManualOverride(command),
                None => info!(command, "Unknown console command (s = start, b = capture, q = quit)"),
            }
        }
    };

    Box::pin(stream)
}

/// Forward console commands onto the event queue until input ends.
pub async fn forward_console<R>(reader: R, tx: EventSender)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut commands = override_commands(reader);
    while let Some(event) = commands.next().await {
        debug!(?event, "Console command");
        if tx.send(event).await.is_err() {
            return;
        }
    }
    debug!("Console input closed");
}
