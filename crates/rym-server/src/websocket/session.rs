//! One client connection, from upgrade through disconnect.
//!
//! A session runs two loops. The reader watches for Pong frames and
//! disconnects when none arrives within `pong_wait`. The writer drains the
//! mailbox one frame per message and sends a Ping every `ping_interval`. The
//! loops share nothing but a stop token; the hub owns the mailbox sender, so
//! closing the mailbox is how the hub tells the writer to hang up.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::hub::{Frame, Hub, SessionEntry, SessionId};
use crate::auth::AuthUser;
use crate::config::SessionConfig;

/// Why the reader stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadEnd {
    /// Peer closed the connection.
    Closed,
    /// Transport error, including oversized frames.
    Failed,
    /// No Pong within the liveness window.
    TimedOut,
    /// The writer stopped first.
    Stopped,
}

/// Why the writer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteEnd {
    /// The hub closed the mailbox; a Close frame was sent.
    MailboxClosed,
    /// A frame could not be written within the write deadline.
    WriteFailed,
    /// The reader stopped first.
    Stopped,
}

/// Serve an upgraded socket for `user` until either side gives up.
#[instrument(skip_all, fields(session_id, user_id = %user.id))]
pub async fn run_session(socket: WebSocket, hub: Hub, user: AuthUser, config: SessionConfig) {
    let id = SessionId::next();
    let _ = tracing::Span::current().record("session_id", tracing::field::display(id));

    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(config.mailbox_capacity);
    let entry = SessionEntry {
        id,
        user_id: user.id,
        username: user.name,
        mailbox: tx,
    };
    if !hub.register(entry).await {
        warn!("session not registered, closing");
        return;
    }

    let stop = CancellationToken::new();
    let writer = tokio::spawn({
        let stop = stop.clone();
        async move {
            let end = write_loop(sink, rx, &config, &stop).await;
            stop.cancel();
            end
        }
    });

    let read_end = read_loop(stream, config.pong_wait, &stop).await;
    stop.cancel();
    hub.unregister(id).await;

    match writer.await {
        Ok(write_end) => info!(?read_end, ?write_end, "session ended"),
        Err(e) => warn!(?read_end, error = %e, "writer task failed"),
    }
}

/// Consume inbound frames until the peer goes away or goes quiet.
///
/// Only Pong frames refresh the deadline. Data frames carry no meaning and
/// are discarded.
pub async fn read_loop<S, E>(mut stream: S, pong_wait: Duration, stop: &CancellationToken) -> ReadEnd
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = stop.cancelled() => return ReadEnd::Stopped,
            () = &mut deadline => {
                info!(?pong_wait, "client unresponsive, disconnecting");
                return ReadEnd::TimedOut;
            }
            frame = stream.next() => match frame {
                None | Some(Ok(Message::Close(_))) => return ReadEnd::Closed,
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    return ReadEnd::Failed;
                }
                Some(Ok(Message::Pong(_))) => deadline.as_mut().reset(Instant::now() + pong_wait),
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Drain the mailbox into the socket, interleaving liveness pings.
pub async fn write_loop<S>(
    mut sink: S,
    mut mailbox: mpsc::Receiver<Frame>,
    config: &SessionConfig,
    stop: &CancellationToken,
) -> WriteEnd
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => return WriteEnd::Stopped,
            frame = mailbox.recv() => match frame {
                Some(text) => {
                    if let Err(e) = send(&mut sink, Message::Text((&*text).into()), config.write_wait).await {
                        warn!(error = %e, "failed to write message");
                        return WriteEnd::WriteFailed;
                    }
                }
                None => {
                    let _ = send(&mut sink, Message::Close(None), config.write_wait).await;
                    return WriteEnd::MailboxClosed;
                }
            },
            _ = ping.tick() => {
                if let Err(e) = send(&mut sink, Message::Ping(vec![].into()), config.write_wait).await {
                    debug!(error = %e, "failed to write ping");
                    return WriteEnd::WriteFailed;
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, message: Message, deadline: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write deadline of {deadline:?} exceeded")),
    }
}
