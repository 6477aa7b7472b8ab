// WebSocket server for draft clients.
//
// Each connection gets its own subscription to the engine's event channel.
// Only events for sessions the client has sent commands for are forwarded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use draftroom_engine::{ChannelSink, Envelope};
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::protocol::{encode_frame, ServerMessage};
use crate::router::CommandRouter;

/// Session ids a connection has addressed.
pub type Subscriptions = Mutex<HashSet<String>>;

/// Bind `127.0.0.1:{port}` and serve until the task is cancelled.
pub async fn run(port: u16, router: Arc<CommandRouter>, sink: ChannelSink) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    serve(listener, router, sink).await
}

/// Accept connections on an already bound listener. Each client is handled on
/// its own task.
pub async fn serve(listener: TcpListener, router: Arc<CommandRouter>, sink: ChannelSink) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        info!("Accepted TCP connection from {addr_str}");

        let router = Arc::clone(&router);
        let events = sink.subscribe();
        tokio::spawn(async move {
            handle_connection(stream, addr_str, router, events).await;
        });
    }
}

async fn handle_connection<S>(
    stream: S,
    addr: String,
    router: Arc<CommandRouter>,
    events: broadcast::Receiver<Envelope>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let subscriptions: Arc<Subscriptions> = Arc::default();

    let writer_addr = addr.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(frame.into())).await {
                warn!("Failed to write to {writer_addr}: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });
    let forwarder = tokio::spawn(forward_events(
        events,
        Arc::clone(&subscriptions),
        out_tx.clone(),
    ));

    let _ = process_message_stream(read, &router, &out_tx, &subscriptions, &addr).await;
    info!("Client {addr} disconnected");

    forwarder.abort();
    drop(out_tx);
    let _ = writer.await;
}

/// Forward engine events for subscribed sessions as encoded frames. Returns
/// when the event channel closes or the outbound channel is dropped.
pub async fn forward_events(
    mut events: broadcast::Receiver<Envelope>,
    subscriptions: Arc<Subscriptions>,
    out: mpsc::Sender<String>,
) {
    loop {
        match events.recv().await {
            Ok(envelope) => {
                let wanted = subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(&envelope.session_id);
                if !wanted {
                    continue;
                }
                let message = ServerMessage::from(envelope.event);
                match encode_frame(Some(&envelope.session_id), &message) {
                    Ok(frame) => {
                        if out.send(frame).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Failed to encode event for {}: {e}", envelope.session_id),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Client fell behind; skipped {skipped} events");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Process raw WebSocket [`Message`] items from any [`Stream`]: text frames
/// are parsed as commands, routed, and answered with a `COMMAND_RESULT`
/// frame through `out`. Returns `Err(())` if `out` is closed.
///
/// Generic over the stream type so it can be tested with in-memory streams.
pub async fn process_message_stream<St>(
    mut stream: St,
    router: &CommandRouter,
    out: &mpsc::Sender<String>,
    subscriptions: &Subscriptions,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let (session_id, result) = match router.parse(&text) {
                    Ok(cmd) => {
                        let session_id = cmd.session_id().to_string();
                        // Subscribe first so events caused by this command are delivered.
                        subscriptions
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(session_id.clone());
                        (Some(session_id), router.dispatch(cmd).await)
                    }
                    Err(result) => (None, result),
                };
                let frame = match encode_frame(session_id.as_deref(), &ServerMessage::CommandResult(result)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to encode command result for {addr}: {e}");
                        continue;
                    }
                };
                if out.send(frame).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}
