//! WebSocket server: one long-lived duplex connection per validator.
//!
//! Each accepted socket gets a reader loop plus a writer task fed by an
//! unbounded channel; connection handling never serializes behind another
//! connection. Inbound frames are signup attempts (verified, then
//! registered) or validation replies (routed into the callback map for the
//! dispatch-side handler to authenticate and persist).

use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use watchpost::callbacks::CallbackMap;
use watchpost::crypto::verify_message;
use watchpost::wire::{signup_message, HubFrame, SignupAck, SignupRequest, ValidateReply, ValidatorFrame};

use crate::database::Database;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Shared hub state handed to every connection task and the scheduler.
pub struct HubState {
    pub registry: Arc<ConnectionRegistry>,
    pub callbacks: Arc<CallbackMap<ValidateReply>>,
    pub database: Arc<dyn Database>,
}

/// Accept validator connections forever.
pub async fn run(listener: TcpListener, state: Arc<HubState>) {
    info!("Hub listening on {:?}", listener.local_addr().ok());

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Incoming connection from {}", addr);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, state).await {
                        debug!("Connection from {} ended: {:#}", addr, err);
                    }
                });
            }
            Err(err) => {
                warn!("Accept failed: {}", err);
            }
        }
    }
}

/// Drive one validator connection from handshake to disconnect.
async fn handle_connection(stream: TcpStream, state: Arc<HubState>) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    // Outbound frames (signup acks, validate requests) funnel through one
    // writer task so the dispatch scheduler and this reader never contend
    // on the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ValidatorFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Failed to encode outbound frame: {}", err);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Set once this connection completes a verified signup.
    let mut registration: Option<ConnectionId> = None;

    while let Some(message) = source.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!("Socket error: {}", err);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                match serde_json::from_str::<HubFrame>(text.as_str()) {
                    Ok(frame) => {
                        process_frame(&state, frame, &outbound_tx, &mut registration).await;
                    }
                    Err(err) => {
                        debug!("Ignoring malformed frame: {}", err);
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/pong answered by the protocol layer; binary ignored.
            _ => {}
        }
    }

    if let Some(connection_id) = registration {
        state.registry.unregister(connection_id);
    }
    writer.abort();
    Ok(())
}

/// Handle one inbound frame from a validator connection.
pub async fn process_frame(
    state: &HubState,
    frame: HubFrame,
    outbound_tx: &mpsc::UnboundedSender<ValidatorFrame>,
    registration: &mut Option<ConnectionId>,
) {
    match frame {
        HubFrame::Signup(request) => {
            handle_signup(state, request, outbound_tx, registration).await;
        }
        HubFrame::Validate(reply) => {
            // Route to the dispatch-side handler; unknown ids are quietly
            // dropped (orphaned, swept, or never ours).
            if !state.callbacks.resolve(reply.callback_id, reply) {
                debug!("Reply with no outstanding callback, dropping");
            }
        }
    }
}

/// Verify and register a signup attempt.
///
/// A signature that does not verify against the claimed public key gets no
/// response at all. A known public key is acked with the existing
/// validator id; signup is idempotent and never creates a duplicate row.
async fn handle_signup(
    state: &HubState,
    request: SignupRequest,
    outbound_tx: &mpsc::UnboundedSender<ValidatorFrame>,
    registration: &mut Option<ConnectionId>,
) {
    let message = signup_message(request.callback_id, &request.public_key);
    if !verify_message(&message, &request.public_key, &request.signature) {
        warn!("Invalid signup signature for key {}", request.public_key);
        return;
    }

    let validator = match state.database.find_validator_by_public_key(&request.public_key).await {
        Ok(Some(existing)) => {
            debug!("Validator already known: {}", existing.id);
            existing
        }
        Ok(None) => {
            match state
                .database
                .create_validator(&request.public_key, &request.network_address, "unknown")
                .await
            {
                Ok(created) => {
                    info!("Created validator {} for key {}", created.id, request.public_key);
                    created
                }
                Err(err) => {
                    warn!("Failed to create validator: {:#}", err);
                    return;
                }
            }
        }
        Err(err) => {
            warn!("Validator lookup failed: {:#}", err);
            return;
        }
    };

    let ack = SignupAck { validator_id: validator.id, callback_id: request.callback_id };
    if outbound_tx.send(ValidatorFrame::Signup(ack)).is_err() {
        return;
    }

    // Re-signup on a connection that is already registered just re-acks;
    // one registry entry per socket.
    if registration.is_none() {
        let connection_id = state.registry.register(
            validator.id,
            request.public_key.clone(),
            outbound_tx.clone(),
        );
        *registration = Some(connection_id);
        info!("Validator {} registered", validator.id);
    }
}
