//! Connection manager: the validator's persistent link to the hub.
//!
//! State machine: Disconnected → Connecting → SignedUp → Connected, back
//! to Disconnected on any close, then Connecting again after a fixed
//! backoff. There is no upper retry bound; a validator that outlives a hub
//! restart signs up again on its own.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use watchpost::callbacks::CallbackMap;
use watchpost::crypto::{sign_message, KeyPair};
use watchpost::probe::Prober;
use watchpost::wire::{signup_message, HubFrame, SignupAck, SignupRequest, ValidatorFrame};

use crate::worker;

/// Where the link currently stands. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connecting,
    SignedUp,
    Connected,
    Disconnected,
}

pub struct ConnectionManager {
    hub_url: String,
    network_address: String,
    backoff: Duration,
    keypair: Arc<KeyPair>,
    prober: Arc<Prober>,
    /// Confirmed by the hub's signup ack; survives reconnects so requests
    /// racing a re-signup still carry the last known identity.
    validator_id: Arc<Mutex<Option<Uuid>>>,
}

impl ConnectionManager {
    pub fn new(
        hub_url: String,
        network_address: String,
        backoff: Duration,
        keypair: KeyPair,
        prober: Prober,
    ) -> Self {
        Self {
            hub_url,
            network_address,
            backoff,
            keypair: Arc::new(keypair),
            prober: Arc::new(prober),
            validator_id: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the reconnect loop forever.
    pub async fn run(&self) {
        loop {
            info!("Connecting to hub at {}", self.hub_url);
            match self.run_session().await {
                Ok(()) => warn!("Connection to hub closed"),
                Err(err) => warn!("Connection to hub failed: {:#}", err),
            }
            debug!("State: {:?}, reconnecting in {:?}", LinkState::Disconnected, self.backoff);
            tokio::time::sleep(self.backoff).await;
        }
    }

    /// Drive one connection from open to close. Returns Ok on a clean
    /// close, Err on a transport failure; the caller reconnects either
    /// way.
    pub async fn run_session(&self) -> Result<()> {
        let mut state = LinkState::Connecting;
        debug!("State: {:?}", state);
        let (ws, _) = connect_async(self.hub_url.as_str())
            .await
            .context("websocket connect failed")?;
        let (mut sink, mut source) = ws.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<HubFrame>();
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

        // Signup is the one exchange the validator itself correlates.
        let pending_signups: CallbackMap<SignupAck> = CallbackMap::new();
        let signup_callback = Uuid::new_v4();
        let ack_rx = pending_signups.insert(signup_callback);
        self.send_signup(signup_callback, &outbound_tx)?;
        state = LinkState::SignedUp;
        debug!("State: {:?}, awaiting acknowledgement", state);

        let validator_id = Arc::clone(&self.validator_id);
        let mut ack_rx = Some(ack_rx);

        while let Some(message) = source.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    writer.abort();
                    return Err(err).context("websocket receive failed");
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let frame = match serde_json::from_str::<ValidatorFrame>(text.as_str()) {
                Ok(frame) => frame,
                Err(err) => {
                    debug!("Ignoring malformed frame from hub: {}", err);
                    continue;
                }
            };

            match frame {
                ValidatorFrame::Signup(ack) => {
                    if pending_signups.resolve(ack.callback_id, ack) {
                        if let Some(rx) = ack_rx.take() {
                            if let Ok(ack) = rx.await {
                                *validator_id.lock().unwrap_or_else(|e| e.into_inner()) =
                                    Some(ack.validator_id);
                                state = LinkState::Connected;
                                info!(
                                    "Registered with hub as validator {} (state: {:?})",
                                    ack.validator_id, state
                                );
                            }
                        }
                    } else {
                        debug!("Signup ack with unknown callback id, ignoring");
                    }
                }
                ValidatorFrame::Validate(request) => {
                    // Each check runs independently; a slow probe must not
                    // stall this loop.
                    tokio::spawn(worker::handle_validate(
                        request,
                        Arc::clone(&self.prober),
                        Arc::clone(&self.keypair),
                        Arc::clone(&self.validator_id),
                        outbound_tx.clone(),
                    ));
                }
            }
        }

        writer.abort();
        Ok(())
    }

    fn send_signup(
        &self,
        callback_id: Uuid,
        outbound_tx: &mpsc::UnboundedSender<HubFrame>,
    ) -> Result<()> {
        let public_key = self.keypair.public_key_hex();
        let signature = sign_message(&signup_message(callback_id, &public_key), &self.keypair);

        let request = SignupRequest {
            callback_id,
            network_address: self.network_address.clone(),
            public_key,
            signature,
        };

        outbound_tx
            .send(HubFrame::Signup(request))
            .map_err(|_| anyhow::anyhow!("writer closed before signup"))?;
        Ok(())
    }
}
