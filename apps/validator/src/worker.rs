//! Validation worker: perform one dispatched check and send the signed
//! reply.
//!
//! Every request runs on its own task so overlapping probes never
//! serialize and a hung target cannot stall the inbound message loop or
//! the signup acknowledgement path.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use watchpost::crypto::{sign_message, KeyPair};
use watchpost::probe::Prober;
use watchpost::wire::{reply_message, HubFrame, ValidateRequest, ValidateReply};

/// Handle one `validate` request: probe, sign, reply over the same
/// connection.
///
/// A request that arrives before signup completes is still answered; the
/// reply simply carries no validator id.
pub async fn handle_validate(
    request: ValidateRequest,
    prober: Arc<Prober>,
    keypair: Arc<KeyPair>,
    validator_id: Arc<Mutex<Option<Uuid>>>,
    outbound_tx: mpsc::UnboundedSender<HubFrame>,
) {
    debug!("Validating {} for callback {}", request.url, request.callback_id);

    let outcome = prober.probe(&request.url).await;
    let signature = sign_message(&reply_message(request.callback_id), &keypair);
    let known_id = *validator_id.lock().unwrap_or_else(|e| e.into_inner());

    let reply = ValidateReply {
        callback_id: request.callback_id,
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        target_id: request.target_id,
        validator_id: known_id,
        signature,
    };

    debug!(
        "Probe of {} finished: {} ({}ms)",
        request.url, reply.status, reply.latency_ms
    );

    // Writer gone means the connection is being torn down; the reconnect
    // loop owns recovery.
    let _ = outbound_tx.send(HubFrame::Validate(reply));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use watchpost::crypto::{generate_keypair, verify_message};
    use watchpost::probe::TRANSPORT_ERROR_LATENCY_MS;
    use watchpost::wire::TickStatus;

    async fn one_shot_http_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{}", addr)
    }

    fn request(url: String) -> ValidateRequest {
        ValidateRequest { url, callback_id: Uuid::new_v4(), target_id: Uuid::new_v4() }
    }

    async fn run_worker(
        request: ValidateRequest,
        validator_id: Option<Uuid>,
    ) -> (ValidateReply, watchpost::crypto::keys::KeyPair) {
        let keypair = generate_keypair();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_validate(
            request,
            Arc::new(Prober::new(2).unwrap()),
            Arc::new(keypair.clone()),
            Arc::new(Mutex::new(validator_id)),
            tx,
        )
        .await;

        match rx.try_recv().unwrap() {
            HubFrame::Validate(reply) => (reply, keypair),
            other => panic!("expected validate reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_up_reply_is_signed() {
        let url = one_shot_http_server("200 OK").await;
        let validator_id = Uuid::new_v4();
        let req = request(url);
        let callback_id = req.callback_id;

        let (reply, keypair) = run_worker(req, Some(validator_id)).await;

        assert_eq!(reply.status, TickStatus::Up);
        assert_eq!(reply.validator_id, Some(validator_id));
        assert_eq!(reply.callback_id, callback_id);
        assert!(verify_message(
            &reply_message(callback_id),
            &keypair.public_key_hex(),
            &reply.signature
        ));
    }

    #[tokio::test]
    async fn test_non_200_replies_down() {
        let url = one_shot_http_server("404 Not Found").await;
        let (reply, _) = run_worker(request(url), Some(Uuid::new_v4())).await;

        assert_eq!(reply.status, TickStatus::Down);
        assert_ne!(reply.latency_ms, TRANSPORT_ERROR_LATENCY_MS);
    }

    #[tokio::test]
    async fn test_unreachable_target_replies_down_with_sentinel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (reply, _) = run_worker(request(format!("http://{}", addr)), Some(Uuid::new_v4())).await;

        assert_eq!(reply.status, TickStatus::Down);
        assert_eq!(reply.latency_ms, TRANSPORT_ERROR_LATENCY_MS);
    }

    #[tokio::test]
    async fn test_request_before_signup_still_answered() {
        let url = one_shot_http_server("200 OK").await;
        let (reply, keypair) = run_worker(request(url), None).await;

        // No id known yet, but the reply is still signed and sent
        assert_eq!(reply.validator_id, None);
        assert!(verify_message(
            &reply_message(reply.callback_id),
            &keypair.public_key_hex(),
            &reply.signature
        ));
    }
}
