//! Dispatch scheduler: periodic fan-out of check requests to every live
//! validator for every active target.
//!
//! Each (target, validator) pair gets its own callback id and its own
//! spawned reply handler. Redundancy is the availability strategy: every
//! validator checks every target, there is no load balancing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use watchpost::callbacks::CallbackMap;
use watchpost::crypto::verify_message;
use watchpost::wire::{reply_message, ValidateReply, ValidateRequest, ValidatorFrame};

use crate::database::{Database, TargetRecord, TickRecord};
use crate::registry::{ConnectionEntry, ConnectionRegistry};

pub struct DispatchScheduler {
    registry: Arc<ConnectionRegistry>,
    callbacks: Arc<CallbackMap<ValidateReply>>,
    database: Arc<dyn Database>,
    payout_per_check: i64,
    period: Duration,
    callback_ttl: Duration,
}

impl DispatchScheduler {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        callbacks: Arc<CallbackMap<ValidateReply>>,
        database: Arc<dyn Database>,
        payout_per_check: i64,
        period: Duration,
        callback_ttl: Duration,
    ) -> Self {
        Self { registry, callbacks, database, payout_per_check, period, callback_ttl }
    }

    /// Run the scheduler forever: one dispatch pass plus one callback
    /// sweep per period.
    pub async fn run(self: Arc<Self>) {
        let mut timer = interval(self.period);

        loop {
            timer.tick().await;

            let swept = self.callbacks.sweep(self.callback_ttl);
            if swept > 0 {
                debug!("Reclaimed {} orphaned callback entries", swept);
            }

            match self.run_pass().await {
                Ok(0) => {}
                Ok(sent) => info!("Dispatched {} validation requests", sent),
                Err(err) => error!("Dispatch pass failed: {:#}", err),
            }
        }
    }

    /// One scheduler pass. Returns the number of requests sent.
    ///
    /// Empty target list or empty validator pool is a quiet no-op, not an
    /// error.
    pub async fn run_pass(&self) -> anyhow::Result<usize> {
        let targets = self.database.find_active_targets().await?;
        if targets.is_empty() {
            debug!("No active targets to monitor");
            return Ok(0);
        }

        let validators = self.registry.snapshot();
        if validators.is_empty() {
            debug!("No validators connected");
            return Ok(0);
        }

        let mut sent = 0;
        for target in &targets {
            for validator in &validators {
                if self.dispatch_one(target, validator) {
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }

    /// Send one check request and arm its reply handler. Returns whether
    /// the request was handed to the connection's writer.
    fn dispatch_one(&self, target: &TargetRecord, validator: &ConnectionEntry) -> bool {
        let callback_id = Uuid::now_v7();
        let rx = self.callbacks.insert(callback_id);

        let request = ValidateRequest {
            url: target.url.clone(),
            callback_id,
            target_id: target.id,
        };

        if validator.sender.send(ValidatorFrame::Validate(request)).is_err() {
            // Writer already gone; the sweep reclaims the entry we just armed.
            debug!("Validator {} writer closed, skipping dispatch", validator.validator_id);
            return false;
        }

        let database = Arc::clone(&self.database);
        let payout = self.payout_per_check;
        let target_id = target.id;
        let validator = validator.clone();
        tokio::spawn(async move {
            handle_reply(rx, callback_id, target_id, validator, database, payout).await;
        });
        true
    }
}

/// Await one reply and, if it authenticates, persist it.
///
/// Authenticity is bound to the connection the request was dispatched to:
/// the signature must verify against the public key confirmed at that
/// connection's signup, and the identity embedded in the reply must match
/// the dispatched-to validator. The embedded fields are never trusted on
/// their own.
async fn handle_reply(
    rx: oneshot::Receiver<ValidateReply>,
    callback_id: Uuid,
    target_id: Uuid,
    validator: ConnectionEntry,
    database: Arc<dyn Database>,
    payout: i64,
) {
    let Ok(reply) = rx.await else {
        // Swept or shut down before the validator answered.
        debug!("Callback {} expired unresolved", callback_id);
        return;
    };

    if !verify_message(&reply_message(callback_id), &validator.public_key, &reply.signature) {
        warn!(
            "Signature verification failed for reply from validator {}",
            validator.validator_id
        );
        return;
    }

    if reply.validator_id != Some(validator.validator_id) {
        warn!(
            "Reply identity {:?} does not match dispatched validator {}",
            reply.validator_id, validator.validator_id
        );
        return;
    }

    if reply.target_id != target_id {
        warn!("Reply target {} does not match dispatched target {}", reply.target_id, target_id);
        return;
    }

    let tick = TickRecord::new(target_id, validator.validator_id, reply.status, reply.latency_ms);
    debug!(
        "Saving tick for target {} from validator {} ({}, {}ms)",
        target_id, validator.validator_id, reply.status, reply.latency_ms
    );

    // No retry on persistence failure: the reply is lost and the next
    // scheduler pass produces fresh work.
    if let Err(err) = database.record_tick_and_increment_payout(&tick, payout).await {
        error!("Failed to persist tick for callback {}: {:#}", callback_id, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use watchpost::crypto::{generate_keypair, sign_message, KeyPair};
    use watchpost::wire::TickStatus;

    use crate::database::{TargetRecord, ValidatorRecord};

    /// In-memory stand-in for the persistence gateway.
    #[derive(Default)]
    struct MockDatabase {
        targets: Mutex<Vec<TargetRecord>>,
        ticks: Mutex<Vec<TickRecord>>,
        payouts: Mutex<Vec<(Uuid, i64)>>,
        fail_persistence: bool,
    }

    impl MockDatabase {
        fn with_targets(targets: Vec<TargetRecord>) -> Self {
            Self { targets: Mutex::new(targets), ..Default::default() }
        }
    }

    #[async_trait]
    impl Database for MockDatabase {
        async fn find_validator_by_public_key(&self, _: &str) -> Result<Option<ValidatorRecord>> {
            Ok(None)
        }

        async fn find_validator(&self, _: Uuid) -> Result<Option<ValidatorRecord>> {
            Ok(None)
        }

        async fn create_validator(&self, _: &str, _: &str, _: &str) -> Result<ValidatorRecord> {
            unimplemented!("not exercised by dispatch tests")
        }

        async fn find_active_targets(&self) -> Result<Vec<TargetRecord>> {
            Ok(self.targets.lock().unwrap().clone())
        }

        async fn create_target(&self, _: &str) -> Result<TargetRecord> {
            unimplemented!("not exercised by dispatch tests")
        }

        async fn set_target_disabled(&self, _: Uuid, _: bool) -> Result<()> {
            Ok(())
        }

        async fn record_tick_and_increment_payout(
            &self,
            tick: &TickRecord,
            amount: i64,
        ) -> Result<()> {
            if self.fail_persistence {
                anyhow::bail!("simulated storage outage");
            }
            // Mirrors the transactional contract: both or neither.
            self.ticks.lock().unwrap().push(tick.clone());
            self.payouts.lock().unwrap().push((tick.validator_id, amount));
            Ok(())
        }

        async fn recent_ticks(&self, _: Uuid, _: usize) -> Result<Vec<TickRecord>> {
            Ok(self.ticks.lock().unwrap().clone())
        }
    }

    fn target(url: &str) -> TargetRecord {
        TargetRecord {
            id: Uuid::new_v4(),
            url: url.into(),
            disabled: false,
            created_at: std::time::SystemTime::now(),
        }
    }

    struct Harness {
        scheduler: Arc<DispatchScheduler>,
        registry: Arc<ConnectionRegistry>,
        callbacks: Arc<CallbackMap<ValidateReply>>,
        database: Arc<MockDatabase>,
    }

    fn harness(database: MockDatabase) -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let callbacks = Arc::new(CallbackMap::new());
        let database = Arc::new(database);
        let scheduler = Arc::new(DispatchScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&callbacks),
            Arc::clone(&database) as Arc<dyn Database>,
            100,
            Duration::from_secs(60),
            Duration::from_secs(120),
        ));
        Harness { scheduler, registry, callbacks, database }
    }

    fn connect_validator(
        registry: &ConnectionRegistry,
        keypair: &KeyPair,
    ) -> (Uuid, mpsc::UnboundedReceiver<ValidatorFrame>) {
        let validator_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(validator_id, keypair.public_key_hex(), tx);
        (validator_id, rx)
    }

    fn signed_reply(
        request: &ValidateRequest,
        validator_id: Option<Uuid>,
        keypair: &KeyPair,
    ) -> ValidateReply {
        ValidateReply {
            callback_id: request.callback_id,
            status: TickStatus::Up,
            latency_ms: 120,
            target_id: request.target_id,
            validator_id,
            signature: sign_message(&reply_message(request.callback_id), keypair),
        }
    }

    fn sent_request(rx: &mut mpsc::UnboundedReceiver<ValidatorFrame>) -> ValidateRequest {
        match rx.try_recv().unwrap() {
            ValidatorFrame::Validate(req) => req,
            other => panic!("expected validate request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fanout_is_targets_times_validators() {
        let h = harness(MockDatabase::with_targets(vec![
            target("https://a.example.com"),
            target("https://b.example.com"),
        ]));
        let kp = generate_keypair();
        let (_, mut rx1) = connect_validator(&h.registry, &kp);
        let (_, mut rx2) = connect_validator(&h.registry, &kp);
        let (_, mut rx3) = connect_validator(&h.registry, &kp);

        let sent = h.scheduler.run_pass().await.unwrap();
        assert_eq!(sent, 6); // 2 targets x 3 validators
        assert_eq!(h.callbacks.len(), 6);

        // Every request carries a distinct callback id
        let mut ids = HashSet::new();
        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            for _ in 0..2 {
                ids.insert(sent_request(rx).callback_id);
            }
        }
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn test_no_targets_is_quiet_noop() {
        let h = harness(MockDatabase::default());
        let kp = generate_keypair();
        connect_validator(&h.registry, &kp);

        assert_eq!(h.scheduler.run_pass().await.unwrap(), 0);
        assert!(h.callbacks.is_empty());
    }

    #[tokio::test]
    async fn test_no_validators_is_quiet_noop() {
        let h = harness(MockDatabase::with_targets(vec![target("https://a.example.com")]));
        assert_eq!(h.scheduler.run_pass().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_verified_reply_persists_tick_and_payout() {
        let h = harness(MockDatabase::with_targets(vec![target("https://a.example.com")]));
        let kp = generate_keypair();
        let (validator_id, mut rx) = connect_validator(&h.registry, &kp);

        h.scheduler.run_pass().await.unwrap();
        let request = sent_request(&mut rx);

        let reply = signed_reply(&request, Some(validator_id), &kp);
        assert!(h.callbacks.resolve(request.callback_id, reply));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ticks = h.database.ticks.lock().unwrap().clone();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].validator_id, validator_id);
        assert_eq!(ticks[0].status, TickStatus::Up);
        assert_eq!(ticks[0].latency_ms, 120);
        assert_eq!(*h.database.payouts.lock().unwrap(), vec![(validator_id, 100)]);
    }

    #[tokio::test]
    async fn test_forged_signature_persists_nothing() {
        let h = harness(MockDatabase::with_targets(vec![target("https://a.example.com")]));
        let kp = generate_keypair();
        let (validator_id, mut rx) = connect_validator(&h.registry, &kp);

        h.scheduler.run_pass().await.unwrap();
        let request = sent_request(&mut rx);

        // Signed by a key that is not the one on file for the connection
        let impostor = generate_keypair();
        let reply = signed_reply(&request, Some(validator_id), &impostor);
        h.callbacks.resolve(request.callback_id, reply);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(h.database.ticks.lock().unwrap().is_empty());
        assert!(h.database.payouts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_identity_persists_nothing() {
        let h = harness(MockDatabase::with_targets(vec![target("https://a.example.com")]));
        let kp = generate_keypair();
        let (_, mut rx) = connect_validator(&h.registry, &kp);

        h.scheduler.run_pass().await.unwrap();
        let request = sent_request(&mut rx);

        // Valid signature, but the embedded identity claims someone else
        let reply = signed_reply(&request, Some(Uuid::new_v4()), &kp);
        h.callbacks.resolve(request.callback_id, reply);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(h.database.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_drops_reply() {
        let h = harness(MockDatabase {
            targets: Mutex::new(vec![target("https://a.example.com")]),
            fail_persistence: true,
            ..Default::default()
        });
        let kp = generate_keypair();
        let (validator_id, mut rx) = connect_validator(&h.registry, &kp);

        h.scheduler.run_pass().await.unwrap();
        let request = sent_request(&mut rx);
        h.callbacks.resolve(request.callback_id, signed_reply(&request, Some(validator_id), &kp));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Dropped, logged, nothing applied, nothing retried
        assert!(h.database.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_validator_excluded_from_next_pass() {
        let h = harness(MockDatabase::with_targets(vec![target("https://a.example.com")]));
        let kp = generate_keypair();
        let (_, _rx) = connect_validator(&h.registry, &kp);
        let snapshot = h.registry.snapshot();

        assert_eq!(h.scheduler.run_pass().await.unwrap(), 1);

        h.registry.unregister(snapshot[0].connection_id);
        assert_eq!(h.scheduler.run_pass().await.unwrap(), 0);

        // The orphaned entry from the first pass is gone after a sweep
        assert_eq!(h.callbacks.sweep(Duration::ZERO), 1);
    }
}
