//! Outbound HTTP probe performed by validation workers.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::wire::TickStatus;

/// Latency reported when the probe fails at the transport level (refused
/// connection, DNS failure, client timeout). HTTP-level failures report
/// measured elapsed time instead; transport errors report this fixed
/// sentinel. The asymmetry is inherited protocol behavior the hub's
/// consumers rely on, so it is kept rather than unified.
pub const TRANSPORT_ERROR_LATENCY_MS: u64 = 1000;

/// Outcome of one probe, ready to be signed and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: TickStatus,
    pub latency_ms: u64,
}

/// HTTP prober with a fixed client timeout.
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("watchpost/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Probe `url` with a GET and classify the outcome.
    ///
    /// Status 200 is `UP` with measured latency; any other status is `DOWN`
    /// with measured latency; a transport error is `DOWN` with the fixed
    /// sentinel latency.
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status = if response.status().as_u16() == 200 {
                    TickStatus::Up
                } else {
                    TickStatus::Down
                };
                ProbeOutcome { status, latency_ms }
            }
            Err(err) => {
                tracing::debug!("Probe transport error for {}: {}", url, err);
                ProbeOutcome { status: TickStatus::Down, latency_ms: TRANSPORT_ERROR_LATENCY_MS }
            }
        }
    }
}
