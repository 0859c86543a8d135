//! Metrics collection for the poll/alarm/uplink pipeline
//!
//! This module provides counters about polling, encoding, alarm handling
//! and radio transmissions.

use crate::session::TxOutcome;

/// Pipeline statistics collector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineMetrics {
    /// Targets read successfully
    pub poll_successes: u64,
    /// Targets whose read failed
    pub poll_failures: u64,
    /// Targets skipped for lack of a connection
    pub poll_skips: u64,
    /// Completed poll cycles
    pub poll_cycles: u64,
    /// Bulk uplinks encoded
    pub bulk_uplinks: u64,
    /// Bulk frames queued for transmission
    pub frames_queued: u64,
    /// Frames handed to the radio
    pub frames_sent: u64,
    /// Bytes handed to the radio
    pub bytes_sent: u64,
    /// Rising edges (fieldbus and input)
    pub alarms_raised: u64,
    /// Alarm notifications handed to the radio
    pub alarms_sent: u64,
    /// Transmissions acknowledged
    pub tx_acked: u64,
    /// Transmissions completed without acknowledgment
    pub tx_unacked: u64,
    /// Transmissions abandoned on timeout
    pub tx_timeouts: u64,
    /// Transmissions refused by the session or link
    pub tx_rejected: u64,
    /// Ticks whose uplink work was skipped while unjoined
    pub unjoined_ticks: u64,
    /// Queued bulk frames dropped before they were sent
    pub stale_frames_dropped: u64,
}

impl PipelineMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one poll cycle: targets read, failed and skipped
    pub fn record_poll_cycle(&mut self, succeeded: usize, failed: usize, skipped: usize) {
        self.poll_cycles += 1;
        self.poll_successes += succeeded as u64;
        self.poll_failures += failed as u64;
        self.poll_skips += skipped as u64;
    }

    /// Record a frame handed to the radio
    pub fn record_sent(&mut self, bytes: usize, alarm: bool) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
        if alarm {
            self.alarms_sent += 1;
        }
    }

    /// Record how a transmission ended
    pub fn record_outcome(&mut self, outcome: TxOutcome) {
        match outcome {
            TxOutcome::Acked => self.tx_acked += 1,
            TxOutcome::Unacked => self.tx_unacked += 1,
            TxOutcome::TimedOut => self.tx_timeouts += 1,
        }
    }

    /// Fraction of attempted reads that succeeded (0.0 - 1.0)
    pub fn poll_success_rate(&self) -> f64 {
        let total = self.poll_successes + self.poll_failures + self.poll_skips;
        if total == 0 {
            return 0.0;
        }
        self.poll_successes as f64 / total as f64
    }

    /// Fraction of finished transmissions that were acknowledged (0.0 - 1.0)
    pub fn ack_rate(&self) -> f64 {
        let total = self.tx_acked + self.tx_unacked + self.tx_timeouts;
        if total == 0 {
            return 0.0;
        }
        self.tx_acked as f64 / total as f64
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Fieldlink Pipeline Metrics ===\n\n");

        report.push_str(&format!("Poll cycles: {}\n", self.poll_cycles));
        report.push_str(&format!(
            "Reads: {} ok, {} failed, {} skipped ({:.1}% ok)\n",
            self.poll_successes,
            self.poll_failures,
            self.poll_skips,
            self.poll_success_rate() * 100.0
        ));
        report.push_str(&format!(
            "Bulk uplinks: {} ({} frames queued, {} dropped stale)\n",
            self.bulk_uplinks, self.frames_queued, self.stale_frames_dropped
        ));
        report.push_str(&format!(
            "Alarms: {} raised, {} sent\n",
            self.alarms_raised, self.alarms_sent
        ));
        report.push_str(&format!(
            "Frames sent: {} ({} bytes)\n",
            self.frames_sent, self.bytes_sent
        ));
        report.push_str(&format!(
            "Transmissions: {} acked, {} unacked, {} timed out, {} rejected\n",
            self.tx_acked, self.tx_unacked, self.tx_timeouts, self.tx_rejected
        ));
        if self.unjoined_ticks > 0 {
            report.push_str(&format!("Ticks while unjoined: {}\n", self.unjoined_ticks));
        }

        report
    }
}
