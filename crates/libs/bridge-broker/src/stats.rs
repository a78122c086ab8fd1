use std::sync::atomic::{AtomicU64, Ordering};

use bridge_ipc::ParticipantId;
use serde::{Deserialize, Serialize};

use crate::error::RejectReason;

/// Per-participant bookkeeping, returned by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub registered_at: i64,
    pub last_activity: i64,
    pub sent_count: u64,
    pub received_count: u64,
    pub queued: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectionCounts {
    pub payload_too_large: u64,
    pub rate_limited: u64,
    pub receiver_not_found: u64,
    pub sender_not_found: u64,
    pub permission_denied: u64,
    pub blocked: u64,
    pub queue_full: u64,
    pub duplicate_request: u64,
}

/// Point-in-time view of broker activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerStats {
    pub registered_participants: usize,
    pub pending_requests: usize,
    pub queued_messages: usize,
    /// Requests admitted onto a receiver queue.
    pub sent: u64,
    /// Requests resolved by a response.
    pub delivered: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    /// `respond` calls that found no live waiter.
    pub late_responses: u64,
    pub rejected: RejectionCounts,
}

#[derive(Debug, Default)]
pub(crate) struct BrokerCounters {
    sent: AtomicU64,
    delivered: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    late_responses: AtomicU64,
    payload_too_large: AtomicU64,
    rate_limited: AtomicU64,
    receiver_not_found: AtomicU64,
    sender_not_found: AtomicU64,
    permission_denied: AtomicU64,
    blocked: AtomicU64,
    queue_full: AtomicU64,
    duplicate_request: AtomicU64,
}

impl BrokerCounters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late_response(&self) {
        self.late_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::PayloadTooLarge => &self.payload_too_large,
            RejectReason::RateLimited => &self.rate_limited,
            RejectReason::ReceiverNotFound => &self.receiver_not_found,
            RejectReason::SenderNotFound => &self.sender_not_found,
            RejectReason::PermissionDenied => &self.permission_denied,
            RejectReason::Blocked => &self.blocked,
            RejectReason::QueueFull => &self.queue_full,
            RejectReason::DuplicateRequest => &self.duplicate_request,
            RejectReason::Timeout => &self.timed_out,
            RejectReason::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.sent,
            &self.delivered,
            &self.timed_out,
            &self.cancelled,
            &self.late_responses,
            &self.payload_too_large,
            &self.rate_limited,
            &self.receiver_not_found,
            &self.sender_not_found,
            &self.permission_denied,
            &self.blocked,
            &self.queue_full,
            &self.duplicate_request,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(
        &self,
        registered_participants: usize,
        pending_requests: usize,
        queued_messages: usize,
    ) -> BrokerStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        BrokerStats {
            registered_participants,
            pending_requests,
            queued_messages,
            sent: load(&self.sent),
            delivered: load(&self.delivered),
            timed_out: load(&self.timed_out),
            cancelled: load(&self.cancelled),
            late_responses: load(&self.late_responses),
            rejected: RejectionCounts {
                payload_too_large: load(&self.payload_too_large),
                rate_limited: load(&self.rate_limited),
                receiver_not_found: load(&self.receiver_not_found),
                sender_not_found: load(&self.sender_not_found),
                permission_denied: load(&self.permission_denied),
                blocked: load(&self.blocked),
                queue_full: load(&self.queue_full),
                duplicate_request: load(&self.duplicate_request),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_land_in_their_bucket() {
        let counters = BrokerCounters::default();
        counters.record_failure(RejectReason::RateLimited);
        counters.record_failure(RejectReason::RateLimited);
        counters.record_failure(RejectReason::Timeout);
        counters.record_failure(RejectReason::Blocked);
        counters.record_sent();

        let stats = counters.snapshot(2, 0, 0);
        assert_eq!(stats.rejected.rate_limited, 2);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.rejected.blocked, 1);
        assert_eq!(stats.rejected.permission_denied, 0);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.registered_participants, 2);

        counters.reset();
        assert_eq!(counters.snapshot(0, 0, 0), BrokerStats::default());
    }

    #[test]
    fn stats_serialize_as_flat_json() {
        let json = serde_json::to_value(BrokerStats::default()).expect("serialize stats");
        assert_eq!(json["rejected"]["queue_full"], 0);
        assert_eq!(json["late_responses"], 0);
    }
}
