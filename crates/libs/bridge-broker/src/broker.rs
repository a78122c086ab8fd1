use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bridge_ipc::{now_epoch_ms, Message, ParticipantId, Response};
use tokio::sync::oneshot;

use crate::access::{AccessPolicy, MessageFilter, Permissions};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::pending::{PendingGuard, PendingRequests, Resolution};
use crate::queue::MessageQueue;
use crate::rate_limit::RateLimiter;
use crate::stats::{BrokerCounters, BrokerStats, ParticipantInfo};

struct Participant {
    queue: Mutex<MessageQueue>,
    info: Mutex<ParticipantInfo>,
}

impl Participant {
    fn new(participant_id: &str, queue_capacity: usize) -> Self {
        let now = now_epoch_ms();
        Self {
            queue: Mutex::new(MessageQueue::new(queue_capacity)),
            info: Mutex::new(ParticipantInfo {
                participant_id: participant_id.to_string(),
                registered_at: now,
                last_activity: now,
                ..ParticipantInfo::default()
            }),
        }
    }

    fn touch(&self, update: impl FnOnce(&mut ParticipantInfo)) {
        let mut info = self.info.lock().expect("participant info mutex poisoned");
        update(&mut info);
        info.last_activity = now_epoch_ms();
    }
}

/// Request/response broker between registered participants.
///
/// The registry lock is the coarse lock: registration changes and the
/// validate, install-waiter, enqueue sequence of `send` run under it, so a
/// request's waiter always exists before the receiver can drain the message.
/// Queue drains and rate-window pruning only take their participant's lock.
/// No lock is held while `send` waits for its response.
///
/// The access policy starts from the config and survives `unregister` and
/// `clear`, so permissions can be granted before a participant registers.
pub struct MessageBroker {
    config: BrokerConfig,
    registry: Mutex<HashMap<ParticipantId, Arc<Participant>>>,
    access: RwLock<AccessPolicy>,
    rate_limiter: RateLimiter,
    pending: PendingRequests,
    counters: BrokerCounters,
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    pub fn with_config(config: BrokerConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit, config.rate_window());
        let access = AccessPolicy::new(config.permissions.clone(), config.filters.clone());
        Self {
            config,
            registry: Mutex::new(HashMap::new()),
            access: RwLock::new(access),
            rate_limiter,
            pending: PendingRequests::default(),
            counters: BrokerCounters::default(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Register a participant. Returns `false` if it is already registered.
    pub fn register(&self, participant_id: &str) -> bool {
        let mut registry = self.registry.lock().expect("broker registry mutex poisoned");
        if registry.contains_key(participant_id) {
            log::debug!("broker: {participant_id} is already registered");
            return false;
        }
        registry.insert(
            participant_id.to_string(),
            Arc::new(Participant::new(participant_id, self.config.queue_capacity)),
        );
        self.rate_limiter.track(participant_id);
        log::info!("broker: registered {participant_id}");
        true
    }

    /// Remove a participant's queue and rate state. Requests already in flight
    /// to or from it are left to time out.
    pub fn unregister(&self, participant_id: &str) {
        let mut registry = self.registry.lock().expect("broker registry mutex poisoned");
        if registry.remove(participant_id).is_some() {
            self.rate_limiter.forget(participant_id);
            log::info!("broker: unregistered {participant_id}");
        }
    }

    pub fn is_registered(&self, participant_id: &str) -> bool {
        self.registry
            .lock()
            .expect("broker registry mutex poisoned")
            .contains_key(participant_id)
    }

    /// Registered participant ids, sorted.
    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self
            .registry
            .lock()
            .expect("broker registry mutex poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    // ── Access policy ─────────────────────────────────────────────────────────

    /// Restrict `sender_id` to what `permissions` lists, replacing any
    /// previous entry.
    pub fn set_permissions(&self, sender_id: &str, permissions: Permissions) {
        log::info!(
            "broker: {sender_id} may reach {:?} with {:?}",
            permissions.receivers,
            permissions.message_types
        );
        self.access
            .write()
            .expect("broker access lock poisoned")
            .set_permissions(sender_id, permissions);
    }

    /// Lift the restriction on `sender_id`. Returns `false` if it had none.
    pub fn clear_permissions(&self, sender_id: &str) -> bool {
        self.access
            .write()
            .expect("broker access lock poisoned")
            .clear_permissions(sender_id)
    }

    pub fn permissions(&self, sender_id: &str) -> Option<Permissions> {
        self.access
            .read()
            .expect("broker access lock poisoned")
            .permissions(sender_id)
            .cloned()
    }

    /// Append `filter` to the chain, or replace the filter with the same id in
    /// place. Returns `true` if the filter is new.
    pub fn add_filter(&self, filter: MessageFilter) -> bool {
        log::info!(
            "broker: filter {} ({:?} on {})",
            filter.filter_id,
            filter.action,
            filter.message_type_pattern
        );
        self.access
            .write()
            .expect("broker access lock poisoned")
            .add_filter(filter)
    }

    pub fn remove_filter(&self, filter_id: &str) -> bool {
        self.access
            .write()
            .expect("broker access lock poisoned")
            .remove_filter(filter_id)
    }

    /// The filter chain in evaluation order.
    pub fn filters(&self) -> Vec<MessageFilter> {
        self.access
            .read()
            .expect("broker access lock poisoned")
            .filters()
            .to_vec()
    }

    // ── Traffic ───────────────────────────────────────────────────────────────

    /// Send a request and wait for its response.
    ///
    /// Every failure (validation, rate limit, full queue, timeout) comes back
    /// as a failed [`Response`] carrying the message's request id.
    pub async fn send(&self, message: Message) -> Response {
        let request_id = message.request_id.clone();
        let (token, waiter) = match self.admit(message) {
            Ok(admitted) => admitted,
            Err(err) => return self.fail(&request_id, err),
        };

        let mut guard = PendingGuard::new(&self.pending, request_id.clone(), token);
        match tokio::time::timeout(self.config.request_timeout(), waiter).await {
            Ok(Ok(response)) => {
                guard.disarm();
                response
            }
            // Only `clear` drops a resolver without sending.
            Ok(Err(_closed)) => {
                guard.disarm();
                self.fail(
                    &request_id,
                    BrokerError::Cancelled {
                        request_id: request_id.clone(),
                    },
                )
            }
            Err(_elapsed) => {
                drop(guard);
                self.fail(
                    &request_id,
                    BrokerError::Timeout {
                        request_id: request_id.clone(),
                        timeout_ms: self.config.request_timeout_ms,
                    },
                )
            }
        }
    }

    fn admit(&self, message: Message) -> Result<(u64, oneshot::Receiver<Response>), BrokerError> {
        let size = message.payload.len();
        if size > self.config.max_payload_bytes {
            return Err(BrokerError::PayloadTooLarge {
                size,
                max: self.config.max_payload_bytes,
            });
        }

        let registry = self.registry.lock().expect("broker registry mutex poisoned");
        if !self.rate_limiter.try_acquire(&message.sender_id) {
            return Err(BrokerError::RateLimited {
                sender: message.sender_id.clone(),
                limit: self.rate_limiter.limit(),
                window_ms: self.config.rate_window_ms,
            });
        }
        let receiver = registry
            .get(&message.receiver_id)
            .ok_or_else(|| BrokerError::ReceiverNotFound {
                receiver: message.receiver_id.clone(),
            })?;
        let sender = registry
            .get(&message.sender_id)
            .ok_or_else(|| BrokerError::SenderNotFound {
                sender: message.sender_id.clone(),
            })?;
        self.access
            .read()
            .expect("broker access lock poisoned")
            .check(&message)?;

        let (token, waiter) = self.pending.insert(&message.request_id).ok_or_else(|| {
            BrokerError::DuplicateRequest {
                request_id: message.request_id.clone(),
            }
        })?;

        let request_id = message.request_id.clone();
        let receiver_id = message.receiver_id.clone();
        let enqueued = receiver
            .queue
            .lock()
            .expect("participant queue mutex poisoned")
            .push(message);
        if enqueued.is_err() {
            self.pending.remove(&request_id, token);
            return Err(BrokerError::QueueFull {
                receiver: receiver_id,
                capacity: self.config.queue_capacity,
            });
        }

        sender.touch(|info| info.sent_count += 1);
        self.counters.record_sent();
        log::debug!("broker: queued request {request_id} for {receiver_id}");
        Ok((token, waiter))
    }

    fn fail(&self, request_id: &str, err: BrokerError) -> Response {
        self.counters.record_failure(err.reason());
        log::warn!("broker: request {request_id} failed: {err}");
        Response::failure(request_id, err.to_string())
    }

    /// Drain everything queued for `participant_id`, oldest first.
    pub fn receive_messages(&self, participant_id: &str) -> Vec<Message> {
        let Some(participant) = self.participant(participant_id) else {
            return Vec::new();
        };
        let drained = participant
            .queue
            .lock()
            .expect("participant queue mutex poisoned")
            .drain();
        if !drained.is_empty() {
            participant.touch(|info| info.received_count += drained.len() as u64);
            log::trace!(
                "broker: {participant_id} drained {} message(s)",
                drained.len()
            );
        }
        drained
    }

    /// Resolve the pending request named by `response.request_id`.
    ///
    /// Returns `false` if no live waiter exists: the id is unknown, was
    /// already answered, or its sender gave up.
    pub fn respond(&self, response: Response) -> bool {
        let request_id = response.request_id.clone();
        match self.pending.resolve(response) {
            Resolution::Resolved => {
                self.counters.record_delivered();
                log::debug!("broker: resolved request {request_id}");
                true
            }
            Resolution::NoWaiter | Resolution::WaiterGone => {
                self.counters.record_late_response();
                log::debug!("broker: no waiter for response {request_id}");
                false
            }
        }
    }

    pub fn pending_message_count(&self, participant_id: &str) -> usize {
        self.participant(participant_id)
            .map(|participant| {
                participant
                    .queue
                    .lock()
                    .expect("participant queue mutex poisoned")
                    .len()
            })
            .unwrap_or(0)
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    pub fn participant_info(&self, participant_id: &str) -> Option<ParticipantInfo> {
        let participant = self.participant(participant_id)?;
        let mut info = participant
            .info
            .lock()
            .expect("participant info mutex poisoned")
            .clone();
        info.queued = participant
            .queue
            .lock()
            .expect("participant queue mutex poisoned")
            .len();
        Some(info)
    }

    pub fn stats(&self) -> BrokerStats {
        let participants: Vec<Arc<Participant>> = self
            .registry
            .lock()
            .expect("broker registry mutex poisoned")
            .values()
            .cloned()
            .collect();
        let queued = participants
            .iter()
            .map(|participant| {
                participant
                    .queue
                    .lock()
                    .expect("participant queue mutex poisoned")
                    .len()
            })
            .sum();
        self.counters.snapshot(participants.len(), self.pending.len(), queued)
    }

    /// Drop all participants, queues, rate state, pending requests and counters.
    /// Waiters still blocked in `send` resolve as cancelled. The access policy
    /// is kept.
    pub fn clear(&self) {
        let mut registry = self.registry.lock().expect("broker registry mutex poisoned");
        registry.clear();
        self.rate_limiter.clear();
        self.pending.clear();
        self.counters.reset();
        log::info!("broker: cleared");
    }

    fn participant(&self, participant_id: &str) -> Option<Arc<Participant>> {
        self.registry
            .lock()
            .expect("broker registry mutex poisoned")
            .get(participant_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::Poll;

    use super::*;

    fn broker_with(config: BrokerConfig) -> MessageBroker {
        let broker = MessageBroker::with_config(config);
        assert!(broker.register("host"));
        assert!(broker.register("plugin"));
        broker
    }

    #[tokio::test]
    async fn full_queue_rolls_back_pending_entry() {
        let broker = Arc::new(broker_with(BrokerConfig {
            queue_capacity: 1,
            request_timeout_ms: 200,
            ..BrokerConfig::default()
        }));

        let first = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .send(Message::new("host", "plugin", "a", Vec::new()))
                    .await
            })
        };
        while broker.pending_message_count("plugin") == 0 {
            tokio::task::yield_now().await;
        }

        let second = broker
            .send(Message::new("host", "plugin", "b", Vec::new()))
            .await;
        assert!(!second.success);
        assert!(second.error_text().contains("queue full"));
        assert_eq!(broker.pending_request_count(), 1);

        let first = first.await.expect("first send task");
        assert!(first.error_text().contains("timeout"));
        assert_eq!(broker.stats().rejected.queue_full, 1);
    }

    #[tokio::test]
    async fn duplicate_in_flight_request_id_is_refused() {
        let broker = Arc::new(broker_with(BrokerConfig {
            request_timeout_ms: 200,
            ..BrokerConfig::default()
        }));
        let original = Message::with_request_id("host", "plugin", "a", Vec::new(), "fixed");
        let first = {
            let broker = Arc::clone(&broker);
            let message = original.clone();
            tokio::spawn(async move { broker.send(message).await })
        };
        while broker.pending_request_count() == 0 {
            tokio::task::yield_now().await;
        }

        let duplicate = broker.send(original).await;
        assert!(duplicate.error_text().contains("Duplicate request id"));
        assert_eq!(broker.pending_message_count("plugin"), 1);

        assert!(broker.respond(Response::success("fixed", b"done".to_vec())));
        assert!(first.await.expect("first send task").success);
    }

    #[tokio::test]
    async fn dropping_send_future_clears_its_waiter() {
        let broker = broker_with(BrokerConfig::default());
        let message = Message::new("host", "plugin", "a", Vec::new());
        let request_id = message.request_id.clone();
        {
            let send = broker.send(message);
            tokio::pin!(send);
            assert!(futures_poll_once(send.as_mut()).await.is_none());
            assert_eq!(broker.pending_request_count(), 1);
        }
        assert_eq!(broker.pending_request_count(), 0);
        assert!(!broker.respond(Response::success(request_id, Vec::new())));
        assert_eq!(broker.stats().late_responses, 1);
    }

    #[tokio::test]
    async fn clear_cancels_waiters() {
        let broker = Arc::new(broker_with(BrokerConfig::default()));
        let pending = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .send(Message::new("host", "plugin", "a", Vec::new()))
                    .await
            })
        };
        while broker.pending_request_count() == 0 {
            tokio::task::yield_now().await;
        }
        broker.clear();

        let response = pending.await.expect("send task");
        assert!(response.error_text().contains("cancelled"));
        assert!(broker.participants().is_empty());
        assert_eq!(broker.pending_message_count("plugin"), 0);
    }

    #[test]
    fn participant_info_tracks_traffic() {
        let broker = broker_with(BrokerConfig::default());
        assert!(broker.participant_info("ghost").is_none());
        let info = broker.participant_info("plugin").expect("registered");
        assert_eq!(info.participant_id, "plugin");
        assert_eq!(info.sent_count, 0);
        assert_eq!(
            broker.participants(),
            vec!["host".to_string(), "plugin".to_string()]
        );
    }

    #[tokio::test]
    async fn access_policy_survives_clear() {
        let broker = broker_with(BrokerConfig::default());
        broker.set_permissions("plugin", Permissions::default());
        broker.add_filter(MessageFilter::new(
            "no-debug",
            "debug.*",
            crate::access::FilterAction::Block,
        ));
        broker.clear();

        assert_eq!(broker.permissions("plugin"), Some(Permissions::default()));
        assert_eq!(broker.filters().len(), 1);
        assert!(broker.clear_permissions("plugin"));
        assert!(broker.remove_filter("no-debug"));
        assert!(broker.filters().is_empty());
    }

    async fn futures_poll_once<F: Future + Unpin>(mut future: F) -> Option<F::Output> {
        std::future::poll_fn(|cx| {
            Poll::Ready(match Pin::new(&mut future).poll(cx) {
                Poll::Ready(output) => Some(output),
                Poll::Pending => None,
            })
        })
        .await
    }
}
