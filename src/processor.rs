use crate::model::{ObservationParseError, WeatherObservation};
use crate::services::{ObservationStore, QueueError, QueueMessage, ReceiveParameters, WeatherQueue};
use crate::settings::ProcessorSettings;
use std::sync::Arc;
use std::time::Duration;

/// What became of one received message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Observation stored and message deleted.
    Stored,

    /// Body did not parse; left in the queue to reappear after its visibility timeout.
    Malformed,

    /// Body did not parse and had exceeded the receive limit; deleted without storing.
    Discarded,

    /// Insert failed; left in the queue for redelivery.
    StoreFailed,

    /// Observation stored but the delete failed, so the message will be stored again on
    /// redelivery.
    DeleteFailed,
}

/// Outcome counts of one poll.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub stored: usize,
    pub malformed: usize,
    pub discarded: usize,
    pub store_failed: usize,
    pub delete_failed: usize,
}

impl PollSummary {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Stored => self.stored += 1,
            MessageOutcome::Malformed => self.malformed += 1,
            MessageOutcome::Discarded => self.discarded += 1,
            MessageOutcome::StoreFailed => self.store_failed += 1,
            MessageOutcome::DeleteFailed => self.delete_failed += 1,
        }
    }
}

/// Drains weather reports from the queue into the observation store, one message at a time.
pub struct Processor {
    queue: Arc<dyn WeatherQueue>,
    store: Arc<dyn ObservationStore>,
    receive: ReceiveParameters,
    idle_backoff: Duration,
    max_receive_count: Option<u32>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("receive", &self.receive)
            .field("idle_backoff", &self.idle_backoff)
            .field("max_receive_count", &self.max_receive_count)
            .finish()
    }
}

impl Processor {
    pub fn new(
        queue: Arc<dyn WeatherQueue>, store: Arc<dyn ObservationStore>,
        settings: &ProcessorSettings,
    ) -> Self {
        if settings.max_receive_count.is_none() {
            tracing::warn!(
                "no max_receive_count configured: malformed messages will be redelivered indefinitely"
            );
        }

        Self {
            queue,
            store,
            receive: settings.into(),
            idle_backoff: settings.idle_backoff,
            max_receive_count: settings.max_receive_count,
        }
    }

    /// Polls forever. Empty or failed polls pause for the idle backoff before the next one.
    pub async fn run(&self) {
        loop {
            match self.poll_once().await {
                Ok(summary) if summary.received > 0 => {
                    tracing::debug!(?summary, "processed queue batch");
                },

                Ok(_) => self.idle().await,

                Err(error) => {
                    tracing::error!(?error, "failed to receive from weather queue");
                    self.idle().await;
                },
            }
        }
    }

    async fn idle(&self) {
        if !self.idle_backoff.is_zero() {
            tokio::time::sleep(self.idle_backoff).await;
        }
    }

    /// Receives one batch and processes its messages in order.
    pub async fn poll_once(&self) -> Result<PollSummary, QueueError> {
        let messages = self.queue.receive(self.receive).await?;

        let mut summary = PollSummary { received: messages.len(), ..PollSummary::default() };
        for message in &messages {
            summary.record(self.process_message(message).await);
        }

        Ok(summary)
    }

    /// Stores the message's observation, then deletes it. The delete happens only after the
    /// insert succeeds.
    #[tracing::instrument(
        level = "debug",
        skip(self, message),
        fields(message_id=?message.message_id, city=?message.city)
    )]
    pub async fn process_message(&self, message: &QueueMessage) -> MessageOutcome {
        let observation = match WeatherObservation::from_message_body(&message.body) {
            Ok(observation) => observation,
            Err(error) => return self.handle_malformed(message, error).await,
        };

        if let Err(error) = self.store.insert_observation(&observation).await {
            tracing::error!(?error, "failed to store weather observation -- left for redelivery");
            return MessageOutcome::StoreFailed;
        }

        tracing::info!(
            "saved weather data for {}, {}: {}°C, {}",
            observation.city, observation.country, observation.temp_c, observation.condition
        );

        match self.queue.delete(&message.receipt_handle).await {
            Ok(()) => MessageOutcome::Stored,
            Err(error) => {
                tracing::error!(?error, "stored observation but failed to delete message");
                MessageOutcome::DeleteFailed
            },
        }
    }

    async fn handle_malformed(
        &self, message: &QueueMessage, error: ObservationParseError,
    ) -> MessageOutcome {
        let exceeded = self
            .max_receive_count
            .zip(message.receive_count)
            .is_some_and(|(limit, count)| limit < count);

        if !exceeded {
            tracing::error!(
                ?error, receive_count=?message.receive_count,
                "error processing message -- left in queue for redelivery"
            );
            return MessageOutcome::Malformed;
        }

        tracing::error!(
            ?error, receive_count=?message.receive_count, body=%message.body,
            "discarding message that exceeded receive limit"
        );
        match self.queue.delete(&message.receipt_handle).await {
            Ok(()) => MessageOutcome::Discarded,
            Err(error) => {
                tracing::error!(?error, "failed to discard malformed message");
                MessageOutcome::Malformed
            },
        }
    }
}
