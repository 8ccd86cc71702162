//! Process-local queue and store used as test doubles, exercising scheduler, processor and
//! api together without AWS or Postgres. They keep every sent and deleted message for
//! inspection and are not meant for long-running processes.

use super::queue::{QueueError, QueueMessage, ReceiveParameters, WeatherQueue};
use super::store::{ObservationStore, StoreError};
use crate::model::{CityAggregate, WeatherObservation};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub city: String,
    pub body: String,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    message_id: String,
    city: String,
    body: String,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    visible: VecDeque<QueuedMessage>,
    in_flight: HashMap<String, QueuedMessage>,
    sent: Vec<SentMessage>,
    deleted: Vec<String>,
}

/// Queue with SQS-like delivery: received messages stay in flight until deleted, and
/// [`InMemoryQueue::expire_visibility`] makes undeleted ones deliverable again.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryQueue {
    /// While unavailable every operation fails with [`QueueError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(QueueError::Unavailable("in-memory queue switched off".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    /// Message ids deleted so far, in deletion order.
    pub async fn deleted(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn visible_len(&self) -> usize {
        self.state.lock().await.visible.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Returns every received but undeleted message to the queue.
    pub async fn expire_visibility(&self) {
        let mut state = self.state.lock().await;
        let mut expired: Vec<_> = state.in_flight.drain().map(|(_, message)| message).collect();
        expired.sort_by(|lhs, rhs| lhs.message_id.cmp(&rhs.message_id));
        state.visible.extend(expired);
    }
}

#[async_trait]
impl WeatherQueue for InMemoryQueue {
    async fn send(&self, city: &str, body: String) -> Result<String, QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let message_id = format!("{:08}", state.next_id);

        state.sent.push(SentMessage {
            message_id: message_id.clone(),
            city: city.to_string(),
            body: body.clone(),
        });
        state.visible.push_back(QueuedMessage {
            message_id: message_id.clone(),
            city: city.to_string(),
            body,
            receive_count: 0,
        });

        Ok(message_id)
    }

    async fn receive(&self, params: ReceiveParameters) -> Result<Vec<QueueMessage>, QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let batch_size = usize::try_from(params.max_messages.max(1)).unwrap_or(1);

        let mut received = Vec::with_capacity(batch_size);
        while received.len() < batch_size {
            let Some(mut message) = state.visible.pop_front() else { break };
            message.receive_count += 1;
            let receipt_handle = format!("{}-{}", message.message_id, message.receive_count);

            received.push(QueueMessage {
                message_id: Some(message.message_id.clone()),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
                city: Some(message.city.clone()),
                receive_count: Some(message.receive_count),
            });
            state.in_flight.insert(receipt_handle, message);
        }

        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if let Some(message) = state.in_flight.remove(receipt_handle) {
            state.deleted.push(message.message_id);
        } else {
            tracing::debug!(%receipt_handle, "ignoring delete of unknown receipt handle");
        }
        Ok(())
    }
}

/// Observation store over a vector; insertion order is the insertion sequence.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    observations: Arc<RwLock<Vec<WeatherObservation>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn observations(&self) -> Vec<WeatherObservation> {
        self.observations.read().await.clone()
    }
}

#[derive(Debug)]
struct CityAccumulator<'o> {
    city: &'o str,
    sum_temp_c: f64,
    count: usize,
    latest_condition: &'o str,
}

#[async_trait]
impl ObservationStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn insert_observation(&self, observation: &WeatherObservation) -> Result<(), StoreError> {
        self.check_available()?;
        self.observations.write().await.push(observation.clone());
        Ok(())
    }

    async fn aggregate_by_country(&self, country: &str) -> Result<Vec<CityAggregate>, StoreError> {
        self.check_available()?;
        let observations = self.observations.read().await;

        let mut accumulators: Vec<CityAccumulator<'_>> = Vec::new();
        for observation in observations.iter().filter(|o| o.country == country) {
            match accumulators.iter_mut().find(|acc| acc.city == observation.city) {
                Some(acc) => {
                    acc.sum_temp_c += observation.temp_c;
                    acc.count += 1;
                    acc.latest_condition = observation.condition.as_str();
                },
                None => accumulators.push(CityAccumulator {
                    city: observation.city.as_str(),
                    sum_temp_c: observation.temp_c,
                    count: 1,
                    latest_condition: observation.condition.as_str(),
                }),
            }
        }

        let mut aggregates: Vec<_> = accumulators
            .into_iter()
            .map(|acc| CityAggregate {
                city: acc.city.to_string(),
                average_temp_c: acc.sum_temp_c / acc.count as f64,
                latest_condition_text: acc.latest_condition.to_string(),
            })
            .collect();
        aggregates.sort_by(|lhs, rhs| lhs.city.cmp(&rhs.city));

        Ok(aggregates)
    }
}
