use crate::settings::{ProcessorSettings, QueueSettings, SettingsError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::types::{Message, MessageAttributeValue, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use std::time::Duration;
use thiserror::Error;

/// Message attribute naming the city a weather report was fetched for.
pub const CITY_ATTRIBUTE: &str = "City";

const STRING_DATA_TYPE: &str = "String";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    Sqs(#[from] aws_sdk_sqs::Error),

    #[error("failed to build queue request: {0}")]
    Build(#[from] aws_sdk_sqs::error::BuildError),

    #[error("queue accepted message without returning a message id")]
    MissingMessageId,

    #[error("queue is unavailable: {0}")]
    Unavailable(String),
}

/// A weather report received from the queue, valid for deletion through its receipt handle
/// until the visibility timeout lapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub receipt_handle: String,
    pub body: String,
    pub city: Option<String>,
    pub receive_count: Option<u32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReceiveParameters {
    pub max_messages: i32,
    pub visibility_timeout: Duration,
    pub wait_time: Duration,
}

impl From<&ProcessorSettings> for ReceiveParameters {
    fn from(settings: &ProcessorSettings) -> Self {
        Self {
            max_messages: settings.max_messages,
            visibility_timeout: settings.visibility_timeout,
            wait_time: settings.wait_time,
        }
    }
}

/// At-least-once queue carrying serialized weather reports from scheduler to processor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherQueue: Send + Sync {
    /// Publishes a report body tagged with its city, returning the queue's message id.
    async fn send(&self, city: &str, body: String) -> Result<String, QueueError>;

    async fn receive(&self, params: ReceiveParameters) -> Result<Vec<QueueMessage>, QueueError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;
}

#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self { client, queue_url: queue_url.into() }
    }

    /// Resolves credentials through the standard AWS provider chain.
    #[tracing::instrument(level = "debug")]
    pub async fn from_settings(settings: &QueueSettings) -> Result<Self, SettingsError> {
        let queue_url = settings.queue_url()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(ref region) = settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(ref endpoint_url) = settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        tracing::info!(%queue_url, "connected weather queue");
        Ok(Self::new(Client::new(&sdk_config), queue_url))
    }

    pub fn queue_url(&self) -> &str {
        self.queue_url.as_str()
    }
}

#[async_trait]
impl WeatherQueue for SqsQueue {
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn send(&self, city: &str, body: String) -> Result<String, QueueError> {
        let city_attribute = MessageAttributeValue::builder()
            .data_type(STRING_DATA_TYPE)
            .string_value(city)
            .build()?;

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_attributes(CITY_ATTRIBUTE, city_attribute)
            .message_body(body)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        output.message_id.ok_or(QueueError::MissingMessageId)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn receive(&self, params: ReceiveParameters) -> Result<Vec<QueueMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(params.max_messages)
            .visibility_timeout(as_seconds(params.visibility_timeout))
            .wait_time_seconds(as_seconds(params.wait_time))
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_attribute_names(CITY_ATTRIBUTE)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let message_id = message.message_id.clone();
                let converted = to_queue_message(message);
                if converted.is_none() {
                    tracing::warn!(
                        ?message_id,
                        "queue delivered message without receipt handle -- skipped"
                    );
                }
                converted
            })
            .collect();

        Ok(messages)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;
        Ok(())
    }
}

fn to_queue_message(message: Message) -> Option<QueueMessage> {
    let receipt_handle = message.receipt_handle?;

    let city = message
        .message_attributes
        .as_ref()
        .and_then(|attributes| attributes.get(CITY_ATTRIBUTE))
        .and_then(|value| value.string_value.clone());

    let receive_count = message
        .attributes
        .as_ref()
        .and_then(|attributes| {
            attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount)
        })
        .and_then(|count| count.parse().ok());

    Some(QueueMessage {
        message_id: message.message_id,
        receipt_handle,
        body: message.body.unwrap_or_default(),
        city,
        receive_count,
    })
}

fn as_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}
