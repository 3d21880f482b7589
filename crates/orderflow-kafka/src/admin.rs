use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use tracing::info;

use crate::config::KafkaConfig;
use crate::error::{Error, Result};

/// Topics the pipeline needs before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    pub topic: String,
    pub dlq_topic: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

impl TopicLayout {
    /// The main topic with the configured partitions, and a single-partition
    /// dead-letter topic with the same replication.
    pub fn new_topics(&self) -> Vec<NewTopic<'_>> {
        vec![
            NewTopic::new(
                &self.topic,
                self.partitions,
                TopicReplication::Fixed(self.replication_factor),
            ),
            NewTopic::new(
                &self.dlq_topic,
                1,
                TopicReplication::Fixed(self.replication_factor),
            ),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions < 1 {
            return Err(Error::InvalidConfig(
                "partitions must be at least 1".to_string(),
            ));
        }
        if self.replication_factor < 1 {
            return Err(Error::InvalidConfig(
                "replication factor must be at least 1".to_string(),
            ));
        }
        if self.topic == self.dlq_topic {
            return Err(Error::InvalidConfig(format!(
                "dead-letter topic must differ from {}",
                self.topic
            )));
        }
        Ok(())
    }
}

/// Create the pipeline's topics. A topic that already exists is left as is.
pub async fn provision_topics(config: &KafkaConfig, layout: &TopicLayout) -> Result<()> {
    layout.validate()?;
    let admin_client: AdminClient<DefaultClientContext> = config.admin_config().create()?;

    let new_topics = layout.new_topics();
    let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

    let results = admin_client
        .create_topics(&new_topics, &opts)
        .await
        .map_err(|e| Error::TopicCreation(format!("Failed to create topics: {e}")))?;

    for result in results {
        match result {
            Ok(topic_name) => {
                info!("Topic '{}' created successfully", topic_name);
            }
            Err((topic_name, err)) => {
                let err_str = err.to_string();
                if err_str.contains("already exists") || err_str.contains("TopicExistsException")
                {
                    info!("Topic '{}' already exists", topic_name);
                } else {
                    return Err(Error::TopicCreation(format!(
                        "Failed to create topic {topic_name}: {err}"
                    )));
                }
            }
        }
    }

    Ok(())
}
