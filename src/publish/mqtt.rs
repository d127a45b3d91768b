//! MQTT publisher backed by `rumqttc`.
//!
//! Each publish opens its own broker session, sends one QoS 1 message, waits
//! for the broker's PUBACK and disconnects. Nothing is queued or retried.

use super::{OutboundMessage, PublishError, Publisher};
use crate::config::BrokerConfig;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Capacity of the client's request channel; one publish plus a disconnect.
const REQUEST_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct MqttPublisher {
    /// Bound on connect + publish + acknowledgement.
    pub timeout: Duration,
}

impl MqttPublisher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Publisher for MqttPublisher {
    fn publish<'a>(
        &'a self,
        broker: &'a BrokerConfig,
        message: &'a OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, deliver(broker, message))
                .await
                .map_err(|_| PublishError::Timeout(self.timeout))?
        })
    }
}

fn mqtt_options(broker: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
    options.set_keep_alive(KEEP_ALIVE);

    if let Some(username) = &broker.username {
        options.set_credentials(username, broker.password.as_deref().unwrap_or_default());
    }

    options
}

async fn deliver(broker: &BrokerConfig, message: &OutboundMessage) -> Result<(), PublishError> {
    let payload = message.to_json()?;
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(broker), REQUEST_CAPACITY);

    client
        .publish(&message.topic, QoS::AtLeastOnce, false, payload)
        .await
        .map_err(|e| PublishError::Client(e.to_string()))?;

    wait_for_puback(&mut eventloop).await?;
    disconnect(&client, &mut eventloop).await;
    Ok(())
}

/// Drive the event loop until the broker acknowledges the publish.
async fn wait_for_puback(eventloop: &mut EventLoop) -> Result<(), PublishError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => debug!("connected to MQTT broker"),
            Ok(Event::Incoming(Incoming::PubAck(ack))) => {
                debug!(pkid = ack.pkid, "publish acknowledged");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => return Err(PublishError::Connection(e.to_string())),
        }
    }
}

/// Send DISCONNECT and flush it; failures here no longer affect delivery.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(err) = client.disconnect().await {
        warn!(%err, "failed to request MQTT disconnect");
        return;
    }

    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "MQTT connection closed during disconnect");
                break;
            }
        }
    }
}
