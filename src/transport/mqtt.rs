//! MQTT listener feeding the ingest actor

use std::time::Duration;

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use super::{decode_payload, subscription_pattern};
use crate::RawMessage;
use crate::config::MqttConfig;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

    let username = config
        .username
        .clone()
        .or_else(crate::util::get_mqtt_username);
    let password = config
        .password
        .clone()
        .or_else(crate::util::get_mqtt_password);
    if let Some(username) = username {
        opts.set_credentials(username, password.unwrap_or_default());
    }

    opts
}

/// Connect to the broker and forward every valid publish to `sender`
///
/// The task ends once the receiving side of `sender` is gone.
pub fn spawn_mqtt_listener(config: MqttConfig, sender: mpsc::Sender<RawMessage>) -> JoinHandle<()> {
    tokio::spawn(listen(config, sender))
}

#[instrument(skip_all, fields(broker = %config.host, port = config.port))]
async fn listen(config: MqttConfig, sender: mpsc::Sender<RawMessage>) {
    let pattern = subscription_pattern(&config.topic);
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), 10);

    info!("connecting to MQTT broker, subscribing to {pattern}");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("connected to MQTT broker");
                // the eventloop is not polled while we wait, so never block here
                if let Err(e) = client.try_subscribe(pattern.as_str(), QoS::AtMostOnce) {
                    error!("failed to subscribe to {pattern}: {e}");
                }
            }

            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let payload = match decode_payload(&publish.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("rejecting message on {}: {e}", publish.topic);
                        continue;
                    }
                };

                trace!("received message on {}", publish.topic);
                if sender
                    .send(RawMessage::new(publish.topic, payload))
                    .await
                    .is_err()
                {
                    debug!("ingest queue closed, stopping MQTT listener");
                    break;
                }
            }

            Ok(_) => {}

            Err(e) => {
                if sender.is_closed() {
                    break;
                }
                warn!("MQTT connection error: {e}, retrying in {RECONNECT_DELAY:?}");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    let _ = client.try_disconnect();
}
