use crate::prelude::*;
use crate::telemetry::{readings_payload, Units};

use rumqttc::{Client, Connection, Event, Incoming, LastWill, MqttOptions, Outgoing, Publish, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn for_readings(report: &SlotReport) -> Result<Message> {
        Ok(Message {
            topic: format!("{}/readings", report.key),
            retain: false,
            payload: readings_payload(report)?,
        })
    }

    pub fn for_units(key: &str, units: &Units) -> Result<Message> {
        Ok(Message {
            topic: format!("{}/units", key),
            retain: true,
            payload: serde_json::to_string(units)?,
        })
    }

    pub fn for_failure(command: &Command) -> Message {
        Message {
            topic: command.to_result_topic(),
            retain: false,
            payload: "FAIL".to_string(),
        }
    }

    /// Builds the command for a message received on `{key}/{channel}`.
    pub fn to_command(&self, mqtt: &config::Mqtt) -> Result<Command> {
        let (key, channel) = self.split_cmd_topic()?;

        let command = if channel == mqtt.power_control_key() {
            Command::Power {
                key: key.to_string(),
                on: crate::command::parse_power(&self.payload)?,
            }
        } else if channel == mqtt.frequency_control_key() {
            Command::Frequency {
                key: key.to_string(),
                hz: crate::command::parse_frequency(&self.payload)?,
            }
        } else {
            bail!("unhandled: {:?}", self);
        };

        Ok(command)
    }

    // given a command Message, return the compressor key and channel.
    //
    // eg compressor/power => (compressor, power)
    pub fn split_cmd_topic(&self) -> Result<(&str, &str)> {
        match self.topic.split('/').collect::<Vec<&str>>()[..] {
            [key, channel] if !key.is_empty() && !channel.is_empty() => Ok((key, channel)),
            _ => bail!("ignoring badly formed MQTT topic: {}", self.topic),
        }
    }
} // }}}

pub struct Mqtt {
    config: ConfigWrapper,
    client: Mutex<Option<Client>>,
    subscriptions: Mutex<Vec<String>>,
    shutdown: AtomicBool,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Connects and spawns the receiver thread, which hands every command
    /// to `handler` on that same thread.
    ///
    /// This uses the blocking `Client`/`Connection` rather than
    /// `AsyncClient`/`EventLoop`: command handlers do blocking register I/O
    /// under the device lock, including settle delays, and run synchronously
    /// on the delivery thread. A plain thread keeps that I/O off the tokio
    /// workers.
    pub fn start(self: &Arc<Self>, handler: Arc<dyn CommandHandler>) -> Result<JoinHandle<()>> {
        let c = self.config.mqtt();

        let mut options = MqttOptions::new(
            format!("cryo-bridge-{}", std::process::id()),
            c.host(),
            c.port(),
        );
        options.set_last_will(LastWill::new(
            self.lwt_topic(),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, connection) = Client::new(options, 64);
        *self.lock_client() = Some(client);

        let mqtt = self.clone();
        let handle = std::thread::Builder::new()
            .name("mqtt".to_string())
            .spawn(move || mqtt.receiver(connection, handler))?;

        Ok(handle)
    }

    pub fn stop(&self) -> Result<()> {
        info!("Stopping MQTT client...");
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(client) = self.lock_client().as_mut() {
            let _ = client.try_publish(self.lwt_topic(), QoS::AtLeastOnce, true, "offline");
            client.disconnect()?;
        }
        Ok(())
    }

    fn lock_client(&self) -> std::sync::MutexGuard<'_, Option<Client>> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // mqtt -> daemon
    fn receiver(&self, mut connection: Connection, handler: Arc<dyn CommandHandler>) {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = self.on_connect() {
                        error!("{}", err);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    if let Err(err) = self.handle_message(publish, handler.as_ref()) {
                        error!("{:?}", err);
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Err(e) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("{}", e);
                    info!("reconnecting in 5s");
                    std::thread::sleep(Duration::from_secs(5));
                }
                _ => {} // keepalives etc
            }
        }

        info!("MQTT receiver loop exiting");
    }

    // subscriptions do not survive a reconnect with a clean session
    fn on_connect(&self) -> Result<()> {
        self.publish(self.lwt_topic(), true, "online".to_string())?;
        let keys = self.lock_subscriptions().clone();
        self.subscribe_topics(&keys)
    }

    fn handle_message(&self, publish: Publish, handler: &dyn CommandHandler) -> Result<()> {
        let mqtt = self.config.mqtt();
        // remove the namespace, including the first /
        let Some(topic) = publish.topic.strip_prefix(&format!("{}/", mqtt.namespace())) else {
            bail!("ignoring message outside namespace: {}", publish.topic);
        };

        let message = Message {
            topic: topic.to_owned(),
            retain: publish.retain,
            payload: String::from_utf8(publish.payload.to_vec())?,
        };
        debug!("RX: {:?}", message);

        match message.to_command(&mqtt) {
            Ok(command) => handler.handle(command),
            Err(err) => {
                warn!("{:#}", err);
                // an unparseable payload on a known channel still gets a FAIL reply
                if let Ok((key, channel)) = message.split_cmd_topic() {
                    let failed = if channel == mqtt.power_control_key() {
                        Some(Command::Power { key: key.to_string(), on: false })
                    } else if channel == mqtt.frequency_control_key() {
                        Some(Command::Frequency { key: key.to_string(), hz: f64::NAN })
                    } else {
                        None
                    };
                    if let Some(command) = failed {
                        self.publish_failure(&command)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn command_topics(&self, key: &str) -> [String; 2] {
        let c = self.config.mqtt();
        [
            format!("{}/{}/{}", c.namespace(), key, c.power_control_key()),
            format!("{}/{}/{}", c.namespace(), key, c.frequency_control_key()),
        ]
    }

    fn subscribe_topics(&self, keys: &[String]) -> Result<()> {
        if let Some(client) = self.lock_client().as_mut() {
            for key in keys {
                for topic in self.command_topics(key) {
                    info!("subscribing to {}", topic);
                    client.try_subscribe(topic, QoS::AtMostOnce)?;
                }
            }
        }
        Ok(())
    }

    fn publish(&self, topic: String, retain: bool, payload: String) -> Result<()> {
        match self.lock_client().as_mut() {
            Some(client) => {
                debug!("publishing: {} = {}", topic, payload);
                client.try_publish(topic, QoS::AtLeastOnce, retain, payload)?;
                Ok(())
            }
            None => bail!("mqtt not started, dropping {}", topic),
        }
    }

    fn publish_message(&self, message: Message) -> Result<()> {
        let topic = format!("{}/{}", self.config.mqtt().namespace(), message.topic);
        self.publish(topic, message.retain, message.payload)
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}

impl Telemetry for Mqtt {
    fn publish_readings(&self, report: &SlotReport) -> Result<()> {
        self.publish_message(Message::for_readings(report)?)
    }

    fn publish_units(&self, key: &str, units: &Units) -> Result<()> {
        self.publish_message(Message::for_units(key, units)?)
    }

    fn publish_failure(&self, command: &Command) -> Result<()> {
        self.publish_message(Message::for_failure(command))
    }

    fn subscribe(&self, keys: &[String]) -> Result<()> {
        {
            let mut subscriptions = self.lock_subscriptions();
            for key in keys {
                if !subscriptions.contains(key) {
                    subscriptions.push(key.clone());
                }
            }
        }
        self.subscribe_topics(keys)
    }

    fn unsubscribe(&self, keys: &[String]) -> Result<()> {
        self.lock_subscriptions().retain(|k| !keys.contains(k));
        if let Some(client) = self.lock_client().as_mut() {
            for key in keys {
                for topic in self.command_topics(key) {
                    info!("unsubscribing from {}", topic);
                    client.try_unsubscribe(topic)?;
                }
            }
        }
        Ok(())
    }
}
