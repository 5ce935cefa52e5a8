use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mqtt::control::variable_header::ConnectReturnCode;
use mqtt::packet::*;
use mqtt::topic_name::TopicNameError;
use mqtt::Encodable;
use mqtt::TopicName;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_native_tls::{TlsConnector, TlsStream};

use crate::connection_string::ConnectionString;
use crate::error::TransportError;
use crate::message::Message;
use crate::token::token_source_for;
use crate::transport::{Session, Transport};

const MQTT_PORT: u16 = 8883;
const API_VERSION: &str = "2018-06-30";
const KEEP_ALIVE: u16 = 10;
const TOKEN_LIFETIME_DAYS: i64 = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const OUTGOING_QUEUE_DEPTH: usize = 16;

type HubStream = TlsStream<TcpStream>;

fn cloud_bound_messages_topic(device_id: &str) -> String {
    format!("devices/{}/messages/events/", device_id)
}

fn user_name(hub_name: &str, device_id: &str) -> String {
    format!("{}/{}/?api-version={}", hub_name, device_id, API_VERSION)
}

fn encode(packet: &VariablePacket) -> crate::Result<Vec<u8>> {
    let mut buf = Vec::new();
    packet
        .encode(&mut buf)
        .map_err(|e| TransportError::Protocol(format!("failed to encode packet {:?}", e)))?;
    Ok(buf)
}

async fn tcp_connect(connector: &TlsConnector, iot_hub: &str) -> crate::Result<HubStream> {
    let socket = TcpStream::connect((iot_hub, MQTT_PORT)).await?;

    trace!("Connected to tcp socket {:?}", socket);

    let socket = connector.connect(iot_hub, socket).await?;

    trace!("Connected tls context {:?}", connector);

    Ok(socket)
}

async fn mqtt_connect(
    connector: &TlsConnector,
    connection_string: &ConnectionString,
) -> crate::Result<HubStream> {
    let ConnectionString {
        host_name,
        device_id,
        ..
    } = connection_string;

    let expiry = Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS);
    trace!("Generating token that will expire at {}", expiry);
    let password = token_source_for(connection_string)?.get(&expiry);

    let mut socket = tcp_connect(connector, host_name).await?;

    let mut conn = ConnectPacket::new(device_id.as_str());
    conn.set_clean_session(false);
    conn.set_keep_alive(KEEP_ALIVE);
    conn.set_user_name(Some(user_name(host_name, device_id)));
    conn.set_password(Some(password));

    socket
        .write_all(&encode(&VariablePacket::ConnectPacket(conn))?)
        .await?;

    match VariablePacket::parse(&mut socket).await {
        Ok(VariablePacket::ConnackPacket(connack)) => {
            trace!("CONNACK {:?}", connack);
            if connack.connect_return_code() != ConnectReturnCode::ConnectionAccepted {
                return Err(TransportError::ConnectionRefused(format!(
                    "return code {:?}",
                    connack.connect_return_code()
                )));
            }
        }
        Ok(pck) => {
            return Err(TransportError::Protocol(format!(
                "unexpected packet received after connect {:?}",
                pck
            )))
        }
        Err(err) => {
            return Err(TransportError::Protocol(format!(
                "error decoding connack packet {:?}",
                err
            )))
        }
    }

    Ok(socket)
}

/// MQTT over TLS transport to Azure IoT Hub
#[derive(Debug, Default)]
pub struct MqttTransport {
    connector: Option<TlsConnector>,
}

impl MqttTransport {
    ///
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Session = MqttSession;

    fn init(&mut self) -> crate::Result<()> {
        let connector = native_tls::TlsConnector::builder()
            .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
            .build()?;
        self.connector = Some(TlsConnector::from(connector));
        Ok(())
    }

    async fn open_session(&mut self, connection_string: &str) -> crate::Result<MqttSession> {
        let connector = self
            .connector
            .as_ref()
            .ok_or(TransportError::NotInitialized)?;
        let connection_string: ConnectionString = connection_string.parse()?;
        let d2c_topic = TopicName::new(cloud_bound_messages_topic(&connection_string.device_id))
            .map_err(|e| TransportError::Protocol(format!("invalid device topic {:?}", e)))?;

        let socket = time::timeout(CONNECT_TIMEOUT, mqtt_connect(connector, &connection_string))
            .await
            .map_err(|_| TransportError::Timeout(CONNECT_TIMEOUT))??;

        info!(
            "Connected to {} as {}",
            connection_string.host_name, connection_string.device_id
        );

        Ok(MqttSession::start(socket, d2c_topic))
    }

    fn shutdown(&mut self) {
        self.connector = None;
    }
}

/// Connected MQTT session
///
/// Publishing only queues packets. A writer task owns the write half of the
/// connection and sends keep-alive pings; a reader task drains whatever the
/// hub sends back.
#[derive(Debug)]
pub struct MqttSession {
    d2c_topic: TopicName,
    outgoing: mpsc::Sender<VariablePacket>,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

impl MqttSession {
    fn start(socket: HubStream, d2c_topic: TopicName) -> Self {
        let (read_socket, write_socket) = tokio::io::split(socket);
        let (outgoing, queue) = mpsc::channel(OUTGOING_QUEUE_DEPTH);

        MqttSession {
            d2c_topic,
            outgoing,
            writer: Some(tokio::spawn(write_loop(write_socket, queue))),
            reader: tokio::spawn(read_loop(read_socket)),
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    fn send(&mut self, message: Message) -> crate::Result<()> {
        let full_topic = build_topic_name(&self.d2c_topic, &message)
            .map_err(|e| TransportError::Protocol(format!("invalid topic name {:?}", e)))?;
        trace!("Sending message {:?} to topic {:?}", message, full_topic);
        let publish_packet =
            PublishPacket::new(full_topic, QoSWithPacketIdentifier::Level0, message.body);

        self.outgoing
            .try_send(VariablePacket::PublishPacket(publish_packet))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::QueueFull,
                TrySendError::Closed(_) => TransportError::SessionClosed,
            })
    }

    async fn close(&mut self) {
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => return,
        };

        let outgoing = &self.outgoing;
        let flushed = time::timeout(CLOSE_TIMEOUT, async {
            if outgoing
                .send(VariablePacket::DisconnectPacket(DisconnectPacket::new()))
                .await
                .is_err()
            {
                debug!("Connection already closed, not sending DISCONNECT");
            }
            (&mut writer).await
        })
        .await;

        match flushed {
            Ok(Ok(())) => debug!("Disconnected from hub"),
            Ok(Err(e)) => warn!("Writer task ended abnormally: {}", e),
            Err(_) => {
                warn!("Gave up flushing outgoing messages after {:?}", CLOSE_TIMEOUT);
                writer.abort();
            }
        }
        self.reader.abort();
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        self.reader.abort();
    }
}

async fn write_loop(
    mut socket: WriteHalf<HubStream>,
    mut queue: mpsc::Receiver<VariablePacket>,
) {
    let period = Duration::from_secs(KEEP_ALIVE.into());
    let mut keep_alive = time::interval_at(time::Instant::now() + period, period);

    loop {
        let packet = tokio::select! {
            queued = queue.recv() => match queued {
                Some(packet) => packet,
                None => break,
            },
            _ = keep_alive.tick() => {
                trace!("Sending PINGREQ to hub");
                VariablePacket::PingreqPacket(PingreqPacket::new())
            }
        };

        let disconnect = matches!(packet, VariablePacket::DisconnectPacket(..));
        let buf = match encode(&packet) {
            Ok(buf) => buf,
            Err(e) => {
                error!("Dropping outgoing packet: {}", e);
                continue;
            }
        };

        if let Err(e) = socket.write_all(&buf).await {
            error!("Failed writing to hub connection: {}", e);
            break;
        }
        if disconnect {
            break;
        }
    }

    // Later submissions see a closed session instead of filling a dead queue
    queue.close();
    if let Err(e) = socket.shutdown().await {
        debug!("Error shutting down hub connection: {}", e);
    }
}

async fn read_loop(mut socket: ReadHalf<HubStream>) {
    loop {
        match VariablePacket::parse(&mut socket).await {
            Ok(VariablePacket::PingrespPacket(..)) => trace!("Received PINGRESP from hub"),
            Ok(packet) => trace!("Received PACKET {:?}", packet),
            Err(err) => {
                debug!("Stopped reading from hub: {:?}", err);
                break;
            }
        }
    }
}

fn build_topic_name(
    base_topic: &TopicName,
    message: &Message,
) -> Result<TopicName, TopicNameError> {
    // if we reuse the base_topic string as the target for the serializer,
    // we end up with an extra ampersand before the key/value pairs
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(message.topic_properties())
        .finish();
    TopicName::new(format!("{}{}", base_topic.to_string(), encoded))
}
