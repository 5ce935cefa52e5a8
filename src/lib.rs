//! Demo Azure IoT Hub device that publishes synthetic telemetry
//!
//! The binary connects with a device connection string, sends ten
//! temperature and humidity readings five seconds apart and exits.
//!
//! ```text
//! azure-iot-telemetry "HostName=myhub.azure-devices.net;DeviceId=dev1;SharedAccessKey=..."
//! Sent: {"temperature":24,"humidity":47}
//! ```
//!
//! The publishing loop only depends on the [`Transport`] and [`Session`]
//! traits. [`MqttTransport`] talks MQTT over TLS to the hub; tests substitute
//! their own implementation.
//!
//! # Examples
//!
//! ```no_run
//! use azure_iot_telemetry::{Console, MqttTransport, Publisher};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut console = Console::stdio();
//!     let summary = Publisher::new(MqttTransport::new())
//!         .run(
//!             "HostName=iothubname.azure-devices.net;DeviceId=MyDeviceId;SharedAccessKey=TheAccessKey",
//!             &mut console,
//!         )
//!         .await;
//!     println!("{:?}", summary);
//! }
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]

#[macro_use]
extern crate log;

/// Command line handling
pub mod cli;
pub mod connection_string;
/// Errors
pub mod error;
/// Message types for communicating with the IoT Hub
pub mod message;
/// MQTT transport to IoT Hub
pub mod mqtt_transport;
/// The telemetry publishing loop
pub mod publisher;
pub mod telemetry;
/// Shared access signature tokens
pub mod token;
/// Transport types
pub mod transport;

pub use connection_string::{ConnectionString, Credential};
pub use error::{PublishError, Result, TransportError};
pub use message::{Message, MessageBuilder};
pub use mqtt_transport::{MqttSession, MqttTransport};
pub use publisher::{Console, PublishSummary, Publisher, ITERATIONS, SEND_INTERVAL};
pub use telemetry::{TelemetryReading, TelemetrySensor};
pub use token::{DeviceKeyTokenSource, SasTokenSource, TokenSource};
pub use transport::{Session, Transport, TransportRuntime};
