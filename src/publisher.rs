use std::io::{self, Stderr, Stdout, Write};
use std::time::Duration;

use tokio::time;

use crate::error::PublishError;
use crate::telemetry::{telemetry_message, TelemetryReading, TelemetrySensor};
use crate::transport::{Session, Transport, TransportRuntime};

/// Readings published per run
pub const ITERATIONS: usize = 10;
/// Pause after every send attempt, including the last one
pub const SEND_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of a completed run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishSummary {
    /// Loop iterations executed
    pub iterations: usize,
    /// Readings queued with the transport
    pub sent: usize,
    /// Iterations whose reading could not be built or submitted
    pub failed: usize,
}

/// Where user facing lines go: confirmations to `out`, diagnostics to `err`
#[derive(Debug)]
pub struct Console<O, E> {
    out: O,
    err: E,
}

impl Console<Stdout, Stderr> {
    /// Console writing to the process's standard output and error
    pub fn stdio() -> Self {
        Console::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Console<O, E> {
    ///
    pub fn new(out: O, err: E) -> Self {
        Console { out, err }
    }

    /// Confirm a payload was handed to the transport
    pub fn sent(&mut self, payload: &str) {
        if let Err(e) = writeln!(self.out, "Sent: {}", payload) {
            warn!("Unable to write to stdout: {}", e);
        }
    }

    /// Print a diagnostic, followed by its cause when it has one
    pub fn report(&mut self, error: &PublishError) {
        let written = match std::error::Error::source(error) {
            Some(cause) => writeln!(self.err, "{}: {}", error, cause),
            None => writeln!(self.err, "{}", error),
        };
        if let Err(e) = written {
            warn!("Unable to write to stderr: {}", e);
        }
    }

    /// Recover the underlying writers
    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

/// Publishes a fixed number of synthetic readings through a transport
#[derive(Debug)]
pub struct Publisher<T: Transport> {
    transport: T,
    sensor: TelemetrySensor,
}

impl<T: Transport> Publisher<T> {
    /// Publisher using a sensor seeded from the wall clock
    pub fn new(transport: T) -> Self {
        Publisher {
            transport,
            sensor: TelemetrySensor::default(),
        }
    }

    /// Replace the reading source
    pub fn with_sensor(mut self, sensor: TelemetrySensor) -> Self {
        self.sensor = sensor;
        self
    }

    /// Initialize the transport, open a session and publish [`ITERATIONS`]
    /// readings [`SEND_INTERVAL`] apart.
    ///
    /// Only initialization and session failures end the run early; they are
    /// reported on `console` and returned. Failures within an iteration are
    /// reported and counted, and the loop carries on.
    pub async fn run<O: Write, E: Write>(
        self,
        connection_string: &str,
        console: &mut Console<O, E>,
    ) -> Result<PublishSummary, PublishError> {
        let Publisher {
            transport,
            mut sensor,
        } = self;

        let mut runtime = TransportRuntime::init(transport)
            .map_err(PublishError::TransportInit)
            .map_err(|e| fatal(console, e))?;

        let mut session = runtime
            .open_session(connection_string)
            .await
            .map_err(PublishError::SessionOpen)
            .map_err(|e| fatal(console, e))?;

        let mut summary = PublishSummary::default();
        for sequence in 0..ITERATIONS {
            summary.iterations += 1;

            match publish_reading(&mut session, sensor.get_reading(), sequence) {
                Ok(payload) => {
                    summary.sent += 1;
                    console.sent(&payload);
                }
                Err(e) => {
                    summary.failed += 1;
                    console.report(&e);
                }
            }

            time::sleep(SEND_INTERVAL).await;
        }

        session.close().await;
        info!(
            "Published {} of {} readings",
            summary.sent, summary.iterations
        );

        Ok(summary)
    }
}

fn fatal<O: Write, E: Write>(console: &mut Console<O, E>, error: PublishError) -> PublishError {
    console.report(&error);
    error
}

fn publish_reading<S: Session>(
    session: &mut S,
    reading: TelemetryReading,
    sequence: usize,
) -> Result<String, PublishError> {
    let payload = reading
        .to_json()
        .map_err(PublishError::MessageConstruction)?;
    trace!("Publishing reading #{}: {}", sequence, payload);

    session
        .send(telemetry_message(&payload, sequence))
        .map_err(PublishError::SendSubmission)?;

    Ok(payload)
}
