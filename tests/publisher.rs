use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use azure_iot_telemetry::{
    Console, Message, PublishError, PublishSummary, Publisher, Session, TelemetrySensor,
    Transport, TransportError, ITERATIONS, SEND_INTERVAL,
};
use tokio::time::{Duration, Instant};

const CONNECTION_STRING: &str =
    "HostName=myhub.azure-devices.net;DeviceId=dev1;SharedAccessKey=a2V5";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Init,
    Open(String),
    Send { payload: String, message_id: String },
    Close,
    Shutdown,
}

#[derive(Debug, Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<(Call, Instant)>>>,
}

impl Recorder {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    fn times_of(&self, predicate: impl Fn(&Call) -> bool) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| predicate(call))
            .map(|(_, at)| *at)
            .collect()
    }

    fn payloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct MockTransport {
    recorder: Recorder,
    fail_init: bool,
    fail_open: bool,
    // 1-based send attempts that are rejected
    failing_sends: Vec<usize>,
}

impl MockTransport {
    fn new(recorder: &Recorder) -> Self {
        MockTransport {
            recorder: recorder.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;

    fn init(&mut self) -> azure_iot_telemetry::Result<()> {
        self.recorder.record(Call::Init);
        if self.fail_init {
            Err(TransportError::Other("no tls backend".to_string()))
        } else {
            Ok(())
        }
    }

    async fn open_session(
        &mut self,
        connection_string: &str,
    ) -> azure_iot_telemetry::Result<MockSession> {
        self.recorder
            .record(Call::Open(connection_string.to_string()));
        if self.fail_open {
            return Err(TransportError::ConnectionRefused(
                "return code BadUserNameOrPassword".to_string(),
            ));
        }
        Ok(MockSession {
            recorder: self.recorder.clone(),
            failing_sends: self.failing_sends.clone(),
            attempts: 0,
        })
    }

    fn shutdown(&mut self) {
        self.recorder.record(Call::Shutdown);
    }
}

#[derive(Debug)]
struct MockSession {
    recorder: Recorder,
    failing_sends: Vec<usize>,
    attempts: usize,
}

#[async_trait]
impl Session for MockSession {
    fn send(&mut self, message: Message) -> azure_iot_telemetry::Result<()> {
        self.attempts += 1;
        self.recorder.record(Call::Send {
            payload: message.body_str().unwrap().to_string(),
            message_id: message.system_property("$.mid").unwrap().to_string(),
        });
        if self.failing_sends.contains(&self.attempts) {
            Err(TransportError::QueueFull)
        } else {
            Ok(())
        }
    }

    async fn close(&mut self) {
        self.recorder.record(Call::Close);
    }
}

fn console() -> Console<Vec<u8>, Vec<u8>> {
    Console::new(Vec::new(), Vec::new())
}

fn output(console: Console<Vec<u8>, Vec<u8>>) -> (Vec<String>, Vec<String>) {
    let (out, err) = console.into_inner();
    let lines = |bytes: Vec<u8>| {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    (lines(out), lines(err))
}

fn assert_valid_payload(payload: &str) {
    let value: serde_json::Value = serde_json::from_str(payload).unwrap();
    let temperature = value["temperature"].as_i64().unwrap();
    let humidity = value["humidity"].as_i64().unwrap();

    assert!((20..=29).contains(&temperature), "{}", payload);
    assert!((40..=59).contains(&humidity), "{}", payload);
    assert_eq!(
        payload,
        format!(
            "{{\"temperature\":{},\"humidity\":{}}}",
            temperature, humidity
        )
    );
}

#[tokio::test(start_paused = true)]
async fn publishes_ten_readings_then_closes_and_shuts_down() {
    let recorder = Recorder::default();
    let mut console = console();

    let summary = Publisher::new(MockTransport::new(&recorder))
        .with_sensor(TelemetrySensor::from_seed(1))
        .run(CONNECTION_STRING, &mut console)
        .await
        .unwrap();

    assert_eq!(
        summary,
        PublishSummary {
            iterations: ITERATIONS,
            sent: ITERATIONS,
            failed: 0,
        }
    );

    let calls = recorder.calls();
    assert_eq!(calls.len(), 2 + ITERATIONS + 2);
    assert_eq!(calls[0], Call::Init);
    assert_eq!(calls[1], Call::Open(CONNECTION_STRING.to_string()));
    assert_eq!(calls[calls.len() - 2], Call::Close);
    assert_eq!(calls[calls.len() - 1], Call::Shutdown);

    let message_ids: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            Call::Send { message_id, .. } => Some(message_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        message_ids,
        vec!["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]
    );

    let payloads = recorder.payloads();
    payloads.iter().for_each(|p| assert_valid_payload(p));

    let (out, err) = output(console);
    let expected: Vec<_> = payloads.iter().map(|p| format!("Sent: {}", p)).collect();
    assert_eq!(out, expected);
    assert!(err.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_sends_do_not_shorten_the_loop() {
    let recorder = Recorder::default();
    let mut console = console();
    let transport = MockTransport {
        failing_sends: vec![3, 7],
        ..MockTransport::new(&recorder)
    };

    let summary = Publisher::new(transport)
        .run(CONNECTION_STRING, &mut console)
        .await
        .unwrap();

    assert_eq!(
        summary,
        PublishSummary {
            iterations: 10,
            sent: 8,
            failed: 2,
        }
    );
    assert_eq!(recorder.payloads().len(), 10);
    assert_eq!(recorder.calls().last(), Some(&Call::Shutdown));

    let (out, err) = output(console);
    assert_eq!(out.len(), 8);
    assert!(out.iter().all(|line| line.starts_with("Sent: ")));
    assert_eq!(
        err,
        vec![
            "Failed to send message: outgoing message queue is full",
            "Failed to send message: outgoing message queue is full",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn sends_are_paced_and_the_last_one_is_followed_by_a_sleep() {
    let recorder = Recorder::default();
    let mut console = console();
    let start = Instant::now();

    Publisher::new(MockTransport::new(&recorder))
        .run(CONNECTION_STRING, &mut console)
        .await
        .unwrap();

    let elapsed = start.elapsed();
    let total = SEND_INTERVAL * ITERATIONS as u32;
    assert!(elapsed >= total, "{:?}", elapsed);
    assert!(elapsed < total + Duration::from_secs(1), "{:?}", elapsed);

    let sends = recorder.times_of(|call| matches!(call, Call::Send { .. }));
    assert_eq!(sends.len(), ITERATIONS);
    for pair in sends.windows(2) {
        assert!(pair[1] - pair[0] >= SEND_INTERVAL);
    }

    let closed = recorder.times_of(|call| *call == Call::Close);
    assert!(closed[0] - sends[ITERATIONS - 1] >= SEND_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn init_failure_stops_before_opening_a_session() {
    let recorder = Recorder::default();
    let mut console = console();
    let transport = MockTransport {
        fail_init: true,
        ..MockTransport::new(&recorder)
    };
    let start = Instant::now();

    let result = Publisher::new(transport)
        .run(CONNECTION_STRING, &mut console)
        .await;

    assert!(matches!(result, Err(PublishError::TransportInit(_))));
    assert_eq!(recorder.calls(), vec![Call::Init]);
    assert_eq!(start.elapsed(), Duration::from_secs(0));

    let (out, err) = output(console);
    assert!(out.is_empty());
    assert_eq!(
        err,
        vec!["Failed to initialize IoT Hub transport: no tls backend"]
    );
}

#[tokio::test(start_paused = true)]
async fn session_failure_still_shuts_the_runtime_down_once() {
    let recorder = Recorder::default();
    let mut console = console();
    let transport = MockTransport {
        fail_open: true,
        ..MockTransport::new(&recorder)
    };

    let result = Publisher::new(transport)
        .run(CONNECTION_STRING, &mut console)
        .await;

    assert!(matches!(result, Err(PublishError::SessionOpen(_))));
    assert_eq!(
        recorder.calls(),
        vec![
            Call::Init,
            Call::Open(CONNECTION_STRING.to_string()),
            Call::Shutdown
        ]
    );

    let (out, err) = output(console);
    assert!(out.is_empty());
    assert_eq!(
        err,
        vec!["Failed to create device client handle: hub refused the connection: return code BadUserNameOrPassword"]
    );
}

#[tokio::test(start_paused = true)]
async fn seeded_sensor_drives_the_payloads() {
    let recorder = Recorder::default();
    let mut console = console();
    let mut expected_sensor = TelemetrySensor::from_seed(99);

    Publisher::new(MockTransport::new(&recorder))
        .with_sensor(TelemetrySensor::from_seed(99))
        .run(CONNECTION_STRING, &mut console)
        .await
        .unwrap();

    let expected: Vec<_> = (0..ITERATIONS)
        .map(|_| expected_sensor.get_reading().to_json().unwrap())
        .collect();
    assert_eq!(recorder.payloads(), expected);
}
