#[macro_use]
extern crate log;

use std::process::ExitCode;

use azure_iot_telemetry::{cli, Console, MqttTransport, Publisher};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut console = Console::stdio();

    let connection_string = match cli::parse_args(std::env::args()) {
        Ok(connection_string) => connection_string,
        Err(e) => {
            console.report(&e);
            return ExitCode::FAILURE;
        }
    };

    match Publisher::new(MqttTransport::new())
        .run(&connection_string, &mut console)
        .await
    {
        Ok(summary) => {
            info!("Finished: {:?}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            debug!("Run aborted: {:?}", e);
            ExitCode::FAILURE
        }
    }
}
