//! Command line argument handling

use crate::error::PublishError;

/// Name used in the usage message when the OS gives no program name
pub const PROGRAM_NAME: &str = "azure-iot-telemetry";

/// Extract the connection string from the full argument list, program name
/// included. Exactly one non-empty argument is accepted.
pub fn parse_args<I>(args: I) -> Result<String, PublishError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let program = args.next().unwrap_or_else(|| PROGRAM_NAME.to_string());

    match (args.next(), args.next()) {
        (Some(connection_string), None) if !connection_string.trim().is_empty() => {
            Ok(connection_string)
        }
        _ => Err(PublishError::Usage { program }),
    }
}
