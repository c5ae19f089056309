//! Service call handler.

use serde_json::{Map, Value};

use homelink_core::{EntityId, Session};

use crate::cli::{CallArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Split "light.turn_on" into its domain and service.
fn split_service(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once('.') {
        Some((domain, service)) if !domain.is_empty() && !service.is_empty() => Ok((domain, service)),
        _ => Err(CliError::Validation {
            field: "service".into(),
            reason: format!("`{raw}` is not of the form <domain>.<service>"),
        }),
    }
}

/// Merge `--data` and `--set` into one service-data object. `--set` wins.
fn service_data(data: Option<&str>, set: &[String]) -> Result<Option<Map<String, Value>>, CliError> {
    let mut merged = match data {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            other => {
                return Err(CliError::Validation {
                    field: "data".into(),
                    reason: format!("expected a JSON object, got `{other}`"),
                });
            }
        },
        None => Map::new(),
    };

    for pair in set {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Validation {
                field: "set".into(),
                reason: format!("`{pair}` is not of the form KEY=VALUE"),
            });
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
        merged.insert(key.to_owned(), value);
    }

    Ok((!merged.is_empty()).then_some(merged))
}

pub async fn handle(session: &Session, args: CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (domain, service) = split_service(&args.service)?;
    let target = EntityId::new(args.entity_id)?;
    let data = service_data(args.data.as_deref(), &args.set)?;

    let result = session.call_service(domain, service, &target, data).await?;

    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => format!("Called {domain}.{service} on {target}"),
        structured => output::render_structured(structured, &result)?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
