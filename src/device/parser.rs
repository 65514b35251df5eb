use std::str;

use crate::device::types::VitalsReading;
use crate::error::MalformedPayload;

fn parse_field(name: &str, field: &str) -> Result<f64, MalformedPayload> {
    // the peripheral may pad its payload with whitespace or a trailing NUL
    let field = field.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    let value = field.parse::<f64>()
        .map_err(|_| MalformedPayload::new(format!("{} is not a number: {:?}", name, field)))?;

    if !value.is_finite() {
        return Err(MalformedPayload::new(format!("{} is not finite: {:?}", name, field)));
    }

    Ok(value)
}

/// Decodes a `"<temperature>,<heartRate>"` notification payload.
///
/// The values are returned as sent; range checks are left to the caller.
pub fn parse_vitals(payload: &[u8]) -> Result<VitalsReading, MalformedPayload> {
    let text = str::from_utf8(payload)
        .map_err(|err| MalformedPayload::new(format!("payload is not utf-8: {}", err)))?;

    let fields: Vec<&str> = text.split(',').collect();
    if fields.len() != 2 {
        return Err(MalformedPayload::new(format!("expected 2 fields, got {}", fields.len())));
    }

    Ok(VitalsReading {
        temperature: parse_field("temperature", fields[0])?,
        heart_rate: parse_field("heart rate", fields[1])?,
    })
}
