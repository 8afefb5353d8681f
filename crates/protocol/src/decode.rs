//! Validation of inbound telemetry frames.
//!
//! [`decode`] is a pure function: it either returns a sample holding exactly
//! the 22 numbers on the wire, or a [`DecodeError`] and no sample at all.

use std::collections::HashMap;

use serde_json::value::RawValue;

use crate::constants::{CHANNEL_COUNT, CHANNEL_NAMES, MAX_FRAME_BYTES};
use crate::telemetry::TelemetrySample;

/// Why a frame could not be turned into a [`TelemetrySample`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a JSON object.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// A required channel is missing, non-numeric, NaN or infinite.
    #[error("schema mismatch on `{field}`: {reason}")]
    SchemaMismatch { field: String, reason: String },
}

/// Decodes one wire frame into a validated sample.
///
/// No unit conversion, clamping or rounding is applied. Keys other than the
/// 22 channels are ignored. Values are kept raw until each channel is read,
/// so a literal that overflows `f64` (`1e400`) is reported against its field
/// as non-finite rather than failing the whole parse.
pub fn decode(raw: &str) -> Result<TelemetrySample, DecodeError> {
    if raw.len() > MAX_FRAME_BYTES {
        return Err(DecodeError::MalformedJson(format!(
            "frame too large ({} bytes)",
            raw.len()
        )));
    }

    let top: &RawValue =
        serde_json::from_str(raw).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    let top_kind = kind(top);
    if top_kind != "an object" {
        return Err(DecodeError::MalformedJson(format!(
            "expected an object, got {top_kind}"
        )));
    }
    let obj: HashMap<String, &RawValue> = serde_json::from_str(top.get())
        .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    let mut channels = [0.0; CHANNEL_COUNT];
    for (slot, name) in channels.iter_mut().zip(CHANNEL_NAMES) {
        let field = obj.get(name).ok_or_else(|| DecodeError::SchemaMismatch {
            field: name.to_string(),
            reason: "missing".into(),
        })?;
        *slot = number(field).ok_or_else(|| DecodeError::SchemaMismatch {
            field: name.to_string(),
            reason: format!("expected a number, got {}", kind(field)),
        })?;
    }

    TelemetrySample::try_from_channels(channels)
}

/// Parses a JSON number literal. Out-of-range literals become infinite.
fn number(value: &RawValue) -> Option<f64> {
    match kind(value) {
        "a number" => value.get().parse().ok(),
        _ => None,
    }
}

/// Describes a syntactically valid JSON value by its first byte.
fn kind(value: &RawValue) -> &'static str {
    match value.get().trim_start().as_bytes().first() {
        Some(b'{') => "an object",
        Some(b'[') => "an array",
        Some(b'"') => "a string",
        Some(b't' | b'f') => "a boolean",
        Some(b'n') => "null",
        _ => "a number",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn valid_frame() -> Value {
        json!({
            "accX": -12.5, "accY": 3.25, "accZ": 998.0,
            "magX": 21.3, "magY": -4.0, "magZ": 40.125,
            "gyrX": 0.0, "gyrY": -0.0625, "gyrZ": 1.5,
            "liaX": 0.1, "liaY": -0.2, "liaZ": 0.3,
            "grvX": 9.0, "grvY": -9.0, "grvZ": 980.7,
            "eulHeading": 359.9375, "eulRoll": -1.5, "eulPitch": 2.0,
            "quaW": 0.99, "quaX": 0.01, "quaY": -0.02, "quaZ": 0.03
        })
    }

    #[test]
    fn decodes_exact_values() {
        let frame = valid_frame();
        let sample = decode(&frame.to_string()).unwrap();

        for (value, name) in sample.channels().iter().zip(CHANNEL_NAMES) {
            assert_eq!(Some(*value), frame[name].as_f64(), "channel {name}");
        }
        assert_eq!(sample.acceleration.z, 998.0);
        assert_eq!(sample.euler.heading, 359.9375);
        assert_eq!(sample.quaternion.x, 0.01);
    }

    #[test]
    fn integer_values_are_numbers() {
        let mut frame = valid_frame();
        frame["accX"] = json!(-1000);
        frame["eulHeading"] = json!(90);
        let sample = decode(&frame.to_string()).unwrap();
        assert_eq!(sample.acceleration.x, -1000.0);
        assert_eq!(sample.euler.heading, 90.0);
    }

    #[test]
    fn extra_keys_are_ignored() {
        let mut frame = valid_frame();
        frame["timestamp"] = json!(1700000000);
        frame["temperature"] = json!("warm");
        assert!(decode(&frame.to_string()).is_ok());
    }

    #[test]
    fn each_missing_field_is_a_schema_mismatch() {
        for name in CHANNEL_NAMES {
            let mut frame = valid_frame();
            frame.as_object_mut().unwrap().remove(name);
            match decode(&frame.to_string()) {
                Err(DecodeError::SchemaMismatch { field, reason }) => {
                    assert_eq!(field, name);
                    assert_eq!(reason, "missing");
                }
                other => panic!("{name}: expected SchemaMismatch, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_numeric_fields_are_schema_mismatches() {
        let bad = [json!(null), json!("1.0"), json!(true), json!([1.0]), json!({"v": 1.0})];
        for value in bad {
            let mut frame = valid_frame();
            frame["gyrY"] = value.clone();
            match decode(&frame.to_string()) {
                Err(DecodeError::SchemaMismatch { field, .. }) => assert_eq!(field, "gyrY"),
                other => panic!("{value}: expected SchemaMismatch, got {other:?}"),
            }
        }
    }

    #[test]
    fn nan_and_infinite_strings_are_schema_mismatches() {
        for text in ["NaN", "Infinity", "-Infinity"] {
            let mut frame = valid_frame();
            frame["quaW"] = json!(text);
            assert!(matches!(
                decode(&frame.to_string()),
                Err(DecodeError::SchemaMismatch { .. })
            ));
        }
    }

    #[test]
    fn overflowing_literal_is_a_schema_mismatch_on_its_field() {
        let mut text = valid_frame().to_string();
        text = text.replace("\"accX\":-12.5", "\"accX\":1e400");
        assert!(text.contains("1e400"));

        match decode(&text) {
            Err(DecodeError::SchemaMismatch { field, reason }) => {
                assert_eq!(field, "accX");
                assert!(reason.contains("finite"), "{reason}");
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }

        let negative = valid_frame().to_string().replace("\"quaZ\":0.03", "\"quaZ\":-1e999");
        assert!(matches!(
            decode(&negative),
            Err(DecodeError::SchemaMismatch { field, .. }) if field == "quaZ"
        ));
    }

    #[test]
    fn tiny_literal_underflows_to_zero() {
        let text = valid_frame().to_string().replace("\"gyrX\":0.0", "\"gyrX\":1e-400");
        assert_eq!(decode(&text).unwrap().gyroscope.x, 0.0);
    }

    #[test]
    fn non_json_is_malformed() {
        for raw in ["", "not json", "{\"accX\": 1.0", "print start", "{\"accX\": NaN}"] {
            assert!(
                matches!(decode(raw), Err(DecodeError::MalformedJson(_))),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn non_object_json_is_malformed() {
        for raw in ["[]", "42", "\"text\"", "null"] {
            match decode(raw) {
                Err(DecodeError::MalformedJson(msg)) => assert!(msg.contains("expected an object")),
                other => panic!("{raw}: expected MalformedJson, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_frame_is_rejected_before_parsing() {
        let huge = " ".repeat(MAX_FRAME_BYTES + 1);
        match decode(&huge) {
            Err(DecodeError::MalformedJson(msg)) => assert!(msg.contains("too large")),
            other => panic!("expected MalformedJson, got {other:?}"),
        }
    }

    #[test]
    fn error_display() {
        let err = DecodeError::SchemaMismatch {
            field: "accX".into(),
            reason: "missing".into(),
        };
        assert_eq!(err.to_string(), "schema mismatch on `accX`: missing");
        assert!(DecodeError::MalformedJson("eof".into()).to_string().contains("eof"));
    }

    #[test]
    fn encoded_sample_decodes_to_itself() {
        let sample = decode(&valid_frame().to_string()).unwrap();
        assert_eq!(decode(&sample.to_json()).unwrap(), sample);
    }
}
