//! InfluxDB line protocol encoding
//!
//! `measurement[,tag=value...] field=value[,field=value...] timestamp`
//!
//! Measurement names escape commas and spaces; tag keys, tag values and
//! field keys also escape `=`. String field values are double-quoted with
//! `"` and `\` escaped. Integers carry an `i` suffix. Line breaks are written
//! as `\n`/`\r` everywhere so one point never spans two lines.

use std::fmt::Write;

use super::{FieldValue, SinkPoint};

fn escape(out: &mut String, raw: &str, specials: &[char]) {
    for c in raw.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => {
                if specials.contains(&c) {
                    out.push('\\');
                }
                out.push(c);
            },
        }
    }
}

fn escape_measurement(out: &mut String, raw: &str) {
    escape(out, raw, &[',', ' ']);
}

fn escape_key(out: &mut String, raw: &str) {
    escape(out, raw, &[',', '=', ' ']);
}

fn write_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Float(f) => {
            let _ = write!(out, "{}", f);
        },
        FieldValue::Int(i) => {
            let _ = write!(out, "{}i", i);
        },
        FieldValue::Text(s) => {
            out.push('"');
            escape(out, s, &['"', '\\']);
            out.push('"');
        },
    }
}

/// Encode one point, or `None` when it carries no fields
pub fn encode(point: &SinkPoint) -> Option<String> {
    if point.fields.is_empty() {
        return None;
    }

    let mut line = String::new();
    escape_measurement(&mut line, &point.measurement);

    for (key, value) in &point.tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        escape_key(&mut line, key);
        line.push('=');
        escape_key(&mut line, value);
    }

    for (i, (key, value)) in point.fields.iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        escape_key(&mut line, key);
        line.push('=');
        write_field_value(&mut line, value);
    }

    let _ = write!(line, " {}", point.timestamp);
    Some(line)
}

/// Encode a batch as newline-separated lines, skipping empty points
pub fn encode_batch(points: &[SinkPoint]) -> String {
    points
        .iter()
        .filter_map(encode)
        .collect::<Vec<_>>()
        .join("\n")
}
