//! # AT Reply Decoder
//!
//! Classifies reply lines into success values or typed device errors.
//!
//! Leading blank lines and trailing whitespace are ignored. The first
//! non-blank line must start with a known status token; anything else is a
//! protocol error rather than a guess.

use std::str::FromStr;

use super::protocol::*;
use crate::error::{DriverError, Result};

/// Decode the reply to `command`
///
/// # Returns
///
/// * `Ok(Reply)` - `OK`, `+<OPCODE>=OK`, or an echoed value
///
/// # Errors
///
/// * `DeviceRejected` - the module answered with an error token
/// * `Protocol` - empty reply, reply for another opcode, or an unknown token
pub fn decode_reply(raw: &[u8], command: &Command, dialect: &Dialect) -> Result<Reply> {
    let text = String::from_utf8_lossy(raw);
    let line = status_lines(&text)
        .next()
        .ok_or_else(|| DriverError::Protocol("empty reply".to_string()))?;

    classify_line(line, command.opcode(), dialect)
}

/// Non-blank, trimmed lines of a reply
fn status_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn classify_line(line: &str, opcode: Option<Opcode>, dialect: &Dialect) -> Result<Reply> {
    if line == OK_TOKEN {
        return Ok(Reply::Ok);
    }

    if let Some(rest) = line.strip_prefix(ERROR_TOKEN) {
        return Err(rejection(line, rest, dialect));
    }

    let Some(echo) = line.strip_prefix('+') else {
        return Err(DriverError::Protocol(format!("unexpected reply '{}'", line)));
    };

    let (token, value) = match echo.split_once('=') {
        Some((token, value)) => (token, Some(value.trim())),
        None => (echo, None),
    };

    match opcode {
        Some(expected) if token == expected.as_str() => {}
        Some(expected) => {
            return Err(DriverError::Protocol(format!(
                "reply '{}' does not match command {}",
                line, expected
            )));
        }
        None => {
            return Err(DriverError::Protocol(format!(
                "unexpected reply '{}' to probe",
                line
            )));
        }
    }

    match value {
        None | Some(OK_TOKEN) => Ok(Reply::Ok),
        Some(FAIL_TOKEN) => Err(DriverError::DeviceRejected {
            code: ResponseCode::Unrecognized,
            reason: line.to_string(),
        }),
        Some(v) if v.starts_with(ERROR_TOKEN) => {
            Err(rejection(line, &v[ERROR_TOKEN.len()..], dialect))
        }
        Some(v) if opcode == Some(Opcode::Send) && SEND_QUEUED_TOKENS.contains(&v) => Ok(Reply::Ok),
        Some(v) => Ok(Reply::Value(v.to_string())),
    }
}

/// Build a `DeviceRejected` from the text following `ERROR`
fn rejection(line: &str, rest: &str, dialect: &Dialect) -> DriverError {
    let token = rest
        .trim_start_matches([':', '=', ' ', '('])
        .trim_end_matches(')')
        .trim();

    DriverError::DeviceRejected {
        code: dialect.response_code(token),
        reason: line.to_string(),
    }
}

/// Extract a typed value from a getter reply
///
/// # Errors
///
/// Returns `Protocol` if the reply carries no value or the value does not
/// parse as `T`
pub fn decode_value<T: FromStr>(reply: Reply, opcode: Opcode) -> Result<T> {
    match reply {
        Reply::Value(value) => value.parse().map_err(|_| {
            DriverError::Protocol(format!("malformed {} value '{}'", opcode, value))
        }),
        Reply::Ok => Err(DriverError::Protocol(format!(
            "reply to {} query carries no value",
            opcode
        ))),
    }
}

/// Decode the value of a `+JOIN=` reply
pub fn decode_join_status(reply: Reply) -> Result<bool> {
    match decode_value::<String>(reply, Opcode::Join)?.as_str() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(DriverError::Protocol(format!(
            "unexpected join status '{}'",
            other
        ))),
    }
}

/// Decode the reply to `AT+RECV?`
///
/// # Returns
///
/// * `Ok(Some(hex))` - frame hex of the last received frame in the reply
/// * `Ok(None)` - nothing pending (`+RECV=OK`, empty marker, empty value)
///
/// The frame hex is the last tab- or space-separated field of the
/// `+RECV=` value, so both `+RECV=<frame>` and `+RECV=<meta>\t<frame>` work.
pub fn decode_received(raw: &[u8], dialect: &Dialect) -> Result<Option<String>> {
    let text = String::from_utf8_lossy(raw);
    let query = Command::Query(Opcode::Recv);
    let mut frame = None;
    let mut saw_status = false;

    for line in status_lines(&text) {
        let line = match line.find(dialect.empty_marker.as_str()) {
            Some(_) if dialect.empty_marker.is_empty() => line,
            Some(pos) => line[..pos].trim_end(),
            None => line,
        };
        if line.is_empty() {
            saw_status = true;
            continue;
        }

        match classify_line(line, query.opcode(), dialect)? {
            Reply::Ok => {}
            Reply::Value(value) => {
                if let Some(field) = value.rsplit(['\t', ' ']).next().map(str::trim) {
                    if !field.is_empty() {
                        frame = Some(field.to_string());
                    }
                }
            }
        }
        saw_status = true;
    }

    if !saw_status {
        return Err(DriverError::Protocol("empty reply".to_string()));
    }

    Ok(frame)
}
