//! Status vector decoding.
//!
//! Every `op_response` ends with a status vector: clusters of an argument
//! type followed by its value, terminated by `isc_arg_end`. A vector may
//! carry errors, warnings, or nothing at all.

use bytes::Buf;

use crate::error::ProtocolError;
use crate::isc::{arg, gds};
use crate::xdr;

/// Severity of a status entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The request failed.
    Error,
    /// The request succeeded with a warning.
    Warning,
}

/// A single decoded error or warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// GDS error code.
    pub code: i32,
    /// Whether this entry is an error or a warning.
    pub severity: Severity,
    /// Formatted message text.
    pub message: String,
    /// SQLSTATE, when the server sent one.
    pub sql_state: Option<String>,
    /// Line number for DSQL position errors.
    pub line: Option<i32>,
    /// Column number for DSQL position errors.
    pub column: Option<i32>,
}

impl ServerError {
    /// Severity class: 1 for warnings, 2 for errors.
    #[must_use]
    pub fn class(&self) -> u8 {
        match self.severity {
            Severity::Warning => 1,
            Severity::Error => 2,
        }
    }
}

/// Decoded status vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusVector {
    /// Error entries, in server order.
    pub errors: Vec<ServerError>,
    /// Warning entries, in server order.
    pub warnings: Vec<ServerError>,
}

impl StatusVector {
    /// Whether the vector reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Primary error code, if the vector reports a failure.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.errors.first().map(|e| e.code)
    }

    /// All error messages joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Build a vector reporting a single client-detected error.
    #[must_use]
    pub fn single(code: i32, args: &[&str]) -> Self {
        Self {
            errors: vec![ServerError {
                code,
                severity: Severity::Error,
                message: format_message(code, args),
                sql_state: None,
                line: None,
                column: None,
            }],
            warnings: Vec::new(),
        }
    }
}

/// Pending entry while its arguments are being collected.
struct Pending {
    code: i32,
    severity: Severity,
    args: Vec<String>,
    numbers: Vec<i32>,
    interpreted: Option<String>,
}

impl Pending {
    fn finish(self, sql_state: Option<String>) -> ServerError {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let message = self
            .interpreted
            .unwrap_or_else(|| format_message(self.code, &args));
        let (line, column) = if self.code == gds::DSQL_LINE_COL_ERROR {
            (self.numbers.first().copied(), self.numbers.get(1).copied())
        } else {
            (None, None)
        };
        ServerError {
            code: self.code,
            severity: self.severity,
            message,
            sql_state,
            line,
            column,
        }
    }
}

/// Read a status vector from the wire.
pub fn read_status_vector(src: &mut impl Buf) -> Result<StatusVector, ProtocolError> {
    let mut vector = StatusVector::default();
    let mut pending: Option<Pending> = None;
    let mut sql_state: Option<String> = None;

    let flush = |vector: &mut StatusVector, pending: Option<Pending>, state: Option<String>| {
        if let Some(entry) = pending {
            let entry = entry.finish(state);
            match entry.severity {
                Severity::Error => vector.errors.push(entry),
                Severity::Warning => vector.warnings.push(entry),
            }
        }
    };

    loop {
        let arg_type = xdr::read_i32(src)?;
        match arg_type {
            arg::END => break,
            arg::GDS | arg::WARNING => {
                let code = xdr::read_i32(src)?;
                // A zero gds code terminates a successful vector.
                if code == 0 {
                    continue;
                }
                flush(&mut vector, pending.take(), sql_state.take());
                pending = Some(Pending {
                    code,
                    severity: if arg_type == arg::GDS {
                        Severity::Error
                    } else {
                        Severity::Warning
                    },
                    args: Vec::new(),
                    numbers: Vec::new(),
                    interpreted: None,
                });
            }
            arg::STRING | arg::CSTRING => {
                let value = xdr::read_string(src)?;
                if let Some(entry) = pending.as_mut() {
                    entry.args.push(value);
                }
            }
            arg::INTERPRETED => {
                let value = xdr::read_string(src)?;
                if let Some(entry) = pending.as_mut() {
                    entry.interpreted = Some(value);
                }
            }
            arg::NUMBER => {
                let value = xdr::read_i32(src)?;
                if let Some(entry) = pending.as_mut() {
                    entry.numbers.push(value);
                    entry.args.push(value.to_string());
                }
            }
            arg::SQL_STATE => {
                sql_state = Some(xdr::read_string(src)?);
            }
            other => return Err(ProtocolError::UnknownStatusArgument(other)),
        }
    }
    flush(&mut vector, pending.take(), sql_state.take());

    Ok(vector)
}

/// Format a message for a code, substituting `@1`, `@2`, ... with `args`.
#[must_use]
pub fn format_message(code: i32, args: &[&str]) -> String {
    let Some(template) = message_template(code) else {
        let mut text = format!("GDS error {code}");
        if !args.is_empty() {
            text.push_str(": ");
            text.push_str(&args.join(", "));
        }
        return text;
    };

    let mut text = template.to_string();
    // Substitute from the highest placeholder down so "@1" never eats "@10".
    for (i, value) in args.iter().enumerate().rev() {
        text = text.replace(&format!("@{}", i + 1), value);
    }
    text
}

fn message_template(code: i32) -> Option<&'static str> {
    Some(match code {
        335_544_321 => "arithmetic exception, numeric overflow, or string truncation",
        335_544_332 => "invalid transaction handle (expecting explicit transaction start)",
        335_544_344 => "I/O error for file \"@1\"",
        335_544_345 => "lock conflict on no wait transaction",
        335_544_349 => "attempt to store duplicate value (visible to active transactions) in unique index \"@1\"",
        335_544_357 => "cannot disconnect database with open transactions (@1 active)",
        335_544_375 => "unavailable database",
        335_544_421 => "connection rejected by remote interface",
        335_544_436 => "SQL error code = @1",
        335_544_466 => "violation of FOREIGN KEY constraint \"@1\" on table \"@2\"",
        335_544_468 => "transaction @1 is @2",
        335_544_472 => "Your user name and password are not defined. Ask your database administrator to set up a Firebird login.",
        335_544_485 => "invalid statement handle",
        335_544_558 => "Operation violates CHECK constraint @1 on view or table @2",
        335_544_569 => "Dynamic SQL Error",
        335_544_578 => "Column unknown",
        335_544_580 => "Table unknown",
        335_544_583 => "SQLDA error",
        335_544_634 => "Token unknown - line @1, column @2",
        335_544_665 => "violation of PRIMARY or UNIQUE KEY constraint \"@1\" on table \"@2\"",
        335_544_721 => "Unable to complete network request to host \"@1\".",
        335_544_726 => "Error reading data from the connection.",
        335_544_727 => "Error writing data to the connection.",
        _ => return None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn put_string(buf: &mut BytesMut, value: &str) {
        xdr::write_string(buf, value.as_bytes());
    }

    #[test]
    fn test_empty_vector() {
        let mut buf = BytesMut::new();
        buf.put_i32(arg::GDS);
        buf.put_i32(0);
        buf.put_i32(arg::END);
        let vector = read_status_vector(&mut buf.freeze()).unwrap();
        assert!(!vector.is_error());
        assert!(vector.warnings.is_empty());
    }

    #[test]
    fn test_error_with_arguments_and_position() {
        let mut buf = BytesMut::new();
        buf.put_i32(arg::GDS);
        buf.put_i32(335_544_569);
        buf.put_i32(arg::GDS);
        buf.put_i32(gds::DSQL_LINE_COL_ERROR);
        buf.put_i32(arg::NUMBER);
        buf.put_i32(1);
        buf.put_i32(arg::NUMBER);
        buf.put_i32(8);
        buf.put_i32(arg::SQL_STATE);
        put_string(&mut buf, "42000");
        buf.put_i32(arg::END);

        let vector = read_status_vector(&mut buf.freeze()).unwrap();
        assert_eq!(vector.errors.len(), 2);
        assert_eq!(vector.code(), Some(335_544_569));
        assert_eq!(vector.errors[1].message, "Token unknown - line 1, column 8");
        assert_eq!(vector.errors[1].line, Some(1));
        assert_eq!(vector.errors[1].column, Some(8));
        assert_eq!(vector.errors[1].sql_state.as_deref(), Some("42000"));
        assert_eq!(vector.message(), "Dynamic SQL Error\nToken unknown - line 1, column 8");
    }

    #[test]
    fn test_warning_is_not_error() {
        let mut buf = BytesMut::new();
        buf.put_i32(arg::WARNING);
        buf.put_i32(335_544_808);
        buf.put_i32(arg::STRING);
        put_string(&mut buf, "X");
        buf.put_i32(arg::END);
        let vector = read_status_vector(&mut buf.freeze()).unwrap();
        assert!(!vector.is_error());
        assert_eq!(vector.warnings.len(), 1);
        assert_eq!(vector.warnings[0].class(), 1);
        assert_eq!(vector.warnings[0].message, "GDS error 335544808: X");
    }

    #[test]
    fn test_interpreted_message_wins() {
        let mut buf = BytesMut::new();
        buf.put_i32(arg::GDS);
        buf.put_i32(335_544_345);
        buf.put_i32(arg::INTERPRETED);
        put_string(&mut buf, "custom text");
        buf.put_i32(arg::END);
        let vector = read_status_vector(&mut buf.freeze()).unwrap();
        assert_eq!(vector.errors[0].message, "custom text");
    }

    #[test]
    fn test_unknown_argument_type() {
        let mut buf = BytesMut::new();
        buf.put_i32(77);
        assert_eq!(
            read_status_vector(&mut buf.freeze()),
            Err(ProtocolError::UnknownStatusArgument(77))
        );
    }

    #[test]
    fn test_single_formats_arguments() {
        let vector = StatusVector::single(gds::TRA_STATE, &["5", "committed"]);
        assert_eq!(vector.message(), "transaction 5 is committed");
    }
}
