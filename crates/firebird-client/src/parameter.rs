//! Command parameters.

use firebird_types::{SqlValue, ToSql};

use crate::error::{Error, Result};

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDirection {
    /// Value sent to the server.
    #[default]
    Input,
    /// Value returned by a stored procedure.
    Output,
    /// Sent, then overwritten with the procedure's output.
    InputOutput,
    /// Procedure return value.
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the parameter is sent to the server.
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }

    /// Whether the parameter receives a value after execution.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output | Self::InputOutput | Self::ReturnValue)
    }
}

/// A named command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    direction: ParameterDirection,
    value: SqlValue,
}

impl Parameter {
    /// Create an input parameter.
    ///
    /// The name may be given with or without its leading `@`.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            direction: ParameterDirection::Input,
            value: value.into(),
        }
    }

    /// Create an input parameter from any [`ToSql`] value.
    pub fn from_sql(name: impl Into<String>, value: &dyn ToSql) -> Result<Self> {
        Ok(Self::new(name, value.to_sql()?))
    }

    /// Create an output parameter with a NULL value.
    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, SqlValue::Null).with_direction(ParameterDirection::Output)
    }

    /// Set the direction.
    #[must_use]
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Parameter name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter direction.
    #[must_use]
    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    /// Current value; output parameters hold the captured value after
    /// execution.
    #[must_use]
    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    /// Replace the value.
    pub fn set_value(&mut self, value: impl Into<SqlValue>) {
        self.value = value.into();
    }

    /// Whether this parameter answers to `placeholder`.
    ///
    /// Names compare case-insensitively, ignoring a leading `@` on
    /// either side.
    #[must_use]
    pub fn matches(&self, placeholder: &str) -> bool {
        bare(&self.name).eq_ignore_ascii_case(bare(placeholder))
    }
}

fn bare(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

/// Resolve the values to send for the current statement.
///
/// With named placeholders, each name picks the matching parameter; the
/// number of names must equal the number of slots the server described.
/// Otherwise input parameters bind in declaration order.
pub(crate) fn bind_values(
    parameters: &[Parameter],
    names: &[String],
    slots: usize,
) -> Result<Vec<SqlValue>> {
    if !names.is_empty() {
        if names.len() != slots {
            return Err(Error::Parameter(format!(
                "statement has {slots} parameter slots but {} named placeholders",
                names.len()
            )));
        }
        return names
            .iter()
            .map(|name| {
                parameters
                    .iter()
                    .find(|p| p.matches(name))
                    .map(|p| p.value.clone())
                    .ok_or_else(|| Error::Parameter(format!("no value bound for {name}")))
            })
            .collect();
    }

    let values: Vec<SqlValue> = parameters
        .iter()
        .filter(|p| p.direction.is_input())
        .map(|p| p.value.clone())
        .take(slots)
        .collect();
    if values.len() != slots {
        return Err(Error::Parameter(format!(
            "statement expects {slots} parameters, {} input parameters bound",
            values.len()
        )));
    }
    Ok(values)
}

/// Copy the first row's values into output parameters in declaration
/// order.
pub(crate) fn capture_outputs(parameters: &mut [Parameter], row: &[SqlValue]) {
    let mut values = row.iter();
    for parameter in parameters.iter_mut().filter(|p| p.direction.is_output()) {
        match values.next() {
            Some(value) => parameter.value = value.clone(),
            None => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching() {
        let p = Parameter::new("@CustomerId", 1);
        assert!(p.matches("@customerid"));
        assert!(p.matches("CUSTOMERID"));
        assert!(!p.matches("@customer"));
        assert!(Parameter::new("id", 1).matches("@ID"));
    }

    #[test]
    fn test_bind_named_in_placeholder_order() {
        let params = vec![Parameter::new("@a", 1), Parameter::new("@b", "x")];
        let names = vec!["@b".to_string(), "@A".to_string(), "@b".to_string()];
        let values = bind_values(&params, &names, 3).unwrap();
        assert_eq!(
            values,
            vec![SqlValue::from("x"), SqlValue::Int(1), SqlValue::from("x")]
        );
    }

    #[test]
    fn test_bind_named_count_mismatch() {
        let params = vec![Parameter::new("@a", 1)];
        let names = vec!["@a".to_string()];
        assert!(matches!(
            bind_values(&params, &names, 2),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn test_bind_named_missing_value() {
        let names = vec!["@missing".to_string()];
        assert!(bind_values(&[], &names, 1).is_err());
    }

    #[test]
    fn test_bind_positional_skips_outputs() {
        let params = vec![
            Parameter::new("a", 1),
            Parameter::output("out"),
            Parameter::new("b", 2).with_direction(ParameterDirection::InputOutput),
        ];
        let values = bind_values(&params, &[], 2).unwrap();
        assert_eq!(values, vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert!(bind_values(&params, &[], 3).is_err());
    }

    #[test]
    fn test_capture_outputs() {
        let mut params = vec![
            Parameter::new("in", 1),
            Parameter::output("total"),
            Parameter::new("io", 0).with_direction(ParameterDirection::InputOutput),
            Parameter::output("rv").with_direction(ParameterDirection::ReturnValue),
        ];
        capture_outputs(&mut params, &[SqlValue::BigInt(10), SqlValue::Int(7)]);
        assert_eq!(params[0].value(), &SqlValue::Int(1));
        assert_eq!(params[1].value(), &SqlValue::BigInt(10));
        assert_eq!(params[2].value(), &SqlValue::Int(7));
        assert_eq!(params[3].value(), &SqlValue::Null);
    }
}
