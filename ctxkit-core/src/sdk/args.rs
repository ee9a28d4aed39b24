//! Positional argument access for bridge calls. `null` and missing
//! arguments are treated alike, since `undefined` converts to `null`.

use super::error::SdkError;
use super::surface::SdkFunction;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(super) struct Args {
    function: SdkFunction,
    values: Vec<Value>,
}

impl Args {
    pub fn new(function: SdkFunction, values: Vec<Value>) -> Self {
        Self { function, values }
    }

    pub fn function(&self) -> SdkFunction {
        self.function
    }

    pub fn invalid(&self, message: impl Into<String>) -> SdkError {
        SdkError::invalid(self.function.name(), message)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).filter(|value| !value.is_null())
    }

    pub fn string(&self, index: usize, name: &str) -> Result<&str, SdkError> {
        self.opt_string(index, name)?
            .ok_or_else(|| self.invalid(format!("'{name}' is required")))
    }

    pub fn opt_string(&self, index: usize, name: &str) -> Result<Option<&str>, SdkError> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text)),
            Some(other) => Err(self.invalid(format!(
                "'{name}' must be a string, got {}",
                type_name(other)
            ))),
        }
    }

    pub fn opt_f64(&self, index: usize, name: &str) -> Result<Option<f64>, SdkError> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::Number(number)) => Ok(number.as_f64()),
            Some(other) => Err(self.invalid(format!(
                "'{name}' must be a number, got {}",
                type_name(other)
            ))),
        }
    }

    /// Deserialize an options object, falling back to its `Default`.
    pub fn options<T: DeserializeOwned + Default>(&self, index: usize) -> Result<T, SdkError> {
        match self.get(index) {
            None => Ok(T::default()),
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map_err(|error| self.invalid(format!("invalid options: {error}"))),
            Some(other) => Err(self.invalid(format!(
                "options must be an object, got {}",
                type_name(other)
            ))),
        }
    }
}

pub(super) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Clamp an optional count into `1..=ceiling`, using `default` when absent.
pub(super) fn bounded_count(requested: Option<usize>, default: usize, ceiling: usize) -> usize {
    requested.unwrap_or(default).clamp(1, ceiling.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    struct Opts {
        max_results: Option<usize>,
        ignore_case: bool,
    }

    #[test]
    fn null_counts_as_missing() {
        let args = Args::new(SdkFunction::FilesRead, vec![Value::Null]);
        let error = args.string(0, "path").unwrap_err();
        assert_eq!(error.to_string(), "files.read: 'path' is required");
    }

    #[test]
    fn wrong_types_are_reported() {
        let args = Args::new(SdkFunction::FilesRead, vec![json!(3)]);
        let error = args.string(0, "path").unwrap_err();
        assert!(error.to_string().contains("must be a string, got number"));
    }

    #[test]
    fn options_use_camel_case_and_defaults() {
        let args = Args::new(
            SdkFunction::SearchGrep,
            vec![json!("x"), json!({"maxResults": 5})],
        );
        let opts: Opts = args.options(1).unwrap();
        assert_eq!(
            opts,
            Opts {
                max_results: Some(5),
                ignore_case: false
            }
        );
        let missing: Opts = args.options(2).unwrap();
        assert_eq!(missing, Opts::default());
    }

    #[test]
    fn counts_are_clamped() {
        assert_eq!(bounded_count(None, 10, 100), 10);
        assert_eq!(bounded_count(Some(0), 10, 100), 1);
        assert_eq!(bounded_count(Some(500), 10, 100), 100);
    }
}
