//! `${ENV_VAR}` substitution in raw config text
//!
//! Substitution happens on the raw TOML before parsing, so any string
//! value can reference the environment (database URLs in particular).

use regex::Regex;
use tracing::debug;

use crate::parser::ConfigError;

/// Replace every `${NAME}` with the value of the environment variable
/// `NAME`, erroring on the first unset variable
pub fn substitute_env(raw: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{(\w+)\}").unwrap();
    let mut result = raw.to_string();

    for caps in re.captures_iter(raw) {
        let placeholder = &caps[0];
        let name = &caps[1];

        match std::env::var(name) {
            Ok(value) => {
                debug!("Substituting environment variable: {}", name);
                result = result.replace(placeholder, &value);
            }
            Err(_) => {
                return Err(ConfigError::Substitution(format!(
                    "environment variable {} is not set",
                    name
                )));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(substitute_env("url = \"x\"").unwrap(), "url = \"x\"");
    }

    #[test]
    fn test_substitutes_set_variable() {
        std::env::set_var("CONFIG_TEST_VALUE", "hello");
        let out = substitute_env("greeting = \"${CONFIG_TEST_VALUE}\"").unwrap();
        assert_eq!(out, "greeting = \"hello\"");
    }

    #[test]
    fn test_substitutes_repeated_references() {
        std::env::set_var("CONFIG_TEST_REPEATED", "v");
        let out = substitute_env("a = \"${CONFIG_TEST_REPEATED}\"\nb = \"${CONFIG_TEST_REPEATED}\"")
            .unwrap();
        assert_eq!(out, "a = \"v\"\nb = \"v\"");
    }

    #[test]
    fn test_missing_variable_errors() {
        let err = substitute_env("x = \"${CONFIG_TEST_DEFINITELY_UNSET}\"").unwrap_err();
        assert!(err.to_string().contains("CONFIG_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_malformed_reference_passes_through() {
        // Not a well-formed placeholder, so nothing is substituted.
        assert_eq!(substitute_env("x = \"${OOPS\"").unwrap(), "x = \"${OOPS\"");
    }
}
