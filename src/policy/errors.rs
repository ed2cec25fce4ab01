use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Invalid check string `{check_str}`: {message}")]
    #[diagnostic(
        code(verdict::policy::parse),
        help("Terms: role:<name>, system_scope:all, user_id:%(target.<path>)s, @, !. Combine with `and`, `or`, `not` and parentheses")
    )]
    Parse { check_str: String, message: String },

    #[error("Rule `{0}` is registered more than once")]
    #[diagnostic(
        code(verdict::policy::duplicate_rule),
        help("Each operation name may only appear once in the rule definitions")
    )]
    DuplicateRule(String),

    #[error("Unknown operation `{0}`")]
    #[diagnostic(
        code(verdict::policy::unknown_operation),
        help("Operation names look like identity:<action>_<resource>; run `verdict sample` to list them")
    )]
    UnknownOperation(String),

    #[error("Target attribute `{0}` is missing")]
    #[diagnostic(code(verdict::policy::missing_attribute))]
    MissingAttribute(String),

    #[error("Invalid override: {0}")]
    #[diagnostic(
        code(verdict::policy::invalid_override),
        help("Override syntax: rule \"identity:get_credential\" \"<check string>\"")
    )]
    InvalidOverride(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(verdict::policy::kdl_parse),
        help("Check the KDL syntax of the override file. The format is described at https://kdl.dev")
    )]
    KdlParse(String),

    #[error("Failed to load override file `{path}`")]
    #[diagnostic(
        code(verdict::policy::override_load),
        help("Check that the file exists and is readable")
    )]
    OverrideLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PolicyError {
    pub(crate) fn parse(check_str: &str, message: impl Into<String>) -> Self {
        PolicyError::Parse {
            check_str: check_str.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for PolicyError {
    fn into_response(self) -> Response {
        let status = match &self {
            PolicyError::UnknownOperation(_) => StatusCode::NOT_FOUND,
            PolicyError::Parse { .. }
            | PolicyError::InvalidOverride(_)
            | PolicyError::KdlParse(_)
            | PolicyError::DuplicateRule(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdl_parse_help() {
        let err = PolicyError::KdlParse("unexpected token".into());
        let help = err.help().unwrap().to_string();
        assert!(help.contains("https://kdl.dev"));
    }

    #[test]
    fn test_status_codes() {
        let not_found = PolicyError::UnknownOperation("identity:get_widget".into()).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        let bad = PolicyError::parse("role:", "`role:` requires a value").into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
