use crate::{
    middleware::validation::{ApiRequestData, RulesError, ValidationResult, ValidationRules},
    password::MAX_PASSWORD_BYTES,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const MIN_PASSWORD_BYTES: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_SEARCH_LENGTH: usize = 200;
const MAX_PAGE_LIMIT: u64 = 100;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()\-]{7,20}$").expect("phone pattern is valid"));

static SORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?[A-Za-z_][A-Za-z0-9_]*(,-?[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("sort pattern is valid")
});

/// Built-in rules for the booking API's account and listing endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidationRules;

impl DefaultValidationRules {
    fn check_email(body: &Value, result: &mut ValidationResult) {
        match body.get("email").and_then(Value::as_str).map(str::trim) {
            None | Some("") => result.add_error("email", "Email is required"),
            Some(email) if email.len() > MAX_EMAIL_LENGTH || !EMAIL.is_match(email) => {
                result.add_error("email", "Email must be a valid email address");
            }
            Some(_) => {}
        }
    }

    fn check_new_password(body: &Value, result: &mut ValidationResult) {
        let Some(password) = body.get("password").and_then(Value::as_str) else {
            result.add_error("password", "Password is required");
            return;
        };

        if password.len() < MIN_PASSWORD_BYTES || password.len() > MAX_PASSWORD_BYTES {
            result.add_error(
                "password",
                format!(
                    "Password must be between {MIN_PASSWORD_BYTES} and {MAX_PASSWORD_BYTES} bytes"
                ),
            );
            return;
        }

        let has_upper = password.chars().any(char::is_uppercase);
        let has_lower = password.chars().any(char::is_lowercase);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_symbol = password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());

        if !(has_upper && has_lower && has_digit && has_symbol) {
            result.add_error(
                "password",
                "Password must contain an uppercase letter, a lowercase letter, a digit and a symbol",
            );
        }
    }

    fn check_query(query: &[(String, String)], result: &mut ValidationResult) {
        for (key, value) in query {
            match key.as_str() {
                "page" => {
                    if !value.parse::<u64>().is_ok_and(|page| page >= 1) {
                        result.add_error("page", "Page must be a positive integer");
                    }
                }
                "limit" => {
                    if !value.parse::<u64>().is_ok_and(|l| (1..=MAX_PAGE_LIMIT).contains(&l)) {
                        result.add_error(
                            "limit",
                            format!("Limit must be an integer between 1 and {MAX_PAGE_LIMIT}"),
                        );
                    }
                }
                "sort" => {
                    if !SORT.is_match(value) {
                        result.add_error(
                            "sort",
                            "Sort must be a comma-separated list of field names, optionally prefixed with '-'",
                        );
                    }
                }
                "search" => {
                    if value.chars().count() > MAX_SEARCH_LENGTH {
                        result.add_error(
                            "search",
                            format!("Search must be at most {MAX_SEARCH_LENGTH} characters"),
                        );
                    }
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl ValidationRules for DefaultValidationRules {
    async fn validate_registration(&self, body: &Value) -> Result<ValidationResult, RulesError> {
        let mut result = ValidationResult::valid();

        match body.get("name").and_then(Value::as_str).map(str::trim) {
            None | Some("") => result.add_error("name", "Name is required"),
            Some(name) if !(2..=100).contains(&name.chars().count()) => {
                result.add_error("name", "Name must be between 2 and 100 characters");
            }
            Some(_) => {}
        }

        Self::check_email(body, &mut result);
        Self::check_new_password(body, &mut result);

        if let Some(phone) = body.get("phone").filter(|p| !p.is_null()) {
            if !phone.as_str().is_some_and(|p| PHONE.is_match(p)) {
                result.add_error("phone", "Phone must be a valid phone number");
            }
        }

        Ok(result)
    }

    async fn validate_login(&self, body: &Value) -> Result<ValidationResult, RulesError> {
        let mut result = ValidationResult::valid();

        Self::check_email(body, &mut result);
        if body.get("password").and_then(Value::as_str).map_or(true, str::is_empty) {
            result.add_error("password", "Password is required");
        }

        Ok(result)
    }

    async fn validate_api_request(
        &self,
        request: &ApiRequestData<'_>,
    ) -> Result<ValidationResult, RulesError> {
        let mut result = ValidationResult::valid();

        Self::check_query(request.query, &mut result);

        if matches!(request.method, "POST" | "PUT" | "PATCH")
            && !request.body.is_some_and(Value::is_object)
        {
            result.add_error("body", "Request body must be a JSON object");
        }

        Ok(result)
    }
}
