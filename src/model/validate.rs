//! Field checks shared by input validation and backend row parsing.

use url::Url;

use crate::error::ValidationErrors;

/// Structural email check: one `@`, a non-empty local part, a dotted domain,
/// no whitespace.
pub fn is_valid_email(s: &str) -> bool {
  if s.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = s.split_once('@') else {
    return false;
  };
  if local.is_empty() || domain.contains('@') {
    return false;
  }
  let labels: Vec<&str> = domain.split('.').collect();
  labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

pub fn is_valid_url(s: &str) -> bool {
  Url::parse(s).is_ok()
}

/// Thin helpers over [`ValidationErrors`] so checks read as a list of rules.
pub(crate) trait Checks {
  fn require(&mut self, field: &str, value: &str, message: &str);
  fn email(&mut self, field: &str, value: &str);
  fn positive(&mut self, field: &str, value: f64, message: &str);
  fn url(&mut self, field: &str, value: &str);
}

impl Checks for ValidationErrors {
  fn require(&mut self, field: &str, value: &str, message: &str) {
    if value.trim().is_empty() {
      self.push(field, message);
    }
  }

  fn email(&mut self, field: &str, value: &str) {
    if !is_valid_email(value) {
      self.push(field, "Invalid email address");
    }
  }

  fn positive(&mut self, field: &str, value: f64, message: &str) {
    if !(value.is_finite() && value > 0.0) {
      self.push(field, message);
    }
  }

  fn url(&mut self, field: &str, value: &str) {
    if !is_valid_url(value) {
      self.push(field, "Invalid URL");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_email() {
    assert!(is_valid_email("client@example.com"));
    assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
    assert!(!is_valid_email("client@"));
    assert!(!is_valid_email("@example.com"));
    assert!(!is_valid_email("client@example"));
    assert!(!is_valid_email("client@@example.com"));
    assert!(!is_valid_email("cli ent@example.com"));
    assert!(!is_valid_email("client@example..com"));
  }

  #[test]
  fn test_url() {
    assert!(is_valid_url("https://cdn.example.com/a.png"));
    assert!(!is_valid_url("not a url"));
  }

  #[test]
  fn test_positive_rejects_nan_and_zero() {
    let mut errors = ValidationErrors::new("test");
    errors.positive("a", 0.0, "must be positive");
    errors.positive("b", f64::NAN, "must be positive");
    errors.positive("c", -1.0, "must be positive");
    errors.positive("d", 0.01, "must be positive");
    assert_eq!(errors.fields.len(), 3);
    assert!(errors.field("d").is_none());
  }
}
