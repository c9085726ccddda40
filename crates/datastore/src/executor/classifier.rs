//! Error classification
//!
//! Turns a driver rejection into a backend-agnostic [`Footprint`].

use crate::error::{DriverError, DriverErrorKind, Footprint, FootprintIdentity};

/// SQLSTATE for `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";

/// Raised when a classifier cannot make sense of an error at all
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Could not classify driver error: {0}")]
pub struct ClassifierError(pub String);

/// Maps raw driver errors to footprints
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &DriverError) -> Result<Footprint, ClassifierError>;
}

/// Classifier for PostgreSQL rejections
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresErrorClassifier;

impl ErrorClassifier for PostgresErrorClassifier {
    fn classify(&self, error: &DriverError) -> Result<Footprint, ClassifierError> {
        if error.kind != DriverErrorKind::Rejected {
            return Err(ClassifierError(format!("not a backend rejection: {}", error.message)));
        }

        match error.code.as_deref() {
            Some(UNIQUE_VIOLATION) => Ok(Footprint {
                identity: FootprintIdentity::NotUnique,
                keys: error.detail.as_deref().map(unique_keys).unwrap_or_default(),
                raw: error.clone(),
            }),
            _ => Ok(Footprint::catchall(error.clone())),
        }
    }
}

/// Columns named in a detail like `Key (a, b)=(1, 2) already exists.`
fn unique_keys(detail: &str) -> Vec<String> {
    let Some(start) = detail.find("Key (") else {
        return Vec::new();
    };
    let rest = &detail[start + "Key (".len()..];
    let Some(end) = rest.find(")=(") else {
        return Vec::new();
    };

    rest[..end]
        .split(',')
        .map(|key| key.trim().trim_matches('"').to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_not_unique() {
        let raw = DriverError::rejected(
            Some(UNIQUE_VIOLATION.to_string()),
            "duplicate key value violates unique constraint",
        )
        .with_detail("Key (email, tenant_id)=(a@b.c, 1) already exists.");

        let footprint = PostgresErrorClassifier.classify(&raw).unwrap();
        assert_eq!(footprint.identity, FootprintIdentity::NotUnique);
        assert_eq!(footprint.keys, vec!["email".to_string(), "tenant_id".to_string()]);
        assert_eq!(footprint.raw, raw);
    }

    #[test]
    fn other_rejections_are_catchall() {
        let raw = DriverError::rejected(Some("23502".to_string()), "null value in column");
        let footprint = PostgresErrorClassifier.classify(&raw).unwrap();
        assert_eq!(footprint.identity, FootprintIdentity::Catchall);
        assert!(footprint.keys.is_empty());
    }

    #[test]
    fn transport_errors_cannot_be_classified() {
        assert!(PostgresErrorClassifier
            .classify(&DriverError::transport("connection reset"))
            .is_err());
    }

    #[test]
    fn malformed_detail_yields_no_keys() {
        assert!(unique_keys("something else").is_empty());
        assert!(unique_keys("Key (email").is_empty());
        assert_eq!(unique_keys(r#"Key ("Email")=(x) already exists."#), vec!["Email".to_string()]);
    }
}
