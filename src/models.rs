use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use std::fmt::Write;

/// Customer
///
/// The only persisted entity, stored one row per record in the `customers`
/// table. The same shape is used as request and response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Customer {
    /// Primary key. Left empty by the caller to have one generated on create.
    #[serde(default)]
    #[schema(example = "c1")]
    pub id: String,
    #[schema(example = "Acme")]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    /// True when the record names its own key; blank ids count as absent.
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Returns the record with a freshly generated id if it arrived without one.
    pub fn with_assigned_id(mut self) -> Self {
        if !self.has_id() {
            self.id = Uuid::new_v4().to_string();
        }
        self
    }

    /// Canonical location of this record, with the id percent-encoded as a
    /// single path segment.
    ///
    /// `None` for ids no path segment can carry (`.` and `..` are collapsed by
    /// every URL resolver).
    pub fn location(&self) -> Option<String> {
        if matches!(self.id.as_str(), "." | "..") {
            return None;
        }
        let mut location = String::from("/customers/");
        for byte in self.id.bytes() {
            if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
                location.push(char::from(byte));
            } else {
                write!(location, "%{byte:02X}").ok()?;
            }
        }
        Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_id_and_contact_fields_deserialize_as_empty() {
        let customer: Customer = serde_json::from_str(r#"{"name":"Acme"}"#).unwrap();
        assert_eq!(customer.id, "");
        assert_eq!(customer.email, None);
        assert_eq!(customer.phone, None);
    }

    #[test]
    fn caller_supplied_id_is_kept() {
        let customer = Customer {
            id: "c1".into(),
            name: "Acme".into(),
            ..Default::default()
        }
        .with_assigned_id();
        assert_eq!(customer.id, "c1");
        assert_eq!(customer.location().as_deref(), Some("/customers/c1"));
    }

    #[test]
    fn blank_id_is_replaced_with_a_uuid() {
        let customer = Customer {
            id: "  ".into(),
            name: "Acme".into(),
            ..Default::default()
        }
        .with_assigned_id();
        assert!(Uuid::parse_str(&customer.id).is_ok());
    }

    #[test]
    fn location_escapes_reserved_characters() {
        let location = |id: &str| {
            Customer {
                id: id.into(),
                ..Default::default()
            }
            .location()
        };

        assert_eq!(location("a/b").as_deref(), Some("/customers/a%2Fb"));
        assert_eq!(location("x?y#z").as_deref(), Some("/customers/x%3Fy%23z"));
        assert_eq!(location("a b").as_deref(), Some("/customers/a%20b"));
        assert_eq!(location("50%").as_deref(), Some("/customers/50%25"));
        assert_eq!(location("bad\nid").as_deref(), Some("/customers/bad%0Aid"));
        assert_eq!(location("café").as_deref(), Some("/customers/caf%C3%A9"));
        assert_eq!(location(".."), None);
        assert_eq!(location("."), None);
    }

    #[test]
    fn whitespace_only_id_is_not_an_id() {
        let blank = Customer {
            id: " \t".into(),
            ..Default::default()
        };
        assert!(!blank.has_id());
        assert!(Customer { id: "c1".into(), ..Default::default() }.has_id());
    }
}
