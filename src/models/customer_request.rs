use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{optional, required};
use crate::error::AppError;

/// A contact request submitted from the public site. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CustomerRequest {
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewCustomerRequest {
    pub fn validated(self) -> Result<Self, AppError> {
        Ok(Self {
            name: required("name", &self.name)?,
            phone: required("phone", &self.phone)?,
            comment: optional(self.comment),
        })
    }

    pub fn into_request(self, id: i32, created_at: DateTime<Utc>) -> CustomerRequest {
        CustomerRequest {
            id,
            name: self.name,
            phone: self.phone,
            comment: self.comment,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_is_required() {
        let payload: NewCustomerRequest =
            serde_json::from_str(r#"{"name": "Айгуль", "comment": "Нужен профнастил"}"#).unwrap();
        assert_eq!(payload.validated().unwrap_err().to_string(), "phone is required");
    }

    #[test]
    fn created_at_serializes_as_rfc3339() {
        let created_at = DateTime::parse_from_rfc3339("2024-05-01T10:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let request = NewCustomerRequest {
            name: "Ерлан".into(),
            phone: "+7 701 000 00 00".into(),
            comment: None,
        }
        .into_request(3, created_at);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["created_at"], "2024-05-01T10:15:00Z");
        assert_eq!(json["comment"], serde_json::Value::Null);
    }
}
