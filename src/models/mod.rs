pub mod category;
pub mod customer_request;
pub mod product;
pub mod user;

use serde::{Deserialize, Deserializer};

use crate::error::AppError;

pub use category::{Category, CategoryPatch, NewCategory};
pub use customer_request::{CustomerRequest, NewCustomerRequest};
pub use product::{NewProduct, Price, Product, ProductPatch};
pub use user::{NewUser, User};

/// Deserializes a field that distinguishes "absent" from an explicit `null`.
///
/// Use together with `#[serde(default)]`: an absent key yields `None`, a
/// `null` yields `Some(None)` and a value yields `Some(Some(value))`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trims a required text field, rejecting it when nothing is left.
pub(crate) fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Trims an optional text field; blank strings collapse to `None`.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
