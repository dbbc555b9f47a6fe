use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use super::{nullable, optional, required};
use crate::error::AppError;

/// Upper bound implied by a `NUMERIC(10, 2)` column.
const PRICE_LIMIT: i64 = 100_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid price {raw:?}: {reason}")]
pub struct InvalidPrice {
    raw: String,
    reason: &'static str,
}

/// Decimal price carried as the string the client sent.
///
/// Accepts a JSON string or number on input and always serializes as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Price(String);

impl Price {
    pub fn parse(raw: &str) -> Result<Self, InvalidPrice> {
        let trimmed = raw.trim();
        let invalid = |reason| InvalidPrice {
            raw: trimmed.to_string(),
            reason,
        };

        let value = Decimal::from_str(trimmed).map_err(|_| invalid("not a decimal number"))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(invalid("must not be negative"));
        }
        if value.normalize().scale() > 2 {
            return Err(invalid("at most two decimal places"));
        }
        if value >= Decimal::from(PRICE_LIMIT) {
            return Err(invalid("too large"));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whole amounts up to `u16::MAX` are always within range.
impl From<u16> for Price {
    fn from(amount: u16) -> Self {
        Self(amount.to_string())
    }
}

impl TryFrom<String> for Price {
    type Error = InvalidPrice;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub name_ru: String,
    pub name_kz: String,
    pub description_ru: Option<String>,
    pub description_kz: Option<String>,
    #[sqlx(try_from = "String")]
    pub price: Price,
    pub unit_ru: String,
    pub unit_kz: String,
    pub category_id: Option<i32>,
    pub image_url: Option<String>,
    #[serde(default = "in_stock_default")]
    pub in_stock: bool,
}

fn in_stock_default() -> bool {
    true
}

impl Product {
    /// Case-insensitive substring match over both names and both descriptions.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        let hit = |text: &str| text.to_lowercase().contains(needle);

        hit(self.name_ru.as_str())
            || hit(self.name_kz.as_str())
            || self.description_ru.as_deref().is_some_and(hit)
            || self.description_kz.as_deref().is_some_and(hit)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub name_ru: String,
    #[serde(default)]
    pub name_kz: String,
    #[serde(default)]
    pub description_ru: Option<String>,
    #[serde(default)]
    pub description_kz: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub unit_ru: String,
    #[serde(default)]
    pub unit_kz: String,
    #[serde(default)]
    pub category_id: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub in_stock: Option<bool>,
}

impl NewProduct {
    pub fn validated(self) -> Result<Self, AppError> {
        Ok(Self {
            name_ru: required("name_ru", &self.name_ru)?,
            name_kz: required("name_kz", &self.name_kz)?,
            description_ru: optional(self.description_ru),
            description_kz: optional(self.description_kz),
            price: self.price,
            unit_ru: required("unit_ru", &self.unit_ru)?,
            unit_kz: required("unit_kz", &self.unit_kz)?,
            category_id: self.category_id,
            image_url: optional(self.image_url),
            in_stock: self.in_stock,
        })
    }

    pub fn into_product(self, id: i32) -> Product {
        Product {
            id,
            name_ru: self.name_ru,
            name_kz: self.name_kz,
            description_ru: self.description_ru,
            description_kz: self.description_kz,
            price: self.price,
            unit_ru: self.unit_ru,
            unit_kz: self.unit_kz,
            category_id: self.category_id,
            image_url: self.image_url,
            in_stock: self.in_stock.unwrap_or(true),
        }
    }
}

/// Partial update. Absent fields are kept, `null` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name_ru: Option<String>,
    #[serde(default)]
    pub name_kz: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description_ru: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description_kz: Option<Option<String>>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub unit_ru: Option<String>,
    #[serde(default)]
    pub unit_kz: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    #[serde(default)]
    pub in_stock: Option<bool>,
}

impl ProductPatch {
    pub fn validated(self) -> Result<Self, AppError> {
        Ok(Self {
            name_ru: self.name_ru.map(|v| required("name_ru", &v)).transpose()?,
            name_kz: self.name_kz.map(|v| required("name_kz", &v)).transpose()?,
            description_ru: self.description_ru.map(optional),
            description_kz: self.description_kz.map(optional),
            price: self.price,
            unit_ru: self.unit_ru.map(|v| required("unit_ru", &v)).transpose()?,
            unit_kz: self.unit_kz.map(|v| required("unit_kz", &v)).transpose()?,
            category_id: self.category_id,
            image_url: self.image_url.map(optional),
            in_stock: self.in_stock,
        })
    }

    pub fn apply(self, product: &mut Product) {
        if let Some(name_ru) = self.name_ru {
            product.name_ru = name_ru;
        }
        if let Some(name_kz) = self.name_kz {
            product.name_kz = name_kz;
        }
        if let Some(description_ru) = self.description_ru {
            product.description_ru = description_ru;
        }
        if let Some(description_kz) = self.description_kz {
            product.description_kz = description_kz;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(unit_ru) = self.unit_ru {
            product.unit_ru = unit_ru;
        }
        if let Some(unit_kz) = self.unit_kz {
            product.unit_kz = unit_kz;
        }
        if let Some(category_id) = self.category_id {
            product.category_id = category_id;
        }
        if let Some(image_url) = self.image_url {
            product.image_url = image_url;
        }
        if let Some(in_stock) = self.in_stock {
            product.in_stock = in_stock;
        }
    }
}
