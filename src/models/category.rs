use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{nullable, optional, required};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i32,
    pub name_ru: String,
    pub name_kz: String,
    pub description_ru: Option<String>,
    pub description_kz: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    #[serde(default)]
    pub name_ru: String,
    #[serde(default)]
    pub name_kz: String,
    #[serde(default)]
    pub description_ru: Option<String>,
    #[serde(default)]
    pub description_kz: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewCategory {
    /// Trims every field and checks that both names are present.
    pub fn validated(self) -> Result<Self, AppError> {
        Ok(Self {
            name_ru: required("name_ru", &self.name_ru)?,
            name_kz: required("name_kz", &self.name_kz)?,
            description_ru: optional(self.description_ru),
            description_kz: optional(self.description_kz),
            image_url: optional(self.image_url),
        })
    }

    pub fn into_category(self, id: i32) -> Category {
        Category {
            id,
            name_ru: self.name_ru,
            name_kz: self.name_kz,
            description_ru: self.description_ru,
            description_kz: self.description_kz,
            image_url: self.image_url,
        }
    }
}

/// Partial update. Absent fields are kept, `null` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name_ru: Option<String>,
    #[serde(default)]
    pub name_kz: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description_ru: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description_kz: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
}

impl CategoryPatch {
    pub fn validated(self) -> Result<Self, AppError> {
        Ok(Self {
            name_ru: self.name_ru.map(|v| required("name_ru", &v)).transpose()?,
            name_kz: self.name_kz.map(|v| required("name_kz", &v)).transpose()?,
            description_ru: self.description_ru.map(optional),
            description_kz: self.description_kz.map(optional),
            image_url: self.image_url.map(optional),
        })
    }

    pub fn apply(self, category: &mut Category) {
        if let Some(name_ru) = self.name_ru {
            category.name_ru = name_ru;
        }
        if let Some(name_kz) = self.name_kz {
            category.name_kz = name_kz;
        }
        if let Some(description_ru) = self.description_ru {
            category.description_ru = description_ru;
        }
        if let Some(description_kz) = self.description_kz {
            category.description_kz = description_kz;
        }
        if let Some(image_url) = self.image_url {
            category.image_url = image_url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roofing() -> Category {
        Category {
            id: 1,
            name_ru: "Кровельные материалы".into(),
            name_kz: "Шатыр материалдары".into(),
            description_ru: Some("Металлочерепица".into()),
            description_kz: None,
            image_url: Some("/uploads/roof.jpg".into()),
        }
    }

    #[test]
    fn new_category_requires_both_names() {
        let payload: NewCategory = serde_json::from_str(r#"{"name_ru": "Утеплители"}"#).unwrap();
        let err = payload.validated().unwrap_err();
        assert_eq!(err.to_string(), "name_kz is required");
    }

    #[test]
    fn new_category_blank_optionals_become_none() {
        let payload: NewCategory = serde_json::from_str(
            r#"{"name_ru": " Утеплители ", "name_kz": "Жылу", "description_ru": "  ", "image_url": null}"#,
        )
        .unwrap();
        let payload = payload.validated().unwrap();
        assert_eq!(payload.name_ru, "Утеплители");
        assert_eq!(payload.description_ru, None);
        assert_eq!(payload.image_url, None);
    }

    #[test]
    fn patch_keeps_absent_fields_and_clears_nulls() {
        let patch: CategoryPatch =
            serde_json::from_str(r#"{"name_ru": "Кровля", "image_url": null}"#).unwrap();
        let mut category = roofing();
        patch.validated().unwrap().apply(&mut category);

        assert_eq!(category.name_ru, "Кровля");
        assert_eq!(category.name_kz, "Шатыр материалдары");
        assert_eq!(category.description_ru.as_deref(), Some("Металлочерепица"));
        assert_eq!(category.image_url, None);
    }

    #[test]
    fn patch_rejects_blank_required_name() {
        let patch: CategoryPatch = serde_json::from_str(r#"{"name_kz": " "}"#).unwrap();
        assert!(patch.validated().is_err());
    }
}
