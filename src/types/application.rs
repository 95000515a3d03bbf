//! Credit application records as they arrive from intake

use crate::error::{PipelineError, Result};
use crate::schema::{self, canonical_name};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single raw field value, before coercion to what an artifact expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl FieldValue {
    /// Treat empty or whitespace-only text as missing.
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().is_empty() {
            FieldValue::Missing
        } else {
            FieldValue::Text(cell.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v:?}"),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Missing => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

/// One applicant's fields keyed by canonical name, in insertion order.
///
/// Completeness is not checked here; the feature pipeline reports missing
/// model fields when it selects them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: IndexMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, resolving header aliases to the canonical name.
    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields
            .insert(canonical_name(name).to_string(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(canonical_name(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(canonical_name(name))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<FieldValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.insert(k.as_ref(), v);
        }
        record
    }
}

/// A complete single-application submission.
///
/// All sixteen fields are required and strictly typed. Field names accept the
/// original dataset's column names as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationForm {
    /// Caller-supplied identifier echoed back with the decision
    #[serde(default)]
    pub application_id: Option<String>,

    #[serde(alias = "jenis_kelamin")]
    pub gender: String,

    #[serde(alias = "pemilik_mobil")]
    pub car_owner: String,

    #[serde(alias = "pemilik_properti")]
    pub property_owner: String,

    /// Number of children
    #[serde(alias = "anak")]
    pub children: i64,

    #[serde(alias = "pendapatan_tahunan")]
    pub annual_income: f64,

    #[serde(alias = "jenis_pendapatan")]
    pub income_type: String,

    #[serde(alias = "pendidikan")]
    pub education: String,

    #[serde(alias = "status_perkawinan")]
    pub marital_status: String,

    #[serde(alias = "jenis_rumah")]
    pub housing_type: String,

    /// Age in years
    #[serde(alias = "usia")]
    pub age: i64,

    /// Years of work experience
    #[serde(alias = "pengalaman_kerja")]
    pub work_experience: i64,

    #[serde(alias = "telepon_seluler")]
    pub mobile_phone: i64,

    #[serde(alias = "telepon_kerja")]
    pub work_phone: i64,

    #[serde(alias = "telepon")]
    pub phone: i64,

    #[serde(alias = "ID_email")]
    pub email: i64,

    #[serde(alias = "anggota_keluarga")]
    pub family_members: i64,
}

impl ApplicationForm {
    /// Parse submitted form fields (all values as text).
    ///
    /// Every field must be present and parse as its declared type; the first
    /// missing or malformed field fails the whole submission.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let fields: HashMap<&str, &str> = fields
            .iter()
            .map(|(k, v)| (canonical_name(k), v.as_str()))
            .collect();

        let text = |name: &str| -> Result<String> {
            fields
                .get(name)
                .map(|v| v.to_string())
                .ok_or_else(|| PipelineError::MissingField {
                    field: name.to_string(),
                })
        };
        let integer = |name: &str| -> Result<i64> {
            let raw = text(name)?;
            raw.trim()
                .parse::<i64>()
                .map_err(|_| PipelineError::InvalidValue {
                    field: name.to_string(),
                    value: raw,
                    expected: "an integer",
                })
        };
        let float = |name: &str| -> Result<f64> {
            let raw = text(name)?;
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(PipelineError::InvalidValue {
                    field: name.to_string(),
                    value: raw,
                    expected: "a number",
                }),
            }
        };

        Ok(Self {
            application_id: fields.get("application_id").map(|v| v.to_string()),
            gender: text(schema::GENDER)?,
            car_owner: text(schema::CAR_OWNER)?,
            property_owner: text(schema::PROPERTY_OWNER)?,
            children: integer(schema::CHILDREN)?,
            annual_income: float(schema::ANNUAL_INCOME)?,
            income_type: text(schema::INCOME_TYPE)?,
            education: text(schema::EDUCATION)?,
            marital_status: text(schema::MARITAL_STATUS)?,
            housing_type: text(schema::HOUSING_TYPE)?,
            age: integer(schema::AGE)?,
            work_experience: integer(schema::WORK_EXPERIENCE)?,
            mobile_phone: integer(schema::MOBILE_PHONE)?,
            work_phone: integer(schema::WORK_PHONE)?,
            phone: integer(schema::PHONE)?,
            email: integer(schema::EMAIL)?,
            family_members: integer(schema::FAMILY_MEMBERS)?,
        })
    }

    /// Convert into the untyped record form consumed by the feature pipeline.
    pub fn to_record(&self) -> RawRecord {
        RawRecord::new()
            .with(schema::GENDER, self.gender.as_str())
            .with(schema::CAR_OWNER, self.car_owner.as_str())
            .with(schema::PROPERTY_OWNER, self.property_owner.as_str())
            .with(schema::CHILDREN, self.children)
            .with(schema::ANNUAL_INCOME, self.annual_income)
            .with(schema::INCOME_TYPE, self.income_type.as_str())
            .with(schema::EDUCATION, self.education.as_str())
            .with(schema::MARITAL_STATUS, self.marital_status.as_str())
            .with(schema::HOUSING_TYPE, self.housing_type.as_str())
            .with(schema::AGE, self.age)
            .with(schema::WORK_EXPERIENCE, self.work_experience)
            .with(schema::MOBILE_PHONE, self.mobile_phone)
            .with(schema::WORK_PHONE, self.work_phone)
            .with(schema::PHONE, self.phone)
            .with(schema::EMAIL, self.email)
            .with(schema::FAMILY_MEMBERS, self.family_members)
    }
}
