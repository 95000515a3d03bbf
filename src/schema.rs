//! Field names and column order for the credit approval model.
//!
//! The order of [`CATEGORICAL_FIELDS`] and [`NUMERIC_FIELDS`] is the column order
//! the encoder and scaler were fitted on. A [`FeatureSchema`] travels inside the
//! artifact bundle so the loader can reject artifacts fitted on a different layout.

use serde::{Deserialize, Serialize};

pub const GENDER: &str = "gender";
pub const CAR_OWNER: &str = "car_owner";
pub const PROPERTY_OWNER: &str = "property_owner";
pub const INCOME_TYPE: &str = "income_type";
pub const EDUCATION: &str = "education";
pub const MARITAL_STATUS: &str = "marital_status";
pub const HOUSING_TYPE: &str = "housing_type";

pub const AGE: &str = "age";
pub const ANNUAL_INCOME: &str = "annual_income";
pub const WORK_EXPERIENCE: &str = "work_experience";

pub const CHILDREN: &str = "children";
pub const MOBILE_PHONE: &str = "mobile_phone";
pub const WORK_PHONE: &str = "work_phone";
pub const PHONE: &str = "phone";
pub const EMAIL: &str = "email";
pub const FAMILY_MEMBERS: &str = "family_members";

/// Categorical model inputs, in encoder column order.
pub const CATEGORICAL_FIELDS: [&str; 7] = [
    GENDER,
    CAR_OWNER,
    PROPERTY_OWNER,
    INCOME_TYPE,
    EDUCATION,
    MARITAL_STATUS,
    HOUSING_TYPE,
];

/// Numeric model inputs, in scaler column order.
pub const NUMERIC_FIELDS: [&str; 3] = [AGE, ANNUAL_INCOME, WORK_EXPERIENCE];

/// Accepted with every application but never fed to the model.
pub const AUXILIARY_FIELDS: [&str; 6] = [
    CHILDREN,
    MOBILE_PHONE,
    WORK_PHONE,
    PHONE,
    EMAIL,
    FAMILY_MEMBERS,
];

/// Column names used by the original training dataset.
const HEADER_ALIASES: [(&str, &str); 16] = [
    ("jenis_kelamin", GENDER),
    ("pemilik_mobil", CAR_OWNER),
    ("pemilik_properti", PROPERTY_OWNER),
    ("jenis_pendapatan", INCOME_TYPE),
    ("pendidikan", EDUCATION),
    ("status_perkawinan", MARITAL_STATUS),
    ("jenis_rumah", HOUSING_TYPE),
    ("usia", AGE),
    ("pendapatan_tahunan", ANNUAL_INCOME),
    ("pengalaman_kerja", WORK_EXPERIENCE),
    ("anak", CHILDREN),
    ("telepon_seluler", MOBILE_PHONE),
    ("telepon_kerja", WORK_PHONE),
    ("telepon", PHONE),
    ("ID_email", EMAIL),
    ("anggota_keluarga", FAMILY_MEMBERS),
];

/// Resolve a column header or form key to its canonical field name.
///
/// Unknown names are returned trimmed but otherwise unchanged.
pub fn canonical_name(name: &str) -> &str {
    let name = name.trim();
    HEADER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// Named, versioned column layout shared by the encoder, scaler and classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: String,
    pub categorical: Vec<String>,
    pub numeric: Vec<String>,
}

impl FeatureSchema {
    pub const V1: &'static str = "v1";

    /// The credit approval layout the bundled artifacts were fitted on.
    pub fn credit_approval_v1() -> Self {
        Self {
            version: Self::V1.to_string(),
            categorical: CATEGORICAL_FIELDS.iter().map(|f| f.to_string()).collect(),
            numeric: NUMERIC_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Canonicalize field names so aliased manifests compare equal to canonical ones.
    pub fn normalized(mut self) -> Self {
        for name in self.categorical.iter_mut().chain(self.numeric.iter_mut()) {
            *name = canonical_name(name).to_string();
        }
        self
    }

    pub fn model_fields(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .chain(self.numeric.iter())
            .map(String::as_str)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::credit_approval_v1()
    }
}
