//! Fitted preprocessing artifacts applied before classification

pub mod encoder;
pub mod scaler;

pub use encoder::{CategoricalEncoder, OneHotEncoder};
pub use scaler::{NumericScaler, StandardScaler};
