//! Scalar type to SQL type mapping.
//!
//! Every declared field carries a [`ScalarType`], usually recognized from the
//! Rust type written in the struct. [`sql_type_for`] turns it into the MySQL
//! column type used in DDL and compared against the live catalog.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scalar kinds a field can be declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// 128-bit identifier, stored in its 36-character text form.
    Identifier,
    /// Short text.
    Text,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Boolean.
    Boolean,
    /// Date and time.
    Timestamp,
    /// Double-precision float.
    Double,
    /// Fixed-point decimal.
    Decimal,
    /// A type with no dedicated mapping, kept by name for diagnostics.
    Other(String),
}

impl ScalarType {
    /// Recognizes a Rust type as written in source, e.g. `Option<uuid::Uuid>`.
    ///
    /// Nullable wrappers resolve to their inner type. Paths are matched on
    /// their last segment, so `chrono::NaiveDateTime` and `NaiveDateTime` are
    /// the same thing. Anything unrecognized becomes [`ScalarType::Other`].
    #[must_use]
    pub fn from_rust_type(rust_type: &str) -> Self {
        let compact: String = rust_type.chars().filter(|c| !c.is_whitespace()).collect();
        let inner = unwrap_option(&compact);
        let base = inner.split('<').next().unwrap_or(inner);
        let last = base.rsplit("::").next().unwrap_or(base);

        match last {
            "Uuid" => Self::Identifier,
            "String" | "&str" | "str" | "&'staticstr" => Self::Text,
            "i8" | "u8" | "i16" | "u16" | "i32" | "u32" => Self::Int32,
            "i64" | "u64" | "isize" | "usize" => Self::Int64,
            "bool" => Self::Boolean,
            "NaiveDateTime" | "DateTime" | "SystemTime" => Self::Timestamp,
            "f32" | "f64" => Self::Double,
            "Decimal" => Self::Decimal,
            _ => Self::Other(inner.to_string()),
        }
    }
}

/// Strips any number of `Option<...>` wrappers.
fn unwrap_option(ty: &str) -> &str {
    let mut current = ty;
    loop {
        let stripped = current
            .strip_prefix("Option<")
            .or_else(|| current.strip_prefix("std::option::Option<"))
            .or_else(|| current.strip_prefix("core::option::Option<"))
            .and_then(|rest| rest.strip_suffix('>'));
        match stripped {
            Some(inner) => current = inner,
            None => return current,
        }
    }
}

/// Returns the SQL type for a column.
///
/// An explicit override wins unconditionally. Unmapped scalar types fall back
/// to `TEXT`; a warning is logged because the resulting column may not hold
/// what the caller expects.
#[must_use]
pub fn sql_type_for(scalar: &ScalarType, override_type: Option<&str>) -> String {
    if let Some(explicit) = override_type {
        return explicit.to_string();
    }

    match scalar {
        ScalarType::Identifier => "CHAR(36)",
        ScalarType::Text => "VARCHAR(255)",
        ScalarType::Int32 => "INT",
        ScalarType::Int64 => "BIGINT",
        ScalarType::Boolean => "TINYINT(1)",
        ScalarType::Timestamp => "DATETIME",
        ScalarType::Double => "DOUBLE",
        ScalarType::Decimal => "DECIMAL(18,2)",
        ScalarType::Other(name) => {
            warn!(rust_type = %name, "No SQL mapping for type, falling back to TEXT");
            "TEXT"
        }
    }
    .to_string()
}
