//! Scalar column types, column flags, and default-value expressions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length value meaning "unbounded" (or "not applicable" for fixed-size types).
pub const UNBOUNDED: i32 = -1;

/// Enumerated scalar kinds a column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DbType {
    Boolean,
    Byte,
    Int16,
    #[default]
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Currency,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Guid,
    /// Unicode variable-length text.
    String,
    /// Single-byte variable-length text.
    AnsiString,
    /// Unicode fixed-length text.
    StringFixedLength,
    /// Single-byte fixed-length text.
    AnsiStringFixedLength,
    Binary,
    Xml,
}

impl DbType {
    /// Whether the `length` attribute is meaningful for this type.
    pub const fn is_sized(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::AnsiString
                | Self::StringFixedLength
                | Self::AnsiStringFixedLength
                | Self::Binary
        )
    }

    /// Whether values of this type are always stored out of row.
    pub const fn is_always_large(&self) -> bool {
        matches!(self, Self::Xml)
    }

    /// Storage size in bytes for fixed-size types.
    pub const fn fixed_size(&self) -> Option<i64> {
        match self {
            Self::Boolean | Self::Byte => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 | Self::Single | Self::Date => Some(4),
            Self::Int64 | Self::Double | Self::Currency | Self::Time | Self::DateTime => Some(8),
            Self::DateTimeOffset => Some(10),
            Self::Decimal => Some(17),
            Self::Guid => Some(16),
            _ => None,
        }
    }

    /// Size units a column of this type and length occupies in a row.
    ///
    /// Unbounded sized types and always-large types report `None`: they can
    /// never be part of the common column set.
    pub fn storage_size(&self, length: i32) -> Option<i64> {
        if let Some(size) = self.fixed_size() {
            return Some(size);
        }
        if self.is_always_large() || length == UNBOUNDED || length < 0 {
            return None;
        }
        let length = length as i64;
        match self {
            Self::String | Self::StringFixedLength => Some(length * 2),
            _ => Some(length),
        }
    }

    /// Map a catalog (`INFORMATION_SCHEMA`) type name to a scalar kind.
    pub fn from_catalog_name(name: &str) -> Option<Self> {
        let ty = match name.trim().to_lowercase().as_str() {
            "bit" | "bool" | "boolean" => Self::Boolean,
            "tinyint" => Self::Byte,
            "smallint" | "int2" => Self::Int16,
            "int" | "integer" | "int4" => Self::Int32,
            "bigint" | "int8" => Self::Int64,
            "real" | "float4" => Self::Single,
            "float" | "float8" | "double precision" => Self::Double,
            "decimal" | "numeric" => Self::Decimal,
            "money" | "smallmoney" => Self::Currency,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" | "datetime2" | "smalldatetime" | "timestamp without time zone" => {
                Self::DateTime
            }
            "datetimeoffset" | "timestamp with time zone" | "timestamptz" => Self::DateTimeOffset,
            "uniqueidentifier" | "uuid" => Self::Guid,
            "nvarchar" | "ntext" | "text" | "character varying" => Self::String,
            "varchar" => Self::AnsiString,
            "nchar" | "character" => Self::StringFixedLength,
            "char" => Self::AnsiStringFixedLength,
            "varbinary" | "binary" | "image" | "bytea" | "rowversion" => Self::Binary,
            "xml" => Self::Xml,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Column flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ColumnFlags {
    #[serde(skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub key: bool,
    /// Large/BLOB-class storage.
    #[serde(skip_serializing_if = "is_false")]
    pub large: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_increment: bool,
    /// Part of the cheap-to-scan leading column set.
    #[serde(skip_serializing_if = "is_false")]
    pub common: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ColumnFlags {
    pub fn nullable() -> Self {
        Self {
            nullable: true,
            ..Self::default()
        }
    }

    pub fn key() -> Self {
        Self {
            key: true,
            ..Self::default()
        }
    }
}

/// Kind of a default-value expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefaultKind {
    /// A quoted literal (`'pending'`).
    Literal,
    /// An unquoted primitive (`0`, `1`).
    Primitive,
    /// The database's current timestamp function.
    CurrentTimestamp,
}

/// Default-value expression attached to a column.
///
/// Two defaults are equal when kind and value match; the constraint name
/// takes no part in the comparison.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultValue {
    pub kind: DefaultKind,

    /// Constraint name, if the database named it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub value: String,
}

impl DefaultValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: DefaultKind::Literal,
            name: None,
            value: value.into(),
        }
    }

    pub fn primitive(value: impl Into<String>) -> Self {
        Self {
            kind: DefaultKind::Primitive,
            name: None,
            value: value.into(),
        }
    }

    pub fn current_timestamp() -> Self {
        Self {
            kind: DefaultKind::CurrentTimestamp,
            name: None,
            value: String::new(),
        }
    }

    /// Attach a constraint name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DefaultKind::Literal => write!(f, "'{}'", self.value),
            DefaultKind::Primitive => write!(f, "{}", self.value),
            DefaultKind::CurrentTimestamp => write!(f, "CURRENT_TIMESTAMP"),
        }
    }
}

/// Visibility modifier carried through to generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Protected,
    Private,
}
