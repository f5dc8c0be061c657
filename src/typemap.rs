//! Engine-type-name to provider-type mapping
//!
//! The catalog reports parameter types as engine type names (`int`,
//! `nvarchar`, ...). Binding needs the provider-side parameter type, both to
//! validate that the type is supported and to render `DECLARE` statements for
//! output parameters. The mapping is built once at startup, either from a
//! delimited text file (one `engine_type<delimiter>provider_type` pair per
//! line, with a configurable number of header lines to skip) or from the
//! built-in SQL Server table.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::RoutineDiffError;

/// Provider parameter type, mirroring the SqlDbType names the mapping file
/// uses on its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlParamType {
    BigInt,
    Binary,
    Bit,
    Char,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Float,
    Image,
    Int,
    Money,
    NChar,
    NText,
    NVarChar,
    Real,
    SmallDateTime,
    SmallInt,
    SmallMoney,
    Text,
    Time,
    TinyInt,
    UniqueIdentifier,
    VarBinary,
    VarChar,
    Variant,
    Xml,
}

impl FromStr for SqlParamType {
    type Err = RoutineDiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let parsed = match name.to_ascii_lowercase().as_str() {
            "bigint" => SqlParamType::BigInt,
            "binary" => SqlParamType::Binary,
            "bit" => SqlParamType::Bit,
            "char" => SqlParamType::Char,
            "date" => SqlParamType::Date,
            "datetime" => SqlParamType::DateTime,
            "datetime2" => SqlParamType::DateTime2,
            "datetimeoffset" => SqlParamType::DateTimeOffset,
            "decimal" => SqlParamType::Decimal,
            "float" => SqlParamType::Float,
            "image" => SqlParamType::Image,
            "int" => SqlParamType::Int,
            "money" => SqlParamType::Money,
            "nchar" => SqlParamType::NChar,
            "ntext" => SqlParamType::NText,
            "nvarchar" => SqlParamType::NVarChar,
            "real" => SqlParamType::Real,
            "smalldatetime" => SqlParamType::SmallDateTime,
            "smallint" => SqlParamType::SmallInt,
            "smallmoney" => SqlParamType::SmallMoney,
            "text" => SqlParamType::Text,
            "time" => SqlParamType::Time,
            "tinyint" => SqlParamType::TinyInt,
            "uniqueidentifier" => SqlParamType::UniqueIdentifier,
            "varbinary" => SqlParamType::VarBinary,
            "varchar" => SqlParamType::VarChar,
            "variant" => SqlParamType::Variant,
            "xml" => SqlParamType::Xml,
            _ => {
                return Err(RoutineDiffError::UnknownProviderType {
                    name: name.to_string(),
                })
            }
        };
        Ok(parsed)
    }
}

impl SqlParamType {
    /// The base T-SQL type name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            SqlParamType::BigInt => "bigint",
            SqlParamType::Binary => "binary",
            SqlParamType::Bit => "bit",
            SqlParamType::Char => "char",
            SqlParamType::Date => "date",
            SqlParamType::DateTime => "datetime",
            SqlParamType::DateTime2 => "datetime2",
            SqlParamType::DateTimeOffset => "datetimeoffset",
            SqlParamType::Decimal => "decimal",
            SqlParamType::Float => "float",
            SqlParamType::Image => "image",
            SqlParamType::Int => "int",
            SqlParamType::Money => "money",
            SqlParamType::NChar => "nchar",
            SqlParamType::NText => "ntext",
            SqlParamType::NVarChar => "nvarchar",
            SqlParamType::Real => "real",
            SqlParamType::SmallDateTime => "smalldatetime",
            SqlParamType::SmallInt => "smallint",
            SqlParamType::SmallMoney => "smallmoney",
            SqlParamType::Text => "text",
            SqlParamType::Time => "time",
            SqlParamType::TinyInt => "tinyint",
            SqlParamType::UniqueIdentifier => "uniqueidentifier",
            SqlParamType::VarBinary => "varbinary",
            SqlParamType::VarChar => "varchar",
            SqlParamType::Variant => "sql_variant",
            SqlParamType::Xml => "xml",
        }
    }

    /// T-SQL declaration for a local variable holding an output parameter.
    ///
    /// Output parameters are captured with unbounded size, so variable-length
    /// types declare `(max)`; fixed-length character/binary types declare
    /// their widest form.
    pub fn declared_type(&self, precision: u8, scale: u8) -> String {
        match self {
            SqlParamType::Decimal => format!("decimal({},{})", precision, scale),
            SqlParamType::VarChar => "varchar(max)".to_string(),
            SqlParamType::NVarChar => "nvarchar(max)".to_string(),
            SqlParamType::VarBinary => "varbinary(max)".to_string(),
            SqlParamType::Char => "char(8000)".to_string(),
            SqlParamType::NChar => "nchar(4000)".to_string(),
            SqlParamType::Binary => "binary(8000)".to_string(),
            SqlParamType::Time => format!("time({})", scale),
            SqlParamType::DateTime2 => format!("datetime2({})", scale),
            SqlParamType::DateTimeOffset => format!("datetimeoffset({})", scale),
            _ => self.sql_name().to_string(),
        }
    }
}

/// Built-in engine-type -> provider-type pairs for SQL Server.
static BUILTIN_MAPPING: Lazy<HashMap<String, SqlParamType>> = Lazy::new(|| {
    let pairs: &[(&str, SqlParamType)] = &[
        ("bigint", SqlParamType::BigInt),
        ("binary", SqlParamType::Binary),
        ("bit", SqlParamType::Bit),
        ("char", SqlParamType::Char),
        ("date", SqlParamType::Date),
        ("datetime", SqlParamType::DateTime),
        ("datetime2", SqlParamType::DateTime2),
        ("datetimeoffset", SqlParamType::DateTimeOffset),
        ("decimal", SqlParamType::Decimal),
        ("numeric", SqlParamType::Decimal),
        ("float", SqlParamType::Float),
        ("image", SqlParamType::Image),
        ("int", SqlParamType::Int),
        ("money", SqlParamType::Money),
        ("nchar", SqlParamType::NChar),
        ("ntext", SqlParamType::NText),
        ("nvarchar", SqlParamType::NVarChar),
        ("real", SqlParamType::Real),
        ("smalldatetime", SqlParamType::SmallDateTime),
        ("smallint", SqlParamType::SmallInt),
        ("smallmoney", SqlParamType::SmallMoney),
        ("sql_variant", SqlParamType::Variant),
        ("sysname", SqlParamType::NVarChar),
        ("text", SqlParamType::Text),
        ("time", SqlParamType::Time),
        ("tinyint", SqlParamType::TinyInt),
        ("uniqueidentifier", SqlParamType::UniqueIdentifier),
        ("varbinary", SqlParamType::VarBinary),
        ("varchar", SqlParamType::VarChar),
        ("xml", SqlParamType::Xml),
    ];
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
});

/// Immutable engine-type-name -> provider-type mapping, constructed once at
/// startup and passed into the engine.
#[derive(Debug, Clone)]
pub struct TypeMap {
    mapping: HashMap<String, SqlParamType>,
}

impl TypeMap {
    /// The built-in SQL Server mapping, used when no mapping file is given.
    pub fn builtin() -> Self {
        Self {
            mapping: BUILTIN_MAPPING.clone(),
        }
    }

    /// Load a mapping from a delimited text file. Each non-blank line after
    /// the skipped header lines must be `engine_type<delimiter>provider_type`.
    pub fn from_delimited_file(
        path: &Path,
        delimiter: char,
        lines_to_skip: usize,
    ) -> Result<Self, RoutineDiffError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| RoutineDiffError::TypeMapRead {
                path: path.to_path_buf(),
                source,
            })?;

        let mut mapping = HashMap::new();
        for (index, line) in contents.lines().enumerate().skip(lines_to_skip) {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.splitn(2, delimiter);
            let engine_type = fields.next().map(str::trim).unwrap_or_default();
            let provider_type = fields.next().map(str::trim);
            let provider_type = match provider_type {
                Some(p) if !engine_type.is_empty() && !p.is_empty() => p,
                _ => {
                    return Err(RoutineDiffError::TypeMapFormat {
                        line: index + 1,
                        delimiter,
                    })
                }
            };
            mapping.insert(engine_type.to_string(), provider_type.parse::<SqlParamType>()?);
        }

        Ok(Self { mapping })
    }

    /// Resolve an engine type name encountered during binding. An absent
    /// entry is fatal for the run.
    pub fn resolve(&self, engine_type: &str) -> Result<SqlParamType, RoutineDiffError> {
        self.mapping.get(engine_type).copied().ok_or_else(|| {
            RoutineDiffError::UnmappedEngineType {
                engine_type: engine_type.to_string(),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
