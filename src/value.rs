//! Owned cell values with exact comparison semantics
//!
//! Result cells and input parameter values are carried as [`SqlValue`], a
//! thin owner of `tiberius::ColumnData`. Equality is the comparison contract
//! of the engine: the null marker equals only another null marker (never an
//! empty string, zero or false), and floats compare by bit pattern so the
//! diff is exact rather than approximate.

use std::borrow::Cow;
use std::fmt;

use tiberius::ColumnData;
use uuid::Uuid;

/// A single provider-native value, including the distinguished null.
#[derive(Debug, Clone)]
pub struct SqlValue(ColumnData<'static>);

impl SqlValue {
    pub fn from_column_data(data: ColumnData<'static>) -> Self {
        Self(data)
    }

    /// The raw column data, used when re-binding the value as a parameter.
    /// Nulls keep the variant of the column they came from, so a null cell
    /// binds as a typed null.
    pub(crate) fn as_column_data(&self) -> &ColumnData<'static> {
        &self.0
    }

    /// An untyped null (sent as an integer-typed null on the wire).
    pub fn null() -> Self {
        Self(ColumnData::I32(None))
    }

    pub fn bit(value: bool) -> Self {
        Self(ColumnData::Bit(Some(value)))
    }

    pub fn int(value: i32) -> Self {
        Self(ColumnData::I32(Some(value)))
    }

    pub fn bigint(value: i64) -> Self {
        Self(ColumnData::I64(Some(value)))
    }

    pub fn float(value: f64) -> Self {
        Self(ColumnData::F64(Some(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self(ColumnData::String(Some(Cow::Owned(value.into()))))
    }

    pub fn binary(value: Vec<u8>) -> Self {
        Self(ColumnData::Binary(Some(Cow::Owned(value))))
    }

    pub fn guid(value: Uuid) -> Self {
        Self(ColumnData::Guid(Some(value)))
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self.0,
            ColumnData::U8(None)
                | ColumnData::I16(None)
                | ColumnData::I32(None)
                | ColumnData::I64(None)
                | ColumnData::F32(None)
                | ColumnData::F64(None)
                | ColumnData::Bit(None)
                | ColumnData::String(None)
                | ColumnData::Guid(None)
                | ColumnData::Binary(None)
                | ColumnData::Numeric(None)
                | ColumnData::Xml(None)
                | ColumnData::DateTime(None)
                | ColumnData::SmallDateTime(None)
                | ColumnData::Time(None)
                | ColumnData::Date(None)
                | ColumnData::DateTime2(None)
                | ColumnData::DateTimeOffset(None)
        )
    }
}

impl From<ColumnData<'static>> for SqlValue {
    fn from(data: ColumnData<'static>) -> Self {
        Self(data)
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        // Null equals null regardless of the wire type it arrived with,
        // matching the provider's single null marker.
        if self.is_null() || other.is_null() {
            return self.is_null() && other.is_null();
        }

        match (&self.0, &other.0) {
            (ColumnData::U8(Some(a)), ColumnData::U8(Some(b))) => a == b,
            (ColumnData::I16(Some(a)), ColumnData::I16(Some(b))) => a == b,
            (ColumnData::I32(Some(a)), ColumnData::I32(Some(b))) => a == b,
            (ColumnData::I64(Some(a)), ColumnData::I64(Some(b))) => a == b,
            (ColumnData::F32(Some(a)), ColumnData::F32(Some(b))) => a.to_bits() == b.to_bits(),
            (ColumnData::F64(Some(a)), ColumnData::F64(Some(b))) => a.to_bits() == b.to_bits(),
            (ColumnData::Bit(Some(a)), ColumnData::Bit(Some(b))) => a == b,
            (ColumnData::String(Some(a)), ColumnData::String(Some(b))) => a == b,
            (ColumnData::Guid(Some(a)), ColumnData::Guid(Some(b))) => a == b,
            (ColumnData::Binary(Some(a)), ColumnData::Binary(Some(b))) => a == b,
            (ColumnData::Numeric(Some(a)), ColumnData::Numeric(Some(b))) => {
                a.value() == b.value() && a.scale() == b.scale()
            }
            (ColumnData::Xml(Some(a)), ColumnData::Xml(Some(b))) => {
                a.as_ref().to_string() == b.as_ref().to_string()
            }
            (ColumnData::DateTime(Some(a)), ColumnData::DateTime(Some(b))) => {
                a.days() == b.days() && a.seconds_fragments() == b.seconds_fragments()
            }
            (ColumnData::SmallDateTime(Some(a)), ColumnData::SmallDateTime(Some(b))) => {
                a.days() == b.days() && a.seconds_fragments() == b.seconds_fragments()
            }
            (ColumnData::Time(Some(a)), ColumnData::Time(Some(b))) => {
                a.increments() == b.increments() && a.scale() == b.scale()
            }
            (ColumnData::Date(Some(a)), ColumnData::Date(Some(b))) => a.days() == b.days(),
            (ColumnData::DateTime2(Some(a)), ColumnData::DateTime2(Some(b))) => {
                a.date().days() == b.date().days()
                    && a.time().increments() == b.time().increments()
                    && a.time().scale() == b.time().scale()
            }
            (ColumnData::DateTimeOffset(Some(a)), ColumnData::DateTimeOffset(Some(b))) => {
                let (d2a, d2b) = (a.datetime2(), b.datetime2());
                a.offset() == b.offset()
                    && d2a.date().days() == d2b.date().days()
                    && d2a.time().increments() == d2b.time().increments()
                    && d2a.time().scale() == d2b.time().scale()
            }
            _ => false,
        }
    }
}

/// Render an i128 mantissa with a decimal scale, e.g. (1250, 2) -> "12.50".
fn format_numeric(value: i128, scale: u8) -> String {
    if scale == 0 {
        return value.to_string();
    }
    let divisor = 10u128.pow(u32::from(scale));
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / divisor,
        abs % divisor,
        width = scale as usize
    )
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }

        match &self.0 {
            ColumnData::U8(Some(v)) => write!(f, "{}", v),
            ColumnData::I16(Some(v)) => write!(f, "{}", v),
            ColumnData::I32(Some(v)) => write!(f, "{}", v),
            ColumnData::I64(Some(v)) => write!(f, "{}", v),
            ColumnData::F32(Some(v)) => write!(f, "{}", v),
            ColumnData::F64(Some(v)) => write!(f, "{}", v),
            ColumnData::Bit(Some(v)) => write!(f, "{}", v),
            ColumnData::String(Some(v)) => write!(f, "{}", v),
            ColumnData::Guid(Some(v)) => write!(f, "{}", v),
            ColumnData::Binary(Some(v)) => write!(f, "0x{}", hex::encode_upper(v.as_ref())),
            ColumnData::Numeric(Some(v)) => write!(f, "{}", format_numeric(v.value(), v.scale())),
            ColumnData::Xml(Some(v)) => write!(f, "{}", v.as_ref()),
            ColumnData::DateTime(Some(v)) => {
                write!(f, "datetime({}d +{})", v.days(), v.seconds_fragments())
            }
            ColumnData::SmallDateTime(Some(v)) => {
                write!(f, "smalldatetime({}d +{})", v.days(), v.seconds_fragments())
            }
            ColumnData::Time(Some(v)) => write!(f, "time({}@{})", v.increments(), v.scale()),
            ColumnData::Date(Some(v)) => write!(f, "date({}d)", v.days()),
            ColumnData::DateTime2(Some(v)) => write!(
                f,
                "datetime2({}d {}@{})",
                v.date().days(),
                v.time().increments(),
                v.time().scale()
            ),
            ColumnData::DateTimeOffset(Some(v)) => {
                let d2 = v.datetime2();
                write!(
                    f,
                    "datetimeoffset({}d {}@{} {:+}m)",
                    d2.date().days(),
                    d2.time().increments(),
                    d2.time().scale(),
                    v.offset()
                )
            }
            _ => write!(f, "NULL"),
        }
    }
}
