//! Wire values and the types the catalog declares for them.
//!
//! Every value on the wire is a tag byte followed by its payload:
//!
//! | tag    | byte | payload                                        |
//! |--------|------|------------------------------------------------|
//! | INT    | 0x01 | i32, little endian                             |
//! | DOUBLE | 0x02 | f64, little endian                             |
//! | STRING | 0x03 | u32 LE length + that many UTF-8 bytes          |
//! | NULL   | 0x04 | none                                           |
//! | ROWSET | 0x05 | u32 LE rows, each u32 LE columns + values      |

use serde::Serialize;
use smallvec::SmallVec;

// ============================================================================
// Tags
// ============================================================================

pub const TAG_INT: u8 = 0x01;
pub const TAG_DOUBLE: u8 = 0x02;
pub const TAG_STRING: u8 = 0x03;
pub const TAG_NULL: u8 = 0x04;
pub const TAG_ROWSET: u8 = 0x05;

/// One row of a row-set. Inline storage covers most result rows without
/// touching the heap.
pub type Row = SmallVec<[WireValue; 8]>;

// ============================================================================
// Wire Values
// ============================================================================

/// A tagged value as it travels between client and driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireValue {
    Int(i32),
    Double(f64),
    Text(String),
    Null,
    RowSet(Vec<Row>),
}

impl WireValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Int(_) => WireType::Int,
            WireValue::Double(_) => WireType::Double,
            WireValue::Text(_) => WireType::Text,
            WireValue::Null => WireType::Null,
            WireValue::RowSet(_) => WireType::RowSet,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            WireValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            WireValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            WireValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            WireValue::RowSet(rows) => Some(rows),
            _ => None,
        }
    }

    /// A row-set holding a single row.
    pub fn single_row<I: IntoIterator<Item = WireValue>>(values: I) -> Self {
        WireValue::RowSet(vec![values.into_iter().collect()])
    }

    /// A row-set with one single-column row per item.
    pub fn column<I: IntoIterator<Item = WireValue>>(values: I) -> Self {
        WireValue::RowSet(
            values
                .into_iter()
                .map(|v| {
                    let mut row = Row::new();
                    row.push(v);
                    row
                })
                .collect(),
        )
    }
}

impl From<i32> for WireValue {
    fn from(v: i32) -> Self {
        WireValue::Int(v)
    }
}

impl From<f64> for WireValue {
    fn from(v: f64) -> Self {
        WireValue::Double(v)
    }
}

impl From<bool> for WireValue {
    fn from(v: bool) -> Self {
        WireValue::Int(v as i32)
    }
}

impl From<&str> for WireValue {
    fn from(v: &str) -> Self {
        WireValue::Text(v.to_string())
    }
}

impl From<String> for WireValue {
    fn from(v: String) -> Self {
        WireValue::Text(v)
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(WireValue::Null)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Int,
    Double,
    Text,
    Null,
    RowSet,
}

impl WireType {
    pub fn tag(self) -> u8 {
        match self {
            WireType::Int => TAG_INT,
            WireType::Double => TAG_DOUBLE,
            WireType::Text => TAG_STRING,
            WireType::Null => TAG_NULL,
            WireType::RowSet => TAG_ROWSET,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_INT => Some(WireType::Int),
            TAG_DOUBLE => Some(WireType::Double),
            TAG_STRING => Some(WireType::Text),
            TAG_NULL => Some(WireType::Null),
            TAG_ROWSET => Some(WireType::RowSet),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WireType::Int => "INT",
            WireType::Double => "DOUBLE",
            WireType::Text => "STRING",
            WireType::Null => "NULL",
            WireType::RowSet => "ROWSET",
        }
    }
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One argument or result position of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub ty: WireType,
    pub nullable: bool,
}

impl Slot {
    pub const fn required(ty: WireType) -> Self {
        Self { ty, nullable: false }
    }

    pub const fn nullable(ty: WireType) -> Self {
        Self { ty, nullable: true }
    }

    pub fn accepts(&self, value: &WireValue) -> bool {
        value.wire_type() == self.ty || (self.nullable && value.is_null())
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}
