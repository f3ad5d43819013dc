//! Typed descriptors carried inside row-sets.
//!
//! Provides conversions between wire rows and:
//! - Column definitions (table creation, add column, describe table)
//! - Index definitions
//! - Cursor modes and fetch positions
//! - Table privileges

use serde::{Deserialize, Serialize};

use crate::error::{DbmiError, DbmiResult};
use crate::proto::{Row, WireValue};

/// SQL column types understood by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Character,
    SmallInt,
    Integer,
    Real,
    DoublePrecision,
    Decimal,
    Numeric,
    Date,
    Time,
    Timestamp,
    Interval,
    Text,
    Serial,
}

impl SqlType {
    pub const fn code(self) -> i32 {
        match self {
            SqlType::Character => 1,
            SqlType::SmallInt => 2,
            SqlType::Integer => 3,
            SqlType::Real => 4,
            SqlType::DoublePrecision => 6,
            SqlType::Decimal => 7,
            SqlType::Numeric => 8,
            SqlType::Date => 9,
            SqlType::Time => 10,
            SqlType::Timestamp => 11,
            SqlType::Interval => 12,
            SqlType::Text => 13,
            SqlType::Serial => 21,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(SqlType::Character),
            2 => Some(SqlType::SmallInt),
            3 => Some(SqlType::Integer),
            4 => Some(SqlType::Real),
            6 => Some(SqlType::DoublePrecision),
            7 => Some(SqlType::Decimal),
            8 => Some(SqlType::Numeric),
            9 => Some(SqlType::Date),
            10 => Some(SqlType::Time),
            11 => Some(SqlType::Timestamp),
            12 => Some(SqlType::Interval),
            13 => Some(SqlType::Text),
            21 => Some(SqlType::Serial),
            _ => None,
        }
    }
}

// ============================================================================
// Columns
// ============================================================================

/// One column of a table.
///
/// On the wire: `[name, sql_type, length, precision, scale, nullable, default]`
/// with the default as STRING or NULL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: SqlType,
    /// Character length; 0 when not applicable
    pub length: i32,
    pub precision: i32,
    pub scale: i32,
    pub nullable: bool,
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            length: 0,
            precision: 0,
            scale: 0,
            nullable: true,
            default: None,
        }
    }

    pub fn length(mut self, length: i32) -> Self {
        self.length = length;
        self
    }

    pub fn precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.push(WireValue::Text(self.name.clone()));
        row.push(WireValue::Int(self.sql_type.code()));
        row.push(WireValue::Int(self.length));
        row.push(WireValue::Int(self.precision));
        row.push(WireValue::Int(self.scale));
        row.push(WireValue::from(self.nullable));
        row.push(WireValue::from(self.default.clone()));
        row
    }

    pub fn from_row(row: &[WireValue]) -> DbmiResult<Self> {
        if row.len() != 7 {
            return Err(DbmiError::Protocol(format!(
                "Column description needs 7 fields, got {}",
                row.len()
            )));
        }

        let code = int_field(&row[1], "sql_type")?;
        let sql_type = SqlType::from_code(code)
            .ok_or_else(|| DbmiError::Protocol(format!("Unknown SQL type code {}", code)))?;

        let default = match &row[6] {
            WireValue::Text(s) => Some(s.clone()),
            WireValue::Null => None,
            other => {
                return Err(DbmiError::Protocol(format!(
                    "Column default must be STRING or NULL, got {}",
                    other.wire_type()
                )))
            }
        };

        Ok(Self {
            name: text_field(&row[0], "name")?,
            sql_type,
            length: int_field(&row[2], "length")?,
            precision: int_field(&row[3], "precision")?,
            scale: int_field(&row[4], "scale")?,
            nullable: int_field(&row[5], "nullable")? != 0,
            default,
        })
    }

    /// Encode column definitions as one row-set.
    pub fn to_rowset(columns: &[ColumnDefinition]) -> WireValue {
        WireValue::RowSet(columns.iter().map(ColumnDefinition::to_row).collect())
    }

    pub fn from_rowset(rows: &[Row]) -> DbmiResult<Vec<ColumnDefinition>> {
        rows.iter().map(|row| ColumnDefinition::from_row(row)).collect()
    }
}

// ============================================================================
// Indexes
// ============================================================================

/// An index over one or more columns of a table.
///
/// `list_indexes` rows: `[name, table, unique, column...]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(name: &str, table: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Arguments of the create-index procedure.
    pub fn to_args(&self) -> [WireValue; 4] {
        [
            WireValue::Text(self.name.clone()),
            WireValue::Text(self.table.clone()),
            WireValue::column(self.columns.iter().cloned().map(WireValue::Text)),
            WireValue::from(self.unique),
        ]
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.push(WireValue::Text(self.name.clone()));
        row.push(WireValue::Text(self.table.clone()));
        row.push(WireValue::from(self.unique));
        row.extend(self.columns.iter().cloned().map(WireValue::Text));
        row
    }

    pub fn from_row(row: &[WireValue]) -> DbmiResult<Self> {
        if row.len() < 3 {
            return Err(DbmiError::Protocol(format!(
                "Index description needs at least 3 fields, got {}",
                row.len()
            )));
        }
        Ok(Self {
            name: text_field(&row[0], "index name")?,
            table: text_field(&row[1], "table name")?,
            unique: int_field(&row[2], "unique")? != 0,
            columns: row[3..]
                .iter()
                .map(|v| text_field(v, "column name"))
                .collect::<DbmiResult<_>>()?,
        })
    }
}

// ============================================================================
// Cursors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    ReadOnly,
    Update,
}

impl CursorMode {
    pub const fn code(self) -> i32 {
        match self {
            CursorMode::ReadOnly => 1,
            CursorMode::Update => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPosition {
    Next,
    Current,
    Previous,
    First,
    Last,
}

impl FetchPosition {
    pub const fn code(self) -> i32 {
        match self {
            FetchPosition::Next => 1,
            FetchPosition::Current => 2,
            FetchPosition::Previous => 3,
            FetchPosition::First => 4,
            FetchPosition::Last => 5,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(FetchPosition::Next),
            2 => Some(FetchPosition::Current),
            3 => Some(FetchPosition::Previous),
            4 => Some(FetchPosition::First),
            5 => Some(FetchPosition::Last),
            _ => None,
        }
    }
}

/// A driver-side select cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub id: i32,
    /// Column name and SQL type code of every result column
    pub columns: Vec<(String, i32)>,
}

impl Cursor {
    pub fn from_results(id: i32, columns: &[Row]) -> DbmiResult<Self> {
        let columns = columns
            .iter()
            .map(|row| match row.as_slice() {
                [name, sql_type] => Ok((
                    text_field(name, "column name")?,
                    int_field(sql_type, "column type")?,
                )),
                _ => Err(DbmiError::Protocol(format!(
                    "Cursor column needs 2 fields, got {}",
                    row.len()
                ))),
            })
            .collect::<DbmiResult<_>>()?;
        Ok(Self { id, columns })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

// ============================================================================
// Privileges
// ============================================================================

/// Bit set of table privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Privileges(pub i32);

impl Privileges {
    pub const SELECT: Privileges = Privileges(0x01);
    pub const INSERT: Privileges = Privileges(0x02);
    pub const UPDATE: Privileges = Privileges(0x04);
    pub const DELETE: Privileges = Privileges(0x08);

    pub const fn bits(self) -> i32 {
        self.0
    }
}

impl std::ops::BitOr for Privileges {
    type Output = Privileges;

    fn bitor(self, rhs: Privileges) -> Privileges {
        Privileges(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grantee {
    Public,
    Group,
}

impl Grantee {
    pub const fn code(self) -> i32 {
        match self {
            Grantee::Public => 1,
            Grantee::Group => 2,
        }
    }
}

// ============================================================================
// Field Helpers
// ============================================================================

pub(crate) fn text_field(value: &WireValue, what: &str) -> DbmiResult<String> {
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| DbmiError::Protocol(format!("{} must be STRING, got {}", what, value.wire_type())))
}

pub(crate) fn int_field(value: &WireValue, what: &str) -> DbmiResult<i32> {
    value
        .as_int()
        .ok_or_else(|| DbmiError::Protocol(format!("{} must be INT, got {}", what, value.wire_type())))
}
