//! The procedure catalog.
//!
//! Each procedure is declared once, as data: its wire id, the shape of its
//! arguments, the shape of its results and whether a failure carries a
//! diagnostic string. The client call path and the driver serve loop both
//! read these entries, so the argument order can never drift from the wire
//! format.

use super::codec::CodecLimits;
use super::types::{Slot, WireType, WireValue};
use crate::error::{DbmiError, DbmiResult};

const INT: Slot = Slot::required(WireType::Int);
const TEXT: Slot = Slot::required(WireType::Text);
const ROWSET: Slot = Slot::required(WireType::RowSet);
const OPT_TEXT: Slot = Slot::nullable(WireType::Text);
const OPT_ROWSET: Slot = Slot::nullable(WireType::RowSet);

/// Static description of one procedure.
#[derive(Debug)]
pub struct CatalogEntry {
    pub procedure: Procedure,
    pub args: &'static [Slot],
    pub results: &'static [Slot],
    /// A failure status is followed by one nullable STRING.
    pub diagnostic_on_failure: bool,
}

impl CatalogEntry {
    /// Check a call against this entry before anything is written.
    pub fn validate_args(&self, args: &[WireValue], limits: &CodecLimits) -> DbmiResult<()> {
        let procedure = self.procedure.name();

        if args.len() != self.args.len() {
            return Err(DbmiError::Argument {
                procedure,
                reason: format!(
                    "expected {} argument(s), got {}",
                    self.args.len(),
                    args.len()
                ),
            });
        }

        for (i, (slot, value)) in self.args.iter().zip(args).enumerate() {
            if !slot.accepts(value) {
                return Err(DbmiError::Argument {
                    procedure,
                    reason: format!(
                        "argument {} must be {}, got {}",
                        i,
                        slot,
                        value.wire_type()
                    ),
                });
            }
            limits.check(value).map_err(|reason| DbmiError::Argument {
                procedure,
                reason: format!("argument {}: {}", i, reason),
            })?;
        }

        Ok(())
    }

    /// Check the values a driver produced against the declared results.
    pub fn validate_results(&self, values: &[WireValue]) -> Result<(), String> {
        if values.len() != self.results.len() {
            return Err(format!(
                "{} declares {} result(s), got {}",
                self.procedure.name(),
                self.results.len(),
                values.len()
            ));
        }
        for (i, (slot, value)) in self.results.iter().zip(values).enumerate() {
            if !slot.accepts(value) {
                return Err(format!(
                    "{} result {} must be {}, got {}",
                    self.procedure.name(),
                    i,
                    slot,
                    value.wire_type()
                ));
            }
        }
        Ok(())
    }
}

macro_rules! procedure_catalog {
    (
        $(
            $(#[$doc:meta])*
            $variant:ident = $id:literal, $name:literal,
                args: [$($arg:expr),*],
                results: [$($res:expr),*],
                diagnostic: $diag:literal;
        )*
    ) => {
        /// Every remote operation a driver can be asked to run.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Procedure {
            $( $(#[$doc])* $variant, )*
        }

        impl Procedure {
            pub const ALL: &'static [Procedure] = &[$(Procedure::$variant),*];

            /// The id sent on the wire.
            pub const fn id(self) -> u32 {
                match self {
                    $( Procedure::$variant => $id, )*
                }
            }

            pub const fn from_id(id: u32) -> Option<Self> {
                match id {
                    $( $id => Some(Procedure::$variant), )*
                    _ => None,
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $( Procedure::$variant => $name, )*
                }
            }

            pub fn entry(self) -> &'static CatalogEntry {
                match self {
                    $(
                        Procedure::$variant => {
                            static ENTRY: CatalogEntry = CatalogEntry {
                                procedure: Procedure::$variant,
                                args: &[$($arg),*],
                                results: &[$($res),*],
                                diagnostic_on_failure: $diag,
                            };
                            &ENTRY
                        }
                    )*
                }
            }
        }
    };
}

procedure_catalog! {
    CloseDatabase = 1, "close_database",
        args: [], results: [], diagnostic: true;
    CreateDatabase = 2, "create_database",
        args: [TEXT], results: [], diagnostic: true;
    DeleteDatabase = 3, "delete_database",
        args: [TEXT], results: [], diagnostic: true;
    /// Location → one single-column row per database name.
    ListDatabases = 5, "list_databases",
        args: [TEXT], results: [ROWSET], diagnostic: true;
    /// Database name and optional schema; doubles as the connection handshake.
    OpenDatabase = 6, "open_database",
        args: [TEXT, OPT_TEXT], results: [], diagnostic: true;
    ShutdownDriver = 7, "shutdown_driver",
        args: [], results: [], diagnostic: false;
    CloseCursor = 10, "close_cursor",
        args: [INT], results: [], diagnostic: true;
    /// Cursor id and position → a one-row row-set, or NULL past the end.
    Fetch = 12, "fetch",
        args: [INT, INT], results: [OPT_ROWSET], diagnostic: true;
    /// SQL and cursor mode → cursor id and its column descriptions.
    OpenSelectCursor = 15, "open_select_cursor",
        args: [TEXT, INT], results: [INT, ROWSET], diagnostic: true;
    GetNumRows = 18, "get_num_rows",
        args: [INT], results: [INT], diagnostic: true;
    /// SQL text → number of affected rows.
    ExecuteImmediate = 30, "execute_immediate",
        args: [TEXT], results: [INT], diagnostic: true;
    BeginTransaction = 31, "begin_transaction",
        args: [], results: [], diagnostic: true;
    CommitTransaction = 32, "commit_transaction",
        args: [], results: [], diagnostic: true;
    RollbackTransaction = 33, "rollback_transaction",
        args: [], results: [], diagnostic: true;
    CreateTable = 40, "create_table",
        args: [TEXT, ROWSET], results: [], diagnostic: true;
    DescribeTable = 41, "describe_table",
        args: [TEXT], results: [ROWSET], diagnostic: true;
    DropTable = 42, "drop_table",
        args: [TEXT], results: [], diagnostic: true;
    /// Non-zero argument includes system tables.
    ListTables = 43, "list_tables",
        args: [INT], results: [ROWSET], diagnostic: true;
    AddColumn = 44, "add_column",
        args: [TEXT, ROWSET], results: [], diagnostic: true;
    DropColumn = 45, "drop_column",
        args: [TEXT, TEXT], results: [], diagnostic: true;
    GrantOnTable = 46, "grant_on_table",
        args: [TEXT, INT, INT], results: [], diagnostic: true;
    CreateIndex = 701, "create_index",
        args: [TEXT, TEXT, ROWSET, INT], results: [], diagnostic: true;
    ListIndexes = 702, "list_indexes",
        args: [TEXT], results: [ROWSET], diagnostic: true;
    DropIndex = 703, "drop_index",
        args: [TEXT], results: [], diagnostic: true;
    Version = 999, "version",
        args: [], results: [TEXT], diagnostic: false;
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
