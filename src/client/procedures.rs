//! Typed wrappers over the generic call path, one per catalog procedure.
//!
//! Each wrapper only converts arguments into wire values and results back;
//! argument order and result shape come from the catalog.

use super::handle::DriverHandle;
use crate::config::ConnectionParams;
use crate::error::{DbmiError, DbmiResult};
use crate::proto::{Procedure, Row, WireValue};
use crate::schema::{
    int_field, text_field, ColumnDefinition, Cursor, CursorMode, FetchPosition, Grantee,
    IndexDefinition, Privileges,
};

impl DriverHandle {
    // ------------------------------------------------------------------------
    // Databases
    // ------------------------------------------------------------------------

    /// The open-database handshake. Marks the handle connected on success.
    pub async fn open_database(&mut self, params: &ConnectionParams) -> DbmiResult<()> {
        self.call_checked(
            Procedure::OpenDatabase,
            &[
                WireValue::Text(params.database.clone()),
                WireValue::from(params.schema.clone()),
            ],
        )
        .await?;
        self.mark_connected();
        Ok(())
    }

    pub async fn close_database(&mut self) -> DbmiResult<()> {
        self.call_checked(Procedure::CloseDatabase, &[]).await?;
        Ok(())
    }

    pub async fn create_database(&mut self, name: &str) -> DbmiResult<()> {
        self.call_checked(Procedure::CreateDatabase, &[WireValue::from(name)])
            .await?;
        Ok(())
    }

    pub async fn delete_database(&mut self, name: &str) -> DbmiResult<()> {
        self.call_checked(Procedure::DeleteDatabase, &[WireValue::from(name)])
            .await?;
        Ok(())
    }

    pub async fn list_databases(&mut self, location: &str) -> DbmiResult<Vec<String>> {
        let values = self
            .call_checked(Procedure::ListDatabases, &[WireValue::from(location)])
            .await?;
        names(first_rowset(values)?)
    }

    pub async fn version(&mut self) -> DbmiResult<String> {
        let values = self.call_checked(Procedure::Version, &[]).await?;
        match values.into_iter().next() {
            Some(WireValue::Text(v)) => Ok(v),
            _ => Err(DbmiError::protocol("version returned no text")),
        }
    }

    // ------------------------------------------------------------------------
    // Tables and columns
    // ------------------------------------------------------------------------

    pub async fn list_tables(&mut self, include_system: bool) -> DbmiResult<Vec<String>> {
        let values = self
            .call_checked(Procedure::ListTables, &[WireValue::from(include_system)])
            .await?;
        names(first_rowset(values)?)
    }

    pub async fn describe_table(&mut self, table: &str) -> DbmiResult<Vec<ColumnDefinition>> {
        let values = self
            .call_checked(Procedure::DescribeTable, &[WireValue::from(table)])
            .await?;
        ColumnDefinition::from_rowset(&first_rowset(values)?)
    }

    pub async fn create_table(
        &mut self,
        table: &str,
        columns: &[ColumnDefinition],
    ) -> DbmiResult<()> {
        self.call_checked(
            Procedure::CreateTable,
            &[WireValue::from(table), ColumnDefinition::to_rowset(columns)],
        )
        .await?;
        Ok(())
    }

    pub async fn drop_table(&mut self, table: &str) -> DbmiResult<()> {
        self.call_checked(Procedure::DropTable, &[WireValue::from(table)])
            .await?;
        Ok(())
    }

    pub async fn add_column(&mut self, table: &str, column: &ColumnDefinition) -> DbmiResult<()> {
        self.call_checked(
            Procedure::AddColumn,
            &[WireValue::from(table), WireValue::RowSet(vec![column.to_row()])],
        )
        .await?;
        Ok(())
    }

    pub async fn drop_column(&mut self, table: &str, column: &str) -> DbmiResult<()> {
        self.call_checked(Procedure::DropColumn, &[WireValue::from(table), WireValue::from(column)])
            .await?;
        Ok(())
    }

    pub async fn grant_on_table(
        &mut self,
        table: &str,
        privileges: Privileges,
        grantee: Grantee,
    ) -> DbmiResult<()> {
        self.call_checked(
            Procedure::GrantOnTable,
            &[
                WireValue::from(table),
                WireValue::Int(privileges.bits()),
                WireValue::Int(grantee.code()),
            ],
        )
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------------

    pub async fn create_index(&mut self, index: &IndexDefinition) -> DbmiResult<()> {
        self.call_checked(Procedure::CreateIndex, &index.to_args())
            .await?;
        Ok(())
    }

    pub async fn list_indexes(&mut self, table: &str) -> DbmiResult<Vec<IndexDefinition>> {
        let values = self
            .call_checked(Procedure::ListIndexes, &[WireValue::from(table)])
            .await?;
        first_rowset(values)?
            .iter()
            .map(|row| IndexDefinition::from_row(row))
            .collect()
    }

    pub async fn drop_index(&mut self, index: &str) -> DbmiResult<()> {
        self.call_checked(Procedure::DropIndex, &[WireValue::from(index)])
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Statements and cursors
    // ------------------------------------------------------------------------

    /// Run a statement that returns no rows; yields the affected row count.
    pub async fn execute(&mut self, sql: &str) -> DbmiResult<i32> {
        let values = self
            .call_checked(Procedure::ExecuteImmediate, &[WireValue::from(sql)])
            .await?;
        first_int(&values)
    }

    pub async fn open_select_cursor(&mut self, sql: &str, mode: CursorMode) -> DbmiResult<Cursor> {
        let mut values = self
            .call_checked(
                Procedure::OpenSelectCursor,
                &[WireValue::from(sql), WireValue::Int(mode.code())],
            )
            .await?;
        let columns = values
            .pop()
            .and_then(WireValue::into_rows)
            .ok_or_else(|| DbmiError::protocol("open_select_cursor returned no columns"))?;
        let id = first_int(&values)?;
        Cursor::from_results(id, &columns)
    }

    /// Fetch one row; `None` once the cursor is exhausted.
    pub async fn fetch(&mut self, cursor: &Cursor, position: FetchPosition) -> DbmiResult<Option<Row>> {
        let values = self
            .call_checked(
                Procedure::Fetch,
                &[WireValue::Int(cursor.id), WireValue::Int(position.code())],
            )
            .await?;
        match values.into_iter().next() {
            Some(WireValue::Null) => Ok(None),
            Some(WireValue::RowSet(rows)) => match <[Row; 1]>::try_from(rows) {
                Ok([row]) => Ok(Some(row)),
                Err(rows) => Err(DbmiError::Protocol(format!(
                    "fetch must return exactly one row, got {}",
                    rows.len()
                ))),
            },
            _ => Err(DbmiError::protocol("fetch returned no row slot")),
        }
    }

    /// Fetch every remaining row of a cursor.
    pub async fn fetch_all(&mut self, cursor: &Cursor) -> DbmiResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch(cursor, FetchPosition::Next).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn get_num_rows(&mut self, cursor: &Cursor) -> DbmiResult<i32> {
        let values = self
            .call_checked(Procedure::GetNumRows, &[WireValue::Int(cursor.id)])
            .await?;
        first_int(&values)
    }

    pub async fn close_cursor(&mut self, cursor: Cursor) -> DbmiResult<()> {
        self.call_checked(Procedure::CloseCursor, &[WireValue::Int(cursor.id)])
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    pub async fn begin_transaction(&mut self) -> DbmiResult<()> {
        self.call_checked(Procedure::BeginTransaction, &[]).await?;
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> DbmiResult<()> {
        self.call_checked(Procedure::CommitTransaction, &[]).await?;
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> DbmiResult<()> {
        self.call_checked(Procedure::RollbackTransaction, &[]).await?;
        Ok(())
    }
}

fn first_rowset(values: Vec<WireValue>) -> DbmiResult<Vec<Row>> {
    values
        .into_iter()
        .next()
        .and_then(WireValue::into_rows)
        .ok_or_else(|| DbmiError::protocol("Expected a row-set result"))
}

fn first_int(values: &[WireValue]) -> DbmiResult<i32> {
    values
        .first()
        .ok_or_else(|| DbmiError::protocol("Expected an INT result"))
        .and_then(|v| int_field(v, "result"))
}

/// Names from single-column rows.
fn names(rows: Vec<Row>) -> DbmiResult<Vec<String>> {
    rows.iter()
        .map(|row| match row.first() {
            Some(value) => text_field(value, "name"),
            None => Err(DbmiError::protocol("Empty row in name list")),
        })
        .collect()
}
