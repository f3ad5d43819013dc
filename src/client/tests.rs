//! Tests for the client call path against scripted drivers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::*;
use crate::config::{ClientConfig, ConnectionParams, DriverSpec};
use crate::driver::{encode_reply, serve, DriverFailure, DriverReply};
use crate::error::ErrorKind;
use crate::proto::{CodecLimits, Procedure, Row, StatusCode, WireValue};
use crate::schema::{ColumnDefinition, CursorMode, SqlType};

// ============================================================================
// Scaffolding
// ============================================================================

/// A handle wired to an in-memory pipe; the other end plays the driver.
fn attached(config: ClientConfig) -> (DriverHandle, DuplexStream) {
    let (client, driver) = tokio::io::duplex(4096);
    let (r, w) = tokio::io::split(client);
    let handle = DriverHandle::attach(ChannelEndpoint::from_halves(r, w), None, config);
    (handle, driver)
}

fn request_bytes(procedure: Procedure, args: &[WireValue]) -> Vec<u8> {
    ProcedureRequest::new(procedure, args).encode().to_vec()
}

/// Read one request and check it byte for byte.
async fn expect_request(driver: &mut DuplexStream, expected: &[u8]) {
    let mut got = vec![0u8; expected.len()];
    driver.read_exact(&mut got).await.unwrap();
    pretty_assertions::assert_eq!(got, expected);
}

/// Process stand-in that never exits on its own and records kills.
struct SpyProcess {
    killed: Arc<AtomicBool>,
}

impl SpyProcess {
    fn new() -> (Box<dyn DriverProcess>, Arc<AtomicBool>) {
        let killed = Arc::new(AtomicBool::new(false));
        (
            Box::new(SpyProcess {
                killed: Arc::clone(&killed),
            }),
            killed,
        )
    }
}

impl DriverProcess for SpyProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        Ok(None)
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_close_config() -> ClientConfig {
    ClientConfig::default()
        .shutdown_timeout(Duration::from_millis(100))
        .reap_grace(Duration::ZERO)
}

// ============================================================================
// Call Path
// ============================================================================

mod call_path {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_drop_column_bytes_and_success() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            let mut expected = vec![45, 0, 0, 0];
            expected.extend_from_slice(&[0x03, 7, 0, 0, 0]);
            expected.extend_from_slice(b"mytable");
            expected.extend_from_slice(&[0x03, 5, 0, 0, 0]);
            expected.extend_from_slice(b"mycol");
            expect_request(&mut driver, &expected).await;
            driver.write_all(&[0, 0, 0, 0]).await.unwrap();
            driver
        });

        let response = handle
            .call(
                Procedure::DropColumn,
                &[WireValue::from("mytable"), WireValue::from("mycol")],
            )
            .await
            .unwrap();

        assert!(response.is_success());
        assert!(response.values.is_empty());
        assert_eq!(response.diagnostic, None);
        assert_eq!(handle.last_status(), Some(StatusCode::Ok));
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_argument_error_sends_nothing() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let err = handle
            .call(Procedure::DropColumn, &[WireValue::from("mytable")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);

        let err = handle
            .call(
                Procedure::DropColumn,
                &[WireValue::from("mytable"), WireValue::Int(3)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);

        assert_eq!(handle.bytes_sent(), 0);
        assert_eq!(handle.state(), HandleState::Disconnected);

        handle.close().await;
        let mut seen = Vec::new();
        driver.read_to_end(&mut seen).await.unwrap();
        assert!(seen.is_empty(), "driver saw {} byte(s)", seen.len());
    }

    #[tokio::test]
    async fn test_failure_carries_diagnostic_and_handle_survives() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            let args = [WireValue::from("roads"), WireValue::from("nope")];
            expect_request(&mut driver, &request_bytes(Procedure::DropColumn, &args)).await;
            let reply = encode_reply(
                Procedure::DropColumn,
                Err(DriverFailure::failed("column 'nope' does not exist")),
            );
            driver.write_all(&reply).await.unwrap();

            expect_request(&mut driver, &request_bytes(Procedure::ExecuteImmediate, &[WireValue::from("DELETE FROM roads")])).await;
            let reply = encode_reply(Procedure::ExecuteImmediate, Ok(vec![WireValue::Int(12)]));
            driver.write_all(&reply).await.unwrap();
            driver
        });

        let response = handle
            .call(
                Procedure::DropColumn,
                &[WireValue::from("roads"), WireValue::from("nope")],
            )
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::Failed);
        assert_eq!(
            response.diagnostic.as_deref(),
            Some("column 'nope' does not exist")
        );
        assert_eq!(handle.last_status(), Some(StatusCode::Failed));
        assert!(!handle.is_faulted());

        assert_eq!(handle.execute("DELETE FROM roads").await.unwrap(), 12);
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_typed_wrapper_reports_operation_error() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            let args = [WireValue::from("roads")];
            expect_request(&mut driver, &request_bytes(Procedure::DropTable, &args)).await;
            let failure = DriverFailure {
                status: StatusCode::PermissionDenied,
                diagnostic: Some("read-only database".to_string()),
            };
            driver
                .write_all(&encode_reply(Procedure::DropTable, Err(failure)))
                .await
                .unwrap();
            driver
        });

        let err = handle.drop_table("roads").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(err.diagnostic(), Some("read-only database"));
        assert!(!handle.is_faulted());
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_tag_faults_handle() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            expect_request(&mut driver, &request_bytes(Procedure::Version, &[])).await;
            driver.write_all(&[0, 0, 0, 0, 0x7f, 1, 2, 3]).await.unwrap();
            driver
        });

        let err = handle.call(Procedure::Version, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(handle.is_faulted());
        let mut driver = stub.await.unwrap();

        let sent = handle.bytes_sent();
        let err = handle.call(Procedure::Version, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        let err = handle.drop_column("a", "b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(handle.bytes_sent(), sent, "faulted handle must not touch the channel");

        handle.close().await;
        let mut rest = Vec::new();
        driver.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_is_protocol_error() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            expect_request(&mut driver, &request_bytes(Procedure::BeginTransaction, &[])).await;
            driver.write_all(&7i32.to_le_bytes()).await.unwrap();
            driver
        });

        let err = handle.begin_transaction().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("Unrecognized status 7"));
        assert!(handle.is_faulted());
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_result_type_is_protocol_error() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            expect_request(&mut driver, &request_bytes(Procedure::ExecuteImmediate, &[WireValue::from("x")])).await;
            // Status OK, then a STRING where the catalog declares an INT.
            driver
                .write_all(&[0, 0, 0, 0, 0x03, 1, 0, 0, 0, b'?'])
                .await
                .unwrap();
            driver
        });

        let err = handle.execute("x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(handle.is_faulted());
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_driver_exit_mid_call_is_connection_error() {
        let (mut handle, driver) = attached(ClientConfig::default());
        drop(driver);

        let err = handle.call(Procedure::Version, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(handle.is_faulted());
    }

    #[tokio::test]
    async fn test_abandoned_call_faults_handle() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            let args = [WireValue::from("a")];
            expect_request(&mut driver, &request_bytes(Procedure::ExecuteImmediate, &args)).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            let reply = encode_reply(Procedure::ExecuteImmediate, Ok(vec![WireValue::Int(111)]));
            driver.write_all(&reply).await.unwrap();
            driver
        });

        // The caller gives up on its own; the handle has no call timeout.
        let abandoned = tokio::time::timeout(Duration::from_millis(20), handle.execute("a")).await;
        assert!(abandoned.is_err());
        assert!(handle.is_faulted());

        // The late answer to "a" is in the pipe now and must never be read as "b"'s.
        let _driver = stub.await.unwrap();
        let sent = handle.bytes_sent();
        let err = handle.execute("b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(handle.bytes_sent(), sent);
    }

    #[tokio::test]
    async fn test_response_cut_after_status_is_protocol_error() {
        let (mut handle, mut driver) = attached(ClientConfig::default());

        let stub = tokio::spawn(async move {
            let args = [WireValue::from("x")];
            expect_request(&mut driver, &request_bytes(Procedure::ExecuteImmediate, &args)).await;
            // Status OK, then the driver exits before the row count.
            driver.write_all(&[0, 0, 0, 0]).await.unwrap();
        });

        let err = handle.execute("x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(handle.is_faulted());
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_faults_and_releases() {
        let config = fast_close_config().call_timeout(Duration::from_millis(50));
        let (client, mut driver) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(client);
        let (process, killed) = SpyProcess::new();
        let mut handle =
            DriverHandle::attach(ChannelEndpoint::from_halves(r, w), Some(process), config);

        // The driver reads the request and never answers.
        let stub = tokio::spawn(async move {
            let mut sink = Vec::new();
            driver.read_to_end(&mut sink).await.unwrap();
            sink
        });

        let err = handle.call(Procedure::Version, &[]).await.unwrap_err();
        assert!(matches!(err, crate::error::DbmiError::Timeout(_)));
        assert!(handle.is_faulted());
        assert!(killed.load(Ordering::SeqCst));

        // The channel was released, so the driver side sees end of stream.
        let sink = stub.await.unwrap();
        assert_eq!(sink, request_bytes(Procedure::Version, &[]));

        let err = handle.call(Procedure::Version, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_close_never_opened() {
        let mut handle = DriverHandle::default();
        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close must not block");
        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("second close must not block");
        assert_eq!(handle.state(), HandleState::Disconnected);

        let err = handle.call(Procedure::Version, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_close_faulted_kills_process() {
        let (client, mut driver) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(client);
        let (process, killed) = SpyProcess::new();
        // Generous grace: a faulted handle must not wait for it.
        let config = ClientConfig::default().reap_grace(Duration::from_secs(30));
        let mut handle =
            DriverHandle::attach(ChannelEndpoint::from_halves(r, w), Some(process), config);
        assert_eq!(handle.process_id(), Some(4242));

        let stub = tokio::spawn(async move {
            expect_request(&mut driver, &request_bytes(Procedure::Version, &[])).await;
            driver.write_all(&[0xaa, 0xbb, 0xcc, 0xdd]).await.unwrap();
            driver
        });
        assert!(handle.call(Procedure::Version, &[]).await.is_err());
        assert!(handle.is_faulted());
        let _driver = stub.await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle.close())
            .await
            .expect("close of a faulted handle must not block");
        assert!(killed.load(Ordering::SeqCst));
        assert_eq!(handle.process_id(), None);
    }

    #[tokio::test]
    async fn test_close_connected_notifies_driver() {
        let (client, mut driver) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(client);
        let (process, killed) = SpyProcess::new();
        let mut handle = DriverHandle::attach(
            ChannelEndpoint::from_halves(r, w),
            Some(process),
            fast_close_config(),
        );

        let stub = tokio::spawn(async move {
            let open_args = [WireValue::from("gisdb"), WireValue::Null];
            expect_request(&mut driver, &request_bytes(Procedure::OpenDatabase, &open_args)).await;
            driver.write_all(&encode_reply(Procedure::OpenDatabase, Ok(vec![]))).await.unwrap();

            expect_request(&mut driver, &request_bytes(Procedure::CloseDatabase, &[])).await;
            driver.write_all(&encode_reply(Procedure::CloseDatabase, Ok(vec![]))).await.unwrap();

            expect_request(&mut driver, &request_bytes(Procedure::ShutdownDriver, &[])).await;
            driver.write_all(&encode_reply(Procedure::ShutdownDriver, Ok(vec![]))).await.unwrap();

            let mut rest = Vec::new();
            driver.read_to_end(&mut rest).await.unwrap();
            rest
        });

        handle.open_database(&ConnectionParams::new("gisdb")).await.unwrap();
        assert!(handle.is_connected());

        handle.close().await;
        assert_eq!(handle.state(), HandleState::Disconnected);
        assert!(killed.load(Ordering::SeqCst), "spy never exits, so close must kill it");
        assert!(stub.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_with_silent_driver_is_bounded() {
        let (client, mut driver) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(client);
        let (process, killed) = SpyProcess::new();
        let mut handle = DriverHandle::attach(
            ChannelEndpoint::from_halves(r, w),
            Some(process),
            fast_close_config(),
        );

        let stub = tokio::spawn(async move {
            let open_args = [WireValue::from("gisdb"), WireValue::from("public")];
            expect_request(&mut driver, &request_bytes(Procedure::OpenDatabase, &open_args)).await;
            driver.write_all(&encode_reply(Procedure::OpenDatabase, Ok(vec![]))).await.unwrap();
            // Swallow everything else without answering.
            let mut sink = Vec::new();
            driver.read_to_end(&mut sink).await.unwrap();
        });

        handle
            .open_database(&ConnectionParams::new("gisdb").schema("public"))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle.close())
            .await
            .expect("close must respect the shutdown timeout");
        assert!(killed.load(Ordering::SeqCst));
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_kills_unclosed_process() {
        let (client, _driver) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(client);
        let (process, killed) = SpyProcess::new();
        let handle = DriverHandle::attach(
            ChannelEndpoint::from_halves(r, w),
            Some(process),
            ClientConfig::default(),
        );
        drop(handle);
        assert!(killed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_connection_error() {
        let manager = DriverManager::new(fast_close_config());
        let spec = DriverSpec::new("missing", "/nonexistent/dbmi-driver-binary");
        let err = manager
            .open(&spec, &ConnectionParams::new("db"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("missing"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_handshake_with_real_process() {
        // `cat` echoes the request back; its first word is not a valid status.
        let manager = DriverManager::new(fast_close_config());
        let spec = DriverSpec::new("echo", "cat");
        let err = manager
            .open(&spec, &ConnectionParams::new("db"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("Handshake with driver 'echo' failed"));
    }
}

// ============================================================================
// Serialization
// ============================================================================

mod serialization {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_concurrent_callers_are_serialized() {
        let (handle, mut driver) = attached(ClientConfig::default());
        let shared = SharedDriver::new(handle);

        let req_a = request_bytes(Procedure::ExecuteImmediate, &[WireValue::from("UPDATE a SET x = 1")]);
        let req_b = request_bytes(Procedure::ExecuteImmediate, &[WireValue::from("UPDATE b SET y = 2")]);
        assert_eq!(req_a.len(), req_b.len());

        let (exp_a, exp_b) = (req_a.clone(), req_b.clone());
        let stub = tokio::spawn(async move {
            let mut order = Vec::new();
            for _ in 0..2 {
                let mut got = vec![0u8; exp_a.len()];
                driver.read_exact(&mut got).await.unwrap();

                // Nothing else may arrive until this request is answered.
                let mut probe = [0u8; 1];
                let early = tokio::time::timeout(Duration::from_millis(50), driver.read(&mut probe)).await;
                assert!(early.is_err(), "second request arrived before the first response");

                let affected = if got == exp_a {
                    order.push('a');
                    1
                } else {
                    assert_eq!(got, exp_b);
                    order.push('b');
                    2
                };
                let reply = encode_reply(Procedure::ExecuteImmediate, Ok(vec![WireValue::Int(affected)]));
                driver.write_all(&reply).await.unwrap();
            }
            order
        });

        let (a, b) = (shared.clone(), shared.clone());
        let task_a = tokio::spawn(async move {
            a.call(Procedure::ExecuteImmediate, &[WireValue::from("UPDATE a SET x = 1")])
                .await
                .unwrap()
        });
        let task_b = tokio::spawn(async move {
            b.call(Procedure::ExecuteImmediate, &[WireValue::from("UPDATE b SET y = 2")])
                .await
                .unwrap()
        });

        // Each caller gets the answer to its own request.
        assert_eq!(task_a.await.unwrap().values, vec![WireValue::Int(1)]);
        assert_eq!(task_b.await.unwrap().values, vec![WireValue::Int(2)]);

        let order = stub.await.unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(shared.state().await, HandleState::Disconnected);
    }
}

// ============================================================================
// End to End Against the Serve Loop
// ============================================================================

/// A tiny table store driven entirely through the catalog.
#[derive(Default)]
struct MemoryDriver {
    database: Option<String>,
    tables: BTreeMap<String, Vec<ColumnDefinition>>,
    rows: Vec<Row>,
    cursor_pos: usize,
    in_transaction: bool,
    calls: Vec<Procedure>,
}

impl crate::driver::Driver for MemoryDriver {
    fn dispatch(&mut self, procedure: Procedure, args: Vec<WireValue>) -> DriverReply {
        self.calls.push(procedure);
        match procedure {
            Procedure::OpenDatabase => {
                self.database = args[0].as_text().map(str::to_string);
                Ok(vec![])
            }
            Procedure::CloseDatabase | Procedure::ShutdownDriver => Ok(vec![]),
            Procedure::Version => Ok(vec![WireValue::from("memory 1.0")]),
            Procedure::CreateTable => {
                let name = args[0].as_text().unwrap_or_default().to_string();
                let rows = args[1].clone().into_rows().unwrap_or_default();
                let columns = ColumnDefinition::from_rowset(&rows)
                    .map_err(|e| DriverFailure::failed(e.to_string()))?;
                self.tables.insert(name, columns);
                Ok(vec![])
            }
            Procedure::ListTables => Ok(vec![WireValue::column(
                self.tables.keys().cloned().map(WireValue::Text),
            )]),
            Procedure::DescribeTable => {
                let name = args[0].as_text().unwrap_or_default();
                match self.tables.get(name) {
                    Some(columns) => Ok(vec![ColumnDefinition::to_rowset(columns)]),
                    None => Err(DriverFailure::failed(format!("table '{}' not found", name))),
                }
            }
            Procedure::DropColumn => {
                let table = args[0].as_text().unwrap_or_default();
                let column = args[1].as_text().unwrap_or_default();
                let columns = self
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| DriverFailure::failed(format!("table '{}' not found", table)))?;
                let before = columns.len();
                columns.retain(|c| c.name != column);
                if columns.len() == before {
                    return Err(DriverFailure::failed(format!("column '{}' not found", column)));
                }
                Ok(vec![])
            }
            Procedure::ExecuteImmediate => {
                let value = args[0].as_text().unwrap_or_default().len() as i32;
                self.rows.push(Row::from_vec(vec![WireValue::Int(value)]));
                Ok(vec![WireValue::Int(1)])
            }
            Procedure::OpenSelectCursor => {
                self.cursor_pos = 0;
                Ok(vec![
                    WireValue::Int(1),
                    WireValue::single_row([WireValue::from("len"), WireValue::Int(SqlType::Integer.code())]),
                ])
            }
            Procedure::Fetch => match self.rows.get(self.cursor_pos) {
                Some(row) => {
                    self.cursor_pos += 1;
                    Ok(vec![WireValue::RowSet(vec![row.clone()])])
                }
                None => Ok(vec![WireValue::Null]),
            },
            Procedure::GetNumRows => Ok(vec![WireValue::Int(self.rows.len() as i32)]),
            Procedure::CloseCursor => Ok(vec![]),
            Procedure::BeginTransaction => {
                self.in_transaction = true;
                Ok(vec![])
            }
            Procedure::CommitTransaction => {
                self.in_transaction = false;
                Ok(vec![])
            }
            other => Err(DriverFailure::not_implemented(other)),
        }
    }
}

mod end_to_end {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_session_against_serve_loop() {
        let (client, server) = tokio::io::duplex(4096);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            let mut channel = ChannelEndpoint::from_halves(sr, sw);
            let mut driver = MemoryDriver::default();
            serve(&mut channel, &mut driver, &CodecLimits::default())
                .await
                .map(|_| driver)
        });

        let mut handle = DriverHandle::attach(
            ChannelEndpoint::from_halves(cr, cw),
            None,
            ClientConfig::default(),
        );

        handle.open_database(&ConnectionParams::new("gisdb")).await.unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.version().await.unwrap(), "memory 1.0");

        let columns = vec![
            ColumnDefinition::new("cat", SqlType::Integer).not_null(),
            ColumnDefinition::new("label", SqlType::Character).length(40),
        ];
        handle.create_table("roads", &columns).await.unwrap();
        assert_eq!(handle.list_tables(false).await.unwrap(), vec!["roads".to_string()]);
        assert_eq!(handle.describe_table("roads").await.unwrap(), columns);

        handle.drop_column("roads", "label").await.unwrap();
        let err = handle.drop_column("roads", "label").await.unwrap_err();
        assert_eq!(err.diagnostic(), Some("column 'label' not found"));
        assert_eq!(handle.describe_table("roads").await.unwrap().len(), 1);

        handle.begin_transaction().await.unwrap();
        assert_eq!(handle.execute("abc").await.unwrap(), 1);
        assert_eq!(handle.execute("abcde").await.unwrap(), 1);
        handle.commit_transaction().await.unwrap();

        let cursor = handle
            .open_select_cursor("SELECT len FROM log", CursorMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(cursor.column_names().collect::<Vec<_>>(), vec!["len"]);
        assert_eq!(handle.get_num_rows(&cursor).await.unwrap(), 2);
        let rows = handle.fetch_all(&cursor).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], WireValue::Int(5));
        handle.close_cursor(cursor).await.unwrap();

        let err = handle.rollback_transaction().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        match err {
            crate::error::DbmiError::Operation { status, .. } => {
                assert_eq!(status, StatusCode::NotImplemented)
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(handle.is_connected());

        handle.close().await;
        let driver = server_task.await.unwrap().unwrap();
        assert_eq!(driver.database.as_deref(), Some("gisdb"));
        assert!(!driver.in_transaction);
        assert_eq!(
            &driver.calls[driver.calls.len() - 2..],
            &[Procedure::CloseDatabase, Procedure::ShutdownDriver]
        );
    }

    #[tokio::test]
    async fn test_closure_driver() {
        let (client, server) = tokio::io::duplex(1024);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);

        let server_task = tokio::spawn(async move {
            let mut channel = ChannelEndpoint::from_halves(sr, sw);
            let mut driver = |procedure: Procedure, _args: Vec<WireValue>| -> DriverReply {
                match procedure {
                    Procedure::ListDatabases => Ok(vec![WireValue::column([
                        WireValue::from("gisdb"),
                        WireValue::from("scratch"),
                    ])]),
                    other => Err(DriverFailure::not_implemented(other)),
                }
            };
            serve(&mut channel, &mut driver, &CodecLimits::default()).await
        });

        let mut handle = DriverHandle::attach(
            ChannelEndpoint::from_halves(cr, cw),
            None,
            ClientConfig::default(),
        );
        assert_eq!(
            handle.list_databases("/data").await.unwrap(),
            vec!["gisdb".to_string(), "scratch".to_string()]
        );
        let err = handle.create_database("new").await.unwrap_err();
        assert!(err.to_string().contains("not supported"));

        // Never connected, so close only drops the channel; the driver sees EOF.
        handle.close().await;
        server_task.await.unwrap().unwrap();
    }
}
