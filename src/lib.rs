//! dbmi - client side of the database-middleware driver protocol.
//!
//! Database drivers run as separate processes. A client starts one, talks to
//! it over its stdin/stdout with a small binary protocol, and runs numbered
//! procedures (open a database, describe a table, drop a column, ...).
//!
//! Architecture:
//! - `proto`: wire values, status codes, the codec and the procedure catalog
//! - `client`: channel endpoint, request/response envelope, driver handle and
//!   process manager
//! - `driver`: the serve loop a driver executable runs on its side
//! - `schema`: column, index and cursor descriptors carried in row-sets
//! - `config`: client timeouts and limits, driver registry

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod proto;
pub mod schema;

pub use client::{
    spawn_driver, ChannelEndpoint, DriverHandle, DriverManager, DriverProcess, HandleState,
    ProcedureRequest, ProcedureResponse, SharedDriver,
};
pub use config::{ClientConfig, ConnectionParams, DriverRegistry, DriverSpec};
pub use driver::{
    encode_reply, encode_reply_within, serve, serve_stdio, Driver, DriverFailure, DriverReply,
};
pub use error::{DbmiError, DbmiResult, ErrorKind};
pub use proto::{CodecLimits, Procedure, Row, StatusCode, WireType, WireValue};
pub use schema::{
    ColumnDefinition, Cursor, CursorMode, FetchPosition, Grantee, IndexDefinition, Privileges,
    SqlType,
};
