//! MySQL client/server wire protocol over a blocking byte stream.
//!
//! This crate speaks the MySQL protocol directly, without a client library:
//!
//! - Packet framing with sequence numbers and split-packet reassembly
//! - Handshake and authentication (mysql_native_password,
//!   caching_sha2_password, mysql_clear_password)
//! - Text (COM_QUERY) and binary (COM_STMT_EXECUTE) result decoding
//! - Prepared statement argument marshaling
//! - Multi-result-set responses, read eagerly or as a lazy row stream
//!
//! # MySQL Protocol Overview
//!
//! MySQL uses a packet-based protocol with:
//! - 3-byte payload length + 1-byte sequence number header
//! - Packets over 16MB are split
//! - Strict request/response pairing, one command in flight per connection
//!
//! # Example
//!
//! ```rust,no_run
//! use mysqlwire::{MySqlConfig, MySqlConnection, Value};
//!
//! # fn main() -> mysqlwire::Result<()> {
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .password("secret")
//!     .database("mydb");
//!
//! let mut conn = MySqlConnection::connect(config)?;
//! let stmt = conn.prepare("SELECT id, name FROM users WHERE id > ?")?;
//! for set in conn.query_prepared(&stmt, &[Value::Int(10)])? {
//!     for row in &set.rows {
//!         let name: String = row.get_named("name")?;
//!         println!("{name}");
//!     }
//! }
//! conn.close_statement(stmt)?;
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod binary;
pub mod config;
pub mod connection;
pub mod framer;
pub mod handshake;
pub mod prepared;
pub mod protocol;
pub mod result;
pub mod testing;
pub mod text;
pub mod transport;
pub mod types;

pub use config::MySqlConfig;
pub use connection::{ConnectionState, MySqlConnection, ResultStream};
pub use framer::PacketFramer;
pub use handshake::{AuthState, Handshake};
pub use prepared::PreparedStatement;
pub use result::{ResultSet, ResultStatus};
pub use transport::Transport;
pub use types::{ColumnDef, FieldType};

pub use mysqlwire_core::{Error, Result, Row, SqlTime, Value};
