//! End-to-end conversations against a scripted server byte stream.

use mysqlwire::testing::ScriptedTransport;
use mysqlwire::types::{column_flags, encode_column_def};
use mysqlwire::{ConnectionState, Error, FieldType, MySqlConfig, MySqlConnection, Value};
use mysqlwire_core::ArgumentErrorKind;

const OK: [u8; 7] = [0x00, 0, 0, 2, 0, 0, 0];
const EOF: [u8; 5] = [0xFE, 0, 0, 2, 0];
const EOF_MORE: [u8; 5] = [0xFE, 0, 0, 0x0A, 0];

fn handshake_packet() -> Vec<u8> {
    let mut p = vec![10];
    p.extend_from_slice(b"8.0.36\0");
    p.extend_from_slice(&42u32.to_le_bytes());
    p.extend_from_slice(b"ABCDEFGH\0");
    p.extend_from_slice(&0xF7FFu16.to_le_bytes());
    p.push(45);
    p.extend_from_slice(&2u16.to_le_bytes());
    p.extend_from_slice(&0x81FFu16.to_le_bytes());
    p.push(21);
    p.extend_from_slice(&[0; 10]);
    p.extend_from_slice(b"IJKLMNOP0000\0mysql_native_password\0");
    p
}

/// Server side of one conversation, built packet by packet.
struct Server {
    stream: Vec<u8>,
    seq: u8,
}

impl Server {
    fn new() -> Self {
        let mut stream = ScriptedTransport::packet(0, &handshake_packet());
        stream.extend(ScriptedTransport::packet(2, &OK));
        Server { stream, seq: 1 }
    }

    /// Start the reply to the next command.
    fn reply(mut self) -> Self {
        self.seq = 1;
        self
    }

    fn packet(mut self, payload: &[u8]) -> Self {
        self.stream.extend(ScriptedTransport::packet(self.seq, payload));
        self.seq = self.seq.wrapping_add(1);
        self
    }

    /// Account for a packet the client sends mid-reply.
    fn client_packet(mut self) -> Self {
        self.seq = self.seq.wrapping_add(1);
        self
    }

    fn columns(mut self, defs: &[(&str, FieldType, u16)]) -> Self {
        self = self.packet(&[u8::try_from(defs.len()).unwrap()]);
        for (name, ty, flags) in defs {
            self = self.packet(&encode_column_def(name, *ty, *flags, 45));
        }
        self.packet(&EOF)
    }

    fn text_row(self, values: &[&str]) -> Self {
        let mut row = Vec::new();
        for v in values {
            row.push(u8::try_from(v.len()).unwrap());
            row.extend_from_slice(v.as_bytes());
        }
        self.packet(&row)
    }

    fn connect(self) -> MySqlConnection<ScriptedTransport> {
        let config = MySqlConfig::new().user("root").password("secret");
        MySqlConnection::establish(ScriptedTransport::new(self.stream), config).unwrap()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[test]
fn handshake_sends_native_password_token() {
    let conn = Server::new().connect();
    assert_eq!(conn.connection_id(), 42);
    assert_eq!(conn.server_version(), "8.0.36");

    let sent = conn.into_transport().written_packets();
    let (seq, response) = &sent[0];
    assert_eq!(*seq, 1);
    // caps(4) max_packet(4) charset(1) filler(23) "root\0" len(1)
    assert_eq!(response[8], 45);
    assert_eq!(&response[32..37], b"root\0");
    assert_eq!(response[37], 20);
    assert_eq!(
        hex(&response[38..58]),
        "4098f846b58a84f4486db8ff920f53abae997de5"
    );
    assert!(response.ends_with(b"mysql_native_password\0"));
}

#[test]
fn query_reads_every_result_set() {
    let mut conn = Server::new()
        .reply()
        .columns(&[
            ("id", FieldType::LongLong, column_flags::NOT_NULL),
            ("name", FieldType::VarString, 0),
        ])
        .text_row(&["1", "ada"])
        .text_row(&["2", "grace"])
        .packet(&EOF_MORE)
        .columns(&[("n", FieldType::Long, 0)])
        .text_row(&["7"])
        .packet(&EOF)
        .connect();

    let sets = conn.query("SELECT id, name FROM a; SELECT n FROM b").unwrap();
    assert_eq!(sets.len(), 2);

    assert_eq!(sets[0].column_names().collect::<Vec<_>>(), ["id", "name"]);
    assert_eq!(sets[0].len(), 2);
    assert!(sets[0].eof_reached);
    assert!(sets[0].has_more_results);
    assert_eq!(sets[0].rows[1].get(0), Some(&Value::BigInt(2)));
    assert_eq!(sets[0].rows[1].get_named::<String>("name").unwrap(), "grace");

    assert_eq!(sets[1].rows[0].get(0), Some(&Value::Int(7)));
    assert!(!sets[1].has_more_results);
    assert!(conn.is_ready());
}

#[test]
fn stream_walks_result_sets_lazily() {
    let mut conn = Server::new()
        .reply()
        .columns(&[("a", FieldType::Long, 0)])
        .text_row(&["1"])
        .text_row(&["2"])
        .packet(&EOF_MORE)
        .packet(&[0x00, 3, 0, 2, 0, 0, 0])
        .reply()
        .packet(&OK)
        .connect();

    let mut stream = conn.query_iter("SELECT a FROM t; DELETE FROM u").unwrap();
    assert_eq!(stream.columns().len(), 1);
    let first = stream.next().unwrap().unwrap();
    assert_eq!(first.get(0), Some(&Value::Int(1)));
    assert!(!stream.eof_reached());

    // skips row 2
    assert!(stream.next_result_set().unwrap());
    assert!(stream.columns().is_empty());
    assert!(stream.next().is_none());
    assert_eq!(stream.status().unwrap().affected_rows, 3);
    assert!(!stream.next_result_set().unwrap());
    drop(stream);

    assert_eq!(conn.affected_rows(), 3);
    conn.ping().unwrap();
}

#[test]
fn dropped_stream_is_drained_before_next_command() {
    let mut conn = Server::new()
        .reply()
        .columns(&[("a", FieldType::VarString, 0)])
        .text_row(&["x"])
        .text_row(&["y"])
        .text_row(&["z"])
        .packet(&EOF)
        .reply()
        .packet(&[0x00, 1, 0, 2, 0, 0, 0])
        .connect();

    {
        let mut stream = conn.query_iter("SELECT a FROM t").unwrap();
        let row = stream.next().unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::Text("x".into())));
    }

    assert_eq!(conn.exec("UPDATE t SET a = 'q'").unwrap(), 1);
    let transport = conn.into_transport();
    assert_eq!(transport.unread(), 0);
    let sent = transport.written_packets();
    assert_eq!(sent.last(), Some(&(0, b"\x03UPDATE t SET a = 'q'".to_vec())));
}

#[test]
fn error_of_abandoned_stream_does_not_swallow_next_command() {
    let mut interrupted = vec![0xFF, 0x1A, 0x05, b'#'];
    interrupted.extend_from_slice(b"HY000query interrupted");

    let mut conn = Server::new()
        .reply()
        .columns(&[("a", FieldType::VarString, 0)])
        .text_row(&["x"])
        .text_row(&["y"])
        .packet(&interrupted)
        .reply()
        .packet(&OK)
        .connect();

    {
        let mut stream = conn.query_iter("SELECT a FROM t").unwrap();
        stream.next().unwrap().unwrap();
    }

    conn.ping().unwrap();
    assert!(conn.is_ready());
    let transport = conn.into_transport();
    assert_eq!(transport.unread(), 0);
    assert_eq!(transport.written_packets().last(), Some(&(0, vec![0x0E])));
}

#[test]
fn prepared_statement_round_trip() {
    let mut prepare_ok = vec![0x00];
    prepare_ok.extend_from_slice(&1u32.to_le_bytes());
    prepare_ok.extend_from_slice(&2u16.to_le_bytes()); // columns
    prepare_ok.extend_from_slice(&2u16.to_le_bytes()); // params
    prepare_ok.extend_from_slice(&[0, 0, 0]);

    // binary row: header, one bitmap byte (2 columns at offset 2), values
    let mut row = vec![0x00, 0b0000_0000];
    row.extend_from_slice(&42u32.to_le_bytes());
    row.push(3);
    row.extend_from_slice(b"ada");

    let mut conn = Server::new()
        .reply()
        .packet(&prepare_ok)
        .packet(&encode_column_def("?", FieldType::LongLong, 0, 63))
        .packet(&encode_column_def("?", FieldType::VarString, 0, 63))
        .packet(&EOF)
        .packet(&encode_column_def("id", FieldType::Long, column_flags::UNSIGNED, 45))
        .packet(&encode_column_def("name", FieldType::VarString, 0, 45))
        .packet(&EOF)
        .reply()
        .packet(&[2])
        .packet(&encode_column_def("id", FieldType::Long, column_flags::UNSIGNED, 45))
        .packet(&encode_column_def("name", FieldType::VarString, 0, 45))
        .packet(&EOF)
        .packet(&row)
        .packet(&EOF)
        .connect();

    let stmt = conn.prepare("SELECT id, name FROM t WHERE id = ? AND name = ?").unwrap();
    assert_eq!(stmt.id, 1);
    assert_eq!(stmt.param_count, 2);
    assert_eq!(stmt.columns.len(), 2);

    let sets = conn
        .query_prepared(&stmt, &[Value::Int(42), Value::Text("x".into())])
        .unwrap();
    assert_eq!(sets.len(), 1);
    let row = &sets[0].rows[0];
    assert_eq!(row.get(0), Some(&Value::UInt(42)));
    assert_eq!(row.get(1), Some(&Value::Text("ada".into())));

    conn.close_statement(stmt).unwrap();
    let sent = conn.into_transport().written_packets();

    let (_, execute) = &sent[2];
    let mut expected = vec![0x17, 1, 0, 0, 0, 0x00, 1, 0, 0, 0];
    expected.extend_from_slice(&[0x00, 0x01]); // null bitmap, new-params flag
    expected.extend_from_slice(&[0x03, 0x00, 0xFE, 0x00]);
    expected.extend_from_slice(&[42, 0, 0, 0, 1, b'x']);
    assert_eq!(execute, &expected);

    assert_eq!(sent.last(), Some(&(0, vec![0x19, 1, 0, 0, 0])));
}

#[test]
fn argument_count_mismatch_sends_nothing() {
    let mut prepare_ok = vec![0x00];
    prepare_ok.extend_from_slice(&5u32.to_le_bytes());
    prepare_ok.extend_from_slice(&0u16.to_le_bytes());
    prepare_ok.extend_from_slice(&1u16.to_le_bytes());
    prepare_ok.extend_from_slice(&[0, 0, 0]);

    let mut conn = Server::new()
        .reply()
        .packet(&prepare_ok)
        .packet(&encode_column_def("?", FieldType::LongLong, 0, 63))
        .packet(&EOF)
        .connect();

    let stmt = conn.prepare("DELETE FROM t WHERE id = ?").unwrap();
    let err = conn.execute(&stmt, &[]).unwrap_err();
    let expected = ArgumentErrorKind::CountMismatch {
        expected: 1,
        actual: 0,
    };
    assert!(matches!(err, Error::Argument(ref a) if a.kind == expected));
    assert!(conn.is_ready());

    let sent = conn.into_transport().written_packets();
    // handshake response and COM_STMT_PREPARE only
    assert_eq!(sent.len(), 2);
}

#[test]
fn local_infile_request_is_refused() {
    let mut request = vec![0xFB];
    request.extend_from_slice(b"/etc/passwd");
    let mut refused = vec![0xFF, 0x4C, 0x04, b'#'];
    refused.extend_from_slice(b"HY000LOAD DATA LOCAL INFILE is disabled");

    let mut conn = Server::new()
        .reply()
        .packet(&request)
        .client_packet()
        .packet(&refused)
        .connect();

    let err = conn.exec("LOAD DATA LOCAL INFILE '/etc/passwd' INTO TABLE t").unwrap_err();
    assert_eq!(err.server_code(), Some(1100));
    assert!(conn.is_ready());

    let sent = conn.into_transport().written_packets();
    assert_eq!(sent.last(), Some(&(2, Vec::new())));
}

#[test]
fn truncated_reply_breaks_connection() {
    let mut stream = Server::new().stream;
    // header promises 10 bytes, only 3 arrive
    stream.extend_from_slice(&[10, 0, 0, 1, 0x00, 0x00, 0x00]);
    let config = MySqlConfig::new().user("root").password("secret");
    let mut conn = MySqlConnection::establish(ScriptedTransport::new(stream), config).unwrap();

    let err = conn.exec("SELECT 1").unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(conn.state(), ConnectionState::Broken);
    assert!(conn.query("SELECT 1").unwrap_err().is_fatal());

    // a broken connection closes without QUIT
    conn.shutdown().unwrap();
    let sent = conn.into_transport().written_packets();
    assert_eq!(sent.last(), Some(&(0, b"\x03SELECT 1".to_vec())));
}

#[test]
fn reply_larger_than_max_allowed_packet_breaks_connection() {
    let long = "x".repeat(200);
    let stream = Server::new()
        .reply()
        .columns(&[("blob", FieldType::Blob, 0)])
        .text_row(&[long.as_str()])
        .packet(&EOF)
        .stream;
    let config = MySqlConfig::new()
        .user("root")
        .password("secret")
        .max_allowed_packet(128);
    let mut conn = MySqlConnection::establish(ScriptedTransport::new(stream), config).unwrap();

    let err = conn.query("SELECT blob FROM t").unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert_eq!(conn.state(), ConnectionState::Broken);
}
