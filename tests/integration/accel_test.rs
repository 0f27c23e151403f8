//! Accelerated-write tests.
//!
//! Tests index handle caching, write error handling and a full insert over
//! a local HandlerSocket stand-in.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use db_steward::accel::{
    describe_error, AcceleratedWriter, ChannelError, HandlerSocketConnector, IndexHandleCache,
    MockAccelConnector, MockChannel,
};
use db_steward::config::AccelConfig;
use db_steward::db::Value;
use db_steward::error::StewardError;
use pretty_assertions::assert_eq;

fn accel_config(database: &str) -> AccelConfig {
    AccelConfig {
        database: database.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_column_spacing_shares_one_handle() {
    let mut channel = MockChannel::default();
    let mut cache = IndexHandleCache::new();

    let first = cache.resolve(&mut channel, "shop", "orders", "id name").unwrap();
    let second = cache.resolve(&mut channel, "shop", "orders", "id  name").unwrap();
    let third = cache.resolve(&mut channel, "shop", "orders", " idname ").unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(channel.opened.len(), 1);
    assert_eq!(channel.opened[0].3, "idname");
}

#[test]
fn test_distinct_tables_get_distinct_handles() {
    let mut channel = MockChannel::default();
    let mut cache = IndexHandleCache::new();

    let orders = cache.resolve(&mut channel, "shop", "orders", "id").unwrap();
    let items = cache.resolve(&mut channel, "shop", "items", "id").unwrap();

    assert_ne!(orders, items);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_failed_open_is_not_cached() {
    let mut channel = MockChannel {
        open_failure: Some(ChannelError::new("open_table")),
        ..Default::default()
    };
    let mut cache = IndexHandleCache::new();

    let err = cache.resolve(&mut channel, "shop", "ordres", "id").unwrap_err();

    assert!(matches!(err, StewardError::IndexOpen(_)));
    assert_eq!(
        err.to_string(),
        "Index open error: HandlerSocket ordres failed to connect. \
         Message: [open_table] Something goes wrong or wrong DB/table name"
    );
    assert!(cache.is_empty());

    channel.open_failure = None;
    cache.resolve(&mut channel, "shop", "ordres", "id").unwrap();
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_writer_reports_unlisted_errors() {
    let connector = MockAccelConnector::new();
    connector.channel().insert_failure = Some(ChannelError::new("1062"));
    let mut writer = AcceleratedWriter::new(connector.clone(), accel_config("shop"));

    writer
        .insert("orders", "id", &[Value::Int(1)], &["1062", "121"])
        .unwrap();
    let err = writer
        .insert("orders", "id", &[Value::Int(1)], &["121"])
        .unwrap_err();

    assert!(matches!(err, StewardError::IndexWrite(_)));
    assert!(err.to_string().contains("HandlerSocket orders failed."));
    assert!(err.to_string().contains("internal MySQL errors"));
}

#[test]
fn test_describe_error_fallbacks() {
    assert!(describe_error("42").ends_with("(internal MySQL errors)"));
    assert!(describe_error("-1.5").ends_with("(internal MySQL errors)"));
    assert_eq!(describe_error("bogus"), "[bogus] Unknown error");
    assert_eq!(describe_error("nan"), "[nan] Unknown error");
    assert_eq!(describe_error(""), "[] Unknown error");
}

/// Accepts one connection and answers every request line with `0\t1`.
fn handlersocket_stub(requests: usize) -> (u16, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let mut seen = Vec::new();
        for _ in 0..requests {
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).unwrap();
            seen.push(String::from_utf8_lossy(&line).trim_end().to_string());
            writer.write_all(b"0\t1\n").unwrap();
        }
        seen
    });
    (port, handle)
}

#[test]
fn test_insert_over_handlersocket() {
    let (port, server) = handlersocket_stub(3);
    let config = AccelConfig {
        write_port: port,
        ..accel_config("shop")
    };
    let connector = HandlerSocketConnector::new(config.timeout());
    let mut writer = AcceleratedWriter::new(connector, config);

    writer
        .insert(
            "orders",
            "id, status",
            &[Value::Int(7), Value::from("paid")],
            &[],
        )
        .unwrap();
    writer
        .insert("orders", "id,status", &[Value::Int(8), Value::Null], &[])
        .unwrap();

    let requests = server.join().unwrap();
    assert_eq!(
        requests,
        vec![
            "P\t1\tshop\torders\tPRIMARY\tid,status",
            "1\t+\t2\t7\tpaid",
            "1\t+\t2\t8\t\u{0}",
        ]
    );
}

/// Reads one request line and writes `reply`.
fn answer(reader: &mut BufReader<TcpStream>, writer: &mut TcpStream, reply: &[u8]) -> String {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).unwrap();
    writer.write_all(reply).unwrap();
    String::from_utf8_lossy(&line).trim_end().to_string()
}

#[test]
fn test_late_reply_is_not_read_by_the_next_request() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        // First connection answers after the client has given up.
        let (slow, _) = listener.accept().unwrap();
        let stalled = thread::spawn(move || {
            let mut reader = BufReader::new(slow.try_clone().unwrap());
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).unwrap();
            thread::sleep(Duration::from_millis(400));
            let _ = (&slow).write_all(b"0\t1\n");
            String::from_utf8_lossy(&line).trim_end().to_string()
        });

        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let fresh = vec![
            answer(&mut reader, &mut writer, b"2\t1\topen_table\n"),
            answer(&mut reader, &mut writer, b"0\t1\n"),
            answer(&mut reader, &mut writer, b"0\t1\n"),
        ];
        (stalled.join().unwrap(), fresh)
    });

    let config = AccelConfig {
        write_port: port,
        timeout_ms: 100,
        ..accel_config("shop")
    };
    let connector = HandlerSocketConnector::new(config.timeout());
    let mut writer = AcceleratedWriter::new(connector, config);

    let err = writer
        .insert("orders", "id", &[Value::Int(1)], &[])
        .unwrap_err();
    assert!(matches!(err, StewardError::IndexOpen(_)));
    assert!(err.to_string().contains("Channel I/O error"));
    assert!(!writer.is_connected());

    let err = writer
        .insert("missing", "id", &[Value::Int(2)], &[])
        .unwrap_err();
    assert!(matches!(err, StewardError::IndexOpen(_)));
    assert!(err.to_string().contains("[open_table]"));

    writer
        .insert("missing", "id", &[Value::Int(2)], &[])
        .unwrap();

    let (stalled, fresh) = server.join().unwrap();
    assert_eq!(stalled, "P\t1\tshop\torders\tPRIMARY\tid");
    assert_eq!(
        fresh,
        vec![
            "P\t2\tshop\tmissing\tPRIMARY\tid",
            "P\t3\tshop\tmissing\tPRIMARY\tid",
            "3\t+\t1\t2",
        ]
    );
}
