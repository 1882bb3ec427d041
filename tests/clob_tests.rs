//! CLOB value tests: character positions over UTF-8 storage.

mod common;

use std::fmt::Write as _;
use std::io::Read;

use common::TestDb;
use lobstore_rs::DEFAULT_SPILL_THRESHOLD;

/// 5 characters, 11 bytes.
const MIXED: &str = "añ€😀b";

#[test]
fn test_lengths_count_characters() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();

    assert_eq!(clob.set_string(1, MIXED).unwrap(), 5);
    assert_eq!(clob.length().unwrap(), 5);
    assert_eq!(clob.byte_length().unwrap(), 11);
    assert!(!clob.is_file_backed());

    let long = MIXED.repeat(1000);
    clob.set_string(6, &long).unwrap();
    assert!(clob.is_file_backed());
    assert_eq!(clob.length().unwrap(), 5005);
    assert_eq!(clob.get_sub_string(5001, 5).unwrap(), MIXED);
    assert_eq!(clob.get_sub_string(4, 3).unwrap(), "😀ba");
}

#[test]
fn test_set_string_overwrites_by_character() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();
    clob.set_string(1, "hello world").unwrap();

    // Replace one-byte characters with wider ones and back again.
    clob.set_string(1, "€€").unwrap();
    assert_eq!(clob.to_text().unwrap(), "€€llo world");
    clob.set_string(2, "x").unwrap();
    assert_eq!(clob.to_text().unwrap(), "€xllo world");
    assert_eq!(clob.length().unwrap(), 11);

    clob.set_string(12, "!").unwrap();
    assert_eq!(clob.to_text().unwrap(), "€xllo world!");
    assert_eq!(clob.set_string(14, "?").unwrap_err().sql_state(), "XJ076");
    assert_eq!(clob.set_string(0, "?").unwrap_err().sql_state(), "XJ070");
}

#[test]
fn test_set_string_range_validation() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();

    assert_eq!(clob.set_string_range(1, MIXED, -1, 1).unwrap_err().sql_state(), "XJ078");
    assert_eq!(clob.set_string_range(1, MIXED, 6, 0).unwrap_err().sql_state(), "XJ078");
    assert_eq!(clob.set_string_range(1, MIXED, 1, -1).unwrap_err().sql_state(), "XJ071");
    assert_eq!(clob.set_string_range(1, MIXED, 2, 4).unwrap_err().sql_state(), "22011");
    assert_eq!(clob.set_string_range(1, MIXED, 2, 0).unwrap(), 0);

    assert_eq!(clob.set_string_range(1, MIXED, 1, 3).unwrap(), 3);
    assert_eq!(clob.to_text().unwrap(), "ñ€😀");
}

#[test]
fn test_get_sub_string_bounds() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();
    clob.set_string(1, MIXED).unwrap();

    assert_eq!(clob.get_sub_string(0, 1).unwrap_err().sql_state(), "XJ070");
    assert_eq!(clob.get_sub_string(1, -1).unwrap_err().sql_state(), "XJ071");
    assert_eq!(clob.get_sub_string(7, 1).unwrap_err().sql_state(), "XJ076");
    assert_eq!(clob.get_sub_string(6, 3).unwrap(), "");
    assert_eq!(clob.get_sub_string(3, 100).unwrap(), "€😀b");
}

#[test]
fn test_truncate_by_character() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();
    let text = MIXED.repeat(1000);
    clob.set_string(1, &text).unwrap();
    assert!(clob.is_file_backed());

    clob.truncate(4).unwrap();
    assert_eq!(clob.length().unwrap(), 4);
    assert_eq!(clob.byte_length().unwrap(), 10);
    assert_eq!(clob.to_text().unwrap(), "añ€😀");
    assert!(clob.is_file_backed());

    assert_eq!(clob.truncate(5).unwrap_err().sql_state(), "XJ079");
    assert_eq!(clob.truncate(-2).unwrap_err().sql_state(), "XJ071");
}

#[test]
fn test_position() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();
    let mut text = MIXED.repeat(2000);
    text.push_str("needle");
    clob.set_string(1, &text).unwrap();

    assert_eq!(clob.position("€", 1).unwrap(), Some(3));
    assert_eq!(clob.position("€", 4).unwrap(), Some(8));
    assert_eq!(clob.position("needle", 1).unwrap(), Some(10_001));
    assert_eq!(clob.position("needle", 10_002).unwrap(), None);
    assert_eq!(clob.position("", 9).unwrap(), Some(9));
    assert_eq!(clob.position("a", 0).unwrap_err().sql_state(), "XJ070");
    assert_eq!(clob.position("a", 10_008).unwrap_err().sql_state(), "XJ076");

    let pattern = conn.create_clob().unwrap();
    pattern.set_string(1, "😀b").unwrap();
    assert_eq!(clob.position_of(&pattern, 1).unwrap(), Some(4));
}

#[test]
fn test_character_stream_range_never_splits_characters() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();
    let text = MIXED.repeat(DEFAULT_SPILL_THRESHOLD);
    clob.set_string(1, &text).unwrap();

    let expected: String = text.chars().skip(2).take(7_777).collect();
    let mut reader = clob.character_stream_range(3, 7_777).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(String::from_utf8(out).unwrap(), expected);

    assert_eq!(
        clob.character_stream_range(1, 20_481).unwrap_err().sql_state(),
        "XJ087"
    );
}

#[test]
fn test_character_writer() {
    let t = TestDb::open();
    let mut conn = t.db.connect();
    let clob = conn.create_clob().unwrap();
    clob.set_string(1, "abc").unwrap();

    let mut writer = clob.character_writer(4).unwrap();
    write!(writer, "{}-{}", "ñ", 42).unwrap();
    assert_eq!(writer.write_text("€").unwrap(), 1);
    assert_eq!(writer.position(), 9);
    drop(writer);

    assert_eq!(clob.to_text().unwrap(), "abcñ-42€");
    assert_eq!(clob.character_writer(10).unwrap_err().sql_state(), "XJ076");
}
