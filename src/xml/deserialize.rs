//! XML request deserialization.

use bytes::Bytes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;

use crate::error::{LobError, LobResult, SqlState};
use crate::table::{column_name, Row, Value};

use super::decode_hex;

fn invalid(message: impl Into<String>) -> LobError {
    LobError::with_message(SqlState::InvalidApiParameter, message)
}

/// Column being read: name and declared type.
struct PendingColumn {
    name: String,
    kind: String,
    text: String,
}

fn column_start(e: &BytesStart<'_>) -> LobResult<PendingColumn> {
    let mut name = None;
    let mut kind = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|_| invalid("Malformed attribute in row document."))?;
        let value = attr
            .unescape_value()
            .map_err(|_| invalid("Malformed attribute value in row document."))?
            .to_string();
        match attr.key.as_ref() {
            b"Name" => name = Some(value),
            b"Type" => kind = Some(value.to_ascii_lowercase()),
            _ => {}
        }
    }
    Ok(PendingColumn {
        name: name.ok_or_else(|| invalid("Column without a Name attribute."))?,
        kind: kind.unwrap_or_else(|| "varchar".to_string()),
        text: String::new(),
    })
}

fn column_value(column: &PendingColumn) -> LobResult<Value> {
    match column.kind.as_str() {
        "null" => Ok(Value::Null),
        "integer" => column.text.trim().parse().map(Value::Integer).map_err(|_| {
            LobError::with_message(
                SqlState::ColumnTypeMismatch,
                format!("{} is not an integer.", column.text),
            )
        }),
        "varchar" => Ok(Value::Varchar(column.text.clone())),
        "clob" => Ok(Value::Clob(Arc::from(column.text.as_str()))),
        "blob" => decode_hex(column.text.trim())
            .map(|b| Value::Blob(Bytes::from(b)))
            .ok_or_else(|| {
                LobError::with_message(
                    SqlState::ColumnTypeMismatch,
                    format!("Column {} is not valid hex.", column.name),
                )
            }),
        other => Err(invalid(format!("Unknown column type: {}", other))),
    }
}

/// Parses a `<Row>` document of `<Column Name=".." Type="..">` elements.
///
/// BLOB values are hex encoded; a column with `Type="null"` is SQL NULL.
pub fn parse_row(xml: &str) -> LobResult<Row> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut row = Row::new();
    let mut buf = Vec::new();
    let mut current: Option<PendingColumn> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"Column" => {
                current = Some(column_start(&e)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"Column" => {
                let column = column_start(&e)?;
                row.insert(column_name(&column.name), column_value(&column)?);
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut column) = current {
                    let text = e.unescape().map_err(|_| invalid("Malformed text in row document."))?;
                    column.text.push_str(&text);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"Column" => {
                if let Some(column) = current.take() {
                    row.insert(column_name(&column.name), column_value(&column)?);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(invalid(format!("Malformed row document: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_row() {
        let xml = r#"<?xml version="1.0"?>
<Row>
  <Column Name="id" Type="integer">4</Column>
  <Column Name="data" Type="blob">00ff10</Column>
  <Column Name="doc" Type="clob">x &amp; y</Column>
  <Column Name="gone" Type="null"/>
</Row>"#;
        let row = parse_row(xml).unwrap();
        assert_eq!(row.get("ID"), Some(&Value::Integer(4)));
        assert_eq!(
            row.get("DATA"),
            Some(&Value::Blob(Bytes::from_static(&[0x00, 0xff, 0x10])))
        );
        assert_eq!(row.get("DOC"), Some(&Value::Clob(Arc::from("x & y"))));
        assert_eq!(row.get("GONE"), Some(&Value::Null));
    }

    #[test]
    fn test_parse_row_rejects_bad_hex() {
        let err = parse_row(r#"<Row><Column Name="d" Type="blob">zz</Column></Row>"#).unwrap_err();
        assert_eq!(err.state, SqlState::ColumnTypeMismatch);
    }
}
