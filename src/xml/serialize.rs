//! XML response serialization.

use crate::context::format_iso8601;
use crate::error::xml_escape;
use crate::models::{LobModel, PositionModel, SessionModel};
use crate::table::{Row, RowKey, Value};

use super::encode_hex;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Serializes a session.
pub fn serialize_session(session: &SessionModel) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!(r#"<Session Id="{}">"#, xml_escape(&session.id)));
    xml.push_str(&format!("<Isolation>{}</Isolation>", session.isolation));
    if let Some(txn) = session.transaction {
        xml.push_str(&format!("<Transaction>{}</Transaction>", txn));
    }
    xml.push_str(&format!("<LobCount>{}</LobCount>", session.lob_count));
    xml.push_str(&format!(
        "<Created>{}</Created>",
        format_iso8601(&session.created)
    ));
    xml.push_str("</Session>");
    xml
}

/// Serializes a LOB description.
pub fn serialize_lob(lob: &LobModel) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!(
        r#"<Lob Id="{}" Kind="{}">"#,
        xml_escape(&lob.id),
        lob.kind
    ));
    if let Some(length) = lob.length {
        xml.push_str(&format!("<Length>{}</Length>", length));
    }
    if let Some(ref storage) = lob.storage {
        xml.push_str(&format!("<Storage>{}</Storage>", storage));
    }
    xml.push_str(&format!("<Freed>{}</Freed>", lob.freed));
    xml.push_str("</Lob>");
    xml
}

/// Serializes a pattern search result.
pub fn serialize_position(result: &PositionModel) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!(r#"<Position Start="{}">"#, result.start));
    match result.position {
        Some(p) => xml.push_str(&format!("<Found>{}</Found>", p)),
        None => xml.push_str("<NotFound/>"),
    }
    xml.push_str("</Position>");
    xml
}

/// Serializes a row. BLOB values are written as hex.
pub fn serialize_row(key: &RowKey, row: &Row) -> String {
    let mut xml = String::from(XML_HEADER);
    xml.push_str(&format!(
        r#"<Row Table="{}" Id="{}">"#,
        xml_escape(&key.table),
        key.id
    ));
    for (name, value) in row {
        xml.push_str(&serialize_column(name, value));
    }
    xml.push_str("</Row>");
    xml
}

fn serialize_column(name: &str, value: &Value) -> String {
    let name = xml_escape(name);
    match value {
        Value::Null => format!(r#"<Column Name="{}" Type="null"/>"#, name),
        Value::Integer(i) => format!(r#"<Column Name="{}" Type="integer">{}</Column>"#, name, i),
        Value::Varchar(s) => format!(
            r#"<Column Name="{}" Type="varchar">{}</Column>"#,
            name,
            xml_escape(s)
        ),
        Value::Clob(s) => format!(
            r#"<Column Name="{}" Type="clob" Length="{}">{}</Column>"#,
            name,
            s.chars().count(),
            xml_escape(s)
        ),
        Value::Blob(b) => format!(
            r#"<Column Name="{}" Type="blob" Length="{}">{}</Column>"#,
            name,
            b.len(),
            encode_hex(b)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;

    #[test]
    fn test_serialize_row_escapes_and_encodes() {
        let mut row = Row::new();
        row.insert("DATA".into(), Value::Blob(Bytes::from_static(&[0x00, 0xab])));
        row.insert("NOTE".into(), Value::Clob(Arc::from("a<b")));
        row.insert("N".into(), Value::Null);
        let xml = serialize_row(&RowKey::new("t", 3), &row);
        assert!(xml.contains(r#"<Row Table="T" Id="3">"#));
        assert!(xml.contains(r#"<Column Name="DATA" Type="blob" Length="2">00ab</Column>"#));
        assert!(xml.contains(r#"<Column Name="NOTE" Type="clob" Length="3">a&lt;b</Column>"#));
        assert!(xml.contains(r#"<Column Name="N" Type="null"/>"#));
    }
}
