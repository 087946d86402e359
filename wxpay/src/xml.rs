//! Gateway XML wire format
//!
//! `<xml><key>value</key>...</xml>`. Numeric values are written as plain
//! text, everything else as CDATA. Parsing never resolves entities: any
//! DOCTYPE declaration fails the payload.

use crate::{Error, Record, Result, Value};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use std::io::Cursor;

/// Root element name
pub const ROOT: &str = "xml";

/// Deepest element nesting accepted by [`decode`], counting the root as 1
pub const MAX_DEPTH: usize = 8;

lazy_static::lazy_static! {
    static ref NUMERIC: Regex =
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

/// Whether a value is written as plain text
pub fn is_numeric(value: &str) -> bool {
    NUMERIC.is_match(value)
}

/// Serialize a record
pub fn encode(record: &Record) -> Result<String> {
    if record.is_empty() {
        return Err(Error::MalformedPayload("record has no fields".to_string()));
    }

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_record(&mut writer, ROOT, record)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| Error::MalformedPayload(e.to_string()))
}

fn write_record(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, record: &Record) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(tag)))?;
    for (key, value) in record.iter() {
        check_name(key)?;
        match value {
            Value::Text(text) => write_field(writer, key, text)?,
            Value::Nested(inner) => write_record(writer, key, inner)?,
        }
    }
    write(writer, Event::End(BytesEnd::new(tag)))
}

fn write_field(writer: &mut Writer<Cursor<Vec<u8>>>, key: &str, text: &str) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(key)))?;
    if is_numeric(text) {
        write(writer, Event::Text(BytesText::new(text)))?;
    } else {
        // "]]>" cannot appear inside one section: split it across two
        let mut pieces = text.split("]]>").peekable();
        let mut first = true;
        while let Some(piece) = pieces.next() {
            let mut section = String::with_capacity(piece.len() + 3);
            if !first {
                section.push('>');
            }
            section.push_str(piece);
            if pieces.peek().is_some() {
                section.push_str("]]");
            }
            write(writer, Event::CData(BytesCData::new(section)))?;
            first = false;
        }
    }
    write(writer, Event::End(BytesEnd::new(key)))
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::MalformedPayload(format!("XML write failed: {e}")))
}

fn check_name(key: &str) -> Result<()> {
    let valid = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::MalformedPayload(format!("invalid field name: {key:?}")))
    }
}

/// Parse a record.
///
/// Fails on empty input, malformed XML, DOCTYPE declarations, unknown
/// entity references, content outside a single root element and nesting
/// deeper than [`MAX_DEPTH`].
pub fn decode(bytes: &[u8]) -> Result<Record> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::MalformedPayload("empty payload".to_string()));
    }

    let mut reader = Reader::from_reader(bytes);
    let mut root: Option<Record> = None;

    loop {
        match reader.read_event()? {
            Event::Start(_) if root.is_some() => return Err(malformed("multiple root elements")),
            Event::Start(_) => {
                root = Some(match read_element(&mut reader, 1)? {
                    Value::Nested(record) => record,
                    Value::Text(text) if text.trim().is_empty() => Record::new(),
                    Value::Text(_) => return Err(malformed("text content in root element")),
                });
            }
            Event::Empty(_) if root.is_some() => return Err(malformed("multiple root elements")),
            Event::Empty(_) => root = Some(Record::new()),
            Event::DocType(_) => return Err(malformed("DOCTYPE declarations are not allowed")),
            Event::Text(text) => {
                if !text.iter().all(u8::is_ascii_whitespace) {
                    return Err(malformed("text outside root element"));
                }
            }
            Event::CData(_) => return Err(malformed("CDATA outside root element")),
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| malformed("no root element"))
}

fn read_element(reader: &mut Reader<&[u8]>, depth: usize) -> Result<Value> {
    let mut text = String::new();
    let mut children = Record::new();
    let mut has_children = false;

    loop {
        match reader.read_event()? {
            Event::Start(_) if depth >= MAX_DEPTH => return Err(malformed("nesting too deep")),
            Event::Start(start) => {
                let key = element_name(&start)?;
                let value = read_element(reader, depth + 1)?;
                children.set_value(key, value);
                has_children = true;
            }
            Event::Empty(start) => {
                children.set(element_name(&start)?, "");
                has_children = true;
            }
            Event::Text(t) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| Error::MalformedPayload(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(cdata) => {
                let content = std::str::from_utf8(&cdata)
                    .map_err(|e| Error::MalformedPayload(e.to_string()))?;
                text.push_str(content);
            }
            Event::End(_) => break,
            Event::DocType(_) => return Err(malformed("DOCTYPE declarations are not allowed")),
            Event::Eof => return Err(malformed("unexpected end of document")),
            _ => {}
        }
    }

    Ok(if has_children {
        Value::Nested(children)
    } else {
        Value::Text(text)
    })
}

fn element_name(start: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| Error::MalformedPayload(e.to_string()))
}

fn malformed(reason: &str) -> Error {
    Error::MalformedPayload(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_numeric_and_text() {
        let record: Record = [("total_fee", "100"), ("body", "coffee")].into_iter().collect();
        let xml = encode(&record).unwrap();
        assert_eq!(
            xml,
            "<xml><body><![CDATA[coffee]]></body><total_fee>100</total_fee></xml>"
        );
    }

    #[test]
    fn test_encode_splits_cdata_terminator() {
        let record: Record = [("attach", "a]]>b")].into_iter().collect();
        let xml = encode(&record).unwrap();
        assert_eq!(xml, "<xml><attach><![CDATA[a]]]]><![CDATA[>b]]></attach></xml>");
        assert_eq!(decode(xml.as_bytes()).unwrap(), record);
    }

    #[test]
    fn test_round_trip_special_characters() {
        let record: Record = [
            ("body", "<script>&amp;\"'"),
            ("attach", "]]>"),
            ("detail", ""),
            ("total_fee", "1"),
            ("rate", "-0.5e3"),
        ]
        .into_iter()
        .collect();
        let xml = encode(&record).unwrap();
        assert!(!xml.contains("<script>"));
        assert_eq!(decode(xml.as_bytes()).unwrap(), record);
    }

    #[test]
    fn test_decode_gateway_response() {
        let body = br#"<?xml version="1.0" encoding="UTF-8"?>
<xml>
   <return_code><![CDATA[SUCCESS]]></return_code>
   <return_msg>OK &amp; done</return_msg>
   <total_fee>101</total_fee>
   <coupon/>
</xml>"#;
        let record = decode(body).unwrap();
        assert_eq!(record.get_str("return_code"), Some("SUCCESS"));
        assert_eq!(record.get_str("return_msg"), Some("OK & done"));
        assert_eq!(record.get_str("total_fee"), Some("101"));
        assert_eq!(record.get_str("coupon"), Some(""));
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_decode_nested_value() {
        let record = decode(b"<xml><detail><id>1</id></detail><a>x</a></xml>").unwrap();
        let Some(Value::Nested(detail)) = record.get("detail") else {
            panic!("expected nested detail");
        };
        assert_eq!(detail.get_str("id"), Some("1"));
        assert_eq!(record.to_url_params(), "a=x");
    }

    #[test]
    fn test_decode_limits_nesting() {
        let nested = |levels: usize| {
            let mut xml = String::from("<xml>");
            xml.push_str(&"<a>".repeat(levels));
            xml.push('1');
            xml.push_str(&"</a>".repeat(levels));
            xml.push_str("</xml>");
            xml
        };

        assert!(decode(nested(MAX_DEPTH - 1).as_bytes()).is_ok());
        assert!(matches!(
            decode(nested(MAX_DEPTH).as_bytes()),
            Err(Error::MalformedPayload(ref m)) if m == "nesting too deep"
        ));
        assert!(matches!(
            decode(nested(200_000).as_bytes()),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_entities() {
        let xxe = br#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<xml><return_code>&xxe;</return_code></xml>"#;
        assert!(matches!(decode(xxe), Err(Error::MalformedPayload(_))));

        let undeclared = b"<xml><return_code>&xxe;</return_code></xml>";
        assert!(matches!(decode(undeclared), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for input in [
            &b""[..],
            b"   \n",
            b"not xml",
            b"<xml><a>1</b></xml>",
            b"<xml><a>1</a>",
            b"<xml/><xml/>",
        ] {
            assert!(
                matches!(decode(input), Err(Error::MalformedPayload(_))),
                "accepted {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_encode_rejects_bad_names_and_empty_records() {
        assert!(encode(&Record::new()).is_err());

        let record: Record = [("a><b", "x")].into_iter().collect();
        assert!(matches!(encode(&record), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_is_numeric() {
        for v in ["0", "100", "-1", "+2.5", ".5", "1e10", "3."] {
            assert!(is_numeric(v), "{v}");
        }
        for v in ["", "abc", "1a", "0x1A", " 1", "1 "] {
            assert!(!is_numeric(v), "{v}");
        }
    }
}
