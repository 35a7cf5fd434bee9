use quick_xml::events::{BytesDecl, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::warn;

use crate::domain::DocumentFormat;
use crate::error::CollectError;

/// Re-emits `data` in a canonical pretty form.
///
/// Malformed JSON is an error. Malformed XML and CSV are returned unchanged.
pub fn prettify(data: &str, format: DocumentFormat) -> Result<String, CollectError> {
    match format {
        DocumentFormat::Json => {
            let value: Value =
                serde_json::from_str(data).map_err(|err| CollectError::parse("json", err))?;
            to_json_pretty(&value)
        }
        DocumentFormat::Xml => match prettify_xml(data) {
            Ok(pretty) => Ok(pretty),
            Err(err) => {
                warn!(error = %err, "leaving xml document as fetched");
                Ok(data.to_string())
            }
        },
        DocumentFormat::Csv => Ok(prettify_delimited(data, b',').unwrap_or_else(|err| {
            warn!(error = %err, "leaving csv document as fetched");
            data.to_string()
        })),
        DocumentFormat::Tsv => Ok(prettify_delimited(data, b'\t').unwrap_or_else(|err| {
            warn!(error = %err, "leaving tsv document as fetched");
            data.to_string()
        })),
        DocumentFormat::Other => Ok(data.to_string()),
    }
}

/// Serializes with four-space indentation.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, CollectError> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|err| CollectError::parse("json", err))?;
    String::from_utf8(out).map_err(|err| CollectError::parse("json", err))
}

fn prettify_xml(data: &str) -> Result<String, CollectError> {
    let mut reader = Reader::from_str(data);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let mut depth = 0usize;
    let mut seen_root = false;
    let mut first = true;
    loop {
        let event = reader
            .read_event()
            .map_err(|err| CollectError::parse("xml document", err))?;
        if first {
            first = false;
            if !matches!(event, Event::Decl(_)) {
                writer
                    .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                    .map_err(|err| CollectError::parse("xml document", err))?;
            }
        }
        match &event {
            Event::Start(_) => {
                seen_root = true;
                depth += 1;
            }
            Event::Empty(_) => seen_root = true,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        writer
            .write_event(event)
            .map_err(|err| CollectError::parse("xml document", err))?;
    }

    if depth != 0 || !seen_root {
        return Err(CollectError::parse("xml document", "unexpected end of input"));
    }

    let mut pretty = String::from_utf8(writer.into_inner())
        .map_err(|err| CollectError::parse("xml document", err))?;
    pretty.push('\n');
    Ok(pretty)
}

fn prettify_delimited(data: &str, delimiter: u8) -> Result<String, CollectError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in reader.records() {
        let record = record.map_err(|err| CollectError::parse("delimited text", err))?;
        writer
            .write_record(&record)
            .map_err(|err| CollectError::parse("delimited text", err))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| CollectError::parse("delimited text", err))?;
    String::from_utf8(bytes).map_err(|err| CollectError::parse("delimited text", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_four_spaces() {
        let pretty = prettify(r#"{"name": "John", "age": 30}"#, DocumentFormat::Json).unwrap();
        assert_eq!(pretty, "{\n    \"age\": 30,\n    \"name\": \"John\"\n}");
    }

    #[test]
    fn unknown_format_is_untouched() {
        assert_eq!(
            prettify("Just some text", DocumentFormat::Other).unwrap(),
            "Just some text"
        );
    }
}
