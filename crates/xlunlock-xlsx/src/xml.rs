//! Streaming `quick-xml` rewrites of a single top-level child element.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::ProtectionError;

pub(crate) fn parse_xml_bool(val: &str) -> bool {
    let trimmed = val.trim();
    trimmed == "1" || trimmed.eq_ignore_ascii_case("true")
}

pub(crate) fn parse_xml_u16_hex(val: &str) -> Option<u16> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        return None;
    }
    u16::from_str_radix(trimmed, 16).ok()
}

/// Attributes of the first direct child of the root element named `local_name`.
pub(crate) fn child_element_attributes(
    xml: &[u8],
    local_name: &str,
) -> Result<Option<Vec<(String, String)>>, ProtectionError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => return Ok(None),
            Event::Start(ref e) | Event::Empty(ref e)
                if depth == 1 && e.local_name().as_ref() == local_name.as_bytes() =>
            {
                let mut attrs = Vec::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    attrs.push((key, attr.unescape_value()?.into_owned()));
                }
                return Ok(Some(attrs));
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        buf.clear();
    }
}

/// Rewrite `xml`, dropping every direct root child named `local_name` and, when `attrs` is
/// `Some`, inserting a fresh empty `<local_name .../>` immediately before the first root child
/// named in `followers` (or before the root's end tag). The new element reuses the root's
/// namespace prefix. Everything else is copied event by event.
pub(crate) fn replace_child_element(
    xml: &[u8],
    local_name: &str,
    followers: &[&str],
    attrs: Option<&[(&str, String)]>,
) -> Result<Vec<u8>, ProtectionError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut prefix: Option<String> = None;
    let mut inserted = attrs.is_none();
    let mut skip_until: Option<usize> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        if let Some(target_depth) = skip_until {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == target_depth {
                        skip_until = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) if depth == 0 => {
                prefix = element_prefix(e);
                depth = 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if depth == 0 => {
                // Self-closing root: expand it so the new child has somewhere to live.
                match attrs {
                    Some(attrs) if !inserted => {
                        prefix = element_prefix(e);
                        let root_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(e.to_owned()))?;
                        write_element(&mut writer, prefix.as_deref(), local_name, attrs)?;
                        writer.write_event(Event::End(BytesEnd::new(root_name)))?;
                        inserted = true;
                    }
                    _ => writer.write_event(Event::Empty(e.to_owned()))?,
                }
            }
            Event::Start(_) | Event::Empty(_) if depth == 1 => {
                let is_start = matches!(event, Event::Start(_));
                let (is_target, is_follower) = match &event {
                    Event::Start(e) | Event::Empty(e) => {
                        let local = e.local_name();
                        (
                            local.as_ref() == local_name.as_bytes(),
                            followers.iter().any(|f| f.as_bytes() == local.as_ref()),
                        )
                    }
                    _ => (false, false),
                };

                if is_target {
                    if is_start {
                        depth += 1;
                        skip_until = Some(1);
                    }
                } else {
                    if is_follower && !inserted {
                        if let Some(attrs) = attrs {
                            write_element(&mut writer, prefix.as_deref(), local_name, attrs)?;
                        }
                        inserted = true;
                    }
                    if is_start {
                        depth += 1;
                    }
                    writer.write_event(event.into_owned())?;
                }
            }
            Event::Start(ref e) => {
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) => {
                if depth == 1 && !inserted {
                    if let Some(attrs) = attrs {
                        write_element(&mut writer, prefix.as_deref(), local_name, attrs)?;
                    }
                    inserted = true;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.to_owned()))?;
            }
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn element_prefix(e: &BytesStart<'_>) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    prefix: Option<&str>,
    local_name: &str,
    attrs: &[(&str, String)],
) -> Result<(), ProtectionError> {
    let name = match prefix {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_string(),
    };
    let mut element = BytesStart::new(name);
    for (key, value) in attrs {
        element.push_attribute((*key, value.as_str()));
    }
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><workbookPr/><workbookProtection lockStructure="1"/><bookViews><workbookView/></bookViews><sheets><sheet name="Sheet1" sheetId="1"/></sheets></workbook>"#;

    fn rewrite(xml: &str, attrs: Option<&[(&str, String)]>) -> String {
        let out =
            replace_child_element(xml.as_bytes(), "workbookProtection", &["bookViews", "sheets"], attrs)
                .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn removes_existing_element() {
        let out = rewrite(WORKBOOK, None);
        assert!(!out.contains("workbookProtection"));
        assert!(out.contains("<workbookPr/><bookViews>"));
    }

    #[test]
    fn replaces_existing_element_in_place() {
        let attrs = [("lockWindows", "1".to_string())];
        let out = rewrite(WORKBOOK, Some(attrs.as_slice()));
        assert!(out.contains(r#"<workbookPr/><workbookProtection lockWindows="1"/><bookViews>"#));
        assert_eq!(out.matches("workbookProtection").count(), 1);
    }

    #[test]
    fn nested_elements_with_same_name_are_not_touched() {
        let xml = r#"<root><a><target x="1"/></a><b/></root>"#;
        let out = replace_child_element(xml.as_bytes(), "target", &["b"], None).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), xml);
    }

    #[test]
    fn inserts_before_root_end_without_followers() {
        let xml = r#"<x:workbook xmlns:x="urn:x"><x:workbookPr/></x:workbook>"#;
        let attrs = [("lockStructure", "1".to_string())];
        let out = rewrite(xml, Some(attrs.as_slice()));
        assert_eq!(
            out,
            r#"<x:workbook xmlns:x="urn:x"><x:workbookPr/><x:workbookProtection lockStructure="1"/></x:workbook>"#
        );
    }

    #[test]
    fn expands_self_closing_root() {
        let attrs = [("lockStructure", "1".to_string())];
        let out = rewrite(r#"<workbook xmlns="urn:x"/>"#, Some(attrs.as_slice()));
        assert_eq!(
            out,
            r#"<workbook xmlns="urn:x"><workbookProtection lockStructure="1"/></workbook>"#
        );
    }

    #[test]
    fn reads_child_attributes() {
        let attrs = child_element_attributes(WORKBOOK.as_bytes(), "workbookProtection")
            .unwrap()
            .unwrap();
        assert_eq!(attrs, vec![("lockStructure".to_string(), "1".to_string())]);
        assert!(child_element_attributes(WORKBOOK.as_bytes(), "calcPr")
            .unwrap()
            .is_none());
    }

    #[test]
    fn parses_scalars() {
        assert!(parse_xml_bool("1"));
        assert!(parse_xml_bool("true"));
        assert!(!parse_xml_bool("0"));
        assert_eq!(parse_xml_u16_hex("CA9C"), Some(0xCA9C));
        assert_eq!(parse_xml_u16_hex(""), None);
        assert_eq!(parse_xml_u16_hex("zz"), None);
    }
}
