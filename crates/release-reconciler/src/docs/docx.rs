//! DOCX to Markdown, for documents the editor has already saved.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::convert::{normalize_markdown, resolve_reference};
use super::error::{DocumentError, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Whether downloaded bytes are a DOCX archive rather than HTML.
pub fn is_docx(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

pub fn docx_to_markdown(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DocumentError::Conversion(format!("Failed to open DOCX: {}", e)))?;

    let links = match read_entry(&mut archive, "word/_rels/document.xml.rels") {
        Ok(rels) => parse_relationships(&rels)?,
        Err(_) => HashMap::new(),
    };
    let document = read_entry(&mut archive, "word/document.xml")?;
    parse_document_xml(&document, &links)
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| DocumentError::Conversion(format!("Failed to find {}: {}", name, e)))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| DocumentError::Conversion(format!("Failed to read {}: {}", name, e)))?;
    Ok(content)
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_error(e: quick_xml::Error) -> DocumentError {
    DocumentError::Conversion(format!("XML parsing error: {}", e))
}

/// Relationship id to target, for hyperlinks.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut links = HashMap::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) {
                    links.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(links)
}

#[derive(Default)]
struct Paragraph {
    heading: Option<usize>,
    list_item: bool,
    text: String,
    last_run_struck: bool,
}

impl Paragraph {
    fn push_run(&mut self, text: &str, struck: bool) {
        if text.is_empty() {
            return;
        }
        if struck {
            if self.last_run_struck && self.text.ends_with("~~") {
                self.text.truncate(self.text.len() - 2);
            } else {
                self.text.push_str("~~");
            }
            self.text.push_str(text);
            self.text.push_str("~~");
        } else {
            self.text.push_str(text);
        }
        self.last_run_struck = struck;
    }

    fn render(&self) -> String {
        let text = self.text.trim();
        if let Some(level) = self.heading {
            format!("{} {}\n\n", "#".repeat(level), text)
        } else if self.list_item {
            format!("* {}\n", text)
        } else {
            format!("{}\n\n", text)
        }
    }
}

fn heading_level(style: &str) -> Option<usize> {
    if style.eq_ignore_ascii_case("Title") {
        return Some(1);
    }
    let level = style.strip_prefix("Heading")?.parse::<usize>().ok()?;
    (1..=6).contains(&level).then_some(level)
}

fn parse_document_xml(xml: &str, links: &HashMap<String, String>) -> Result<String> {
    let mut reader = Reader::from_str(xml);

    let mut out = String::new();
    let mut paragraph: Option<Paragraph> = None;
    let mut run_text = String::new();
    let mut run_struck = false;
    let mut in_text = false;
    let mut link: Option<(String, String)> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"p" => paragraph = Some(Paragraph::default()),
                b"r" => {
                    run_text.clear();
                    run_struck = false;
                }
                b"t" => in_text = true,
                b"hyperlink" => {
                    let target = attribute(e, b"id").and_then(|id| links.get(&id).cloned());
                    link = Some((target.unwrap_or_default(), String::new()));
                }
                b"numPr" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.list_item = true;
                    }
                }
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"pStyle" => {
                    if let (Some(p), Some(style)) = (paragraph.as_mut(), attribute(e, b"val")) {
                        p.heading = heading_level(&style);
                        if style == "ListParagraph" {
                            p.list_item = true;
                        }
                    }
                }
                b"numPr" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.list_item = true;
                    }
                }
                b"strike" | b"dstrike" => {
                    run_struck = !matches!(attribute(e, b"val").as_deref(), Some("false" | "0"));
                }
                b"br" => run_text.push('\n'),
                b"tab" => run_text.push('\t'),
                _ => {}
            },
            Event::Text(e) => {
                if in_text {
                    let decoded = e.decode().unwrap_or_default();
                    run_text.push_str(&decoded);
                }
            }
            Event::GeneralRef(ref r) => {
                if in_text {
                    run_text.push_str(&resolve_reference(r));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => {
                    let struck_text = if run_struck && !run_text.trim().is_empty() {
                        format!("~~{}~~", run_text)
                    } else {
                        run_text.clone()
                    };
                    match (link.as_mut(), paragraph.as_mut()) {
                        (Some((_, label)), _) => label.push_str(&struck_text),
                        (None, Some(p)) => p.push_run(&run_text, run_struck && !run_text.trim().is_empty()),
                        (None, None) => {}
                    }
                }
                b"hyperlink" => {
                    if let (Some((href, label)), Some(p)) = (link.take(), paragraph.as_mut()) {
                        let rendered = if href.is_empty() {
                            label
                        } else {
                            format!("[{}]({})", label, href)
                        };
                        p.push_run(&rendered, false);
                    }
                }
                b"p" => {
                    if let Some(p) = paragraph.take() {
                        out.push_str(&p.render());
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(normalize_markdown(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document {}><w:body>{}</w:body></w:document>"#,
            NS, body
        )
    }

    #[test]
    fn test_headings_lists_and_strikethrough() {
        let xml = document(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Review checklist</w:t></w:r></w:p>
               <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr>
                    <w:r><w:rPr><w:strike/></w:rPr><w:t>@team-execution</w:t></w:r></w:p>
               <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr>
                    <w:r><w:rPr><w:strike w:val="false"/></w:rPr><w:t>@team-messaging</w:t></w:r></w:p>
               <w:p><w:r><w:t xml:space="preserve">Plain </w:t></w:r><w:r><w:t>text</w:t></w:r></w:p>"#,
        );
        let markdown = parse_document_xml(&xml, &HashMap::new()).unwrap();
        assert_eq!(
            markdown,
            "# Review checklist\n\n* ~~@team-execution~~\n* @team-messaging\nPlain text\n"
        );
    }

    #[test]
    fn test_hyperlinks_resolve_relationships() {
        let rels = r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://github.com/dfinity/ic/commit/abc" TargetMode="External"/>
        </Relationships>"#;
        let links = parse_relationships(rels).unwrap();
        let xml = document(
            r#"<w:p><w:r><w:t xml:space="preserve">see </w:t></w:r><w:hyperlink r:id="rId7"><w:r><w:t>abc</w:t></w:r></w:hyperlink></w:p>"#,
        );
        let markdown = parse_document_xml(&xml, &links).unwrap();
        assert_eq!(markdown, "see [abc](https://github.com/dfinity/ic/commit/abc)\n");
    }

    #[test]
    fn test_adjacent_struck_runs_merge() {
        let mut p = Paragraph::default();
        p.push_run("* ", false);
        p.push_run("author", true);
        p.push_run(": x", true);
        assert_eq!(p.text, "* ~~author: x~~");
    }

    #[test]
    fn test_docx_archive() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(
                document(r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Release Notes for x</w:t></w:r></w:p>"#)
                    .as_bytes(),
            )
            .unwrap();
            zip.finish().unwrap();
        }
        let bytes = buffer.into_inner();
        assert!(is_docx(&bytes));
        assert!(!is_docx(b"<html>"));
        assert_eq!(docx_to_markdown(&bytes).unwrap(), "# Release Notes for x\n");
    }
}
