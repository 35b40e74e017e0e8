//! Markdown to HTML for upload, and HTML back to Markdown for review.

use pulldown_cmark::{html, Options, Parser};
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;

use super::error::{DocumentError, Result};

/// Renders change-log Markdown as a standalone HTML document.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);

    let mut body = String::new();
    html::push_html(&mut body, parser);
    format!(
        "<html><head><meta charset=\"utf-8\"/></head><body>\n{}</body></html>\n",
        body
    )
}

/// Text of an entity or character reference.
pub(crate) fn resolve_reference(reference: &BytesRef<'_>) -> String {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return ch.to_string();
    }
    let name: &[u8] = reference;
    match name {
        b"amp" => "&",
        b"lt" => "<",
        b"gt" => ">",
        b"quot" => "\"",
        b"apos" | b"#39" => "'",
        b"nbsp" => " ",
        _ => "",
    }
    .to_string()
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.html_attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn is_struck_span(e: &BytesStart<'_>) -> bool {
    attribute(e, b"style")
        .map(|s| s.replace(' ', "").contains("text-decoration:line-through"))
        .unwrap_or(false)
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    link: Option<(String, String)>,
    list_depth: usize,
    skip_depth: usize,
    spans: Vec<bool>,
}

impl MarkdownWriter {
    fn push(&mut self, text: &str) {
        match &mut self.link {
            Some((_, label)) => label.push_str(text),
            None => self.out.push_str(text),
        }
    }

    fn text(&mut self, raw: &str) {
        if self.skip_depth > 0 {
            return;
        }
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            let at_line_start = self.out.is_empty() || self.out.ends_with('\n');
            if !raw.is_empty() && !at_line_start {
                self.push(" ");
            }
            return;
        }
        let leading = raw.starts_with(char::is_whitespace) && !self.out.ends_with([' ', '\n']);
        let trailing = raw.ends_with(char::is_whitespace);
        if leading {
            self.push(" ");
        }
        self.push(&collapsed);
        if trailing {
            self.push(" ");
        }
    }

    fn block_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push_str(if self.out.ends_with('\n') { "\n" } else { "\n\n" });
        }
    }

    fn start(&mut self, e: &BytesStart<'_>) {
        let name = e.local_name().as_ref().to_ascii_lowercase();
        match name.as_slice() {
            b"head" | b"style" | b"script" | b"title" => self.skip_depth += 1,
            _ if self.skip_depth > 0 => {}
            b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6" => {
                self.block_break();
                let level = (name[1] - b'0') as usize;
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            b"ul" | b"ol" => {
                if self.list_depth == 0 {
                    self.block_break();
                }
                self.list_depth += 1;
            }
            b"li" => {
                if !self.out.is_empty() && !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
                self.out.push_str(&"  ".repeat(self.list_depth.saturating_sub(1)));
                self.out.push_str("* ");
            }
            b"del" | b"s" | b"strike" => self.push("~~"),
            b"span" => {
                let struck = is_struck_span(e);
                if struck {
                    self.push("~~");
                }
                self.spans.push(struck);
            }
            b"strong" | b"b" => self.push("**"),
            b"em" | b"i" => self.push("*"),
            b"code" => self.push("`"),
            b"a" => {
                let href = attribute(e, b"href").unwrap_or_default();
                self.link = Some((href, String::new()));
            }
            b"br" => self.push("\n"),
            _ => {}
        }
    }

    fn end(&mut self, local_name: &[u8]) {
        let name = local_name.to_ascii_lowercase();
        match name.as_slice() {
            b"head" | b"style" | b"script" | b"title" => {
                self.skip_depth = self.skip_depth.saturating_sub(1)
            }
            _ if self.skip_depth > 0 => {}
            b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6" => self.block_break(),
            b"p" | b"div" => {
                if self.list_depth == 0 {
                    self.block_break();
                }
            }
            b"ul" | b"ol" => {
                self.list_depth = self.list_depth.saturating_sub(1);
                if self.list_depth == 0 {
                    self.block_break();
                }
            }
            b"li" => {
                let trimmed = self.out.trim_end_matches(' ').len();
                self.out.truncate(trimmed);
                self.out.push('\n');
            }
            b"del" | b"s" | b"strike" => self.push("~~"),
            b"span" => {
                if self.spans.pop().unwrap_or(false) {
                    self.push("~~");
                }
            }
            b"strong" | b"b" => self.push("**"),
            b"em" | b"i" => self.push("*"),
            b"code" => self.push("`"),
            b"a" => {
                if let Some((href, label)) = self.link.take() {
                    if href.is_empty() {
                        self.out.push_str(&label);
                    } else {
                        self.out.push_str(&format!("[{}]({})", label.trim(), href));
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> String {
        normalize_markdown(&self.out)
    }
}

/// Trims trailing spaces and collapses runs of blank lines.
pub(crate) fn normalize_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;
    for line in markdown.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

/// Converts an HTML document to Markdown.
///
/// Understands what [`markdown_to_html`] produces as well as HTML exported by
/// the document service, where strikethrough is a styled span.
pub fn html_to_markdown(html_doc: &str) -> Result<String> {
    let mut reader = Reader::from_str(html_doc);
    reader.config_mut().check_end_names = false;

    let mut writer = MarkdownWriter::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => writer.start(e),
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref().eq_ignore_ascii_case(b"br") {
                    writer.push("\n");
                }
            }
            Ok(Event::End(ref e)) => writer.end(e.local_name().as_ref()),
            Ok(Event::Text(e)) => {
                let decoded = e.decode().unwrap_or_default();
                writer.text(&decoded);
            }
            Ok(Event::GeneralRef(ref r)) => {
                if writer.skip_depth == 0 {
                    writer.push(&resolve_reference(r));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocumentError::Conversion(format!(
                    "HTML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }
    Ok(writer.finish())
}
