//! RSS 2.0 document writer.
//!
//! Documents carry the Atom namespace for the `atom:link rel="self"` element
//! and Dublin Core for per-item `dc:creator`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use crate::util::strip_xml_invalid_chars;

/// Channel-level data for one document.
#[derive(Debug, Clone)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Canonical URL of the document itself.
    pub self_url: String,
    pub language: Option<String>,
    pub last_build_date: DateTime<Utc>,
    pub image: Option<String>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub title: String,
    pub link: Option<String>,
    /// HTML fragment; escaped on output.
    pub description: String,
    pub guid: String,
    pub pub_date: DateTime<Utc>,
    pub author: String,
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn start(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write <{}>", name))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write </{}>", name))?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(writer, name)?;
    let text = strip_xml_invalid_chars(text);
    writer
        .write_event(Event::Text(BytesText::new(&text)))
        .with_context(|| format!("Failed to write <{}> text", name))?;
    end(writer, name)
}

/// Serializes a channel and its items as an RSS 2.0 document.
pub fn write_rss(channel: &Channel) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
    rss.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    writer
        .write_event(Event::Start(rss))
        .context("Failed to write rss element")?;

    start(&mut writer, "channel")?;
    text_element(&mut writer, "title", &channel.title)?;
    text_element(&mut writer, "link", &channel.link)?;
    text_element(&mut writer, "description", &channel.description)?;

    let self_url = strip_xml_invalid_chars(&channel.self_url);
    let mut atom_link = BytesStart::new("atom:link");
    atom_link.push_attribute(("href", self_url.as_ref()));
    atom_link.push_attribute(("rel", "self"));
    atom_link.push_attribute(("type", "application/rss+xml"));
    writer
        .write_event(Event::Empty(atom_link))
        .context("Failed to write atom:link element")?;

    if let Some(language) = &channel.language {
        text_element(&mut writer, "language", language)?;
    }
    text_element(
        &mut writer,
        "lastBuildDate",
        &channel.last_build_date.to_rfc2822(),
    )?;
    text_element(&mut writer, "generator", "vk2rss")?;

    if let Some(image) = &channel.image {
        start(&mut writer, "image")?;
        text_element(&mut writer, "url", image)?;
        text_element(&mut writer, "title", &channel.title)?;
        text_element(&mut writer, "link", &channel.link)?;
        end(&mut writer, "image")?;
    }

    for item in &channel.items {
        write_item(&mut writer, item)?;
    }

    end(&mut writer, "channel")?;
    end(&mut writer, "rss")?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).context("Generated document is not valid UTF-8")
}

fn write_item(writer: &mut XmlWriter, item: &Item) -> Result<()> {
    start(writer, "item")?;
    text_element(writer, "title", &item.title)?;
    if let Some(link) = &item.link {
        text_element(writer, "link", link)?;
    }
    text_element(writer, "description", &item.description)?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    writer
        .write_event(Event::Start(guid))
        .context("Failed to write guid element")?;
    let guid_text = strip_xml_invalid_chars(&item.guid);
    writer
        .write_event(Event::Text(BytesText::new(&guid_text)))
        .context("Failed to write guid text")?;
    end(writer, "guid")?;

    text_element(writer, "pubDate", &item.pub_date.to_rfc2822())?;
    text_element(writer, "dc:creator", &item.author)?;
    end(writer, "item")
}

/// Placeholder document for a failed render: one HTML comment line.
///
/// `--` may not appear inside an XML comment and line breaks would split
/// the line, so both are neutralized.
pub fn error_document(message: &str) -> String {
    let cleaned = strip_xml_invalid_chars(message);
    let mut one_line = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    while one_line.contains("--") {
        one_line = one_line.replace("--", "- -");
    }
    if one_line.ends_with('-') {
        one_line.push(' ');
    }
    format!("<!-- Error generating feed: {} -->", one_line)
}
