use crate::{
    Error, Result,
    blocks::common::{
        BlockHeader, BlockParse, debug_assert_aligned, padding_to_align_8, validate_block_id,
        validate_buffer_size,
    },
};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// A typed property extracted from an MD block.
///
/// The `<e name="...">value</e>` entries of the ASAM common-properties
/// schema carry an optional data type; anything that parses as a float is
/// reported as one.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Float(f64),
}

/// Metadata block (##MD) - stores XML metadata.
///
/// Metadata blocks contain XML-formatted metadata providing additional
/// context about channels, channel groups, or the file itself, following
/// the ASAM MDF schema.
#[derive(Debug, Clone)]
pub struct MetadataBlock {
    pub header: BlockHeader,
    /// The XML content (without null terminator).
    pub xml: String,
}

impl BlockParse<'_> for MetadataBlock {
    const ID: &'static str = "##MD";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        let data_len = (header.length as usize).saturating_sub(24);
        validate_buffer_size(bytes, 24 + data_len)?;

        let data = &bytes[24..24 + data_len];

        let xml = match core::str::from_utf8(data) {
            Ok(s) => s.trim_matches('\0').to_string(),
            Err(_) => String::from_utf8_lossy(data).trim_matches('\0').to_string(),
        };

        Ok(Self { header, xml })
    }
}

impl MetadataBlock {
    /// Creates a new MetadataBlock with the provided XML content.
    pub fn new(xml: &str) -> Self {
        let block_len = Self::calculate_block_len(xml);

        Self {
            header: BlockHeader::new("##MD", block_len as u64, 0),
            xml: String::from(xml),
        }
    }

    /// Creates an MD block wrapping a plain comment in the common `<TX>`
    /// envelope used by HD/FH comments.
    pub fn comment(root: &str, comment: &str) -> Self {
        let xml = format!("<{root}><TX>{}</TX></{root}>", escape_xml(comment));
        Self::new(&xml)
    }

    /// Creates an empty MetadataBlock with a minimal valid size.
    pub fn new_empty() -> Self {
        Self::new("")
    }

    fn calculate_block_len(xml: &str) -> usize {
        let xml_bytes = xml.as_bytes();
        let needs_null = xml_bytes.is_empty() || xml_bytes.last() != Some(&0);
        let xml_size = xml_bytes.len() + if needs_null { 1 } else { 0 };
        let unpadded_size = 24 + xml_size;
        unpadded_size + padding_to_align_8(unpadded_size)
    }

    /// Serializes the MetadataBlock to bytes according to MDF 4.1.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##MD")?;

        let xml_bytes = self.xml.as_bytes();
        let needs_null = xml_bytes.is_empty() || xml_bytes.last() != Some(&0);
        let total_size = Self::calculate_block_len(&self.xml);

        if self.header.length as usize != total_size {
            return Err(Error::BlockSerializationError(format!(
                "MetadataBlock header.length ({}) does not match calculated size ({})",
                self.header.length, total_size
            )));
        }

        let mut buffer = Vec::with_capacity(total_size);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(xml_bytes);
        if needs_null {
            buffer.push(0);
        }

        buffer.resize(total_size, 0);

        debug_assert_aligned(buffer.len());
        Ok(buffer)
    }

    /// The plain comment text of the block: the content of the `<TX>` tag,
    /// or the whole payload when it is not XML at all.
    pub fn comment_text(&self) -> String {
        match extract_tag_content(&self.xml, "TX") {
            Some(text) => unescape_xml(text),
            None if !self.xml.trim_start().starts_with('<') => self.xml.clone(),
            None => String::new(),
        }
    }

    /// Extract a flat name → value dictionary from the XML.
    ///
    /// Collects the `<e name="NAME">VALUE</e>` entries of the ASAM
    /// common-properties section. Values that parse as a number are
    /// reported as [`MetadataValue::Float`]. This is a pragmatic scraper,
    /// not a validating XML parser; nested structure is ignored.
    pub fn properties(&self) -> Vec<(String, MetadataValue)> {
        let mut out = Vec::new();
        let mut rest = self.xml.as_str();
        while let Some(start) = rest.find("<e ") {
            let tail = &rest[start..];
            let Some(tag_end) = tail.find('>') else { break };
            let attrs = &tail[3..tag_end];
            let Some(close) = tail.find("</e>") else {
                break;
            };
            if close > tag_end {
                let value = unescape_xml(&tail[tag_end + 1..close]);
                if let Some(name) = extract_attribute(attrs, "name") {
                    let entry = match value.trim().parse::<f64>() {
                        Ok(num) => MetadataValue::Float(num),
                        Err(_) => MetadataValue::Text(value),
                    };
                    out.push((name, entry));
                }
            }
            rest = &tail[close + 4..];
        }
        out
    }
}

impl Default for MetadataBlock {
    fn default() -> Self {
        Self::new("")
    }
}

/// Content of the first `<tag>...</tag>` occurrence.
fn extract_tag_content<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

fn extract_attribute(attrs: &str, name: &str) -> Option<String> {
    let marker = format!("{name}=\"");
    let start = attrs.find(&marker)? + marker.len();
    let end = attrs[start..].find('"')? + start;
    Some(unescape_xml(&attrs[start..end]))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_roundtrip() {
        let md = MetadataBlock::comment("HDcomment", "Engine <test> run");
        assert_eq!(md.comment_text(), "Engine <test> run");
        let bytes = md.to_bytes().unwrap();
        let parsed = MetadataBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.comment_text(), "Engine <test> run");
    }

    #[test]
    fn properties_extraction() {
        let md = MetadataBlock::new(
            r#"<HDcomment><TX>run</TX><common_properties>
               <e name="author">jane</e>
               <e name="gain" type="decimal">2.5</e>
               </common_properties></HDcomment>"#,
        );
        let props = md.properties();
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].0, "author");
        assert_eq!(props[0].1, MetadataValue::Text("jane".into()));
        assert_eq!(props[1].1, MetadataValue::Float(2.5));
    }
}
