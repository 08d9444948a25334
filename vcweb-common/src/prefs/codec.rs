//! Text encoding of preference documents
//!
//! Documents are stored as a small XML dialect:
//!
//! ```text
//! <global_preferences>
//! <mod_time>1730000000</mod_time>
//! <max_cpu_pct>100</max_cpu_pct>
//! <run_on_batteries>0</run_on_batteries>
//! <venue name="work">
//!     <max_cpu_pct>50</max_cpu_pct>
//! </venue>
//! </global_preferences>
//! ```
//!
//! Elements the schema does not know are kept verbatim and written back
//! unchanged, so documents written by newer code survive a round trip
//! through older code.

use std::borrow::Cow;
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::document::{OpaqueElement, PrefSet, PrefValue, PreferenceDocument, VenueName};
use super::merger::reset_to_defaults;
use super::schema::{FieldKind, Schema};
use super::Subset;

const VENUE_TAG: &str = "venue";
const MOD_TIME_TAG: &str = "mod_time";

/// Stored text could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty document")]
    Empty,

    #[error("unknown root element <{name}> at byte {offset}")]
    UnknownRoot { offset: usize, name: String },

    #[error("expected </{expected}> but found </{found}> at byte {offset}")]
    MismatchedTag {
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("invalid venue name {name:?} at byte {offset}")]
    InvalidVenue { offset: usize, name: String },

    #[error("venue blocks cannot be nested (byte {offset})")]
    NestedVenue { offset: usize },

    #[error("unexpected content after root element at byte {offset}")]
    TrailingContent { offset: usize },

    #[error("syntax error at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: String },
}

/// Parse stored text into a document
pub fn decode(text: &str) -> Result<PreferenceDocument, DecodeError> {
    let mut parser = Parser::new(text);
    parser.skip_misc()?;
    if parser.at_end() {
        return Err(DecodeError::Empty);
    }

    let root_offset = parser.pos;
    let root = parser.start_tag()?;
    let subset =
        Subset::from_root_element(root.name).ok_or_else(|| DecodeError::UnknownRoot {
            offset: root_offset,
            name: root.name.to_string(),
        })?;
    let schema = Schema::for_subset(subset);

    let mut top = TopLevel::default();
    let base = if root.self_closing {
        PrefSet::default()
    } else {
        parser.block(root.name, schema, Some(&mut top))?
    };

    parser.skip_misc()?;
    if !parser.at_end() {
        return Err(DecodeError::TrailingContent { offset: parser.pos });
    }

    Ok(PreferenceDocument {
        subset,
        mod_time: top.mod_time,
        base,
        venues: top.venues,
    })
}

/// Decode, falling back to the subset defaults
///
/// Empty text (never saved), malformed text and documents of the other
/// subset all yield `reset_to_defaults(subset)`.
pub fn decode_or_default(text: &str, subset: Subset) -> PreferenceDocument {
    if text.trim().is_empty() {
        debug!("No stored {} preferences, using defaults", subset);
        return reset_to_defaults(subset);
    }

    match decode(text) {
        Ok(doc) if doc.subset == subset => doc,
        Ok(doc) => {
            warn!(
                "Stored {} preferences hold a {} document, using defaults",
                subset, doc.subset
            );
            reset_to_defaults(subset)
        }
        Err(e) => {
            warn!("Failed to decode {} preferences: {}, using defaults", subset, e);
            reset_to_defaults(subset)
        }
    }
}

/// Serialize a document
///
/// Base fields are written in catalog order. Venues without overrides are
/// omitted.
pub fn encode(doc: &PreferenceDocument) -> String {
    let schema = Schema::for_subset(doc.subset);
    let root = doc.subset.root_element();
    let mut out = String::new();

    out.push('<');
    out.push_str(root);
    out.push_str(">\n");

    if let Some(mod_time) = doc.mod_time {
        out.push_str(&format!("<{0}>{1}</{0}>\n", MOD_TIME_TAG, mod_time));
    }
    write_set(&mut out, schema, &doc.base, "");

    for (venue, set) in &doc.venues {
        if set.is_empty() {
            continue;
        }
        out.push_str(&format!("<{} name=\"{}\">\n", VENUE_TAG, venue));
        write_set(&mut out, schema, set, "    ");
        out.push_str(&format!("</{}>\n", VENUE_TAG));
    }

    out.push_str("</");
    out.push_str(root);
    out.push_str(">\n");
    out
}

fn write_set(out: &mut String, schema: &Schema, set: &PrefSet, indent: &str) {
    let mut fields: Vec<_> = set.fields.iter().collect();
    fields.sort_by_key(|(name, _)| schema.position(name).unwrap_or(usize::MAX));

    for (name, value) in fields {
        out.push_str(indent);
        out.push_str(&format!("<{0}>{1}</{0}>\n", name, escape(&value.to_encoded())));
    }
    for element in &set.opaque {
        out.push_str(indent);
        out.push_str(&element.raw);
        out.push('\n');
    }
}

/// Escape text for element content or attribute values
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Resolve the predefined entities and numeric character references
///
/// Unrecognized entities are left as written.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[derive(Default)]
struct TopLevel {
    mod_time: Option<i64>,
    venues: BTreeMap<VenueName, PrefSet>,
}

struct StartTag<'a> {
    name: &'a str,
    attrs: Vec<(&'a str, Cow<'a, str>)>,
    self_closing: bool,
}

impl StartTag<'_> {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_ref())
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn syntax(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Syntax {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Advance past `terminator`, which must occur before the end of input
    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<(), DecodeError> {
        match self.rest().find(terminator) {
            Some(i) => {
                self.pos += i + terminator.len();
                Ok(())
            }
            None => Err(self.syntax(format!("unterminated {}", what))),
        }
    }

    /// Skip whitespace, comments and processing instructions
    fn skip_misc(&mut self) -> Result<(), DecodeError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<&'a str, DecodeError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.syntax("expected a name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn expect(&mut self, c: char) -> Result<(), DecodeError> {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.syntax(format!("expected '{}'", c)))
        }
    }

    fn start_tag(&mut self) -> Result<StartTag<'a>, DecodeError> {
        self.expect('<')?;
        let name = self.name()?;
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(StartTag {
                    name,
                    attrs,
                    self_closing: true,
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(StartTag {
                    name,
                    attrs,
                    self_closing: false,
                });
            }
            if rest.is_empty() {
                return Err(self.syntax(format!("unterminated <{}> tag", name)));
            }

            let key = self.name()?;
            self.skip_whitespace();
            self.expect('=')?;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.syntax("expected quoted attribute value")),
            };
            self.pos += 1;
            let value_len = self
                .rest()
                .find(quote)
                .ok_or_else(|| self.syntax("unterminated attribute value"))?;
            let value = &self.rest()[..value_len];
            self.pos += value_len + 1;
            attrs.push((key, unescape(value)));
        }
    }

    /// Consume `</name>` for the currently open element
    fn end_tag(&mut self, expected: &str) -> Result<(), DecodeError> {
        let offset = self.pos;
        self.pos += 2;
        let found = self.name()?;
        self.skip_whitespace();
        self.expect('>')?;
        if found != expected {
            return Err(DecodeError::MismatchedTag {
                offset,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Skip an element's content and close tag, checking nesting
    ///
    /// Returns the content span.
    fn element_content(&mut self, name: &str) -> Result<(usize, usize), DecodeError> {
        let start = self.pos;
        let mut open: Vec<&'a str> = vec![];
        loop {
            let Some(lt) = self.rest().find('<') else {
                return Err(self.syntax(format!("unterminated <{}> element", name)));
            };
            self.pos += lt;
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<![CDATA[") {
                self.skip_past("]]>", "CDATA section")?;
            } else if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with("</") {
                let end = self.pos;
                match open.pop() {
                    Some(inner) => self.end_tag(inner)?,
                    None => {
                        self.end_tag(name)?;
                        return Ok((start, end));
                    }
                }
            } else {
                let tag = self.start_tag()?;
                if !tag.self_closing {
                    open.push(tag.name);
                }
            }
        }
    }

    /// Parse the children of a root or venue element into a set
    ///
    /// `top` is present at the root level only; venue blocks and
    /// `mod_time` are recognized there.
    fn block(
        &mut self,
        parent: &str,
        schema: &Schema,
        mut top: Option<&mut TopLevel>,
    ) -> Result<PrefSet, DecodeError> {
        let mut set = PrefSet::default();
        loop {
            self.skip_misc()?;
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.syntax(format!("unterminated <{}> element", parent)));
            }
            if rest.starts_with("</") {
                self.end_tag(parent)?;
                return Ok(set);
            }
            if !rest.starts_with('<') {
                return Err(self.syntax(format!("unexpected text inside <{}>", parent)));
            }

            let element_start = self.pos;
            let tag = self.start_tag()?;

            if tag.name == VENUE_TAG {
                let Some(top) = top.as_deref_mut() else {
                    return Err(DecodeError::NestedVenue {
                        offset: element_start,
                    });
                };
                let raw_name = tag.attr("name").unwrap_or_default();
                let venue: VenueName =
                    raw_name.parse().map_err(|_| DecodeError::InvalidVenue {
                        offset: element_start,
                        name: raw_name.to_string(),
                    })?;
                if tag.self_closing {
                    continue;
                }
                let venue_set = self.block(VENUE_TAG, schema, None)?;
                if !venue_set.is_empty() {
                    top.venues.entry(venue).or_default().absorb(venue_set);
                }
                continue;
            }

            let content = if tag.self_closing {
                None
            } else {
                let (start, end) = self.element_content(tag.name)?;
                Some(&self.src[start..end])
            };

            if let (Some(top), MOD_TIME_TAG) = (top.as_deref_mut(), tag.name) {
                match content.map(|c| parse_mod_time(c.trim())) {
                    Some(Some(t)) => top.mod_time = Some(t),
                    _ => warn!("Ignoring unreadable mod_time {:?}", content),
                }
                continue;
            }

            match schema.field(tag.name) {
                Some(spec) if top.is_none() && !spec.venue_scoped => {
                    warn!("Dropping base-only field {} found in a venue", spec.name);
                }
                Some(spec) => match field_value(spec.kind, content) {
                    Ok(value) => {
                        set.fields.insert(spec.name.to_string(), value);
                    }
                    Err(reason) => {
                        warn!(
                            "Dropping stored {} value {:?}: {}",
                            spec.name,
                            content.unwrap_or_default(),
                            reason
                        );
                    }
                },
                None => set.opaque.push(OpaqueElement {
                    name: tag.name.to_string(),
                    raw: self.src[element_start..self.pos].to_string(),
                }),
            }
        }
    }
}

fn parse_mod_time(s: &str) -> Option<i64> {
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|t| t.is_finite()).map(|t| t as i64))
}

/// Typed value of a known field
///
/// A self-closing boolean element is the legacy spelling of `true`.
fn field_value(kind: FieldKind, content: Option<&str>) -> Result<PrefValue, String> {
    match content {
        None if kind == FieldKind::Bool => Ok(PrefValue::Bool(true)),
        None => Err("empty element".to_string()),
        Some(text) if text.contains('<') => Err("unexpected markup".to_string()),
        Some(text) => kind.parse(&unescape(text)),
    }
}
