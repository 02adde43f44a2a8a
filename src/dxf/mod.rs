//! Text extraction from interchange drawing files.
//!
//! # Overview
//!
//! The external converter turns each proprietary drawing into an ASCII
//! interchange file. Only text-bearing content matters here, so the parser
//! reads exactly two sections and ignores the rest of the grammar:
//!
//! - **ENTITIES**: freestanding TEXT and MTEXT entities, plus INSERT block
//!   references with their per-instance ATTRIB overrides.
//! - **BLOCKS**: per-block nested TEXT/MTEXT entities and ATTDEF defaults,
//!   emitted once per INSERT that references the block. Defaults are used
//!   only when an INSERT carries no instance attributes.
//!
//! Rich text is normalized through [`normalize_mtext`] before it becomes a
//! [`TextItem`]; items that normalize to an empty string are dropped.
//!
//! # Example
//!
//! ```no_run
//! use cadtext::dxf::extract_text_items;
//! use std::path::Path;
//!
//! let items = extract_text_items(Path::new("plan.dxf")).unwrap();
//! for item in &items {
//!     println!("{} [{}] {}", item.object_type, item.layer, item.text);
//! }
//! ```

mod mtext;
mod reader;

pub use mtext::normalize_mtext;
pub use reader::ParseError;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

use reader::{GroupPair, PairReader};

/// Layer value reported when an entity carries no layer.
pub const NO_LAYER: &str = "-";

/// Kind of drawing entity a text item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Freestanding single-line text.
    Text,
    /// Freestanding rich text.
    Mtext,
    /// Block reference; the text is the block name.
    Insert,
    /// Per-instance attribute attached to a block reference.
    Attrib,
    /// Single-line text nested inside a referenced block.
    BlockText,
    /// Rich text nested inside a referenced block.
    BlockMtext,
    /// Attribute definition default, used when an INSERT has no instance
    /// attributes.
    Attdef,
}

impl ObjectType {
    /// Stable string form, also used as the cache column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Mtext => "MTEXT",
            Self::Insert => "INSERT",
            Self::Attrib => "ATTRIB",
            Self::BlockText => "BLOCK_TEXT",
            Self::BlockMtext => "BLOCK_MTEXT",
            Self::Attdef => "ATTDEF",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted piece of drawing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    pub object_type: ObjectType,
    /// Layer name, [`NO_LAYER`] when absent.
    pub layer: String,
    /// Normalized, non-empty text.
    pub text: String,
}

/// Access to the text carried by a drawing entity.
///
/// Implementers expose an explicit accessor priority: the plain rendered
/// form when the entity has one, the raw stored form otherwise.
pub trait TextBearing {
    /// Rendered text with inline formatting removed, if this entity kind
    /// distinguishes rendered from stored text.
    fn plain_text(&self) -> Option<String>;

    /// Raw stored text, formatting codes included.
    fn raw_text(&self) -> &str;

    /// Preferred accessor order: plain rendering first, trimmed raw value
    /// as fallback.
    fn display_text(&self) -> String {
        self.plain_text()
            .unwrap_or_else(|| self.raw_text().trim().to_string())
    }
}

#[derive(Debug, Default)]
struct TextEntity {
    layer: Option<String>,
    value: String,
}

impl TextBearing for TextEntity {
    fn plain_text(&self) -> Option<String> {
        None
    }

    fn raw_text(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Default)]
struct MtextEntity {
    layer: Option<String>,
    raw: String,
}

impl TextBearing for MtextEntity {
    fn plain_text(&self) -> Option<String> {
        Some(normalize_mtext(&self.raw))
    }

    fn raw_text(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug)]
struct AttribEntity {
    layer: Option<String>,
    value: String,
}

impl TextBearing for AttribEntity {
    fn plain_text(&self) -> Option<String> {
        None
    }

    fn raw_text(&self) -> &str {
        &self.value
    }
}

#[derive(Debug)]
struct InsertEntity {
    layer: Option<String>,
    block_name: String,
    attribs: Vec<AttribEntity>,
}

#[derive(Debug, Default)]
struct BlockDef {
    texts: Vec<TextEntity>,
    mtexts: Vec<MtextEntity>,
    attdefs: Vec<TextEntity>,
}

#[derive(Debug, Default)]
struct DxfDocument {
    texts: Vec<TextEntity>,
    mtexts: Vec<MtextEntity>,
    inserts: Vec<InsertEntity>,
    blocks: HashMap<String, BlockDef>,
}

/// Extract all text items from one interchange file.
///
/// # Errors
///
/// Returns [`ParseError`] when the file cannot be opened or its pair
/// structure is invalid; the caller recovers by scanning the raw bytes
/// instead.
pub fn extract_text_items(path: &Path) -> Result<Vec<TextItem>, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut parser = DocumentParser::new(BufReader::new(file), path);
    let doc = parser.parse_document()?;
    Ok(collect_items(&doc))
}

/// Pair stream with one-record pushback, so entity sub-parsers can stop at
/// the `0` code that starts the next entity without consuming it.
struct DocumentParser<R: BufRead> {
    reader: PairReader<R>,
    peeked: Option<GroupPair>,
}

/// Entity-level fields relevant to text extraction, collected generically
/// for every entity kind.
#[derive(Debug, Default)]
struct EntityFields {
    layer: Option<String>,
    value: Option<String>,
    extra_chunks: Vec<String>,
    name: Option<String>,
    attribs_follow: bool,
}

impl EntityFields {
    /// Rich-text raw value: continuation chunks (code 3) in order, then the
    /// final chunk (code 1).
    fn joined_text(&self) -> String {
        let mut raw = self.extra_chunks.concat();
        if let Some(ref value) = self.value {
            raw.push_str(value);
        }
        raw
    }
}

impl<R: BufRead> DocumentParser<R> {
    fn new(input: R, path: &Path) -> Self {
        Self {
            reader: PairReader::new(input, path),
            peeked: None,
        }
    }

    fn next(&mut self) -> Result<Option<GroupPair>, ParseError> {
        if let Some(pair) = self.peeked.take() {
            return Ok(Some(pair));
        }
        self.reader.next_pair()
    }

    fn push_back(&mut self, pair: GroupPair) {
        self.peeked = Some(pair);
    }

    fn parse_document(&mut self) -> Result<DxfDocument, ParseError> {
        let mut doc = DxfDocument::default();

        while let Some(pair) = self.next()? {
            if pair.code != 0 || pair.value.trim() != "SECTION" {
                continue;
            }
            let Some(name_pair) = self.next()? else { break };
            if name_pair.code != 2 {
                self.push_back(name_pair);
                continue;
            }
            match name_pair.value.trim() {
                "ENTITIES" => self.parse_entities(&mut doc)?,
                "BLOCKS" => self.parse_blocks(&mut doc)?,
                _ => self.skip_section()?,
            }
        }

        Ok(doc)
    }

    fn skip_section(&mut self) -> Result<(), ParseError> {
        while let Some(pair) = self.next()? {
            if pair.code == 0 && pair.value.trim() == "ENDSEC" {
                break;
            }
        }
        Ok(())
    }

    /// Collect the non-0 fields of the current entity, stopping at the
    /// next entity marker.
    fn read_entity_fields(&mut self) -> Result<EntityFields, ParseError> {
        let mut fields = EntityFields::default();

        while let Some(pair) = self.next()? {
            if pair.code == 0 {
                self.push_back(pair);
                break;
            }
            match pair.code {
                1 => fields.value = Some(pair.value),
                2 => fields.name = Some(pair.value),
                3 => fields.extra_chunks.push(pair.value),
                8 => fields.layer = Some(pair.value),
                66 => fields.attribs_follow = pair.value.trim() == "1",
                _ => {}
            }
        }

        Ok(fields)
    }

    fn parse_entities(&mut self, doc: &mut DxfDocument) -> Result<(), ParseError> {
        while let Some(pair) = self.next()? {
            if pair.code != 0 {
                continue;
            }
            match pair.value.trim() {
                "ENDSEC" => break,
                "TEXT" => {
                    let f = self.read_entity_fields()?;
                    doc.texts.push(TextEntity {
                        layer: f.layer,
                        value: f.value.unwrap_or_default(),
                    });
                }
                "MTEXT" => {
                    let f = self.read_entity_fields()?;
                    doc.mtexts.push(MtextEntity {
                        raw: f.joined_text(),
                        layer: f.layer,
                    });
                }
                "INSERT" => {
                    let insert = self.parse_insert()?;
                    doc.inserts.push(insert);
                }
                _ => {
                    let _ = self.read_entity_fields()?;
                }
            }
        }
        Ok(())
    }

    fn parse_insert(&mut self) -> Result<InsertEntity, ParseError> {
        let f = self.read_entity_fields()?;
        let mut insert = InsertEntity {
            layer: f.layer,
            block_name: f.name.unwrap_or_default(),
            attribs: Vec::new(),
        };

        // Instance attributes trail the INSERT until SEQEND when the
        // attributes-follow flag (code 66) is set.
        if f.attribs_follow {
            while let Some(pair) = self.next()? {
                if pair.code != 0 {
                    continue;
                }
                match pair.value.trim() {
                    "ATTRIB" => {
                        let af = self.read_entity_fields()?;
                        insert.attribs.push(AttribEntity {
                            layer: af.layer,
                            value: af.value.unwrap_or_default(),
                        });
                    }
                    "SEQEND" => {
                        let _ = self.read_entity_fields()?;
                        break;
                    }
                    _ => {
                        // Missing SEQEND: the next entity begins here
                        self.push_back(pair);
                        break;
                    }
                }
            }
        }

        Ok(insert)
    }

    fn parse_blocks(&mut self, doc: &mut DxfDocument) -> Result<(), ParseError> {
        while let Some(pair) = self.next()? {
            if pair.code != 0 {
                continue;
            }
            match pair.value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    let header = self.read_entity_fields()?;
                    let name = header.name.unwrap_or_default();
                    let mut def = BlockDef::default();

                    while let Some(inner) = self.next()? {
                        if inner.code != 0 {
                            continue;
                        }
                        match inner.value.trim() {
                            "ENDBLK" => {
                                let _ = self.read_entity_fields()?;
                                break;
                            }
                            "TEXT" => {
                                let f = self.read_entity_fields()?;
                                def.texts.push(TextEntity {
                                    layer: f.layer,
                                    value: f.value.unwrap_or_default(),
                                });
                            }
                            "MTEXT" => {
                                let f = self.read_entity_fields()?;
                                def.mtexts.push(MtextEntity {
                                    raw: f.joined_text(),
                                    layer: f.layer,
                                });
                            }
                            "ATTDEF" => {
                                let f = self.read_entity_fields()?;
                                def.attdefs.push(TextEntity {
                                    layer: f.layer,
                                    value: f.value.unwrap_or_default(),
                                });
                            }
                            _ => {
                                let _ = self.read_entity_fields()?;
                            }
                        }
                    }

                    if !name.trim().is_empty() {
                        doc.blocks.insert(name.trim().to_string(), def);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn layer_or_dash(layer: Option<&str>) -> String {
    match layer {
        Some(l) if !l.trim().is_empty() => l.trim().to_string(),
        _ => NO_LAYER.to_string(),
    }
}

fn push_item(items: &mut Vec<TextItem>, object_type: ObjectType, layer: Option<&str>, text: String) {
    if text.is_empty() {
        return;
    }
    items.push(TextItem {
        object_type,
        layer: layer_or_dash(layer),
        text,
    });
}

/// Flatten a parsed document into text items: freestanding text first,
/// then rich text, then block references with their attribute and nested
/// block content.
fn collect_items(doc: &DxfDocument) -> Vec<TextItem> {
    let mut items = Vec::new();

    for text in &doc.texts {
        push_item(
            &mut items,
            ObjectType::Text,
            text.layer.as_deref(),
            text.display_text(),
        );
    }

    for mtext in &doc.mtexts {
        push_item(
            &mut items,
            ObjectType::Mtext,
            mtext.layer.as_deref(),
            mtext.display_text(),
        );
    }

    for insert in &doc.inserts {
        push_item(
            &mut items,
            ObjectType::Insert,
            insert.layer.as_deref(),
            insert.block_name.trim().to_string(),
        );

        for attrib in &insert.attribs {
            // Attribute layer falls back to the block reference's layer
            let layer = attrib.layer.as_deref().or(insert.layer.as_deref());
            push_item(&mut items, ObjectType::Attrib, layer, attrib.display_text());
        }

        if let Some(block) = doc.blocks.get(insert.block_name.trim()) {
            if insert.attribs.is_empty() {
                for attdef in &block.attdefs {
                    push_item(
                        &mut items,
                        ObjectType::Attdef,
                        attdef.layer.as_deref(),
                        attdef.display_text(),
                    );
                }
            }

            for text in &block.texts {
                push_item(
                    &mut items,
                    ObjectType::BlockText,
                    text.layer.as_deref(),
                    text.display_text(),
                );
            }
            for mtext in &block.mtexts {
                push_item(
                    &mut items,
                    ObjectType::BlockMtext,
                    mtext.layer.as_deref(),
                    mtext.display_text(),
                );
            }
        }
    }

    items
}
