//! XML projection of the plain item stream.
//!
//! The root element is named after the root node's kind; every other node
//! element is named after the slot it occupies, with list elements numbered
//! (`columns0`, `columns1`, ...). Node elements carry a `typeTag` attribute.
//! Plain properties are elements with a `scalar` attribute naming the scalar
//! kind and the text form as content.
//!
//! ```xml
//! <Not typeTag="Not"><operand typeTag="Literal"><value scalar="bool">true</value></operand></Not>
//! ```

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{decode, encode, PlainItem, ROOT_SLOT};
use crate::error::{Error, Result};
use crate::expressions::{Node, Scalar};

pub const TYPE_ATTR: &str = "typeTag";
pub const SCALAR_ATTR: &str = "scalar";

/// Encode a tree as XML text
pub fn to_xml(root: &Node) -> Result<String> {
    items_to_xml(&encode(root))
}

/// Decode a tree from XML text
pub fn from_xml(text: &str) -> Result<Node> {
    decode(&xml_to_items(text)?)
}

pub fn items_to_xml(items: &[PlainItem]) -> Result<String> {
    let root = items
        .iter()
        .find(|i| i.id == 0 && i.parent_id.is_none())
        .ok_or_else(|| Error::codec("missing root item (id 0)"))?;
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_node(&mut writer, root, items)?;
    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| Error::xml(e.to_string()))
}

fn element_name(item: &PlainItem) -> Result<String> {
    if item.parent_id.is_none() {
        return item
            .kind()
            .map(str::to_string)
            .ok_or_else(|| Error::codec("root item carries no kind"));
    }
    Ok(match item.array_index {
        Some(index) => format!("{}{}", item.name, index),
        None => item.name.clone(),
    })
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, node: &PlainItem, items: &[PlainItem]) -> Result<()> {
    let kind = node
        .kind()
        .ok_or_else(|| Error::codec(format!("type tag item {} carries no kind", node.id)))?;
    let name = element_name(node)?;
    let mut start = BytesStart::new(name.as_str());
    start.push_attribute((TYPE_ATTR, kind));

    let members: Vec<&PlainItem> = items
        .iter()
        .filter(|i| i.parent_id == Some(node.id))
        .collect();
    if members.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for member in members {
        if member.is_type_tag {
            write_node(writer, member, items)?;
        } else {
            let kind = member.value.as_ref().map(Scalar::kind_name).unwrap_or("null");
            let mut prop = BytesStart::new(member.name.as_str());
            prop.push_attribute((SCALAR_ATTR, kind));
            match member.value.as_ref().and_then(Scalar::to_text) {
                Some(text) if !text.is_empty() => {
                    writer.write_event(Event::Start(prop))?;
                    writer.write_event(Event::Text(BytesText::new(&text)))?;
                    writer.write_event(Event::End(BytesEnd::new(member.name.as_str())))?;
                }
                _ => writer.write_event(Event::Empty(prop))?,
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

/// Split `columns12` into (`columns`, 12)
fn split_index(name: &str) -> (&str, Option<i64>) {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.len() == name.len() || stem.is_empty() {
        return (name, None);
    }
    (stem, name[stem.len()..].parse().ok())
}

enum Open {
    Node(i64),
    Prop { index: usize },
}

struct Attrs {
    type_tag: Option<String>,
    scalar: Option<String>,
}

fn read_attrs(start: &BytesStart<'_>) -> Result<Attrs> {
    let mut attrs = Attrs {
        type_tag: None,
        scalar: None,
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::xml(e.to_string()))?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"typeTag" => attrs.type_tag = Some(value),
            b"scalar" => attrs.scalar = Some(value),
            _ => {}
        }
    }
    Ok(attrs)
}

/// Flatten XML text into plain items
pub fn xml_to_items(text: &str) -> Result<Vec<PlainItem>> {
    let mut reader = Reader::from_str(text);
    let mut items: Vec<PlainItem> = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut pending_text: Option<String> = None;
    let mut next_id = 0i64;
    let mut seen_root = false;

    loop {
        let event = reader.read_event()?;
        let (start, empty) = match &event {
            Event::Start(e) => (Some(e), false),
            Event::Empty(e) => (Some(e), true),
            _ => (None, false),
        };

        if let Some(start) = start {
            let tag = std::str::from_utf8(start.name().as_ref())
                .map_err(|e| Error::xml(e.to_string()))?
                .to_string();
            let attrs = read_attrs(start)?;
            let parent = match stack.last() {
                Some(Open::Node(id)) => Some(*id),
                Some(Open::Prop { .. }) => {
                    return Err(Error::codec(format!("element <{}> nested in a property", tag)))
                }
                None if seen_root => {
                    return Err(Error::codec("more than one root element"));
                }
                None => None,
            };

            let id = next_id;
            next_id += 1;
            if let Some(kind) = attrs.type_tag {
                let (name, index) = match parent {
                    None => (ROOT_SLOT.to_string(), None),
                    Some(_) => {
                        let (stem, index) = split_index(&tag);
                        (stem.to_string(), index)
                    }
                };
                seen_root = true;
                items.push(PlainItem {
                    id,
                    parent_id: parent,
                    array_index: index,
                    is_type_tag: true,
                    name,
                    value: Some(Scalar::Text(kind)),
                });
                if !empty {
                    stack.push(Open::Node(id));
                }
            } else if let Some(kind) = attrs.scalar {
                if parent.is_none() {
                    return Err(Error::codec("root element is a property"));
                }
                let value = if empty {
                    Some(Scalar::parse(&kind, None).map_err(Error::codec)?)
                } else {
                    // text arrives before the end tag; parsed there
                    pending_text = Some(String::new());
                    Some(Scalar::Text(kind))
                };
                items.push(PlainItem {
                    id,
                    parent_id: parent,
                    array_index: None,
                    is_type_tag: false,
                    name: tag,
                    value,
                });
                if !empty {
                    stack.push(Open::Prop {
                        index: items.len() - 1,
                    });
                }
            } else {
                return Err(Error::codec(format!(
                    "element <{}> has neither {} nor {}",
                    tag, TYPE_ATTR, SCALAR_ATTR
                )));
            }
            continue;
        }

        match event {
            Event::Text(t) => {
                let text = t.unescape()?;
                match pending_text.as_mut() {
                    Some(buffer) => buffer.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(Error::codec(format!("unexpected text '{}'", text.trim()))),
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8(c.into_inner().into_owned())
                    .map_err(|e| Error::xml(e.to_string()))?;
                match pending_text.as_mut() {
                    Some(buffer) => buffer.push_str(&text),
                    None => return Err(Error::codec("unexpected CDATA outside a property")),
                }
            }
            Event::End(_) => match stack.pop() {
                Some(Open::Prop { index }) => {
                    let text = pending_text.take().unwrap_or_default();
                    let item = &mut items[index];
                    let kind = match item.value.take() {
                        Some(Scalar::Text(kind)) => kind,
                        _ => return Err(Error::codec("property lost its scalar kind")),
                    };
                    let text = (kind == "text" || !text.is_empty()).then_some(text.as_str());
                    item.value = Some(
                        Scalar::parse(&kind, text)
                            .map_err(|msg| Error::codec(format!("{}: {}", item.name, msg)))?,
                    )
                    .filter(|v| !v.is_null());
                }
                Some(Open::Node(_)) => {}
                None => return Err(Error::codec("unbalanced end tag")),
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::codec("unexpected end of document"));
    }
    // empty null properties parse to Some(Null); store them as absent values
    for item in items.iter_mut().filter(|i| !i.is_type_tag) {
        if matches!(item.value, Some(Scalar::Null)) {
            item.value = None;
        }
    }
    Ok(items)
}
