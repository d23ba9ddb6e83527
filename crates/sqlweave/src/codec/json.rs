//! JSON projection of the plain item stream.
//!
//! Every node becomes an object whose `"$type"` member holds the type tag.
//! Child slots nest directly (list slots as arrays), plain properties become
//! members holding native JSON values. Bytes, dates and timestamps have no
//! native JSON form and are written as `{"$scalar": kind, "value": text}`.
//!
//! ```json
//! {"$type":"Not","operand":{"$type":"Literal","value":true}}
//! ```

use serde_json::{Map, Number, Value};

use super::{decode, encode, PlainItem, ROOT_SLOT};
use crate::error::{Error, Result};
use crate::expressions::{Node, Scalar};

pub const TYPE_KEY: &str = "$type";
pub const SCALAR_KEY: &str = "$scalar";

/// Encode a tree as a JSON value
pub fn to_value(root: &Node) -> Result<Value> {
    items_to_value(&encode(root))
}

/// Encode a tree as compact JSON text
pub fn to_json(root: &Node) -> Result<String> {
    Ok(serde_json::to_string(&to_value(root)?)?)
}

pub fn to_json_pretty(root: &Node) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_value(root)?)?)
}

/// Decode a tree from a JSON value
pub fn from_value(value: &Value) -> Result<Node> {
    decode(&value_to_items(value)?)
}

/// Decode a tree from JSON text
pub fn from_json(text: &str) -> Result<Node> {
    let value: Value = serde_json::from_str(text)?;
    from_value(&value)
}

/// Project an item stream onto nested JSON.
///
/// Members appear in item order: the type tag first, then child slots in the
/// order they were entered, then plain properties.
pub fn items_to_value(items: &[PlainItem]) -> Result<Value> {
    let root = items
        .iter()
        .find(|i| i.id == 0 && i.parent_id.is_none())
        .ok_or_else(|| Error::codec("missing root item (id 0)"))?;
    build_object(root, items)
}

fn build_object(node: &PlainItem, items: &[PlainItem]) -> Result<Value> {
    let kind = node
        .kind()
        .ok_or_else(|| Error::codec(format!("type tag item {} carries no kind", node.id)))?;
    let mut object = Map::new();
    object.insert(TYPE_KEY.to_string(), Value::String(kind.to_string()));

    for item in items.iter().filter(|i| i.parent_id == Some(node.id)) {
        if item.is_type_tag {
            let child = build_object(item, items)?;
            match item.array_index {
                None => {
                    object.insert(item.name.clone(), child);
                }
                Some(index) => {
                    let entry = object
                        .entry(item.name.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    let Value::Array(elements) = entry else {
                        return Err(Error::codec(format!(
                            "{}.{}: mixes list and single values",
                            kind, item.name
                        )));
                    };
                    if index != elements.len() as i64 {
                        return Err(Error::codec(format!(
                            "{}.{}: list index {} out of sequence",
                            kind, item.name, index
                        )));
                    }
                    elements.push(child);
                }
            }
        } else {
            object.insert(item.name.clone(), scalar_to_json(item.value.as_ref())?);
        }
    }
    Ok(Value::Object(object))
}

fn scalar_to_json(value: Option<&Scalar>) -> Result<Value> {
    Ok(match value {
        None | Some(Scalar::Null) => Value::Null,
        Some(Scalar::Bool(b)) => Value::Bool(*b),
        Some(Scalar::Int(i)) => Value::Number((*i).into()),
        Some(Scalar::Float(f)) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| Error::codec(format!("{} has no JSON representation", f)))?,
        Some(Scalar::Text(s)) => Value::String(s.clone()),
        Some(other) => {
            let mut tagged = Map::new();
            tagged.insert(
                SCALAR_KEY.to_string(),
                Value::String(other.kind_name().to_string()),
            );
            tagged.insert(
                "value".to_string(),
                other.to_text().map(Value::String).unwrap_or(Value::Null),
            );
            Value::Object(tagged)
        }
    })
}

fn json_to_scalar(value: &Value) -> Result<Option<Scalar>> {
    Ok(match value {
        Value::Null => None,
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) if !n.is_f64() => Some(Scalar::Int(i)),
            _ => Some(Scalar::Float(n.as_f64().ok_or_else(|| {
                Error::codec(format!("number {} is out of range", n))
            })?)),
        },
        Value::String(s) => Some(Scalar::Text(s.clone())),
        Value::Object(tagged) => {
            let kind = tagged
                .get(SCALAR_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::codec("object property without $scalar"))?;
            let text = tagged.get("value").and_then(Value::as_str);
            Some(Scalar::parse(kind, text).map_err(Error::codec)?)
        }
        Value::Array(_) => return Err(Error::codec("array where a scalar was expected")),
    })
}

/// Flatten nested JSON back into plain items
pub fn value_to_items(value: &Value) -> Result<Vec<PlainItem>> {
    let mut items = Vec::new();
    let mut next_id = 0;
    push_node(value, None, ROOT_SLOT, None, &mut next_id, &mut items)?;
    Ok(items)
}

fn push_node(
    value: &Value,
    parent: Option<i64>,
    slot: &str,
    index: Option<i64>,
    next_id: &mut i64,
    items: &mut Vec<PlainItem>,
) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::codec(format!("slot '{}' does not hold a node object", slot)))?;
    let kind = object
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::codec(format!("node in slot '{}' has no $type", slot)))?;

    let id = *next_id;
    *next_id += 1;
    items.push(PlainItem {
        id,
        parent_id: parent,
        array_index: index,
        is_type_tag: true,
        name: slot.to_string(),
        value: Some(Scalar::Text(kind.to_string())),
    });

    for (name, member) in object {
        if name == TYPE_KEY {
            continue;
        }
        match member {
            Value::Array(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    push_node(element, Some(id), name, Some(i as i64), next_id, items)?;
                }
            }
            Value::Object(inner) if inner.contains_key(TYPE_KEY) => {
                push_node(member, Some(id), name, None, next_id, items)?;
            }
            other => {
                let prop_id = *next_id;
                *next_id += 1;
                items.push(PlainItem {
                    id: prop_id,
                    parent_id: Some(id),
                    array_index: None,
                    is_type_tag: false,
                    name: name.clone(),
                    value: json_to_scalar(other)?,
                });
            }
        }
    }
    Ok(())
}
