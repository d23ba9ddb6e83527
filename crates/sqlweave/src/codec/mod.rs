//! Dialect-independent tree serialization.
//!
//! A tree is flattened into an ordered list of [`PlainItem`]s by the walker:
//! entering a node emits a type-tag item, and once the node's children are
//! done each plain property becomes a value item pointing at the node. Ids
//! come from one counter starting at 0 for the root, so every item has a
//! unique id.
//!
//! ```text
//! id  parent  index  type?  name        value
//! 0   -       -      yes    root        "Not"
//! 1   0       -      yes    operand     "Literal"
//! 2   1       -      no     value       true
//! ```
//!
//! [`decode`] rebuilds the tree and fails on anything incomplete or
//! inconsistent instead of substituting defaults. The relational
//! ([`PlainRow`]), [`json`] and [`xml`] forms are projections of the same
//! item stream.

pub mod json;
pub mod xml;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dispatch::{ChildValue, SlotShape};
use crate::error::{Error, Result};
use crate::expressions::{Expression, Node, Scalar};
use crate::traversal::{walk, SlotInfo, Visitor, Walk};

/// Slot name recorded for the root node
pub const ROOT_SLOT: &str = "root";

/// One flattened fact about a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainItem {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub array_index: Option<i64>,
    pub is_type_tag: bool,
    /// Slot name for type tags, property name for values
    pub name: String,
    /// Node kind for type tags, property value otherwise (`None` for NULL)
    pub value: Option<Scalar>,
}

impl PlainItem {
    /// Node kind carried by a type-tag item
    pub fn kind(&self) -> Option<&str> {
        match (&self.value, self.is_type_tag) {
            (Some(Scalar::Text(kind)), true) => Some(kind),
            _ => None,
        }
    }
}

struct Encoder {
    next_id: i64,
    items: Vec<PlainItem>,
}

impl Encoder {
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Visitor<Option<i64>> for Encoder {
    fn enter(&mut self, node: &Node, slot: SlotInfo, parent: &Option<i64>) -> Walk<Option<i64>> {
        let id = self.next_id();
        self.items.push(PlainItem {
            id,
            parent_id: *parent,
            array_index: slot.index.map(|i| i as i64),
            is_type_tag: true,
            name: slot.name.to_string(),
            value: Some(Scalar::Text(node.type_tag().to_string())),
        });
        Walk::Continue(Some(id))
    }

    fn properties(&mut self, _node: &Node, props: &[(&'static str, Scalar)], own: &Option<i64>) {
        for (name, value) in props {
            let id = self.next_id();
            self.items.push(PlainItem {
                id,
                parent_id: *own,
                array_index: None,
                is_type_tag: false,
                name: name.to_string(),
                value: (!value.is_null()).then(|| value.clone()),
            });
        }
    }
}

/// Flatten a tree into plain items
pub fn encode(root: &Node) -> Vec<PlainItem> {
    let mut encoder = Encoder {
        next_id: 0,
        items: Vec::new(),
    };
    walk(root, None, &mut encoder);
    debug!(items = encoder.items.len(), root = root.type_tag(), "encoded tree");
    encoder.items
}

/// Rebuild a tree from plain items
pub fn decode(items: &[PlainItem]) -> Result<Node> {
    let decoder = Decoder::new(items)?;
    let root = decoder.resolve(0)?;
    let used = decoder.consumed.get();
    if used != items.len() {
        return Err(Error::codec(format!(
            "{} item(s) are not reachable from the root",
            items.len() - used
        )));
    }
    debug!(items = items.len(), root = root.type_tag(), "decoded tree");
    Ok(root)
}

struct Decoder<'a> {
    nodes: HashMap<i64, &'a PlainItem>,
    children: HashMap<(i64, &'a str), Vec<&'a PlainItem>>,
    props: HashMap<(i64, &'a str), Vec<&'a PlainItem>>,
    consumed: Cell<usize>,
    visited: RefCell<HashSet<i64>>,
    aliases: RefCell<HashMap<i64, Node>>,
}

impl<'a> Decoder<'a> {
    fn new(items: &'a [PlainItem]) -> Result<Self> {
        let mut ids = HashSet::with_capacity(items.len());
        let mut nodes = HashMap::new();
        for item in items {
            if !ids.insert(item.id) {
                return Err(Error::codec(format!("duplicate item id {}", item.id)));
            }
            if item.is_type_tag {
                nodes.insert(item.id, item);
            }
        }

        let mut children: HashMap<(i64, &str), Vec<&PlainItem>> = HashMap::new();
        let mut props: HashMap<(i64, &str), Vec<&PlainItem>> = HashMap::new();
        let mut roots = 0;
        for item in items {
            match item.parent_id {
                None => {
                    if item.id != 0 || !item.is_type_tag {
                        return Err(Error::codec(format!(
                            "item {} ('{}') has no parent",
                            item.id, item.name
                        )));
                    }
                    roots += 1;
                }
                Some(parent) => {
                    if !nodes.contains_key(&parent) {
                        return Err(Error::codec(format!(
                            "item {} ('{}') references missing parent {}",
                            item.id, item.name, parent
                        )));
                    }
                    let index = if item.is_type_tag {
                        &mut children
                    } else {
                        &mut props
                    };
                    index.entry((parent, item.name.as_str())).or_default().push(item);
                }
            }
        }
        if roots == 0 || !nodes.contains_key(&0) {
            return Err(Error::codec("missing root item (id 0)"));
        }

        Ok(Self {
            nodes,
            children,
            props,
            consumed: Cell::new(0),
            visited: RefCell::new(HashSet::new()),
            aliases: RefCell::new(HashMap::new()),
        })
    }

    fn resolve(&self, id: i64) -> Result<Node> {
        if !self.visited.borrow_mut().insert(id) {
            return Err(Error::codec(format!("item {} is reachable twice", id)));
        }
        let item = self
            .nodes
            .get(&id)
            .ok_or_else(|| Error::codec(format!("no type tag for item {}", id)))?;
        let kind = item
            .kind()
            .ok_or_else(|| Error::codec(format!("type tag item {} carries no kind", id)))?;
        self.consumed.set(self.consumed.get() + 1);
        trace!(id, kind, "resolving node");

        let expr = Expression::from_parts(
            kind,
            &mut |slot, shape| self.child(id, kind, slot, shape),
            &mut |name| self.prop(id, kind, name),
        )
        .map_err(|err| match err {
            Error::Codec(_) => err,
            other => Error::codec(other.to_string()),
        })?;
        let alias_id = expr.as_alias().map(|a| a.id);
        match alias_id {
            Some(alias_id) => self.intern_alias(alias_id, expr),
            None => Ok(Arc::new(expr)),
        }
    }

    /// One shared node per alias id, so every column read through a
    /// reference points at the same alias as the reference itself.
    fn intern_alias(&self, alias_id: i64, expr: Expression) -> Result<Node> {
        let mut aliases = self.aliases.borrow_mut();
        if let Some(existing) = aliases.get(&alias_id) {
            if existing.as_ref() != &expr {
                return Err(Error::codec(format!(
                    "alias {} is declared with conflicting names",
                    alias_id
                )));
            }
            return Ok(existing.clone());
        }
        let shared = Arc::new(expr);
        aliases.insert(alias_id, shared.clone());
        Ok(shared)
    }

    fn child(&self, id: i64, kind: &str, slot: &'a str, shape: SlotShape) -> Result<ChildValue> {
        let entries = self
            .children
            .get(&(id, slot))
            .map(Vec::as_slice)
            .unwrap_or_default();

        match shape {
            SlotShape::Required | SlotShape::Optional => {
                if entries.len() > 1 {
                    return Err(Error::codec(format!(
                        "{}.{}: {} entries for a single-valued slot",
                        kind,
                        slot,
                        entries.len()
                    )));
                }
                if let Some(entry) = entries.first() {
                    if entry.array_index.is_some() {
                        return Err(Error::codec(format!(
                            "{}.{}: array index on a single-valued slot",
                            kind, slot
                        )));
                    }
                }
                match (entries.first(), shape) {
                    (Some(entry), SlotShape::Required) => Ok(ChildValue::One(self.resolve(entry.id)?)),
                    (Some(entry), _) => Ok(ChildValue::Optional(Some(self.resolve(entry.id)?))),
                    (None, SlotShape::Required) => Err(Error::codec(format!(
                        "{}.{}: missing required child",
                        kind, slot
                    ))),
                    (None, _) => Ok(ChildValue::Optional(None)),
                }
            }
            SlotShape::List => {
                let mut slots: Vec<Option<&PlainItem>> = vec![None; entries.len()];
                for entry in entries {
                    let index = entry.array_index.ok_or_else(|| {
                        Error::codec(format!("{}.{}: list element without index", kind, slot))
                    })?;
                    let position = usize::try_from(index)
                        .ok()
                        .filter(|i| *i < slots.len())
                        .ok_or_else(|| {
                            Error::codec(format!("{}.{}: gap before index {}", kind, slot, index))
                        })?;
                    if slots[position].replace(entry).is_some() {
                        return Err(Error::codec(format!(
                            "{}.{}: duplicate index {}",
                            kind, slot, index
                        )));
                    }
                }
                let mut nodes = Vec::with_capacity(slots.len());
                for entry in slots.into_iter().flatten() {
                    nodes.push(self.resolve(entry.id)?);
                }
                Ok(ChildValue::List(nodes))
            }
        }
    }

    fn prop(&self, id: i64, kind: &str, name: &'a str) -> Result<Scalar> {
        match self.props.get(&(id, name)).map(Vec::as_slice) {
            Some([item]) => {
                self.consumed.set(self.consumed.get() + 1);
                Ok(item.value.clone().unwrap_or(Scalar::Null))
            }
            Some(many) if many.len() > 1 => Err(Error::codec(format!(
                "{}.{}: property given {} times",
                kind,
                name,
                many.len()
            ))),
            _ => Err(Error::codec(format!("{}.{}: missing property", kind, name))),
        }
    }
}

/// Relational projection of a [`PlainItem`], one row per item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub array_index: Option<i64>,
    pub is_type_tag: bool,
    pub name: String,
    pub value_kind: Option<String>,
    pub value_text: Option<String>,
}

impl From<&PlainItem> for PlainRow {
    fn from(item: &PlainItem) -> Self {
        Self {
            id: item.id,
            parent_id: item.parent_id,
            array_index: item.array_index,
            is_type_tag: item.is_type_tag,
            name: item.name.clone(),
            value_kind: item.value.as_ref().map(|v| v.kind_name().to_string()),
            value_text: item.value.as_ref().and_then(Scalar::to_text),
        }
    }
}

impl TryFrom<&PlainRow> for PlainItem {
    type Error = Error;

    fn try_from(row: &PlainRow) -> Result<Self> {
        let value = match &row.value_kind {
            Some(kind) => Some(
                Scalar::parse(kind, row.value_text.as_deref())
                    .map_err(|msg| Error::codec(format!("row {}: {}", row.id, msg)))?,
            ),
            None if row.value_text.is_some() => {
                return Err(Error::codec(format!("row {}: value without kind", row.id)))
            }
            None => None,
        };
        Ok(PlainItem {
            id: row.id,
            parent_id: row.parent_id,
            array_index: row.array_index,
            is_type_tag: row.is_type_tag,
            name: row.name.clone(),
            value,
        })
    }
}

/// Flatten a tree into relational rows
pub fn to_rows(root: &Node) -> Vec<PlainRow> {
    encode(root).iter().map(PlainRow::from).collect()
}

/// Rebuild a tree from relational rows (in any order)
pub fn from_rows(rows: &[PlainRow]) -> Result<Node> {
    let items = rows
        .iter()
        .map(PlainItem::try_from)
        .collect::<Result<Vec<_>>>()?;
    decode(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::{node, Literal, Not};

    fn not_true() -> Node {
        node(Not {
            operand: node(Literal::new(true)),
        })
    }

    #[test]
    fn test_encode_layout() {
        let items = encode(&not_true());
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, 0);
        assert_eq!(items[0].name, ROOT_SLOT);
        assert_eq!(items[0].kind(), Some("Not"));
        assert_eq!(items[1].parent_id, Some(0));
        assert_eq!(items[1].name, "operand");
        assert_eq!(items[2].parent_id, Some(1));
        assert_eq!(items[2].value, Some(Scalar::Bool(true)));
    }

    #[test]
    fn test_decode_round_trip() {
        let tree = not_true();
        let back = decode(&encode(&tree)).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_missing_required_child_fails() {
        let mut items = encode(&not_true());
        items.retain(|i| i.name == ROOT_SLOT);
        let err = decode(&items).unwrap_err();
        assert!(err.to_string().contains("operand"), "{}", err);
    }

    #[test]
    fn test_missing_property_fails() {
        let mut items = encode(&not_true());
        items.retain(|i| i.is_type_tag);
        let err = decode(&items).unwrap_err();
        assert!(err.to_string().contains("Literal.value"), "{}", err);
    }

    #[test]
    fn test_dangling_parent_fails() {
        let mut items = encode(&not_true());
        items[2].parent_id = Some(42);
        assert!(decode(&items).is_err());
    }

    #[test]
    fn test_self_parent_fails() {
        let mut items = encode(&not_true());
        items[1].parent_id = Some(1);
        assert!(decode(&items).is_err());
    }

    #[test]
    fn test_rows_out_of_order() {
        let tree = not_true();
        let mut rows = to_rows(&tree);
        rows.reverse();
        assert_eq!(from_rows(&rows).unwrap(), tree);
    }
}
