//! Dispatch core: how a node exposes its children and plain properties.
//!
//! Every node kind declares, in a fixed order, its child slots and its plain
//! property slots. A child slot is required, optional or list-valued; the
//! shape is carried by the Rust field type (`Node`, `Option<Node>`,
//! `Vec<Node>`) through the [`ChildSlot`] trait. Plain properties convert to
//! and from [`Scalar`] through [`PlainProp`].
//!
//! The per-kind glue (`Expression::children`, `Expression::plain_properties`,
//! `Expression::with_children`, `Expression::from_parts`) is generated by the
//! `node_kinds!` macro in [`crate::expressions`], so every consumer that
//! matches on [`Expression`] is checked for exhaustiveness by the compiler.

use crate::error::{Error, Result};
use crate::expressions::{Node, Scalar};
use chrono::{NaiveDate, NaiveDateTime};

/// Cardinality of a child slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotShape {
    Required,
    Optional,
    List,
}

/// Borrowed view of one child slot
#[derive(Debug, Clone, Copy)]
pub enum ChildRef<'a> {
    One(&'a Node),
    Optional(Option<&'a Node>),
    List(&'a [Node]),
}

impl<'a> ChildRef<'a> {
    pub fn shape(&self) -> SlotShape {
        match self {
            ChildRef::One(_) => SlotShape::Required,
            ChildRef::Optional(_) => SlotShape::Optional,
            ChildRef::List(_) => SlotShape::List,
        }
    }

    /// All nodes held by the slot, in order
    pub fn nodes(&self) -> Vec<&'a Node> {
        match *self {
            ChildRef::One(node) => vec![node],
            ChildRef::Optional(node) => node.into_iter().collect(),
            ChildRef::List(nodes) => nodes.iter().collect(),
        }
    }
}

/// Owned replacement value for one child slot
#[derive(Debug, Clone)]
pub enum ChildValue {
    One(Node),
    Optional(Option<Node>),
    List(Vec<Node>),
}

/// Field types that can occupy a child slot
pub trait ChildSlot: Sized {
    const SHAPE: SlotShape;

    fn child_ref(&self) -> ChildRef<'_>;

    fn from_child(kind: &'static str, slot: &'static str, value: Option<ChildValue>)
        -> Result<Self>;
}

fn shape_mismatch(kind: &str, slot: &str, expected: SlotShape) -> Error {
    Error::construction(
        kind,
        format!("slot '{}' expects a {:?} child value", slot, expected),
    )
}

impl ChildSlot for Node {
    const SHAPE: SlotShape = SlotShape::Required;

    fn child_ref(&self) -> ChildRef<'_> {
        ChildRef::One(self)
    }

    fn from_child(
        kind: &'static str,
        slot: &'static str,
        value: Option<ChildValue>,
    ) -> Result<Self> {
        match value {
            Some(ChildValue::One(node)) | Some(ChildValue::Optional(Some(node))) => Ok(node),
            Some(ChildValue::Optional(None)) | None => Err(Error::construction(
                kind,
                format!("required slot '{}' has no value", slot),
            )),
            Some(ChildValue::List(_)) => Err(shape_mismatch(kind, slot, Self::SHAPE)),
        }
    }
}

impl ChildSlot for Option<Node> {
    const SHAPE: SlotShape = SlotShape::Optional;

    fn child_ref(&self) -> ChildRef<'_> {
        ChildRef::Optional(self.as_ref())
    }

    fn from_child(
        kind: &'static str,
        slot: &'static str,
        value: Option<ChildValue>,
    ) -> Result<Self> {
        match value {
            Some(ChildValue::Optional(node)) => Ok(node),
            Some(ChildValue::One(node)) => Ok(Some(node)),
            None => Ok(None),
            Some(ChildValue::List(_)) => Err(shape_mismatch(kind, slot, Self::SHAPE)),
        }
    }
}

impl ChildSlot for Vec<Node> {
    const SHAPE: SlotShape = SlotShape::List;

    fn child_ref(&self) -> ChildRef<'_> {
        ChildRef::List(self)
    }

    fn from_child(
        kind: &'static str,
        slot: &'static str,
        value: Option<ChildValue>,
    ) -> Result<Self> {
        match value {
            Some(ChildValue::List(nodes)) => Ok(nodes),
            None => Ok(Vec::new()),
            Some(_) => Err(shape_mismatch(kind, slot, Self::SHAPE)),
        }
    }
}

/// Field types that can occupy a plain property slot
pub trait PlainProp: Sized {
    fn to_scalar(&self) -> Scalar;

    /// Convert back from a scalar, describing the mismatch on failure
    fn from_scalar(value: Scalar) -> std::result::Result<Self, String>;
}

fn expected(what: &str, found: &Scalar) -> String {
    format!("expected {}, found {}", what, found.kind_name())
}

impl PlainProp for String {
    fn to_scalar(&self) -> Scalar {
        Scalar::Text(self.clone())
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        match value {
            Scalar::Text(s) => Ok(s),
            other => Err(expected("text", &other)),
        }
    }
}

impl PlainProp for bool {
    fn to_scalar(&self) -> Scalar {
        Scalar::Bool(*self)
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        match value {
            Scalar::Bool(b) => Ok(b),
            other => Err(expected("bool", &other)),
        }
    }
}

impl PlainProp for i64 {
    fn to_scalar(&self) -> Scalar {
        Scalar::Int(*self)
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        match value {
            Scalar::Int(i) => Ok(i),
            other => Err(expected("int", &other)),
        }
    }
}

impl PlainProp for NaiveDate {
    fn to_scalar(&self) -> Scalar {
        Scalar::Date(*self)
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        match value {
            Scalar::Date(d) => Ok(d),
            other => Err(expected("date", &other)),
        }
    }
}

impl PlainProp for NaiveDateTime {
    fn to_scalar(&self) -> Scalar {
        Scalar::Timestamp(*self)
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        match value {
            Scalar::Timestamp(ts) => Ok(ts),
            other => Err(expected("timestamp", &other)),
        }
    }
}

impl PlainProp for Scalar {
    fn to_scalar(&self) -> Scalar {
        self.clone()
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        Ok(value)
    }
}

impl<T: PlainProp> PlainProp for Option<T> {
    fn to_scalar(&self) -> Scalar {
        match self {
            Some(v) => v.to_scalar(),
            None => Scalar::Null,
        }
    }

    fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
        match value {
            Scalar::Null => Ok(None),
            other => T::from_scalar(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::{Expression, Name};
    use std::sync::Arc;

    #[test]
    fn test_required_slot_rejects_missing_value() {
        let result = <Node as ChildSlot>::from_child("Not", "operand", None);
        assert!(result.is_err());

        let node: Node = Arc::new(Expression::Name(Name::new("a")));
        let back = <Node as ChildSlot>::from_child("Not", "operand", Some(ChildValue::One(node.clone())))
            .unwrap();
        assert!(Arc::ptr_eq(&node, &back));
    }

    #[test]
    fn test_list_slot_defaults_to_empty() {
        let list = <Vec<Node> as ChildSlot>::from_child("And", "operands", None).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_optional_plain_prop() {
        assert_eq!(<Option<i64>>::from_scalar(Scalar::Null), Ok(None));
        assert_eq!(<Option<i64>>::from_scalar(Scalar::Int(4)), Ok(Some(4)));
        assert!(<Option<i64>>::from_scalar(Scalar::Text("4".into())).is_err());
        assert_eq!(Some(7i64).to_scalar(), Scalar::Int(7));
    }
}
