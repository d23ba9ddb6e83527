//! SQL expression tree node model.
//!
//! This module defines every node kind the toolkit understands. The design is
//! a closed tagged union: [`Expression`] has one variant per node kind, and
//! each variant wraps a struct of the same name. Nodes are shared through
//! [`Node`] (`Arc<Expression>`) and are never mutated once built, so a
//! rewrite that leaves a subtree alone hands back the very same `Arc`.
//!
//! # Variant Groups
//!
//! | Group | Kinds | Purpose |
//! |---|---|---|
//! | **Names** | `Name`, `TableName`, `Alias` | Identifiers and per-reference identity tokens |
//! | **Types** | `SqlType` | Column and cast type descriptors |
//! | **Relations** | `Column`, `Table`, `TempTable`, `Index`, `ForeignKey`, `TableRef`, `DerivedTable`, `ValuesTable`, `Row`, `Join` | Relation definitions and references |
//! | **Expressions** | `Literal`, `Star`, `Binary`, `And`, `Or`, `Not`, `IsNull`, `InList`, `InSubquery`, `Between`, `Exists`, `Function`, `Cast`, `Case`, `CaseWhen`, `AliasedExpr`, `OrderBy` | Scalar and boolean expressions |
//! | **DML** | `Select`, `Values`, `Insert`, `Update`, `Delete`, `Assignment`, `Output`, `Merge`, `WhenMatched`, `WhenNotMatched`, `WhenNotMatchedBySource`, `MergeUpdate`, `MergeDelete`, `MergeInsert` | Data statements |
//! | **DDL / control** | `CreateTable`, `DropTable`, `IfStatement`, `Batch` | Schema and script statements |
//!
//! Each kind lists its child slots and then its plain properties; that order
//! is what [`Expression::children`] and [`Expression::plain_properties`]
//! report, what the codec writes, and what the renderers rely on.

use crate::dispatch::{ChildRef, ChildSlot, ChildValue, PlainProp, SlotShape};
use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use once_cell::sync::Lazy;
use std::collections::hash_map::RandomState;
use std::collections::HashSet;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Shared handle to an immutable node
pub type Node = Arc<Expression>;

/// Wrap an expression into a [`Node`] without validation.
///
/// Use [`checked`] for kinds that carry construction invariants.
pub fn node(expr: impl Into<Expression>) -> Node {
    Arc::new(expr.into())
}

/// Wrap an expression into a [`Node`] after validating its invariants.
pub fn checked(expr: impl Into<Expression>) -> Result<Node> {
    let expr = expr.into();
    expr.validate()?;
    Ok(Arc::new(expr))
}

/// A plain (non-node) property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

impl Scalar {
    /// Stable name of the scalar kind, used by the XML and row projections
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::Bytes(_) => "bytes",
            Scalar::Date(_) => "date",
            Scalar::Timestamp(_) => "timestamp",
        }
    }

    /// Lossless text form of the value (`None` for NULL)
    pub fn to_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(format!("{:?}", f)),
            Scalar::Text(s) => Some(s.clone()),
            Scalar::Bytes(b) => Some(crate::helper::to_hex(b)),
            Scalar::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
            Scalar::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Parse the text form produced by [`Scalar::to_text`]
    pub fn parse(kind: &str, text: Option<&str>) -> std::result::Result<Scalar, String> {
        let require = || text.ok_or_else(|| format!("{} value has no text", kind));
        match kind {
            "null" => Ok(Scalar::Null),
            "bool" => match require()? {
                "true" => Ok(Scalar::Bool(true)),
                "false" => Ok(Scalar::Bool(false)),
                other => Err(format!("invalid bool '{}'", other)),
            },
            "int" => require()?
                .parse::<i64>()
                .map(Scalar::Int)
                .map_err(|e| e.to_string()),
            "float" => require()?
                .parse::<f64>()
                .map(Scalar::Float)
                .map_err(|e| e.to_string()),
            "text" => Ok(Scalar::Text(text.unwrap_or_default().to_string())),
            "bytes" => parse_hex(require()?).map(Scalar::Bytes),
            "date" => NaiveDate::parse_from_str(require()?, DATE_FORMAT)
                .map(Scalar::Date)
                .map_err(|e| e.to_string()),
            "timestamp" => NaiveDateTime::parse_from_str(require()?, TIMESTAMP_FORMAT)
                .map(Scalar::Timestamp)
                .map_err(|e| e.to_string()),
            other => Err(format!("unknown scalar kind '{}'", other)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

fn parse_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err(format!("odd-length hex string '{}'", text));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex string '{}'", text))
        })
        .collect()
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Bytes(v)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(v: NaiveDate) -> Self {
        Scalar::Date(v)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(v: NaiveDateTime) -> Self {
        Scalar::Timestamp(v)
    }
}

/// Declare an enumerated plain property with stable serialized names.
macro_rules! plain_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }

            pub fn parse(text: &str) -> Option<Self> {
                match text {
                    $( $text => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl PlainProp for $name {
            fn to_scalar(&self) -> Scalar {
                Scalar::Text(self.as_str().to_string())
            }

            fn from_scalar(value: Scalar) -> std::result::Result<Self, String> {
                match value {
                    Scalar::Text(text) => Self::parse(&text)
                        .ok_or_else(|| format!("unknown {} '{}'", stringify!($name), text)),
                    other => Err(format!("expected text, found {}", other.kind_name())),
                }
            }
        }
    };
}

plain_enum! {
    /// Binary operators (comparison, arithmetic, pattern matching, concatenation)
    BinaryOperator {
        Eq => "eq",
        NotEq => "not_eq",
        Lt => "lt",
        LtEq => "lt_eq",
        Gt => "gt",
        GtEq => "gt_eq",
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        Div => "div",
        Mod => "mod",
        Like => "like",
        NotLike => "not_like",
        /// String concatenation; spelled differently per dialect
        Concat => "concat",
    }
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 5,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Concat => 4,
            _ => 3,
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 3
    }
}

plain_enum! {
    /// Join flavours
    JoinKind {
        Inner => "inner",
        Left => "left",
        Right => "right",
        Full => "full",
        Cross => "cross",
    }
}

plain_enum! {
    /// Logical SQL types; each dialect maps them to its own spelling
    TypeKind {
        Boolean => "boolean",
        TinyInt => "tiny_int",
        SmallInt => "small_int",
        Int => "int",
        BigInt => "big_int",
        Decimal => "decimal",
        Real => "real",
        Double => "double",
        Char => "char",
        VarChar => "var_char",
        NChar => "n_char",
        NVarChar => "n_var_char",
        Text => "text",
        Binary => "binary",
        VarBinary => "var_binary",
        Date => "date",
        Time => "time",
        DateTime => "date_time",
        DateTimeOffset => "date_time_offset",
        Guid => "guid",
    }
}

impl TypeKind {
    /// Fixed-width types that cannot be declared without a size
    pub fn requires_size(&self) -> bool {
        matches!(self, TypeKind::Char | TypeKind::NChar | TypeKind::Binary)
    }

    pub fn accepts_size(&self) -> bool {
        matches!(
            self,
            TypeKind::Char
                | TypeKind::VarChar
                | TypeKind::NChar
                | TypeKind::NVarChar
                | TypeKind::Binary
                | TypeKind::VarBinary
        )
    }
}

plain_enum! {
    /// What an index descriptor enforces
    IndexRole {
        PrimaryKey => "primary_key",
        Unique => "unique",
        NonUnique => "non_unique",
    }
}

/// Declare the closed set of node kinds.
///
/// For every kind this generates the struct, the `Expression` variant, and the
/// dispatch glue: type tag, ordered child and property enumeration, generic
/// reconstruction from new children, and generic decoding from parts.
macro_rules! node_kinds {
    (
        $(
            $(#[$meta:meta])*
            $kind:ident {
                children: { $( $(#[$cmeta:meta])* $child:ident : $cty:ty ),* $(,)? }
                props: { $( $(#[$pmeta:meta])* $prop:ident : $pty:ty ),* $(,)? }
            }
        )+
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $kind {
                $( $(#[$cmeta])* pub $child: $cty, )*
                $( $(#[$pmeta])* pub $prop: $pty, )*
            }

            impl $kind {
                /// Stable serialization tag of this kind
                pub const TAG: &'static str = stringify!($kind);
            }

            impl From<$kind> for Expression {
                fn from(value: $kind) -> Self {
                    Expression::$kind(value)
                }
            }
        )+

        /// Any node of the tree. One variant per node kind.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Expression {
            $( $kind($kind), )+
        }

        impl Expression {
            /// Every type tag, in declaration order
            pub const TAGS: &'static [&'static str] = &[ $( stringify!($kind), )+ ];

            /// The stable tag identifying this node's kind
            pub fn type_tag(&self) -> &'static str {
                match self {
                    $( Expression::$kind(_) => $kind::TAG, )+
                }
            }

            /// Child slots in declared order
            pub fn children(&self) -> Vec<(&'static str, ChildRef<'_>)> {
                match self {
                    $(
                        Expression::$kind(_n) => vec![
                            $( (stringify!($child), ChildSlot::child_ref(&_n.$child)), )*
                        ],
                    )+
                }
            }

            /// Plain properties in declared order
            pub fn plain_properties(&self) -> Vec<(&'static str, Scalar)> {
                match self {
                    $(
                        Expression::$kind(_n) => vec![
                            $( (stringify!($prop), PlainProp::to_scalar(&_n.$prop)), )*
                        ],
                    )+
                }
            }

            /// Rebuild this node with new child values, one per declared slot,
            /// keeping all plain properties.
            pub fn with_children(&self, children: Vec<ChildValue>) -> Result<Expression> {
                match self {
                    $(
                        Expression::$kind(_n) => {
                            #[allow(unused_mut, unused_variables)]
                            let mut values = children.into_iter();
                            let rebuilt = Expression::$kind($kind {
                                $(
                                    $child: <$cty as ChildSlot>::from_child(
                                        $kind::TAG,
                                        stringify!($child),
                                        values.next(),
                                    )?,
                                )*
                                $( $prop: _n.$prop.clone(), )*
                            });
                            rebuilt.validate()?;
                            Ok(rebuilt)
                        }
                    )+
                }
            }

            /// Build a node of kind `tag`, pulling each child slot and each
            /// plain property from the supplied resolvers in declared order.
            pub fn from_parts(
                tag: &str,
                child: &mut dyn FnMut(&'static str, SlotShape) -> Result<ChildValue>,
                prop: &mut dyn FnMut(&'static str) -> Result<Scalar>,
            ) -> Result<Expression> {
                $(
                    if tag == $kind::TAG {
                        let built = Expression::$kind($kind {
                            $(
                                $child: <$cty as ChildSlot>::from_child(
                                    $kind::TAG,
                                    stringify!($child),
                                    Some(child(stringify!($child), <$cty as ChildSlot>::SHAPE)?),
                                )?,
                            )*
                            $(
                                $prop: <$pty as PlainProp>::from_scalar(prop(stringify!($prop))?)
                                    .map_err(|msg| {
                                        Error::codec(format!(
                                            "{}.{}: {}",
                                            $kind::TAG,
                                            stringify!($prop),
                                            msg
                                        ))
                                    })?,
                            )*
                        });
                        built.validate()?;
                        return Ok(built);
                    }
                )+
                Err(Error::codec(format!("unknown type tag '{}'", tag)))
            }
        }
    };
}

node_kinds! {
    /// A single identifier (column, table, schema or output name)
    Name {
        children: {}
        props: { value: String }
    }

    /// A possibly schema-qualified table name
    TableName {
        children: { schema: Option<Node>, name: Node }
        props: {}
    }

    /// Identity token for one table reference inside a statement.
    ///
    /// Columns point at the alias of the reference they are read from, which
    /// makes the alias the join key between a reference and its columns.
    /// Explicitly named aliases render with their name; the rest get `t0`,
    /// `t1`, ... assigned per statement by the generator.
    Alias {
        children: {}
        props: { id: i64, name: Option<String> }
    }

    /// A SQL type descriptor
    SqlType {
        children: {}
        props: {
            kind: TypeKind,
            /// Length for character and binary types; `None` means unbounded
            size: Option<i64>,
            precision: Option<i64>,
            scale: Option<i64>,
        }
    }

    /// A column: a name read from a source, with its type and nullability
    Column {
        children: {
            /// `Alias`, `TableName` or `None` for an unqualified reference
            source: Option<Node>,
            name: Node,
            data_type: Node,
            default: Option<Node>,
        }
        props: { nullable: bool, identity: bool }
    }

    /// A base table definition with ordered columns, indexes and foreign keys
    Table {
        children: {
            name: Node,
            columns: Vec<Node>,
            indexes: Vec<Node>,
            foreign_keys: Vec<Node>,
        }
        props: {}
    }

    /// A session-scoped temporary table
    TempTable {
        children: { name: Node, columns: Vec<Node> }
        props: {}
    }

    /// Index or key constraint over columns of the owning table
    Index {
        children: { columns: Vec<Node> }
        props: { role: IndexRole, clustered: bool, name: Option<String> }
    }

    /// Foreign key from columns of the owning table to another table
    ForeignKey {
        children: {
            columns: Vec<Node>,
            references: Node,
            referenced_columns: Vec<Node>,
        }
        props: { name: Option<String> }
    }

    /// A reference to a table, temp table or table name, optionally aliased
    TableRef {
        children: { table: Node, alias: Option<Node> }
        props: {}
    }

    /// A subquery used as a relation
    DerivedTable {
        children: { query: Node, alias: Node }
        props: {}
    }

    /// An inline `VALUES` list used as a relation: `(VALUES ...) AS a(c1, c2)`
    ValuesTable {
        children: { rows: Vec<Node>, alias: Node, columns: Vec<Node> }
        props: {}
    }

    /// One row of values
    Row {
        children: { values: Vec<Node> }
        props: {}
    }

    Join {
        children: { left: Node, right: Node, on: Option<Node> }
        props: { kind: JoinKind }
    }

    Literal {
        children: {}
        props: { value: Scalar }
    }

    /// `*` or `source.*`
    Star {
        children: { source: Option<Node> }
        props: {}
    }

    Binary {
        children: { left: Node, right: Node }
        props: { op: BinaryOperator }
    }

    /// Conjunction of any number of operands
    And {
        children: { operands: Vec<Node> }
        props: {}
    }

    /// Disjunction of any number of operands
    Or {
        children: { operands: Vec<Node> }
        props: {}
    }

    Not {
        children: { operand: Node }
        props: {}
    }

    IsNull {
        children: { operand: Node }
        props: { negated: bool }
    }

    InList {
        children: { operand: Node, items: Vec<Node> }
        props: { negated: bool }
    }

    InSubquery {
        children: { operand: Node, query: Node }
        props: { negated: bool }
    }

    Between {
        children: { operand: Node, low: Node, high: Node }
        props: { negated: bool }
    }

    Exists {
        children: { query: Node }
        props: {}
    }

    /// Scalar or aggregate function call
    Function {
        children: { args: Vec<Node> }
        props: { name: String, distinct: bool }
    }

    Cast {
        children: { operand: Node, data_type: Node }
        props: {}
    }

    Case {
        children: { operand: Option<Node>, whens: Vec<Node>, otherwise: Option<Node> }
        props: {}
    }

    CaseWhen {
        children: { condition: Node, result: Node }
        props: {}
    }

    /// Projection with an output name: `expr AS name`
    AliasedExpr {
        children: { expr: Node, alias: Node }
        props: {}
    }

    OrderBy {
        children: { expr: Node }
        props: { descending: bool }
    }

    Select {
        children: {
            columns: Vec<Node>,
            from: Option<Node>,
            where_clause: Option<Node>,
            group_by: Vec<Node>,
            having: Option<Node>,
            order_by: Vec<Node>,
        }
        props: { distinct: bool, limit: Option<i64>, offset: Option<i64> }
    }

    /// `VALUES (...), (...)` as an INSERT source
    Values {
        children: { rows: Vec<Node> }
        props: {}
    }

    Insert {
        children: {
            table: Node,
            columns: Vec<Node>,
            /// `Values` or `Select`
            source: Node,
            output: Option<Node>,
        }
        props: {}
    }

    /// `column = value` inside UPDATE or a MERGE update action
    Assignment {
        children: { column: Node, value: Node }
        props: {}
    }

    Update {
        children: {
            target: Node,
            assignments: Vec<Node>,
            from: Vec<Node>,
            where_clause: Option<Node>,
            output: Option<Node>,
        }
        props: {}
    }

    Delete {
        children: {
            target: Node,
            from: Vec<Node>,
            where_clause: Option<Node>,
            output: Option<Node>,
        }
        props: {}
    }

    /// Rows returned by a data-modifying statement (OUTPUT / RETURNING)
    Output {
        children: { items: Vec<Node> }
        props: {}
    }

    Merge {
        children: {
            target: Node,
            source: Node,
            on: Node,
            when_matched: Option<Node>,
            when_not_matched: Option<Node>,
            when_not_matched_by_source: Option<Node>,
            output: Option<Node>,
        }
        props: {}
    }

    WhenMatched {
        children: { condition: Option<Node>, action: Node }
        props: {}
    }

    /// `WHEN NOT MATCHED [BY TARGET]`
    WhenNotMatched {
        children: { condition: Option<Node>, action: Node }
        props: {}
    }

    WhenNotMatchedBySource {
        children: { condition: Option<Node>, action: Node }
        props: {}
    }

    MergeUpdate {
        children: { assignments: Vec<Node> }
        props: {}
    }

    MergeDelete {
        children: {}
        props: {}
    }

    MergeInsert {
        children: { columns: Vec<Node>, values: Vec<Node> }
        props: {}
    }

    CreateTable {
        children: { table: Node }
        props: { if_not_exists: bool }
    }

    DropTable {
        children: { table: Node }
        props: { if_exists: bool }
    }

    /// Procedural `IF cond ... ELSE ...`
    IfStatement {
        children: { condition: Node, then: Vec<Node>, otherwise: Vec<Node> }
        props: {}
    }

    /// Ordered list of statements executed one after another
    Batch {
        children: { statements: Vec<Node> }
        props: {}
    }
}

/// Alias ids are `seed << 32 | counter`, with a per-process random seed so
/// ids drawn in different processes do not collide when saved trees are
/// combined with fresh ones.
static NEXT_ALIAS_ID: Lazy<AtomicI64> = Lazy::new(|| {
    let seed = RandomState::new().build_hasher().finish();
    let high = ((seed >> 33) as i64 | 1) & 0x7fff_ffff;
    AtomicI64::new(high << 32 | 1)
});

fn next_alias_id() -> i64 {
    NEXT_ALIAS_ID.fetch_add(1, Ordering::Relaxed)
}

/// Whether two column sources denote the same relation reference.
///
/// Aliases match by id, so separately allocated copies of one alias (for
/// example after a decode) still match; any other source matches by
/// reference.
pub fn same_source(a: &Node, b: &Node) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (a.as_alias(), b.as_alias()) {
        (Some(x), Some(y)) => x.id == y.id,
        _ => false,
    }
}

impl Name {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl TableName {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(|s| node(Name::new(s))),
            name: node(Name::new(name)),
        }
    }
}

impl Alias {
    /// A fresh anonymous alias; rendered as `t<n>`
    pub fn auto() -> Self {
        Self {
            id: next_alias_id(),
            name: None,
        }
    }

    /// A fresh alias that renders with an explicit name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: next_alias_id(),
            name: Some(name.into()),
        }
    }
}

impl SqlType {
    /// Create a type descriptor, rejecting fixed-width types without a size.
    pub fn new(kind: TypeKind, size: Option<i64>) -> Result<Self> {
        let ty = Self {
            kind,
            size,
            precision: None,
            scale: None,
        };
        ty.check()?;
        Ok(ty)
    }

    pub fn decimal(precision: i64, scale: i64) -> Result<Self> {
        let ty = Self {
            kind: TypeKind::Decimal,
            size: None,
            precision: Some(precision),
            scale: Some(scale),
        };
        ty.check()?;
        Ok(ty)
    }

    /// Shorthand for types that take no size
    pub fn of(kind: TypeKind) -> Node {
        node(Self {
            kind,
            size: None,
            precision: None,
            scale: None,
        })
    }

    fn check(&self) -> Result<()> {
        if self.kind.requires_size() && self.size.is_none() {
            return Err(Error::construction(
                Self::TAG,
                format!("{} requires an explicit size", self.kind),
            ));
        }
        if self.size.is_some() && !self.kind.accepts_size() {
            return Err(Error::construction(
                Self::TAG,
                format!("{} does not take a size", self.kind),
            ));
        }
        if matches!(self.size, Some(size) if size <= 0) {
            return Err(Error::construction(Self::TAG, "size must be positive"));
        }
        if self.kind != TypeKind::Decimal && (self.precision.is_some() || self.scale.is_some()) {
            return Err(Error::construction(
                Self::TAG,
                format!("{} does not take precision or scale", self.kind),
            ));
        }
        if let (Some(precision), Some(scale)) = (self.precision, self.scale) {
            if scale > precision || precision <= 0 || scale < 0 {
                return Err(Error::construction(
                    Self::TAG,
                    format!("invalid decimal precision/scale ({}, {})", precision, scale),
                ));
            }
        }
        Ok(())
    }
}

impl Column {
    /// A column definition attached to `source` (usually a `TableName`)
    pub fn new(source: Option<Node>, name: impl Into<String>, data_type: Node, nullable: bool) -> Self {
        Self {
            source,
            name: node(Name::new(name)),
            data_type,
            default: None,
            nullable,
            identity: false,
        }
    }

    pub fn name_str(&self) -> &str {
        name_text(&self.name).unwrap_or_default()
    }

    /// Copy of this column read from a different source.
    ///
    /// The original column is untouched; the copy shares name, type and
    /// default nodes with it.
    pub fn resourced(&self, source: Node) -> Column {
        Column {
            source: Some(source),
            ..self.clone()
        }
    }
}

impl Table {
    /// Create a table definition, enforcing key and index invariants.
    pub fn new(
        name: TableName,
        columns: Vec<Node>,
        indexes: Vec<Node>,
        foreign_keys: Vec<Node>,
    ) -> Result<Self> {
        let table = Self {
            name: node(name),
            columns,
            indexes,
            foreign_keys,
        };
        table.check()?;
        Ok(table)
    }

    pub fn table_name(&self) -> Option<&TableName> {
        match self.name.as_ref() {
            Expression::TableName(t) => Some(t),
            _ => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find_map(|c| match c.as_ref() {
            Expression::Column(col) if col.name_str() == name => Some(col),
            _ => None,
        })
    }

    pub fn primary_key(&self) -> Option<&Index> {
        self.indexes.iter().find_map(|i| match i.as_ref() {
            Expression::Index(index) if index.role == IndexRole::PrimaryKey => Some(index),
            _ => None,
        })
    }

    fn check(&self) -> Result<()> {
        if !matches!(self.name.as_ref(), Expression::TableName(_)) {
            return Err(Error::construction(Self::TAG, "name must be a TableName"));
        }
        let column_names = check_columns(Self::TAG, &self.columns)?;

        let mut primary_keys = 0;
        let mut clustered = 0;
        for index in &self.indexes {
            let Expression::Index(index) = index.as_ref() else {
                return Err(Error::construction(Self::TAG, "indexes must be Index nodes"));
            };
            if index.role == IndexRole::PrimaryKey {
                primary_keys += 1;
            }
            if index.clustered {
                clustered += 1;
            }
            for column in &index.columns {
                let name = name_text(column).unwrap_or_default();
                if !column_names.contains(name) {
                    return Err(Error::construction(
                        Self::TAG,
                        format!("index column '{}' is not a column of the table", name),
                    ));
                }
            }
        }
        if primary_keys > 1 {
            return Err(Error::construction(Self::TAG, "more than one primary key"));
        }
        if clustered > 1 {
            return Err(Error::construction(
                Self::TAG,
                "more than one clustered index on one table",
            ));
        }

        for fk in &self.foreign_keys {
            let Expression::ForeignKey(fk) = fk.as_ref() else {
                return Err(Error::construction(Self::TAG, "foreign_keys must be ForeignKey nodes"));
            };
            for column in &fk.columns {
                let name = name_text(column).unwrap_or_default();
                if !column_names.contains(name) {
                    return Err(Error::construction(
                        Self::TAG,
                        format!("foreign key column '{}' is not a column of the table", name),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl TempTable {
    pub fn new(name: impl Into<String>, columns: Vec<Node>) -> Result<Self> {
        let table = Self {
            name: node(Name::new(name)),
            columns,
        };
        check_columns(Self::TAG, &table.columns)?;
        Ok(table)
    }

    pub fn name_str(&self) -> &str {
        name_text(&self.name).unwrap_or_default()
    }
}

fn check_columns<'a>(kind: &str, columns: &'a [Node]) -> Result<HashSet<&'a str>> {
    let mut names = HashSet::new();
    for column in columns {
        let Expression::Column(col) = column.as_ref() else {
            return Err(Error::construction(kind, "columns must be Column nodes"));
        };
        if !names.insert(col.name_str()) {
            return Err(Error::construction(
                kind,
                format!("duplicate column '{}'", col.name_str()),
            ));
        }
    }
    Ok(names)
}

impl Index {
    pub fn new(role: IndexRole, columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| node(Name::new(*c))).collect(),
            role,
            clustered: false,
            name: None,
        }
    }

    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| name_text(c).unwrap_or_default())
            .collect()
    }
}

impl ForeignKey {
    pub fn new(columns: &[&str], references: TableName, referenced_columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| node(Name::new(*c))).collect(),
            references: node(references),
            referenced_columns: referenced_columns.iter().map(|c| node(Name::new(*c))).collect(),
            name: None,
        }
    }
}

impl Literal {
    pub fn new(value: impl Into<Scalar>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn null() -> Self {
        Self {
            value: Scalar::Null,
        }
    }
}

impl Binary {
    pub fn new(left: Node, op: BinaryOperator, right: Node) -> Self {
        Self { left, right, op }
    }
}

/// Text of a `Name` node
pub fn name_text(node: &Node) -> Option<&str> {
    match node.as_ref() {
        Expression::Name(n) => Some(n.value.as_str()),
        _ => None,
    }
}

impl Expression {
    /// Check the construction invariants of this node kind.
    ///
    /// Kinds without invariants always pass. The decoder and the modifier call
    /// this for every node they build, so a tree obtained from either honours
    /// the same rules as one built through the constructors.
    pub fn validate(&self) -> Result<()> {
        match self {
            Expression::Name(n) => {
                if n.value.is_empty() {
                    return Err(Error::construction(Name::TAG, "empty name"));
                }
                Ok(())
            }
            Expression::Alias(a) => match &a.name {
                Some(name) if name.is_empty() => {
                    Err(Error::construction(Alias::TAG, "empty alias name"))
                }
                _ => Ok(()),
            },
            Expression::SqlType(t) => t.check(),
            Expression::Table(t) => t.check(),
            Expression::TempTable(t) => check_columns(TempTable::TAG, &t.columns).map(|_| ()),
            Expression::Index(i) => {
                if i.columns.is_empty() {
                    return Err(Error::construction(Index::TAG, "index without columns"));
                }
                Ok(())
            }
            Expression::ForeignKey(fk) => {
                if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
                    return Err(Error::construction(
                        ForeignKey::TAG,
                        "column lists must be non-empty and of equal length",
                    ));
                }
                Ok(())
            }
            Expression::ValuesTable(v) => {
                for row in &v.rows {
                    if let Expression::Row(r) = row.as_ref() {
                        if r.values.len() != v.columns.len() {
                            return Err(Error::construction(
                                ValuesTable::TAG,
                                format!(
                                    "row has {} values but {} columns are declared",
                                    r.values.len(),
                                    v.columns.len()
                                ),
                            ));
                        }
                    }
                }
                Ok(())
            }
            Expression::Insert(i) => {
                if let Expression::Values(values) = i.source.as_ref() {
                    for row in &values.rows {
                        if let Expression::Row(r) = row.as_ref() {
                            if !i.columns.is_empty() && r.values.len() != i.columns.len() {
                                return Err(Error::construction(
                                    Insert::TAG,
                                    "row width does not match the column list",
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Direct child node number `index`, counting every child node of every
    /// slot in declared order.
    pub fn accept_child(&self, index: usize) -> Option<&Node> {
        self.children()
            .into_iter()
            .flat_map(|(_, child)| child.nodes())
            .nth(index)
    }

    /// Returns `true` if this node is a statement that can be rendered on its own
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Expression::Select(_)
                | Expression::Insert(_)
                | Expression::Update(_)
                | Expression::Delete(_)
                | Expression::Merge(_)
                | Expression::CreateTable(_)
                | Expression::DropTable(_)
                | Expression::IfStatement(_)
                | Expression::Batch(_)
        )
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Expression::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Alias> {
        match self {
            Expression::Alias(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Expression::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&Select> {
        match self {
            Expression::Select(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short description; SQL text comes from the generator
        match self {
            Expression::Name(n) => write!(f, "{}", n.value),
            Expression::Alias(a) => match &a.name {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "alias#{}", a.id),
            },
            Expression::Column(c) => write!(f, "Column({})", c.name_str()),
            other => write!(f, "{}", other.type_tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_type() -> Node {
        SqlType::of(TypeKind::Int)
    }

    #[test]
    fn test_fixed_size_type_requires_size() {
        assert!(SqlType::new(TypeKind::Char, None).is_err());
        assert!(SqlType::new(TypeKind::NChar, Some(0)).is_err());
        assert!(SqlType::new(TypeKind::Char, Some(10)).is_ok());
        assert!(SqlType::new(TypeKind::VarChar, None).is_ok());
        assert!(SqlType::new(TypeKind::Int, Some(4)).is_err());
        assert!(SqlType::decimal(10, 12).is_err());
    }

    #[test]
    fn test_two_clustered_indexes_rejected() {
        let source = node(TableName::new(Some("dbo"), "T"));
        let columns = vec![
            node(Column::new(Some(source.clone()), "A", int_type(), false)),
            node(Column::new(Some(source), "B", int_type(), false)),
        ];
        let result = Table::new(
            TableName::new(Some("dbo"), "T"),
            columns,
            vec![
                node(Index::new(IndexRole::PrimaryKey, &["A"]).clustered()),
                node(Index::new(IndexRole::Unique, &["B"]).clustered()),
            ],
            vec![],
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("clustered"), "{}", err);
    }

    #[test]
    fn test_index_on_unknown_column_rejected() {
        let columns = vec![node(Column::new(None, "A", int_type(), false))];
        let result = Table::new(
            TableName::new(None, "T"),
            columns,
            vec![node(Index::new(IndexRole::Unique, &["Missing"]))],
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_children_follow_declared_order() {
        let expr = Expression::Binary(Binary::new(
            node(Literal::new(1)),
            BinaryOperator::Add,
            node(Literal::new(2)),
        ));
        let slots: Vec<&str> = expr.children().iter().map(|(name, _)| *name).collect();
        assert_eq!(slots, vec!["left", "right"]);
        let props = expr.plain_properties();
        assert_eq!(props, vec![("op", Scalar::Text("add".to_string()))]);
        assert_eq!(expr.type_tag(), "Binary");
    }

    #[test]
    fn test_accept_child_flattens_lists() {
        let and = Expression::And(And {
            operands: vec![node(Literal::new(true)), node(Literal::new(false))],
        });
        assert!(and.accept_child(1).is_some());
        assert!(and.accept_child(2).is_none());
    }

    #[test]
    fn test_resourced_column_keeps_original() {
        let table = node(TableName::new(Some("dbo"), "Users"));
        let alias = node(Alias::auto());
        let col = Column::new(Some(table.clone()), "Id", int_type(), false);
        let moved = col.resourced(alias.clone());
        assert!(Arc::ptr_eq(col.source.as_ref().unwrap(), &table));
        assert!(Arc::ptr_eq(moved.source.as_ref().unwrap(), &alias));
        assert!(Arc::ptr_eq(&col.name, &moved.name));
    }

    #[test]
    fn test_scalar_text_round_trip() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(13, 45, 10, 250)
            .unwrap();
        for scalar in [
            Scalar::Int(-5),
            Scalar::Float(0.1),
            Scalar::Bytes(vec![0, 171, 255]),
            Scalar::Timestamp(ts),
            Scalar::Text(String::new()),
        ] {
            let text = scalar.to_text();
            let back = Scalar::parse(scalar.kind_name(), text.as_deref()).unwrap();
            assert_eq!(back, scalar);
        }
    }

    #[test]
    fn test_tags_are_unique() {
        let unique: HashSet<&str> = Expression::TAGS.iter().copied().collect();
        assert_eq!(unique.len(), Expression::TAGS.len());
    }
}
