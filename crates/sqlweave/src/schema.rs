//! Table catalog and metadata loading
//!
//! This module provides:
//! - [`Catalog`], a set of table definitions keyed by schema and table name
//! - Foreign-key back-references ("which columns point at this one"), computed
//!   lazily and memoized per column, safe to query from many threads
//! - Metadata loading from `information_schema` through the [`RowReader`]
//!   boundary, which the execution layer implements

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::builder::{col, select, table_ref_as};
use crate::error::{Error, Result};
use crate::expressions::*;
use crate::helper::constraint_name;

/// Schema-qualified table identity; an absent schema is the empty string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub schema: String,
    pub table: String,
}

impl TableKey {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    fn of(name: &TableName) -> Self {
        Self {
            schema: name
                .schema
                .as_ref()
                .and_then(name_text)
                .unwrap_or_default()
                .to_string(),
            table: name_text(&name.name).unwrap_or_default().to_string(),
        }
    }
}

/// One column of one table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnKey {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnKey {
    pub fn new(schema: &str, table: &str, column: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

/// A foreign key that references a given column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    /// The referencing table
    pub table: TableKey,
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_columns: Vec<String>,
}

/// Table definitions plus the lazily built back-reference cache
#[derive(Default)]
pub struct Catalog {
    tables: BTreeMap<TableKey, Node>,
    back_refs: Mutex<HashMap<ColumnKey, Arc<OnceCell<Vec<ForeignKeyRef>>>>>,
    computations: AtomicUsize,
}

fn table_of(node: &Node) -> Result<&Table> {
    match node.as_ref() {
        Expression::Table(t) => Ok(t),
        other => Err(Error::construction(
            Table::TAG,
            format!("catalog entries must be tables, found {}", other.type_tag()),
        )),
    }
}

fn primary_key_name(key: &TableKey, table: &Table) -> Option<String> {
    table.primary_key().map(|pk| {
        pk.name.clone().unwrap_or_else(|| {
            let schema = (!key.schema.is_empty()).then_some(key.schema.as_str());
            constraint_name("PK", schema, &key.table, &[])
        })
    })
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: impl IntoIterator<Item = Node>) -> Result<Self> {
        let mut catalog = Self::new();
        for table in tables {
            catalog.add_table(table)?;
        }
        Ok(catalog)
    }

    /// Add a table definition.
    ///
    /// Fails on a table that is already present and on a primary key whose
    /// constraint name is already used by another table.
    pub fn add_table(&mut self, table: Node) -> Result<()> {
        let definition = table_of(&table)?;
        let name = definition
            .table_name()
            .ok_or_else(|| Error::construction(Table::TAG, "name must be a TableName"))?;
        let key = TableKey::of(name);
        if self.tables.contains_key(&key) {
            return Err(Error::construction(
                Table::TAG,
                format!("table '{}.{}' is already in the catalog", key.schema, key.table),
            ));
        }
        if let Some(pk_name) = primary_key_name(&key, definition) {
            for (other_key, other) in &self.tables {
                let other = table_of(other)?;
                if primary_key_name(other_key, other).as_deref() == Some(pk_name.as_str()) {
                    return Err(Error::construction(
                        Index::TAG,
                        format!(
                            "primary key '{}' of '{}' is already defined on '{}'",
                            pk_name, key.table, other_key.table
                        ),
                    ));
                }
            }
        }

        trace!(schema = %key.schema, table = %key.table, "catalog table added");
        self.tables.insert(key, table);
        self.back_refs
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// Move every table of `other` into this catalog
    pub fn merge(&mut self, other: Catalog) -> Result<()> {
        for (_, table) in other.tables {
            self.add_table(table)?;
        }
        Ok(())
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&Node> {
        self.tables.get(&TableKey::new(schema, table))
    }

    pub fn tables(&self) -> impl Iterator<Item = (&TableKey, &Node)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Foreign keys whose referenced columns include `key`.
    ///
    /// Computed on first request for each key and memoized; concurrent first
    /// requests for the same key compute it once.
    pub fn referencing_columns(&self, key: &ColumnKey) -> Vec<ForeignKeyRef> {
        let cell = {
            let mut cache = self.back_refs.lock().unwrap_or_else(PoisonError::into_inner);
            cache.entry(key.clone()).or_default().clone()
        };
        cell.get_or_init(|| {
            self.computations.fetch_add(1, Ordering::SeqCst);
            let refs = self.scan_references(key);
            debug!(
                table = %key.table,
                column = %key.column,
                found = refs.len(),
                "foreign key back-references resolved"
            );
            refs
        })
        .clone()
    }

    /// How many back-reference lookups were actually computed
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    fn scan_references(&self, key: &ColumnKey) -> Vec<ForeignKeyRef> {
        let target = TableKey::new(&key.schema, &key.table);
        let mut refs = Vec::new();
        for (table_key, node) in &self.tables {
            let Ok(table) = table_of(node) else {
                continue;
            };
            for fk in &table.foreign_keys {
                let Expression::ForeignKey(fk) = fk.as_ref() else {
                    continue;
                };
                let Expression::TableName(references) = fk.references.as_ref() else {
                    continue;
                };
                if TableKey::of(references) != target {
                    continue;
                }
                let referenced: Vec<String> = fk
                    .referenced_columns
                    .iter()
                    .filter_map(name_text)
                    .map(str::to_string)
                    .collect();
                if referenced.iter().any(|c| c == &key.column) {
                    refs.push(ForeignKeyRef {
                        table: table_key.clone(),
                        name: fk.name.clone(),
                        columns: fk
                            .columns
                            .iter()
                            .filter_map(name_text)
                            .map(str::to_string)
                            .collect(),
                        referenced_columns: referenced,
                    });
                }
            }
        }
        refs
    }
}

// ---------------------------------------------------------------------------
// Metadata loading
// ---------------------------------------------------------------------------

/// Forward-only access to a result set, supplied by the execution layer.
///
/// Implementors provide the positional accessors and [`RowReader::column_index`];
/// the by-name accessors are derived from them.
pub trait RowReader {
    /// Advance to the next row; `false` once the rows are exhausted
    fn next_row(&mut self) -> Result<bool>;

    /// Position of a result column, if present
    fn column_index(&self, name: &str) -> Option<usize>;

    fn is_null_at(&self, index: usize) -> Result<bool>;
    fn get_str_at(&self, index: usize) -> Result<String>;
    fn get_i64_at(&self, index: usize) -> Result<i64>;
    fn get_bool_at(&self, index: usize) -> Result<bool>;

    fn index_of(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::codec(format!("result set has no column '{}'", name)))
    }

    fn is_null(&self, name: &str) -> Result<bool> {
        self.is_null_at(self.index_of(name)?)
    }

    fn get_str(&self, name: &str) -> Result<String> {
        self.get_str_at(self.index_of(name)?)
    }

    fn get_i64(&self, name: &str) -> Result<i64> {
        self.get_i64_at(self.index_of(name)?)
    }

    fn get_bool(&self, name: &str) -> Result<bool> {
        self.get_bool_at(self.index_of(name)?)
    }

    /// `None` for SQL NULL
    fn get_opt_i64(&self, name: &str) -> Result<Option<i64>> {
        let index = self.index_of(name)?;
        if self.is_null_at(index)? {
            Ok(None)
        } else {
            self.get_i64_at(index).map(Some)
        }
    }
}

/// A [`RowReader`] over rows already held in memory
pub struct ScalarRows {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
    cursor: Option<usize>,
}

impl ScalarRows {
    pub fn new(columns: &[&str], rows: Vec<Vec<Scalar>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_ascii_lowercase()).collect(),
            rows,
            cursor: None,
        }
    }

    fn value(&self, index: usize) -> Result<&Scalar> {
        self.cursor
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(index))
            .ok_or_else(|| Error::codec(format!("no value at column {}", index)))
    }
}

impl RowReader for ScalarRows {
    fn next_row(&mut self) -> Result<bool> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.cursor = Some(next);
        Ok(next < self.rows.len())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.to_ascii_lowercase();
        self.columns.iter().position(|c| *c == name)
    }

    fn is_null_at(&self, index: usize) -> Result<bool> {
        Ok(self.value(index)?.is_null())
    }

    fn get_str_at(&self, index: usize) -> Result<String> {
        match self.value(index)? {
            Scalar::Text(s) => Ok(s.clone()),
            other => other
                .to_text()
                .ok_or_else(|| Error::codec(format!("column {} is NULL", index))),
        }
    }

    fn get_i64_at(&self, index: usize) -> Result<i64> {
        match self.value(index)? {
            Scalar::Int(i) => Ok(*i),
            Scalar::Bool(b) => Ok(i64::from(*b)),
            other => Err(Error::codec(format!(
                "column {} holds {}, not an integer",
                index,
                other.kind_name()
            ))),
        }
    }

    fn get_bool_at(&self, index: usize) -> Result<bool> {
        match self.value(index)? {
            Scalar::Bool(b) => Ok(*b),
            Scalar::Int(i) => Ok(*i != 0),
            Scalar::Text(s) => Ok(s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true")),
            other => Err(Error::codec(format!(
                "column {} holds {}, not a boolean",
                index,
                other.kind_name()
            ))),
        }
    }
}

const COLUMN_FIELDS: &[&str] = &[
    "table_schema",
    "table_name",
    "column_name",
    "ordinal_position",
    "data_type",
    "character_maximum_length",
    "numeric_precision",
    "numeric_scale",
    "is_nullable",
];

const KEY_FIELDS: &[&str] = &[
    "table_schema",
    "table_name",
    "constraint_name",
    "constraint_type",
    "column_name",
    "ordinal_position",
];

fn info_table(name: &str) -> TableName {
    TableName::new(Some("information_schema"), name)
}

/// Query over `information_schema.columns` whose rows feed [`load_tables`]
pub fn columns_query(schema: Option<&str>) -> Node {
    let c = table_ref_as(info_table("columns"), "c");
    let alias = c.alias();
    let mut query = select(COLUMN_FIELDS.iter().map(|f| col(&alias, f)))
        .from(&c)
        .order_by([
            col(&alias, "table_schema"),
            col(&alias, "table_name"),
            col(&alias, "ordinal_position"),
        ]);
    if let Some(schema) = schema {
        query = query.where_(col(&alias, "table_schema").eq(crate::builder::lit(schema)));
    }
    query.build()
}

/// Query over `information_schema` listing primary-key and unique columns
pub fn keys_query(schema: Option<&str>) -> Node {
    let k = table_ref_as(info_table("key_column_usage"), "k");
    let tc = table_ref_as(info_table("table_constraints"), "tc");
    let (ka, ta) = (k.alias(), tc.alias());
    let on = col(&ka, "constraint_name")
        .eq(col(&ta, "constraint_name"))
        .and(col(&ka, "table_schema").eq(col(&ta, "table_schema")))
        .and(col(&ka, "table_name").eq(col(&ta, "table_name")));
    let mut query = select([
        col(&ka, "table_schema"),
        col(&ka, "table_name"),
        col(&ka, "constraint_name"),
        col(&ta, "constraint_type"),
        col(&ka, "column_name"),
        col(&ka, "ordinal_position"),
    ])
    .from(&k)
    .inner_join(&tc, on)
    .where_(col(&ta, "constraint_type").in_list([
        crate::builder::lit("PRIMARY KEY"),
        crate::builder::lit("UNIQUE"),
    ]))
    .order_by([
        col(&ka, "table_schema"),
        col(&ka, "table_name"),
        col(&ka, "constraint_name"),
        col(&ka, "ordinal_position"),
    ]);
    if let Some(schema) = schema {
        query = query.where_(col(&ka, "table_schema").eq(crate::builder::lit(schema)));
    }
    query.build()
}

/// Map an `information_schema` type description onto a [`SqlType`]
pub fn parse_type(
    data_type: &str,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> Result<SqlType> {
    // -1 is SQL Server's spelling of MAX
    let length = length.filter(|l| *l > 0);
    let lowered = data_type.to_ascii_lowercase();
    let kind = match lowered.as_str() {
        "bit" | "bool" | "boolean" => TypeKind::Boolean,
        "tinyint" => TypeKind::TinyInt,
        "smallint" | "int2" => TypeKind::SmallInt,
        "int" | "integer" | "int4" | "mediumint" => TypeKind::Int,
        "bigint" | "int8" => TypeKind::BigInt,
        "decimal" | "numeric" | "money" => {
            return match (precision, scale) {
                (Some(p), Some(s)) => SqlType::decimal(p, s),
                _ => SqlType::new(TypeKind::Decimal, None),
            }
        }
        "real" | "float4" => TypeKind::Real,
        "float" | "double" | "double precision" | "float8" => TypeKind::Double,
        "char" | "character" | "bpchar" => {
            return SqlType::new(TypeKind::Char, Some(length.unwrap_or(1)))
        }
        "nchar" => return SqlType::new(TypeKind::NChar, Some(length.unwrap_or(1))),
        "binary" => return SqlType::new(TypeKind::Binary, Some(length.unwrap_or(1))),
        "varchar" | "character varying" => return SqlType::new(TypeKind::VarChar, length),
        "nvarchar" => return SqlType::new(TypeKind::NVarChar, length),
        "varbinary" => return SqlType::new(TypeKind::VarBinary, length),
        "text" | "ntext" | "tinytext" | "mediumtext" | "longtext" => TypeKind::Text,
        "bytea" | "image" | "blob" | "mediumblob" | "longblob" => TypeKind::VarBinary,
        "date" => TypeKind::Date,
        "time" | "time without time zone" => TypeKind::Time,
        "datetime" | "datetime2" | "smalldatetime" | "timestamp"
        | "timestamp without time zone" => TypeKind::DateTime,
        "datetimeoffset" | "timestamptz" | "timestamp with time zone" => TypeKind::DateTimeOffset,
        "uniqueidentifier" | "uuid" => TypeKind::Guid,
        _ => {
            return Err(Error::construction(
                SqlType::TAG,
                format!("unknown column type '{}'", data_type),
            ))
        }
    };
    SqlType::new(kind, None)
}

struct PendingTable {
    key: TableKey,
    columns: Vec<(i64, Column)>,
    keys: BTreeMap<String, (IndexRole, Vec<(i64, String)>)>,
}

/// Build table definitions from the rows of [`columns_query`] and, optionally,
/// [`keys_query`].
///
/// Tables come back ordered by schema and name, columns by ordinal position.
pub fn load_tables(
    columns: &mut dyn RowReader,
    keys: Option<&mut dyn RowReader>,
) -> Result<Vec<Node>> {
    for field in COLUMN_FIELDS {
        columns.index_of(field)?;
    }
    let identity_column = columns.column_index("is_identity");

    let mut pending: BTreeMap<TableKey, PendingTable> = BTreeMap::new();
    while columns.next_row()? {
        let key = TableKey::new(&columns.get_str("table_schema")?, &columns.get_str("table_name")?);
        let data_type = parse_type(
            &columns.get_str("data_type")?,
            columns.get_opt_i64("character_maximum_length")?,
            columns.get_opt_i64("numeric_precision")?,
            columns.get_opt_i64("numeric_scale")?,
        )?;
        let source = node(TableName::new(
            (!key.schema.is_empty()).then_some(key.schema.as_str()),
            key.table.clone(),
        ));
        let mut column = Column::new(
            Some(source),
            columns.get_str("column_name")?,
            node(data_type),
            columns.get_bool("is_nullable")?,
        );
        if let Some(index) = identity_column {
            column.identity = !columns.is_null_at(index)? && columns.get_bool_at(index)?;
        }
        let ordinal = columns.get_i64("ordinal_position")?;
        pending
            .entry(key.clone())
            .or_insert_with(|| PendingTable {
                key,
                columns: Vec::new(),
                keys: BTreeMap::new(),
            })
            .columns
            .push((ordinal, column));
    }

    if let Some(keys) = keys {
        for field in KEY_FIELDS {
            keys.index_of(field)?;
        }
        while keys.next_row()? {
            let key = TableKey::new(&keys.get_str("table_schema")?, &keys.get_str("table_name")?);
            let Some(table) = pending.get_mut(&key) else {
                trace!(table = %key.table, "key on a table without columns skipped");
                continue;
            };
            let role = match keys.get_str("constraint_type")?.to_ascii_uppercase().as_str() {
                "PRIMARY KEY" => IndexRole::PrimaryKey,
                "UNIQUE" => IndexRole::Unique,
                _ => continue,
            };
            table
                .keys
                .entry(keys.get_str("constraint_name")?)
                .or_insert_with(|| (role, Vec::new()))
                .1
                .push((keys.get_i64("ordinal_position")?, keys.get_str("column_name")?));
        }
    }

    let mut tables = Vec::with_capacity(pending.len());
    for (_, mut table) in pending {
        table.columns.sort_by_key(|(ordinal, _)| *ordinal);
        let indexes = table
            .keys
            .into_iter()
            .map(|(name, (role, mut parts))| {
                parts.sort_by_key(|(ordinal, _)| *ordinal);
                let names: Vec<&str> = parts.iter().map(|(_, c)| c.as_str()).collect();
                let mut index = Index::new(role, &names);
                index.name = Some(name);
                node(index)
            })
            .collect();
        let name = TableName::new(
            (!table.key.schema.is_empty()).then_some(table.key.schema.as_str()),
            table.key.table.clone(),
        );
        let columns = table.columns.into_iter().map(|(_, c)| node(c)).collect();
        tables.push(node(Table::new(name, columns, indexes, Vec::new())?));
    }
    debug!(tables = tables.len(), "metadata loaded");
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::table;

    fn orders() -> Node {
        table(Some("dbo"), "Orders")
            .column("Id", SqlType::of(TypeKind::Int), false)
            .column("UserId", SqlType::of(TypeKind::Int), false)
            .primary_key(&["Id"], true)
            .foreign_key(&["UserId"], TableName::new(Some("dbo"), "Users"), &["Id"])
            .build()
            .unwrap()
    }

    fn users() -> Node {
        table(Some("dbo"), "Users")
            .column("Id", SqlType::of(TypeKind::Int), false)
            .primary_key(&["Id"], true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_back_references_are_memoized() {
        let catalog = Catalog::from_tables([users(), orders()]).unwrap();
        let key = ColumnKey::new("dbo", "Users", "Id");
        let refs = catalog.referencing_columns(&key);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].table, TableKey::new("dbo", "Orders"));
        assert_eq!(refs[0].columns, vec!["UserId"]);
        catalog.referencing_columns(&key);
        assert_eq!(catalog.computations(), 1);
        assert!(catalog
            .referencing_columns(&ColumnKey::new("dbo", "Orders", "Id"))
            .is_empty());
        assert_eq!(catalog.computations(), 2);
    }

    #[test]
    fn test_duplicate_primary_key_name_rejected() {
        let mut first = Catalog::new();
        first.add_table(users()).unwrap();
        let mut second = Catalog::new();
        let people = TableName::new(Some("dbo"), "People");
        let id = Column::new(Some(node(people.clone())), "Id", SqlType::of(TypeKind::Int), false);
        // explicitly reuses the derived name of Users' key
        let mut pk = Index::new(IndexRole::PrimaryKey, &["Id"]);
        pk.name = Some("PK_dbo_Users".to_string());
        let clash = node(Table::new(people, vec![node(id)], vec![node(pk)], Vec::new()).unwrap());
        second.add_table(clash).unwrap();
        let err = first.merge(second).unwrap_err();
        assert!(err.to_string().contains("PK_dbo_Users"), "{}", err);
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("nvarchar", Some(-1), None, None).unwrap().size, None);
        assert_eq!(parse_type("char", None, None, None).unwrap().size, Some(1));
        assert_eq!(parse_type("numeric", None, Some(10), Some(2)).unwrap().scale, Some(2));
        assert!(parse_type("geometry", None, None, None).is_err());
    }

    #[test]
    fn test_load_tables_from_rows() {
        let row = |table: &str, column: &str, ordinal: i64, ty: &str, nullable: &str| {
            vec![
                Scalar::from("dbo"),
                Scalar::from(table),
                Scalar::from(column),
                Scalar::Int(ordinal),
                Scalar::from(ty),
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
                Scalar::from(nullable),
            ]
        };
        let mut columns = ScalarRows::new(
            COLUMN_FIELDS,
            vec![
                row("Users", "Name", 2, "text", "YES"),
                row("Users", "Id", 1, "int", "NO"),
            ],
        );
        let mut keys = ScalarRows::new(
            KEY_FIELDS,
            vec![vec![
                Scalar::from("dbo"),
                Scalar::from("Users"),
                Scalar::from("PK_Users"),
                Scalar::from("PRIMARY KEY"),
                Scalar::from("Id"),
                Scalar::Int(1),
            ]],
        );
        let tables = load_tables(&mut columns, Some(&mut keys)).unwrap();
        assert_eq!(tables.len(), 1);
        let table = tables[0].as_table().unwrap();
        let names: Vec<&str> = table
            .columns
            .iter()
            .filter_map(|c| c.as_column())
            .map(|c| c.name_str())
            .collect();
        assert_eq!(names, vec!["Id", "Name"]);
        assert_eq!(table.primary_key().unwrap().name.as_deref(), Some("PK_Users"));
        assert!(!table.column("Id").unwrap().nullable);
    }

    #[test]
    fn test_columns_query_renders() {
        let sql = crate::generate(&columns_query(Some("dbo")), crate::DialectType::PostgreSQL).unwrap();
        assert!(sql.starts_with(r#"SELECT "c"."table_schema", "c"."table_name""#), "{}", sql);
        assert!(sql.contains(r#"FROM "information_schema"."columns" AS "c" WHERE "c"."table_schema" = 'dbo'"#), "{}", sql);
    }
}
