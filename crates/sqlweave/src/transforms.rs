//! SQL AST Transforms
//!
//! Statement-level rewrites for dialect compatibility. The main one turns a
//! MERGE over an inline VALUES source into a batch of plain statements over a
//! staging temp table, for dialects without native MERGE:
//!
//! 1. create the staging table with the source columns the MERGE reads
//! 2. insert the source rows into it
//! 3. WHEN MATCHED: UPDATE / DELETE the target joined to staging on the ON predicate
//! 4. WHEN NOT MATCHED [BY TARGET]: INSERT staged rows with no `EXISTS` match in the target
//! 5. WHEN NOT MATCHED BY SOURCE: UPDATE / DELETE target rows with no `EXISTS` match in staging
//! 6. drop the staging table
//!
//! The staging table is referenced through the MERGE source alias, so every
//! column of the original statement keeps resolving without being rewritten.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast_transforms::get_table_names;
use crate::dialects::{Dialect, DialectType};
use crate::error::{Error, Result};
use crate::expressions::*;
use crate::helper::find_new_name;
use crate::traversal::ExpressionWalk;

fn alias_id(n: &Node) -> Option<i64> {
    n.as_alias().map(|a| a.id)
}

/// Name of a column read through `alias`
fn column_through<'a>(n: &'a Node, alias: i64) -> Option<&'a str> {
    match n.as_ref() {
        Expression::Column(c) if c.source.as_ref().and_then(alias_id) == Some(alias) => {
            Some(c.name_str())
        }
        _ => None,
    }
}

/// `(target column, source column)` pairs of an equi-join ON predicate
fn key_pairs(on: &Node, target: i64, source: i64) -> Result<Vec<(String, String)>> {
    let terms: Vec<&Node> = match on.as_ref() {
        Expression::And(and) => and.operands.iter().collect(),
        _ => vec![on],
    };
    if terms.is_empty() {
        return Err(Error::rewrite("MERGE ON clause has no key equality"));
    }
    terms
        .into_iter()
        .map(|term| match term.as_ref() {
            Expression::Binary(b) if b.op == BinaryOperator::Eq => {
                let pair = match (column_through(&b.left, target), column_through(&b.right, source)) {
                    (Some(t), Some(s)) => Some((t, s)),
                    _ => match (column_through(&b.right, target), column_through(&b.left, source)) {
                        (Some(t), Some(s)) => Some((t, s)),
                        _ => None,
                    },
                };
                pair.map(|(t, s)| (t.to_string(), s.to_string())).ok_or_else(|| {
                    Error::rewrite(
                        "MERGE ON equality must compare a target column with a source column",
                    )
                })
            }
            other => Err(Error::rewrite(format!(
                "MERGE ON clause must be a conjunction of column equalities, found {}",
                other.type_tag()
            ))),
        })
        .collect()
}

fn conjoin(mut terms: Vec<Node>) -> Node {
    if terms.len() == 1 {
        return terms.remove(0);
    }
    node(And { operands: terms })
}

/// `SELECT 1 FROM relation WHERE condition`
fn probe(relation: Node, condition: Node) -> Node {
    node(Select {
        columns: vec![node(Literal::new(1))],
        from: Some(relation),
        where_clause: Some(condition),
        group_by: vec![],
        having: None,
        order_by: vec![],
        distinct: false,
        limit: None,
        offset: None,
    })
}

fn not_exists(relation: Node, condition: Node) -> Node {
    node(Not {
        operand: node(Exists {
            query: probe(relation, condition),
        }),
    })
}

fn with_condition(base: Node, condition: &Option<Node>) -> Node {
    match condition {
        Some(extra) => conjoin(vec![base, extra.clone()]),
        None => base,
    }
}

fn assigned_columns(action: &Node) -> Vec<&str> {
    match action.as_ref() {
        Expression::MergeUpdate(update) => update
            .assignments
            .iter()
            .filter_map(|a| match a.as_ref() {
                Expression::Assignment(a) => match a.column.as_ref() {
                    Expression::Column(c) => Some(c.name_str()),
                    Expression::Name(n) => Some(n.value.as_str()),
                    _ => None,
                },
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// UPDATE / DELETE of the target for a matched or not-matched-by-source branch
fn branch_statement(
    action: &Node,
    target: &Node,
    from: Vec<Node>,
    condition: Node,
) -> Result<Node> {
    match action.as_ref() {
        Expression::MergeUpdate(update) => Ok(node(Update {
            target: target.clone(),
            assignments: update.assignments.clone(),
            from,
            where_clause: Some(condition),
            output: None,
        })),
        Expression::MergeDelete(_) => Ok(node(Delete {
            target: target.clone(),
            from,
            where_clause: Some(condition),
            output: None,
        })),
        other => Err(Error::rewrite(format!(
            "{} is not a valid action for this MERGE branch",
            other.type_tag()
        ))),
    }
}

/// Rewrite a MERGE into an equivalent batch of plain statements.
///
/// The source must be an inline VALUES relation and the ON clause a
/// conjunction of `target.col = source.col` equalities. Two combinations are
/// rejected because the sequential statements would see each other's effects:
/// a matched DELETE together with a not-matched INSERT, and a matched UPDATE
/// of an ON key column together with another branch.
pub fn emulate_merge(merge: &Node) -> Result<Node> {
    let Expression::Merge(m) = merge.as_ref() else {
        return Err(Error::rewrite(format!(
            "expected a Merge, found {}",
            merge.type_tag()
        )));
    };
    if m.output.is_some() {
        return Err(Error::rewrite("MERGE with OUTPUT cannot be emulated"));
    }
    let Expression::TableRef(target_ref) = m.target.as_ref() else {
        return Err(Error::rewrite("MERGE target must be a table reference"));
    };
    let target_alias = target_ref
        .alias
        .as_ref()
        .and_then(alias_id)
        .ok_or_else(|| Error::rewrite("MERGE target needs an alias"))?;
    let Expression::ValuesTable(values) = m.source.as_ref() else {
        return Err(Error::rewrite(format!(
            "MERGE source must be an inline VALUES list, found {}",
            m.source.type_tag()
        )));
    };
    m.source.validate()?;
    let source_alias_node = values.alias.clone();
    let source_alias = alias_id(&source_alias_node)
        .ok_or_else(|| Error::rewrite("MERGE source alias is not an Alias"))?;

    let pairs = key_pairs(&m.on, target_alias, source_alias)?;
    let target_keys: HashSet<&str> = pairs.iter().map(|(t, _)| t.as_str()).collect();

    let matched = match m.when_matched.as_deref() {
        Some(Expression::WhenMatched(w)) => Some(w),
        Some(other) => {
            return Err(Error::rewrite(format!("when_matched holds {}", other.type_tag())))
        }
        None => None,
    };
    let not_matched = match m.when_not_matched.as_deref() {
        Some(Expression::WhenNotMatched(w)) => Some(w),
        Some(other) => {
            return Err(Error::rewrite(format!("when_not_matched holds {}", other.type_tag())))
        }
        None => None,
    };
    let by_source = match m.when_not_matched_by_source.as_deref() {
        Some(Expression::WhenNotMatchedBySource(w)) => Some(w),
        Some(other) => {
            return Err(Error::rewrite(format!(
                "when_not_matched_by_source holds {}",
                other.type_tag()
            )))
        }
        None => None,
    };

    if let Some(w) = matched {
        if matches!(w.action.as_ref(), Expression::MergeDelete(_)) && not_matched.is_some() {
            return Err(Error::rewrite(
                "MERGE with a matched DELETE and a not-matched INSERT cannot be emulated",
            ));
        }
        let changes_key = assigned_columns(&w.action)
            .iter()
            .any(|c| target_keys.contains(c));
        if changes_key && (not_matched.is_some() || by_source.is_some()) {
            return Err(Error::rewrite(
                "MERGE that updates an ON key column cannot be emulated together with other branches",
            ));
        }
    }

    // source columns the statement reads, in VALUES column order
    let declared: Vec<&str> = values
        .columns
        .iter()
        .map(|c| name_text(c).unwrap_or_default())
        .collect();
    let mut referenced: HashMap<&str, &Column> = HashMap::new();
    for n in merge.dfs() {
        if let Expression::Column(c) = n.as_ref() {
            if c.source.as_ref().and_then(alias_id) == Some(source_alias) {
                if !declared.contains(&c.name_str()) {
                    return Err(Error::rewrite(format!(
                        "'{}' is not a column of the MERGE source",
                        c.name_str()
                    )));
                }
                referenced.entry(c.name_str()).or_insert(c);
            }
        }
    }
    let staged: Vec<(usize, &str)> = declared
        .iter()
        .enumerate()
        .filter(|(_, name)| referenced.contains_key(*name))
        .map(|(i, name)| (i, *name))
        .collect();

    // staged column types follow the target column they feed where known
    let mut feeds: HashMap<&str, &str> = pairs
        .iter()
        .map(|(t, s)| (s.as_str(), t.as_str()))
        .collect();
    if let Some(w) = not_matched {
        if let Expression::MergeInsert(insert) = w.action.as_ref() {
            for (column, value) in insert.columns.iter().zip(&insert.values) {
                if let (Some(target_column), Some(source_column)) =
                    (name_text(column), column_through(value, source_alias))
                {
                    feeds.entry(source_column).or_insert(target_column);
                }
            }
        }
    }
    let target_table = match target_ref.table.as_ref() {
        Expression::Table(t) => Some(t),
        _ => None,
    };
    let table_name = match target_ref.table.as_ref() {
        Expression::Table(t) => t.table_name().and_then(|n| name_text(&n.name)),
        Expression::TableName(n) => name_text(&n.name),
        Expression::TempTable(t) => Some(t.name_str()),
        _ => None,
    }
    .unwrap_or("target");

    let staging_columns = staged
        .iter()
        .map(|(_, name)| {
            let declared_type = feeds
                .get(name)
                .and_then(|target| target_table.and_then(|t| t.column(target)))
                .map(|c| c.data_type.clone());
            let data_type = match (declared_type, referenced.get(name)) {
                (Some(ty), _) => ty,
                (None, Some(column)) => column.data_type.clone(),
                (None, None) => SqlType::of(TypeKind::NVarChar),
            };
            node(Column::new(None, *name, data_type, true))
        })
        .collect();
    let taken: HashSet<String> = get_table_names(merge).into_iter().collect();
    let staging_name = find_new_name(&taken, &format!("merge_{}", table_name));
    let staging = node(TempTable::new(staging_name, staging_columns)?);
    let staging_ref = node(TableRef {
        table: staging.clone(),
        alias: Some(source_alias_node),
    });

    debug!(
        table = table_name,
        staged = staged.len(),
        rows = values.rows.len(),
        "emulating MERGE"
    );

    let mut rows = Vec::with_capacity(values.rows.len());
    for row in &values.rows {
        let Expression::Row(r) = row.as_ref() else {
            return Err(Error::rewrite("MERGE source rows must be Row nodes"));
        };
        let staged_values = staged
            .iter()
            .map(|(i, name)| {
                r.values.get(*i).cloned().ok_or_else(|| {
                    Error::rewrite(format!("MERGE source row has no value for '{}'", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(node(Row {
            values: staged_values,
        }));
    }

    let mut statements = vec![
        node(CreateTable {
            table: staging.clone(),
            if_not_exists: false,
        }),
        checked(Insert {
            table: staging.clone(),
            columns: staged.iter().map(|(_, name)| node(Name::new(*name))).collect(),
            source: node(Values { rows }),
            output: None,
        })?,
    ];

    if let Some(w) = matched {
        statements.push(branch_statement(
            &w.action,
            &m.target,
            vec![staging_ref.clone()],
            with_condition(m.on.clone(), &w.condition),
        )?);
    }

    if let Some(w) = not_matched {
        let Expression::MergeInsert(insert) = w.action.as_ref() else {
            return Err(Error::rewrite(format!(
                "{} is not a valid action for WHEN NOT MATCHED",
                w.action.type_tag()
            )));
        };
        let condition = with_condition(not_exists(m.target.clone(), m.on.clone()), &w.condition);
        let query = node(Select {
            columns: insert.values.clone(),
            from: Some(staging_ref.clone()),
            where_clause: Some(condition),
            group_by: vec![],
            having: None,
            order_by: vec![],
            distinct: false,
            limit: None,
            offset: None,
        });
        statements.push(checked(Insert {
            table: target_ref.table.clone(),
            columns: insert.columns.clone(),
            source: query,
            output: None,
        })?);
    }

    if let Some(w) = by_source {
        statements.push(branch_statement(
            &w.action,
            &m.target,
            vec![],
            with_condition(not_exists(staging_ref.clone(), m.on.clone()), &w.condition),
        )?);
    }

    statements.push(node(DropTable {
        table: staging,
        if_exists: false,
    }));
    Ok(node(Batch { statements }))
}

/// Render a MERGE natively where the dialect supports it, emulated otherwise
pub fn merge_for_dialect(merge: &Node, dialect_type: DialectType) -> Result<String> {
    let dialect = Dialect::get(dialect_type);
    if dialect.config().supports_merge {
        dialect.generate(merge)
    } else {
        dialect.generate(&emulate_merge(merge)?)
    }
}
