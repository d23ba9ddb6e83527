//! MERGE emulation equivalence
//!
//! The emulated statement batch runs on a small in-memory evaluator and must
//! leave the target table exactly as applying the MERGE itself does.

use std::collections::{BTreeMap, HashMap};

use sqlweave::builder::*;
use sqlweave::expressions::*;
use sqlweave::{emulate_merge, merge_for_dialect, DialectType, Node, Scalar};

type Row = BTreeMap<String, Scalar>;
/// Current row of every relation in scope, keyed by alias id
type Env = HashMap<i64, Row>;

fn relation_name(n: &Node) -> String {
    match n.as_ref() {
        Expression::Table(t) => name_text(&t.table_name().expect("table name").name)
            .expect("name")
            .to_string(),
        Expression::TempTable(t) => t.name_str().to_string(),
        Expression::TableName(t) => name_text(&t.name).expect("name").to_string(),
        Expression::TableRef(r) => relation_name(&r.table),
        other => panic!("{} is not a relation", other.type_tag()),
    }
}

fn alias_of(n: &Node) -> i64 {
    match n.as_ref() {
        Expression::TableRef(r) => r.alias.as_ref().and_then(|a| a.as_alias()).expect("alias").id,
        Expression::ValuesTable(v) => v.alias.as_alias().expect("alias").id,
        other => panic!("{} has no alias", other.type_tag()),
    }
}

fn names(nodes: &[Node]) -> Vec<String> {
    nodes
        .iter()
        .map(|n| name_text(n).expect("name").to_string())
        .collect()
}

fn truthy(value: &Scalar) -> bool {
    matches!(value, Scalar::Bool(true))
}

#[derive(Default)]
struct Database {
    tables: HashMap<String, Vec<Row>>,
}

impl Database {
    fn eval(&self, expr: &Node, env: &Env) -> Scalar {
        match expr.as_ref() {
            Expression::Literal(l) => l.value.clone(),
            Expression::Column(c) => {
                let alias = c
                    .source
                    .as_ref()
                    .and_then(|s| s.as_alias())
                    .expect("qualified column")
                    .id;
                env[&alias].get(c.name_str()).cloned().unwrap_or(Scalar::Null)
            }
            Expression::Binary(b) => {
                let (left, right) = (self.eval(&b.left, env), self.eval(&b.right, env));
                let known = !left.is_null() && !right.is_null();
                match b.op {
                    BinaryOperator::Eq => Scalar::Bool(known && left == right),
                    BinaryOperator::NotEq => Scalar::Bool(known && left != right),
                    op => panic!("operator {} is not evaluated", op),
                }
            }
            Expression::And(a) => Scalar::Bool(a.operands.iter().all(|o| truthy(&self.eval(o, env)))),
            Expression::Or(o) => Scalar::Bool(o.operands.iter().any(|o| truthy(&self.eval(o, env)))),
            Expression::Not(n) => Scalar::Bool(!truthy(&self.eval(&n.operand, env))),
            Expression::Exists(e) => Scalar::Bool(!self.query(&e.query, env).is_empty()),
            other => panic!("{} is not evaluated", other.type_tag()),
        }
    }

    fn holds(&self, condition: Option<&Node>, env: &Env) -> bool {
        condition.map_or(true, |c| truthy(&self.eval(c, env)))
    }

    fn scan(&self, relation: &Node) -> (i64, Vec<Row>) {
        let rows = self
            .tables
            .get(&relation_name(relation))
            .cloned()
            .expect("relation exists");
        (alias_of(relation), rows)
    }

    fn query(&self, query: &Node, outer: &Env) -> Vec<Vec<Scalar>> {
        let select = query.as_select().expect("a SELECT");
        let (alias, rows) = self.scan(select.from.as_ref().expect("a FROM"));
        rows.into_iter()
            .filter_map(|row| {
                let mut env = outer.clone();
                env.insert(alias, row);
                self.holds(select.where_clause.as_ref(), &env).then(|| {
                    select.columns.iter().map(|c| self.eval(c, &env)).collect()
                })
            })
            .collect()
    }

    /// Environment of the first joined row satisfying `condition`
    fn first_match(&self, joined: &[(i64, Vec<Row>)], env: Env, condition: Option<&Node>) -> Option<Env> {
        match joined {
            [] => self.holds(condition, &env).then_some(env),
            [(alias, rows)] => rows.iter().find_map(|row| {
                let mut env = env.clone();
                env.insert(*alias, row.clone());
                self.holds(condition, &env).then_some(env)
            }),
            _ => panic!("at most one joined relation is evaluated"),
        }
    }

    fn assign(&self, assignments: &[Node], mut row: Row, env: &Env) -> Row {
        for assignment in assignments {
            let Expression::Assignment(a) = assignment.as_ref() else {
                panic!("expected an assignment");
            };
            let column = a.column.as_column().expect("column target").name_str();
            row.insert(column.to_string(), self.eval(&a.value, env));
        }
        row
    }

    fn execute(&mut self, statement: &Node) {
        match statement.as_ref() {
            Expression::Batch(b) => {
                for s in &b.statements {
                    self.execute(s);
                }
            }
            Expression::CreateTable(c) => {
                self.tables.insert(relation_name(&c.table), Vec::new());
            }
            Expression::DropTable(d) => {
                self.tables.remove(&relation_name(&d.table));
            }
            Expression::Insert(i) => {
                let columns = names(&i.columns);
                let rows: Vec<Vec<Scalar>> = match i.source.as_ref() {
                    Expression::Values(v) => v
                        .rows
                        .iter()
                        .map(|r| match r.as_ref() {
                            Expression::Row(r) => {
                                r.values.iter().map(|e| self.eval(e, &Env::new())).collect()
                            }
                            other => panic!("{} is not a row", other.type_tag()),
                        })
                        .collect(),
                    _ => self.query(&i.source, &Env::new()),
                };
                let table = self
                    .tables
                    .get_mut(&relation_name(&i.table))
                    .expect("insert target exists");
                for row in rows {
                    table.push(columns.iter().cloned().zip(row).collect());
                }
            }
            Expression::Update(u) => {
                let (alias, rows) = self.scan(&u.target);
                let joined: Vec<_> = u.from.iter().map(|f| self.scan(f)).collect();
                let updated = rows
                    .into_iter()
                    .map(|row| {
                        let env = Env::from([(alias, row.clone())]);
                        match self.first_match(&joined, env, u.where_clause.as_ref()) {
                            Some(env) => self.assign(&u.assignments, row, &env),
                            None => row,
                        }
                    })
                    .collect();
                self.tables.insert(relation_name(&u.target), updated);
            }
            Expression::Delete(d) => {
                let (alias, rows) = self.scan(&d.target);
                let joined: Vec<_> = d.from.iter().map(|f| self.scan(f)).collect();
                let kept = rows
                    .into_iter()
                    .filter(|row| {
                        let env = Env::from([(alias, row.clone())]);
                        self.first_match(&joined, env, d.where_clause.as_ref()).is_none()
                    })
                    .collect();
                self.tables.insert(relation_name(&d.target), kept);
            }
            Expression::Merge(m) => self.merge(m),
            other => panic!("{} is not executed", other.type_tag()),
        }
    }

    /// Native MERGE semantics: every branch sees the table as it was before
    fn merge(&mut self, m: &Merge) {
        let target_alias = alias_of(&m.target);
        let Expression::ValuesTable(values) = m.source.as_ref() else {
            panic!("VALUES source expected");
        };
        let source_alias = alias_of(&m.source);
        let columns = names(&values.columns);
        let source_rows: Vec<Row> = values
            .rows
            .iter()
            .map(|r| match r.as_ref() {
                Expression::Row(r) => columns
                    .iter()
                    .cloned()
                    .zip(r.values.iter().map(|e| self.eval(e, &Env::new())))
                    .collect(),
                other => panic!("{} is not a row", other.type_tag()),
            })
            .collect();

        let apply = |db: &Database, action: &Node, row: Row, env: &Env| match action.as_ref() {
            Expression::MergeUpdate(u) => Some(db.assign(&u.assignments, row, env)),
            Expression::MergeDelete(_) => None,
            other => panic!("{} is not a row action", other.type_tag()),
        };

        let (_, target_rows) = self.scan(&m.target);
        let mut matched_sources = vec![false; source_rows.len()];
        let mut result = Vec::new();
        for row in target_rows {
            let hit = source_rows.iter().enumerate().find_map(|(i, source)| {
                let env = Env::from([(target_alias, row.clone()), (source_alias, source.clone())]);
                truthy(&self.eval(&m.on, &env)).then_some((i, env))
            });
            let outcome = match hit {
                Some((i, env)) => {
                    matched_sources[i] = true;
                    match m.when_matched.as_deref() {
                        Some(Expression::WhenMatched(w)) if self.holds(w.condition.as_ref(), &env) => {
                            apply(self, &w.action, row, &env)
                        }
                        _ => Some(row),
                    }
                }
                None => {
                    let env = Env::from([(target_alias, row.clone())]);
                    match m.when_not_matched_by_source.as_deref() {
                        Some(Expression::WhenNotMatchedBySource(w))
                            if self.holds(w.condition.as_ref(), &env) =>
                        {
                            apply(self, &w.action, row, &env)
                        }
                        _ => Some(row),
                    }
                }
            };
            result.extend(outcome);
        }

        if let Some(Expression::WhenNotMatched(w)) = m.when_not_matched.as_deref() {
            let Expression::MergeInsert(insert) = w.action.as_ref() else {
                panic!("INSERT action expected");
            };
            let insert_columns = names(&insert.columns);
            for (source, matched) in source_rows.iter().zip(&matched_sources) {
                let env = Env::from([(source_alias, source.clone())]);
                if !matched && self.holds(w.condition.as_ref(), &env) {
                    result.push(
                        insert_columns
                            .iter()
                            .cloned()
                            .zip(insert.values.iter().map(|v| self.eval(v, &env)))
                            .collect(),
                    );
                }
            }
        }
        self.tables.insert(relation_name(&m.target), result);
    }
}

fn users_table() -> Node {
    table(Some("dbo"), "Users")
        .column("Id", SqlType::of(TypeKind::Int), false)
        .column("Name", node(SqlType::new(TypeKind::NVarChar, Some(50)).unwrap()), false)
        .column("Active", SqlType::of(TypeKind::Boolean), false)
        .primary_key(&["Id"], true)
        .build()
        .unwrap()
}

fn user(id: i64, name: &str, active: bool) -> Row {
    Row::from([
        ("Id".to_string(), Scalar::Int(id)),
        ("Name".to_string(), Scalar::from(name)),
        ("Active".to_string(), Scalar::Bool(active)),
    ])
}

fn seeded() -> Database {
    let mut db = Database::default();
    db.tables.insert(
        "Users".to_string(),
        vec![user(1, "a", true), user(2, "b", true), user(3, "c", true)],
    );
    db
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(|r| match r.get("Id") {
        Some(Scalar::Int(id)) => *id,
        _ => i64::MAX,
    });
    rows
}

fn assert_equivalent(merge: &Node) -> Vec<Row> {
    let mut native = seeded();
    native.execute(merge);
    let mut emulated = seeded();
    emulated.execute(&emulate_merge(merge).unwrap());

    assert_eq!(emulated.tables.len(), 1, "staging table was not dropped");
    let expected = sorted(native.tables["Users"].clone());
    assert_eq!(sorted(emulated.tables["Users"].clone()), expected);
    expected
}

#[test]
fn test_upsert_with_source_absent_update() {
    let t = table_ref(users_table());
    let s = values_table(vec![vec![lit(1), lit("A")], vec![lit(4), lit("D")]], &["Id", "Name"], "s").unwrap();
    let merge = merge_into(&t, &s, t.col("Id").eq(s.col("Id")))
        .when_matched_update(None, vec![("Name", s.col("Name"))])
        .when_not_matched_insert(None, &["Id", "Name", "Active"], [s.col("Id"), s.col("Name"), lit(true)])
        .when_not_matched_by_source_update(None, vec![("Active", lit(false))])
        .build()
        .unwrap();

    let rows = assert_equivalent(&merge);
    assert_eq!(
        rows,
        vec![user(1, "A", true), user(2, "b", false), user(3, "c", false), user(4, "D", true)]
    );
}

#[test]
fn test_conditional_branches() {
    let t = table_ref(users_table());
    let s = values_table(
        vec![
            vec![lit(1), lit("a"), lit(true)],
            vec![lit(2), lit("B"), lit(true)],
            vec![lit(5), lit("E"), lit(false)],
            vec![lit(6), lit("F"), lit(true)],
        ],
        &["Id", "Name", "Keep"],
        "s",
    )
    .unwrap();
    let merge = merge_into(&t, &s, t.col("Id").eq(s.col("Id")))
        .when_matched_update(
            Some(t.col("Name").not_eq(s.col("Name"))),
            vec![("Name", s.col("Name"))],
        )
        .when_not_matched_insert(
            Some(s.col("Keep").eq(lit(true))),
            &["Id", "Name", "Active"],
            [s.col("Id"), s.col("Name"), s.col("Keep")],
        )
        .when_not_matched_by_source_delete(None)
        .build()
        .unwrap();

    let rows = assert_equivalent(&merge);
    assert_eq!(rows, vec![user(1, "a", true), user(2, "B", true), user(6, "F", true)]);
}

#[test]
fn test_matched_delete() {
    let t = table_ref(users_table());
    let s = values_table(vec![vec![lit(2)]], &["Id"], "s").unwrap();
    let merge = merge_into(&t, &s, t.col("Id").eq(s.col("Id")))
        .when_matched_delete(None)
        .when_not_matched_by_source_update(Some(t.col("Id").eq(lit(3))), vec![("Active", lit(false))])
        .build()
        .unwrap();

    let rows = assert_equivalent(&merge);
    assert_eq!(rows, vec![user(1, "a", true), user(3, "c", false)]);
}

#[test]
fn test_emulated_batch_renders_for_dialects_without_merge() {
    let t = table_ref(users_table());
    let s = values_table(vec![vec![lit(1), lit("A")]], &["Id", "Name"], "s").unwrap();
    let merge = merge_into(&t, &s, t.col("Id").eq(s.col("Id")))
        .when_matched_update(None, vec![("Name", s.col("Name"))])
        .when_not_matched_insert(None, &["Id", "Name", "Active"], [s.col("Id"), s.col("Name"), lit(true)])
        .build()
        .unwrap();

    let mysql = merge_for_dialect(&merge, DialectType::MySQL).unwrap();
    assert!(mysql.starts_with("CREATE TEMPORARY TABLE `merge_Users`"), "{}", mysql);
    assert!(mysql.ends_with("DROP TEMPORARY TABLE `merge_Users`"), "{}", mysql);
    assert_eq!(mysql.matches(";\n").count(), 4, "{}", mysql);

    let pg = merge_for_dialect(&merge, DialectType::PostgreSQL).unwrap();
    assert!(pg.contains("NOT EXISTS"), "{}", pg);
    assert!(!pg.contains("MERGE"), "{}", pg);
}
