//! One tree, three dialects
//!
//! Rendering differences between dialects must be exactly the documented
//! ones: quoting, type names, identity syntax, index placement and feature
//! support.

mod common;

use common::{orders, users, ORDERS, USERS};
use sqlweave::builder::*;
use sqlweave::expressions::{SqlType, TypeKind};
use sqlweave::{generate, Dialect, DialectType, Error, GeneratorConfig};

#[test]
fn test_create_table_tsql() {
    assert_eq!(
        generate(&create_table(USERS.clone(), false), DialectType::TSQL).unwrap(),
        "CREATE TABLE [dbo].[Users] ([Id] INT IDENTITY(1, 1) NOT NULL, \
         [Name] NVARCHAR(100) NOT NULL, [Email] NVARCHAR(200) NULL, \
         CONSTRAINT [PK_dbo_Users] PRIMARY KEY CLUSTERED ([Id]));\n\
         CREATE UNIQUE INDEX [UX_dbo_Users_Email] ON [dbo].[Users] ([Email])"
    );
}

#[test]
fn test_create_table_mysql() {
    assert_eq!(
        generate(&create_table(USERS.clone(), false), DialectType::MySQL).unwrap(),
        "CREATE TABLE `Users` (`Id` INT NOT NULL AUTO_INCREMENT, \
         `Name` VARCHAR(100) NOT NULL, `Email` VARCHAR(200) NULL, \
         CONSTRAINT `PK_Users` PRIMARY KEY (`Id`), UNIQUE INDEX `UX_Users_Email` (`Email`))"
    );
}

#[test]
fn test_create_table_postgres() {
    assert_eq!(
        generate(&create_table(USERS.clone(), false), DialectType::PostgreSQL).unwrap(),
        "CREATE TABLE \"public\".\"Users\" (\"Id\" INT NOT NULL GENERATED BY DEFAULT AS IDENTITY, \
         \"Name\" VARCHAR(100) NOT NULL, \"Email\" VARCHAR(200) NULL, \
         CONSTRAINT \"PK_public_Users\" PRIMARY KEY (\"Id\"));\n\
         CREATE UNIQUE INDEX \"UX_public_Users_Email\" ON \"public\".\"Users\" (\"Email\");\n\
         CLUSTER \"public\".\"Users\" USING \"PK_public_Users\""
    );
}

#[test]
fn test_constraint_names_are_stable() {
    for dialect in DialectType::ALL {
        let first = generate(&create_table(ORDERS.clone(), false), dialect).unwrap();
        let second = generate(&create_table(ORDERS.clone(), false), dialect).unwrap();
        assert_eq!(first, second);
    }
    let tsql = generate(&create_table(ORDERS.clone(), false), DialectType::TSQL).unwrap();
    assert!(
        tsql.contains(
            "CONSTRAINT [FK_dbo_Orders_Users_UserId] FOREIGN KEY ([UserId]) REFERENCES [dbo].[Users] ([Id])"
        ),
        "{}",
        tsql
    );
}

#[test]
fn test_table_without_keys_has_no_constraint_clauses() {
    let notes = table(Some("dbo"), "Notes")
        .column("Id", SqlType::of(TypeKind::Int), false)
        .build()
        .unwrap();
    let expected = [
        (DialectType::TSQL, "CREATE TABLE [dbo].[Notes] ([Id] INT NOT NULL)"),
        (DialectType::MySQL, "CREATE TABLE `Notes` (`Id` INT NOT NULL)"),
        (
            DialectType::PostgreSQL,
            "CREATE TABLE \"public\".\"Notes\" (\"Id\" INT NOT NULL)",
        ),
    ];
    for (dialect, sql) in expected {
        assert_eq!(generate(&create_table(notes.clone(), false), dialect).unwrap(), sql);
    }
}

#[test]
fn test_guarded_create_uses_object_id_on_tsql() {
    let sql = generate(&create_table(USERS.clone(), true), DialectType::TSQL).unwrap();
    assert!(
        sql.starts_with("IF OBJECT_ID(N'[dbo].[Users]', N'U') IS NULL\nBEGIN\nCREATE TABLE [dbo].[Users] ("),
        "{}",
        sql
    );
    assert!(sql.ends_with(";\nEND"), "{}", sql);

    let pg = generate(&create_table(USERS.clone(), true), DialectType::PostgreSQL).unwrap();
    assert!(pg.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"Users\""), "{}", pg);
    assert!(pg.contains("CREATE UNIQUE INDEX IF NOT EXISTS"), "{}", pg);
}

#[test]
fn test_paging_per_dialect() {
    let u = users();
    let query = select([u.col("Id")])
        .from(&u)
        .order_by([u.col("Id")])
        .limit(5)
        .offset(10)
        .build();
    let tsql = generate(&query, DialectType::TSQL).unwrap();
    assert!(tsql.ends_with("ORDER BY [u].[Id] OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"), "{}", tsql);
    let mysql = generate(&query, DialectType::MySQL).unwrap();
    assert!(mysql.ends_with("ORDER BY `u`.`Id` LIMIT 5 OFFSET 10"), "{}", mysql);

    let top = select([u.col("Id")]).from(&u).limit(3).build();
    assert!(generate(&top, DialectType::TSQL).unwrap().starts_with("SELECT TOP 3 [u].[Id]"));
}

#[test]
fn test_unsupported_features_fail_with_dialect_name() {
    let u = users();
    let o = orders();
    let full = select([u.col("Id")])
        .from(&u)
        .full_join(&o, o.col("UserId").eq(u.col("Id")))
        .build();
    let err = generate(&full, DialectType::MySQL).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(err.to_string(), "Unsupported: FULL JOIN is not supported in MySQL");
    assert!(generate(&full, DialectType::PostgreSQL).is_ok());

    let returning = delete(&u).output([u.col("Id")]).build().unwrap();
    assert!(matches!(
        generate(&returning, DialectType::MySQL),
        Err(Error::Unsupported { .. })
    ));
    assert_eq!(
        generate(&returning, DialectType::PostgreSQL).unwrap(),
        "DELETE FROM \"public\".\"Users\" AS \"u\" RETURNING \"Id\""
    );
    assert_eq!(
        generate(&returning, DialectType::TSQL).unwrap(),
        "DELETE [u] OUTPUT DELETED.[Id] FROM [dbo].[Users] AS [u]"
    );

    let guarded = if_(exists(select([lit(1)]).from(&u)), vec![delete(&u).build().unwrap()], vec![]);
    assert!(generate(&guarded, DialectType::PostgreSQL).unwrap_err().is_unsupported());
}

#[test]
fn test_function_spelling_follows_dialect() {
    let length = func("LEN", [lit("abc")]).into_node();
    assert_eq!(generate(&length, DialectType::TSQL).unwrap(), "LEN(N'abc')");
    assert_eq!(generate(&length, DialectType::MySQL).unwrap(), "CHAR_LENGTH('abc')");
    assert_eq!(generate(&length, DialectType::PostgreSQL).unwrap(), "LENGTH('abc')");
}

#[test]
fn test_config_loaded_from_json_overrides_schema() {
    let config = GeneratorConfig::from_json(r#"{"schema_map": {"dbo": "sales"}}"#).unwrap();
    let sql = Dialect::get(DialectType::TSQL)
        .with_config(config)
        .generate(&create_table(USERS.clone(), false))
        .unwrap();
    assert!(sql.starts_with("CREATE TABLE [sales].[Users]"), "{}", sql);
    assert!(sql.contains("[PK_sales_Users]"), "{}", sql);
}

#[test]
fn test_dialect_names() {
    assert_eq!("mssql".parse::<DialectType>().unwrap(), DialectType::TSQL);
    assert_eq!("PostgreSQL".parse::<DialectType>().unwrap(), DialectType::PostgreSQL);
    assert!("oracle".parse::<DialectType>().is_err());
    let sql = sqlweave::generate_by_name(&lit(true).into_node(), "mysql").unwrap();
    assert_eq!(sql, "TRUE");
}
