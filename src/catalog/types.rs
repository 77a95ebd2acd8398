//! Declared column types mapped to the target's type names.
//!
//! The names produced here drive literal rendering (`NUMBER` stays bare,
//! `DATE`/`TIMESTAMP` become conversion calls, LOBs are not exported).

use super::Dialect;

pub fn map_type(sql_type: &str, dialect: Dialect) -> String {
    let lower = sql_type.to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();
    // Trailing words such as `GENERATED ALWAYS AS IDENTITY` are not part of the type.
    let first_word = base.split_whitespace().next().unwrap_or(base);

    [base, first_word]
        .into_iter()
        .find_map(|candidate| lookup(candidate, dialect))
        .map(str::to_string)
        .unwrap_or_else(|| first_word.to_uppercase())
}

fn lookup(base: &str, dialect: Dialect) -> Option<&'static str> {
    let mapped = match dialect {
        Dialect::PostgreSQL => map_postgres_type(base),
        Dialect::MySQL => map_mysql_type(base),
        _ => None,
    };
    mapped.or_else(|| map_generic_type(base))
}

fn map_postgres_type(base: &str) -> Option<&'static str> {
    let mapped = match base {
        "int4" | "int8" | "int2" | "serial4" | "serial8" | "serial2" | "smallserial"
        | "bigserial" | "serial" => "NUMBER",
        "float4" | "float8" => "NUMBER",
        "timestamptz" | "timestamp with time zone" | "timestamp without time zone" => {
            "TIMESTAMP"
        }
        "bytea" => "BLOB",
        "text" | "uuid" | "json" | "jsonb" => "VARCHAR2",
        t if t.ends_with("[]") => "VARCHAR2",
        _ => return None,
    };
    Some(mapped)
}

fn map_mysql_type(base: &str) -> Option<&'static str> {
    let mapped = match base {
        "tinyint" | "mediumint" => "NUMBER",
        "datetime" => "DATE",
        "longtext" | "mediumtext" => "CLOB",
        "tinytext" | "text" | "enum" | "set" | "json" => "VARCHAR2",
        "blob" | "longblob" | "mediumblob" | "tinyblob" | "binary" | "varbinary" => "BLOB",
        _ => return None,
    };
    Some(mapped)
}

fn map_generic_type(base: &str) -> Option<&'static str> {
    let mapped = match base {
        "int" | "integer" | "bigint" | "smallint" | "decimal" | "numeric" | "number"
        | "serial" | "boolean" | "bool" => "NUMBER",
        "real" | "float" | "double" | "double precision" => "FLOAT",
        "binary_float" => "BINARY_FLOAT",
        "binary_double" => "BINARY_DOUBLE",
        "varchar" | "varchar2" | "nvarchar2" | "character varying" | "text" => "VARCHAR2",
        "char" | "character" | "nchar" => "CHAR",
        "date" | "datetime" => "DATE",
        "timestamp" => "TIMESTAMP",
        "clob" | "nclob" => "CLOB",
        "blob" | "raw" | "long raw" => "BLOB",
        _ => return None,
    };
    Some(mapped)
}
