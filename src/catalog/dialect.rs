//! Dump dialects.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Pick from the dump's content
    #[default]
    Auto,
    Generic,
    PostgreSQL,
    MySQL,
    Oracle,
}

/// Tool banners, checked before type markers.
const BANNERS: &[(Dialect, &[&str])] = &[
    (
        Dialect::PostgreSQL,
        &["postgresql database dump", "pg_dump", "-- postgres"],
    ),
    (Dialect::MySQL, &["mysql dump", "mysqldump", "-- mysql"]),
    (Dialect::Oracle, &["sql developer", "-- oracle"]),
];

/// Types and functions only one dialect writes. First match wins.
const MARKERS: &[(Dialect, &[&str])] = &[
    (
        Dialect::Oracle,
        &["varchar2", ".nextval", "to_date(", "number(", "sysdate"],
    ),
    (
        Dialect::PostgreSQL,
        &["serial", "text[]", "::", "timestamptz", "nextval('"],
    ),
    (
        Dialect::MySQL,
        &["auto_increment", "tinyint", "engine=", "unsigned", "`"],
    ),
];

impl Dialect {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "generic" | "ansi" => Some(Self::Generic),
            "postgres" | "postgresql" | "pg" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "oracle" => Some(Self::Oracle),
            _ => None,
        }
    }

    pub fn detect(content: &str) -> Self {
        let lower = content.to_lowercase();
        first_match(&lower, BANNERS)
            .or_else(|| first_match(&lower, MARKERS))
            .unwrap_or(Self::Generic)
    }

    pub fn resolve(self, content: &str) -> Self {
        match self {
            Self::Auto => Self::detect(content),
            other => other,
        }
    }

    /// Whether string literals use backslash escapes.
    pub fn backslash_escapes(self) -> bool {
        self == Self::MySQL
    }
}

fn first_match(lower: &str, table: &[(Dialect, &[&str])]) -> Option<Dialect> {
    table
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(dialect, _)| *dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_beats_markers() {
        let sql = "-- PostgreSQL database dump\nCREATE TABLE t (name varchar2(10));";
        assert_eq!(Dialect::detect(sql), Dialect::PostgreSQL);
        let sql = "-- MySQL dump 10.13\nCREATE TABLE t (id INT);";
        assert_eq!(Dialect::detect(sql), Dialect::MySQL);
        assert!(Dialect::MySQL.backslash_escapes());
    }

    #[test]
    fn test_markers() {
        assert_eq!(
            Dialect::detect("CREATE TABLE orders (order_id NUMBER(10) PRIMARY KEY);"),
            Dialect::Oracle
        );
        assert_eq!(
            Dialect::detect("CREATE TABLE t (id bigserial, at timestamptz);"),
            Dialect::PostgreSQL
        );
        assert_eq!(
            Dialect::detect("CREATE TABLE `t` (id INT AUTO_INCREMENT);"),
            Dialect::MySQL
        );
        assert_eq!(
            Dialect::detect("CREATE TABLE t (id INTEGER PRIMARY KEY);"),
            Dialect::Generic
        );
    }

    #[test]
    fn test_resolve_keeps_explicit_choice() {
        assert_eq!(Dialect::Oracle.resolve("id SERIAL"), Dialect::Oracle);
        assert_eq!(Dialect::Auto.resolve("id SERIAL"), Dialect::PostgreSQL);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Dialect::from_name("Postgres"), Some(Dialect::PostgreSQL));
        assert_eq!(Dialect::from_name("MariaDB"), Some(Dialect::MySQL));
        assert_eq!(Dialect::from_name("db2"), None);
    }
}
