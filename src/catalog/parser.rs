//! SQL dump parser.
//!
//! Understands the statements a schema-plus-data dump is made of: `CREATE
//! TABLE`, `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`, `INSERT INTO ...
//! VALUES` and `CREATE TRIGGER` (only to spot sequence-fed keys). Everything
//! else is skipped statement by statement.

use super::dialect::Dialect;
use super::lexer::{Lexer, Token};
use super::types::map_type;
use crate::literal::SqlValue;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlParseError {
    #[error("Expected {expected}, found {found:?}")]
    Expected { expected: String, found: Token },
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("INSERT into unknown table {0}")]
    UnknownTable(String),
    #[error("INSERT into {table}: unknown column {column}")]
    UnknownColumn { table: String, column: String },
    #[error("INSERT into {table}: expected {expected} values, found {found}")]
    ValueCount {
        table: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDump {
    pub tables: Vec<TableDef>,
    pub foreign_keys: Vec<FkDef>,
    pub inserts: Vec<InsertDef>,
    pub triggers: Vec<TriggerDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// `table(columns) REFERENCES target(target_columns)`. Empty target columns
/// mean the target's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct FkDef {
    pub table: String,
    pub columns: Vec<String>,
    pub target: String,
    pub target_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertDef {
    pub table: String,
    /// Empty when the statement lists no columns.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// A `BEFORE INSERT` trigger filling a column from a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDef {
    pub table: String,
    pub column: Option<String>,
    pub sequence: String,
}

/// Parse a SQL dump.
pub fn parse_sql(input: &str, dialect: Dialect) -> Result<ParsedDump, SqlParseError> {
    let dialect = dialect.resolve(input);
    let tokens = Lexer::new(input)
        .with_backslash_escapes(dialect.backslash_escapes())
        .tokenize();
    let mut parser = Parser::new(tokens, dialect);
    parser.parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    dialect: Dialect,
}

impl Parser {
    fn new(tokens: Vec<Token>, dialect: Dialect) -> Self {
        Self {
            tokens,
            pos: 0,
            dialect,
        }
    }

    fn current(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn parse(&mut self) -> Result<ParsedDump, SqlParseError> {
        let mut dump = ParsedDump::default();

        while self.current() != &Token::Eof {
            match self.current() {
                Token::Create => self.parse_create(&mut dump)?,
                Token::Alter => {
                    if let Some(fk) = self.parse_alter_table_fk()? {
                        dump.foreign_keys.push(fk);
                    }
                }
                Token::Insert => {
                    if let Some(insert) = self.parse_insert()? {
                        dump.inserts.push(insert);
                    }
                }
                _ => self.advance(),
            }
        }

        Ok(dump)
    }

    fn parse_create(&mut self, dump: &mut ParsedDump) -> Result<(), SqlParseError> {
        self.advance(); // CREATE

        // OR REPLACE, GLOBAL TEMPORARY, EDITIONABLE ...
        while ["OR", "REPLACE", "EDITIONABLE", "NONEDITIONABLE", "GLOBAL", "TEMPORARY", "TEMP", "UNLOGGED"]
            .iter()
            .any(|w| self.current().is_word(w))
        {
            self.advance();
        }

        match self.current() {
            Token::Table => {
                self.advance();
                // IF NOT EXISTS
                if self.current() == &Token::If {
                    self.advance();
                    if self.current() == &Token::Not {
                        self.advance();
                    }
                    if self.current() == &Token::Exists {
                        self.advance();
                    }
                }
                if let Some((table, fks)) = self.parse_create_table()? {
                    dump.tables.push(table);
                    dump.foreign_keys.extend(fks);
                }
            }
            Token::Trigger => {
                if let Some(trigger) = self.parse_trigger() {
                    dump.triggers.push(trigger);
                }
            }
            // INDEX, VIEW, SEQUENCE, ...
            _ => self.skip_statement(),
        }
        Ok(())
    }

    /// `name` or `schema.name`.
    fn parse_qualified_name(&mut self) -> Option<(Option<String>, String)> {
        let first = match self.current() {
            Token::Ident(name) => name.clone(),
            _ => return None,
        };
        self.advance();

        if self.current() == &Token::Dot {
            self.advance();
            if let Token::Ident(name) = self.current() {
                let name = name.clone();
                self.advance();
                return Some((Some(first), name));
            }
        }
        Some((None, first))
    }

    fn parse_create_table(&mut self) -> Result<Option<(TableDef, Vec<FkDef>)>, SqlParseError> {
        let Some((schema, table_name)) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };

        if self.current() != &Token::LParen {
            // CREATE TABLE ... AS SELECT
            self.skip_statement();
            return Ok(None);
        }
        self.advance();

        let mut columns: Vec<ColumnDef> = Vec::new();
        let mut fks = Vec::new();
        let mut primary_key: Vec<String> = Vec::new();

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    self.advance();
                }
                Token::Primary => {
                    // PRIMARY KEY (col1, col2, ...)
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                        primary_key.extend(self.parse_column_list());
                    }
                }
                Token::Foreign => {
                    if let Some(fk) = self.parse_foreign_key_constraint(&table_name)? {
                        fks.push(fk);
                    }
                }
                Token::Unique => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    if self.current() == &Token::LParen {
                        self.parse_column_list();
                    }
                }
                Token::Constraint => {
                    // Named constraint, the type follows
                    self.advance();
                    if let Token::Ident(_) = self.current() {
                        self.advance();
                    }
                }
                Token::Index | Token::Key => {
                    self.skip_until(&[Token::Comma, Token::RParen]);
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Token::Ident(_) => {
                    if let Some((column, inline_pk, inline_fk)) = self.parse_column()? {
                        if inline_pk {
                            primary_key.push(column.name.clone());
                        }
                        if let Some((target, target_columns)) = inline_fk {
                            fks.push(FkDef {
                                table: table_name.clone(),
                                columns: vec![column.name.clone()],
                                target,
                                target_columns,
                            });
                        }
                        columns.push(column);
                    }
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }

        // Table options (ENGINE=, TABLESPACE ...)
        self.skip_statement();

        for column in &mut columns {
            if primary_key.iter().any(|pk| pk.eq_ignore_ascii_case(&column.name)) {
                column.nullable = false;
            }
        }

        Ok(Some((
            TableDef {
                schema,
                name: table_name,
                columns,
                primary_key,
            },
            fks,
        )))
    }

    #[allow(clippy::type_complexity)]
    fn parse_column(
        &mut self,
    ) -> Result<Option<(ColumnDef, bool, Option<(String, Vec<String>)>)>, SqlParseError> {
        let name = match self.current() {
            Token::Ident(n) => n.clone(),
            _ => return Ok(None),
        };
        self.advance();

        // Type, e.g. `NUMBER(10, 2)` or `double precision`
        let mut raw_type = String::new();
        let mut paren_depth = 0;

        loop {
            match self.current() {
                Token::Ident(t) => {
                    if !raw_type.is_empty() && !raw_type.ends_with('(') {
                        raw_type.push(' ');
                    }
                    raw_type.push_str(t);
                    self.advance();
                }
                Token::LParen => {
                    paren_depth += 1;
                    raw_type.push('(');
                    self.advance();
                }
                Token::RParen if paren_depth > 0 => {
                    paren_depth -= 1;
                    raw_type.push(')');
                    self.advance();
                }
                Token::Num(n) => {
                    raw_type.push_str(n);
                    self.advance();
                }
                Token::Comma if paren_depth > 0 => {
                    raw_type.push(',');
                    self.advance();
                }
                _ => break,
            }
        }

        if raw_type.is_empty() {
            return Ok(None);
        }
        let data_type = map_type(&raw_type, self.dialect);

        let mut nullable = true;
        let mut is_pk = false;
        let mut reference = None;

        loop {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    is_pk = true;
                }
                Token::Not => {
                    self.advance();
                    if self.current() == &Token::Null {
                        self.advance();
                        nullable = false;
                    }
                }
                Token::Unique => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                }
                Token::Default => {
                    self.advance();
                    if self.current() == &Token::LParen {
                        self.skip_parenthesized();
                    } else if matches!(
                        self.current(),
                        Token::Num(_) | Token::Str(_) | Token::Null | Token::Ident(_)
                    ) {
                        self.parse_value()?;
                    }
                }
                Token::References => {
                    // Inline FK reference
                    self.advance();
                    reference = Some(self.parse_reference()?);
                    self.skip_on_actions();
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized();
                }
                Token::Comma | Token::RParen | Token::Eof => break,
                Token::Constraint => {
                    // Inline constraint
                    self.advance();
                    if let Token::Ident(_) = self.current() {
                        self.advance();
                    }
                }
                Token::On => self.skip_on_actions(),
                Token::LParen => self.skip_parenthesized(),
                _ => {
                    self.advance();
                }
            }
        }

        Ok(Some((
            ColumnDef {
                name,
                data_type,
                nullable: nullable && !is_pk,
            },
            is_pk,
            reference,
        )))
    }

    /// `target` or `target(col, ...)`.
    fn parse_reference(&mut self) -> Result<(String, Vec<String>), SqlParseError> {
        let Some((_, target)) = self.parse_qualified_name() else {
            return Err(SqlParseError::Expected {
                expected: "referenced table".to_string(),
                found: self.current().clone(),
            });
        };
        let columns = self.parse_column_list();
        Ok((target, columns))
    }

    fn parse_foreign_key_constraint(
        &mut self,
        table: &str,
    ) -> Result<Option<FkDef>, SqlParseError> {
        self.advance(); // FOREIGN
        if self.current() != &Token::Key {
            return Ok(None);
        }
        self.advance(); // KEY

        let columns = self.parse_column_list();

        if self.current() != &Token::References {
            return Ok(None);
        }
        self.advance();

        let (target, target_columns) = self.parse_reference()?;
        self.skip_on_actions();

        Ok(Some(FkDef {
            table: table.to_string(),
            columns,
            target,
            target_columns,
        }))
    }

    fn parse_column_list(&mut self) -> Vec<String> {
        let mut cols = Vec::new();

        if self.current() != &Token::LParen {
            return cols;
        }
        self.advance();

        loop {
            match self.current() {
                Token::Ident(name) => {
                    cols.push(name.clone());
                    self.advance();
                }
                Token::Comma => {
                    self.advance();
                }
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }

        cols
    }

    /// `ALTER TABLE [ONLY] t ADD CONSTRAINT c FOREIGN KEY (...) REFERENCES ...`
    fn parse_alter_table_fk(&mut self) -> Result<Option<FkDef>, SqlParseError> {
        self.advance(); // ALTER

        if self.current() != &Token::Table {
            self.skip_statement();
            return Ok(None);
        }
        self.advance(); // TABLE

        if self.current() == &Token::Only {
            self.advance();
        }

        let Some((_, table_name)) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };

        if self.current() != &Token::Add {
            self.skip_statement();
            return Ok(None);
        }
        self.advance(); // ADD

        if self.current() == &Token::Constraint {
            self.advance();
            if let Token::Ident(_) = self.current() {
                self.advance();
            }
        }

        if self.current() != &Token::Foreign {
            self.skip_statement();
            return Ok(None);
        }

        let fk = self.parse_foreign_key_constraint(&table_name)?;
        self.skip_statement();
        Ok(fk)
    }

    /// `INSERT INTO t [(cols)] VALUES (...), (...)`. `INSERT ... SELECT` is skipped.
    fn parse_insert(&mut self) -> Result<Option<InsertDef>, SqlParseError> {
        self.advance(); // INSERT
        if self.current() != &Token::Into {
            self.skip_statement();
            return Ok(None);
        }
        self.advance(); // INTO

        let Some((_, table)) = self.parse_qualified_name() else {
            self.skip_statement();
            return Ok(None);
        };

        let columns = self.parse_column_list();

        if self.current() != &Token::Values {
            self.skip_statement();
            return Ok(None);
        }
        self.advance();

        let mut rows = Vec::new();
        loop {
            match self.current() {
                Token::LParen => rows.push(self.parse_value_tuple()?),
                Token::Comma => self.advance(),
                Token::Eof => break,
                Token::Semicolon => {
                    self.advance();
                    break;
                }
                // ON DUPLICATE KEY UPDATE, RETURNING ...
                _ => {
                    self.skip_statement();
                    break;
                }
            }
        }

        Ok(Some(InsertDef {
            table,
            columns,
            rows,
        }))
    }

    fn parse_value_tuple(&mut self) -> Result<Vec<SqlValue>, SqlParseError> {
        self.advance(); // (
        let mut values = Vec::new();
        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Comma => self.advance(),
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                _ => values.push(self.parse_value()?),
            }
        }
        Ok(values)
    }

    fn parse_value(&mut self) -> Result<SqlValue, SqlParseError> {
        let value = match self.current().clone() {
            Token::Num(n) => {
                self.advance();
                SqlValue::Number(n)
            }
            Token::Str(s) => {
                self.advance();
                SqlValue::Text(s)
            }
            Token::Null | Token::Default => {
                self.advance();
                SqlValue::Null
            }
            Token::Ident(word) => {
                self.advance();
                match word.to_uppercase().as_str() {
                    "TRUE" => SqlValue::Number("1".to_string()),
                    "FALSE" => SqlValue::Number("0".to_string()),
                    // DATE '2024-01-01', TIMESTAMP '...'
                    "DATE" | "TIMESTAMP" if matches!(self.current(), Token::Str(_)) => {
                        self.parse_value()?
                    }
                    "TO_DATE" | "TO_TIMESTAMP" if self.current() == &Token::LParen => {
                        self.advance();
                        let text = match self.current() {
                            Token::Str(s) => Some(s.clone()),
                            _ => None,
                        };
                        let inner = self.collect_until_paren();
                        match text {
                            Some(s) => SqlValue::Text(s),
                            None => SqlValue::Expression(format!("{}({})", word, inner)),
                        }
                    }
                    _ if self.current() == &Token::LParen => {
                        self.advance();
                        let inner = self.collect_until_paren();
                        SqlValue::Expression(format!("{}({})", word, inner))
                    }
                    _ if self.current() == &Token::Dot => {
                        self.advance();
                        let member = match self.current() {
                            Token::Ident(m) => m.clone(),
                            other => {
                                return Err(SqlParseError::Expected {
                                    expected: "identifier".to_string(),
                                    found: other.clone(),
                                });
                            }
                        };
                        self.advance();
                        SqlValue::Expression(format!("{}.{}", word, member))
                    }
                    _ => SqlValue::Expression(word),
                }
            }
            Token::Eof => return Err(SqlParseError::UnexpectedEof),
            other => {
                return Err(SqlParseError::Expected {
                    expected: "value".to_string(),
                    found: other,
                });
            }
        };
        Ok(value)
    }

    fn collect_until_paren(&mut self) -> String {
        let mut parts = Vec::new();
        let mut depth = 1;

        loop {
            match self.current() {
                Token::LParen => {
                    depth += 1;
                    parts.push("(".to_string());
                    self.advance();
                }
                Token::RParen => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    parts.push(")".to_string());
                }
                Token::Ident(s) => {
                    parts.push(s.clone());
                    self.advance();
                }
                Token::Num(n) => {
                    parts.push(n.clone());
                    self.advance();
                }
                Token::Str(s) => {
                    parts.push(format!("'{}'", s.replace('\'', "''")));
                    self.advance();
                }
                Token::Comma => {
                    parts.push(",".to_string());
                    self.advance();
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }

        parts.join(" ")
    }

    /// `CREATE TRIGGER name BEFORE INSERT ON table ... BEGIN ... END;`
    ///
    /// Yields the sequence whose `NEXTVAL` feeds the row, and the `:new`
    /// column it is assigned to when that can be seen.
    fn parse_trigger(&mut self) -> Option<TriggerDef> {
        self.advance(); // TRIGGER
        self.parse_qualified_name();

        let mut before = false;
        let mut on_insert = false;
        while !matches!(self.current(), Token::On | Token::Semicolon | Token::Eof) {
            if self.current().is_word("BEFORE") {
                before = true;
            }
            if self.current() == &Token::Insert {
                on_insert = true;
            }
            self.advance();
        }
        if self.current() != &Token::On {
            self.skip_statement();
            return None;
        }
        self.advance();
        let table = self.parse_qualified_name().map(|(_, name)| name);

        let mut depth = 0usize;
        let mut declaring = false;
        let mut sequence = None;
        let mut column = None;
        let mut last_new_column: Option<String> = None;

        loop {
            match self.current() {
                Token::Eof => break,
                Token::Semicolon if depth == 0 && !declaring => {
                    self.advance();
                    break;
                }
                Token::Ident(w) if depth == 0 && w.eq_ignore_ascii_case("DECLARE") => {
                    declaring = true;
                    self.advance();
                }
                Token::Begin => {
                    declaring = false;
                    depth += 1;
                    self.advance();
                }
                Token::End => {
                    self.advance();
                    // END IF / END LOOP / END CASE close inner constructs
                    if self.current() == &Token::If
                        || self.current().is_word("LOOP")
                        || self.current().is_word("CASE")
                    {
                        self.advance();
                        continue;
                    }
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.skip_statement();
                        break;
                    }
                }
                Token::Ident(w)
                    if w.eq_ignore_ascii_case("NEW") && self.peek_at(1) == &Token::Dot =>
                {
                    if let Token::Ident(c) = self.peek_at(2) {
                        last_new_column = Some(c.clone());
                    }
                    self.advance();
                }
                // seq.NEXTVAL
                Token::Ident(seq)
                    if self.peek_at(1) == &Token::Dot && self.peek_at(2).is_word("NEXTVAL") =>
                {
                    sequence = Some(seq.clone());
                    self.pos += 3;
                    column = self.into_new_column().or_else(|| last_new_column.clone());
                }
                // nextval('seq')
                Token::Ident(f)
                    if f.eq_ignore_ascii_case("NEXTVAL") && self.peek_at(1) == &Token::LParen =>
                {
                    if let Token::Str(seq) = self.peek_at(2) {
                        sequence = Some(seq.clone());
                        column = last_new_column.clone();
                    }
                    self.advance();
                }
                _ => self.advance(),
            }
        }

        match (before && on_insert, table, sequence) {
            (true, Some(table), Some(sequence)) => Some(TriggerDef {
                table,
                column,
                sequence,
            }),
            _ => None,
        }
    }

    /// `INTO :new.col` right after a `NEXTVAL`.
    fn into_new_column(&self) -> Option<String> {
        if self.current() != &Token::Into
            || !self.peek_at(1).is_word("NEW")
            || self.peek_at(2) != &Token::Dot
        {
            return None;
        }
        match self.peek_at(3) {
            Token::Ident(c) => Some(c.clone()),
            _ => None,
        }
    }

    fn skip_on_actions(&mut self) {
        while self.current() == &Token::On {
            self.advance();
            if matches!(self.current(), Token::Delete | Token::Update) {
                self.advance();
            }
            // CASCADE, RESTRICT, SET NULL, SET DEFAULT, NO ACTION
            match self.current() {
                Token::Cascade | Token::Restrict => {
                    self.advance();
                }
                t if t.is_word("SET") => {
                    self.advance();
                    if matches!(self.current(), Token::Null | Token::Default) {
                        self.advance();
                    }
                }
                t if t.is_word("NO") => {
                    self.advance();
                    if self.current().is_word("ACTION") {
                        self.advance();
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_parenthesized(&mut self) {
        if self.current() != &Token::LParen {
            return;
        }
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => {
                    depth += 1;
                    self.advance();
                }
                Token::RParen => {
                    depth -= 1;
                    self.advance();
                }
                Token::Eof => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_statement(&mut self) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            self.advance();
        }
        if self.current() == &Token::Semicolon {
            self.advance();
        }
    }

    fn skip_until(&mut self, tokens: &[Token]) {
        while !tokens.contains(self.current()) && self.current() != &Token::Eof {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }
}
