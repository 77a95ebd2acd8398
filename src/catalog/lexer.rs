//! Tokenizer for SQL dumps.
//!
//! Only what the dump parser looks at becomes a token of its own; operators
//! and other punctuation (`:`, `=`, `/` terminators) are dropped.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Create,
    Alter,
    Add,
    Table,
    Only,
    Primary,
    Key,
    Foreign,
    References,
    Not,
    Null,
    Unique,
    Default,
    On,
    Delete,
    Update,
    Cascade,
    Restrict,
    Constraint,
    Index,
    If,
    Exists,
    Check,
    Insert,
    Into,
    Values,
    Trigger,
    Begin,
    End,

    Ident(String),
    Str(String),
    Num(String),

    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

const KEYWORDS: &[(&str, Token)] = &[
    ("CREATE", Token::Create),
    ("ALTER", Token::Alter),
    ("ADD", Token::Add),
    ("TABLE", Token::Table),
    ("ONLY", Token::Only),
    ("PRIMARY", Token::Primary),
    ("KEY", Token::Key),
    ("FOREIGN", Token::Foreign),
    ("REFERENCES", Token::References),
    ("NOT", Token::Not),
    ("NULL", Token::Null),
    ("UNIQUE", Token::Unique),
    ("DEFAULT", Token::Default),
    ("ON", Token::On),
    ("DELETE", Token::Delete),
    ("UPDATE", Token::Update),
    ("CASCADE", Token::Cascade),
    ("RESTRICT", Token::Restrict),
    ("CONSTRAINT", Token::Constraint),
    ("INDEX", Token::Index),
    ("IF", Token::If),
    ("EXISTS", Token::Exists),
    ("CHECK", Token::Check),
    ("INSERT", Token::Insert),
    ("INTO", Token::Into),
    ("VALUES", Token::Values),
    ("TRIGGER", Token::Trigger),
    ("BEGIN", Token::Begin),
    ("END", Token::End),
];

impl Token {
    /// Case-insensitive match on a plain identifier.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    fn from_word(word: &str) -> Token {
        KEYWORDS
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(word))
            .map(|(_, token)| token.clone())
            .unwrap_or_else(|| Token::Ident(word.to_string()))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// MySQL dumps escape with backslashes inside string literals.
    backslash_escapes: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            backslash_escapes: false,
        }
    }

    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    /// Whitespace, `--` / `#` line comments and `/* */` blocks.
    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('-'), Some('-')) | (Some('#'), _) => {
                    self.eat_while(|c| c != '\n');
                }
                (Some('/'), Some('*')) => {
                    self.pos = match self.rest()[2..].find("*/") {
                        Some(end) => self.pos + 2 + end + 2,
                        None => self.src.len(),
                    };
                }
                _ => return,
            }
        }
    }

    /// Body of a quoted run up to `close`. A doubled closing character stands
    /// for itself.
    fn quoted(&mut self, close: char, doubled: bool, escapes: bool) -> String {
        self.bump(); // opening
        let mut text = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' if escapes => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(other) => text.push(other),
                    None => break,
                },
                c if c == close => {
                    if doubled && self.peek() == Some(close) {
                        self.bump();
                        text.push(close);
                    } else {
                        break;
                    }
                }
                c => text.push(c),
            }
        }
        text
    }

    fn number(&mut self) -> String {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        self.src[start..self.pos].to_string()
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();
            let Some(c) = self.peek() else {
                return Token::Eof;
            };

            let punct = match c {
                '(' => Some(Token::LParen),
                ')' => Some(Token::RParen),
                ',' => Some(Token::Comma),
                ';' => Some(Token::Semicolon),
                '.' => Some(Token::Dot),
                _ => None,
            };
            if let Some(token) = punct {
                self.bump();
                return token;
            }

            return match c {
                '\'' => Token::Str(self.quoted('\'', true, self.backslash_escapes)),
                '"' => Token::Ident(self.quoted('"', true, false)),
                '`' => Token::Ident(self.quoted('`', true, false)),
                '[' => Token::Ident(self.quoted(']', false, false)),
                '-' if self.peek_second().is_some_and(|d| d.is_ascii_digit()) => {
                    Token::Num(self.number())
                }
                c if c.is_ascii_digit() => Token::Num(self.number()),
                c if c.is_alphabetic() || c == '_' => Token::from_word(self.eat_while(is_word_char)),
                _ => {
                    // `:`, `=`, `/`, operators
                    self.bump();
                    continue;
                }
            };
        }
    }

    /// All tokens, `Eof` last.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens: Vec<Token> = std::iter::from_fn(|| match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        })
        .collect();
        tokens.push(Token::Eof);
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(sql: &str) -> Vec<Token> {
        Lexer::new(sql).tokenize()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn test_keywords_any_case() {
        assert_eq!(
            lex("create Table t (id int);"),
            vec![
                Token::Create,
                Token::Table,
                ident("t"),
                Token::LParen,
                ident("id"),
                ident("int"),
                Token::RParen,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_identifier_quoting_styles() {
        let tokens = lex(r#""Order ""Head""" `line item` [ship to] sys$user"#);
        assert_eq!(
            tokens[..4],
            [
                ident(r#"Order "Head""#),
                ident("line item"),
                ident("ship to"),
                ident("sys$user"),
            ]
        );
    }

    #[test]
    fn test_comments_and_terminators_skipped() {
        let sql = "-- header\n# mysql note\nEND; /* block\n comment */\n/\nBEGIN";
        assert_eq!(
            lex(sql),
            vec![Token::End, Token::Semicolon, Token::Begin, Token::Eof]
        );
    }

    #[test]
    fn test_insert_values() {
        let tokens = lex("INSERT INTO t VALUES (-4, 'O''Brien', NULL, 2.50);");
        assert_eq!(tokens[0], Token::Insert);
        assert_eq!(tokens[1], Token::Into);
        assert_eq!(tokens[3], Token::Values);
        assert_eq!(tokens[5], Token::Num("-4".to_string()));
        assert_eq!(tokens[7], Token::Str("O'Brien".to_string()));
        assert_eq!(tokens[9], Token::Null);
        assert_eq!(tokens[11], Token::Num("2.50".to_string()));
    }

    #[test]
    fn test_backslash_escapes_only_when_enabled() {
        let sql = r"'C:\temp\n'";
        assert_eq!(Lexer::new(sql).next_token(), Token::Str(r"C:\temp\n".to_string()));
        assert_eq!(
            Lexer::new(sql).with_backslash_escapes(true).next_token(),
            Token::Str("C:\temp\n".to_string())
        );
    }

    #[test]
    fn test_trigger_body_tokens() {
        let tokens = lex(":new.id := orders_seq.NEXTVAL;");
        assert!(tokens[0].is_word("new"));
        assert_eq!(tokens[1], Token::Dot);
        assert!(tokens[2].is_word("ID"));
        assert!(tokens[3].is_word("orders_seq"));
        assert_eq!(tokens[4], Token::Dot);
        assert!(tokens[5].is_word("nextval"));
        assert_eq!(tokens[6], Token::Semicolon);
    }

    #[test]
    fn test_unterminated_input_ends_cleanly() {
        assert_eq!(lex("'open"), vec![Token::Str("open".to_string()), Token::Eof]);
        assert_eq!(lex("/* never closed"), vec![Token::Eof]);
    }
}
