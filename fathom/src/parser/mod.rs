//! Parser for single `CREATE TABLE` statements.
//!
//! SQLite keeps every table definition as the verbatim SQL it was created
//! with, so column names, types and inline constraints have to be recovered
//! from that text. Only the subset of the grammar needed for that is
//! understood:
//!
//! ```text
//! create_table      := CREATE [TEMP|TEMPORARY] TABLE [IF NOT EXISTS]
//!                      [schema_name '.'] table_name
//!                      '(' [column_def (',' column_def)*] [',' table_constraint]* ')' [';']
//! column_def        := column_name [type_name] column_constraint*
//! type_name         := identifier+ ['(' number [',' number] ')']
//! column_constraint := UNIQUE | NOT NULL | NULL | PRIMARY KEY [ASC|DESC] [AUTOINCREMENT]
//!                    | REFERENCES identifier ['(' identifier (',' identifier)* ')']
//!                    | DEFAULT literal
//! table_constraint  := (UNIQUE | PRIMARY KEY) '(' identifier (',' identifier)* ')'
//! ```
//!
//! Keywords of the statement itself are reserved: they are identifiers only
//! when quoted.

mod lexer;

use thiserror::Error;

pub use lexer::{tokenize, Token, TokenKind};

/// Words that can only appear as identifiers when quoted.
const RESERVED: &[&str] = &[
    "CREATE",
    "TEMP",
    "TEMPORARY",
    "TABLE",
    "IF",
    "NOT",
    "EXISTS",
    "AS",
    "PRIMARY",
    "KEY",
    "UNIQUE",
    "REFERENCES",
    "NULL",
    "DEFAULT",
    "AUTOINCREMENT",
    "ASC",
    "DESC",
];

/// Returns true when `word` is reserved by the `CREATE TABLE` grammar.
pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

/// A parse failure with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// A parsed `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub schema_name: Option<String>,
    pub table_name: String,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
}

impl CreateTable {
    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// One column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Type words joined by single spaces, parameters appended verbatim.
    pub type_name: Option<String>,
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    pub fn is_not_null(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::NotNull)
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, ColumnConstraint::PrimaryKey { .. }))
    }

    pub fn is_unique(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::Unique)
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::Default(value) => Some(value),
            _ => None,
        })
    }

    /// Target of an inline `REFERENCES` clause.
    pub fn references(&self) -> Option<(&str, &[String])> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::References { table, columns } => {
                Some((table.as_str(), columns.as_slice()))
            }
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnConstraint {
    NotNull,
    Null,
    PrimaryKey { autoincrement: bool },
    Unique,
    References { table: String, columns: Vec<String> },
    Default(DefaultValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    Unique(Vec<String>),
    PrimaryKey(Vec<String>),
}

/// Literal following `DEFAULT`.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    Text(String),
    /// A bare word such as `CURRENT_TIMESTAMP`.
    Keyword(String),
    Null,
    /// Parenthesised expression, kept as written.
    Expression(String),
}

/// Parse one `CREATE TABLE` statement.
///
/// Either the whole statement matches the grammar or an error is returned;
/// there is no best-effort result.
pub fn parse_create_table(sql: &str) -> Result<CreateTable, ParseError> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser {
        source: sql,
        tokens,
        pos: 0,
    };
    parser.create_table()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("`{}`", &self.source[token.start..token.end]),
        };
        ParseError::new(format!("expected {expected}, found {found}"), token.start)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(what))
        }
    }

    fn at_identifier(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Word(w) => !is_reserved(w),
            TokenKind::Quoted(_) => true,
            _ => false,
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Word(w) if !is_reserved(&w) => {
                self.advance();
                Ok(w)
            }
            TokenKind::Quoted(q) => {
                self.advance();
                Ok(q)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut names = vec![self.identifier()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.identifier()?);
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(names)
    }

    fn number(&mut self) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.error("number")),
        }
    }

    fn create_table(&mut self) -> Result<CreateTable, ParseError> {
        self.expect_keyword("CREATE")?;
        let temporary = self.eat_keyword("TEMP") || self.eat_keyword("TEMPORARY");
        self.expect_keyword("TABLE")?;

        let if_not_exists = if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };

        let first = self.identifier()?;
        let (schema_name, table_name) = if self.eat(&TokenKind::Dot) {
            (Some(first), self.identifier()?)
        } else {
            (None, first)
        };

        self.expect(&TokenKind::LParen, "`(`")?;
        let mut columns = Vec::new();
        let mut constraints = Vec::new();

        if !self.eat(&TokenKind::RParen) {
            loop {
                if self.at_keyword("UNIQUE") || self.at_keyword("PRIMARY") {
                    constraints.push(self.table_constraint()?);
                } else if constraints.is_empty() {
                    columns.push(self.column_def()?);
                } else {
                    return Err(self.error("table constraint"));
                }

                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RParen, "`,` or `)`")?;
                break;
            }
        }

        self.eat(&TokenKind::Semicolon);
        if self.peek().kind != TokenKind::Eof {
            return Err(self.error("end of statement"));
        }

        Ok(CreateTable {
            schema_name,
            table_name,
            temporary,
            if_not_exists,
            columns,
            constraints,
        })
    }

    fn column_def(&mut self) -> Result<ColumnDef, ParseError> {
        let name = self.identifier()?;
        let type_name = self.type_name()?;
        let mut constraints = Vec::new();
        while !matches!(self.peek().kind, TokenKind::Comma | TokenKind::RParen) {
            constraints.push(self.column_constraint()?);
        }
        Ok(ColumnDef {
            name,
            type_name,
            constraints,
        })
    }

    fn type_name(&mut self) -> Result<Option<String>, ParseError> {
        let mut words = Vec::new();
        while self.at_identifier() {
            words.push(self.identifier()?);
        }
        if words.is_empty() {
            return Ok(None);
        }

        let mut type_name = words.join(" ");
        if self.eat(&TokenKind::LParen) {
            let mut params = vec![self.number()?];
            if self.eat(&TokenKind::Comma) {
                params.push(self.number()?);
            }
            self.expect(&TokenKind::RParen, "`)`")?;
            type_name.push('(');
            type_name.push_str(&params.join(","));
            type_name.push(')');
        }
        Ok(Some(type_name))
    }

    fn column_constraint(&mut self) -> Result<ColumnConstraint, ParseError> {
        if self.eat_keyword("NOT") {
            self.expect_keyword("NULL")?;
            Ok(ColumnConstraint::NotNull)
        } else if self.eat_keyword("NULL") {
            Ok(ColumnConstraint::Null)
        } else if self.eat_keyword("PRIMARY") {
            self.expect_keyword("KEY")?;
            let _ = self.eat_keyword("ASC") || self.eat_keyword("DESC");
            let autoincrement = self.eat_keyword("AUTOINCREMENT");
            Ok(ColumnConstraint::PrimaryKey { autoincrement })
        } else if self.eat_keyword("UNIQUE") {
            Ok(ColumnConstraint::Unique)
        } else if self.eat_keyword("REFERENCES") {
            let table = self.identifier()?;
            let columns = if self.peek().kind == TokenKind::LParen {
                self.identifier_list()?
            } else {
                Vec::new()
            };
            Ok(ColumnConstraint::References { table, columns })
        } else if self.eat_keyword("DEFAULT") {
            Ok(ColumnConstraint::Default(self.default_value()?))
        } else {
            Err(self.error("column constraint"))
        }
    }

    fn default_value(&mut self) -> Result<DefaultValue, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(numeric_literal(&n, false)),
            TokenKind::Minus | TokenKind::Plus => {
                let negative = token.kind == TokenKind::Minus;
                let n = self.number()?;
                Ok(numeric_literal(&n, negative))
            }
            TokenKind::Str(s) => Ok(DefaultValue::Text(s)),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("NULL") => Ok(DefaultValue::Null),
            TokenKind::Word(w) if !is_reserved(&w) => Ok(DefaultValue::Keyword(w)),
            TokenKind::LParen => {
                let mut depth = 1usize;
                let start = token.start;
                loop {
                    let next = self.advance();
                    match next.kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                let text = &self.source[start..next.end];
                                return Ok(DefaultValue::Expression(text.to_string()));
                            }
                        }
                        TokenKind::Eof => return Err(self.error("`)`")),
                        _ => {}
                    }
                }
            }
            TokenKind::Eof => Err(self.error("default value")),
            _ => {
                self.pos -= 1;
                Err(self.error("default value"))
            }
        }
    }

    fn table_constraint(&mut self) -> Result<TableConstraint, ParseError> {
        if self.eat_keyword("UNIQUE") {
            Ok(TableConstraint::Unique(self.identifier_list()?))
        } else {
            self.expect_keyword("PRIMARY")?;
            self.expect_keyword("KEY")?;
            Ok(TableConstraint::PrimaryKey(self.identifier_list()?))
        }
    }
}

fn numeric_literal(text: &str, negative: bool) -> DefaultValue {
    let signed = if negative {
        format!("-{text}")
    } else {
        text.to_string()
    };
    if let Ok(i) = signed.parse::<i64>() {
        DefaultValue::Integer(i)
    } else if let Ok(f) = signed.parse::<f64>() {
        DefaultValue::Real(f)
    } else {
        DefaultValue::Text(signed)
    }
}
