//! Recursive-descent parser for the SELECT subset.
//!
//! Grammar (precedence low to high in WHERE: OR, AND, NOT, comparison):
//!
//! ```text
//! statement  := SELECT projection FROM ident [WHERE where] [ORDER BY path [ASC|DESC]]
//!               [LIMIT n] [OFFSET n]
//! projection := '*' | path (',' path)*
//! where      := similarity [AND or_expr] | or_expr
//! similarity := path '.' ('cosine' | 'inner_product') '(' string ')'
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := not_expr (AND not_expr)*
//! not_expr   := NOT not_expr | '(' or_expr ')' | comparison
//! comparison := path (('=' | '!=' | '<' | '<=' | '>' | '>=') value
//!               | IN '(' value (',' value)* ')')
//! value      := string | number | TRUE | FALSE | NULL
//! ```

use serde_json::Value;

use crate::error::{DbError, Result};
use crate::predicate::Predicate;
use crate::types::Order;

use super::ast::{SelectStatement, SimilarityClause, SimilarityKind};
use super::lexer::{tokenize, Token, TokenKind};

/// Parse one SELECT statement.
pub fn parse(sql: &str) -> Result<SelectStatement> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser { tokens, index: 0 };
    parser.statement()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn error(&self, expected: impl Into<String>) -> DbError {
        DbError::Parse {
            position: self.peek().pos,
            expected: expected.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(kind.describe()))
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

    fn ident(&mut self) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    /// Dotted path: `ident ('.' ident)*`.
    fn path(&mut self) -> Result<String> {
        let mut path = self.ident()?;
        while self.eat(&TokenKind::Dot) {
            path.push('.');
            path.push_str(&self.ident()?);
        }
        Ok(path)
    }

    fn statement(&mut self) -> Result<SelectStatement> {
        self.expect(&TokenKind::Select)?;
        let projection = self.projection()?;
        self.expect(&TokenKind::From)?;
        let table = self.ident()?;

        let mut statement = SelectStatement {
            table,
            projection,
            predicate: None,
            similarity: None,
            order_by: None,
            limit: None,
            offset: None,
        };

        if self.eat(&TokenKind::Where) {
            self.where_clause(&mut statement)?;
        }
        if self.eat(&TokenKind::Order) {
            self.expect(&TokenKind::By)?;
            let field = self.path()?;
            let order = if self.eat(&TokenKind::Desc) {
                Order::Desc
            } else {
                self.eat(&TokenKind::Asc);
                Order::Asc
            };
            statement.order_by = Some((field, order));
        }
        if self.eat(&TokenKind::Limit) {
            statement.limit = Some(self.unsigned()?);
        }
        if self.eat(&TokenKind::Offset) {
            statement.offset = Some(self.unsigned()?);
        }
        self.expect(&TokenKind::Eof)?;
        Ok(statement)
    }

    fn projection(&mut self) -> Result<Option<Vec<String>>> {
        if self.eat(&TokenKind::Star) {
            return Ok(None);
        }
        let mut fields = vec![self.path()?];
        while self.eat(&TokenKind::Comma) {
            fields.push(self.path()?);
        }
        Ok(Some(fields))
    }

    fn where_clause(&mut self, statement: &mut SelectStatement) -> Result<()> {
        if let Some(similarity) = self.try_similarity()? {
            statement.similarity = Some(similarity);
            if self.eat(&TokenKind::And) {
                statement.predicate = Some(self.or_expr()?);
            }
        } else {
            statement.predicate = Some(self.or_expr()?);
        }
        Ok(())
    }

    /// Look ahead for `path '.' cosine|inner_product '(' … ')'`; rewinds on
    /// anything else.
    fn try_similarity(&mut self) -> Result<Option<SimilarityClause>> {
        let checkpoint = self.index;
        if !matches!(self.peek().kind, TokenKind::Ident(_)) {
            return Ok(None);
        }
        let mut segments = vec![match self.advance().kind {
            TokenKind::Ident(s) => s,
            _ => unreachable!(),
        }];
        while self.eat(&TokenKind::Dot) {
            match self.peek().kind.clone() {
                TokenKind::Ident(s) => {
                    self.advance();
                    segments.push(s);
                }
                _ => {
                    self.index = checkpoint;
                    return Ok(None);
                }
            }
        }

        let kind = match segments.last().map(String::as_str) {
            Some("cosine") => SimilarityKind::Cosine,
            Some("inner_product") => SimilarityKind::InnerProduct,
            _ => {
                self.index = checkpoint;
                return Ok(None);
            }
        };
        if self.peek().kind != TokenKind::LParen || segments.len() < 2 {
            self.index = checkpoint;
            return Ok(None);
        }
        self.advance(); // '('
        let query_text = match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                s
            }
            _ => return Err(self.error("quoted query text")),
        };
        self.expect(&TokenKind::RParen)?;

        segments.pop();
        Ok(Some(SimilarityClause {
            field: segments.join("."),
            query_text,
            kind,
        }))
    }

    fn or_expr(&mut self) -> Result<Predicate> {
        let mut children = vec![self.and_expr()?];
        while self.eat(&TokenKind::Or) {
            children.push(self.and_expr()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap()
        } else {
            Predicate::Or(children)
        })
    }

    fn and_expr(&mut self) -> Result<Predicate> {
        let mut children = vec![self.not_expr()?];
        while self.eat(&TokenKind::And) {
            children.push(self.not_expr()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap()
        } else {
            Predicate::And(children)
        })
    }

    fn not_expr(&mut self) -> Result<Predicate> {
        if self.eat(&TokenKind::Not) {
            return Ok(Predicate::Not(Box::new(self.not_expr()?)));
        }
        if self.eat(&TokenKind::LParen) {
            let inner = self.or_expr()?;
            self.expect(&TokenKind::RParen)?;
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Predicate> {
        let field = self.path()?;
        let op = self.peek().kind.clone();
        match op {
            TokenKind::In => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let mut values = vec![self.value()?];
                while self.eat(&TokenKind::Comma) {
                    values.push(self.value()?);
                }
                self.expect(&TokenKind::RParen)?;
                Ok(Predicate::In(field, values))
            }
            TokenKind::Eq | TokenKind::Ne | TokenKind::Lt | TokenKind::Lte | TokenKind::Gt
            | TokenKind::Gte => {
                self.advance();
                let value = self.value()?;
                Ok(match op {
                    TokenKind::Eq => Predicate::Eq(field, value),
                    TokenKind::Ne => Predicate::Ne(field, value),
                    TokenKind::Lt => Predicate::Lt(field, value),
                    TokenKind::Lte => Predicate::Lte(field, value),
                    TokenKind::Gt => Predicate::Gt(field, value),
                    _ => Predicate::Gte(field, value),
                })
            }
            _ => Err(self.error("comparison operator or IN")),
        }
    }

    fn value(&mut self) -> Result<Value> {
        let token = self.peek().kind.clone();
        match token {
            TokenKind::Str(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            TokenKind::Number(text) => {
                self.advance();
                if text.contains('.') {
                    let f: f64 = text
                        .parse()
                        .map_err(|_| self.error("decimal number"))?;
                    Ok(serde_json::json!(f))
                } else {
                    let i: i64 = text
                        .parse()
                        .map_err(|_| self.error("integer"))?;
                    Ok(serde_json::json!(i))
                }
            }
            TokenKind::True => {
                self.advance();
                Ok(Value::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Value::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::Null)
            }
            _ => Err(self.error("literal value")),
        }
    }

    fn unsigned(&mut self) -> Result<usize> {
        match self.peek().kind.clone() {
            TokenKind::Number(text) => {
                self.advance();
                text.parse().map_err(|_| self.error("non-negative integer"))
            }
            _ => Err(self.error("non-negative integer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_projection_and_table() {
        let stmt = parse("SELECT name, address.city FROM person").unwrap();
        assert_eq!(stmt.table, "person");
        assert_eq!(
            stmt.projection,
            Some(vec!["name".to_string(), "address.city".to_string()])
        );

        let all = parse("SELECT * FROM person").unwrap();
        assert_eq!(all.projection, None);
    }

    #[test]
    fn parses_where_with_precedence() {
        let stmt = parse(
            "SELECT * FROM person WHERE role = 'engineer' AND team = 'platform' OR level > 5",
        )
        .unwrap();
        // OR binds loosest: (role AND team) OR (level > 5)
        match stmt.predicate.unwrap() {
            Predicate::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], Predicate::And(_)));
                assert!(matches!(children[1], Predicate::Gt(_, _)));
            }
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let stmt =
            parse("SELECT * FROM p WHERE a = 1 AND (b = 2 OR c = 3)").unwrap();
        match stmt.predicate.unwrap() {
            Predicate::And(children) => {
                assert!(matches!(children[1], Predicate::Or(_)));
            }
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn parses_in_list_and_literals() {
        let stmt = parse(
            "SELECT * FROM p WHERE status IN ('open', 'blocked') AND active = TRUE AND score >= 2.5",
        )
        .unwrap();
        match stmt.predicate.unwrap() {
            Predicate::And(children) => {
                assert_eq!(
                    children[0],
                    Predicate::In(
                        "status".into(),
                        vec![json!("open"), json!("blocked")]
                    )
                );
                assert_eq!(children[1], Predicate::Eq("active".into(), json!(true)));
                assert_eq!(children[2], Predicate::Gte("score".into(), json!(2.5)));
            }
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn parses_order_limit_offset() {
        let stmt =
            parse("SELECT * FROM p ORDER BY name DESC LIMIT 10 OFFSET 20").unwrap();
        assert_eq!(stmt.order_by, Some(("name".into(), Order::Desc)));
        assert_eq!(stmt.limit, Some(10));
        assert_eq!(stmt.offset, Some(20));
    }

    #[test]
    fn parses_similarity_clause() {
        let stmt = parse(
            "SELECT * FROM resources WHERE embedding.cosine(\"indoor plants\") LIMIT 5",
        )
        .unwrap();
        let sim = stmt.similarity.unwrap();
        assert_eq!(sim.field, "embedding");
        assert_eq!(sim.query_text, "indoor plants");
        assert_eq!(sim.kind, SimilarityKind::Cosine);
        assert!(stmt.predicate.is_none());
    }

    #[test]
    fn parses_hybrid_similarity_and_predicate() {
        let stmt = parse(
            "SELECT * FROM resources WHERE embedding.cosine('plants') AND category = 'tutorial'",
        )
        .unwrap();
        assert!(stmt.similarity.is_some());
        assert_eq!(
            stmt.predicate.unwrap(),
            Predicate::Eq("category".into(), json!("tutorial"))
        );
    }

    #[test]
    fn inner_product_form() {
        let stmt =
            parse("SELECT * FROM r WHERE embedding.inner_product('q')").unwrap();
        assert_eq!(stmt.similarity.unwrap().kind, SimilarityKind::InnerProduct);
    }

    #[test]
    fn dotted_field_named_cosine_is_not_similarity() {
        // `metrics.cosine = 1` is a plain comparison on a nested field.
        let stmt = parse("SELECT * FROM p WHERE metrics.cosine = 1").unwrap();
        assert!(stmt.similarity.is_none());
        assert_eq!(
            stmt.predicate.unwrap(),
            Predicate::Eq("metrics.cosine".into(), json!(1))
        );
    }

    #[test]
    fn tolerates_arbitrary_whitespace() {
        let stmt = parse(
            "SELECT\n    name\nFROM\n    person\nWHERE\n    role\n    =\n    'engineer'\nLIMIT 1",
        )
        .unwrap();
        assert_eq!(stmt.table, "person");
        assert_eq!(stmt.limit, Some(1));
    }

    #[test]
    fn errors_carry_position_and_expectation() {
        let err = parse("SELECT FROM person").unwrap_err();
        match err {
            DbError::Parse { position, expected } => {
                assert_eq!(position, 7);
                assert!(expected.contains("identifier") || expected.contains("*"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse("SELECT * person").unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));

        let err = parse("SELECT * FROM p WHERE").unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
    }

    #[test]
    fn not_operator() {
        let stmt = parse("SELECT * FROM p WHERE NOT status = 'closed'").unwrap();
        assert!(matches!(stmt.predicate.unwrap(), Predicate::Not(_)));
    }
}
