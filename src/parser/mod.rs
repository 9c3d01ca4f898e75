//! Surface-syntax parser.
//!
//! A character-level tokenizer feeding a recursive-descent parser for the
//! pattern language: `CREATE ... VIEW` definitions and
//! `MATCH ... FROM ... RETURN` queries. Keywords are matched
//! case-insensitively; identifiers are case-preserving; string literals are
//! double-quoted with `""` escaping. All errors carry line/column.

use crate::ast::{
    CmpOp, Expr, Mapping, Pattern, PatternEdge, PatternNode, Query, RuleBlock, SkolemSpec,
    ViewDef, ViewKind,
};
use crate::error::{Error, Result};

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Str(String),
    Num(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Star,
    Dot,
    Arrow,
    Dash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("'{s}'"),
            Tok::Str(s) => format!("\"{s}\""),
            Tok::Num(s) => format!("'{s}'"),
            Tok::LParen => "'('".into(),
            Tok::RParen => "')'".into(),
            Tok::LBracket => "'['".into(),
            Tok::RBracket => "']'".into(),
            Tok::Colon => "':'".into(),
            Tok::Comma => "','".into(),
            Tok::Star => "'*'".into(),
            Tok::Dot => "'.'".into(),
            Tok::Arrow => "'->'".into(),
            Tok::Dash => "'-'".into(),
            Tok::Eq => "'='".into(),
            Tok::Ne => "'<>'".into(),
            Tok::Lt => "'<'".into(),
            Tok::Le => "'<='".into(),
            Tok::Gt => "'>'".into(),
            Tok::Ge => "'>='".into(),
        }
    }
}

/// Token with its source position (1-based).
#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
    col: usize,
}

/// Tokenize input. Whitespace-insensitive; `#` starts a line comment.
fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut out = Vec::new();
    let mut line = 1usize;
    let mut col = 1usize;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0usize;

    fn advance(c: char, line: &mut usize, col: &mut usize) {
        if c == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
    }

    while i < chars.len() {
        let c = chars[i];
        let (tline, tcol) = (line, col);
        if c.is_whitespace() {
            advance(c, &mut line, &mut col);
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                advance(chars[i], &mut line, &mut col);
                i += 1;
            }
            continue;
        }
        if c == '"' {
            advance(c, &mut line, &mut col);
            i += 1;
            let mut s = String::new();
            loop {
                if i >= chars.len() {
                    return Err(Error::parse(tline, tcol, "unterminated string literal"));
                }
                let d = chars[i];
                if d == '"' {
                    // "" escapes a quote inside a string
                    if i + 1 < chars.len() && chars[i + 1] == '"' {
                        s.push('"');
                        advance(d, &mut line, &mut col);
                        advance(chars[i + 1], &mut line, &mut col);
                        i += 2;
                        continue;
                    }
                    advance(d, &mut line, &mut col);
                    i += 1;
                    break;
                }
                s.push(d);
                advance(d, &mut line, &mut col);
                i += 1;
            }
            out.push(Spanned {
                tok: Tok::Str(s),
                line: tline,
                col: tcol,
            });
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut s = String::new();
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                s.push(chars[i]);
                advance(chars[i], &mut line, &mut col);
                i += 1;
            }
            out.push(Spanned {
                tok: Tok::Ident(s),
                line: tline,
                col: tcol,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let mut s = String::new();
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                s.push(chars[i]);
                advance(chars[i], &mut line, &mut col);
                i += 1;
            }
            out.push(Spanned {
                tok: Tok::Num(s),
                line: tline,
                col: tcol,
            });
            continue;
        }
        // Punctuation, longest match first.
        let next = chars.get(i + 1).copied();
        let (tok, width) = match (c, next) {
            ('-', Some('>')) => (Tok::Arrow, 2),
            ('<', Some('=')) => (Tok::Le, 2),
            ('<', Some('>')) => (Tok::Ne, 2),
            ('>', Some('=')) => (Tok::Ge, 2),
            ('(', _) => (Tok::LParen, 1),
            (')', _) => (Tok::RParen, 1),
            ('[', _) => (Tok::LBracket, 1),
            (']', _) => (Tok::RBracket, 1),
            (':', _) => (Tok::Colon, 1),
            (',', _) => (Tok::Comma, 1),
            ('*', _) => (Tok::Star, 1),
            ('.', _) => (Tok::Dot, 1),
            ('=', _) => (Tok::Eq, 1),
            ('-', _) => (Tok::Dash, 1),
            ('<', _) => (Tok::Lt, 1),
            ('>', _) => (Tok::Gt, 1),
            (other, _) => {
                return Err(Error::parse(
                    tline,
                    tcol,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        for _ in 0..width {
            advance(chars[i], &mut line, &mut col);
            i += 1;
        }
        out.push(Spanned {
            tok,
            line: tline,
            col: tcol,
        });
    }
    Ok(out)
}

/// Recursive-descent parser over a token stream.
pub struct Parser {
    toks: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    /// Tokenize `input` and position at the start.
    pub fn new(input: &str) -> Result<Self> {
        Ok(Parser {
            toks: tokenize(input)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|s| &s.tok)
    }

    fn here(&self) -> (usize, usize) {
        match self.toks.get(self.pos) {
            Some(s) => (s.line, s.col),
            None => self
                .toks
                .last()
                .map(|s| (s.line, s.col + 1))
                .unwrap_or((1, 1)),
        }
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        let (line, col) = self.here();
        Error::parse(line, col, msg)
    }

    fn expect(&mut self, want: &Tok) -> Result<()> {
        match self.peek() {
            Some(t) if t == want => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(self.err(format!("expected {}, found {}", want.describe(), t.describe()))),
            None => Err(self.err(format!("expected {}, found end of input", want.describe()))),
        }
    }

    /// Consume the next token if it is the given keyword (case-insensitive).
    pub fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Some(Tok::Ident(s)) = self.peek() {
            if s.eq_ignore_ascii_case(kw) {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            match self.peek() {
                Some(t) => Err(self.err(format!("expected {kw}, found {}", t.describe()))),
                None => Err(self.err(format!("expected {kw}, found end of input"))),
            }
        }
    }

    /// Consume an identifier.
    pub fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Some(Tok::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            Some(t) => Err(self.err(format!("expected identifier, found {}", t.describe()))),
            None => Err(self.err("expected identifier, found end of input")),
        }
    }

    fn string(&mut self) -> Result<String> {
        match self.peek() {
            Some(Tok::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            Some(t) => Err(self.err(format!("expected string literal, found {}", t.describe()))),
            None => Err(self.err("expected string literal, found end of input")),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn expect_end(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.err(format!(
                "trailing input starting at {}",
                self.toks[self.pos].tok.describe()
            )))
        }
    }

    // Patterns

    /// `(var)` or `(var:Label)`; registers the node in `pattern`.
    fn node_ref(&mut self, pattern: &mut Pattern) -> Result<String> {
        self.expect(&Tok::LParen)?;
        let var = self.ident()?;
        let label = if self.peek() == Some(&Tok::Colon) {
            self.pos += 1;
            Some(self.ident()?)
        } else {
            None
        };
        self.expect(&Tok::RParen)?;
        if let Some(existing) = pattern.nodes.iter_mut().find(|n| n.var == var) {
            match (&existing.label, &label) {
                (Some(a), Some(b)) if a != b => {
                    return Err(self.err(format!(
                        "conflicting labels '{a}' and '{b}' for variable '{var}'"
                    )));
                }
                (None, Some(_)) => existing.label = label,
                _ => {}
            }
        } else {
            pattern.nodes.push(PatternNode {
                var: var.clone(),
                label,
            });
        }
        Ok(var)
    }

    /// One chain `(a)-[x:L]->(b)-...` or an isolated node.
    fn pattern_part(&mut self, pattern: &mut Pattern) -> Result<()> {
        let mut src = self.node_ref(pattern)?;
        while self.peek() == Some(&Tok::Dash) {
            self.pos += 1;
            self.expect(&Tok::LBracket)?;
            let var = self.ident()?;
            let label = if self.peek() == Some(&Tok::Colon) {
                self.pos += 1;
                Some(self.ident()?)
            } else {
                None
            };
            let star = if self.peek() == Some(&Tok::Star) {
                self.pos += 1;
                true
            } else {
                false
            };
            if star && label.is_none() {
                return Err(self.err("transitive closure '*' requires an edge label"));
            }
            self.expect(&Tok::RBracket)?;
            self.expect(&Tok::Arrow)?;
            let dst = self.node_ref(pattern)?;
            pattern.edges.push(PatternEdge {
                var,
                src: src.clone(),
                dst: dst.clone(),
                label,
                star,
            });
            src = dst;
        }
        Ok(())
    }

    /// A comma-separated list of chains sharing variables.
    pub fn pattern(&mut self) -> Result<Pattern> {
        let mut pattern = Pattern::default();
        self.pattern_part(&mut pattern)?;
        while self.peek() == Some(&Tok::Comma) {
            // A comma is only a pattern separator when a '(' follows;
            // otherwise the caller owns it (e.g. RETURN lists).
            if !matches!(self.toks.get(self.pos + 1).map(|s| &s.tok), Some(Tok::LParen)) {
                break;
            }
            self.pos += 1;
            self.pattern_part(&mut pattern)?;
        }
        Ok(pattern)
    }

    // Expressions

    fn operand(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Tok::Ident(var)) => {
                self.pos += 1;
                self.expect(&Tok::Dot)?;
                let key = self.ident()?;
                Ok(Expr::Ref { var, key })
            }
            Some(Tok::Str(s)) => {
                self.pos += 1;
                Ok(Expr::Lit(s))
            }
            Some(Tok::Num(s)) => {
                self.pos += 1;
                Ok(Expr::Lit(s))
            }
            Some(t) => Err(self.err(format!(
                "expected property reference or literal, found {}",
                t.describe()
            ))),
            None => Err(self.err("expected property reference or literal, found end of input")),
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.operand()?;
        let op = match self.peek() {
            Some(Tok::Eq) => CmpOp::Eq,
            Some(Tok::Ne) => CmpOp::Ne,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Le) => CmpOp::Le,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::Ge) => CmpOp::Ge,
            _ => return Err(self.err("expected comparison operator")),
        };
        self.pos += 1;
        let rhs = self.operand()?;
        Ok(Expr::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// Conjunction of comparisons.
    pub fn expr(&mut self) -> Result<Expr> {
        let mut out = self.comparison()?;
        while self.eat_keyword("AND") {
            let rhs = self.comparison()?;
            out = Expr::And(Box::new(out), Box::new(rhs));
        }
        Ok(out)
    }

    // Rule blocks and views

    fn skolem_spec(&mut self) -> Result<SkolemSpec> {
        let var = self.ident()?;
        self.expect(&Tok::Eq)?;
        self.expect_keyword("SK")?;
        self.expect(&Tok::LParen)?;
        let func = self.string()?;
        let mut args = Vec::new();
        while self.peek() == Some(&Tok::Comma) {
            self.pos += 1;
            args.push(self.ident()?);
        }
        self.expect(&Tok::RParen)?;
        Ok(SkolemSpec { var, func, args })
    }

    fn rule_block(&mut self) -> Result<RuleBlock> {
        self.expect_keyword("MATCH")?;
        let pattern = self.pattern()?;
        let filter = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        let mut mappings = Vec::new();
        while self.eat_keyword("MAP") {
            let from = self.ident()?;
            self.expect_keyword("TO")?;
            let to = self.ident()?;
            mappings.push(Mapping { from, to });
        }
        let construct = if self.eat_keyword("CONSTRUCT") {
            let p = self.pattern()?;
            if p.edges.iter().any(|e| e.star) {
                return Err(self.err("CONSTRUCT patterns cannot contain '*'"));
            }
            Some(p)
        } else {
            None
        };
        let mut adds = Vec::new();
        while self.eat_keyword("ADD") {
            let p = self.pattern()?;
            if p.edges.iter().any(|e| e.star) {
                return Err(self.err("ADD patterns cannot contain '*'"));
            }
            adds.push(p);
        }
        let mut deletes = Vec::new();
        while self.eat_keyword("DELETE") {
            deletes.push(self.ident()?);
        }
        let mut skolems = Vec::new();
        while self.eat_keyword("SET") {
            skolems.push(self.skolem_spec()?);
        }
        Ok(RuleBlock {
            pattern,
            filter,
            mappings,
            construct,
            adds,
            deletes,
            skolems,
        })
    }

    fn view_kind(&mut self) -> Result<ViewKind> {
        if self.eat_keyword("virtual") {
            Ok(ViewKind::Virtual)
        } else if self.eat_keyword("materialized") {
            Ok(ViewKind::Materialized)
        } else if self.eat_keyword("hybrid") {
            Ok(ViewKind::Hybrid)
        } else {
            Err(self.err("expected view kind: virtual, materialized, or hybrid"))
        }
    }

    /// `CREATE kind VIEW name ON src [WITH DEFAULT MAP] ( block (UNION block)* )`
    pub fn view_def(&mut self) -> Result<ViewDef> {
        self.expect_keyword("CREATE")?;
        let kind = self.view_kind()?;
        self.expect_keyword("VIEW")?;
        let name = self.ident()?;
        self.expect_keyword("ON")?;
        let source = self.ident()?;
        let default_map = if self.eat_keyword("WITH") {
            self.expect_keyword("DEFAULT")?;
            self.expect_keyword("MAP")?;
            true
        } else {
            false
        };
        self.expect(&Tok::LParen)?;
        let mut blocks = vec![self.rule_block()?];
        while self.eat_keyword("UNION") {
            blocks.push(self.rule_block()?);
        }
        self.expect(&Tok::RParen)?;
        Ok(ViewDef {
            name,
            kind,
            source,
            default_map,
            blocks,
        })
    }

    /// `MATCH pattern FROM src [WHERE expr] RETURN (v),...`
    pub fn query(&mut self) -> Result<Query> {
        self.expect_keyword("MATCH")?;
        let pattern = self.pattern()?;
        self.expect_keyword("FROM")?;
        let source = self.ident()?;
        let filter = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        self.expect_keyword("RETURN")?;
        let mut returns = Vec::new();
        loop {
            self.expect(&Tok::LParen)?;
            returns.push(self.ident()?);
            self.expect(&Tok::RParen)?;
            if self.peek() == Some(&Tok::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(Query {
            pattern,
            source,
            filter,
            returns,
        })
    }

    /// Consume a signed integer.
    pub fn integer(&mut self) -> Result<i64> {
        let negative = if self.peek() == Some(&Tok::Dash) {
            self.pos += 1;
            true
        } else {
            false
        };
        match self.peek().cloned() {
            Some(Tok::Num(s)) => {
                self.pos += 1;
                let n: i64 = s
                    .parse()
                    .map_err(|_| self.err(format!("invalid integer '{s}'")))?;
                Ok(if negative { -n } else { n })
            }
            Some(t) => Err(self.err(format!("expected integer, found {}", t.describe()))),
            None => Err(self.err("expected integer, found end of input")),
        }
    }

    /// Consume a quoted string.
    pub fn quoted(&mut self) -> Result<String> {
        self.string()
    }

    /// Expect a specific punctuation token (statement layer).
    pub fn punct(&mut self, tok: Tok) -> Result<()> {
        self.expect(&tok)
    }

    /// Fail unless the stream is exhausted.
    pub fn finish(&self) -> Result<()> {
        self.expect_end()
    }
}

/// Parse a complete view definition.
pub fn parse_view(input: &str) -> Result<ViewDef> {
    let mut p = Parser::new(input)?;
    let view = p.view_def()?;
    p.expect_end()?;
    Ok(view)
}

/// Parse a complete query.
pub fn parse_query(input: &str) -> Result<Query> {
    let mut p = Parser::new(input)?;
    let q = p.query()?;
    p.expect_end()?;
    Ok(q)
}
