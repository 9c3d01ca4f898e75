//! Command surface.
//!
//! Parses one command line into a [`Statement`]. Keywords are
//! case-insensitive, so `create graph g` and `CREATE VIEW ...` both
//! dispatch through the same entry point. View definitions and queries are
//! delegated to the pattern-language parser.

use std::str::FromStr;

use crate::ast::{Query, ViewDef};
use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::parser::{Parser, Tok};

/// Base relation names accepted by `insert` and `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    N,
    E,
    Np,
    Ep,
}

impl RelKind {
    pub fn arity(&self) -> usize {
        match self {
            RelKind::N => 2,
            RelKind::E => 4,
            RelKind::Np | RelKind::Ep => 3,
        }
    }

    fn parse(s: &str) -> Option<RelKind> {
        match s {
            "N" => Some(RelKind::N),
            "E" => Some(RelKind::E),
            "NP" => Some(RelKind::Np),
            "EP" => Some(RelKind::Ep),
            _ => None,
        }
    }
}

/// A single base fact.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertFact {
    Node { id: i64, label: String },
    Edge { id: i64, src: i64, dst: i64, label: String },
    NodeProp { id: i64, key: String, value: String },
    EdgeProp { id: i64, key: String, value: String },
}

/// The session options toggled by `option <name> (on|off)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionName {
    Typecheck,
    PruneQuery,
    Ivm,
    Answer,
}

impl OptionName {
    fn parse(s: &str) -> Option<OptionName> {
        match s.to_ascii_lowercase().as_str() {
            "typecheck" => Some(OptionName::Typecheck),
            "prunequery" => Some(OptionName::PruneQuery),
            "ivm" => Some(OptionName::Ivm),
            "answer" => Some(OptionName::Answer),
            _ => None,
        }
    }
}

/// One parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Connect(BackendKind),
    Disconnect,
    CreateGraph(String),
    DropGraph(String),
    UseGraph(String),
    ListGraphs,
    CreateNodeLabel(String),
    CreateEdgeLabel { label: String, src: String, dst: String },
    ShowSchema,
    Insert(InsertFact),
    Import { rel: RelKind, path: String },
    CreateView(ViewDef),
    DropView(String),
    Refresh(String),
    Query(Query),
    ListViews,
    ShowProgram,
    ShowEgds,
    Status,
    SetOption { name: OptionName, value: bool },
    Quit,
}

/// Parse one command line.
pub fn parse_statement(input: &str) -> Result<Statement> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::parse(1, 1, "empty command"));
    }

    let mut p = Parser::new(trimmed)?;
    let head = p.ident()?;
    let stmt = match head.to_ascii_lowercase().as_str() {
        "connect" => Statement::Connect(BackendKind::from_str(&p.ident()?)?),
        "disconnect" => Statement::Disconnect,
        "use" => Statement::UseGraph(p.ident()?),
        "list" => Statement::ListGraphs,
        "schema" => Statement::ShowSchema,
        "views" => Statement::ListViews,
        "program" => Statement::ShowProgram,
        "egds" => Statement::ShowEgds,
        "status" => Statement::Status,
        "refresh" => Statement::Refresh(p.ident()?),
        "quit" | "exit" => Statement::Quit,
        "create" => return parse_create(trimmed),
        "drop" => {
            let what = p.ident()?;
            match what.to_ascii_lowercase().as_str() {
                "graph" => Statement::DropGraph(p.ident()?),
                "view" => Statement::DropView(p.ident()?),
                other => {
                    return Err(Error::parse(
                        1,
                        1,
                        format!("expected 'graph' or 'view' after drop, found '{other}'"),
                    ))
                }
            }
        }
        "insert" => parse_insert(&mut p)?,
        "import" => {
            let rel_name = p.ident()?;
            let rel = RelKind::parse(&rel_name).ok_or_else(|| {
                Error::parse(1, 1, format!("unknown relation '{rel_name}' in import"))
            })?;
            if !p.eat_keyword("from") {
                return Err(Error::parse(1, 1, "expected 'from' in import"));
            }
            let path = p.quoted()?;
            Statement::Import { rel, path }
        }
        "option" => {
            let name_text = p.ident()?;
            let name = OptionName::parse(&name_text)
                .ok_or_else(|| Error::parse(1, 1, format!("unknown option '{name_text}'")))?;
            let value_text = p.ident()?;
            let value = match value_text.to_ascii_lowercase().as_str() {
                "on" => true,
                "off" => false,
                other => {
                    return Err(Error::parse(
                        1,
                        1,
                        format!("expected 'on' or 'off', found '{other}'"),
                    ))
                }
            };
            Statement::SetOption { name, value }
        }
        "match" => {
            let mut p = Parser::new(trimmed)?;
            let q = p.query()?;
            p.finish()?;
            return Ok(Statement::Query(q));
        }
        other => {
            return Err(Error::parse(1, 1, format!("unknown command '{other}'")));
        }
    };
    p.finish()?;
    Ok(stmt)
}

/// `create graph g`, `create node L`, `create edge L(L1 -> L2)`, or a full
/// `CREATE ... VIEW` definition.
fn parse_create(input: &str) -> Result<Statement> {
    let mut p = Parser::new(input)?;
    p.ident()?; // create
    if p.eat_keyword("graph") {
        let name = p.ident()?;
        p.finish()?;
        return Ok(Statement::CreateGraph(name));
    }
    if p.eat_keyword("node") {
        let label = p.ident()?;
        p.finish()?;
        return Ok(Statement::CreateNodeLabel(label));
    }
    if p.eat_keyword("edge") {
        let label = p.ident()?;
        p.punct(Tok::LParen)?;
        let src = p.ident()?;
        p.punct(Tok::Arrow)?;
        let dst = p.ident()?;
        p.punct(Tok::RParen)?;
        p.finish()?;
        return Ok(Statement::CreateEdgeLabel { label, src, dst });
    }
    // Anything else is a view definition; re-parse from the start so the
    // view parser sees the whole command.
    let mut p = Parser::new(input)?;
    let view = p.view_def()?;
    p.finish()?;
    Ok(Statement::CreateView(view))
}

/// `insert N(id, "L")` and friends.
fn parse_insert(p: &mut Parser) -> Result<Statement> {
    let rel_name = p.ident()?;
    let rel = RelKind::parse(&rel_name)
        .ok_or_else(|| Error::parse(1, 1, format!("unknown relation '{rel_name}' in insert")))?;
    p.punct(Tok::LParen)?;
    let fact = match rel {
        RelKind::N => {
            let id = p.integer()?;
            p.punct(Tok::Comma)?;
            let label = p.quoted()?;
            InsertFact::Node { id, label }
        }
        RelKind::E => {
            let id = p.integer()?;
            p.punct(Tok::Comma)?;
            let src = p.integer()?;
            p.punct(Tok::Comma)?;
            let dst = p.integer()?;
            p.punct(Tok::Comma)?;
            let label = p.quoted()?;
            InsertFact::Edge { id, src, dst, label }
        }
        RelKind::Np | RelKind::Ep => {
            let id = p.integer()?;
            p.punct(Tok::Comma)?;
            let key = p.quoted()?;
            p.punct(Tok::Comma)?;
            let value = p.quoted()?;
            if rel == RelKind::Np {
                InsertFact::NodeProp { id, key, value }
            } else {
                InsertFact::EdgeProp { id, key, value }
            }
        }
    };
    p.punct(Tok::RParen)?;
    Ok(Statement::Insert(fact))
}

/// Build an [`InsertFact`] from CSV row fields.
pub fn fact_from_fields(rel: RelKind, fields: &[String]) -> Result<InsertFact> {
    let int = |s: &String| -> Result<i64> {
        s.parse::<i64>()
            .map_err(|_| Error::parse(1, 1, format!("invalid identifier '{s}'")))
    };
    match rel {
        RelKind::N => Ok(InsertFact::Node {
            id: int(&fields[0])?,
            label: fields[1].clone(),
        }),
        RelKind::E => Ok(InsertFact::Edge {
            id: int(&fields[0])?,
            src: int(&fields[1])?,
            dst: int(&fields[2])?,
            label: fields[3].clone(),
        }),
        RelKind::Np => Ok(InsertFact::NodeProp {
            id: int(&fields[0])?,
            key: fields[1].clone(),
            value: fields[2].clone(),
        }),
        RelKind::Ep => Ok(InsertFact::EdgeProp {
            id: int(&fields[0])?,
            key: fields[1].clone(),
            value: fields[2].clone(),
        }),
    }
}
