// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A parser for the subset of the DOT graph language used to describe
//! network topologies.
//!
//! Supported:
//!  - `graph` or `digraph`, optionally `strict`, with an optional name.
//!  - Node statements with attribute lists: `s1 [type=switch]`.
//!  - Edge chains with either operator: `h1 -- s1 -- h2`, `h1 -> s1`.
//!    Edges are always treated as undirected links.
//!  - Default attribute statements: `node [..]`, `edge [..]`, `graph [..]`
//!    and `key=value` graph attributes.
//!  - `;` and `,` separators, quoted strings and `//`, `/* */` and `#`
//!    comments.
//!
//! Node attributes:
//!  - `type`: `host` or `switch`. Without it the kind comes from the name,
//!    `h*` being a host and `s*` a switch.
//!  - `role`: `client` (default), `server` or `gateway`.
//!  - `services`: comma separated list of `http` and `ftp`.
//!  - `connect_delay`: switch control-plane handshake delay.
//!
//! Edge attributes are `bw` (Mbit/s unless a unit is given) and `delay`
//! (milliseconds unless a unit is given).

use std::collections::HashMap;

use crate::units::{parse_bandwidth_mbps, parse_delay_ms};
use crate::{HostRole, LinkAttrs, NodeKind, Service, Topology, TopologyBuilder, TopologyError};

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Id(String),
    Quoted(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
    Semi,
    Comma,
    EdgeOp,
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    line: usize,
}

fn parse_error<T>(line: usize, msg: impl Into<String>) -> Result<T, TopologyError> {
    Err(TopologyError::Parse {
        line,
        msg: msg.into(),
    })
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn lex(input: &str) -> Result<Vec<Token>, TopologyError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '#' => {
                while chars.peek().is_some_and(|c| *c != '\n') {
                    chars.next();
                }
            }
            '/' => match chars.next() {
                Some('/') => {
                    while chars.peek().is_some_and(|c| *c != '\n') {
                        chars.next();
                    }
                }
                Some('*') => {
                    let start = line;
                    let mut prev = ' ';
                    loop {
                        match chars.next() {
                            Some('/') if prev == '*' => break,
                            Some(c) => {
                                if c == '\n' {
                                    line += 1;
                                }
                                prev = c;
                            }
                            None => return parse_error(start, "Unterminated comment"),
                        }
                    }
                }
                _ => return parse_error(line, "Unexpected '/'"),
            },
            '{' => tokens.push(Token { tok: Tok::LBrace, line }),
            '}' => tokens.push(Token { tok: Tok::RBrace, line }),
            '[' => tokens.push(Token { tok: Tok::LBracket, line }),
            ']' => tokens.push(Token { tok: Tok::RBracket, line }),
            '=' => tokens.push(Token { tok: Tok::Eq, line }),
            ';' => tokens.push(Token { tok: Tok::Semi, line }),
            ',' => tokens.push(Token { tok: Tok::Comma, line }),
            '-' => match chars.peek() {
                Some('-' | '>') => {
                    chars.next();
                    tokens.push(Token { tok: Tok::EdgeOp, line });
                }
                _ => return parse_error(line, "Expected '--' or '->'"),
            },
            '"' => {
                let start = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => s.push('"'),
                            Some(c) => {
                                s.push('\\');
                                s.push(c);
                            }
                            None => return parse_error(start, "Unterminated string"),
                        },
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            s.push(c);
                        }
                        None => return parse_error(start, "Unterminated string"),
                    }
                }
                tokens.push(Token {
                    tok: Tok::Quoted(s),
                    line: start,
                });
            }
            c if is_id_char(c) => {
                let mut s = String::from(c);
                while let Some(&c) = chars.peek() {
                    if !is_id_char(c) {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                tokens.push(Token { tok: Tok::Id(s), line });
            }
            c => return parse_error(line, format!("Unexpected character '{c}'")),
        }
    }
    Ok(tokens)
}

type Attrs = HashMap<String, (String, usize)>;

struct NodeDecl {
    name: String,
    line: usize,
    attrs: Attrs,
}

struct EdgeDecl {
    a: String,
    b: String,
    line: usize,
    attrs: Attrs,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    strict: bool,
    nodes: Vec<NodeDecl>,
    node_index: HashMap<String, usize>,
    edges: Vec<EdgeDecl>,
    node_defaults: Attrs,
    edge_defaults: Attrs,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            strict: false,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            node_defaults: HashMap::new(),
            edge_defaults: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Tok, what: &str) -> Result<(), TopologyError> {
        let line = self.line();
        match self.next() {
            Some(t) if t.tok == *expected => Ok(()),
            Some(t) => parse_error(t.line, format!("Expected {what}, found {:?}", t.tok)),
            None => parse_error(line, format!("Expected {what}, found end of input")),
        }
    }

    fn identifier(&mut self) -> Result<String, TopologyError> {
        let line = self.line();
        match self.next() {
            Some(Token {
                tok: Tok::Id(s) | Tok::Quoted(s),
                ..
            }) => Ok(s),
            Some(t) => parse_error(t.line, format!("Expected an identifier, found {:?}", t.tok)),
            None => parse_error(line, "Expected an identifier, found end of input"),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Id(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn parse_graph(&mut self) -> Result<(), TopologyError> {
        if self.is_keyword("strict") {
            self.strict = true;
            self.pos += 1;
        }
        if self.is_keyword("graph") || self.is_keyword("digraph") {
            self.pos += 1;
        } else {
            return parse_error(self.line(), "Expected 'graph' or 'digraph'");
        }
        if matches!(self.peek(), Some(Tok::Id(_) | Tok::Quoted(_))) {
            self.pos += 1;
        }
        self.expect(&Tok::LBrace, "'{'")?;

        loop {
            match self.peek() {
                Some(Tok::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::Semi | Tok::Comma) => self.pos += 1,
                Some(_) => self.parse_stmt()?,
                None => return parse_error(self.line(), "Missing closing '}'"),
            }
        }

        if self.pos < self.tokens.len() {
            return parse_error(self.line(), "Unexpected content after the graph");
        }
        Ok(())
    }

    fn parse_attr_list(&mut self) -> Result<Attrs, TopologyError> {
        let mut attrs = HashMap::new();
        while self.peek() == Some(&Tok::LBracket) {
            self.pos += 1;
            loop {
                match self.peek() {
                    Some(Tok::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(Tok::Semi | Tok::Comma) => self.pos += 1,
                    Some(_) => {
                        let line = self.line();
                        let key = self.identifier()?;
                        self.expect(&Tok::Eq, "'='")?;
                        let value = self.identifier()?;
                        attrs.insert(key.to_ascii_lowercase(), (value, line));
                    }
                    None => return parse_error(self.line(), "Missing closing ']'"),
                }
            }
        }
        Ok(attrs)
    }

    fn parse_stmt(&mut self) -> Result<(), TopologyError> {
        let line = self.line();
        if self.is_keyword("subgraph") {
            return parse_error(line, "Subgraphs are not supported");
        }
        for keyword in ["graph", "node", "edge"] {
            if self.is_keyword(keyword) {
                self.pos += 1;
                let attrs = self.parse_attr_list()?;
                match keyword {
                    "node" => self.node_defaults.extend(attrs),
                    "edge" => self.edge_defaults.extend(attrs),
                    _ => {}
                }
                return Ok(());
            }
        }

        let first = self.identifier()?;
        if self.peek() == Some(&Tok::Eq) {
            // Graph attribute, which carries nothing a topology needs.
            self.pos += 1;
            self.identifier()?;
            return Ok(());
        }

        let mut chain = vec![first];
        while self.peek() == Some(&Tok::EdgeOp) {
            self.pos += 1;
            chain.push(self.identifier()?);
        }
        let attrs = self.parse_attr_list()?;

        if chain.len() == 1 {
            self.declare_node(&chain[0], line, attrs);
        } else {
            for name in &chain {
                self.declare_node(name, line, HashMap::new());
            }
            let mut edge_attrs = self.edge_defaults.clone();
            edge_attrs.extend(attrs);
            for pair in chain.windows(2) {
                self.declare_edge(&pair[0], &pair[1], line, edge_attrs.clone());
            }
        }
        Ok(())
    }

    fn declare_node(&mut self, name: &str, line: usize, attrs: Attrs) {
        match self.node_index.get(name) {
            Some(&index) => self.nodes[index].attrs.extend(attrs),
            None => {
                let mut all = self.node_defaults.clone();
                all.extend(attrs);
                self.node_index.insert(name.to_string(), self.nodes.len());
                self.nodes.push(NodeDecl {
                    name: name.to_string(),
                    line,
                    attrs: all,
                });
            }
        }
    }

    fn declare_edge(&mut self, a: &str, b: &str, line: usize, attrs: Attrs) {
        if self.strict {
            if let Some(edge) = self
                .edges
                .iter_mut()
                .find(|e| (e.a == a && e.b == b) || (e.a == b && e.b == a))
            {
                edge.attrs.extend(attrs);
                return;
            }
        }
        self.edges.push(EdgeDecl {
            a: a.to_string(),
            b: b.to_string(),
            line,
            attrs,
        });
    }
}

fn node_kind(decl: &NodeDecl) -> Result<NodeKind, TopologyError> {
    if let Some((value, line)) = decl.attrs.get("type") {
        return match value.to_ascii_lowercase().as_str() {
            "host" => Ok(NodeKind::Host),
            "switch" => Ok(NodeKind::Switch),
            _ => parse_error(*line, format!("Node '{}' has unknown type '{value}'", decl.name)),
        };
    }
    if decl.attrs.contains_key("role") {
        return Ok(NodeKind::Host);
    }
    match decl.name.chars().next() {
        Some('h' | 'H') => Ok(NodeKind::Host),
        Some('s' | 'S') => Ok(NodeKind::Switch),
        _ => parse_error(
            decl.line,
            format!(
                "Cannot tell whether '{}' is a host or a switch; add a type attribute",
                decl.name
            ),
        ),
    }
}

fn host_role(decl: &NodeDecl) -> Result<HostRole, TopologyError> {
    match decl.attrs.get("role") {
        None => Ok(HostRole::Client),
        Some((value, line)) => match value.to_ascii_lowercase().as_str() {
            "client" => Ok(HostRole::Client),
            "server" => Ok(HostRole::Server),
            "gateway" | "nat" => Ok(HostRole::Gateway),
            _ => parse_error(*line, format!("Node '{}' has unknown role '{value}'", decl.name)),
        },
    }
}

fn services(value: &str, line: usize) -> Result<Vec<Service>, TopologyError> {
    let mut services = Vec::new();
    for s in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match s.to_ascii_lowercase().as_str() {
            "http" => services.push(Service::Http),
            "ftp" => services.push(Service::Ftp),
            "none" => {}
            _ => return parse_error(line, format!("Unknown service '{s}'")),
        }
    }
    Ok(services)
}

fn link_attrs(edge: &EdgeDecl) -> Result<LinkAttrs, TopologyError> {
    let mut attrs = LinkAttrs::default();
    if let Some((value, line)) = edge.attrs.get("bw") {
        attrs.bandwidth_mbps = parse_bandwidth_mbps(value).or_else(|e| parse_error(*line, e))?;
    }
    if let Some((value, line)) = edge.attrs.get("delay") {
        attrs.delay_ms = parse_delay_ms(value).or_else(|e| parse_error(*line, e))?;
    }
    Ok(attrs)
}

/// Parse a DOT description into a [`Topology`].
pub fn parse(input: &str) -> Result<Topology, TopologyError> {
    let mut parser = Parser::new(lex(input)?);
    parser.parse_graph()?;

    let mut builder = TopologyBuilder::new();
    for decl in &parser.nodes {
        let id = match node_kind(decl)? {
            NodeKind::Host => builder.add_host(&decl.name, host_role(decl)?)?,
            NodeKind::Switch => {
                if decl.attrs.contains_key("role") || decl.attrs.contains_key("services") {
                    return parse_error(
                        decl.line,
                        format!("Switch '{}' cannot have a role or services", decl.name),
                    );
                }
                builder.add_switch(&decl.name)?
            }
        };
        if let Some((value, line)) = decl.attrs.get("services") {
            builder.set_services(id, services(value, *line)?)?;
        }
        if let Some((value, line)) = decl.attrs.get("connect_delay") {
            let delay_ms = parse_delay_ms(value).or_else(|e| parse_error(*line, e))?;
            builder
                .set_connect_delay(id, delay_ms)
                .or_else(|e| parse_error(*line, e.to_string()))?;
        }
    }

    for edge in &parser.edges {
        let attrs = link_attrs(edge)?;
        let (Some(a), Some(b)) = (builder.id_of(&edge.a), builder.id_of(&edge.b)) else {
            return parse_error(edge.line, format!("Unknown node in {} -- {}", edge.a, edge.b));
        };
        builder
            .add_link(a, b, attrs)
            .or_else(|e| parse_error(edge.line, e.to_string()))?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<Tok> {
        lex(s).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn lex_edge_chain() {
        assert_eq!(
            toks("a -- b -> c;"),
            vec![
                Tok::Id("a".into()),
                Tok::EdgeOp,
                Tok::Id("b".into()),
                Tok::EdgeOp,
                Tok::Id("c".into()),
                Tok::Semi
            ]
        );
    }

    #[test]
    fn lex_skips_comments() {
        let tokens = lex("# hash\n// line\n/* block\n over lines */ x").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].tok, Tok::Id("x".into()));
        assert_eq!(tokens[0].line, 4);
    }

    #[test]
    fn lex_quoted_strings() {
        assert_eq!(
            toks(r#"bw="100 Mbps""#),
            vec![
                Tok::Id("bw".into()),
                Tok::Eq,
                Tok::Quoted("100 Mbps".into())
            ]
        );
    }

    #[test]
    fn lex_errors_report_line() {
        match lex("a\nb\n\"open") {
            Err(TopologyError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(lex("a - b").is_err());
    }

    #[test]
    fn strict_merges_parallel_edges() {
        let topology = parse("strict graph { h1 -- s1; s1 -- h1 [bw=10]; }").unwrap();
        assert_eq!(topology.links().len(), 1);
        assert_eq!(topology.links()[0].attrs.bandwidth_mbps, 10.0);

        let topology = parse("graph { h1 -- s1; s1 -- h1 [bw=10]; }").unwrap();
        assert_eq!(topology.links().len(), 2);
    }
}
