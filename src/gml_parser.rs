//! GML reader for topology snapshots.
//!
//! Snapshots are written by the simulator in the networkx GML dialect:
//!
//! ```text
//! graph [
//!   cycle 12
//!   node [ id 0 label "0" location 0.4183 adversary 0 ]
//!   edge [ source 0 target 3 ]
//! ]
//! ```
//!
//! The reader is generic over attributes: every key/value pair is kept as a
//! [`GmlValue`], and the topology layer picks out the ones it understands.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use color_eyre::eyre::{eyre, Context, Result};

/// A single GML attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum GmlValue {
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<(String, GmlValue)>),
}

impl GmlValue {
    /// Numeric view of the value; integer-looking strings are accepted too
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GmlValue::Int(i) => Some(*i as f64),
            GmlValue::Real(r) => Some(*r),
            GmlValue::Str(s) => s.trim().parse().ok(),
            GmlValue::List(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GmlValue::Int(i) => Some(*i),
            GmlValue::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            GmlValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthiness for flag attributes such as `adversary`
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            GmlValue::Int(i) => Some(*i != 0),
            GmlValue::Real(r) => Some(*r != 0.0),
            GmlValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            },
            GmlValue::List(_) => None,
        }
    }
}

/// A node block with its id pulled out
#[derive(Debug, Clone)]
pub struct GmlNode {
    pub id: u32,
    pub attributes: HashMap<String, GmlValue>,
}

impl GmlNode {
    pub fn attr(&self, key: &str) -> Option<&GmlValue> {
        self.attributes.get(key)
    }
}

/// An edge block with its endpoints pulled out
#[derive(Debug, Clone)]
pub struct GmlEdge {
    pub source: u32,
    pub target: u32,
    pub attributes: HashMap<String, GmlValue>,
}

/// Parsed `graph [ ... ]` block. Node and edge order follows the file.
#[derive(Debug, Clone, Default)]
pub struct GmlGraph {
    pub nodes: Vec<GmlNode>,
    pub edges: Vec<GmlEdge>,
    pub attributes: HashMap<String, GmlValue>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Int(i64),
    Real(f64),
    Str(String),
    Open,
    Close,
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if ch == Some('\n') {
            self.line += 1;
        }
        ch
    }

    fn skip_trivia(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let start_line = self.line;
        self.bump();
        let mut out = String::new();
        while let Some(ch) = self.bump() {
            match ch {
                '"' => return Ok(out),
                // networkx escapes non-ASCII as XML character references
                '&' => {
                    let mut entity = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c == ';' || entity.len() > 10 {
                            break;
                        }
                        entity.push(c);
                        self.bump();
                    }
                    if self.chars.peek() == Some(&';') {
                        self.bump();
                        out.push_str(&decode_entity(&entity));
                    } else {
                        out.push('&');
                        out.push_str(&entity);
                    }
                }
                _ => out.push(ch),
            }
        }
        Err(eyre!("Unterminated string starting on line {}", start_line))
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '+') {
                word.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };
        match ch {
            '[' => {
                self.bump();
                Ok(Token::Open)
            }
            ']' => {
                self.bump();
                Ok(Token::Close)
            }
            '"' => Ok(Token::Str(self.read_string()?)),
            c if c.is_alphabetic() || c == '_' => {
                let word = self.read_word();
                // networkx writes non-finite reals as bare words
                match word.as_str() {
                    "NAN" | "NaN" | "nan" => Ok(Token::Real(f64::NAN)),
                    "INF" | "inf" => Ok(Token::Real(f64::INFINITY)),
                    _ => Ok(Token::Key(word)),
                }
            }
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                let word = self.read_word();
                if let Ok(i) = word.parse::<i64>() {
                    Ok(Token::Int(i))
                } else if let Ok(r) = word.parse::<f64>() {
                    Ok(Token::Real(r))
                } else {
                    Err(eyre!("Invalid number '{}' on line {}", word, self.line))
                }
            }
            c => Err(eyre!("Unexpected character '{}' on line {}", c, self.line)),
        }
    }
}

fn decode_entity(entity: &str) -> String {
    match entity {
        "amp" => "&".to_string(),
        "quot" => "\"".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "apos" => "'".to_string(),
        _ => entity
            .strip_prefix('#')
            .and_then(|code| code.parse::<u32>().ok())
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| format!("&{};", entity)),
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn parse_value(&mut self) -> Result<GmlValue> {
        match self.advance()? {
            Token::Int(i) => Ok(GmlValue::Int(i)),
            Token::Real(r) => Ok(GmlValue::Real(r)),
            Token::Str(s) => Ok(GmlValue::Str(s)),
            Token::Open => {
                let pairs = self.parse_pairs(true)?;
                Ok(GmlValue::List(pairs))
            }
            other => Err(eyre!(
                "Expected value on line {}, found {:?}",
                self.lexer.line,
                other
            )),
        }
    }

    /// Key/value pairs up to the closing bracket (or end of input at top level)
    fn parse_pairs(&mut self, nested: bool) -> Result<Vec<(String, GmlValue)>> {
        let mut pairs = Vec::new();
        loop {
            match self.advance()? {
                Token::Key(key) => {
                    let value = self.parse_value()?;
                    pairs.push((key, value));
                }
                Token::Close if nested => return Ok(pairs),
                Token::Eof if !nested => return Ok(pairs),
                Token::Eof => return Err(eyre!("Unexpected end of input inside a list")),
                other => {
                    return Err(eyre!(
                        "Expected key on line {}, found {:?}",
                        self.lexer.line,
                        other
                    ))
                }
            }
        }
    }
}

fn endpoint(attributes: &HashMap<String, GmlValue>, key: &str) -> Result<u32> {
    let value = attributes
        .get(key)
        .ok_or_else(|| eyre!("Edge missing required '{}' attribute", key))?;
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| eyre!("Invalid edge {}: {:?}", key, value))
}

fn into_graph(pairs: Vec<(String, GmlValue)>) -> Result<GmlGraph> {
    let mut graph = GmlGraph::default();
    for (key, value) in pairs {
        match (key.as_str(), value) {
            ("node", GmlValue::List(items)) => {
                let attributes: HashMap<String, GmlValue> = items.into_iter().collect();
                let id = attributes
                    .get("id")
                    .and_then(GmlValue::as_i64)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| eyre!("Node missing a valid 'id' attribute"))?;
                graph.nodes.push(GmlNode { id, attributes });
            }
            ("edge", GmlValue::List(items)) => {
                let attributes: HashMap<String, GmlValue> = items.into_iter().collect();
                let source = endpoint(&attributes, "source")?;
                let target = endpoint(&attributes, "target")?;
                graph.edges.push(GmlEdge {
                    source,
                    target,
                    attributes,
                });
            }
            (_, value) => {
                graph.attributes.insert(key, value);
            }
        }
    }
    Ok(graph)
}

/// Parse GML text containing a top-level `graph [ ... ]` block
pub fn parse_gml_str(content: &str) -> Result<GmlGraph> {
    let mut parser = Parser::new(content)?;
    let top = parser.parse_pairs(false)?;
    let body = top
        .into_iter()
        .find_map(|(key, value)| match (key.as_str(), value) {
            ("graph", GmlValue::List(items)) => Some(items),
            _ => None,
        })
        .ok_or_else(|| eyre!("No 'graph [ ... ]' block found"))?;
    into_graph(body)
}

/// Parse a GML file
pub fn parse_gml_file(path: &Path) -> Result<GmlGraph> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read GML file {}", path.display()))?;
    parse_gml_str(&content).with_context(|| format!("Failed to parse GML file {}", path.display()))
}

/// Check for duplicate node ids and edges that reference unknown nodes
pub fn validate_topology(graph: &GmlGraph) -> Result<(), String> {
    let mut node_ids = HashSet::new();
    for node in &graph.nodes {
        if !node_ids.insert(node.id) {
            return Err(format!("Duplicate node ID: {}", node.id));
        }
    }

    for edge in &graph.edges {
        if !node_ids.contains(&edge.source) {
            return Err(format!("Edge references non-existent source node: {}", edge.source));
        }
        if !node_ids.contains(&edge.target) {
            return Err(format!("Edge references non-existent target node: {}", edge.target));
        }
    }

    Ok(())
}
