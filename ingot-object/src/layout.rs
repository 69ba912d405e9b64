//! Memory layout descriptions.
//!
//! A layout file tells the linker which memory regions exist and which
//! sections go where:
//!
//! ```text
//! MEMORY flash LOCATION=0x08000000 SIZE=0x3000 {
//!   SECTION(code)
//!   ALIGN(4)
//! }
//! ```
//!
//! The grammar is case-sensitive; `#` starts a line comment. A layout with
//! no regions is valid and makes the linker place everything from address
//! zero in natural order. `Display` re-emits the grammar, and parsing the
//! output yields an equal layout.

use core::fmt;
use thiserror::Error;

/// A malformed layout file.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("layout parse error at line {line}: {message}")]
pub struct LayoutError {
    /// 1-based line of the offending token.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

/// One directive inside a memory region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Place the named section at the region cursor.
    Section(String),
    /// Advance the region cursor to the next multiple of the alignment.
    Align(u64),
}

/// A named memory region with a fixed location and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Region name.
    pub name: String,
    /// Base address.
    pub location: u64,
    /// Size in bytes.
    pub size: u64,
    /// Placement directives, in order.
    pub placements: Vec<Placement>,
}

impl MemoryRegion {
    /// Create an empty region.
    pub fn new(name: impl Into<String>, location: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            location,
            size,
            placements: Vec::new(),
        }
    }

    /// Append a placement directive.
    pub fn add_placement(&mut self, placement: Placement) {
        self.placements.push(placement);
    }
}

/// An ordered list of memory regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    /// The regions, in declaration order.
    pub memories: Vec<MemoryRegion>,
}

impl Layout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region.
    pub fn add_memory(&mut self, region: MemoryRegion) {
        self.memories.push(region);
    }

    /// Parse a layout file.
    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        Parser::new(text).parse_layout()
    }
}

impl core::str::FromStr for Layout {
    type Err = LayoutError;

    fn from_str(text: &str) -> Result<Self, LayoutError> {
        Self::parse(text)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for region in &self.memories {
            writeln!(
                f,
                "MEMORY {} LOCATION={:#x} SIZE={:#x} {{",
                region.name, region.location, region.size
            )?;
            for placement in &region.placements {
                match placement {
                    Placement::Section(name) => writeln!(f, "  SECTION({name})")?,
                    Placement::Align(n) => writeln!(f, "  ALIGN({n})")?,
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(u64),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Equals,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Tok::Ident(s) => write!(f, "{s}"),
            Tok::Number(n) => write!(f, "{n}"),
            Tok::LBrace => write!(f, "{{"),
            Tok::RBrace => write!(f, "}}"),
            Tok::LParen => write!(f, "("),
            Tok::RParen => write!(f, ")"),
            Tok::Equals => write!(f, "="),
        }
    }
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
    last_line: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut last_line = 1;
        for (lineno, line) in text.lines().enumerate() {
            let lineno = lineno + 1;
            last_line = lineno;
            let line = line.split('#').next().unwrap_or("");
            let mut chars = line.char_indices().peekable();
            while let Some(&(start, c)) = chars.peek() {
                match c {
                    c if c.is_whitespace() => {
                        chars.next();
                    }
                    '{' => {
                        chars.next();
                        tokens.push((lineno, Tok::LBrace));
                    }
                    '}' => {
                        chars.next();
                        tokens.push((lineno, Tok::RBrace));
                    }
                    '(' => {
                        chars.next();
                        tokens.push((lineno, Tok::LParen));
                    }
                    ')' => {
                        chars.next();
                        tokens.push((lineno, Tok::RParen));
                    }
                    '=' => {
                        chars.next();
                        tokens.push((lineno, Tok::Equals));
                    }
                    c if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
                        let mut end = start;
                        while let Some(&(i, c)) = chars.peek() {
                            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                                end = i + c.len_utf8();
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        tokens.push((lineno, Tok::Ident(line[start..end].to_string())));
                    }
                    c if c.is_ascii_digit() => {
                        let mut end = start;
                        while let Some(&(i, c)) = chars.peek() {
                            if c.is_ascii_alphanumeric() {
                                end = i + c.len_utf8();
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        let text = &line[start..end];
                        let value = if let Some(hex) = text
                            .strip_prefix("0x")
                            .or_else(|| text.strip_prefix("0X"))
                        {
                            u64::from_str_radix(hex, 16)
                        } else {
                            text.parse()
                        };
                        match value {
                            Ok(v) => tokens.push((lineno, Tok::Number(v))),
                            Err(_) => {
                                // Surface as a parse error at consume time
                                // by pushing an ident the grammar will
                                // reject.
                                tokens.push((lineno, Tok::Ident(text.to_string())));
                            }
                        }
                    }
                    _ => {
                        // Unknown character; emit a one-character ident so
                        // the grammar rejects it with a located error.
                        chars.next();
                        tokens.push((lineno, Tok::Ident(c.to_string())));
                    }
                }
            }
        }
        Self {
            tokens,
            pos: 0,
            last_line,
        }
    }

    fn error(&self, message: impl Into<String>) -> LayoutError {
        let line = self
            .tokens
            .get(self.pos)
            .map(|(l, _)| *l)
            .unwrap_or(self.last_line);
        LayoutError {
            line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Tok) -> Result<(), LayoutError> {
        match self.peek() {
            Some(tok) if tok == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.error(format!("expected `{expected}`, found `{tok}`"))),
            None => Err(self.error(format!("expected `{expected}`, found end of file"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, LayoutError> {
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s),
            Some(tok) => {
                self.pos -= 1;
                Err(self.error(format!("expected identifier, found `{tok}`")))
            }
            None => Err(self.error("expected identifier, found end of file")),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), LayoutError> {
        let ident = self.expect_ident()?;
        if ident == keyword {
            Ok(())
        } else {
            self.pos -= 1;
            Err(self.error(format!("expected `{keyword}`, found `{ident}`")))
        }
    }

    fn expect_number(&mut self) -> Result<u64, LayoutError> {
        match self.next() {
            Some(Tok::Number(n)) => Ok(n),
            Some(tok) => {
                self.pos -= 1;
                Err(self.error(format!("expected number, found `{tok}`")))
            }
            None => Err(self.error("expected number, found end of file")),
        }
    }

    fn parse_layout(&mut self) -> Result<Layout, LayoutError> {
        let mut layout = Layout::new();
        while self.peek().is_some() {
            layout.add_memory(self.parse_memory()?);
        }
        Ok(layout)
    }

    fn parse_memory(&mut self) -> Result<MemoryRegion, LayoutError> {
        self.expect_keyword("MEMORY")?;
        let name = self.expect_ident()?;
        self.expect_keyword("LOCATION")?;
        self.expect(&Tok::Equals)?;
        let location = self.expect_number()?;
        self.expect_keyword("SIZE")?;
        self.expect(&Tok::Equals)?;
        let size = self.expect_number()?;
        self.expect(&Tok::LBrace)?;
        let mut region = MemoryRegion::new(name, location, size);
        while self.peek() != Some(&Tok::RBrace) {
            let directive = self.expect_ident()?;
            match directive.as_str() {
                "SECTION" => {
                    self.expect(&Tok::LParen)?;
                    let section = self.expect_ident()?;
                    self.expect(&Tok::RParen)?;
                    region.add_placement(Placement::Section(section));
                }
                "ALIGN" => {
                    self.expect(&Tok::LParen)?;
                    let n = self.expect_number()?;
                    if n == 0 {
                        self.pos -= 1;
                        return Err(self.error("alignment must be positive"));
                    }
                    self.expect(&Tok::RParen)?;
                    region.add_placement(Placement::Align(n));
                }
                other => {
                    self.pos -= 1;
                    return Err(self.error(format!("unknown directive `{other}`")));
                }
            }
        }
        self.expect(&Tok::RBrace)?;
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_constructed() {
        let spec = "
            MEMORY flash LOCATION=0x1000 SIZE=0x3000 {
              SECTION(code)
              ALIGN(4)
            }
        ";
        let parsed: Layout = spec.parse().unwrap();

        let mut expected = Layout::new();
        let mut m = MemoryRegion::new("flash", 0x1000, 0x3000);
        m.add_placement(Placement::Section("code".to_string()));
        m.add_placement(Placement::Align(4));
        expected.add_memory(m);

        assert_eq!(parsed, expected);
    }

    #[test]
    fn same_text_parses_equal() {
        let spec = "
            MEMORY flash LOCATION=0x08000000 SIZE=0x3000 { SECTION(code) }
            MEMORY ram LOCATION=0x20000000 SIZE=0x3000 { SECTION(data) }
        ";
        let a: Layout = spec.parse().unwrap();
        let b: Layout = spec.parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn display_roundtrips() {
        let spec = "
            # comment
            MEMORY flash LOCATION=0x1000 SIZE=0x3000 {
              SECTION(code)   # trailing comment
              ALIGN(8)
              SECTION(rodata)
            }
            MEMORY ram LOCATION=0x20000000 SIZE=0x1000 {
              SECTION(data)
            }
        ";
        let layout: Layout = spec.parse().unwrap();
        let reparsed: Layout = layout.to_string().parse().unwrap();
        assert_eq!(layout, reparsed);
    }

    #[test]
    fn empty_layout_is_valid() {
        let layout: Layout = "".parse().unwrap();
        assert_eq!(layout, Layout::new());
        assert_eq!(layout.to_string(), "");
    }

    #[test]
    fn errors_carry_lines() {
        let err = Layout::parse("MEMORY flash PLACE=0x1000 SIZE=0 {}").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("LOCATION"));

        let err = Layout::parse("MEMORY x LOCATION=0 SIZE=0 {\n  JUNK(4)\n}").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("JUNK"));

        let err = Layout::parse("NOT_MEMORY").unwrap_err();
        assert!(err.message.contains("MEMORY"));
    }

    #[test]
    fn section_names_with_dots() {
        let layout = Layout::parse("MEMORY m LOCATION=0 SIZE=0x100 { SECTION(.text) }").unwrap();
        assert_eq!(
            layout.memories[0].placements,
            vec![Placement::Section(".text".to_string())]
        );
    }
}
