#![forbid(unsafe_code)]

//! Dot/bracket addressed locations inside a data tree.
//!
//! A [`Path`] is a sequence of [`Key`]s. Text form is `a.b[2].c`; quoted
//! bracket keys (`a["b c"]`, `a['b']`) name map entries that are not plain
//! identifiers.
//!
//! # Invariants
//!
//! 1. `Path::parse(p.to_string()) == p` for every path built from keys that
//!    contain no quote characters.
//! 2. `a.affects(b) == b.affects(a)`.
//! 3. The root path affects every path.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{Result, WeftError};

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub const fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<usize> for Key {
    fn from(idx: usize) -> Self {
        Self::Index(idx)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    keys: SmallVec<[Key; 4]>,
}

impl Path {
    /// The empty path, addressing the whole tree.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-key path naming a top-level entry.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        let mut keys = SmallVec::new();
        keys.push(Key::Name(name.into()));
        Self { keys }
    }

    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Parse `a.b[2].c` style text.
    pub fn parse(text: &str) -> Result<Self> {
        Parser::new(text).parse()
    }

    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.keys.is_empty()
    }

    /// Name of the first key, when it is a name.
    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        match self.keys.first() {
            Some(Key::Name(name)) => Some(name),
            _ => None,
        }
    }

    pub fn push(&mut self, key: impl Into<Key>) {
        self.keys.push(key.into());
    }

    /// This path extended by one key.
    #[must_use]
    pub fn child(&self, key: impl Into<Key>) -> Self {
        let mut next = self.clone();
        next.push(key);
        next
    }

    /// This path extended by every key of `rest`.
    #[must_use]
    pub fn join(&self, rest: &Path) -> Self {
        let mut next = self.clone();
        next.keys.extend(rest.keys.iter().cloned());
        next
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.keys.is_empty() {
            return None;
        }
        Some(Self {
            keys: self.keys[..self.keys.len() - 1].iter().cloned().collect(),
        })
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.keys.len() >= prefix.keys.len() && self.keys[..prefix.keys.len()] == prefix.keys[..]
    }

    /// Whether a change at `self` can be observed at `other`: one is a prefix
    /// of the other.
    #[must_use]
    pub fn affects(&self, other: &Path) -> bool {
        let shared = self.keys.len().min(other.keys.len());
        self.keys[..shared] == other.keys[..shared]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            match key {
                Key::Index(idx) => write!(f, "[{idx}]")?,
                Key::Name(name) if is_plain(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Key::Name(name) => write!(f, "[\"{name}\"]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn is_plain(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        && !name
            .chars()
            .any(|c| matches!(c, '.' | '[' | ']' | '"' | '\'') || c.is_whitespace())
}

struct Parser<'a> {
    text: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    keys: SmallVec<[Key; 4]>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
            keys: SmallVec::new(),
        }
    }

    fn fail(&self, reason: &'static str) -> WeftError {
        WeftError::invalid_path(self.text, reason)
    }

    fn parse(mut self) -> Result<Path> {
        if self.text.trim().is_empty() {
            return Ok(Path::root());
        }
        let mut expect_name = true;
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                '[' => {
                    self.chars.next();
                    self.bracket()?;
                    expect_name = false;
                }
                '.' => {
                    if expect_name {
                        return Err(self.fail("empty segment"));
                    }
                    self.chars.next();
                    expect_name = true;
                    if self.chars.peek().is_none() {
                        return Err(self.fail("trailing dot"));
                    }
                }
                ']' => return Err(self.fail("unbalanced bracket")),
                _ => {
                    if !expect_name {
                        return Err(self.fail("missing separator"));
                    }
                    self.name();
                    expect_name = false;
                }
            }
        }
        Ok(Path { keys: self.keys })
    }

    fn name(&mut self) {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if matches!(c, '.' | '[' | ']') {
                break;
            }
            name.push(c);
            self.chars.next();
        }
        self.keys.push(Key::Name(name.trim().to_owned()));
    }

    fn bracket(&mut self) -> Result<()> {
        match self.chars.peek().map(|&(_, c)| c) {
            Some(quote @ ('"' | '\'')) => {
                self.chars.next();
                let mut name = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(self.fail("unterminated quote")),
                    }
                }
                self.close()?;
                self.keys.push(Key::Name(name));
            }
            Some(_) => {
                let mut digits = String::new();
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == ']' {
                        break;
                    }
                    digits.push(c);
                    self.chars.next();
                }
                self.close()?;
                let idx = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| self.fail("bracket key is not an index or quoted name"))?;
                self.keys.push(Key::Index(idx));
            }
            None => return Err(self.fail("unbalanced bracket")),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.chars.next() {
            Some((_, ']')) => Ok(()),
            _ => Err(self.fail("unbalanced bracket")),
        }
    }
}
