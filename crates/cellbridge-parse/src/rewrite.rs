//! Rewrites user code so that data-access calls are awaited.
//!
//! Code written against the blocking bridge calls `q.cells("A1")` and uses
//! the result directly. Under the message bridge that call returns a future,
//! so before execution every call site is wrapped: `q.cells("A1")` becomes
//! `(await q.cells("A1"))`. Matching runs over lexer tokens, which keeps
//! parentheses in strings, template text and comments out of the depth
//! count.

use std::borrow::Cow;
use std::fmt::{self, Display};
use std::ops::Range;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::lexer::{LexError, SourceDialect, SourceLexer, Token, TokenKind};

pub const DEFAULT_ACCESS_PATTERN: &str = "q.cells";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPatternError {
    Empty,
    InvalidSegment(String),
}

impl Display for AccessPatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "access pattern is empty"),
            Self::InvalidSegment(s) => write!(f, "'{s}' is not a valid identifier"),
        }
    }
}

impl std::error::Error for AccessPatternError {}

/// The dotted call path that reaches the cell query function, e.g. `q.cells`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPattern {
    segments: SmallVec<[String; 4]>,
}

impl AccessPattern {
    pub fn parse(path: &str) -> Result<Self, AccessPatternError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(AccessPatternError::Empty);
        }
        let mut segments = SmallVec::new();
        for seg in path.split('.') {
            let seg = seg.trim();
            let mut bytes = seg.bytes();
            let valid = bytes
                .next()
                .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_' || b == b'$')
                && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
            if !valid {
                return Err(AccessPatternError::InvalidSegment(seg.to_string()));
            }
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// If the significant tokens starting at `at` spell this path followed by
    /// `(`, return the index of that open paren.
    fn match_at(&self, source: &str, sig: &[&Token], at: usize) -> Option<usize> {
        let mut j = at;
        for (n, seg) in self.segments.iter().enumerate() {
            if n > 0 {
                if sig.get(j)?.kind != TokenKind::Dot {
                    return None;
                }
                j += 1;
            }
            let tok = sig.get(j)?;
            if tok.kind != TokenKind::Ident || tok.text(source) != seg {
                return None;
            }
            j += 1;
        }
        (sig.get(j)?.kind == TokenKind::OpenParen).then_some(j)
    }
}

impl Default for AccessPattern {
    fn default() -> Self {
        Self {
            segments: SmallVec::from_iter(["q".to_string(), "cells".to_string()]),
        }
    }
}

impl FromStr for AccessPattern {
    type Err = AccessPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    /// `x.q.cells(…)`: a different receiver.
    Receiver,
    /// `await q.cells(…)`: already correct.
    Awaited,
}

#[derive(Debug, Clone, Default)]
pub struct SourceRewriter {
    pattern: AccessPattern,
    dialect: SourceDialect,
}

impl SourceRewriter {
    pub fn new(pattern: AccessPattern, dialect: SourceDialect) -> Self {
        Self { pattern, dialect }
    }

    pub fn pattern(&self) -> &AccessPattern {
        &self.pattern
    }

    pub fn dialect(&self) -> SourceDialect {
        self.dialect
    }

    /// Byte spans of every call expression that needs wrapping, in order.
    /// Calls nested inside a matched call are covered by the outer span.
    pub fn call_sites(&self, source: &str) -> Result<Vec<Range<usize>>, LexError> {
        let lexer = SourceLexer::new(source, self.dialect)?;
        let sig: Vec<&Token> = lexer.significant().collect();
        let mut sites = Vec::new();

        let mut i = 0;
        while i < sig.len() {
            let Some(open) = self.pattern.match_at(source, &sig, i) else {
                i += 1;
                continue;
            };
            let close = matching_close(&sig, open);
            match (skip_reason(source, &sig, i), close) {
                (Some(Skip::Receiver), _) | (_, None) => i += 1,
                (Some(Skip::Awaited), Some(close)) => i = close + 1,
                (None, Some(close)) => {
                    sites.push(sig[i].start..sig[close].end);
                    i = close + 1;
                }
            }
        }
        Ok(sites)
    }

    pub fn try_rewrite<'s>(&self, source: &'s str) -> Result<Cow<'s, str>, LexError> {
        let sites = self.call_sites(source)?;
        if sites.is_empty() {
            return Ok(Cow::Borrowed(source));
        }
        let mut out = String::with_capacity(source.len() + sites.len() * 8);
        let mut cursor = 0;
        for site in sites {
            out.push_str(&source[cursor..site.start]);
            out.push_str("(await ");
            out.push_str(&source[site.clone()]);
            out.push(')');
            cursor = site.end;
        }
        out.push_str(&source[cursor..]);
        Ok(Cow::Owned(out))
    }

    /// Best-effort rewrite: source the lexer cannot follow is returned
    /// unchanged.
    pub fn rewrite<'s>(&self, source: &'s str) -> Cow<'s, str> {
        match self.try_rewrite(source) {
            Ok(out) => out,
            Err(err) => {
                tracing::warn!(
                    pos = err.pos,
                    dialect = %self.dialect,
                    error = %err.message,
                    "source left unrewritten"
                );
                Cow::Borrowed(source)
            }
        }
    }
}

/// Rewrite JavaScript source for the default `q.cells` access function.
pub fn rewrite_for_async_access(source: &str) -> Cow<'_, str> {
    SourceRewriter::default().rewrite(source)
}

fn skip_reason(source: &str, sig: &[&Token], at: usize) -> Option<Skip> {
    let prev = sig.get(at.checked_sub(1)?)?;
    match prev.kind {
        TokenKind::Dot => Some(Skip::Receiver),
        TokenKind::Ident if prev.text(source) == "await" => Some(Skip::Awaited),
        _ => None,
    }
}

fn matching_close(sig: &[&Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, tok) in sig.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}
