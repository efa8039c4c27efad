use std::error::Error;
use std::fmt::{self, Display};
use std::str::FromStr;

use smallvec::SmallVec;

/// Language of the user code being lexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceDialect {
    #[default]
    JavaScript,
    Python,
}

impl FromStr for SourceDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "js" | "javascript" => Ok(Self::JavaScript),
            "py" | "python" => Ok(Self::Python),
            other => Err(format!("unknown source dialect '{other}'")),
        }
    }
}

impl Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JavaScript => f.write_str("javascript"),
            Self::Python => f.write_str("python"),
        }
    }
}

/// Error raised when the source ends inside a string, template or comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub pos: usize,
}

impl Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LexError at byte {}: {}", self.pos, self.message)
    }
}

impl Error for LexError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    /// A complete quoted string, including any Python prefix (`rb"…"`).
    Str,
    /// One literal chunk of a JavaScript template or a Python f-string:
    /// from the opening quote or the `}` closing a replacement field up to
    /// the next field or the closing quote.
    Template,
    /// JavaScript regular expression literal, flags included.
    Regex,
    Comment,
    Whitespace,
    OpenParen,
    CloseParen,
    Dot,
    Punct,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A token is just a kind and a byte span into the lexed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }

    /// Whitespace and comments carry no meaning for call-site matching.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Block,
    Interpolation,
    /// Replacement field of a Python f-string, with the quote that resumes.
    FString { quote: u8, triple: bool },
}

/// Byte-offset lexer for user cell code.
///
/// The lexer is deliberately shallow: it only has to know where strings,
/// templates and comments begin and end so that parentheses inside them
/// are never mistaken for code. Every byte of the input lands in exactly
/// one token, so [`SourceLexer::render`] reproduces the source.
pub struct SourceLexer<'s> {
    source: &'s str,
    dialect: SourceDialect,
    pub items: Vec<Token>,
    braces: SmallVec<[Brace; 8]>,
    offset: usize,
}

impl<'s> SourceLexer<'s> {
    /// Create a lexer and immediately tokenize `source`.
    pub fn new(source: &'s str, dialect: SourceDialect) -> Result<Self, LexError> {
        let mut lexer = SourceLexer {
            source,
            dialect,
            items: Vec::with_capacity(source.len() / 3),
            braces: SmallVec::new(),
            offset: 0,
        };
        lexer.lex()?;
        Ok(lexer)
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn dialect(&self) -> SourceDialect {
        self.dialect
    }

    /// Tokens that are neither whitespace nor comments.
    pub fn significant(&self) -> impl Iterator<Item = &Token> {
        self.items.iter().filter(|t| !t.is_trivia())
    }

    /// Concatenate every token's text.
    pub fn render(&self) -> String {
        self.items.iter().map(|t| t.text(self.source)).collect()
    }

    #[inline]
    fn bytes(&self) -> &'s [u8] {
        self.source.as_bytes()
    }

    #[inline]
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes().get(self.offset + ahead).copied()
    }

    #[inline]
    fn push(&mut self, kind: TokenKind, start: usize) {
        self.items.push(Token {
            kind,
            start,
            end: self.offset,
        });
    }

    fn lex(&mut self) -> Result<(), LexError> {
        let js = self.dialect == SourceDialect::JavaScript;
        while self.offset < self.source.len() {
            let start = self.offset;
            let curr = self.bytes()[start];
            match curr {
                b' ' | b'\t' | b'\r' | b'\n' => self.lex_whitespace(start),
                b'(' => self.single(TokenKind::OpenParen, start),
                b')' => self.single(TokenKind::CloseParen, start),
                b'"' | b'\'' => self.lex_string(start)?,
                b'`' if js => {
                    self.offset += 1;
                    self.lex_template_chunk(start)?;
                }
                b'/' if js && self.peek(1) == Some(b'/') => self.lex_line_comment(start),
                b'/' if js && self.peek(1) == Some(b'*') => self.lex_block_comment(start)?,
                b'/' if js && self.regex_allowed() => self.lex_regex(start),
                b'#' if !js => self.lex_line_comment(start),
                b'{' => {
                    self.braces.push(Brace::Block);
                    self.single(TokenKind::Punct, start);
                }
                b'}' => match self.braces.pop() {
                    Some(Brace::Interpolation) => {
                        self.offset += 1;
                        self.lex_template_chunk(start)?;
                    }
                    Some(Brace::FString { quote, triple }) => {
                        self.offset += 1;
                        self.lex_fstring_chunk(start, quote, triple)?;
                    }
                    _ => self.single(TokenKind::Punct, start),
                },
                b'.' if self.peek(1).is_some_and(|b| b.is_ascii_digit()) => {
                    self.lex_number(start)
                }
                b'.' => self.single(TokenKind::Dot, start),
                b'0'..=b'9' => self.lex_number(start),
                _ if is_ident_start(curr) => self.lex_ident(start)?,
                _ => self.single(TokenKind::Punct, start),
            }
        }

        if self.braces.iter().any(|b| *b != Brace::Block) {
            return Err(LexError {
                message: "unterminated interpolation".to_string(),
                pos: self.source.len(),
            });
        }
        Ok(())
    }

    fn single(&mut self, kind: TokenKind, start: usize) {
        self.offset += 1;
        self.push(kind, start);
    }

    fn lex_whitespace(&mut self, start: usize) {
        while matches!(self.peek(0), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.offset += 1;
        }
        self.push(TokenKind::Whitespace, start);
    }

    fn lex_line_comment(&mut self, start: usize) {
        while self.peek(0).is_some_and(|b| b != b'\n') {
            self.offset += 1;
        }
        self.push(TokenKind::Comment, start);
    }

    fn lex_block_comment(&mut self, start: usize) -> Result<(), LexError> {
        match self.source[start + 2..].find("*/") {
            Some(rel) => {
                self.offset = start + 2 + rel + 2;
                self.push(TokenKind::Comment, start);
                Ok(())
            }
            None => Err(LexError {
                message: "unterminated block comment".to_string(),
                pos: start,
            }),
        }
    }

    fn lex_number(&mut self, start: usize) {
        let hex = matches!(self.source.get(start..start + 2), Some("0x" | "0X"));
        self.offset += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'.' => self.offset += 1,
                // exponent sign: 1.5e-3
                b'+' | b'-' if !hex && matches!(self.bytes()[self.offset - 1], b'e' | b'E') => {
                    self.offset += 1
                }
                _ => break,
            }
        }
        self.push(TokenKind::Number, start);
    }

    fn lex_ident(&mut self, start: usize) -> Result<(), LexError> {
        while self.peek(0).is_some_and(is_ident_continue) {
            self.offset += 1;
        }
        let word = &self.source[start..self.offset];
        if self.dialect == SourceDialect::Python
            && matches!(self.peek(0), Some(b'"' | b'\''))
            && is_string_prefix(word)
        {
            if word.bytes().any(|b| b.eq_ignore_ascii_case(&b'f')) {
                return self.lex_fstring(start);
            }
            return self.lex_string(start);
        }
        self.push(TokenKind::Ident, start);
        Ok(())
    }

    /// Lex a quoted string whose opening quote is at the current offset.
    /// `start` may sit earlier when a Python prefix precedes the quote.
    fn lex_string(&mut self, start: usize) -> Result<(), LexError> {
        let bytes = self.bytes();
        let quote = bytes[self.offset];
        let fence = [quote; 3];
        let triple =
            self.dialect == SourceDialect::Python && bytes[self.offset..].starts_with(&fence);

        if triple {
            self.offset += 3;
            while self.offset < bytes.len() {
                match bytes[self.offset] {
                    b'\\' => self.offset += 2,
                    c if c == quote && bytes[self.offset..].starts_with(&fence) => {
                        self.offset += 3;
                        self.push(TokenKind::Str, start);
                        return Ok(());
                    }
                    _ => self.offset += 1,
                }
            }
        } else {
            self.offset += 1;
            while self.offset < bytes.len() {
                match bytes[self.offset] {
                    b'\\' => self.offset += 2,
                    b'\n' => break,
                    c if c == quote => {
                        self.offset += 1;
                        self.push(TokenKind::Str, start);
                        return Ok(());
                    }
                    _ => self.offset += 1,
                }
            }
        }

        Err(LexError {
            message: "unterminated string literal".to_string(),
            pos: start,
        })
    }

    /// Open an f-string whose quote is at the current offset.
    fn lex_fstring(&mut self, start: usize) -> Result<(), LexError> {
        let bytes = self.bytes();
        let quote = bytes[self.offset];
        let triple = bytes[self.offset..].starts_with(&[quote; 3]);
        self.offset += if triple { 3 } else { 1 };
        self.lex_fstring_chunk(start, quote, triple)
    }

    /// Scan f-string text up to the closing quote or the next replacement
    /// field. `{{` and `}}` are literal braces.
    fn lex_fstring_chunk(&mut self, start: usize, quote: u8, triple: bool) -> Result<(), LexError> {
        let bytes = self.bytes();
        let fence = [quote; 3];
        while self.offset < bytes.len() {
            match bytes[self.offset] {
                b'\\' => self.offset += 2,
                b'{' | b'}' if bytes.get(self.offset + 1) == Some(&bytes[self.offset]) => {
                    self.offset += 2
                }
                b'{' => {
                    self.offset += 1;
                    self.push(TokenKind::Template, start);
                    self.braces.push(Brace::FString { quote, triple });
                    return Ok(());
                }
                b'\n' if !triple => break,
                c if c == quote && (!triple || bytes[self.offset..].starts_with(&fence)) => {
                    self.offset += if triple { 3 } else { 1 };
                    self.push(TokenKind::Template, start);
                    return Ok(());
                }
                _ => self.offset += 1,
            }
        }
        Err(LexError {
            message: "unterminated f-string".to_string(),
            pos: start,
        })
    }

    /// Whether a `/` here starts an expression rather than dividing one,
    /// judged from the previous significant token.
    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.items.iter().rev().find(|t| !t.is_trivia()) else {
            return true;
        };
        let text = prev.text(self.source);
        match prev.kind {
            TokenKind::Number | TokenKind::Str | TokenKind::Regex => false,
            TokenKind::CloseParen | TokenKind::Dot => false,
            TokenKind::Template => text.ends_with("${"),
            TokenKind::Ident => REGEX_KEYWORDS.contains(&text),
            TokenKind::Punct => !matches!(text, "]"),
            TokenKind::OpenParen => true,
            TokenKind::Whitespace | TokenKind::Comment => true,
        }
    }

    /// Lex `/body/flags`. A literal that does not close on its line is
    /// taken back as a lone `/`.
    fn lex_regex(&mut self, start: usize) {
        let bytes = self.bytes();
        let mut at = start + 1;
        let mut in_class = false;
        while at < bytes.len() {
            match bytes[at] {
                b'\\' => at += 2,
                b'\n' => break,
                b'[' => {
                    in_class = true;
                    at += 1;
                }
                b']' => {
                    in_class = false;
                    at += 1;
                }
                b'/' if !in_class => {
                    at += 1;
                    while bytes.get(at).copied().is_some_and(is_ident_continue) {
                        at += 1;
                    }
                    self.offset = at;
                    self.push(TokenKind::Regex, start);
                    return;
                }
                _ => at += 1,
            }
        }
        self.single(TokenKind::Punct, start);
    }

    /// Scan template text up to the closing backtick or the next `${`.
    fn lex_template_chunk(&mut self, start: usize) -> Result<(), LexError> {
        let bytes = self.bytes();
        while self.offset < bytes.len() {
            match bytes[self.offset] {
                b'\\' => self.offset += 2,
                b'`' => {
                    self.offset += 1;
                    self.push(TokenKind::Template, start);
                    return Ok(());
                }
                b'$' if bytes.get(self.offset + 1) == Some(&b'{') => {
                    self.offset += 2;
                    self.push(TokenKind::Template, start);
                    self.braces.push(Brace::Interpolation);
                    return Ok(());
                }
                _ => self.offset += 1,
            }
        }
        Err(LexError {
            message: "unterminated template literal".to_string(),
            pos: start,
        })
    }
}

impl<'s> TryFrom<&'s str> for SourceLexer<'s> {
    type Error = LexError;

    fn try_from(value: &'s str) -> Result<Self, Self::Error> {
        SourceLexer::new(value, SourceDialect::JavaScript)
    }
}

/// Keywords after which a `/` opens a regular expression.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

#[inline]
fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

#[inline]
fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

fn is_string_prefix(s: &str) -> bool {
    s.len() <= 2
        && s
            .bytes()
            .all(|b| matches!(b.to_ascii_lowercase(), b'r' | b'b' | b'u' | b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str, dialect: SourceDialect) -> Vec<(TokenKind, &str)> {
        let lexer = SourceLexer::new(src, dialect).unwrap();
        lexer
            .items
            .iter()
            .filter(|t| !t.is_trivia())
            .map(|t| (t.kind, t.text(src)))
            .collect()
    }

    #[test]
    fn parens_inside_strings_stay_in_the_string() {
        let toks = kinds(r#"f("a)b", 'c(\'d')"#, SourceDialect::JavaScript);
        assert_eq!(
            toks,
            vec![
                (TokenKind::Ident, "f"),
                (TokenKind::OpenParen, "("),
                (TokenKind::Str, r#""a)b""#),
                (TokenKind::Punct, ","),
                (TokenKind::Str, r"'c(\'d'"),
                (TokenKind::CloseParen, ")"),
            ]
        );
    }

    #[test]
    fn template_interpolation_is_lexed_as_code() {
        let src = "`a(${g(1)})`";
        let toks = kinds(src, SourceDialect::JavaScript);
        assert_eq!(
            toks,
            vec![
                (TokenKind::Template, "`a(${"),
                (TokenKind::Ident, "g"),
                (TokenKind::OpenParen, "("),
                (TokenKind::Number, "1"),
                (TokenKind::CloseParen, ")"),
                (TokenKind::Template, "})`"),
            ]
        );
    }

    #[test]
    fn nested_templates_and_object_literals() {
        let src = "`x${ {a: `y${z}`}.a }w`";
        let lexer = SourceLexer::new(src, SourceDialect::JavaScript).unwrap();
        assert_eq!(lexer.render(), src);
        let last = lexer.items.last().unwrap();
        assert_eq!(last.kind, TokenKind::Template);
        assert_eq!(last.text(src), "}w`");
    }

    #[test]
    fn comments_swallow_parens() {
        let toks = kinds("a // )(\n/* ( */ b", SourceDialect::JavaScript);
        assert_eq!(toks, vec![(TokenKind::Ident, "a"), (TokenKind::Ident, "b")]);

        let py = kinds("a # )(\nb", SourceDialect::Python);
        assert_eq!(py, vec![(TokenKind::Ident, "a"), (TokenKind::Ident, "b")]);
    }

    #[test]
    fn python_prefixes_and_triple_quotes() {
        let src = "x = rb'(' + \"\"\"a\n)\"\"\" + u\"(\"";
        let toks = kinds(src, SourceDialect::Python);
        let strs: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Str)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(strs, vec!["rb'('", "\"\"\"a\n)\"\"\"", "u\"(\""]);
    }

    #[test]
    fn fstring_fields_are_lexed_as_code() {
        let src = "f\"{{(}} {g('x')!r:>{w}} )\" + 1";
        let lexer = SourceLexer::new(src, SourceDialect::Python).unwrap();
        assert_eq!(lexer.render(), src);
        let toks = kinds(src, SourceDialect::Python);
        assert_eq!(toks[0], (TokenKind::Template, "f\"{{(}} {"));
        assert_eq!(toks[1], (TokenKind::Ident, "g"));
        assert_eq!(toks[2], (TokenKind::OpenParen, "("));
        assert_eq!(toks[3], (TokenKind::Str, "'x'"));
        assert_eq!(toks[4], (TokenKind::CloseParen, ")"));
        assert!(toks.contains(&(TokenKind::Template, "} )\"")));
        assert_eq!(toks.last(), Some(&(TokenKind::Number, "1")));

        let triple = "F'''a\n{x}\n'''";
        assert_eq!(
            kinds(triple, SourceDialect::Python),
            vec![
                (TokenKind::Template, "F'''a\n{"),
                (TokenKind::Ident, "x"),
                (TokenKind::Template, "}\n'''"),
            ]
        );
        assert!(SourceLexer::new("f'{x'", SourceDialect::Python).is_err());
    }

    #[test]
    fn regex_literals_hide_quotes_and_parens() {
        let src = r#"s.replace(/'/g, "").split(/[/)]\/x/i)"#;
        let toks = kinds(src, SourceDialect::JavaScript);
        let regexes: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Regex)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(regexes, vec!["/'/g", r"/[/)]\/x/i"]);

        let start = kinds("/a(/.test(x)", SourceDialect::JavaScript);
        assert_eq!(start[0], (TokenKind::Regex, "/a(/"));
        let after_return = kinds(r"return /\)/", SourceDialect::JavaScript);
        assert_eq!(after_return[1], (TokenKind::Regex, r"/\)/"));
    }

    #[test]
    fn slash_after_a_value_is_division() {
        for src in ["a / b / c", "f(x) / 2 / (y)", "arr[0] /2/ 1", "1 /'/'/ 2"] {
            let toks = kinds(src, SourceDialect::JavaScript);
            assert!(toks.iter().all(|(k, _)| *k != TokenKind::Regex), "{src}");
        }
        // no closing slash on the line: a lone slash
        let toks = kinds("x = /abc\ny", SourceDialect::JavaScript);
        assert!(toks.contains(&(TokenKind::Punct, "/")));
    }

    #[test]
    fn numbers_keep_exponents_and_leading_dots() {
        let toks = kinds("1.5e-3 + .25 + 0xE+1", SourceDialect::JavaScript);
        let nums: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Number)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(nums, vec!["1.5e-3", ".25", "0xE", "1"]);
    }

    #[test]
    fn unterminated_constructs_report_position() {
        let err = SourceLexer::new("x = 'abc", SourceDialect::JavaScript)
            .err()
            .unwrap();
        assert_eq!(err.pos, 4);

        assert!(SourceLexer::new("`a${b", SourceDialect::JavaScript).is_err());
        assert!(SourceLexer::new("/* open", SourceDialect::JavaScript).is_err());
        assert!(SourceLexer::new("'''open", SourceDialect::Python).is_err());
    }

    #[test]
    fn render_covers_every_byte() {
        let src = "const é = q.cells(`A${1}`) /* c */ ;\n";
        let lexer = SourceLexer::try_from(src).unwrap();
        assert_eq!(lexer.render(), src);
    }
}
