pub mod lexer;
pub mod rewrite;

pub use lexer::{LexError, SourceDialect, SourceLexer, Token, TokenKind};
pub use rewrite::{
    AccessPattern, AccessPatternError, DEFAULT_ACCESS_PATTERN, SourceRewriter,
    rewrite_for_async_access,
};
