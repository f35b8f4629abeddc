// src/core/parser.rs

//! Turns the bytes of one line into a [`Line`].
//!
//! Grammar, loosely: `line := pipeline (';' pipeline)* ['&']`,
//! `pipeline := command ('|' command)*`, and a command is any mix of words
//! and redirections (`<path`, `>path`, `>>path`). Words split on blanks.
//! Single quotes are literal; inside double quotes and outside any quotes a
//! backslash takes the next character literally.
//!
//! Input is not required to be UTF-8. Each byte is widened to the code point
//! of the same value before lexing and narrowed back afterwards, so words and
//! paths reach the executor byte for byte.
//!
//! The parser is deliberately permissive about empty commands: `a | | b`
//! parses, and the executor decides what an empty command means.

use crate::models::{Command, Line, Pipeline, RedirectMode, Redirection};
use logos::Logos;
use std::ffi::OsString;
use std::mem;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use thiserror::Error;

/// A line that does not follow the grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing file name after a redirection operator.")]
    MissingRedirectTarget,
    #[error("'&' may only appear at the end of a line.")]
    MisplacedBackground,
    #[error("Unterminated {0} quote.")]
    UnterminatedQuote(char),
    #[error("A backslash at the end of a line escapes nothing.")]
    DanglingEscape,
}

/// Input no token pattern accepts. Only an open quote or a lone trailing
/// backslash can produce it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct UnmatchedInput;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(error = UnmatchedInput)]
#[logos(skip r"[ \t\r]+")]
enum Token {
    #[token("|")]
    Pipe,
    #[token(";")]
    Separator,
    #[token("&")]
    Background,
    #[token("<", |_| RedirectMode::Input)]
    #[token(">", |_| RedirectMode::Truncate)]
    #[token(">>", |_| RedirectMode::Append)]
    Redirect(RedirectMode),
    /// Unquoted runs, escapes and quoted segments, glued together.
    #[regex(r#"([^ \t\r|;&<>'"\\]|\\.|'[^']*'|"([^"\\]|\\.)*")+"#, unquote)]
    Word(Vec<u8>),
}

fn widen(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

// Every char comes from `widen`, so it always fits.
fn narrow(c: char) -> u8 {
    u8::try_from(c).unwrap_or(b'?')
}

/// Strips quotes and escapes from a matched word.
fn unquote(lex: &mut logos::Lexer<'_, Token>) -> Vec<u8> {
    let mut word = Vec::with_capacity(lex.slice().len());
    let mut chars = lex.slice().chars();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => word.push(narrow(c)),
            (_, '\\') => word.extend(chars.next().map(narrow)),
            (_, c) => word.push(narrow(c)),
        }
    }
    word
}

/// Names what went wrong at the first unmatched position.
fn unmatched(rest: &str) -> ParseError {
    match rest.chars().find(|c| matches!(c, '\'' | '"')) {
        Some(quote) => ParseError::UnterminatedQuote(quote),
        None => ParseError::DanglingEscape,
    }
}

fn tokenize(line: &[u8]) -> Result<Vec<Token>, ParseError> {
    let text = widen(line);
    let mut lexer = Token::lexer(&text);
    let mut tokens = Vec::new();

    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push(token),
            Err(UnmatchedInput) => {
                let rest = text.get(lexer.span().start..).unwrap_or_default();
                return Err(unmatched(rest));
            }
        }
    }
    Ok(tokens)
}

/// Parses one line of input.
///
/// Every `;`-separated segment becomes a pipeline, even an empty one, and
/// every `|`-separated segment becomes a command, even one with no words.
pub fn parse_line(line: &[u8]) -> Result<Line, ParseError> {
    let mut tokens = tokenize(line)?;
    let background = tokens.last() == Some(&Token::Background);
    if background {
        tokens.pop();
    }

    let mut line = Line {
        pipelines: Vec::new(),
        background,
    };
    let mut pipeline = Pipeline::default();
    let mut command = Command::default();

    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => command.argv.push(OsString::from_vec(word)),
            Token::Redirect(mode) => match tokens.next() {
                Some(Token::Word(path)) => command.redirections.push(Redirection {
                    path: PathBuf::from(OsString::from_vec(path)),
                    mode,
                }),
                _ => return Err(ParseError::MissingRedirectTarget),
            },
            Token::Pipe => pipeline.commands.push(mem::take(&mut command)),
            Token::Separator => {
                pipeline.commands.push(mem::take(&mut command));
                line.pipelines.push(mem::take(&mut pipeline));
            }
            Token::Background => return Err(ParseError::MisplacedBackground),
        }
    }
    pipeline.commands.push(command);
    line.pipelines.push(pipeline);

    log::trace!("Parsed {:?}", line);
    Ok(line)
}
