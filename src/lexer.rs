//! Splits one line of input into the token stream consumed by the parser.

use std::fmt;
use thiserror::Error;

/// One token of an input line.
///
/// Operators only come from unquoted, unescaped `|`, `<` and `>`; the same
/// characters written inside quotes or after a backslash stay part of a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Pipe,
    RedirectIn,
    RedirectOut,
}

impl Token {
    fn operator(ch: char) -> Option<Self> {
        match ch {
            '|' => Some(Token::Pipe),
            '<' => Some(Token::RedirectIn),
            '>' => Some(Token::RedirectOut),
            _ => None,
        }
    }

    pub fn word(text: impl Into<String>) -> Self {
        Token::Word(text.into())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(text) => f.write_str(text),
            Token::Pipe => f.write_str("|"),
            Token::RedirectIn => f.write_str("<"),
            Token::RedirectOut => f.write_str(">"),
        }
    }
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A closing quote (single or double) was not found.
    #[error("syntax error: unterminated quote")]
    UnfinishedQuote,
    /// The line ends with a lone backslash.
    #[error("syntax error: trailing backslash")]
    TrailingEscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_unquoted(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                Err(LexError::UnfinishedQuote)
            }
            LexingState::ReadingWord => {
                out.push(Token::Word(std::mem::take(&mut self.buffer)));
                Ok(out)
            }
            LexingState::Start => Ok(out),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if self.state == LexingState::ReadingWord {
            out.push(Token::Word(std::mem::take(&mut self.buffer)));
        }
        self.state = LexingState::Start;
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexError> {
        if let Some(operator) = Token::operator(ch) {
            self.finish_word(out);
            out.push(operator);
            return Ok(());
        }
        match ch {
            c if c.is_whitespace() => self.finish_word(out),
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => {
                let escaped = self.read_char().ok_or(LexError::TrailingEscape)?;
                self.buffer.push(escaped);
                self.state = LexingState::ReadingWord;
            }
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.read_char() {
                Some(c @ ('"' | '\\')) => self.buffer.push(c),
                Some(c) => {
                    self.buffer.push('\\');
                    self.buffer.push(c);
                }
                None => return Err(LexError::UnfinishedQuote),
            },
            c => self.buffer.push(c),
        }
        Ok(())
    }
}

/// Tokenize one input line.
///
/// Blanks separate words, quotes group them (and are removed), and `|`, `<`,
/// `>` are emitted as operators even when written without blanks.
pub fn tokenize(line: &str) -> Result<Vec<Token>, LexError> {
    LexingFSM::new(line).make_tokens()
}
