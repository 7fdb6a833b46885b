//! Command segmenter: turns the token stream of one line into a [`Pipeline`].
//!
//! Grammar accepted (one redirection at most, and only at an open end):
//!
//! ```text
//! line     := [ '<' path ] segment { '|' segment }
//!           | segment [ '<' path ] { '|' segment }
//!           | segment { '|' segment } [ '>' path ]
//! segment  := word { word }
//! ```

pub use crate::lexer::Token;
use std::path::PathBuf;
use thiserror::Error;

/// One program invocation within a pipeline: program name followed by its arguments.
///
/// Never empty; the parser rejects empty segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSegment {
    tokens: Vec<String>,
}

impl CommandSegment {
    /// Returns `None` when `tokens` is empty.
    pub fn new(tokens: Vec<String>) -> Option<Self> {
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// Program name and arguments, in `argv` order.
    pub fn argv(&self) -> &[String] {
        &self.tokens
    }
}

/// Redirection attached to the pipeline as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Redirection {
    #[default]
    None,
    /// Replaces the first segment's standard input.
    FromFile(PathBuf),
    /// Replaces the last segment's standard output (create or truncate).
    ToFile(PathBuf),
}

/// One or more segments connected by pipes, plus at most one redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub segments: Vec<CommandSegment>,
    pub redirection: Redirection,
}

impl Pipeline {
    /// A pipeline eligible for builtin dispatch: one segment, no redirection.
    pub fn as_simple_command(&self) -> Option<&CommandSegment> {
        match (self.segments.as_slice(), &self.redirection) {
            ([only], Redirection::None) => Some(only),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Errors that can occur while segmenting a line. The line is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line has no tokens at all.
    #[error("empty command line")]
    EmptyLine,
    /// `|` at the start of a line or directly after another `|`.
    #[error("syntax error near unexpected token `|'")]
    EmptySegment,
    /// The line ends with `|`.
    #[error("syntax error: pipeline ends with `|'")]
    TrailingPipe,
    /// `<` or `>` not followed by a path.
    #[error("syntax error: `{0}' requires a file name")]
    MissingRedirectionTarget(String),
    /// A second `<` or `>` on the same line.
    #[error("syntax error: only one redirection per line is supported")]
    MultipleRedirections,
    /// `<` after the first pipe, or `>` before the last one.
    #[error("syntax error: `{0}' is only allowed at the open end of a pipeline")]
    MisplacedRedirection(String),
    /// A redirection with no program to apply it to.
    #[error("syntax error: `{0}' needs a command")]
    MissingProgram(String),
    /// Tokens left over after a redirection target.
    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedToken(String),
}

struct Segmenter {
    tokens: std::vec::IntoIter<Token>,
    lookahead: Option<Token>,
    segments: Vec<CommandSegment>,
    current: Vec<String>,
    redirection: Redirection,
}

impl Segmenter {
    fn from(tokens: Vec<Token>) -> Self {
        let mut tokens = tokens.into_iter();
        Segmenter {
            lookahead: tokens.next(),
            tokens,
            segments: Vec::new(),
            current: Vec::new(),
            redirection: Redirection::None,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.lookahead.as_ref()
    }

    fn consume(&mut self) -> Option<Token> {
        std::mem::replace(&mut self.lookahead, self.tokens.next())
    }

    fn build(mut self) -> Result<Pipeline, ParseError> {
        if self.peek().is_none() {
            return Err(ParseError::EmptyLine);
        }

        // Leading form: `< file cmd | ...`
        if self.peek() == Some(&Token::RedirectIn) {
            self.consume();
            let path = self.redirection_target(&Token::RedirectIn)?;
            self.redirection = Redirection::FromFile(path);
            if self.peek().is_none() {
                return Err(ParseError::MissingProgram(Token::RedirectIn.to_string()));
            }
        }

        while let Some(token) = self.consume() {
            match token {
                Token::Pipe => self.end_segment()?,
                Token::RedirectIn => self.parse_input_redirection()?,
                Token::RedirectOut => self.parse_output_redirection()?,
                Token::Word(word) => self.current.push(word),
            }
        }

        if self.current.is_empty() {
            return Err(ParseError::TrailingPipe);
        }
        self.close_segment();

        Ok(Pipeline {
            segments: self.segments,
            redirection: self.redirection,
        })
    }

    fn close_segment(&mut self) {
        if let Some(segment) = CommandSegment::new(std::mem::take(&mut self.current)) {
            self.segments.push(segment);
        }
    }

    fn end_segment(&mut self) -> Result<(), ParseError> {
        if self.current.is_empty() {
            return Err(ParseError::EmptySegment);
        }
        self.close_segment();
        Ok(())
    }

    fn redirection_target(&mut self, operator: &Token) -> Result<PathBuf, ParseError> {
        match self.consume() {
            Some(Token::Word(path)) => Ok(PathBuf::from(path)),
            _ => Err(ParseError::MissingRedirectionTarget(operator.to_string())),
        }
    }

    fn set_redirection(&mut self, redirection: Redirection) -> Result<(), ParseError> {
        if self.redirection != Redirection::None {
            return Err(ParseError::MultipleRedirections);
        }
        self.redirection = redirection;
        Ok(())
    }

    /// `cmd args < file` inside the first segment; the segment ends at the path.
    fn parse_input_redirection(&mut self) -> Result<(), ParseError> {
        if !self.segments.is_empty() {
            return Err(ParseError::MisplacedRedirection(Token::RedirectIn.to_string()));
        }
        if self.current.is_empty() {
            return Err(ParseError::UnexpectedToken(Token::RedirectIn.to_string()));
        }
        let path = self.redirection_target(&Token::RedirectIn)?;
        self.set_redirection(Redirection::FromFile(path))?;
        match self.peek() {
            None | Some(Token::Pipe) => Ok(()),
            Some(Token::RedirectIn | Token::RedirectOut) => Err(ParseError::MultipleRedirections),
            Some(other) => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }

    /// `... | cmd args > file`: must be the final construct of the line.
    fn parse_output_redirection(&mut self) -> Result<(), ParseError> {
        if self.current.is_empty() {
            return Err(ParseError::UnexpectedToken(Token::RedirectOut.to_string()));
        }
        let path = self.redirection_target(&Token::RedirectOut)?;
        self.set_redirection(Redirection::ToFile(path))?;
        match self.peek() {
            None => Ok(()),
            Some(Token::Pipe) => Err(ParseError::MisplacedRedirection(Token::RedirectOut.to_string())),
            Some(Token::RedirectIn | Token::RedirectOut) => Err(ParseError::MultipleRedirections),
            Some(other) => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }
}

/// Segment the tokens of one line into a [`Pipeline`].
pub fn parse_pipeline(tokens: Vec<Token>) -> Result<Pipeline, ParseError> {
    Segmenter::from(tokens).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(line: &str) -> Result<Pipeline, ParseError> {
        parse_pipeline(tokenize(line).unwrap())
    }

    fn argvs(p: &Pipeline) -> Vec<Vec<&str>> {
        p.segments
            .iter()
            .map(|s| s.argv().iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn single_segment() {
        let p = parse("ls -l /tmp").unwrap();
        assert_eq!(argvs(&p), vec![vec!["ls", "-l", "/tmp"]]);
        assert_eq!(p.redirection, Redirection::None);
        let simple = p.as_simple_command().expect("simple command");
        assert_eq!(simple.program(), "ls");
        assert_eq!(simple.args(), ["-l", "/tmp"]);
    }

    #[test]
    fn pipes_split_segments() {
        let p = parse("cat f | grep x | wc -l").unwrap();
        assert_eq!(
            argvs(&p),
            vec![vec!["cat", "f"], vec!["grep", "x"], vec!["wc", "-l"]]
        );
        assert!(p.as_simple_command().is_none());
    }

    #[test]
    fn output_redirection_at_end() {
        let p = parse("cat missing.txt > out.txt").unwrap();
        assert_eq!(argvs(&p), vec![vec!["cat", "missing.txt"]]);
        assert_eq!(p.redirection, Redirection::ToFile("out.txt".into()));
        assert!(p.as_simple_command().is_none());

        let p = parse("echo hi | cat > out").unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.redirection, Redirection::ToFile("out".into()));
    }

    #[test]
    fn input_redirection_forms() {
        let p = parse("wc -l < in").unwrap();
        assert_eq!(argvs(&p), vec![vec!["wc", "-l"]]);
        assert_eq!(p.redirection, Redirection::FromFile("in".into()));

        let p = parse("< in sort | uniq").unwrap();
        assert_eq!(argvs(&p), vec![vec!["sort"], vec!["uniq"]]);
        assert_eq!(p.redirection, Redirection::FromFile("in".into()));

        let p = parse("sort < in | uniq").unwrap();
        assert_eq!(argvs(&p), vec![vec!["sort"], vec!["uniq"]]);
        assert_eq!(p.redirection, Redirection::FromFile("in".into()));
    }

    #[test]
    fn empty_lines_and_segments() {
        assert_eq!(parse(""), Err(ParseError::EmptyLine));
        assert_eq!(parse("| wc"), Err(ParseError::EmptySegment));
        assert_eq!(parse("ls | | wc"), Err(ParseError::EmptySegment));
        assert_eq!(parse("ls |"), Err(ParseError::TrailingPipe));
    }

    #[test]
    fn missing_redirection_target() {
        assert_eq!(
            parse("ls >"),
            Err(ParseError::MissingRedirectionTarget(">".into()))
        );
        assert_eq!(
            parse("wc < | cat"),
            Err(ParseError::MissingRedirectionTarget("<".into()))
        );
        assert_eq!(
            parse("<"),
            Err(ParseError::MissingRedirectionTarget("<".into()))
        );
    }

    #[test]
    fn redirection_only_at_open_ends() {
        assert_eq!(
            parse("ls > out | wc"),
            Err(ParseError::MisplacedRedirection(">".into()))
        );
        assert_eq!(
            parse("ls | wc < in"),
            Err(ParseError::MisplacedRedirection("<".into()))
        );
    }

    #[test]
    fn tokens_after_redirection_are_rejected() {
        assert_eq!(
            parse("ls > out extra"),
            Err(ParseError::UnexpectedToken("extra".into()))
        );
        assert_eq!(
            parse("sort < in -r"),
            Err(ParseError::UnexpectedToken("-r".into()))
        );
    }

    #[test]
    fn one_redirection_per_line() {
        assert_eq!(parse("sort < in > out"), Err(ParseError::MultipleRedirections));
        assert_eq!(parse("< a sort < b"), Err(ParseError::MultipleRedirections));
        assert_eq!(parse("ls > a > b"), Err(ParseError::MultipleRedirections));
    }

    #[test]
    fn quoted_operators_are_arguments() {
        let p = parse("echo '|'").unwrap();
        assert_eq!(argvs(&p), vec![vec!["echo", "|"]]);
        assert_eq!(p.redirection, Redirection::None);

        let p = parse(r"echo \> '<' x").unwrap();
        assert_eq!(argvs(&p), vec![vec!["echo", ">", "<", "x"]]);
        assert!(p.as_simple_command().is_some());

        let p = parse("grep '|' < in | wc").unwrap();
        assert_eq!(argvs(&p), vec![vec!["grep", "|"], vec!["wc"]]);
        assert_eq!(p.redirection, Redirection::FromFile("in".into()));
    }

    #[test]
    fn quoted_operator_is_a_valid_target() {
        let p = parse("echo hi > '|'").unwrap();
        assert_eq!(p.redirection, Redirection::ToFile("|".into()));
    }

    #[test]
    fn redirection_without_program() {
        assert_eq!(parse("< in"), Err(ParseError::MissingProgram("<".into())));
        assert_eq!(parse("> out"), Err(ParseError::UnexpectedToken(">".into())));
        assert_eq!(parse("< in | wc"), Err(ParseError::EmptySegment));
    }
}
