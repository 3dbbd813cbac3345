use std::fmt;

use crate::token::{Token, TokenKind, KEYWORDS, TYPE_NAMES};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Scans the whole source, failing on the first lexical error.
///
/// The token stream past an error would be garbage, so unlike the later
/// analysis passes the lexer does not accumulate diagnostics.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).run()
}

/// Maps a byte offset to a 1-based (line, column) pair.
pub fn line_col(src: &str, pos: usize) -> (u32, u32) {
    let mut line = 1;
    let mut col = 1;
    for (i, b) in src.bytes().enumerate() {
        if i >= pos {
            break;
        }
        if b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

struct Lexer<'src> {
    src: &'src str,
    /// Byte cursor into `src`.
    cursor: usize,
    tokens: Vec<Token>,
    /// Open `(` `{` `[` with their byte offsets.
    delims: Vec<(char, usize)>,
}

impl Lexer<'_> {
    fn new(src: &str) -> Lexer<'_> {
        Lexer {
            src,
            cursor: 0,
            tokens: Vec::with_capacity(128),
            delims: Vec::with_capacity(8),
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        loop {
            self.skip_trivia()?;
            if self.at_end() {
                break;
            }
            let start = self.cursor;
            let c = self.peek();
            if c.is_ascii_digit() || (c == '.' && self.peek2().is_ascii_digit()) {
                self.number(start)?;
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                self.identifier_or_keyword(start);
                continue;
            }
            if c == '"' {
                self.string_literal(start)?;
                continue;
            }
            if c == '\'' {
                self.char_literal(start)?;
                continue;
            }
            self.operator(start)?;
        }
        if let Some(&(open, at)) = self.delims.last() {
            return Err(self.error_at(ErrorKind::UnclosedOpeningDelimiter(open), at));
        }
        Ok(self.tokens)
    }

    /// Skips whitespace and comments, interleaved in any order.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            let c = self.peek();
            if c != '\0' && c.is_ascii_whitespace() {
                self.advance();
                continue;
            }
            if c == '/' && self.peek2() == '/' {
                while !self.at_end() && self.peek() != '\n' {
                    self.advance();
                }
                continue;
            }
            if c == '/' && self.peek2() == '*' {
                let at = self.cursor;
                self.advance();
                self.advance();
                loop {
                    if self.at_end() {
                        return Err(self.error_at(ErrorKind::UnterminatedBlockComment, at));
                    }
                    if self.peek() == '*' && self.peek2() == '/' {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            return Ok(());
        }
    }

    /// Integer or floating literal, including the leading/trailing-dot and
    /// exponent forms. A literal directly followed by an identifier character
    /// is rejected whole, so `123abc` never lexes as two tokens.
    fn number(&mut self, start: usize) -> Result<()> {
        let mut is_float = false;
        if self.peek() == '.' {
            is_float = true;
            self.advance();
            self.digits();
        } else {
            self.digits();
            if self.peek() == '.' {
                is_float = true;
                self.advance();
                self.digits();
            }
        }
        if matches!(self.peek(), 'e' | 'E') {
            let save = self.cursor;
            self.advance();
            if matches!(self.peek(), '+' | '-') {
                self.advance();
            }
            if self.peek().is_ascii_digit() {
                is_float = true;
                self.digits();
            } else {
                // Not an exponent after all. The dangling `e` is left for the
                // suffix check below.
                self.cursor = save;
            }
        }
        if self.peek().is_ascii_alphabetic() || self.peek() == '_' {
            while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
                self.advance();
            }
            let bad = self.src[start..self.cursor].to_string();
            return Err(self.error_at(ErrorKind::InvalidNumericLiteral(bad), start));
        }
        let kind = if is_float {
            TokenKind::FloatLit
        } else {
            TokenKind::IntLit
        };
        let lexeme = &self.src[start..self.cursor];
        self.tokens.push(Token::new(kind, lexeme, lexeme, start));
        Ok(())
    }

    fn digits(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
    }

    fn identifier_or_keyword(&mut self, start: usize) {
        self.advance();
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }
        let word = &self.src[start..self.cursor];
        let token = if let Some(&kind) = KEYWORDS.get(word) {
            Token::new(kind, word, "", start)
        } else if let Some(&kind) = TYPE_NAMES.get(word) {
            Token::new(kind, word, "", start)
        } else {
            Token::new(TokenKind::Identifier, word, word, start)
        };
        self.tokens.push(token);
    }

    fn string_literal(&mut self, start: usize) -> Result<()> {
        self.advance();
        let mut value = String::new();
        loop {
            if self.at_end() {
                return Err(self.error_at(ErrorKind::UnterminatedString, start));
            }
            let c = self.advance();
            match c {
                '"' => {
                    let lexeme = &self.src[start..self.cursor];
                    self.tokens
                        .push(Token::new(TokenKind::StringLit, lexeme, value, start));
                    return Ok(());
                }
                '\\' => {
                    if self.at_end() {
                        return Err(self.error_at(ErrorKind::UnterminatedString, start));
                    }
                    let esc = self.advance();
                    match decode_escape(esc) {
                        Some(decoded) => value.push(decoded),
                        None => return Err(self.error_at(ErrorKind::InvalidEscape, start)),
                    }
                }
                _ => value.push(c),
            }
        }
    }

    fn char_literal(&mut self, start: usize) -> Result<()> {
        self.advance();
        if self.at_end() {
            return Err(self.error_at(ErrorKind::MissingClosingQuote, start));
        }
        let c = self.advance();
        let value = if c == '\\' {
            if self.at_end() {
                return Err(self.error_at(ErrorKind::MissingClosingQuote, start));
            }
            let esc = self.advance();
            match decode_escape(esc) {
                Some(decoded) => decoded.to_string(),
                None => return Err(self.error_at(ErrorKind::InvalidEscape, start)),
            }
        } else {
            c.to_string()
        };
        if self.at_end() {
            return Err(self.error_at(ErrorKind::MissingClosingQuote, start));
        }
        if self.advance() != '\'' {
            return Err(self.error_at(ErrorKind::MultiCharConstant, start));
        }
        let lexeme = &self.src[start..self.cursor];
        self.tokens
            .push(Token::new(TokenKind::CharLit, lexeme, value, start));
        Ok(())
    }

    /// Multi-byte operators longest-first, then the single-byte set.
    fn operator(&mut self, start: usize) -> Result<()> {
        use TokenKind::*;
        const TWO_BYTE: &[(&str, TokenKind)] = &[
            ("&&", AndAnd),
            ("||", OrOr),
            ("==", EqEq),
            ("!=", NotEq),
            ("<=", Le),
            (">=", Ge),
            ("<<", Shl),
            (">>", Shr),
        ];
        for &(text, kind) in TWO_BYTE {
            if self.eat_str(text) {
                self.push_simple(kind, start);
                return Ok(());
            }
        }
        let c = self.advance();
        let kind = match c {
            '=' => Assign,
            '<' => Lt,
            '>' => Gt,
            '!' => Not,
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '%' => Percent,
            '&' => Amp,
            '|' => Pipe,
            '^' => Caret,
            '~' => Tilde,
            ',' => Comma,
            ';' => Semicolon,
            '(' | '{' | '[' => {
                self.delims.push((c, start));
                match c {
                    '(' => ParenL,
                    '{' => BraceL,
                    _ => BracketL,
                }
            }
            ')' | '}' | ']' => {
                let need = match c {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                match self.delims.last() {
                    Some(&(open, _)) if open == need => {
                        self.delims.pop();
                    }
                    _ => {
                        return Err(
                            self.error_at(ErrorKind::MismatchedClosingDelimiter, start)
                        );
                    }
                }
                match c {
                    ')' => ParenR,
                    '}' => BraceR,
                    _ => BracketR,
                }
            }
            _ => return Err(self.error_at(ErrorKind::UnrecognizedSymbol(c), start)),
        };
        self.push_simple(kind, start);
        Ok(())
    }

    fn push_simple(&mut self, kind: TokenKind, start: usize) {
        let lexeme = &self.src[start..self.cursor];
        self.tokens.push(Token::new(kind, lexeme, "", start));
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.src.len()
    }

    /// The next character without advancing, or `'\0'` at end of input.
    fn peek(&self) -> char {
        self.src[self.cursor..].chars().next().unwrap_or('\0')
    }

    fn peek2(&self) -> char {
        let mut chars = self.src[self.cursor..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.cursor += c.len_utf8();
        c
    }

    fn eat_str(&mut self, text: &str) -> bool {
        if self.src[self.cursor..].starts_with(text) {
            self.cursor += text.len();
            true
        } else {
            false
        }
    }

    fn error_at(&self, kind: ErrorKind, pos: usize) -> Error {
        let (line, col) = line_col(self.src, pos);
        Error { kind, line, col }
    }
}

fn decode_escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'v' => Some('\x0b'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnterminatedBlockComment,
    /// Carries the whole offending run, digits and suffix.
    InvalidNumericLiteral(String),
    MissingClosingQuote,
    InvalidEscape,
    MultiCharConstant,
    UnterminatedString,
    UnrecognizedSymbol(char),
    MismatchedClosingDelimiter,
    UnclosedOpeningDelimiter(char),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Error { kind, line, col } = self;
        match kind {
            ErrorKind::UnterminatedBlockComment => {
                write!(f, "Unterminated block comment at line {line}, col {col}")
            }
            ErrorKind::InvalidNumericLiteral(bad) => {
                write!(f, "Invalid numeric literal at line {line}, col {col}: '{bad}'")
            }
            ErrorKind::MissingClosingQuote => {
                write!(f, "Missing closing ' in character literal")
            }
            ErrorKind::InvalidEscape => write!(f, "Invalid escape sequence"),
            ErrorKind::MultiCharConstant => {
                write!(f, "Multi-character character constant")
            }
            ErrorKind::UnterminatedString => write!(f, "Unterminated string constant"),
            ErrorKind::UnrecognizedSymbol(c) => {
                write!(f, "Unrecognized symbol {c} at line {line}, col {col}")
            }
            ErrorKind::MismatchedClosingDelimiter => {
                write!(f, "Mismatched closing delimiter at line {line}, col {col}")
            }
            ErrorKind::UnclosedOpeningDelimiter(open) => {
                write!(
                    f,
                    "Unclosed opening '{open}' starting at line {line}, col {col}"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::display_list;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().iter().map(|t| t.kind).collect()
    }

    fn err(src: &str) -> Error {
        tokenize(src).unwrap_err()
    }

    #[test]
    fn simple_program() {
        use TokenKind::*;
        let tokens = tokenize("fn main() { int x = 1; }").unwrap();
        let summary: Vec<_> = tokens
            .iter()
            .map(|t| (t.kind, t.lexeme.as_str(), t.pos))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Fn, "fn", 0),
                (Identifier, "main", 3),
                (ParenL, "(", 7),
                (ParenR, ")", 8),
                (BraceL, "{", 10),
                (Int, "int", 12),
                (Identifier, "x", 16),
                (Assign, "=", 18),
                (IntLit, "1", 20),
                (Semicolon, ";", 21),
                (BraceR, "}", 23),
            ]
        );
    }

    #[test]
    fn lexeme_matches_source_slice() {
        let src = r#"fn f(int a) { string s = "a\tb"; float g = .5; s = s; a = a % 3; } // tail"#;
        for t in tokenize(src).unwrap() {
            assert_eq!(&src[t.pos..t.pos + t.lexeme.len()], t.lexeme);
        }
    }

    #[test]
    fn keywords_types_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("fn return if else for while int float bool string char foo _bar x9"),
            vec![
                Fn, Return, If, Else, For, While, Int, Float, Bool, String, Char,
                Identifier, Identifier, Identifier,
            ]
        );
        // `true`/`false` are ordinary identifiers at the lexical level; the
        // parser turns them into boolean literals.
        assert_eq!(kinds("true false True"), vec![Identifier; 3]);
    }

    #[test]
    fn operators_longest_first() {
        use TokenKind::*;
        assert_eq!(
            kinds("< <= << <<= > >= >> = == != ! & && | || ^ ~ + - * / %"),
            vec![
                Lt, Le, Shl, Shl, Assign, Gt, Ge, Shr, Assign, EqEq, NotEq, Not, Amp,
                AndAnd, Pipe, OrOr, Caret, Tilde, Plus, Minus, Star, Slash, Percent,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        use TokenKind::*;
        let tokens = tokenize("0 123 1.5 .5 5. 1e9 1.5e-3 2E+4").unwrap();
        let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.value.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (IntLit, "0"),
                (IntLit, "123"),
                (FloatLit, "1.5"),
                (FloatLit, ".5"),
                (FloatLit, "5."),
                (FloatLit, "1e9"),
                (FloatLit, "1.5e-3"),
                (FloatLit, "2E+4"),
            ]
        );
    }

    #[test]
    fn numeric_suffix_is_one_error() {
        let e = err("int x = 123abc;");
        assert_eq!(e.kind, ErrorKind::InvalidNumericLiteral("123abc".into()));
        assert_eq!((e.line, e.col), (1, 9));

        // Applies after a float too, and a dangling exponent falls into the
        // same rule.
        assert_eq!(
            err("1.5x").kind,
            ErrorKind::InvalidNumericLiteral("1.5x".into())
        );
        assert_eq!(err("1e+").kind, ErrorKind::InvalidNumericLiteral("1e".into()));
    }

    #[test]
    fn comments_are_trivia() {
        use TokenKind::*;
        let src = "a // line comment\n/* block\n comment */ b /**/ c";
        assert_eq!(kinds(src), vec![Identifier, Identifier, Identifier]);
    }

    #[test]
    fn unterminated_block_comment() {
        let e = err("x\n  /* never closed");
        assert_eq!(e.kind, ErrorKind::UnterminatedBlockComment);
        assert_eq!((e.line, e.col), (2, 3));
    }

    #[test]
    fn string_literals_decode_escapes() {
        let tokens = tokenize(r#""" "plain" "a\tb\n" "q\"q" "b\\s" "#).unwrap();
        let values: Vec<_> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["", "plain", "a\tb\n", "q\"q", "b\\s"]);
    }

    #[test]
    fn string_errors() {
        assert_eq!(err(r#""open"#).kind, ErrorKind::UnterminatedString);
        assert_eq!(err("\"trailing\\").kind, ErrorKind::UnterminatedString);
        assert_eq!(err(r#""bad\q""#).kind, ErrorKind::InvalidEscape);
    }

    #[test]
    fn char_literals() {
        let tokens = tokenize(r#"'a' '\n' '\'' '\\' ' '"#).unwrap();
        let values: Vec<_> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["a", "\n", "'", "\\", " "]);
    }

    #[test]
    fn char_errors() {
        assert_eq!(err("'a").kind, ErrorKind::MissingClosingQuote);
        assert_eq!(err("'").kind, ErrorKind::MissingClosingQuote);
        assert_eq!(err("'ab'").kind, ErrorKind::MultiCharConstant);
        assert_eq!(err(r#"'\q'"#).kind, ErrorKind::InvalidEscape);
    }

    #[test]
    fn bracket_balancing() {
        assert!(tokenize("([{}()])[]").is_ok());

        let e = err("(]");
        assert_eq!(e.kind, ErrorKind::MismatchedClosingDelimiter);
        assert_eq!((e.line, e.col), (1, 2));

        assert_eq!(err(")").kind, ErrorKind::MismatchedClosingDelimiter);
        assert_eq!(err("([)]").kind, ErrorKind::MismatchedClosingDelimiter);

        let e = err("{ (");
        assert_eq!(e.kind, ErrorKind::UnclosedOpeningDelimiter('('));
        assert_eq!((e.line, e.col), (1, 3));
    }

    #[test]
    fn unrecognized_symbols() {
        assert_eq!(err("@").kind, ErrorKind::UnrecognizedSymbol('@'));
        // No dot token: a dot that does not start a fractional literal is an
        // error.
        assert_eq!(err("a.b").kind, ErrorKind::UnrecognizedSymbol('.'));
    }

    #[test]
    fn token_list_form() {
        let tokens = tokenize("int x = 1;").unwrap();
        assert_eq!(
            display_list(&tokens),
            "[T_INT, T_IDENTIFIER(\"x\"), T_ASSIGNOP, T_INTLIT(1), T_SEMICOLON]"
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            err("123abc").to_string(),
            "Invalid numeric literal at line 1, col 1: '123abc'"
        );
        assert_eq!(
            err("fn f( {").to_string(),
            "Unclosed opening '{' starting at line 1, col 7"
        );
        assert_eq!(err("'ab'").to_string(), "Multi-character character constant");
    }

    #[test]
    fn line_col_mapping() {
        let src = "ab\ncd\n\nx";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 1), (1, 2));
        assert_eq!(line_col(src, 3), (2, 1));
        assert_eq!(line_col(src, 7), (4, 1));
    }
}
