// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

/*!
The lexer turns RXL source text into a flat stream of tokens.

Lexical syntax in short:

```ebnf
    number     = digit, { digit } ;
    ident      = letter, { letter | digit | "_" } ;
    char       = "'", ( escape | ?any character? ), "'" ;
    string     = '"', { escape | ?any character except '"'? }, '"' ;
    escape     = "\\", ( "n" | "t" | "r" | "0" | "'" | '"' | "\\" ) ;
    comment    = "#", { ?any character except "#"? }, "#" ;
```

Comments are delimited by `#` on both sides and may span lines. White space
is insignificant. The assignment operators `=`, `:=` and `::=` are
tokenized longest match first, as are `==`, `!=`, `<=`, `>=`, `&&` and
`||`.
*/

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i32),
    Char(i32),
    Str(String),
    Ident(String),

    Struct,
    Func,
    If,
    Else,
    Loop,
    Break,
    Return,
    Import,
    Print,
    Println,

    Assign,
    ImmutAssign,
    ReactAssign,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Semicolon,
    Question,
    Colon,
}

/// A token together with the source position it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub tok: Token,
    pub line: u32,
    pub col: u32,
}

/// Errors the lexer can detect. All of them are fatal and carry the
/// position of the offending character plus a short snippet of the
/// following input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("error[{line}:{col}] unrecognized character '{chr}' at code '{near}'")]
    BadChar { chr: char, line: u32, col: u32, near: String },
    #[error("error[{line}:{col}] bad escape '\\{chr}' at code '{near}'")]
    BadEscape { chr: char, line: u32, col: u32, near: String },
    #[error("error[{line}:{col}] integer literal out of range at code '{near}'")]
    IntOverflow { line: u32, col: u32, near: String },
    #[error("error[{line}:{col}] unterminated {what}")]
    Unterminated { what: &'static str, line: u32, col: u32 },
}

struct State {
    chars: Vec<char>,
    ptr: usize,
    line: u32,
    col: u32,
}

impl State {
    fn new(input: &str) -> Self {
        State { chars: input.chars().collect(), ptr: 0, line: 1, col: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.ptr).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.ptr + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.ptr).copied()?;
        self.ptr += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// A short snippet of the upcoming input for error messages.
    fn rest(&self) -> String {
        self.chars[self.ptr.min(self.chars.len())..]
            .iter()
            .take(20)
            .collect()
    }

    fn err_bad_char(&self, chr: char) -> LexError {
        LexError::BadChar { chr, line: self.line, col: self.col, near: self.rest() }
    }

    fn err_bad_escape(&self, chr: char) -> LexError {
        LexError::BadEscape { chr, line: self.line, col: self.col, near: self.rest() }
    }
}

fn keyword(s: &str) -> Option<Token> {
    match s {
        "struct" => Some(Token::Struct),
        "func" => Some(Token::Func),
        "if" => Some(Token::If),
        "else" => Some(Token::Else),
        "loop" => Some(Token::Loop),
        "break" => Some(Token::Break),
        "return" => Some(Token::Return),
        "import" => Some(Token::Import),
        "print" => Some(Token::Print),
        "println" => Some(Token::Println),
        _ => None,
    }
}

fn read_escape(st: &mut State) -> Result<char, LexError> {
    match st.bump() {
        Some('n') => Ok('\n'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('0') => Ok('\0'),
        Some('\'') => Ok('\''),
        Some('"') => Ok('"'),
        Some('\\') => Ok('\\'),
        Some(c) => Err(st.err_bad_escape(c)),
        None => Err(LexError::Unterminated { what: "escape", line: st.line, col: st.col }),
    }
}

/// Tokenizes a whole source string.
pub fn tokenize(input: &str) -> Result<Vec<Tok>, LexError> {
    let mut st = State::new(input);
    let mut tokens = Vec::new();

    while let Some(c) = st.peek() {
        let (line, col) = (st.line, st.col);
        let push = |tok: Token, tokens: &mut Vec<Tok>| {
            tokens.push(Tok { tok, line, col });
        };

        match c {
            c if c.is_whitespace() => {
                st.bump();
            }

            '#' => {
                st.bump();
                loop {
                    match st.bump() {
                        Some('#') => break,
                        Some(_) => (),
                        None => {
                            return Err(LexError::Unterminated { what: "comment", line, col });
                        }
                    }
                }
            }

            '0'..='9' => {
                let mut value: i64 = 0;
                while let Some(d) = st.peek() {
                    if let Some(dv) = d.to_digit(10) {
                        st.bump();
                        value = value * 10 + dv as i64;
                        if value > i32::MAX as i64 {
                            return Err(LexError::IntOverflow { line, col, near: st.rest() });
                        }
                    } else {
                        break;
                    }
                }
                push(Token::Int(value as i32), &mut tokens);
            }

            c if c.is_ascii_alphabetic() => {
                let mut s = String::new();
                while let Some(ch) = st.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        s.push(ch);
                        st.bump();
                    } else {
                        break;
                    }
                }
                match keyword(&s) {
                    Some(tok) => push(tok, &mut tokens),
                    None => push(Token::Ident(s), &mut tokens),
                }
            }

            '\'' => {
                st.bump();
                let ch = match st.bump() {
                    Some('\\') => read_escape(&mut st)?,
                    Some('\'') => {
                        return Err(st.err_bad_char('\''));
                    }
                    Some(ch) => ch,
                    None => {
                        return Err(LexError::Unterminated { what: "char literal", line, col });
                    }
                };
                match st.bump() {
                    Some('\'') => push(Token::Char(ch as i32), &mut tokens),
                    _ => {
                        return Err(LexError::Unterminated { what: "char literal", line, col });
                    }
                }
            }

            '"' => {
                st.bump();
                let mut s = String::new();
                loop {
                    match st.bump() {
                        Some('"') => break,
                        Some('\\') => s.push(read_escape(&mut st)?),
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(LexError::Unterminated {
                                what: "string literal",
                                line,
                                col,
                            });
                        }
                    }
                }
                push(Token::Str(s), &mut tokens);
            }

            ':' => {
                // Longest match over ":", ":=" and "::=".
                if st.peek2() == Some(':') {
                    let save = (st.ptr, st.line, st.col);
                    st.bump();
                    st.bump();
                    if st.peek() == Some('=') {
                        st.bump();
                        push(Token::ReactAssign, &mut tokens);
                    } else {
                        (st.ptr, st.line, st.col) = save;
                        st.bump();
                        push(Token::Colon, &mut tokens);
                    }
                } else if st.peek2() == Some('=') {
                    st.bump();
                    st.bump();
                    push(Token::ImmutAssign, &mut tokens);
                } else {
                    st.bump();
                    push(Token::Colon, &mut tokens);
                }
            }

            '=' => {
                st.bump();
                if st.peek() == Some('=') {
                    st.bump();
                    push(Token::Eq, &mut tokens);
                } else {
                    push(Token::Assign, &mut tokens);
                }
            }

            '!' => {
                st.bump();
                if st.peek() == Some('=') {
                    st.bump();
                    push(Token::Ne, &mut tokens);
                } else {
                    return Err(st.err_bad_char('!'));
                }
            }

            '<' => {
                st.bump();
                if st.peek() == Some('=') {
                    st.bump();
                    push(Token::Le, &mut tokens);
                } else {
                    push(Token::Lt, &mut tokens);
                }
            }

            '>' => {
                st.bump();
                if st.peek() == Some('=') {
                    st.bump();
                    push(Token::Ge, &mut tokens);
                } else {
                    push(Token::Gt, &mut tokens);
                }
            }

            '&' => {
                st.bump();
                if st.peek() == Some('&') {
                    st.bump();
                    push(Token::AndAnd, &mut tokens);
                } else {
                    return Err(st.err_bad_char('&'));
                }
            }

            '|' => {
                st.bump();
                if st.peek() == Some('|') {
                    st.bump();
                    push(Token::OrOr, &mut tokens);
                } else {
                    return Err(st.err_bad_char('|'));
                }
            }

            '+' => {
                st.bump();
                push(Token::Plus, &mut tokens);
            }
            '-' => {
                st.bump();
                push(Token::Minus, &mut tokens);
            }
            '*' => {
                st.bump();
                push(Token::Star, &mut tokens);
            }
            '/' => {
                st.bump();
                push(Token::Slash, &mut tokens);
            }
            '%' => {
                st.bump();
                push(Token::Percent, &mut tokens);
            }
            '(' => {
                st.bump();
                push(Token::LParen, &mut tokens);
            }
            ')' => {
                st.bump();
                push(Token::RParen, &mut tokens);
            }
            '{' => {
                st.bump();
                push(Token::LBrace, &mut tokens);
            }
            '}' => {
                st.bump();
                push(Token::RBrace, &mut tokens);
            }
            '[' => {
                st.bump();
                push(Token::LBracket, &mut tokens);
            }
            ']' => {
                st.bump();
                push(Token::RBracket, &mut tokens);
            }
            '.' => {
                st.bump();
                push(Token::Dot, &mut tokens);
            }
            ',' => {
                st.bump();
                push(Token::Comma, &mut tokens);
            }
            ';' => {
                st.bump();
                push(Token::Semicolon, &mut tokens);
            }
            '?' => {
                st.bump();
                push(Token::Question, &mut tokens);
            }

            other => {
                return Err(st.err_bad_char(other));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<Token> {
        tokenize(s).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn assign_forms_longest_match() {
        assert_eq!(
            toks("a = b := c ::= d"),
            vec![
                Token::Ident("a".to_string()),
                Token::Assign,
                Token::Ident("b".to_string()),
                Token::ImmutAssign,
                Token::Ident("c".to_string()),
                Token::ReactAssign,
                Token::Ident("d".to_string()),
            ]
        );
        // A lone "::" falls back to two colon tokens.
        assert_eq!(toks("a ?: :: b"), vec![
            Token::Ident("a".to_string()),
            Token::Question,
            Token::Colon,
            Token::Colon,
            Token::Colon,
            Token::Ident("b".to_string()),
        ]);
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            toks("== != <= >= < > && ||"),
            vec![
                Token::Eq,
                Token::Ne,
                Token::Le,
                Token::Ge,
                Token::Lt,
                Token::Gt,
                Token::AndAnd,
                Token::OrOr,
            ]
        );
    }

    #[test]
    fn char_and_string_escapes() {
        assert_eq!(
            toks(r#"'a' '\n' '\\' "hi\tthere""#),
            vec![
                Token::Char('a' as i32),
                Token::Char('\n' as i32),
                Token::Char('\\' as i32),
                Token::Str("hi\tthere".to_string()),
            ]
        );
    }

    #[test]
    fn comments_are_delimited_not_line_bound() {
        assert_eq!(
            toks("1 # a comment\nstill a comment # 2"),
            vec![Token::Int(1), Token::Int(2)]
        );
    }

    #[test]
    fn errors_carry_positions() {
        match tokenize("x = $") {
            Err(LexError::BadChar { chr, line, col, .. }) => {
                assert_eq!(chr, '$');
                assert_eq!((line, col), (1, 5));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            tokenize("# never closed"),
            Err(LexError::Unterminated { what: "comment", .. })
        ));
        assert!(matches!(
            tokenize("\"open"),
            Err(LexError::Unterminated { what: "string literal", .. })
        ));
        assert!(matches!(
            tokenize("99999999999"),
            Err(LexError::IntOverflow { .. })
        ));
    }
}
