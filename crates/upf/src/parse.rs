//! Recogniser for the C expression subset legal as a call argument.
//!
//! Nothing is evaluated; parsing extracts only the shape-changing
//! operations: the base identifier or cast typename, the member chain, the
//! net pointer adjustment and the trailing call count. Every other operator
//! passes the operand's type through. Alternatives are tried with plain
//! backtracking over the token index.

use crate::error::{Error, Result};
use crate::tokenize::{Token, TokenKind};

/// How the base of an expression resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseKind {
    /// A cast typename; looked up in the named-type lists.
    Typename,
    /// An identifier; looked up in the scope tree.
    Variable,
    /// An identifier that is called directly; looked up as a function.
    Function,
}

/// The extracted shape of one argument expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedArg {
    /// Net pointer adjustment: unary `*` and trailing `[]` increment,
    /// unary `&` and cast stars decrement.
    pub deref: i32,
    /// Trailing `(...)` applications on the whole expression.
    pub suffix_calls: u32,
    pub base: String,
    pub base_kind: BaseKind,
    /// `.`/`->` member names applied after the base.
    pub members: Vec<String>,
}

/// Parser-internal state; `base` is `None` while the expression is a bare
/// literal.
#[derive(Clone, Debug, Default)]
struct State {
    deref: i32,
    suffix_calls: u32,
    base: Option<(String, BaseKind)>,
    members: Vec<String>,
}

impl State {
    fn literal() -> Self {
        Self::default()
    }

    fn of_base(name: &str, kind: BaseKind) -> Self {
        Self {
            base: Some((name.to_owned(), kind)),
            ..Self::default()
        }
    }
}

/// Parse one argument's token stream.
///
/// # Errors
///
/// Returns [`Error::BadArgument`] when the tokens are not a recognisable
/// expression or when the expression has no typeable base.
pub fn parse_argument(tokens: &[Token<'_>], source: &str) -> Result<ParsedArg> {
    let mut parser = Parser { tokens, idx: 0 };
    let state = parser
        .expr()
        .filter(|_| parser.idx == tokens.len())
        .ok_or_else(|| Error::BadArgument(source.to_owned()))?;
    let (base, base_kind) = state
        .base
        .ok_or_else(|| Error::BadArgument(source.to_owned()))?;
    Ok(ParsedArg {
        deref: state.deref,
        suffix_calls: state.suffix_calls,
        base,
        base_kind,
        members: state.members,
    })
}

struct Parser<'t, 's> {
    tokens: &'t [Token<'s>],
    idx: usize,
}

impl<'s> Parser<'_, 's> {
    fn peek(&self) -> Option<&Token<'s>> {
        self.tokens.get(self.idx)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().is_some_and(|t| t.kind == kind) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self) -> Option<String> {
        let token = *self.peek()?;
        if token.kind == TokenKind::Ident {
            self.idx += 1;
            Some(token.text.to_owned())
        } else {
            None
        }
    }

    /// comma-expression; the value (and type) is the right operand's.
    fn expr(&mut self) -> Option<State> {
        let mut state = self.assignment()?;
        while self.eat(TokenKind::Comma) {
            state = self.assignment()?;
        }
        Some(state)
    }

    /// assignment; the type is the left operand's.
    fn assignment(&mut self) -> Option<State> {
        let save = self.idx;
        if let Some(lhs) = self.unary() {
            if self.eat(TokenKind::Assignment) {
                if let Some(_rhs) = self.assignment() {
                    return Some(lhs);
                }
            }
        }
        self.idx = save;
        self.ternary()
    }

    fn ternary(&mut self) -> Option<State> {
        let condition = self.binary()?;
        if !self.eat(TokenKind::Question) {
            return Some(condition);
        }
        let then_branch = self.expr()?;
        if !self.eat(TokenKind::Colon) {
            return None;
        }
        let _else_branch = self.ternary()?;
        // Both branches share a type; the then-branch stands for it.
        Some(then_branch)
    }

    /// All binary operators at one pass-through precedence level.
    fn binary(&mut self) -> Option<State> {
        let mut lhs = self.cast()?;
        loop {
            let Some(token) = self.peek() else {
                return Some(lhs);
            };
            match token.kind {
                TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Ampersand
                | TokenKind::Comparison
                | TokenKind::Math => {
                    let save = self.idx;
                    self.idx += 1;
                    let Some(rhs) = self.cast() else {
                        self.idx = save;
                        return Some(lhs);
                    };
                    // Pointer arithmetic keeps the pointer operand's type.
                    if lhs.base.is_none() {
                        lhs = rhs;
                    }
                }
                _ => return Some(lhs),
            }
        }
    }

    fn cast(&mut self) -> Option<State> {
        let save = self.idx;
        if self.eat(TokenKind::OpenParen) {
            if let Some((name, stars)) = self.typename() {
                if self.eat(TokenKind::CloseParen) {
                    // Compound literal or cast; either way the typename
                    // replaces the operand's type entirely.
                    let operand = if self.peek().is_some_and(|t| t.kind == TokenKind::OpenBrace) {
                        self.skip_braces()
                    } else {
                        self.cast().map(|_| ())
                    };
                    if operand.is_some() {
                        let mut state = State::of_base(&name, BaseKind::Typename);
                        state.deref = -stars;
                        return Some(state);
                    }
                }
            }
            self.idx = save;
        }
        self.unary()
    }

    /// Consume a balanced initializer-list `{...}` without interpreting it.
    fn skip_braces(&mut self) -> Option<()> {
        if !self.eat(TokenKind::OpenBrace) {
            return None;
        }
        let mut depth = 1_u32;
        while depth > 0 {
            match self.peek()?.kind {
                TokenKind::OpenBrace => depth += 1,
                TokenKind::CloseBrace => depth -= 1,
                _ => {}
            }
            self.idx += 1;
        }
        Some(())
    }

    fn unary(&mut self) -> Option<State> {
        let token = *self.peek()?;
        match token.kind {
            TokenKind::Star => {
                self.idx += 1;
                let mut state = self.cast()?;
                state.deref += 1;
                Some(state)
            }
            TokenKind::Ampersand => {
                self.idx += 1;
                let mut state = self.cast()?;
                state.deref -= 1;
                Some(state)
            }
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Exclamation
            | TokenKind::Tilde
            | TokenKind::Increment
            | TokenKind::Decrement => {
                self.idx += 1;
                self.cast()
            }
            TokenKind::Ident
                if token.text == "sizeof" || token.text == "alignof" || token.text == "_Alignof" =>
            {
                self.idx += 1;
                self.sizeof_operand()?;
                Some(State::literal())
            }
            _ => self.postfix(),
        }
    }

    fn sizeof_operand(&mut self) -> Option<()> {
        let save = self.idx;
        if self.eat(TokenKind::OpenParen) {
            if self.typename().is_some() && self.eat(TokenKind::CloseParen) {
                return Some(());
            }
            self.idx = save;
        }
        self.unary().map(|_| ())
    }

    fn postfix(&mut self) -> Option<State> {
        let mut state = self.primary()?;
        // Subscripts and calls interior to a member chain are absorbed by
        // the chain's pointer/array descent; only trailing ones count.
        let mut pending_derefs = 0;
        let mut pending_calls = 0;

        loop {
            let Some(token) = self.peek() else {
                break;
            };
            match token.kind {
                TokenKind::OpenBracket => {
                    self.idx += 1;
                    self.expr()?;
                    if !self.eat(TokenKind::CloseBracket) {
                        return None;
                    }
                    pending_derefs += 1;
                }
                TokenKind::OpenParen => {
                    self.idx += 1;
                    if !self.eat(TokenKind::CloseParen) {
                        self.expr()?;
                        if !self.eat(TokenKind::CloseParen) {
                            return None;
                        }
                    }
                    // A direct call of the bare base is a function lookup.
                    if state.members.is_empty()
                        && pending_derefs == 0
                        && pending_calls == 0
                        && state.deref == 0
                    {
                        if let Some((_, kind @ BaseKind::Variable)) = &mut state.base {
                            *kind = BaseKind::Function;
                        }
                    }
                    pending_calls += 1;
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    self.idx += 1;
                    let name = self.eat_ident()?;
                    state.members.push(name);
                    pending_derefs = 0;
                    pending_calls = 0;
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    self.idx += 1;
                }
                _ => break,
            }
        }

        state.deref += pending_derefs;
        state.suffix_calls += pending_calls;
        Some(state)
    }

    fn primary(&mut self) -> Option<State> {
        let token = *self.peek()?;
        match token.kind {
            TokenKind::OpenParen => {
                self.idx += 1;
                let state = self.expr()?;
                if self.eat(TokenKind::CloseParen) {
                    Some(state)
                } else {
                    None
                }
            }
            TokenKind::Ident => {
                self.idx += 1;
                Some(State::of_base(token.text, BaseKind::Variable))
            }
            TokenKind::Number => {
                self.idx += 1;
                Some(State::literal())
            }
            TokenKind::Str => {
                self.idx += 1;
                // A string literal is a char pointer.
                let mut state = State::of_base("char", BaseKind::Typename);
                state.deref = -1;
                Some(state)
            }
            _ => None,
        }
    }

    /// `(qualifiers? specifier-or-base-words stars?)`. A bare identifier is
    /// only accepted as a typename when at least one star follows, which
    /// disambiguates `(foo*)x` from the parenthesised expression `(foo)`.
    fn typename(&mut self) -> Option<(String, i32)> {
        while self.eat(TokenKind::TypeQualifier) {}

        let (name, bare_ident) = if self.eat(TokenKind::TypeSpecifier) {
            (self.eat_ident()?, false)
        } else if self.peek().is_some_and(is_base_type_word) {
            let mut words = Vec::new();
            while let Some(token) = self.peek() {
                if is_base_type_word(token) {
                    words.push(token.text);
                    self.idx += 1;
                } else {
                    break;
                }
            }
            (canonical_base_type(&words)?, false)
        } else {
            (self.eat_ident()?, true)
        };

        let mut stars = 0;
        loop {
            while self.eat(TokenKind::TypeQualifier) {}
            if self.eat(TokenKind::Star) {
                stars += 1;
            } else {
                break;
            }
        }

        if bare_ident && stars == 0 {
            return None;
        }
        Some((name, stars))
    }
}

fn is_base_type_word(token: &Token<'_>) -> bool {
    token.kind == TokenKind::Ident
        && matches!(
            token.text,
            "void"
                | "char"
                | "short"
                | "int"
                | "long"
                | "signed"
                | "unsigned"
                | "float"
                | "double"
                | "bool"
                | "_Bool"
        )
}

/// Assemble width-variable C base type words into the spelling the compiler
/// records in the debug info.
fn canonical_base_type(words: &[&str]) -> Option<String> {
    let mut unsigned = false;
    let mut signed = false;
    let mut longs = 0;
    let mut short = false;
    let mut int = false;
    let mut type_word = None;

    for &word in words {
        match word {
            "unsigned" => unsigned = true,
            "signed" => signed = true,
            "long" => longs += 1,
            "short" => short = true,
            "int" => int = true,
            "void" | "char" | "float" | "double" | "bool" | "_Bool" => type_word = Some(word),
            _ => return None,
        }
    }

    let name = match type_word {
        Some("void") => "void",
        Some("char") => {
            if unsigned {
                "unsigned char"
            } else if signed {
                "signed char"
            } else {
                "char"
            }
        }
        Some("float") => "float",
        Some("double") => {
            if longs > 0 {
                "long double"
            } else {
                "double"
            }
        }
        Some("bool" | "_Bool") => "_Bool",
        Some(_) => return None,
        None => {
            if short {
                if unsigned {
                    "short unsigned int"
                } else {
                    "short int"
                }
            } else if longs >= 2 {
                if unsigned {
                    "long long unsigned int"
                } else {
                    "long long int"
                }
            } else if longs == 1 {
                if unsigned {
                    "long unsigned int"
                } else {
                    "long int"
                }
            } else if unsigned {
                "unsigned int"
            } else if int || signed {
                "int"
            } else {
                return None;
            }
        }
    };
    Some(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::tokenize;

    fn parse(source: &str) -> ParsedArg {
        let tokens = tokenize(source).unwrap();
        parse_argument(&tokens, source).unwrap()
    }

    fn fails(source: &str) -> bool {
        let Ok(tokens) = tokenize(source) else {
            return true;
        };
        parse_argument(&tokens, source).is_err()
    }

    #[test]
    fn test_address_of_variable() {
        let arg = parse("&x");
        assert_eq!(arg.base, "x");
        assert_eq!(arg.base_kind, BaseKind::Variable);
        assert_eq!(arg.deref, -1);
        assert!(arg.members.is_empty());
    }

    #[test]
    fn test_bare_pointer() {
        let arg = parse("ptr");
        assert_eq!(arg.deref, 0);
        assert_eq!(arg.base, "ptr");
    }

    #[test]
    fn test_member_chain() {
        let arg = parse("&list->head.value");
        assert_eq!(arg.base, "list");
        assert_eq!(arg.members, vec!["head", "value"]);
        assert_eq!(arg.deref, -1);
    }

    #[test]
    fn test_trailing_subscript_counts() {
        let arg = parse("&s.a[1]");
        assert_eq!(arg.members, vec!["a"]);
        assert_eq!(arg.deref, 0); // +1 subscript, -1 address-of
    }

    #[test]
    fn test_interior_subscript_is_absorbed() {
        let arg = parse("&list.nodes[2].value");
        assert_eq!(arg.members, vec!["nodes", "value"]);
        assert_eq!(arg.deref, -1);
    }

    #[test]
    fn test_cast_with_stars() {
        let arg = parse("(struct foo*)x");
        assert_eq!(arg.base, "foo");
        assert_eq!(arg.base_kind, BaseKind::Typename);
        assert_eq!(arg.deref, -1);
    }

    #[test]
    fn test_cast_of_base_type_words() {
        let arg = parse("(unsigned long long int*)p");
        assert_eq!(arg.base, "long long unsigned int");
        assert_eq!(arg.deref, -1);

        let arg = parse("(const char*)p");
        assert_eq!(arg.base, "char");

        let arg = parse("(void*)p");
        assert_eq!(arg.base, "void");
    }

    #[test]
    fn test_bare_identifier_cast_requires_star() {
        // `(foo)` must stay a parenthesised expression, not a cast.
        let arg = parse("(foo)");
        assert_eq!(arg.base_kind, BaseKind::Variable);
        assert_eq!(arg.base, "foo");

        let arg = parse("(mytype*)p");
        assert_eq!(arg.base_kind, BaseKind::Typename);
        assert_eq!(arg.base, "mytype");
    }

    #[test]
    fn test_direct_call_is_function_base() {
        let arg = parse("make_node(1, 2)");
        assert_eq!(arg.base_kind, BaseKind::Function);
        assert_eq!(arg.suffix_calls, 1);

        let arg = parse("make_node(1)(2)");
        assert_eq!(arg.suffix_calls, 2);
    }

    #[test]
    fn test_interior_call_is_absorbed() {
        let arg = parse("obj.get(1).field");
        assert_eq!(arg.members, vec!["get", "field"]);
        assert_eq!(arg.suffix_calls, 0);
    }

    #[test]
    fn test_double_dereference() {
        let arg = parse("**pp");
        assert_eq!(arg.deref, 2);
    }

    #[test]
    fn test_string_literal_is_char_pointer() {
        let arg = parse(r#"(char*)"hi""#);
        assert_eq!(arg.base, "char");
        assert_eq!(arg.deref, -1);

        let arg = parse(r#""hi""#);
        assert_eq!(arg.base, "char");
        assert_eq!(arg.deref, -1);
    }

    #[test]
    fn test_binary_keeps_typed_operand() {
        let arg = parse("p + 1");
        assert_eq!(arg.base, "p");
        let arg = parse("1 + p");
        assert_eq!(arg.base, "p");
    }

    #[test]
    fn test_ternary_uses_then_branch() {
        let arg = parse("flag ? &a : &b");
        assert_eq!(arg.base, "a");
        assert_eq!(arg.deref, -1);
    }

    #[test]
    fn test_sizeof_is_a_literal() {
        let arg = parse("buf + sizeof(int)");
        assert_eq!(arg.base, "buf");
        let arg = parse("buf + sizeof x");
        assert_eq!(arg.base, "buf");
    }

    #[test]
    fn test_assignment_takes_lvalue() {
        let arg = parse("p = q");
        assert_eq!(arg.base, "p");
        let arg = parse("p += 2");
        assert_eq!(arg.base, "p");
    }

    #[test]
    fn test_prefix_and_postfix_increments_pass_through() {
        let arg = parse("++p");
        assert_eq!(arg.base, "p");
        let arg = parse("p++");
        assert_eq!(arg.base, "p");
    }

    #[test]
    fn test_compound_literal() {
        let arg = parse("&(int){42}");
        assert_eq!(arg.base, "int");
        assert_eq!(arg.base_kind, BaseKind::Typename);
        assert_eq!(arg.deref, -1);

        let arg = parse("&(struct P){7, 1.5f}");
        assert_eq!(arg.base, "P");
        assert_eq!(arg.deref, -1);
    }

    #[test]
    fn test_cast_resolves_to_pointee_type() {
        // One star cancels against the implicit argument dereference.
        let arg = parse(r#"(char*)"hi\n""#);
        assert_eq!(arg.deref + 1, 0);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(fails("42"));
        assert!(fails("&"));
        assert!(fails("a ->"));
        assert!(fails("(int*)"));
        assert!(fails("f("));
    }
}
