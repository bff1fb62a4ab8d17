//! Recursive-descent parser for signature files.
//!
//! The grammar is small enough to parse with one token of lookahead
//! everywhere except proc types, which need two (`ident :` starts a
//! keyword parameter). `&` binds tighter than `|`; `->` is greedy to the
//! right, so `() -> A | B` returns `A | B`.
//!
//! Parsing stops at the first error; the error carries the byte span the
//! diagnostic should point at.

use steep_common::Span;

use crate::ast::{
    AliasDef, ClassDef, Decl, InterfaceDef, MethodDef, TypeExpr, TypeExprKind, TypeParamDef,
    VarianceDef,
};
use crate::token::{Scanner, Token, TokenKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse a whole signature file.
pub fn parse_file(source: &str) -> Result<Vec<Decl>, ParseError> {
    Parser::new(source).parse_decls()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: Scanner::new(source).tokenize(),
            pos: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().unwrap_or_else(|| unreachable!()))
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Ident && token.text == keyword
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Token, ParseError> {
        if self.at(TokenKind::Ident) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("expected {what}")))
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Eof => "end of file".to_string(),
            _ => format!("`{}`", token.text),
        };
        ParseError {
            message: format!("{message}, found {found}"),
            span: token.span,
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    pub fn parse_decls(&mut self) -> Result<Vec<Decl>, ParseError> {
        let mut decls = Vec::new();
        loop {
            if self.at(TokenKind::Eof) {
                return Ok(decls);
            }
            if self.at_keyword("class") {
                decls.push(Decl::Class(self.parse_class()?));
            } else if self.at_keyword("interface") {
                decls.push(Decl::Interface(self.parse_interface()?));
            } else if self.at_keyword("type") {
                decls.push(Decl::Alias(self.parse_alias()?));
            } else {
                return Err(self.error_here("expected `class`, `interface`, or `type`"));
            }
        }
    }

    fn parse_class(&mut self) -> Result<ClassDef, ParseError> {
        let keyword = self.advance();
        let name = self.expect_ident("a class name")?;
        let type_params = self.parse_type_params()?;
        let superclass = if self.eat(TokenKind::Lt) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let methods = self.parse_methods()?;
        let end = self.expect_end()?;
        Ok(ClassDef {
            name: name.text,
            name_span: name.span,
            type_params,
            superclass,
            methods,
            span: keyword.span.join(end.span),
        })
    }

    fn parse_interface(&mut self) -> Result<InterfaceDef, ParseError> {
        let keyword = self.advance();
        let name = self.expect_ident("an interface name")?;
        if !name.text.starts_with('_') {
            return Err(ParseError {
                message: format!(
                    "interface names start with an underscore: `_{}`",
                    name.text
                ),
                span: name.span,
            });
        }
        let type_params = self.parse_type_params()?;
        let methods = self.parse_methods()?;
        let end = self.expect_end()?;
        Ok(InterfaceDef {
            name: name.text,
            name_span: name.span,
            type_params,
            methods,
            span: keyword.span.join(end.span),
        })
    }

    fn parse_alias(&mut self) -> Result<AliasDef, ParseError> {
        let keyword = self.advance();
        let name = self.expect_ident("an alias name")?;
        let type_params = self.parse_type_params()?;
        self.expect(TokenKind::Eq, "`=`")?;
        let body = self.parse_type()?;
        let span = keyword.span.join(body.span);
        Ok(AliasDef {
            name: name.text,
            name_span: name.span,
            type_params,
            body,
            span,
        })
    }

    fn expect_end(&mut self) -> Result<Token, ParseError> {
        if self.at_keyword("end") {
            Ok(self.advance())
        } else {
            Err(self.error_here("expected `def` or `end`"))
        }
    }

    fn parse_type_params(&mut self) -> Result<Vec<TypeParamDef>, ParseError> {
        let mut params = Vec::new();
        if !self.eat(TokenKind::LBracket) {
            return Ok(params);
        }
        loop {
            let variance = if self.at_keyword("out") {
                self.advance();
                VarianceDef::Covariant
            } else if self.at_keyword("in") {
                self.advance();
                VarianceDef::Contravariant
            } else {
                VarianceDef::Invariant
            };
            let name = self.expect_ident("a type parameter name")?;
            params.push(TypeParamDef {
                name: name.text,
                variance,
                span: name.span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "`]`")?;
        Ok(params)
    }

    fn parse_methods(&mut self) -> Result<Vec<MethodDef>, ParseError> {
        let mut methods = Vec::new();
        while self.at_keyword("def") {
            let keyword = self.advance();
            let name = self.expect_ident("a method name")?;
            self.expect(TokenKind::Colon, "`:`")?;
            let mut type_params = Vec::new();
            if self.eat(TokenKind::LBracket) {
                loop {
                    let param = self.expect_ident("a type parameter name")?;
                    type_params.push(param.text);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "`]`")?;
            }
            let ty = self.parse_type()?;
            let span = keyword.span.join(ty.span);
            methods.push(MethodDef {
                name: name.text,
                type_params,
                ty,
                span,
                name_span: name.span,
            });
        }
        Ok(methods)
    }

    // =========================================================================
    // Type Expressions
    // =========================================================================

    /// union := intersection (`|` intersection)*
    pub fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let first = self.parse_intersection()?;
        if !self.at(TokenKind::Pipe) {
            return Ok(first);
        }
        let mut span = first.span;
        let mut members = vec![first];
        while self.eat(TokenKind::Pipe) {
            let member = self.parse_intersection()?;
            span = span.join(member.span);
            members.push(member);
        }
        Ok(TypeExpr::new(TypeExprKind::Union(members), span))
    }

    /// intersection := primary (`&` primary)*
    fn parse_intersection(&mut self) -> Result<TypeExpr, ParseError> {
        let first = self.parse_primary()?;
        if !self.at(TokenKind::Amp) {
            return Ok(first);
        }
        let mut span = first.span;
        let mut members = vec![first];
        while self.eat(TokenKind::Amp) {
            let member = self.parse_primary()?;
            span = span.join(member.span);
            members.push(member);
        }
        Ok(TypeExpr::new(TypeExprKind::Intersection(members), span))
    }

    fn parse_primary(&mut self) -> Result<TypeExpr, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident => match token.text.as_str() {
                "top" => {
                    self.advance();
                    Ok(TypeExpr::new(TypeExprKind::Top, token.span))
                }
                "bot" => {
                    self.advance();
                    Ok(TypeExpr::new(TypeExprKind::Bot, token.span))
                }
                "any" => {
                    self.advance();
                    Ok(TypeExpr::new(TypeExprKind::Any, token.span))
                }
                "self" => {
                    self.advance();
                    Ok(TypeExpr::new(TypeExprKind::SelfType, token.span))
                }
                "singleton" => self.parse_singleton(),
                _ => self.parse_name(),
            },
            TokenKind::LParen => self.parse_proc_or_group(),
            TokenKind::LBracket => self.parse_tuple(),
            TokenKind::LBrace => self.parse_record(),
            _ => Err(self.error_here("expected a type")),
        }
    }

    fn parse_singleton(&mut self) -> Result<TypeExpr, ParseError> {
        let keyword = self.advance();
        self.expect(TokenKind::LParen, "`(`")?;
        let name = self.expect_ident("a class name")?;
        let close = self.expect(TokenKind::RParen, "`)`")?;
        Ok(TypeExpr::new(
            TypeExprKind::Singleton { name: name.text },
            keyword.span.join(close.span),
        ))
    }

    fn parse_name(&mut self) -> Result<TypeExpr, ParseError> {
        let name = self.advance();
        let mut span = name.span;
        let mut args = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                args.push(self.parse_type()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let close = self.expect(TokenKind::RBracket, "`]`")?;
            span = span.join(close.span);
        }
        Ok(TypeExpr::new(
            TypeExprKind::Name {
                name: name.text,
                args,
            },
            span,
        ))
    }

    fn parse_tuple(&mut self) -> Result<TypeExpr, ParseError> {
        let open = self.advance();
        let mut elems = Vec::new();
        if !self.at(TokenKind::RBracket) {
            loop {
                elems.push(self.parse_type()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBracket, "`]`")?;
        Ok(TypeExpr::new(
            TypeExprKind::Tuple(elems),
            open.span.join(close.span),
        ))
    }

    fn parse_record(&mut self) -> Result<TypeExpr, ParseError> {
        let open = self.advance();
        let mut fields = Vec::new();
        if !self.at(TokenKind::RBrace) {
            loop {
                let key = self.expect_ident("a field name")?;
                self.expect(TokenKind::Colon, "`:`")?;
                let ty = self.parse_type()?;
                fields.push((key.text, ty));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBrace, "`}`")?;
        Ok(TypeExpr::new(
            TypeExprKind::Record(fields),
            open.span.join(close.span),
        ))
    }

    /// `(...)` is a proc type when followed by `->`, a grouping otherwise.
    fn parse_proc_or_group(&mut self) -> Result<TypeExpr, ParseError> {
        let open = self.advance();
        let mut params = Vec::new();
        let mut keywords = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                // `name :` starts a keyword parameter.
                let is_keyword = self.at(TokenKind::Ident)
                    && self.peek2().is_some_and(|t| t.kind == TokenKind::Colon);
                if is_keyword {
                    let key = self.advance();
                    self.expect(TokenKind::Colon, "`:`")?;
                    let ty = self.parse_type()?;
                    keywords.push((key.text, ty));
                } else {
                    params.push(self.parse_type()?);
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RParen, "`)`")?;

        if self.eat(TokenKind::Arrow) {
            let ret = self.parse_type()?;
            let span = open.span.join(ret.span);
            return Ok(TypeExpr::new(
                TypeExprKind::Proc {
                    params,
                    keywords,
                    ret: Box::new(ret),
                },
                span,
            ));
        }

        // A grouping holds exactly one positional type.
        if params.len() == 1 && keywords.is_empty() {
            return Ok(params.into_iter().next().unwrap_or_else(|| unreachable!()));
        }
        Err(ParseError {
            message: "expected `->` after parameter list".to_string(),
            span: open.span.join(close.span),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_type_str(source: &str) -> TypeExpr {
        let mut parser = Parser::new(source);
        parser.parse_type().unwrap()
    }

    #[test]
    fn test_parse_class_with_superclass_and_methods() {
        let decls = parse_file(
            "class Stack[out A] < Object\n  def push: (A) -> Stack[A]\n  def pop: () -> A\nend\n",
        )
        .unwrap();
        assert_eq!(decls.len(), 1);
        let Decl::Class(class) = &decls[0] else {
            panic!("expected a class");
        };
        assert_eq!(class.name, "Stack");
        assert_eq!(class.type_params.len(), 1);
        assert_eq!(class.type_params[0].variance, VarianceDef::Covariant);
        assert!(class.superclass.is_some());
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.methods[0].name, "push");
    }

    #[test]
    fn test_parse_interface() {
        let decls =
            parse_file("interface _Each[A]\n  def each: () -> Array[A]\nend\n").unwrap();
        let Decl::Interface(iface) = &decls[0] else {
            panic!("expected an interface");
        };
        assert_eq!(iface.name, "_Each");
        assert_eq!(iface.methods.len(), 1);
    }

    #[test]
    fn test_interface_name_needs_underscore() {
        let error = parse_file("interface Each\nend\n").unwrap_err();
        assert!(error.message.contains("underscore"));
    }

    #[test]
    fn test_parse_alias() {
        let decls = parse_file("type int_or_string = Integer | String\n").unwrap();
        let Decl::Alias(alias) = &decls[0] else {
            panic!("expected an alias");
        };
        assert_eq!(alias.name, "int_or_string");
        assert!(matches!(alias.body.kind, TypeExprKind::Union(ref ms) if ms.len() == 2));
    }

    #[test]
    fn test_intersection_binds_tighter_than_union() {
        let ty = parse_type_str("A | B & C");
        let TypeExprKind::Union(members) = &ty.kind else {
            panic!("expected a union");
        };
        assert_eq!(members.len(), 2);
        assert!(matches!(members[1].kind, TypeExprKind::Intersection(_)));
    }

    #[test]
    fn test_parse_proc_with_keywords() {
        let ty = parse_type_str("(Integer, size: String) -> bool");
        let TypeExprKind::Proc {
            params, keywords, ..
        } = &ty.kind
        else {
            panic!("expected a proc");
        };
        assert_eq!(params.len(), 1);
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].0, "size");
    }

    #[test]
    fn test_parse_higher_order_proc() {
        let ty = parse_type_str("((A) -> B) -> Array[B]");
        let TypeExprKind::Proc { params, ret, .. } = &ty.kind else {
            panic!("expected a proc");
        };
        assert!(matches!(params[0].kind, TypeExprKind::Proc { .. }));
        assert!(matches!(ret.kind, TypeExprKind::Name { .. }));
    }

    #[test]
    fn test_grouping() {
        let ty = parse_type_str("(A | B) & C");
        let TypeExprKind::Intersection(members) = &ty.kind else {
            panic!("expected an intersection");
        };
        assert!(matches!(members[0].kind, TypeExprKind::Union(_)));
    }

    #[test]
    fn test_parse_tuple_and_record() {
        let ty = parse_type_str("[Integer, { name: String }]");
        let TypeExprKind::Tuple(elems) = &ty.kind else {
            panic!("expected a tuple");
        };
        assert_eq!(elems.len(), 2);
        assert!(matches!(elems[1].kind, TypeExprKind::Record(_)));
    }

    #[test]
    fn test_parse_singleton_and_builtins() {
        assert!(matches!(
            parse_type_str("singleton(Stack)").kind,
            TypeExprKind::Singleton { .. }
        ));
        assert!(matches!(parse_type_str("top").kind, TypeExprKind::Top));
        assert!(matches!(parse_type_str("bot").kind, TypeExprKind::Bot));
        assert!(matches!(parse_type_str("any").kind, TypeExprKind::Any));
        assert!(matches!(
            parse_type_str("self").kind,
            TypeExprKind::SelfType
        ));
    }

    #[test]
    fn test_generic_method() {
        let decls =
            parse_file("class List[A]\n  def map: [B] ((A) -> B) -> List[B]\nend\n").unwrap();
        let Decl::Class(class) = &decls[0] else {
            panic!("expected a class");
        };
        assert_eq!(class.methods[0].type_params, vec!["B".to_string()]);
    }

    #[test]
    fn test_error_span_points_at_the_problem() {
        let error = parse_file("class Stack\n  def push (A) -> Stack\nend\n").unwrap_err();
        assert!(error.message.contains("expected `:`"));
        // Points at the `(` after the method name, offset 23.
        assert_eq!(error.span.start, 23);
    }

    #[test]
    fn test_error_on_stray_token() {
        let error = parse_file("def push: () -> A\n").unwrap_err();
        assert!(error.message.contains("expected `class`"));
    }

    #[test]
    fn test_error_on_unknown_character() {
        let error = parse_file("type a = @").unwrap_err();
        assert!(error.message.contains("expected a type"));
    }
}
