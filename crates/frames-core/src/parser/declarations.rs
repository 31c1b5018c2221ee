//! Declaration syntax parser using nom
//!
//! # EBNF Grammar
//!
//! ```ebnf
//! module      = {class}, EOF;
//! class       = {"@", ident}, "class", ident, [":", type, {",", type}], "{", {property}, "}";
//! property    = ("var" | "val"), ident, ":", type, ["=", expr], [getter], [setter];
//! getter      = "get", "(", ")", ("=", expr | block);
//! setter      = "set", "(", ident, ")", block;
//! block       = "{", {stmt, [";"]}, "}";
//! stmt        = "return", expr | expr, "=", expr | expr;
//! expr        = primary, {".", ident};
//! primary     = literal | "[", [expr, {",", expr}], "]" | "this" | "field" | ident;
//! literal     = string | float | int | "true" | "false" | "null";
//! type        = ident, ["<", type, {",", type}, ">"], ["?"];
//! ```
//!
//! `//` comments run to the end of the line and count as whitespace.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, satisfy},
    combinator::{cut, eof, map, map_res, not, opt, recognize, value, verify},
    error::{context, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    Err as NomErr, IResult,
};

use crate::ast::{Accessor, ClassDecl, Expr, Literal, Module, PropertyDecl, Stmt, TypeRef};

use super::ParseError;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whitespace and line comments
fn sp(input: &str) -> Res<'_, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(tag("//"), opt(is_not("\n")))),
        ))),
    )(input)
}

fn ws<'a, O, P>(inner: P) -> impl FnMut(&'a str) -> Res<'a, O>
where
    P: FnMut(&'a str) -> Res<'a, O>,
{
    preceded(sp, inner)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn type_ref(input: &str) -> Res<'_, TypeRef> {
    let (input, name) = ws(identifier)(input)?;
    let (input, args) = opt(delimited(
        ws(char('<')),
        separated_list1(ws(char(',')), type_ref),
        cut(ws(char('>'))),
    ))(input)?;
    let (input, nullable) = opt(char('?'))(input)?;
    Ok((
        input,
        TypeRef {
            name: name.to_string(),
            args: args.unwrap_or_default(),
            nullable: nullable.is_some(),
        },
    ))
}

fn string_literal(input: &str) -> Res<'_, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", char('\\')),
                    value("\"", char('"')),
                    value("\n", char('n')),
                    value("\t", char('t')),
                )),
            )),
            Option::unwrap_or_default,
        ),
        cut(char('"')),
    )(input)
}

fn number_literal(input: &str) -> Res<'_, Literal> {
    alt((
        map_res(
            recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
            |text: &str| text.parse::<f64>().map(Literal::Float),
        ),
        map_res(recognize(pair(opt(char('-')), digit1)), |text: &str| {
            text.parse::<i64>().map(Literal::Int)
        }),
    ))(input)
}

fn literal(input: &str) -> Res<'_, Literal> {
    alt((
        map(string_literal, Literal::String),
        number_literal,
        value(Literal::Bool(true), keyword("true")),
        value(Literal::Bool(false), keyword("false")),
        value(Literal::Null, keyword("null")),
    ))(input)
}

fn expr(input: &str) -> Res<'_, Expr> {
    let (input, head) = ws(alt((
        map(literal, Expr::Literal),
        map(
            delimited(
                char('['),
                separated_list0(ws(char(',')), expr),
                cut(ws(char(']'))),
            ),
            Expr::List,
        ),
        value(Expr::This, keyword("this")),
        value(Expr::BackingField, keyword("field")),
        map(identifier, |name: &str| Expr::Local(name.to_string())),
    )))(input)?;
    let (input, path) = many0(preceded(char('.'), identifier))(input)?;
    Ok((
        input,
        path.into_iter().fold(head, |target, name| Expr::field(target, name)),
    ))
}

fn is_assignable(target: &Expr) -> bool {
    matches!(
        target,
        Expr::BackingField | Expr::Local(_) | Expr::FieldGet { .. }
    )
}

fn stmt(input: &str) -> Res<'_, Stmt> {
    terminated(
        ws(alt((
            map(preceded(keyword("return"), cut(expr)), Stmt::Return),
            map(
                separated_pair(verify(expr, is_assignable), ws(char('=')), cut(expr)),
                |(target, value)| Stmt::Assign { target, value },
            ),
            map(expr, Stmt::Expr),
        ))),
        opt(ws(char(';'))),
    )(input)
}

fn block(input: &str) -> Res<'_, Vec<Stmt>> {
    delimited(ws(char('{')), many0(stmt), cut(ws(char('}'))))(input)
}

fn getter(input: &str) -> Res<'_, Accessor> {
    let (input, _) = ws(keyword("get"))(input)?;
    let (input, _) = cut(pair(ws(char('(')), ws(char(')'))))(input)?;
    let (input, body) = context(
        "getter body",
        cut(alt((
            map(preceded(ws(char('=')), expr), |e| vec![Stmt::Return(e)]),
            block,
        ))),
    )(input)?;
    Ok((input, Accessor::getter(body)))
}

fn setter(input: &str) -> Res<'_, Accessor> {
    let (input, _) = ws(keyword("set"))(input)?;
    let (input, param) = cut(delimited(ws(char('(')), ws(identifier), ws(char(')'))))(input)?;
    let (input, body) = context("setter body", cut(block))(input)?;
    Ok((input, Accessor::setter(param, body)))
}

fn property(input: &str) -> Res<'_, PropertyDecl> {
    let (input, mutable) = ws(alt((
        value(true, keyword("var")),
        value(false, keyword("val")),
    )))(input)?;
    let (input, name) = context("property name", cut(ws(identifier)))(input)?;
    let (input, ty) = context("property type", cut(preceded(ws(char(':')), type_ref)))(input)?;
    let (input, initializer) = opt(preceded(ws(char('=')), cut(expr)))(input)?;
    let (input, getter) = opt(getter)(input)?;
    let (input, setter) = opt(setter)(input)?;

    Ok((
        input,
        PropertyDecl {
            name: name.to_string(),
            ty,
            mutable,
            initializer,
            getter,
            setter,
        },
    ))
}

fn class_decl(input: &str) -> Res<'_, ClassDecl> {
    let (input, annotations) = many0(preceded(ws(char('@')), identifier))(input)?;
    let (input, _) = ws(keyword("class"))(input)?;
    let (input, name) = context("class name", cut(ws(identifier)))(input)?;
    let (input, supertypes) = opt(preceded(
        ws(char(':')),
        cut(separated_list1(ws(char(',')), type_ref)),
    ))(input)?;
    let (input, properties) = context(
        "class body",
        cut(delimited(ws(char('{')), many0(property), ws(char('}')))),
    )(input)?;

    let mut class = ClassDecl::new(name);
    class.annotations = annotations.into_iter().map(str::to_string).collect();
    class.supertypes = supertypes.unwrap_or_default();
    class.properties = properties;
    Ok((input, class))
}

fn module(input: &str) -> Res<'_, Module> {
    map(
        terminated(many0(class_decl), context("class declaration", ws(eof))),
        Module::new,
    )(input)
}

/// Parse a whole `.frames` source
pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    match module(source) {
        Ok((_, module)) => Ok(module),
        Err(NomErr::Error(error)) | Err(NomErr::Failure(error)) => Err(syntax_error(source, &error)),
        Err(NomErr::Incomplete(_)) => Err(ParseError::Syntax {
            line: 0,
            column: 0,
            message: "unexpected end of input".to_string(),
        }),
    }
}

/// Parse a single expression, e.g. a value typed at the REPL
pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    match terminated(expr, context("end of expression", ws(eof)))(source) {
        Ok((_, parsed)) => Ok(parsed),
        Err(NomErr::Error(error)) | Err(NomErr::Failure(error)) => Err(syntax_error(source, &error)),
        Err(NomErr::Incomplete(_)) => Err(ParseError::Syntax {
            line: 0,
            column: 0,
            message: "unexpected end of input".to_string(),
        }),
    }
}

fn syntax_error(source: &str, error: &VerboseError<&str>) -> ParseError {
    let Some((remaining, _)) = error.errors.first() else {
        return ParseError::Syntax {
            line: 0,
            column: 0,
            message: "invalid declaration".to_string(),
        };
    };

    let offset = source.len() - remaining.len();
    let consumed = &source[..offset];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count())
        + 1;

    let expected = error.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Char(c) => Some(format!("expected '{c}'")),
        _ => None,
    });
    let within = error.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(ctx) => Some(*ctx),
        _ => None,
    });
    let found: String = remaining.chars().take(12).collect();

    let message = match (expected, within) {
        (Some(expected), Some(within)) => format!("{expected} in {within}, found {found:?}"),
        (Some(expected), None) => format!("{expected}, found {found:?}"),
        (None, Some(within)) => format!("invalid {within} at {found:?}"),
        (None, None) => format!("unexpected {found:?}"),
    };
    ParseError::Syntax {
        line,
        column,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_ref() {
        let (_, ty) = type_ref("List<Int>?").unwrap();
        assert_eq!(
            ty,
            TypeRef::generic("List", vec![TypeRef::named("Int")]).nullable()
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(literal("42"), Ok(("", Literal::Int(42))));
        assert_eq!(literal("-7"), Ok(("", Literal::Int(-7))));
        assert_eq!(literal("2.5"), Ok(("", Literal::Float(2.5))));
        assert_eq!(literal("true"), Ok(("", Literal::Bool(true))));
        assert_eq!(
            literal(r#""a\"b""#),
            Ok(("", Literal::String("a\"b".to_string())))
        );
        assert_eq!(literal(r#""""#), Ok(("", Literal::String(String::new()))));
    }

    #[test]
    fn test_keyword_prefix_is_an_identifier() {
        let (_, parsed) = expr("fieldCount").unwrap();
        assert_eq!(parsed, Expr::local("fieldCount"));
    }

    #[test]
    fn test_parse_field_path() {
        let (_, parsed) = expr("this.owner.name").unwrap();
        assert_eq!(
            parsed,
            Expr::field(Expr::this_field("owner"), "name")
        );
    }

    #[test]
    fn test_parse_counter() {
        let source = r#"
            // a counter
            @Framed
            class Counter : Widget {
                var count: Int = 0
                val label: String = "clicks"
                var total: Int = 0
                    get() = field
                    set(value) { field = value }
            }
        "#;
        let module = parse_module(source).unwrap();
        let counter = module.class("Counter").unwrap();

        assert_eq!(counter.annotations, vec!["Framed"]);
        assert_eq!(counter.supertypes, vec![TypeRef::named("Widget")]);
        assert_eq!(counter.properties.len(), 3);
        assert!(!counter.properties[1].mutable);

        let total = &counter.properties[2];
        assert_eq!(
            total.getter,
            Some(Accessor::getter(vec![Stmt::Return(Expr::BackingField)]))
        );
        assert_eq!(
            total.setter,
            Some(Accessor::setter(
                "value",
                vec![Stmt::Assign {
                    target: Expr::BackingField,
                    value: Expr::local("value"),
                }]
            ))
        );
    }

    #[test]
    fn test_parse_error_has_position() {
        let err = parse_module("class Broken {\n  var count Int\n}").unwrap_err();
        match err {
            ParseError::Syntax { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("':'"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse_module("class A {}\n garbage").is_err());
    }

    #[test]
    fn test_parse_single_expression() {
        assert_eq!(parse_expr(" [1, 2] ").unwrap(), Expr::List(vec![Expr::int(1), Expr::int(2)]));
        assert_eq!(parse_expr("\"hi\"").unwrap(), Expr::string("hi"));
        assert!(parse_expr("1 2").is_err());
    }
}
