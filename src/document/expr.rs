//! Static inspection of [`hcl::Expression`] values.
//!
//! Nothing here evaluates anything: a value only counts as a string or a
//! boolean when it is written as a literal.

use hcl::expr::{Object, ObjectKey};
use hcl::{Expression, Identifier};

/// Object expression as stored in the tree.
pub type ObjectItems = Object<ObjectKey, Expression>;

/// Name of the expression's syntactic kind, used in error messages.
pub fn kind_name(expr: &Expression) -> &'static str {
    match expr {
        Expression::Null => "null",
        Expression::Bool(_) => "bool",
        Expression::Number(_) => "number",
        Expression::String(_) => "string",
        Expression::Array(_) => "tuple",
        Expression::Object(_) => "object",
        Expression::TemplateExpr(_) => "template",
        Expression::Variable(_) => "variable",
        Expression::Traversal(_) => "traversal",
        Expression::FuncCall(_) => "function call",
        Expression::Conditional(_) => "conditional",
        Expression::ForExpr(_) => "for expression",
        _ => "expression",
    }
}

/// The text of a quoted string without interpolation.
pub fn static_str(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::String(value) => Some(value.as_str()),
        _ => None,
    }
}

pub fn static_bool(expr: &Expression) -> Option<bool> {
    match expr {
        Expression::Bool(value) => Some(*value),
        _ => None,
    }
}

/// `["a", "b"]` with every element a static string.
pub fn static_string_list(expr: &Expression) -> Option<Vec<String>> {
    match expr {
        Expression::Array(elements) => elements
            .iter()
            .map(|element| static_str(element).map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Whether `key` addresses the path segment `name`: a bare identifier
/// equal to it or a quoted string equal to it.
pub fn key_matches(key: &ObjectKey, name: &str) -> bool {
    match key {
        ObjectKey::Identifier(ident) => ident.as_str() == name,
        ObjectKey::Expression(expr) => static_str(expr) == Some(name),
        _ => false,
    }
}

/// Key for a new object item: bare when `name` is an identifier, quoted
/// otherwise.
pub fn key_for_name(name: &str) -> ObjectKey {
    match identifier(name) {
        Some(ident) => ObjectKey::Identifier(ident),
        None => ObjectKey::Expression(Expression::String(name.to_string())),
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-')
        }
        _ => false,
    }
}

pub(crate) fn identifier(name: &str) -> Option<Identifier> {
    if !is_identifier(name) {
        return None;
    }
    Identifier::new(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_body;

    fn value(src: &str) -> Expression {
        let body = parse_body(&format!("value = {src}\n"), "test.hcl").unwrap();
        body.attributes["value"].expr.clone()
    }

    #[test]
    fn reads_literals_only() {
        assert_eq!(static_str(&value("\"web\"")), Some("web"));
        assert_eq!(static_str(&value("\"${var.env}-web\"")), None);
        assert_eq!(static_bool(&value("true")), Some(true));
        assert_eq!(static_bool(&value("var.enabled")), None);
        assert_eq!(
            static_string_list(&value("[\"a\", \"b\"]")),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(static_string_list(&value("[\"a\", 1]")), None);
    }

    #[test]
    fn names_kinds() {
        assert_eq!(kind_name(&value("\"a\"")), "string");
        assert_eq!(kind_name(&value("[1]")), "tuple");
        assert_eq!(kind_name(&value("{}")), "object");
        assert_eq!(kind_name(&value("var.x")), "traversal");
        assert_eq!(kind_name(&value("max(1, 2)")), "function call");
    }

    #[test]
    fn key_for_name_quotes_non_identifiers() {
        let key = key_for_name("env");
        assert!(matches!(key, ObjectKey::Identifier(_)));
        assert!(key_matches(&key, "env"));

        let key = key_for_name("kubernetes.io/name");
        assert!(matches!(key, ObjectKey::Expression(_)));
        assert!(key_matches(&key, "kubernetes.io/name"));
        assert!(!key_matches(&key, "kubernetes.io"));
    }

    #[test]
    fn quoted_and_bare_keys_match_alike() {
        let Expression::Object(items) = value("{\n  Name = 1\n  \"env\" = 2\n}") else {
            panic!("expected object");
        };
        let matched: Vec<bool> = items.keys().map(|key| key_matches(key, "env")).collect();
        assert_eq!(matched, vec![false, true]);
    }
}
