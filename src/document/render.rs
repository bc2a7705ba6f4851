//! Writing a [`Body`] back out through [`hcl::format`].
//!
//! Attributes come first, in declaration order (file name, then line),
//! followed by the nested blocks in list order. Labels are always quoted.

use super::errors::RenderError;
use super::expr::identifier;
use super::tree::{Attribute, Body};
use hcl::{BlockLabel, Expression};

/// The [`hcl::Body`] equivalent of `body`, without source positions.
pub fn to_hcl_body(body: &Body) -> Result<hcl::Body, RenderError> {
    let mut attributes: Vec<&Attribute> = body.attributes.values().collect();
    attributes.sort_by(|a, b| a.pos.cmp(&b.pos));
    let attributes = attributes
        .into_iter()
        .map(|attr| Ok(hcl::Attribute::new(ident(&attr.name)?, attr.expr.clone())))
        .collect::<Result<Vec<_>, RenderError>>()?;
    let blocks = body
        .blocks
        .iter()
        .map(|block| to_hcl_block(&block.ident, &block.labels, &block.body))
        .collect::<Result<Vec<_>, RenderError>>()?;
    Ok(hcl::Body::builder()
        .add_attributes(attributes)
        .add_blocks(blocks)
        .build())
}

pub fn to_hcl_block(ident: &str, labels: &[String], body: &Body) -> Result<hcl::Block, RenderError> {
    Ok(hcl::Block {
        identifier: self::ident(ident)?,
        labels: labels.iter().cloned().map(BlockLabel::String).collect(),
        body: to_hcl_body(body)?,
    })
}

pub fn render_body(body: &Body) -> Result<String, RenderError> {
    Ok(hcl::format::to_string(&to_hcl_body(body)?)?)
}

pub fn render_expression(expr: &Expression) -> Result<String, RenderError> {
    Ok(hcl::format::to_string(expr)?)
}

fn ident(name: &str) -> Result<hcl::Identifier, RenderError> {
    identifier(name).ok_or_else(|| RenderError::InvalidIdentifier(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{parse_body, Block, SourcePos};

    #[test]
    fn attributes_follow_declaration_order() {
        let mut body = parse_body("b = 2\na = 1\n", "main.tf").unwrap();
        let late = parse_body("c = 3\n", "tap.hcl").unwrap().attributes["c"].clone();
        body.attributes.shift_insert(0, "c".to_string(), late);

        let rendered = hcl::parse(&render_body(&body).unwrap()).unwrap();
        let keys: Vec<String> = rendered
            .attributes()
            .map(|attr| attr.key.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn reparses_to_the_same_tree() {
        let src = r#"name = "web"
tags = {
  Name                 = "web"
  "kubernetes.io/role" = "node"
}
ports = [80, 443]

dynamic "ingress" {
  for_each = var.rules
  content {
    from_port = ingress.value
    cidr      = "${var.prefix}/16"
  }
}
"#;
        let body = parse_body(src, "main.tf").unwrap();
        let rendered = render_body(&body).unwrap();
        assert_eq!(hcl::parse(&rendered).unwrap(), hcl::parse(src).unwrap());
    }

    #[test]
    fn rejects_names_that_are_not_identifiers() {
        let mut body = Body::new();
        body.blocks.push(Block::new(
            "kubernetes.io/name",
            vec![],
            Body::new(),
            SourcePos::new("tap.hcl", 1),
        ));
        assert!(matches!(
            render_body(&body),
            Err(RenderError::InvalidIdentifier(name)) if name == "kubernetes.io/name"
        ));
    }

    #[test]
    fn renders_single_expressions() {
        let body = parse_body("value = [1, \"two\"]\n", "tap.hcl").unwrap();
        let text = render_expression(&body.attributes["value"].expr).unwrap();
        assert!(text.contains("\"two\""), "{text}");
    }
}
