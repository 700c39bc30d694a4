//! Strict, lax and skip validation, decoding and shared use of a schema

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use xsdgraph::{
    Document, Error, QName, Schema, SchemaOptions, ValidationErrorKind, ValidationMode,
};

const ORDER_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns="urn:shop" targetNamespace="urn:shop" elementFormDefault="qualified">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="line" maxOccurs="unbounded">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="sku" type="sku"/>
              <xs:element name="qty" type="xs:positiveInteger"/>
              <xs:element name="price" type="xs:decimal"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
      <xs:attribute name="date" type="xs:date" use="required"/>
      <xs:attribute name="priority" type="xs:boolean" default="false"/>
    </xs:complexType>
  </xs:element>
  <xs:simpleType name="sku">
    <xs:restriction base="xs:string"><xs:pattern value="[A-Z]{3}-\d{3}"/></xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

const VALID: &str = r#"<order xmlns="urn:shop" date="2024-05-01">
  <line><sku>ABC-123</sku><qty>2</qty><price>9.99</price></line>
  <line><sku>XYZ-999</sku><qty>1</qty><price>100</price></line>
</order>"#;

const INVALID: &str = r#"<order xmlns="urn:shop" date="May 1st">
  <line><sku>abc</sku><qty>0</qty><price>9.99</price></line>
  <line><sku>XYZ-999</sku><price>100</price></line>
</order>"#;

fn compile(mode: ValidationMode) -> Schema {
    Schema::from_str(ORDER_XSD, SchemaOptions::default().with_mode(mode)).unwrap()
}

fn shop(local: &str) -> QName {
    QName::namespaced("urn:shop", local)
}

#[test]
fn valid_document_in_every_mode() {
    for mode in [ValidationMode::Strict, ValidationMode::Lax, ValidationMode::Skip] {
        let report = compile(mode).validate_str(VALID).unwrap();
        assert!(report.valid, "{} mode", mode);
        assert!(report.errors.is_empty());
    }
}

#[test]
fn strict_mode_reports_only_the_first_error() {
    let report = compile(ValidationMode::Strict).validate_str(INVALID).unwrap();
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ValidationErrorKind::AttributeError);
    assert_eq!(report.errors[0].path.as_deref(), Some("/order"));
}

#[test]
fn lax_mode_collects_errors_in_document_order() {
    let report = compile(ValidationMode::Lax).validate_str(INVALID).unwrap();
    let summary: Vec<_> = report
        .errors
        .iter()
        .map(|e| (e.kind, e.path.clone().unwrap_or_default()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ValidationErrorKind::AttributeError, "/order".to_string()),
            (ValidationErrorKind::FacetViolation, "/order/line/sku".to_string()),
            (ValidationErrorKind::FacetViolation, "/order/line/qty".to_string()),
            (ValidationErrorKind::UnexpectedElement, "/order/line".to_string()),
            (ValidationErrorKind::MissingRequiredContent, "/order/line".to_string()),
        ]
    );
}

#[test]
fn lax_mode_still_decodes() {
    let schema = compile(ValidationMode::Lax);
    let (decoded, errors) = schema.decode_str(INVALID).unwrap();
    assert!(!errors.is_empty());
    let line = shop("line");
    let lines: Vec<_> = decoded.children_named(&line).collect();
    assert_eq!(lines.len(), 2);
    let price = lines[1].child(&shop("price")).unwrap();
    assert_eq!(price.to_lexical().as_deref(), Some("100"));
    assert_eq!(
        decoded
            .attribute(&QName::local("priority"))
            .map(|v| v.to_lexical()),
        Some("false".to_string())
    );
}

#[test]
fn skip_mode_only_checks_well_formedness() {
    let schema = compile(ValidationMode::Skip);
    let report = schema.validate_str(INVALID).unwrap();
    assert!(report.valid);
    let (decoded, errors) = schema.decode_str(INVALID).unwrap();
    assert!(errors.is_empty());
    assert_eq!(decoded.type_name, None);

    assert!(matches!(
        schema.validate_str("<order><unclosed></order>"),
        Err(Error::Xml(_))
    ));
}

#[test]
fn decoded_tree_serializes_to_json() {
    let schema = compile(ValidationMode::Strict);
    let (decoded, _) = schema.decode_str(VALID).unwrap();
    let json = serde_json::to_value(&decoded).unwrap();
    assert_eq!(json["name"], "{urn:shop}order");
    assert_eq!(json["children"].as_array().map(Vec::len), Some(2));
}

#[test]
fn nesting_beyond_max_depth_is_an_error() {
    let schema = Schema::from_str(
        ORDER_XSD,
        SchemaOptions::default().with_mode(ValidationMode::Lax).with_max_depth(2),
    )
    .unwrap();
    let doc = Document::from_string(VALID).unwrap();
    assert!(matches!(schema.validate(&doc), Err(Error::LimitExceeded(_))));
    assert!(!schema.is_valid(&doc));
}

#[test]
fn options_from_json() {
    let options: SchemaOptions =
        serde_json::from_str(r#"{"mode": "lax", "max_depth": 50}"#).unwrap();
    let schema = Schema::from_str(ORDER_XSD, options).unwrap();
    assert_eq!(schema.options().mode, ValidationMode::Lax);
    assert_eq!(schema.iter_errors(&Document::from_string(INVALID).unwrap()).unwrap().len(), 5);
}

#[test]
fn one_schema_serves_many_threads() {
    let schema = Arc::new(compile(ValidationMode::Lax));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let xml = if i % 2 == 0 { VALID } else { INVALID };
                schema.validate_str(xml).unwrap().errors.len()
            })
        })
        .collect();
    let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts, vec![0, 5, 0, 5, 0, 5, 0, 5]);
}
