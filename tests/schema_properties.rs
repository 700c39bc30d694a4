//! End-to-end properties of compiling and validating
//!
//! Each test compiles a small schema from text and checks a behavior that
//! must hold for any conforming compiler/validator pair.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use xsdgraph::validators::SimpleTypeLookup;
use xsdgraph::{
    Document, QName, Schema, SchemaOptions, SchemaSource, ValidationErrorKind, ValidationMode,
};

const XSI: &str = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

fn schema(body: &str) -> Schema {
    let xsd = format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
        body
    );
    Schema::from_str(&xsd, SchemaOptions::default().with_mode(ValidationMode::Lax))
        .expect("schema compiles")
}

fn valid(schema: &Schema, xml: &str) -> bool {
    schema.validate_str(xml).expect("validation runs").valid
}

fn error_kinds(schema: &Schema, xml: &str) -> Vec<ValidationErrorKind> {
    schema
        .validate_str(xml)
        .expect("validation runs")
        .errors
        .iter()
        .map(|e| e.kind)
        .collect()
}

#[test]
fn compiling_twice_gives_equal_graphs() {
    let body = r#"
      <xs:complexType name="base">
        <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
      </xs:complexType>
      <xs:complexType name="derived">
        <xs:complexContent>
          <xs:extension base="base">
            <xs:sequence><xs:element name="b" type="xs:int" maxOccurs="3"/></xs:sequence>
            <xs:attribute name="id" type="xs:ID"/>
          </xs:extension>
        </xs:complexContent>
      </xs:complexType>
      <xs:element name="root" type="derived"/>"#;
    let first = schema(body);
    let second = schema(body);
    assert!(first.table() == second.table());
    assert_eq!(first.type_count(), second.type_count());
}

#[test]
fn decimal_with_fraction_digits_round_trips() {
    let schema = schema(
        r#"<xs:simpleType name="price">
             <xs:restriction base="xs:decimal"><xs:fractionDigits value="2"/></xs:restriction>
           </xs:simpleType>
           <xs:element name="price" type="price"/>"#,
    );
    let (decoded, errors) = schema.decode_str("<price>1.50</price>").unwrap();
    assert!(errors.is_empty());
    let value = decoded.value.expect("decoded value");

    let table = schema.table();
    let price = table
        .simple_type(schema.type_id(&QName::local("price")).unwrap())
        .unwrap();
    let again = price.validate(table, &value.to_lexical(), None).unwrap();
    assert!(again.value_eq(&value));

    assert!(!valid(&schema, "<price>1.505</price>"));
}

#[test]
fn integers_beyond_28_digits() {
    let schema = schema(
        r#"<xs:element name="n" type="xs:integer"/>
           <xs:element name="l" type="xs:long"/>
           <xs:element name="d" type="xs:decimal"/>"#,
    );
    assert!(valid(&schema, "<n>1000000000000000000000000000000</n>"));
    assert!(valid(&schema, "<n>-99999999999999999999999999999999999999</n>"));
    assert!(!valid(&schema, "<n>1000000000000000000000000000000.5</n>"));
    assert_eq!(
        error_kinds(&schema, "<l>1000000000000000000000000000000</l>"),
        vec![ValidationErrorKind::FacetViolation]
    );
    assert!(valid(&schema, "<d>3.14159265358979323846264338327950288</d>"));

    let (decoded, errors) = schema
        .decode_str("<n>1000000000000000000000000000000</n>")
        .unwrap();
    assert!(errors.is_empty());
    assert_eq!(
        decoded.to_lexical().as_deref(),
        Some("1000000000000000000000000000000")
    );
}

#[test]
fn restriction_tightens_inherited_range() {
    let schema = schema(
        r#"<xs:simpleType name="nonNeg">
             <xs:restriction base="xs:integer"><xs:minInclusive value="0"/></xs:restriction>
           </xs:simpleType>
           <xs:simpleType name="atLeastTen">
             <xs:restriction base="nonNeg"><xs:minInclusive value="10"/></xs:restriction>
           </xs:simpleType>
           <xs:element name="n" type="atLeastTen"/>"#,
    );
    assert_eq!(
        error_kinds(&schema, "<n>5</n>"),
        vec![ValidationErrorKind::FacetViolation]
    );
    assert!(valid(&schema, "<n>10</n>"));
}

#[test]
fn sequence_with_optional_and_repeated_particles() {
    let schema = schema(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="a"/>
                 <xs:element name="b" minOccurs="0"/>
                 <xs:element name="c" maxOccurs="unbounded"/>
               </xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    );
    assert!(valid(&schema, "<r><a/><c/></r>"));
    assert!(valid(&schema, "<r><a/><b/><c/><c/></r>"));
    assert!(!valid(&schema, "<r><a/><c/><b/></r>"));
    assert!(!valid(&schema, "<r><b/><c/></r>"));
    assert_eq!(
        error_kinds(&schema, "<r><a/><b/></r>"),
        vec![ValidationErrorKind::MissingRequiredContent]
    );
}

#[test]
fn repeated_choice() {
    let schema = schema(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:choice maxOccurs="2">
                 <xs:element name="a"/>
                 <xs:element name="b"/>
               </xs:choice>
             </xs:complexType>
           </xs:element>"#,
    );
    assert!(valid(&schema, "<r><a/><b/></r>"));
    assert!(valid(&schema, "<r><a/><a/></r>"));
    assert!(!valid(&schema, "<r><a/><b/><c/></r>"));
    assert!(!valid(&schema, "<r><a/><b/><a/></r>"));
}

#[test]
fn large_max_occurs_is_enforced() {
    let schema = schema(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence><xs:element name="i" type="xs:int" maxOccurs="1000"/></xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    );
    let body = |n: usize| format!("<r>{}</r>", "<i>1</i>".repeat(n));
    assert!(valid(&schema, &body(1)));
    assert!(valid(&schema, &body(1000)));
    assert!(!valid(&schema, &body(1001)));
    assert!(!valid(&schema, &body(0)));
}

const KEYS: &str = r#"
  <xs:element name="catalog">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" minOccurs="0" maxOccurs="unbounded">
          <xs:complexType><xs:attribute name="id" type="xs:string"/></xs:complexType>
        </xs:element>
        <xs:element name="ref" minOccurs="0" maxOccurs="unbounded">
          <xs:complexType><xs:attribute name="to" type="xs:string"/></xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
    <xs:key name="itemKey">
      <xs:selector xpath="item"/>
      <xs:field xpath="@id"/>
    </xs:key>
    <xs:keyref name="itemRef" refer="itemKey">
      <xs:selector xpath="ref"/>
      <xs:field xpath="@to"/>
    </xs:keyref>
  </xs:element>"#;

#[test]
fn duplicate_key_is_reported() {
    let schema = schema(KEYS);
    assert!(valid(
        &schema,
        r#"<catalog><item id="1"/><item id="2"/><ref to="2"/></catalog>"#
    ));
    assert_eq!(
        error_kinds(&schema, r#"<catalog><item id="1"/><item id="1"/></catalog>"#),
        vec![ValidationErrorKind::IdentityConstraintViolation]
    );
}

#[test]
fn unmatched_keyref_is_reported() {
    let schema = schema(KEYS);
    let report = schema
        .validate_str(r#"<catalog><item id="1"/><ref to="9"/></catalog>"#)
        .unwrap();
    assert!(!report.valid);
    assert_eq!(
        report
            .errors_of(ValidationErrorKind::IdentityConstraintViolation)
            .count(),
        1
    );
    assert_eq!(report.errors[0].path.as_deref(), Some("/catalog"));
}

const TYPES: &str = r#"
  <xs:complexType name="person">
    <xs:sequence><xs:element name="name" type="xs:string"/></xs:sequence>
  </xs:complexType>
  <xs:complexType name="employee">
    <xs:complexContent>
      <xs:extension base="person">
        <xs:sequence><xs:element name="salary" type="xs:decimal"/></xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:complexType name="invoice">
    <xs:sequence><xs:element name="total" type="xs:decimal"/></xs:sequence>
  </xs:complexType>
  <xs:element name="person" type="person"/>"#;

#[test]
fn xsi_type_accepts_derived_type() {
    let schema = schema(TYPES);
    let xml = format!(
        r#"<person {} xsi:type="employee"><name>Ann</name><salary>10.5</salary></person>"#,
        XSI
    );
    let (decoded, errors) = schema.decode_str(&xml).unwrap();
    assert!(errors.is_empty());
    assert_eq!(decoded.type_name, Some(QName::local("employee")));
    assert_eq!(decoded.children.len(), 2);
}

#[test]
fn xsi_type_rejects_unrelated_type() {
    let schema = schema(TYPES);
    let xml = format!(
        r#"<person {} xsi:type="invoice"><name>Ann</name></person>"#,
        XSI
    );
    assert_eq!(
        error_kinds(&schema, &xml),
        vec![ValidationErrorKind::XsiTypeError]
    );
    let unknown = format!(r#"<person {} xsi:type="nothing"><name>A</name></person>"#, XSI);
    assert_eq!(
        error_kinds(&schema, &unknown),
        vec![ValidationErrorKind::XsiTypeError]
    );
}

#[test]
fn mutual_include_loads_each_location_once() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("a.xsd"),
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:include schemaLocation="b.xsd"/>
             <xs:element name="a" type="bType"/>
             <xs:simpleType name="aType"><xs:restriction base="xs:int"/></xs:simpleType>
           </xs:schema>"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("b.xsd"),
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:include schemaLocation="a.xsd"/>
             <xs:element name="b" type="aType"/>
             <xs:simpleType name="bType"><xs:restriction base="xs:string"/></xs:simpleType>
           </xs:schema>"#,
    )
    .unwrap();

    let schema = Schema::from_file(dir.path().join("a.xsd"), SchemaOptions::default()).unwrap();
    assert_eq!(schema.element_count(), 2);
    let doc = Document::from_string("<b>12</b>").unwrap();
    assert!(schema.is_valid(&doc));
    assert!(!schema.is_valid_str("<b>twelve</b>"));

    let twice = Schema::compile(
        &[
            SchemaSource::location(dir.path().join("a.xsd").to_string_lossy()),
            SchemaSource::location(dir.path().join("b.xsd").to_string_lossy()),
        ],
        SchemaOptions::default(),
    )
    .unwrap();
    assert!(twice.table() == schema.table());
}
