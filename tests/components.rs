//! Schema components seen from instance validation
//!
//! Substitution groups, nil, wildcards, value constraints, attribute groups,
//! list and union types, chameleon includes, redefine and XSD 1.1 features.

use pretty_assertions::assert_eq;
use xsdgraph::{
    MemoryLoader, QName, Schema, SchemaErrorKind, SchemaOptions, SchemaSource,
    ValidationErrorKind, ValidationMode, XsdVersion,
};

const XSI: &str = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

fn wrap(body: &str) -> String {
    format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
        body
    )
}

fn lax(body: &str) -> Schema {
    Schema::from_str(&wrap(body), SchemaOptions::default().with_mode(ValidationMode::Lax)).unwrap()
}

fn kinds(schema: &Schema, xml: &str) -> Vec<ValidationErrorKind> {
    schema
        .validate_str(xml)
        .unwrap()
        .errors
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

const SHAPES: &str = r#"
  <xs:complexType name="shapeType"><xs:attribute name="color" type="xs:string"/></xs:complexType>
  <xs:complexType name="circleType">
    <xs:complexContent>
      <xs:extension base="shapeType"><xs:attribute name="r" type="xs:double"/></xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="shape" type="shapeType" abstract="true"/>
  <xs:element name="circle" type="circleType" substitutionGroup="shape"/>
  <xs:element name="square" type="shapeType" substitutionGroup="shape"/>
  <xs:element name="drawing">
    <xs:complexType>
      <xs:sequence><xs:element ref="shape" maxOccurs="unbounded"/></xs:sequence>
    </xs:complexType>
  </xs:element>"#;

#[test]
fn substitution_group_members_replace_the_head() {
    let schema = lax(SHAPES);
    assert!(schema
        .validate_str(r#"<drawing><circle r="1.5"/><square color="red"/></drawing>"#)
        .unwrap()
        .valid);
    assert_eq!(
        kinds(&schema, r#"<drawing><shape/></drawing>"#),
        vec![
            ValidationErrorKind::UnexpectedElement,
            ValidationErrorKind::MissingRequiredContent,
        ]
    );
    assert_eq!(
        kinds(&schema, r#"<drawing><square r="2"/></drawing>"#),
        vec![ValidationErrorKind::AttributeError]
    );
}

#[test]
fn blocked_substitution_is_not_admitted() {
    let schema = lax(&SHAPES.replace(
        r#"abstract="true"/>"#,
        r#"block="substitution"/>"#,
    ));
    assert!(schema.validate_str("<drawing><shape/></drawing>").unwrap().valid);
    assert!(!schema.validate_str("<drawing><circle/></drawing>").unwrap().valid);
}

#[test]
fn nillable_elements() {
    let schema = lax(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="v" type="xs:int" nillable="true"/>
               </xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    );
    let (decoded, errors) = schema
        .decode_str(&format!(r#"<r {}><v xsi:nil="true"/></r>"#, XSI))
        .unwrap();
    assert!(errors.is_empty());
    assert!(decoded.children[0].nil);
    assert_eq!(decoded.children[0].value, None);

    assert_eq!(
        kinds(&schema, &format!(r#"<r {}><v xsi:nil="true">5</v></r>"#, XSI)),
        vec![ValidationErrorKind::UnexpectedElement]
    );
    assert_eq!(
        kinds(&schema, &format!(r#"<r {}><v xsi:nil="maybe">5</v></r>"#, XSI)),
        vec![ValidationErrorKind::AttributeError]
    );
}

#[test]
fn element_wildcards_follow_process_contents() {
    let body = r#"
      <xs:element name="known" type="xs:int"/>
      <xs:element name="r">
        <xs:complexType>
          <xs:sequence>
            <xs:any processContents="PC" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>"#;

    let strict = lax(&body.replace("PC", "strict"));
    assert!(strict.validate_str("<r><known>1</known></r>").unwrap().valid);
    assert_eq!(
        kinds(&strict, "<r><known>x</known><other/></r>"),
        vec![
            ValidationErrorKind::FacetViolation,
            ValidationErrorKind::UnexpectedElement,
        ]
    );

    let lax_any = lax(&body.replace("PC", "lax"));
    assert_eq!(
        kinds(&lax_any, "<r><known>x</known><other/></r>"),
        vec![ValidationErrorKind::FacetViolation]
    );

    let skip = lax(&body.replace("PC", "skip"));
    assert!(skip.validate_str("<r><known>x</known><other/></r>").unwrap().valid);
}

#[test]
fn named_element_wins_over_overlapping_wildcard() {
    let schema = lax(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:choice>
                 <xs:element name="a" type="xs:int"/>
                 <xs:any processContents="skip"/>
               </xs:choice>
             </xs:complexType>
           </xs:element>"#,
    );
    assert_eq!(
        kinds(&schema, "<r><a>nope</a></r>"),
        vec![ValidationErrorKind::FacetViolation]
    );
    assert!(schema.validate_str("<r><b>anything</b></r>").unwrap().valid);
}

#[test]
fn attribute_wildcards_and_groups() {
    let schema = lax(
        r###"<xs:attributeGroup name="common">
             <xs:attribute name="id" type="xs:ID" use="required"/>
             <xs:anyAttribute namespace="##other" processContents="lax"/>
           </xs:attributeGroup>
           <xs:element name="r">
             <xs:complexType>
               <xs:attributeGroup ref="common"/>
               <xs:attribute name="lang" type="xs:language"/>
             </xs:complexType>
           </xs:element>"###,
    );
    assert!(schema
        .validate_str(r#"<r xmlns:x="urn:x" id="a1" lang="en" x:extra="1"/>"#)
        .unwrap()
        .valid);
    assert_eq!(
        kinds(&schema, r#"<r lang="en" extra="1"/>"#),
        vec![
            ValidationErrorKind::AttributeError,
            ValidationErrorKind::AttributeError,
        ]
    );
}

#[test]
fn defaults_and_fixed_values() {
    let schema = lax(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="unit" type="xs:string" fixed="kg"/>
                 <xs:element name="count" type="xs:int" default="1"/>
               </xs:sequence>
               <xs:attribute name="version" type="xs:decimal" fixed="1.0"/>
             </xs:complexType>
           </xs:element>"#,
    );
    let (decoded, errors) = schema
        .decode_str(r#"<r version="1.00"><unit/><count/></r>"#)
        .unwrap();
    assert!(errors.is_empty());
    assert_eq!(decoded.children[0].to_lexical().as_deref(), Some("kg"));
    assert_eq!(decoded.children[1].to_lexical().as_deref(), Some("1"));

    assert_eq!(
        kinds(&schema, r#"<r version="2"><unit>lb</unit><count/></r>"#),
        vec![
            ValidationErrorKind::AttributeError,
            ValidationErrorKind::FacetViolation,
        ]
    );
}

#[test]
fn list_and_union_types() {
    let schema = lax(
        r#"<xs:simpleType name="ints"><xs:list itemType="xs:int"/></xs:simpleType>
           <xs:simpleType name="shortInts">
             <xs:restriction base="ints"><xs:maxLength value="3"/></xs:restriction>
           </xs:simpleType>
           <xs:simpleType name="size">
             <xs:union memberTypes="xs:int">
               <xs:simpleType>
                 <xs:restriction base="xs:string">
                   <xs:enumeration value="small"/>
                   <xs:enumeration value="large"/>
                 </xs:restriction>
               </xs:simpleType>
             </xs:union>
           </xs:simpleType>
           <xs:element name="l" type="shortInts"/>
           <xs:element name="s" type="size"/>"#,
    );
    assert!(schema.validate_str("<l> 1  2 3 </l>").unwrap().valid);
    assert_eq!(kinds(&schema, "<l>1 2 3 4</l>"), vec![ValidationErrorKind::FacetViolation]);
    assert_eq!(kinds(&schema, "<l>1 two</l>"), vec![ValidationErrorKind::FacetViolation]);
    assert!(schema.validate_str("<s>42</s>").unwrap().valid);
    assert!(schema.validate_str("<s>large</s>").unwrap().valid);
    assert_eq!(kinds(&schema, "<s>medium</s>"), vec![ValidationErrorKind::FacetViolation]);
}

#[test]
fn chameleon_include_takes_the_including_namespace() {
    let loader = MemoryLoader::new().with_resource(
        "lib/common.xsd",
        wrap(r#"<xs:simpleType name="code"><xs:restriction base="xs:token"><xs:length value="2"/></xs:restriction></xs:simpleType>"#),
    );
    let main = SchemaSource::named(
        "lib/main.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
             xmlns:m="urn:main" targetNamespace="urn:main">
             <xs:include schemaLocation="common.xsd"/>
             <xs:element name="country" type="m:code"/>
           </xs:schema>"#,
    );
    let schema = Schema::compile_with_loader(&[main], SchemaOptions::default(), &loader).unwrap();
    assert!(schema
        .lookup_type(&QName::namespaced("urn:main", "code"))
        .is_some());
    assert!(schema.is_valid_str(r#"<country xmlns="urn:main">NL</country>"#));
    assert!(!schema.is_valid_str(r#"<country xmlns="urn:main">NLD</country>"#));
}

#[test]
fn redefine_restricts_the_original_type() {
    let loader = MemoryLoader::new().with_resource(
        "base.xsd",
        wrap(r#"<xs:simpleType name="amount"><xs:restriction base="xs:integer"/></xs:simpleType>
                <xs:element name="amount" type="amount"/>"#),
    );
    let main = SchemaSource::named(
        "main.xsd",
        wrap(r#"<xs:redefine schemaLocation="base.xsd">
                  <xs:simpleType name="amount">
                    <xs:restriction base="amount"><xs:maxInclusive value="100"/></xs:restriction>
                  </xs:simpleType>
                </xs:redefine>"#),
    );
    let schema = Schema::compile_with_loader(&[main], SchemaOptions::default(), &loader).unwrap();
    assert!(schema.is_valid_str("<amount>100</amount>"));
    assert!(!schema.is_valid_str("<amount>101</amount>"));
}

#[test]
fn missing_include_is_a_resource_error() {
    let main = SchemaSource::named(
        "main.xsd",
        wrap(r#"<xs:include schemaLocation="nowhere.xsd"/>"#),
    );
    let err = Schema::compile_with_loader(&[main], SchemaOptions::default(), &MemoryLoader::new())
        .unwrap_err();
    assert_eq!(
        err.as_schema_error().map(|e| e.kind),
        Some(SchemaErrorKind::Resource)
    );
}

#[test]
fn invalid_facet_derivation_fails_the_compile() {
    let xsd = wrap(
        r#"<xs:simpleType name="small">
             <xs:restriction base="xs:int"><xs:maxInclusive value="10"/></xs:restriction>
           </xs:simpleType>
           <xs:simpleType name="wider">
             <xs:restriction base="small"><xs:maxInclusive value="20"/></xs:restriction>
           </xs:simpleType>"#,
    );
    let err = Schema::from_str(&xsd, SchemaOptions::default()).unwrap_err();
    assert_eq!(
        err.as_schema_error().map(|e| e.kind),
        Some(SchemaErrorKind::InvalidFacetDerivation)
    );

    let recovered = Schema::from_str(&xsd, SchemaOptions::default().with_lax_compile(true)).unwrap();
    assert_eq!(recovered.compile_errors().len(), 1);
}

#[test]
fn xsd11_only_features_need_version_11() {
    let body = wrap(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:any notNamespace="urn:private" processContents="skip"/>
               </xs:sequence>
             </xs:complexType>
           </xs:element>
           <xs:element name="when" type="xs:dateTimeStamp"/>"#,
    );
    assert!(Schema::from_str(&body, SchemaOptions::default()).is_err());

    let schema = Schema::from_str(
        &body,
        SchemaOptions::default().with_version(XsdVersion::V11),
    )
    .unwrap();
    assert!(schema.is_valid_str(r#"<r><x:a xmlns:x="urn:public"/></r>"#));
    assert!(!schema.is_valid_str(r#"<r><x:a xmlns:x="urn:private"/></r>"#));
    assert!(schema.is_valid_str("<when>2024-01-01T10:00:00Z</when>"));
    assert!(!schema.is_valid_str("<when>2024-01-01T10:00:00</when>"));
}
