//! Benchmarks for schema compiling and document validation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xsdgraph::{Document, Schema, SchemaOptions, ValidationMode};

const CATALOG_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="catalog">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" maxOccurs="unbounded">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="name" type="xs:string"/>
              <xs:element name="price" type="price"/>
              <xs:element name="tag" type="xs:NMTOKEN" minOccurs="0" maxOccurs="5"/>
            </xs:sequence>
            <xs:attribute name="id" type="xs:ID" use="required"/>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
    <xs:key name="itemKey">
      <xs:selector xpath="item"/>
      <xs:field xpath="@id"/>
    </xs:key>
  </xs:element>
  <xs:simpleType name="price">
    <xs:restriction base="xs:decimal">
      <xs:minInclusive value="0"/>
      <xs:fractionDigits value="2"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

fn catalog(items: usize) -> String {
    let mut xml = String::from("<catalog>");
    for i in 0..items {
        xml.push_str(&format!(
            r#"<item id="i{}"><name>Item {}</name><price>{}.50</price><tag>t{}</tag></item>"#,
            i,
            i,
            i % 100,
            i % 7
        ));
    }
    xml.push_str("</catalog>");
    xml
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_catalog_schema", |b| {
        b.iter(|| Schema::from_str(black_box(CATALOG_XSD), SchemaOptions::default()))
    });
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_catalog");
    for size in [10, 100, 1000] {
        let doc = Document::from_string(&catalog(size)).unwrap();
        for mode in [ValidationMode::Strict, ValidationMode::Lax] {
            let schema =
                Schema::from_str(CATALOG_XSD, SchemaOptions::default().with_mode(mode)).unwrap();
            group.bench_with_input(BenchmarkId::new(mode.as_str(), size), &doc, |b, doc| {
                b.iter(|| schema.validate(black_box(doc)))
            });
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let schema = Schema::from_str(CATALOG_XSD, SchemaOptions::default()).unwrap();
    let doc = Document::from_string(&catalog(100)).unwrap();
    c.bench_function("decode_catalog_100", |b| b.iter(|| schema.decode(black_box(&doc))));
}

criterion_group!(benches, bench_compile, bench_validate, bench_decode);
criterion_main!(benches);
