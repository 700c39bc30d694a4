//! Document validation
//!
//! One traversal of an instance tree against a frozen component table. For
//! each element the validator resolves the governing type (declared, or an
//! `xsi:type` override that must be a valid, unblocked derivation), handles
//! `xsi:nil`, validates attributes, feeds the children through the content
//! model automaton and recurses into each child with the declaration the
//! automaton attributed it to. Identity constraint scopes open and close in
//! lockstep with the elements that declare them.
//!
//! A decoded value tree is built alongside; in lax mode it is best-effort,
//! with undecodable parts kept as untyped strings.

use indexmap::IndexMap;

use crate::documents::{Document, Element};
use crate::error::{Error, Result, ValidationError, ValidationErrorKind};
use crate::namespaces::{QName, XSI_NAMESPACE};
use crate::xpath::SelectorEvaluator;

use super::attributes::ValueConstraint;
use super::base::{ElementId, TypeId, ValidationMode};
use super::complex_types::{ComplexTypeDef, ContentType};
use super::decoded::{untyped_value, DecodedElement};
use super::elements::ElementDecl;
use super::globals::{ComponentTable, TypeDef};
use super::identities::IdentityEngine;
use super::models::{Attribution, ContentModel, Leaf};
use super::simple_types::SimpleTypeLookup;
use super::validation::ValidationContext;
use super::values::SimpleValue;
use super::wildcards::ProcessContents;

/// Validate a document, returning its decoded tree and the collected errors
///
/// In strict mode the first validation error is returned as
/// `Err(Error::Validation)`. In skip mode the tree is decoded untyped.
pub(crate) fn validate_document<'s>(
    table: &'s ComponentTable,
    evaluator: &'s dyn SelectorEvaluator,
    doc: &Document,
    mode: ValidationMode,
    max_depth: usize,
) -> Result<(DecodedElement, Vec<ValidationError>)> {
    let root = doc
        .root()
        .ok_or_else(|| Error::Xml("Document has no root element".to_string()))?;
    if mode == ValidationMode::Skip {
        return Ok((DecodedElement::untyped(root), Vec::new()));
    }

    let mut validator = DocumentValidator {
        table,
        context: ValidationContext::new(mode, max_depth),
        identities: IdentityEngine::new(table, evaluator),
    };
    let decoded = match table.lookup_element(&root.qname) {
        Some(id) => validator.element(root, id)?,
        None => {
            validator.context.validation_error(
                ValidationErrorKind::UnexpectedElement,
                format!("Unknown root element {}", root.qname),
                Some(format!("no global element declaration for {}", root.qname)),
            )?;
            DecodedElement::untyped(root)
        }
    };
    Ok((decoded, validator.context.errors))
}

fn fixed_of(constraint: Option<&ValueConstraint>) -> Option<&ValueConstraint> {
    constraint.filter(|c| c.is_fixed())
}

struct DocumentValidator<'s> {
    table: &'s ComponentTable,
    context: ValidationContext,
    identities: IdentityEngine<'s>,
}

impl<'s> DocumentValidator<'s> {
    fn error(&mut self, kind: ValidationErrorKind, message: String) -> Result<()> {
        self.context.validation_error(kind, message, None)
    }

    fn element(&mut self, elem: &Element, id: ElementId) -> Result<DecodedElement> {
        self.context.enter(&elem.qname)?;
        let decoded = self.element_body(elem, self.table.element(id));
        self.context.exit();
        decoded
    }

    fn element_body(&mut self, elem: &Element, decl: &'s ElementDecl) -> Result<DecodedElement> {
        let table = self.table;
        if decl.is_abstract {
            self.error(
                ValidationErrorKind::UnexpectedElement,
                format!("Element {} is abstract and cannot appear in an instance", decl.name),
            )?;
        }

        let type_id = self.effective_type(elem, decl)?;
        let mut decoded = DecodedElement::new(elem.qname.clone());
        decoded.type_name = table.type_def(type_id).name().cloned();
        self.identities.enter(elem, decl);
        decoded.nil = self.check_nil(elem, decl)?;

        match table.type_def(type_id) {
            TypeDef::Simple(_) => {
                self.simple_type_attributes(elem)?;
                if !decoded.nil {
                    decoded.value = self.simple_content(elem, decl, type_id)?;
                }
            }
            TypeDef::Complex(ct) => {
                if ct.is_abstract {
                    self.error(
                        ValidationErrorKind::XsiTypeError,
                        format!(
                            "Type {} of element {} is abstract; an xsi:type is required",
                            ct.display_name(),
                            elem.qname
                        ),
                    )?;
                }
                decoded.attributes = self.attributes(elem, ct)?;
                if !decoded.nil {
                    self.complex_content(elem, decl, ct, &mut decoded)?;
                }
            }
        }

        let path = self.context.current_path();
        for error in self.identities.leave(elem, decl, &path) {
            self.context.raise_or_collect(error)?;
        }
        Ok(decoded)
    }

    /// Declared type, or the `xsi:type` override when it is acceptable
    fn effective_type(&mut self, elem: &Element, decl: &ElementDecl) -> Result<TypeId> {
        let table = self.table;
        let declared = decl.type_id;
        let lexical = match elem.get_attribute_qname(&QName::xsi("type")) {
            Some(value) => value,
            None => return Ok(declared),
        };
        let name = match elem.namespaces.resolve(lexical) {
            Ok(name) => name,
            Err(e) => {
                self.error(
                    ValidationErrorKind::XsiTypeError,
                    format!("Invalid xsi:type '{}': {}", lexical, e),
                )?;
                return Ok(declared);
            }
        };
        let id = match table.lookup_type(&name) {
            Some(id) => id,
            None => {
                self.error(
                    ValidationErrorKind::XsiTypeError,
                    format!("xsi:type {} names no known type", name),
                )?;
                return Ok(declared);
            }
        };
        if !table.is_derived_from(id, declared) {
            self.error(
                ValidationErrorKind::XsiTypeError,
                format!(
                    "xsi:type {} is not derived from {}, the type of element {}",
                    name,
                    table.type_def(declared).display_name(),
                    decl.name
                ),
            )?;
            return Ok(declared);
        }
        let blocked = decl.block.union_with(table.type_def(declared).block_set());
        let path = table.derivation_path(id, declared).unwrap_or_default();
        if let Some(method) = path.iter().find(|m| blocked.contains(**m)) {
            self.error(
                ValidationErrorKind::XsiTypeError,
                format!(
                    "xsi:type {} is blocked: derivation by {} is not allowed for element {}",
                    name, method, decl.name
                ),
            )?;
            return Ok(declared);
        }
        Ok(id)
    }

    /// Whether the element is validly nilled
    fn check_nil(&mut self, elem: &Element, decl: &ElementDecl) -> Result<bool> {
        let value = match elem.get_attribute_qname(&QName::xsi("nil")) {
            Some(value) => value.trim(),
            None => return Ok(false),
        };
        let nil = match value {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                self.error(
                    ValidationErrorKind::AttributeError,
                    format!("'{}' is not a valid xsi:nil value", other),
                )?;
                return Ok(false);
            }
        };
        if !nil {
            return Ok(false);
        }
        if !decl.nillable {
            self.error(
                ValidationErrorKind::AttributeError,
                format!("Element {} is not nillable", decl.name),
            )?;
            return Ok(false);
        }
        if !elem.children.is_empty() || elem.has_significant_text() {
            self.error(
                ValidationErrorKind::UnexpectedElement,
                format!("Nilled element {} must be empty", elem.qname),
            )?;
        }
        if fixed_of(decl.value_constraint.as_ref()).is_some() {
            self.error(
                ValidationErrorKind::FacetViolation,
                format!("Element {} has a fixed value and cannot be nilled", decl.name),
            )?;
        }
        Ok(true)
    }

    fn simple_value(
        &self,
        type_id: TypeId,
        lexical: &str,
        elem: &Element,
    ) -> std::result::Result<SimpleValue, ValidationError> {
        match self.table.simple_type(type_id) {
            Some(st) => st.validate(self.table, lexical, Some(&elem.namespaces)),
            None => Err(ValidationError::facet(format!(
                "{} is not a simple type",
                self.table.type_def(type_id).display_name()
            ))),
        }
    }

    // Attributes

    fn simple_type_attributes(&mut self, elem: &Element) -> Result<()> {
        for name in elem.attributes.keys() {
            if name.namespace() != Some(XSI_NAMESPACE) {
                self.error(
                    ValidationErrorKind::AttributeError,
                    format!(
                        "Attribute {} is not allowed: element {} has a simple type",
                        name, elem.qname
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn attributes(
        &mut self,
        elem: &Element,
        ct: &'s ComplexTypeDef,
    ) -> Result<IndexMap<QName, SimpleValue>> {
        let table = self.table;
        let mut values = IndexMap::new();

        for (name, lexical) in &elem.attributes {
            if name.namespace() == Some(XSI_NAMESPACE) {
                continue;
            }
            if let Some(attribute_use) = ct.attributes.get(name) {
                let decl = table.attribute(attribute_use.attribute);
                let constraint = attribute_use
                    .value_constraint
                    .as_ref()
                    .or(decl.value_constraint.as_ref());
                if let Some(value) =
                    self.attribute_value(elem, name, lexical, decl.type_id, constraint)?
                {
                    values.insert(name.clone(), value);
                }
                continue;
            }

            let wildcard = match &ct.attribute_wildcard {
                Some(w) if w.matches(name) => w,
                _ => {
                    self.error(
                        ValidationErrorKind::AttributeError,
                        format!("Attribute {} is not allowed on element {}", name, elem.qname),
                    )?;
                    continue;
                }
            };
            let value = match (wildcard.process_contents, table.lookup_attribute(name)) {
                (ProcessContents::Skip, _) | (ProcessContents::Lax, None) => {
                    Some(untyped_value(lexical))
                }
                (_, Some(id)) => {
                    let decl = table.attribute(id);
                    self.attribute_value(
                        elem,
                        name,
                        lexical,
                        decl.type_id,
                        decl.value_constraint.as_ref(),
                    )?
                }
                (ProcessContents::Strict, None) => {
                    self.error(
                        ValidationErrorKind::AttributeError,
                        format!(
                            "Attribute {} matches a strict wildcard but has no global declaration",
                            name
                        ),
                    )?;
                    None
                }
            };
            if let Some(value) = value {
                values.insert(name.clone(), value);
            }
        }

        for (name, attribute_use) in &ct.attributes {
            if elem.attributes.contains_key(name) {
                continue;
            }
            if attribute_use.is_required() {
                self.error(
                    ValidationErrorKind::AttributeError,
                    format!("Missing required attribute {} on element {}", name, elem.qname),
                )?;
                continue;
            }
            let decl = table.attribute(attribute_use.attribute);
            let constraint = attribute_use
                .value_constraint
                .as_ref()
                .or(decl.value_constraint.as_ref());
            if let Some(constraint) = constraint {
                let value = match &constraint.value {
                    Some(value) => value.clone(),
                    None => self
                        .simple_value(decl.type_id, &constraint.lexical, elem)
                        .unwrap_or_else(|_| untyped_value(&constraint.lexical)),
                };
                values.insert(name.clone(), value);
            }
        }
        Ok(values)
    }

    fn attribute_value(
        &mut self,
        elem: &Element,
        name: &QName,
        lexical: &str,
        type_id: TypeId,
        constraint: Option<&ValueConstraint>,
    ) -> Result<Option<SimpleValue>> {
        match self.simple_value(type_id, lexical, elem) {
            Ok(value) => {
                if let Some(fixed) = fixed_of(constraint) {
                    if !fixed.admits(&value) {
                        self.error(
                            ValidationErrorKind::AttributeError,
                            format!(
                                "Attribute {} must have the fixed value '{}', found '{}'",
                                name, fixed.lexical, lexical
                            ),
                        )?;
                    }
                }
                self.identities.values.record_attribute(elem, name, &value);
                Ok(Some(value))
            }
            Err(mut error) => {
                error.kind = ValidationErrorKind::AttributeError;
                error.message = format!("Invalid value for attribute {}: {}", name, error.message);
                self.context.raise_or_collect(error)?;
                Ok(Some(untyped_value(lexical)))
            }
        }
    }

    // Content

    fn simple_content(
        &mut self,
        elem: &Element,
        decl: &ElementDecl,
        type_id: TypeId,
    ) -> Result<Option<SimpleValue>> {
        if let Some(child) = elem.children.first() {
            self.error(
                ValidationErrorKind::UnexpectedElement,
                format!(
                    "Element {} has simple content but contains child element {}",
                    elem.qname, child.qname
                ),
            )?;
        }
        let text = elem.text_content();
        let (lexical, defaulted) = match &decl.value_constraint {
            Some(constraint) if text.is_empty() => (constraint.lexical.as_str(), true),
            _ => (text, false),
        };
        match self.simple_value(type_id, lexical, elem) {
            Ok(value) => {
                if let Some(fixed) = fixed_of(decl.value_constraint.as_ref()) {
                    if !defaulted && !fixed.admits(&value) {
                        self.error(
                            ValidationErrorKind::FacetViolation,
                            format!(
                                "Element {} must have the fixed value '{}', found '{}'",
                                decl.name, fixed.lexical, text
                            ),
                        )?;
                    }
                }
                self.identities.values.record_element(elem, &value);
                Ok(Some(value))
            }
            Err(error) => {
                self.context.raise_or_collect(error)?;
                Ok(Some(untyped_value(text)))
            }
        }
    }

    fn complex_content(
        &mut self,
        elem: &Element,
        decl: &ElementDecl,
        ct: &'s ComplexTypeDef,
        decoded: &mut DecodedElement,
    ) -> Result<()> {
        match &ct.content {
            ContentType::Simple(st) => {
                decoded.value = self.simple_content(elem, decl, *st)?;
            }
            ContentType::Empty => {
                if let Some(child) = elem.children.first() {
                    self.error(
                        ValidationErrorKind::UnexpectedElement,
                        format!(
                            "Element {} must be empty but contains child element {}",
                            elem.qname, child.qname
                        ),
                    )?;
                } else if elem.has_significant_text() {
                    self.error(
                        ValidationErrorKind::UnexpectedElement,
                        format!("Element {} must be empty but contains text", elem.qname),
                    )?;
                }
                decoded.children = elem.children.iter().map(DecodedElement::untyped).collect();
            }
            ContentType::ElementOnly(_) => {
                if elem.has_significant_text() {
                    self.error(
                        ValidationErrorKind::UnexpectedElement,
                        format!(
                            "Element {} has element-only content but contains text '{}'",
                            elem.qname,
                            elem.text_content().trim()
                        ),
                    )?;
                }
                decoded.children = self.children(elem, ct)?;
            }
            ContentType::Mixed(_) => {
                let text = elem.text_content();
                if elem.children.is_empty() && text.is_empty() {
                    decoded.value = decl
                        .value_constraint
                        .as_ref()
                        .map(|c| untyped_value(&c.lexical));
                } else {
                    if let Some(fixed) = fixed_of(decl.value_constraint.as_ref()) {
                        if !elem.children.is_empty() || text != fixed.lexical {
                            self.error(
                                ValidationErrorKind::FacetViolation,
                                format!(
                                    "Element {} must have the fixed value '{}'",
                                    decl.name, fixed.lexical
                                ),
                            )?;
                        }
                    }
                    if elem.has_significant_text() {
                        decoded.value = Some(untyped_value(text));
                    }
                }
                decoded.children = self.children(elem, ct)?;
            }
        }
        Ok(())
    }

    fn children(&mut self, elem: &Element, ct: &'s ComplexTypeDef) -> Result<Vec<DecodedElement>> {
        let model = match &ct.model {
            Some(model) => model,
            None => return Ok(elem.children.iter().map(DecodedElement::untyped).collect()),
        };
        let mut run = model.start();
        let mut decoded = Vec::with_capacity(elem.children.len());
        for child in &elem.children {
            match run.step(&child.qname) {
                Ok(attribution) => decoded.push(self.attributed(child, model, attribution)?),
                Err(expected) => {
                    self.context.raise_or_collect(
                        ValidationError::new(
                            ValidationErrorKind::UnexpectedElement,
                            format!("Unexpected child element {} in {}", child.qname, elem.qname),
                        )
                        .with_expected(expected),
                    )?;
                    decoded.push(DecodedElement::untyped(child));
                }
            }
        }
        if let Err(missing) = run.finish() {
            self.context.raise_or_collect(
                ValidationError::new(
                    ValidationErrorKind::MissingRequiredContent,
                    format!("The content of element {} is not complete", elem.qname),
                )
                .with_expected(missing),
            )?;
        }
        Ok(decoded)
    }

    /// Validate a child against the particle it was attributed to
    fn attributed(
        &mut self,
        child: &Element,
        model: &ContentModel,
        attribution: Attribution,
    ) -> Result<DecodedElement> {
        if let Some(id) = attribution.element {
            return self.element(child, id);
        }
        let process = model
            .leaf(attribution.leaf)
            .and_then(Leaf::wildcard)
            .map_or(ProcessContents::Lax, |w| w.process_contents);
        if process == ProcessContents::Skip {
            return Ok(DecodedElement::untyped(child));
        }
        match self.table.lookup_element(&child.qname) {
            Some(id) => self.element(child, id),
            None => {
                if process == ProcessContents::Strict {
                    self.context.enter(&child.qname)?;
                    let reported = self.error(
                        ValidationErrorKind::UnexpectedElement,
                        format!(
                            "Element {} matches a strict wildcard but has no global declaration",
                            child.qname
                        ),
                    );
                    self.context.exit();
                    reported?;
                }
                Ok(DecodedElement::untyped(child))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::schemas::{Schema, SchemaOptions};
    use crate::xpath::DefaultEvaluator;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="order">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="qty" type="xs:positiveInteger"/>
            <xs:element name="note" type="xs:string" minOccurs="0" nillable="true"/>
            <xs:element name="status" type="xs:string" default="open" minOccurs="0"/>
          </xs:sequence>
          <xs:attribute name="id" type="xs:ID" use="required"/>
          <xs:attribute name="currency" type="xs:string" fixed="EUR"/>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    fn run(xml: &str, mode: ValidationMode) -> Result<(DecodedElement, Vec<ValidationError>)> {
        let schema = Schema::from_str(SCHEMA, SchemaOptions::default()).unwrap();
        let doc = Document::from_string(xml).unwrap();
        validate_document(schema.table(), &DefaultEvaluator, &doc, mode, 100)
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_document_decodes() {
        let (decoded, errors) = run(
            r#"<order id="o1"><qty>3</qty><status/></order>"#,
            ValidationMode::Strict,
        )
        .unwrap();
        assert!(errors.is_empty());
        assert_eq!(
            decoded.attribute(&QName::local("currency")).map(|v| v.to_lexical()),
            Some("EUR".to_string())
        );
        let status = decoded.child(&QName::local("status")).unwrap();
        assert_eq!(status.to_lexical(), Some("open".to_string()));
        let qty = decoded.child(&QName::local("qty")).unwrap();
        assert_eq!(qty.type_name, Some(QName::xsd("positiveInteger")));
    }

    #[test]
    fn test_strict_stops_at_first_error() {
        let result = run(r#"<order><qty>0</qty></order>"#, ValidationMode::Strict);
        match result {
            Err(Error::Validation(e)) => assert_eq!(e.kind, ValidationErrorKind::AttributeError),
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_lax_collects_in_document_order() {
        let (decoded, errors) = run(
            r#"<order currency="USD"><qty>0</qty><bogus/></order>"#,
            ValidationMode::Lax,
        )
        .unwrap();
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationErrorKind::AttributeError,
                ValidationErrorKind::AttributeError,
                ValidationErrorKind::FacetViolation,
                ValidationErrorKind::UnexpectedElement,
            ]
        );
        assert_eq!(errors[2].path.as_deref(), Some("/order/qty"));
        assert_eq!(decoded.children.len(), 2);
    }

    #[test]
    fn test_missing_content() {
        let (_, errors) = run(r#"<order id="a"/>"#, ValidationMode::Lax).unwrap();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::MissingRequiredContent]);
        assert_eq!(errors[0].expected, vec!["qty".to_string()]);
    }

    #[test]
    fn test_nil() {
        let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;
        let (decoded, errors) = run(
            &format!(r#"<order {} id="a"><qty>1</qty><note xsi:nil="true"/></order>"#, xsi),
            ValidationMode::Lax,
        )
        .unwrap();
        assert!(errors.is_empty());
        assert!(decoded.child(&QName::local("note")).unwrap().nil);

        let (_, errors) = run(
            &format!(r#"<order {} id="a"><qty xsi:nil="true"/></order>"#, xsi),
            ValidationMode::Lax,
        )
        .unwrap();
        assert_eq!(errors[0].kind, ValidationErrorKind::AttributeError);
    }

    #[test]
    fn test_skip_mode_decodes_untyped() {
        let (decoded, errors) = run(r#"<anything><x>1</x></anything>"#, ValidationMode::Skip).unwrap();
        assert!(errors.is_empty());
        assert_eq!(decoded.children.len(), 1);
    }

    #[test]
    fn test_unknown_root() {
        let (_, errors) = run(r#"<invoice/>"#, ValidationMode::Lax).unwrap();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::UnexpectedElement]);
    }

    #[test]
    fn test_depth_limit() {
        let schema = Schema::from_str(SCHEMA, SchemaOptions::default()).unwrap();
        let doc = Document::from_string(r#"<order id="a"><qty>1</qty></order>"#).unwrap();
        let result = validate_document(schema.table(), &DefaultEvaluator, &doc, ValidationMode::Lax, 1);
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }
}
