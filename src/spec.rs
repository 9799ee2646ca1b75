//! Reduced OpenAPI document model.
//!
//! Flattens a parsed OpenAPI document into the path/operation/response/content
//! tree the example builder walks. Example values are converted into typed
//! nodes once, when the document is loaded, using the response schema's
//! type and format declarations.

use chrono::{DateTime, FixedOffset, NaiveDate};
use openapiv3::{
    Components, Example, IntegerFormat, NumberFormat, OpenAPI, Operation, ReferenceOr, Response,
    Schema, SchemaKind, StatusCode, StringFormat, Type, VariantOrUnknownOrEmpty,
};
use serde_json::Value;

/// Reference chains longer than this are treated as unresolvable.
const MAX_REF_HOPS: usize = 16;

/// Self-referential schemas bottom out at this nesting depth.
const MAX_SCHEMA_DEPTH: usize = 16;

/// Flattened view of one API's OpenAPI document.
#[derive(Debug, Clone)]
pub struct SpecModel {
    /// API this document describes
    pub api_name: String,
    /// Path templates in declared order
    pub paths: Vec<SpecPath>,
}

/// One path template and its operations.
#[derive(Debug, Clone)]
pub struct SpecPath {
    /// Template as declared, e.g. `/pet/{petId}`
    pub template: String,
    /// Operations declared on this path
    pub operations: Vec<SpecOperation>,
}

/// One operation (method) on a path.
#[derive(Debug, Clone)]
pub struct SpecOperation {
    /// Uppercase HTTP method
    pub method: String,
    /// Responses in declared order, `default` last
    pub responses: Vec<SpecResponse>,
}

/// One response entry of an operation.
#[derive(Debug, Clone)]
pub struct SpecResponse {
    /// Status key as declared: `200`, `4XX` or `default`
    pub status: String,
    /// Content variants in declared order
    pub content: Vec<ContentVariant>,
}

/// One media type of a response, with its example material.
#[derive(Debug, Clone)]
pub struct ContentVariant {
    /// Media type, e.g. `application/json`
    pub media_type: String,
    /// Named examples in declared order
    pub named_examples: Vec<(String, ExampleNode)>,
    /// Unnamed `example` value, if declared
    pub default_example: Option<ExampleNode>,
    /// Example derived from the schema's property examples
    pub schema_example: Option<ExampleNode>,
}

/// A typed example value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExampleNode {
    Object(Vec<(String, ExampleNode)>),
    Array(Vec<ExampleNode>),
    Primitive(PrimitiveExample),
    Absent,
}

/// Literal example leaf, typed at document load.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveExample {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl SpecModel {
    /// Flatten a parsed OpenAPI document.
    pub fn from_document(api_name: &str, document: &OpenAPI) -> Self {
        let mut paths = Vec::new();
        for (template, item) in &document.paths.paths {
            let ReferenceOr::Item(item) = item else {
                continue;
            };
            let method_table = [
                ("GET", &item.get),
                ("PUT", &item.put),
                ("POST", &item.post),
                ("DELETE", &item.delete),
                ("OPTIONS", &item.options),
                ("HEAD", &item.head),
                ("PATCH", &item.patch),
                ("TRACE", &item.trace),
            ];
            let mut operations = Vec::new();
            for (method, operation) in method_table {
                if let Some(operation) = operation {
                    operations.push(build_operation(document, method, operation));
                }
            }
            paths.push(SpecPath {
                template: template.clone(),
                operations,
            });
        }
        SpecModel {
            api_name: api_name.to_string(),
            paths,
        }
    }

    /// Match a concrete request path against the declared templates.
    ///
    /// An exact template (ignoring leading slashes) wins immediately.
    /// Otherwise a template matches when it has the same segment count and
    /// every segment is either equal or a `{placeholder}`. First structural
    /// match in declared order wins.
    pub fn resolve_path(&self, request_path: &str) -> Option<&SpecPath> {
        let request = request_path.trim_start_matches('/');
        if let Some(path) = self
            .paths
            .iter()
            .find(|path| path.template.trim_start_matches('/') == request)
        {
            return Some(path);
        }

        let request_segments = split_segments(request_path);
        self.paths.iter().find(|path| {
            let template_segments = split_segments(&path.template);
            template_segments.len() == request_segments.len()
                && template_segments
                    .iter()
                    .zip(&request_segments)
                    .all(|(template, request)| template == request || template.starts_with('{'))
        })
    }
}

impl SpecPath {
    /// Look up an operation by method, case-insensitively.
    pub fn operation(&self, method: &str) -> Option<&SpecOperation> {
        self.operations
            .iter()
            .find(|operation| operation.method.eq_ignore_ascii_case(method))
    }
}

impl ExampleNode {
    /// Render the tree as a JSON value.
    ///
    /// A top-level `Absent` yields no value at all; an `Absent` nested inside
    /// an object or array renders as JSON `null`.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            ExampleNode::Absent => None,
            node => Some(node.render()),
        }
    }

    fn render(&self) -> Value {
        match self {
            ExampleNode::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, node)| (name.clone(), node.render()))
                    .collect(),
            ),
            ExampleNode::Array(items) => Value::Array(items.iter().map(Self::render).collect()),
            ExampleNode::Primitive(primitive) => primitive.to_json(),
            ExampleNode::Absent => Value::Null,
        }
    }
}

impl PrimitiveExample {
    /// Render the literal in its natural JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            PrimitiveExample::Integer(value) => Value::from(*value),
            PrimitiveExample::Long(value) => Value::from(*value),
            PrimitiveExample::Float(value) => Value::from(*value),
            PrimitiveExample::Double(value) => Value::from(*value),
            PrimitiveExample::String(value) => Value::String(value.clone()),
            PrimitiveExample::Boolean(value) => Value::Bool(*value),
            PrimitiveExample::Bytes(bytes) => {
                use base64::Engine;
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            PrimitiveExample::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            PrimitiveExample::DateTime(instant) => Value::String(instant.to_rfc3339()),
        }
    }
}

fn build_operation(document: &OpenAPI, method: &str, operation: &Operation) -> SpecOperation {
    let mut responses = Vec::new();
    for (status, response) in &operation.responses.responses {
        let status = match status {
            StatusCode::Code(code) => code.to_string(),
            StatusCode::Range(range) => format!("{}XX", range),
        };
        if let Some(response) = resolve_response(document, response) {
            responses.push(SpecResponse {
                status,
                content: build_content(document, response),
            });
        }
    }
    if let Some(default) = &operation.responses.default {
        if let Some(response) = resolve_response(document, default) {
            responses.push(SpecResponse {
                status: "default".to_string(),
                content: build_content(document, response),
            });
        }
    }
    SpecOperation {
        method: method.to_string(),
        responses,
    }
}

fn build_content(document: &OpenAPI, response: &Response) -> Vec<ContentVariant> {
    response
        .content
        .iter()
        .map(|(media_type, media)| {
            let schema = media
                .schema
                .as_ref()
                .and_then(|schema| resolve_schema(document, schema));
            let named_examples = media
                .examples
                .iter()
                .filter_map(|(name, example)| {
                    resolve_example(document, example).map(|example| {
                        let node = example.value.as_ref().map_or(ExampleNode::Absent, |value| {
                            example_from_value(document, value, schema)
                        });
                        (name.clone(), node)
                    })
                })
                .collect();
            let default_example = media
                .example
                .as_ref()
                .map(|value| example_from_value(document, value, schema));
            let schema_example =
                schema.and_then(|schema| example_from_schema(document, schema, 0));
            ContentVariant {
                media_type: media_type.clone(),
                named_examples,
                default_example,
                schema_example,
            }
        })
        .collect()
}

/// Convert a raw example value into a typed node, consulting the schema for
/// integer width and string format declarations where one is available.
fn example_from_value(document: &OpenAPI, value: &Value, schema: Option<&Schema>) -> ExampleNode {
    match value {
        Value::Null => ExampleNode::Absent,
        Value::Bool(flag) => ExampleNode::Primitive(PrimitiveExample::Boolean(*flag)),
        Value::Number(number) => ExampleNode::Primitive(number_example(number, schema)),
        Value::String(text) => ExampleNode::Primitive(string_example(text, schema)),
        Value::Array(items) => {
            let item_schema = schema.and_then(|schema| match &schema.schema_kind {
                SchemaKind::Type(Type::Array(array)) => array
                    .items
                    .as_ref()
                    .and_then(|items| resolve_property(document, items)),
                _ => None,
            });
            ExampleNode::Array(
                items
                    .iter()
                    .map(|item| example_from_value(document, item, item_schema))
                    .collect(),
            )
        }
        Value::Object(fields) => {
            let properties = schema.and_then(|schema| match &schema.schema_kind {
                SchemaKind::Type(Type::Object(object)) => Some(&object.properties),
                _ => None,
            });
            ExampleNode::Object(
                fields
                    .iter()
                    .map(|(name, child)| {
                        let child_schema = properties
                            .and_then(|properties| properties.get(name))
                            .and_then(|child| resolve_property(document, child));
                        (name.clone(), example_from_value(document, child, child_schema))
                    })
                    .collect(),
            )
        }
    }
}

/// Derive an example object from a schema's property tree.
///
/// A property with nested properties recurses; a leaf property contributes
/// its declared example or is omitted. A schema without properties yields
/// nothing.
fn example_from_schema(document: &OpenAPI, schema: &Schema, depth: usize) -> Option<ExampleNode> {
    if depth > MAX_SCHEMA_DEPTH {
        return None;
    }
    let SchemaKind::Type(Type::Object(object)) = &schema.schema_kind else {
        return None;
    };
    if object.properties.is_empty() {
        return None;
    }

    let mut fields = Vec::new();
    for (name, property) in &object.properties {
        let Some(property) = resolve_property(document, property) else {
            continue;
        };
        let node = match example_from_schema(document, property, depth + 1) {
            Some(node) => Some(node),
            None => property
                .schema_data
                .example
                .as_ref()
                .map(|value| example_from_value(document, value, Some(property))),
        };
        if let Some(node) = node {
            if node != ExampleNode::Absent {
                fields.push((name.clone(), node));
            }
        }
    }
    Some(ExampleNode::Object(fields))
}

fn number_example(number: &serde_json::Number, schema: Option<&Schema>) -> PrimitiveExample {
    match schema.map(|schema| &schema.schema_kind) {
        Some(SchemaKind::Type(Type::Integer(integer))) => match number.as_i64() {
            Some(value) => match &integer.format {
                VariantOrUnknownOrEmpty::Item(IntegerFormat::Int64) => PrimitiveExample::Long(value),
                VariantOrUnknownOrEmpty::Item(IntegerFormat::Int32) => {
                    PrimitiveExample::Integer(value as i32)
                }
                _ => narrow_integer(value),
            },
            None => PrimitiveExample::Double(number.as_f64().unwrap_or_default()),
        },
        Some(SchemaKind::Type(Type::Number(real))) => {
            let value = number.as_f64().unwrap_or_default();
            match &real.format {
                VariantOrUnknownOrEmpty::Item(NumberFormat::Float) => {
                    PrimitiveExample::Float(value as f32)
                }
                _ => PrimitiveExample::Double(value),
            }
        }
        _ => match number.as_i64() {
            Some(value) => narrow_integer(value),
            None => PrimitiveExample::Double(number.as_f64().unwrap_or_default()),
        },
    }
}

fn narrow_integer(value: i64) -> PrimitiveExample {
    i32::try_from(value)
        .map(PrimitiveExample::Integer)
        .unwrap_or(PrimitiveExample::Long(value))
}

fn string_example(text: &str, schema: Option<&Schema>) -> PrimitiveExample {
    if let Some(SchemaKind::Type(Type::String(string))) = schema.map(|schema| &schema.schema_kind) {
        if let VariantOrUnknownOrEmpty::Item(format) = &string.format {
            return match format {
                StringFormat::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(PrimitiveExample::Date)
                    .unwrap_or_else(|_| PrimitiveExample::String(text.to_string())),
                StringFormat::DateTime => DateTime::parse_from_rfc3339(text)
                    .map(PrimitiveExample::DateTime)
                    .unwrap_or_else(|_| PrimitiveExample::String(text.to_string())),
                StringFormat::Byte => {
                    use base64::Engine;
                    base64::engine::general_purpose::STANDARD
                        .decode(text)
                        .map(PrimitiveExample::Bytes)
                        .unwrap_or_else(|_| PrimitiveExample::String(text.to_string()))
                }
                StringFormat::Binary => PrimitiveExample::Bytes(text.as_bytes().to_vec()),
                StringFormat::Password => PrimitiveExample::String(text.to_string()),
            };
        }
    }
    PrimitiveExample::String(text.to_string())
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn resolve_schema<'a>(document: &'a OpenAPI, schema: &'a ReferenceOr<Schema>) -> Option<&'a Schema> {
    match schema {
        ReferenceOr::Item(schema) => Some(schema),
        ReferenceOr::Reference { reference } => follow_reference(
            document,
            reference,
            "#/components/schemas/",
            |components, name| components.schemas.get(name),
        ),
    }
}

fn resolve_property<'a>(
    document: &'a OpenAPI,
    schema: &'a ReferenceOr<Box<Schema>>,
) -> Option<&'a Schema> {
    match schema {
        ReferenceOr::Item(schema) => Some(schema.as_ref()),
        ReferenceOr::Reference { reference } => follow_reference(
            document,
            reference,
            "#/components/schemas/",
            |components, name| components.schemas.get(name),
        ),
    }
}

fn resolve_response<'a>(
    document: &'a OpenAPI,
    response: &'a ReferenceOr<Response>,
) -> Option<&'a Response> {
    match response {
        ReferenceOr::Item(response) => Some(response),
        ReferenceOr::Reference { reference } => follow_reference(
            document,
            reference,
            "#/components/responses/",
            |components, name| components.responses.get(name),
        ),
    }
}

fn resolve_example<'a>(
    document: &'a OpenAPI,
    example: &'a ReferenceOr<Example>,
) -> Option<&'a Example> {
    match example {
        ReferenceOr::Item(example) => Some(example),
        ReferenceOr::Reference { reference } => follow_reference(
            document,
            reference,
            "#/components/examples/",
            |components, name| components.examples.get(name),
        ),
    }
}

/// Follow a local `#/components/...` reference, hopping through chained
/// references up to [`MAX_REF_HOPS`]. External references are unsupported.
fn follow_reference<'a, T>(
    document: &'a OpenAPI,
    target: &'a str,
    prefix: &str,
    lookup: impl Fn(&'a Components, &str) -> Option<&'a ReferenceOr<T>>,
) -> Option<&'a T> {
    let mut target = target;
    for _ in 0..MAX_REF_HOPS {
        let name = target.strip_prefix(prefix)?;
        match lookup(document.components.as_ref()?, name)? {
            ReferenceOr::Item(item) => return Some(item),
            ReferenceOr::Reference { reference } => target = reference.as_str(),
        }
    }
    None
}
