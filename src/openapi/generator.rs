//! OpenAPI document generation from registered gates.

use crate::case::{base_name, pluralize, short_hash, strip_non_alphanumeric, title_case};
use crate::config::{AuthSettings, GateRegistry, GateSettings};
use crate::error::AppError;
use crate::gate::{ActionKind, CompiledAction, CompiledGate, GateDefinition};
use crate::query::FilterOperator;
use crate::service::RuleMap;
use axum::http::Method;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{ArrayBuilder, KnownFormat, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme};
use utoipa::openapi::server::ServerBuilder;
use utoipa::openapi::tag::TagBuilder;
use utoipa::openapi::{
    ComponentsBuilder, ContentBuilder, InfoBuilder, OpenApiBuilder, PathsBuilder, Ref, Required, Response,
    ResponseBuilder,
};

const JSON: &str = "application/json";

/// Names one gate in the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentNames {
    pub component: String,
    pub slug: String,
    pub tag: String,
}

impl DocumentNames {
    /// Component names fall back to a hash when stripping leaves nothing or collides with `taken`.
    /// The slug is whatever key routes back to this gate in `gates`.
    pub fn for_gate(gates: &GateRegistry, gate: &GateDefinition, taken: &HashSet<String>) -> Self {
        let entity = gate.entity();
        let mut component = strip_non_alphanumeric(base_name(entity));
        if component.is_empty() || taken.contains(&component) {
            component = format!("Model{}", short_hash(entity));
        }
        let slug = gates.slug(gate);
        let tag = title_case(&pluralize(gate.alias().unwrap_or_else(|| base_name(entity))));
        Self { component, slug, tag }
    }
}

fn pascal(s: &str) -> String {
    title_case(s).replace(' ', "")
}

fn to_http_method(method: &Method) -> Option<HttpMethod> {
    Some(match *method {
        Method::GET => HttpMethod::Get,
        Method::POST => HttpMethod::Post,
        Method::PUT => HttpMethod::Put,
        Method::PATCH => HttpMethod::Patch,
        Method::DELETE => HttpMethod::Delete,
        Method::OPTIONS => HttpMethod::Options,
        Method::HEAD => HttpMethod::Head,
        _ => return None,
    })
}

fn rule_names(rules: &[String]) -> Vec<&str> {
    rules.iter().map(|r| r.split(':').next().unwrap_or_default()).collect()
}

/// JSON schema for one field from its rule tokens.
pub fn field_schema(rules: &[String]) -> Schema {
    let names = rule_names(rules);
    let has = |n: &str| names.contains(&n);
    if has("array") {
        let array = ArrayBuilder::new().items(ObjectBuilder::new().schema_type(Type::String));
        return Schema::Array(array.build());
    }
    let ty = if has("boolean") || has("bool") {
        Type::Boolean
    } else if has("integer") || has("int") {
        Type::Integer
    } else if has("numeric") || has("decimal") {
        Type::Number
    } else {
        Type::String
    };
    let schema_type = if has("nullable") {
        SchemaType::Array(vec![ty, Type::Null])
    } else {
        SchemaType::Type(ty)
    };
    let format = if has("date") {
        Some(SchemaFormat::KnownFormat(KnownFormat::Date))
    } else if has("datetime") || has("date_format") {
        Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))
    } else if has("email") {
        Some(SchemaFormat::Custom("email".into()))
    } else if has("uuid") {
        Some(SchemaFormat::Custom("uuid".into()))
    } else if has("url") {
        Some(SchemaFormat::Custom("uri".into()))
    } else {
        None
    };
    let mut object = ObjectBuilder::new().schema_type(schema_type).format(format);
    if let Some(choices) = rules.iter().find_map(|r| r.strip_prefix("in:")) {
        object = object.enum_values(Some(choices.split(',').map(|c| c.trim().to_string())));
    }
    Schema::Object(object.build())
}

/// Object schema for a rule map; `required` follows the `required` token.
pub fn rules_schema(rules: &RuleMap) -> Schema {
    let mut object = ObjectBuilder::new().schema_type(Type::Object);
    for (field, tokens) in rules.iter() {
        object = object.property(field, field_schema(tokens));
        if tokens.iter().any(|t| t == "required") {
            object = object.required(field);
        }
    }
    Schema::Object(object.build())
}

fn entity_schema(gate: &CompiledGate) -> Schema {
    let mut object = ObjectBuilder::new()
        .schema_type(Type::Object)
        .property(&gate.source.primary_key, ObjectBuilder::new());
    for column in &gate.select {
        object = object.property(column, ObjectBuilder::new());
    }
    for (field, tokens) in gate.filters.iter() {
        object = object.property(field, field_schema(tokens));
    }
    Schema::Object(object.build())
}

fn query_param(name: &str, description: &str, ty: Type) -> ParameterBuilder {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(ObjectBuilder::new().schema_type(ty)))
}

fn described(description: &str) -> Response {
    ResponseBuilder::new().description(description).build()
}

fn id_param() -> ParameterBuilder {
    ParameterBuilder::new()
        .name("id")
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
}

/// Discovery metadata attached to every operation of a gate.
pub fn gate_metadata(definition: &GateDefinition, gate: &CompiledGate) -> Value {
    let mut filters = Map::new();
    for field in gate.filter_fields() {
        let operators: Vec<&str> = match gate.operators.get(field) {
            Some(ops) => ops.iter().map(|o| o.as_str()).collect(),
            None => FilterOperator::ALL.iter().map(|o| o.as_str()).collect(),
        };
        filters.insert(
            field.to_string(),
            json!({
                "rules": gate.filters.get(field).unwrap_or_default(),
                "operators": operators,
                "raw": gate.raw_filters.contains_key(field),
            }),
        );
    }
    json!({
        "entity": gate.entity,
        "filters": filters,
        "sorts": gate.sorts,
        "select": gate.select,
        "pagination": gate.pagination.as_str(),
        "versions": definition.versions(),
        "default_version": definition.default_version(),
    })
}

fn security_scheme(auth: &AuthSettings) -> Option<(String, Option<SecurityScheme>)> {
    match auth.kind.as_str() {
        "http" => {
            let scheme = auth.scheme.as_deref().unwrap_or("bearer").to_ascii_lowercase();
            let (name, http) = match scheme.as_str() {
                "basic" => ("basicAuth", HttpBuilder::new().scheme(HttpAuthScheme::Basic)),
                _ => {
                    let mut http = HttpBuilder::new().scheme(HttpAuthScheme::Bearer);
                    if let Some(format) = &auth.bearer_format {
                        http = http.bearer_format(format.clone());
                    }
                    ("bearerAuth", http)
                }
            };
            Some((name.to_string(), Some(SecurityScheme::Http(http.build()))))
        }
        "apiKey" => {
            let value = ApiKeyValue::new(auth.name.clone().unwrap_or_else(|| "X-API-Key".into()));
            let key = match auth.location.as_deref() {
                Some("query") => ApiKey::Query(value),
                Some("cookie") => ApiKey::Cookie(value),
                _ => ApiKey::Header(value),
            };
            Some(("apiKeyAuth".to_string(), Some(SecurityScheme::ApiKey(key))))
        }
        // Flows are passed through verbatim after serialization.
        "oauth2" => Some(("oauth2".to_string(), None)),
        _ => None,
    }
}

struct GatePaths<'a> {
    definition: &'a GateDefinition,
    gate: &'a CompiledGate,
    names: &'a DocumentNames,
    base: String,
    security: Option<&'a str>,
}

impl GatePaths<'_> {
    fn operation(&self, summary: String, id_suffix: &str) -> OperationBuilder {
        let mut op = OperationBuilder::new()
            .tag(self.names.tag.clone())
            .operation_id(Some(format!("{}{}", self.names.component, id_suffix)))
            .summary(Some(summary));
        if let Some(name) = self.security {
            op = op.security(SecurityRequirement::new(name, Vec::<String>::new()));
        }
        op
    }

    fn entity_response(&self, description: &str) -> Response {
        let data = ObjectBuilder::new()
            .schema_type(Type::Object)
            .property("data", Ref::from_schema_name(self.names.component.clone()));
        ResponseBuilder::new()
            .description(description)
            .content(JSON, ContentBuilder::new().schema(Some(data)).build())
            .build()
    }

    fn list_operation(&self) -> OperationBuilder {
        let mut op = self.operation(format!("List {}", self.names.tag), "List");
        for field in self.gate.filter_fields() {
            let operators: Vec<&str> = match self.gate.operators.get(field) {
                Some(ops) => ops.iter().map(|o| o.as_str()).collect(),
                None => FilterOperator::ALL.iter().map(|o| o.as_str()).collect(),
            };
            op = op.parameter(query_param(
                &format!("filter[{}]", field),
                &format!("Filter {} with operators: {}", field, operators.join(", ")),
                Type::Object,
            ));
        }
        let sorts = if self.gate.sorts.is_empty() {
            "Comma separated field:direction pairs".to_string()
        } else {
            format!("Comma separated field:direction pairs over: {}", self.gate.sorts.join(", "))
        };
        op = op
            .parameter(query_param("sort", &sorts, Type::String))
            .parameter(query_param("per_page", "Page size", Type::Integer))
            .parameter(query_param("page", "Page number for classic pagination", Type::Integer))
            .parameter(query_param("cursor", "Opaque cursor for cursor pagination", Type::String))
            .parameter(query_param("pagination", "classic, cursor or none", Type::String));
        if !self.definition.versions().is_empty() {
            op = op.parameter(query_param("version", "Gate version", Type::String));
        }
        let page = ObjectBuilder::new().schema_type(Type::Object).property(
            "data",
            ArrayBuilder::new().items(Ref::from_schema_name(self.names.component.clone())),
        );
        op.response(
            "200",
            ResponseBuilder::new()
                .description("Paginated result")
                .content(JSON, ContentBuilder::new().schema(Some(page)).build())
                .build(),
        )
        .response("422", described("Invalid filter"))
    }

    fn action_operation(&self, action: &CompiledAction) -> OperationBuilder {
        let mut op = self.operation(
            format!("{} {}", title_case(&action.name), self.names.component),
            &pascal(&action.name),
        );
        if action.requires_identifier && action.kind != ActionKind::Create {
            op = op.parameter(id_param());
        }
        if !action.rules.is_empty() {
            let body_name = format!("{}{}Request", self.names.component, pascal(&action.name));
            op = op.request_body(Some(
                RequestBodyBuilder::new()
                    .content(
                        JSON,
                        ContentBuilder::new().schema(Some(Ref::from_schema_name(body_name))).build(),
                    )
                    .required(Some(Required::True))
                    .build(),
            ));
        }
        let success = match (action.kind, action.status) {
            (_, Some(status)) => status.as_u16().to_string(),
            (ActionKind::Create, None) => "201".to_string(),
            _ => "200".to_string(),
        };
        op = if action.kind == ActionKind::Delete && action.handler.is_none() {
            let deleted = ObjectBuilder::new()
                .schema_type(Type::Object)
                .property("deleted", ObjectBuilder::new().schema_type(Type::Boolean));
            op.response(
                success,
                ResponseBuilder::new()
                    .description("Deletion result")
                    .content(JSON, ContentBuilder::new().schema(Some(deleted)).build())
                    .build(),
            )
            .response("204", described("Deleted"))
        } else {
            op.response(success, self.entity_response("Action result"))
        };
        if !action.rules.is_empty() {
            op = op.response("422", described("Validation failed"));
        }
        if action.authorize.is_some() || !action.abilities.is_empty() {
            op = op.response("403", described("Forbidden"));
        }
        if action.requires_identifier && action.kind != ActionKind::Create {
            op = op.response("404", described("Not found"));
        }
        op
    }

    /// `(path, method, operation)` triples for this gate.
    fn build(&self) -> Vec<(String, HttpMethod, OperationBuilder)> {
        let list_path = format!("{}/{}", self.base, self.names.slug);
        let mut out = vec![(list_path.clone(), HttpMethod::Get, self.list_operation())];
        for action in &self.gate.actions {
            let Some(method) = to_http_method(&action.method) else {
                continue;
            };
            let path = match action.kind {
                ActionKind::Create if action.method != Method::GET => list_path.clone(),
                ActionKind::Update | ActionKind::Delete => format!("{}/{{id}}", list_path),
                _ if action.requires_identifier => format!("{}/actions/{}/{{id}}", list_path, action.name),
                _ => format!("{}/actions/{}", list_path, action.name),
            };
            out.push((path, method, self.action_operation(action)));
        }
        if !self.definition.versions().is_empty() {
            let changelog = ResponseBuilder::new().description("Version changelog").content(
                JSON,
                ContentBuilder::new()
                    .schema(Some(ArrayBuilder::new().items(
                        ObjectBuilder::new()
                            .schema_type(Type::Object)
                            .property("version", ObjectBuilder::new().schema_type(Type::String))
                            .property(
                                "changes",
                                ArrayBuilder::new().items(ObjectBuilder::new().schema_type(Type::String)),
                            ),
                    )))
                    .build(),
            )
            .build();
            out.push((
                format!("{}/changelog", list_path),
                HttpMethod::Get,
                self.operation(format!("{} changelog", self.names.tag), "Changelog")
                    .response("200", changelog),
            ));
        }
        out
    }
}

fn method_key(method: &HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "get",
        HttpMethod::Post => "post",
        HttpMethod::Put => "put",
        HttpMethod::Patch => "patch",
        HttpMethod::Delete => "delete",
        HttpMethod::Options => "options",
        HttpMethod::Head => "head",
        HttpMethod::Trace => "trace",
    }
}

/// Build the full document: info, servers, tags, paths, components and security.
pub fn generate(gates: &GateRegistry, settings: &GateSettings) -> Result<Value, AppError> {
    let docs = &settings.openapi;
    let base = settings.route_base();
    let scheme = docs.auth.as_ref().and_then(security_scheme);
    let security_name = scheme.as_ref().map(|(name, _)| name.as_str());

    let mut components = ComponentsBuilder::new();
    if let Some((name, Some(scheme))) = &scheme {
        components = components.security_scheme(name.clone(), scheme.clone());
    }
    let mut tags = Vec::new();
    let mut taken = HashSet::new();
    let mut grouped: Vec<(String, Vec<(HttpMethod, OperationBuilder)>)> = Vec::new();
    let mut metadata: Vec<(String, &'static str, Value)> = Vec::new();

    for definition in gates.iter() {
        let gate = definition.compiled(None)?;
        let names = DocumentNames::for_gate(gates, definition, &taken);
        taken.insert(names.component.clone());

        components = components.schema(names.component.clone(), entity_schema(&gate));
        for action in gate.actions.iter().filter(|a| !a.rules.is_empty()) {
            components = components.schema(
                format!("{}{}Request", names.component, pascal(&action.name)),
                rules_schema(&action.rules),
            );
        }
        if !tags.iter().any(|t: &utoipa::openapi::tag::Tag| t.name == names.tag) {
            tags.push(
                TagBuilder::new()
                    .name(names.tag.clone())
                    .description(Some(format!("Operations on {}", definition.entity())))
                    .build(),
            );
        }

        let meta = gate_metadata(definition, &gate);
        let paths = GatePaths {
            definition,
            gate: &gate,
            names: &names,
            base: base.clone(),
            security: security_name,
        };
        for (path, method, op) in paths.build() {
            metadata.push((path.clone(), method_key(&method), meta.clone()));
            match grouped.iter_mut().find(|(p, _)| *p == path) {
                Some((_, ops)) => ops.push((method, op)),
                None => grouped.push((path, vec![(method, op)])),
            }
        }
    }

    let mut paths = PathsBuilder::new();
    for (path, ops) in grouped {
        let mut item = PathItemBuilder::new();
        for (method, op) in ops {
            item = item.operation(method, op.build());
        }
        paths = paths.path(path, item.build());
    }

    let mut info = InfoBuilder::new().title(docs.title.clone()).version(docs.version.clone());
    if let Some(description) = &docs.description {
        info = info.description(Some(description.clone()));
    }
    let servers = docs
        .servers
        .iter()
        .map(|s| {
            ServerBuilder::new()
                .url(s.url.clone())
                .description(s.description.clone())
                .build()
        })
        .collect::<Vec<_>>();
    let document = OpenApiBuilder::new()
        .info(info.build())
        .servers(Some(servers))
        .tags(Some(tags))
        .paths(paths.build())
        .components(Some(components.build()))
        .build();

    let mut value = serde_json::to_value(&document)?;
    for (path, method, meta) in metadata {
        if let Some(op) = value.pointer_mut(&format!("/paths/{}/{}", escape_pointer(&path), method)) {
            if let Value::Object(op) = op {
                op.insert("x-query-gate".into(), meta);
            }
        }
    }
    if let (Some(auth), Some((name, None))) = (&docs.auth, &scheme) {
        let flows = auth.flows.clone().unwrap_or_else(|| json!({}));
        if let Value::Object(root) = &mut value {
            let components = root.entry("components").or_insert_with(|| json!({}));
            if let Value::Object(components) = components {
                let schemes = components.entry("securitySchemes").or_insert_with(|| json!({}));
                if let Value::Object(schemes) = schemes {
                    schemes.insert(name.clone(), json!({"type": "oauth2", "flows": flows}));
                }
            }
        }
    }
    prune_empty(&mut value);
    tracing::debug!(gates = gates.len(), "document generated");
    Ok(value)
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Keys whose empty values carry meaning: `{"bearerAuth": []}` requirements and OAuth2 `scopes`.
const KEEP_EMPTY: [&str; 2] = ["security", "scopes"];

/// Recursively drop nulls, empty arrays and empty objects. Returns true when `value` itself is empty.
pub fn prune_empty(value: &mut Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => {
            items.retain_mut(|item| !prune_empty(item));
            items.is_empty()
        }
        Value::Object(map) => {
            let empty: Vec<String> = map
                .iter_mut()
                .filter_map(|(k, v)| {
                    if KEEP_EMPTY.contains(&k.as_str()) {
                        return v.is_null().then(|| k.clone());
                    }
                    prune_empty(v).then(|| k.clone())
                })
                .collect();
            for key in empty {
                map.remove(&key);
            }
            map.is_empty()
        }
        _ => false,
    }
}
