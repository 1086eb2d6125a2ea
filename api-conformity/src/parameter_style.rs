use serde_json::Value;

/// Serialization style of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParameterStyle {
    Simple,
    Label,
    Matrix,
    Form,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    /// Style declared by a parameter, or the default one of its location.
    ///
    /// Returns the declared style name when it is unknown or not allowed at the location.
    pub(crate) fn of(parameter: &Value) -> Result<Self, String> {
        let location = parameter["in"].as_str().unwrap_or_default();
        let Some(declared) = parameter["style"].as_str() else {
            return Ok(match location {
                "query" | "cookie" => Self::Form,
                _ => Self::Simple,
            });
        };

        let style = match declared {
            "simple" => Self::Simple,
            "label" => Self::Label,
            "matrix" => Self::Matrix,
            "form" => Self::Form,
            "spaceDelimited" => Self::SpaceDelimited,
            "pipeDelimited" => Self::PipeDelimited,
            "deepObject" => Self::DeepObject,
            _ => return Err(declared.to_string()),
        };
        let allowed = match location {
            "path" => matches!(style, Self::Simple | Self::Label | Self::Matrix),
            "query" => matches!(
                style,
                Self::Form | Self::SpaceDelimited | Self::PipeDelimited | Self::DeepObject
            ),
            "header" => style == Self::Simple,
            "cookie" => style == Self::Form,
            _ => false,
        };

        if allowed {
            Ok(style)
        } else {
            Err(declared.to_string())
        }
    }

    /// `explode` flag of a parameter, `true` by default for the `form` style only.
    pub(crate) fn explode(self, parameter: &Value) -> bool {
        parameter["explode"].as_bool().unwrap_or(self == Self::Form)
    }

    fn item_separator(self, explode: bool) -> char {
        match self {
            Self::Label if explode => '.',
            Self::Matrix if explode => ';',
            Self::SpaceDelimited => ' ',
            Self::PipeDelimited => '|',
            _ => ',',
        }
    }
}

/// Shape expected by the parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueKind {
    Primitive,
    Array,
    Object,
}

impl ValueKind {
    pub(crate) fn from_declared_type(declared_type: Option<&str>) -> Self {
        match declared_type {
            Some("array") => Self::Array,
            Some("object") => Self::Object,
            _ => Self::Primitive,
        }
    }
}

/// A parameter value split according to its style, before conversion to the schema types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawParameter {
    Single(String),
    Items(Vec<String>),
    Fields(Vec<(String, String)>),
}

/// Split a single textual value (path segment, header or cookie).
pub(crate) fn split_value(
    raw: &str,
    name: &str,
    style: ParameterStyle,
    explode: bool,
    kind: ValueKind,
) -> Result<RawParameter, String> {
    let body = match style {
        ParameterStyle::Label => raw
            .strip_prefix('.')
            .ok_or_else(|| format!("label value {raw:?} must start with '.'"))?,
        ParameterStyle::Matrix => {
            let body = raw
                .strip_prefix(';')
                .ok_or_else(|| format!("matrix value {raw:?} must start with ';'"))?;
            let assignment = format!("{name}=");
            let unassigned =
                |value: &str| format!("matrix value {value:?} must start with '{assignment}'");
            match (kind, explode) {
                (ValueKind::Object, true) => body,
                (ValueKind::Array, true) => {
                    return body
                        .split(';')
                        .map(|item| {
                            item.strip_prefix(&assignment)
                                .map(|item| item.to_string())
                                .ok_or_else(|| unassigned(item))
                        })
                        .collect::<Result<_, _>>()
                        .map(RawParameter::Items);
                }
                _ => body
                    .strip_prefix(&assignment)
                    .ok_or_else(|| unassigned(body))?,
            }
        }
        _ => raw,
    };

    Ok(split_body(body, style.item_separator(explode), explode, kind))
}

/// Extract a query parameter from all the query pairs, `None` if it is absent.
pub(crate) fn collect_query(
    query_pairs: &[(String, String)],
    name: &str,
    style: ParameterStyle,
    explode: bool,
    kind: ValueKind,
    property_names: &[String],
) -> Option<RawParameter> {
    if style == ParameterStyle::DeepObject {
        let prefix = format!("{name}[");
        let fields: Vec<(String, String)> = query_pairs
            .iter()
            .filter_map(|(key, value)| {
                let property = key.strip_prefix(&prefix)?.strip_suffix(']')?;
                Some((property.to_string(), value.clone()))
            })
            .collect();
        return (!fields.is_empty()).then_some(RawParameter::Fields(fields));
    }

    if kind == ValueKind::Object && explode {
        let fields: Vec<(String, String)> = query_pairs
            .iter()
            .filter(|(key, _)| property_names.contains(key))
            .cloned()
            .collect();
        return (!fields.is_empty()).then_some(RawParameter::Fields(fields));
    }

    let values: Vec<&str> = query_pairs
        .iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .collect();
    let first = *values.first()?;

    Some(match kind {
        ValueKind::Array if explode => {
            RawParameter::Items(values.iter().map(|value| value.to_string()).collect())
        }
        _ => split_body(first, style.item_separator(false), false, kind),
    })
}

/// Whether a query key is read by the parameter when it is collected with [collect_query].
pub(crate) fn reads_query_key(
    key: &str,
    name: &str,
    style: ParameterStyle,
    explode: bool,
    kind: ValueKind,
    property_names: &[String],
) -> bool {
    if style == ParameterStyle::DeepObject {
        return key
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('['))
            .is_some_and(|rest| rest.ends_with(']'));
    }

    if kind == ValueKind::Object && explode {
        return property_names.iter().any(|property| property == key);
    }

    key == name
}

fn split_body(body: &str, separator: char, explode: bool, kind: ValueKind) -> RawParameter {
    match kind {
        ValueKind::Primitive => RawParameter::Single(body.to_string()),
        ValueKind::Array => RawParameter::Items(
            body.split(separator)
                .map(|item| item.trim().to_string())
                .collect(),
        ),
        ValueKind::Object if explode => RawParameter::Fields(
            body.split(separator)
                .filter_map(|pair| pair.split_once('='))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        ),
        ValueKind::Object => {
            let parts: Vec<&str> = body.split(separator).collect();
            RawParameter::Fields(
                parts
                    .chunks(2)
                    .map(|pair| (pair[0].to_string(), pair.get(1).unwrap_or(&"").to_string()))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pairs(query: &[(&str, &str)]) -> Vec<(String, String)> {
        query
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn items(values: &[&str]) -> RawParameter {
        RawParameter::Items(values.iter().map(|v| v.to_string()).collect())
    }

    fn fields(values: &[(&str, &str)]) -> RawParameter {
        RawParameter::Fields(pairs(values))
    }

    #[test]
    fn default_style_depends_on_location() {
        assert_eq!(
            Ok(ParameterStyle::Form),
            ParameterStyle::of(&json!({ "name": "a", "in": "query" }))
        );
        assert_eq!(
            Ok(ParameterStyle::Form),
            ParameterStyle::of(&json!({ "name": "a", "in": "cookie" }))
        );
        assert_eq!(
            Ok(ParameterStyle::Simple),
            ParameterStyle::of(&json!({ "name": "a", "in": "path" }))
        );
        assert_eq!(
            Ok(ParameterStyle::Simple),
            ParameterStyle::of(&json!({ "name": "a", "in": "header" }))
        );
    }

    #[test]
    fn style_must_be_known_and_allowed_at_its_location() {
        assert_eq!(
            Ok(ParameterStyle::DeepObject),
            ParameterStyle::of(&json!({ "name": "a", "in": "query", "style": "deepObject" }))
        );
        assert_eq!(
            Err("deepObject".to_string()),
            ParameterStyle::of(&json!({ "name": "a", "in": "path", "style": "deepObject" }))
        );
        assert_eq!(
            Err("tabDelimited".to_string()),
            ParameterStyle::of(&json!({ "name": "a", "in": "query", "style": "tabDelimited" }))
        );
    }

    #[test]
    fn explode_defaults_to_true_for_form_only() {
        assert!(ParameterStyle::Form.explode(&json!({})));
        assert!(!ParameterStyle::Form.explode(&json!({ "explode": false })));
        assert!(!ParameterStyle::Simple.explode(&json!({})));
        assert!(ParameterStyle::Label.explode(&json!({ "explode": true })));
    }

    fn single(value: &str) -> RawParameter {
        RawParameter::Single(value.to_string())
    }

    fn split(
        style: ParameterStyle,
        raw: &str,
        explode: bool,
        kind: ValueKind,
    ) -> Result<RawParameter, String> {
        split_value(raw, "id", style, explode, kind)
    }

    #[test]
    fn split_simple_values() {
        use ParameterStyle::Simple;
        let role_and_name = fields(&[("role", "admin"), ("name", "alex")]);

        assert_eq!(Ok(single("5")), split(Simple, "5", false, ValueKind::Primitive));
        assert_eq!(Ok(items(&["3", "4", "5"])), split(Simple, "3,4,5", false, ValueKind::Array));
        assert_eq!(
            Ok(role_and_name.clone()),
            split(Simple, "role,admin,name,alex", false, ValueKind::Object)
        );
        assert_eq!(
            Ok(role_and_name),
            split(Simple, "role=admin,name=alex", true, ValueKind::Object)
        );
    }

    #[test]
    fn split_label_values() {
        use ParameterStyle::Label;

        assert_eq!(Ok(single("5")), split(Label, ".5", false, ValueKind::Primitive));
        assert_eq!(Ok(items(&["3", "4", "5"])), split(Label, ".3,4,5", false, ValueKind::Array));
        assert_eq!(Ok(items(&["3", "4", "5"])), split(Label, ".3.4.5", true, ValueKind::Array));
        assert_eq!(
            Ok(fields(&[("role", "admin"), ("name", "alex")])),
            split(Label, ".role=admin.name=alex", true, ValueKind::Object)
        );
        split(Label, "5", false, ValueKind::Primitive).unwrap_err();
    }

    #[test]
    fn split_matrix_values() {
        use ParameterStyle::Matrix;
        let role_and_name = fields(&[("role", "admin"), ("name", "alex")]);

        assert_eq!(Ok(single("5")), split(Matrix, ";id=5", false, ValueKind::Primitive));
        assert_eq!(
            Ok(items(&["3", "4", "5"])),
            split(Matrix, ";id=3,4,5", false, ValueKind::Array)
        );
        assert_eq!(
            Ok(items(&["3", "4", "5"])),
            split(Matrix, ";id=3;id=4;id=5", true, ValueKind::Array)
        );
        assert_eq!(
            Ok(role_and_name.clone()),
            split(Matrix, ";id=role,admin,name,alex", false, ValueKind::Object)
        );
        assert_eq!(
            Ok(role_and_name),
            split(Matrix, ";role=admin;name=alex", true, ValueKind::Object)
        );
        split(Matrix, ";other=5", false, ValueKind::Primitive).unwrap_err();
        split(Matrix, "5", false, ValueKind::Primitive).unwrap_err();
    }

    #[test]
    fn collect_delimited_query_arrays() {
        let collect = |query: &[(&str, &str)], style, explode| {
            collect_query(&pairs(query), "ids", style, explode, ValueKind::Array, &[])
        };

        assert_eq!(
            Some(items(&["1", "2"])),
            collect(&[("ids", "1"), ("ids", "2")], ParameterStyle::Form, true)
        );
        assert_eq!(
            Some(items(&["1", "2"])),
            collect(&[("ids", "1,2")], ParameterStyle::Form, false)
        );
        assert_eq!(
            Some(items(&["1", "2", "3"])),
            collect(&[("ids", "1 2 3")], ParameterStyle::SpaceDelimited, false)
        );
        assert_eq!(
            Some(items(&["1", "2", "3"])),
            collect(&[("ids", "1|2|3")], ParameterStyle::PipeDelimited, false)
        );
        assert_eq!(None, collect(&[("other", "1")], ParameterStyle::Form, true));
    }

    #[test]
    fn query_keys_read_by_a_parameter_follow_its_style() {
        let properties = vec!["min".to_string(), "max".to_string()];
        let reads = |key: &str, style: ParameterStyle, kind: ValueKind| {
            reads_query_key(key, "range", style, true, kind, &properties)
        };

        assert!(reads("range", ParameterStyle::Form, ValueKind::Array));
        assert!(!reads("min", ParameterStyle::Form, ValueKind::Array));
        assert!(reads("min", ParameterStyle::Form, ValueKind::Object));
        assert!(!reads("range", ParameterStyle::Form, ValueKind::Object));
        assert!(reads("range[min]", ParameterStyle::DeepObject, ValueKind::Object));
        assert!(!reads("ranges[min]", ParameterStyle::DeepObject, ValueKind::Object));
        assert!(!reads("range", ParameterStyle::DeepObject, ValueKind::Object));
    }

    #[test]
    fn collect_query_objects() {
        let query = pairs(&[
            ("filter[kind]", "cat"),
            ("filter[age]", "3"),
            ("kind", "dog"),
            ("limit", "10"),
        ]);
        let properties = vec!["kind".to_string(), "age".to_string()];

        assert_eq!(
            Some(fields(&[("kind", "cat"), ("age", "3")])),
            collect_query(
                &query,
                "filter",
                ParameterStyle::DeepObject,
                true,
                ValueKind::Object,
                &properties
            )
        );
        assert_eq!(
            Some(fields(&[("kind", "dog")])),
            collect_query(
                &query,
                "filter",
                ParameterStyle::Form,
                true,
                ValueKind::Object,
                &properties
            )
        );
        assert_eq!(
            None,
            collect_query(
                &query,
                "other",
                ParameterStyle::DeepObject,
                true,
                ValueKind::Object,
                &[]
            )
        );
    }
}
