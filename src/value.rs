//! Conversions into template [`Value`]s.

use gtmpl_value::Value;
use std::collections::HashMap;
use url::Url;

/// Converts a frontmatter value into a template value. Mapping keys that
/// aren't strings, numbers or booleans are dropped.
pub fn from_yaml(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Nil,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::from(i),
            (_, Some(u), _) => Value::from(u),
            (_, _, Some(f)) => Value::from(f),
            _ => Value::Nil,
        },
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => {
            Value::Array(items.iter().map(from_yaml).collect())
        }
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .iter()
                .filter_map(|(k, v)| {
                    let key = match k {
                        Yaml::String(s) => s.clone(),
                        Yaml::Number(n) => n.to_string(),
                        Yaml::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some((key, from_yaml(v)))
                })
                .collect(),
        ),
    }
}

pub fn url(url: &Url) -> Value {
    Value::String(url.to_string())
}

pub fn optional_url(url: Option<&Url>) -> Value {
    url.map_or(Value::Nil, self::url)
}

/// Builds a [`Value::Object`] from key/value pairs.
pub fn object<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect::<HashMap<String, Value>>(),
    )
}
