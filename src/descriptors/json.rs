//! Canonical JSON rendering, per \S4.2: field names as delivered by
//! reflection, bytes as base64, 64-bit integers as quoted strings (to avoid
//! lossy JSON-number rounding), enums as string names, and `Any` values
//! unpacked by type-URL lookup against the descriptor universe, recursively,
//! up to depth 16 — cycles fail the message rather than looping forever.
//! `prost-reflect`'s own serde support does the field-shape mapping; this
//! module owns only the `Any`-unpacking policy layered on top of it, since
//! that depth/cycle bookkeeping is specific to this system.

use base64::Engine;
use prost_reflect::{DescriptorPool, DynamicMessage, Kind, ReflectMessage, Value};
use serde_json::{Map, Value as Json};

use crate::error::DescriptorError;

const MAX_ANY_DEPTH: u32 = 16;
const ANY_FULL_NAME: &str = "google.protobuf.Any";

pub fn message_to_canonical_json(
    pool: &DescriptorPool,
    message: &DynamicMessage,
) -> Result<Json, DescriptorError> {
    let mut visited = Vec::new();
    render_message(pool, message, 0, &mut visited)
}

fn render_message(
    pool: &DescriptorPool,
    message: &DynamicMessage,
    depth: u32,
    visited: &mut Vec<String>,
) -> Result<Json, DescriptorError> {
    if message.descriptor().full_name() == ANY_FULL_NAME {
        return render_any(pool, message, depth, visited);
    }

    let mut object = Map::new();
    for field in message.descriptor().fields() {
        if !message.has_field(&field) && field.supports_presence() {
            continue;
        }
        let value = message.get_field(&field);
        object.insert(field.json_name().to_string(), render_value(pool, &field, &value, depth, visited)?);
    }
    Ok(Json::Object(object))
}

fn render_any(
    pool: &DescriptorPool,
    any: &DynamicMessage,
    depth: u32,
    visited: &mut Vec<String>,
) -> Result<Json, DescriptorError> {
    if depth >= MAX_ANY_DEPTH {
        return Err(DescriptorError::CyclicAny {
            type_url: any
                .get_field_by_name("type_url")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        });
    }

    let type_url = any
        .get_field_by_name("type_url")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| DescriptorError::Malformed("Any missing type_url".into()))?;

    if visited.contains(&type_url) {
        return Err(DescriptorError::CyclicAny { type_url });
    }

    let bytes = any
        .get_field_by_name("value")
        .and_then(|v| v.as_bytes().map(|b| b.to_vec()))
        .ok_or_else(|| DescriptorError::Malformed("Any missing value".into()))?;

    let type_name = type_url.rsplit('/').next().unwrap_or(&type_url);
    let inner_desc = pool
        .get_message_by_name(type_name)
        .ok_or_else(|| DescriptorError::UnknownTypeUrl(type_url.clone()))?;
    let inner = DynamicMessage::decode(inner_desc, bytes.as_slice()).map_err(|source| DescriptorError::Decode {
        type_url: type_url.clone(),
        source,
    })?;

    visited.push(type_url.clone());
    let mut rendered = render_message(pool, &inner, depth + 1, visited)?;
    visited.pop();

    if let Json::Object(ref mut map) = rendered {
        map.insert("@type".to_string(), Json::String(type_url));
    }
    Ok(rendered)
}

fn render_value(
    pool: &DescriptorPool,
    field: &prost_reflect::FieldDescriptor,
    value: &Value,
    depth: u32,
    visited: &mut Vec<String>,
) -> Result<Json, DescriptorError> {
    match value {
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::I32(n) => Ok(Json::Number((*n).into())),
        Value::U32(n) => Ok(Json::Number((*n).into())),
        Value::F32(n) => Ok(serde_json::Number::from_f64(*n as f64)
            .map(Json::Number)
            .unwrap_or(Json::Null)),
        Value::F64(n) => Ok(serde_json::Number::from_f64(*n)
            .map(Json::Number)
            .unwrap_or(Json::Null)),
        // 64-bit integers are quoted strings to avoid lossy JSON-number rounding.
        Value::I64(n) => Ok(Json::String(n.to_string())),
        Value::U64(n) => Ok(Json::String(n.to_string())),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::Bytes(b) => Ok(Json::String(base64::engine::general_purpose::STANDARD.encode(b))),
        Value::EnumNumber(n) => Ok(Json::String(enum_name(field, *n))),
        Value::Message(inner) => render_message(pool, inner, depth, visited),
        Value::List(items) => {
            let mut arr = Vec::with_capacity(items.len());
            for item in items {
                arr.push(render_value(pool, field, item, depth, visited)?);
            }
            Ok(Json::Array(arr))
        }
        Value::Map(entries) => {
            let mut object = Map::new();
            for (key, val) in entries {
                object.insert(map_key_to_string(key), render_value(pool, field, val, depth, visited)?);
            }
            Ok(Json::Object(object))
        }
    }
}

fn enum_name(field: &prost_reflect::FieldDescriptor, number: i32) -> String {
    if let Kind::Enum(enum_desc) = field.kind() {
        if let Some(value) = enum_desc.get_value(number) {
            return value.name().to_string();
        }
    }
    number.to_string()
}

fn map_key_to_string(key: &prost_reflect::MapKey) -> String {
    use prost_reflect::MapKey;
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(n) => n.to_string(),
        MapKey::I64(n) => n.to_string(),
        MapKey::U32(n) => n.to_string(),
        MapKey::U64(n) => n.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use prost::Message as _;
    use prost_reflect::DynamicMessage;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

    use super::*;

    #[test]
    fn max_any_depth_is_positive() {
        assert!(super::MAX_ANY_DEPTH > 0);
    }

    fn scalar_field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            r#type: Some(ty as i32),
            label: Some(Label::Optional as i32),
            ..Default::default()
        }
    }

    /// A pool with just `google.protobuf.Any` and a one-field `pkg.Inner`
    /// message, enough to exercise unpacking and cycle detection without a
    /// live reflection server.
    fn build_pool() -> DescriptorPool {
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_proto(FileDescriptorProto {
            name: Some("google/protobuf/any.proto".to_string()),
            package: Some("google.protobuf".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Any".to_string()),
                field: vec![
                    scalar_field("type_url", 1, Type::String),
                    scalar_field("value", 2, Type::Bytes),
                ],
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        })
        .unwrap();
        pool.add_file_descriptor_proto(FileDescriptorProto {
            name: Some("pkg/inner.proto".to_string()),
            package: Some("pkg".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Inner".to_string()),
                field: vec![scalar_field("name", 1, Type::String)],
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        })
        .unwrap();
        pool
    }

    #[test]
    fn unpacks_any_and_tags_result_with_type_url() {
        let pool = build_pool();

        let inner_desc = pool.get_message_by_name("pkg.Inner").unwrap();
        let mut inner = DynamicMessage::new(inner_desc);
        inner.set_field_by_name("name", Value::String("hello".to_string()));

        let any_desc = pool.get_message_by_name("google.protobuf.Any").unwrap();
        let mut any = DynamicMessage::new(any_desc);
        any.set_field_by_name(
            "type_url",
            Value::String("type.googleapis.com/pkg.Inner".to_string()),
        );
        any.set_field_by_name("value", Value::Bytes(inner.encode_to_vec().into()));

        let rendered = message_to_canonical_json(&pool, &any).unwrap();
        let object = rendered.as_object().unwrap();
        assert_eq!(object["@type"], "type.googleapis.com/pkg.Inner");
        assert_eq!(object["name"], "hello");
    }

    #[test]
    fn an_any_wrapping_itself_is_rejected_as_cyclic() {
        let pool = build_pool();
        let any_desc = pool.get_message_by_name("google.protobuf.Any").unwrap();
        let type_url = "type.googleapis.com/google.protobuf.Any".to_string();

        let mut inner_any = DynamicMessage::new(any_desc.clone());
        inner_any.set_field_by_name("type_url", Value::String(type_url.clone()));
        inner_any.set_field_by_name("value", Value::Bytes(Vec::new().into()));

        let mut outer_any = DynamicMessage::new(any_desc);
        outer_any.set_field_by_name("type_url", Value::String(type_url));
        outer_any.set_field_by_name("value", Value::Bytes(inner_any.encode_to_vec().into()));

        let err = message_to_canonical_json(&pool, &outer_any).unwrap_err();
        assert!(matches!(err, DescriptorError::CyclicAny { .. }));
    }

    #[test]
    fn an_any_nested_past_max_depth_is_rejected() {
        let pool = build_pool();
        let inner_desc = pool.get_message_by_name("pkg.Inner").unwrap();
        let mut inner = DynamicMessage::new(inner_desc);
        inner.set_field_by_name("name", Value::String("leaf".to_string()));

        let err = render_any(
            &pool,
            &{
                let any_desc = pool.get_message_by_name("google.protobuf.Any").unwrap();
                let mut any = DynamicMessage::new(any_desc);
                any.set_field_by_name(
                    "type_url",
                    Value::String("type.googleapis.com/pkg.Inner".to_string()),
                );
                any.set_field_by_name("value", Value::Bytes(inner.encode_to_vec().into()));
                any
            },
            MAX_ANY_DEPTH,
            &mut Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorError::CyclicAny { .. }));
    }
}
