//! Value marshalling between host-world JSON values and Lua tables.
//!
//! The host side of every invocation speaks `serde_json::Value`; scripts
//! speak Lua tables. Arrays shift base on the way across: host lists are
//! 0-indexed, the Lua tables they become are 1-indexed. On the way back a
//! table is read as a list when it has a dense array part (`raw_len > 0`)
//! and as a string-keyed mapping otherwise, which is the usual Lua
//! convention and deliberately ambiguous for sparse arrays.

use mlua::{Lua, Table, Value};
use serde_json::{Map, Number, Value as JsonValue};

/// Convert a host value into a Lua value.
///
/// Host numbers become Lua floats (integers included). A number with no
/// 64-bit float form marshals to nil; nothing else in the host value set
/// is lossy in this direction.
pub fn json_to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    match value {
        JsonValue::Null => Ok(Value::Nil),
        JsonValue::Bool(flag) => Ok(Value::Boolean(*flag)),
        JsonValue::Number(number) => Ok(number
            .as_f64()
            .map(Value::Number)
            .unwrap_or(Value::Nil)),
        JsonValue::String(text) => Ok(Value::String(lua.create_string(text)?)),
        JsonValue::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (index, item) in items.iter().enumerate() {
                // 0-indexed host list, 1-indexed Lua array
                table.raw_set(index + 1, json_to_lua(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
        JsonValue::Object(fields) => {
            let table = lua.create_table_with_capacity(0, fields.len())?;
            for (key, item) in fields {
                table.raw_set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}

/// Convert a Lua value into a host value.
///
/// Functions, threads, and userdata have no host representation and come
/// back as null. Non-finite floats and non-UTF-8 strings also map to null.
pub fn lua_to_json(value: Value) -> mlua::Result<JsonValue> {
    match value {
        Value::Nil => Ok(JsonValue::Null),
        Value::Boolean(flag) => Ok(JsonValue::Bool(flag)),
        Value::Integer(number) => Ok(JsonValue::Number(number.into())),
        Value::Number(number) => Ok(Number::from_f64(number)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)),
        Value::String(text) => Ok(match text.to_str() {
            Ok(text) => JsonValue::String(text.to_string()),
            Err(_) => JsonValue::Null,
        }),
        Value::Table(table) => table_to_json(table),
        _ => Ok(JsonValue::Null),
    }
}

/// A table with a dense array part is a list; everything else is a
/// mapping keyed by the string form of each key.
fn table_to_json(table: Table) -> mlua::Result<JsonValue> {
    let len = table.raw_len();
    if len > 0 {
        let mut items = Vec::with_capacity(len);
        for index in 1..=len {
            items.push(lua_to_json(table.raw_get(index)?)?);
        }
        Ok(JsonValue::Array(items))
    } else {
        let mut fields = Map::new();
        for pair in table.pairs::<Value, Value>() {
            let (key, item) = pair?;
            if let Some(key) = key_to_string(&key) {
                fields.insert(key, lua_to_json(item)?);
            }
        }
        Ok(JsonValue::Object(fields))
    }
}

fn key_to_string(key: &Value) -> Option<String> {
    match key {
        Value::String(text) => text.to_str().ok().map(|text| text.to_string()),
        Value::Integer(number) => Some(number.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Boolean(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_cross_in_both_directions() {
        let lua = Lua::new();

        assert!(matches!(
            json_to_lua(&lua, &JsonValue::Null).unwrap(),
            Value::Nil
        ));
        assert!(matches!(
            json_to_lua(&lua, &json!(true)).unwrap(),
            Value::Boolean(true)
        ));
        assert!(matches!(
            json_to_lua(&lua, &json!(1.5)).unwrap(),
            Value::Number(n) if n == 1.5
        ));

        assert_eq!(lua_to_json(Value::Nil).unwrap(), JsonValue::Null);
        assert_eq!(lua_to_json(Value::Boolean(false)).unwrap(), json!(false));
        assert_eq!(lua_to_json(Value::Integer(7)).unwrap(), json!(7));
        assert_eq!(lua_to_json(Value::Number(1.5)).unwrap(), json!(1.5));
    }

    #[test]
    fn host_list_becomes_one_indexed_table() {
        let lua = Lua::new();
        let value = json_to_lua(&lua, &json!(["first", "second"])).unwrap();
        let Value::Table(table) = value else {
            panic!("expected a table");
        };

        assert_eq!(table.get::<String>(1).unwrap(), "first");
        assert_eq!(table.get::<String>(2).unwrap(), "second");
        assert!(matches!(table.get::<Value>(0).unwrap(), Value::Nil));
    }

    #[test]
    fn host_mapping_becomes_string_keyed_table() {
        let lua = Lua::new();
        let value = json_to_lua(&lua, &json!({"message": "Hello World", "count": 3})).unwrap();
        let Value::Table(table) = value else {
            panic!("expected a table");
        };

        assert_eq!(table.get::<String>("message").unwrap(), "Hello World");
        assert_eq!(table.get::<f64>("count").unwrap(), 3.0);
    }

    #[test]
    fn dense_table_unmarshals_as_list() {
        let lua = Lua::new();
        let value: Value = lua.load("return {10, 20, 30}").eval().unwrap();
        assert_eq!(lua_to_json(value).unwrap(), json!([10, 20, 30]));
    }

    #[test]
    fn associative_table_unmarshals_as_mapping() {
        let lua = Lua::new();
        let value: Value = lua
            .load(r#"return {message = "hi", count = 2}"#)
            .eval()
            .unwrap();
        assert_eq!(
            lua_to_json(value).unwrap(),
            json!({"message": "hi", "count": 2})
        );
    }

    #[test]
    fn array_part_wins_over_hash_part() {
        // raw_len > 0 means "list"; the associative entries are dropped.
        let lua = Lua::new();
        let value: Value = lua.load(r#"return {1, 2, name = "x"}"#).eval().unwrap();
        assert_eq!(lua_to_json(value).unwrap(), json!([1, 2]));
    }

    #[test]
    fn empty_table_is_a_mapping() {
        let lua = Lua::new();
        let value: Value = lua.load("return {}").eval().unwrap();
        assert_eq!(lua_to_json(value).unwrap(), json!({}));
    }

    #[test]
    fn non_string_keys_are_stringified() {
        let lua = Lua::new();
        let value: Value = lua
            .load(r#"return {[true] = "yes", [2.5] = "half"}"#)
            .eval()
            .unwrap();
        assert_eq!(
            lua_to_json(value).unwrap(),
            json!({"true": "yes", "2.5": "half"})
        );
    }

    #[test]
    fn opaque_values_unmarshal_to_null() {
        let lua = Lua::new();
        let function: Value = lua.load("return function() end").eval().unwrap();
        assert_eq!(lua_to_json(function).unwrap(), JsonValue::Null);
        assert_eq!(lua_to_json(Value::Number(f64::NAN)).unwrap(), JsonValue::Null);
    }

    #[test]
    fn nested_values_round_trip() {
        let lua = Lua::new();
        // Integers promote to floats on the way in, so the fixture sticks
        // to values that survive the documented conversions unchanged.
        let original = json!({
            "text": "hello",
            "half": 0.5,
            "flag": true,
            "items": ["a", "b"],
            "nested": {"inner": "value"},
        });

        let crossed = json_to_lua(&lua, &original).unwrap();
        assert_eq!(lua_to_json(crossed).unwrap(), original);
    }
}
