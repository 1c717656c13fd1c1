//! Directive codec: turns an untrusted completion value into a typed verdict.
//!
//! A completion value asks for a privileged action only when it is an object
//! carrying the [`DIRECTIVE_KEY`] field:
//!
//! ```json
//! { "mcp_call": { "tool": "hello_name", "arguments": { "name": "X" } } }
//! ```
//!
//! Decoding is pure and never guesses. If the key is present but its payload
//! is not well formed, the verdict is [`Decoded::Malformed`], never
//! [`Decoded::PlainData`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The field whose presence marks a completion value as a directive.
pub const DIRECTIVE_KEY: &str = "mcp_call";

/// A validated request to run one named operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    /// Name of the tool to call.
    pub operation_name: String,
    /// Arguments passed to the tool unchanged.
    pub arguments: Map<String, Value>,
}

/// Why a directive-bearing value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MalformedDirective {
    /// The directive field is not an object.
    #[error("'mcp_call' must be an object")]
    NotAnObject,
    /// The directive object has no `tool` field.
    #[error("'mcp_call.tool' is missing")]
    MissingTool,
    /// `tool` is present but not a string.
    #[error("'mcp_call.tool' must be a string")]
    ToolNotAString,
    /// `tool` is an empty or whitespace-only string.
    #[error("'mcp_call.tool' must not be empty")]
    EmptyTool,
    /// `arguments` is present but not an object.
    #[error("'mcp_call.arguments' must be an object")]
    ArgumentsNotAnObject,
}

/// The verdict of [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// No directive: the value is data for the caller, nothing else happens.
    PlainData,
    /// A well-formed directive.
    Directive(Directive),
    /// The directive key was present but its payload violates the contract.
    Malformed(MalformedDirective),
}

/// Interpret a completion value.
///
/// `None` (no completion value) and every non-object value decode to
/// [`Decoded::PlainData`]. Sibling keys next to the directive field are
/// ignored.
pub fn decode(completion_value: Option<&Value>) -> Decoded {
    let Some(Value::Object(obj)) = completion_value else {
        return Decoded::PlainData;
    };
    let Some(payload) = obj.get(DIRECTIVE_KEY) else {
        return Decoded::PlainData;
    };
    match decode_payload(payload) {
        Ok(directive) => Decoded::Directive(directive),
        Err(reason) => Decoded::Malformed(reason),
    }
}

fn decode_payload(payload: &Value) -> Result<Directive, MalformedDirective> {
    let call = payload.as_object().ok_or(MalformedDirective::NotAnObject)?;

    let tool = match call.get("tool") {
        None | Some(Value::Null) => return Err(MalformedDirective::MissingTool),
        Some(Value::String(s)) => s,
        Some(_) => return Err(MalformedDirective::ToolNotAString),
    };
    if tool.trim().is_empty() {
        return Err(MalformedDirective::EmptyTool);
    }

    let arguments = match call.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => return Err(MalformedDirective::ArgumentsNotAnObject),
    };

    Ok(Directive {
        operation_name: tool.clone(),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_name_directive_decodes() {
        let v = json!({"mcp_call": {"tool": "hello_name", "arguments": {"name": "X"}}});
        let Decoded::Directive(d) = decode(Some(&v)) else {
            panic!("expected a directive");
        };
        assert_eq!(d.operation_name, "hello_name");
        assert_eq!(Value::Object(d.arguments), json!({"name": "X"}));
    }

    #[test]
    fn absent_value_is_plain_data() {
        assert_eq!(decode(None), Decoded::PlainData);
    }

    #[test]
    fn primitives_and_arrays_are_plain_data() {
        for v in [
            json!(null),
            json!(42),
            json!("mcp_call"),
            json!(true),
            json!([{"mcp_call": {"tool": "x"}}]),
        ] {
            assert_eq!(decode(Some(&v)), Decoded::PlainData, "value: {v}");
        }
    }

    #[test]
    fn object_without_key_is_plain_data() {
        let v = json!({"answer": 42, "call": {"tool": "hello_name"}});
        assert_eq!(decode(Some(&v)), Decoded::PlainData);
    }

    #[test]
    fn empty_directive_is_malformed() {
        let v = json!({"mcp_call": {}});
        assert_eq!(
            decode(Some(&v)),
            Decoded::Malformed(MalformedDirective::MissingTool)
        );
    }

    #[test]
    fn non_object_directive_is_malformed() {
        for v in [
            json!({"mcp_call": "hello_name"}),
            json!({"mcp_call": null}),
            json!({"mcp_call": ["hello_name"]}),
        ] {
            assert_eq!(
                decode(Some(&v)),
                Decoded::Malformed(MalformedDirective::NotAnObject),
                "value: {v}"
            );
        }
    }

    #[test]
    fn tool_must_be_non_empty_string() {
        let v = json!({"mcp_call": {"tool": 7}});
        assert_eq!(
            decode(Some(&v)),
            Decoded::Malformed(MalformedDirective::ToolNotAString)
        );
        let v = json!({"mcp_call": {"tool": "  "}});
        assert_eq!(
            decode(Some(&v)),
            Decoded::Malformed(MalformedDirective::EmptyTool)
        );
    }

    #[test]
    fn missing_or_null_arguments_become_empty() {
        for v in [
            json!({"mcp_call": {"tool": "choose_action"}}),
            json!({"mcp_call": {"tool": "choose_action", "arguments": null}}),
        ] {
            let Decoded::Directive(d) = decode(Some(&v)) else {
                panic!("expected a directive for {v}");
            };
            assert!(d.arguments.is_empty());
        }
    }

    #[test]
    fn non_object_arguments_are_malformed() {
        let v = json!({"mcp_call": {"tool": "hello_name", "arguments": ["X"]}});
        assert_eq!(
            decode(Some(&v)),
            Decoded::Malformed(MalformedDirective::ArgumentsNotAnObject)
        );
    }

    #[test]
    fn sibling_keys_are_ignored() {
        let v = json!({"note": "hi", "mcp_call": {"tool": "hello_name"}});
        assert!(matches!(decode(Some(&v)), Decoded::Directive(_)));
    }

    #[test]
    fn decode_is_idempotent() {
        for v in [
            json!({"mcp_call": {"tool": "hello_name", "arguments": {"name": "X"}}}),
            json!({"mcp_call": {}}),
            json!({"data": 1}),
        ] {
            assert_eq!(decode(Some(&v)), decode(Some(&v)));
        }
    }

    #[test]
    fn malformed_reason_messages_name_the_key() {
        assert_eq!(
            MalformedDirective::MissingTool.to_string(),
            "'mcp_call.tool' is missing"
        );
    }
}
