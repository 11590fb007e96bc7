//! Renderer JSON IPC protocol types.
//!
//! Each request is one JSON object per line: `{"command": [...]}`.
//! Each reply is one JSON object per line and is recognized only if it
//! carries a `data` or `error` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// Global request ID counter for unique command identification.
static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

fn next_request_id() -> i64 {
  REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Command sent to the renderer via IPC.
#[derive(Debug, Clone, Serialize)]
pub struct IpcCommand {
  pub command: Vec<Value>,
  pub request_id: i64,
}

impl IpcCommand {
  /// Create a new command with auto-generated request ID.
  pub fn new(args: Vec<Value>) -> Self {
    Self {
      command: args,
      request_id: next_request_id(),
    }
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Set a property value.
  pub fn set_property(name: &str, value: Value) -> Self {
    Self::new(vec!["set_property".into(), name.into(), value])
  }

  /// Cycle (toggle) a property.
  pub fn cycle(property: &str) -> Self {
    Self::new(vec!["cycle".into(), property.into()])
  }

  /// Seek relative to the current position, in seconds.
  pub fn seek_relative(seconds: f64) -> Self {
    Self::new(vec!["seek".into(), seconds.into(), "relative".into()])
  }

  /// Add a signed step to a numeric property.
  pub fn add(property: &str, step: f64) -> Self {
    Self::new(vec!["add".into(), property.into(), step.into()])
  }
}

/// Reply from the renderer for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct IpcResponse {
  /// "success" or an error message.
  pub error: Option<String>,
  /// Reply data (command-specific).
  pub data: Option<Value>,
  #[allow(dead_code)]
  pub request_id: Option<i64>,
}

impl IpcResponse {
  /// Parse a line as a reply. Lines without `data` or `error` (events,
  /// partial output) are not replies.
  pub fn parse(line: &str) -> Option<Self> {
    let value: Value = serde_json::from_str(line).ok()?;
    let object = value.as_object()?;
    if !object.contains_key("data") && !object.contains_key("error") {
      return None;
    }
    serde_json::from_value(value).ok()
  }

  /// Check if the command succeeded.
  pub fn is_success(&self) -> bool {
    self.error.as_deref() == Some("success")
  }
}

/// Typed property values read back from the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
  Bool(bool),
  Number(f64),
  String(String),
  Null,
}

impl PropertyValue {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      PropertyValue::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      PropertyValue::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Bool(b) => PropertyValue::Bool(b),
      Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
      Value::String(s) => PropertyValue::String(s),
      _ => PropertyValue::Null,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn command_serialization() {
    let cmd = IpcCommand::get_property("time-pos");
    let json = serde_json::to_string(&cmd).unwrap();
    assert!(json.contains("get_property"));
    assert!(json.contains("time-pos"));
    assert!(json.contains("request_id"));
  }

  #[test]
  fn seek_is_relative() {
    let cmd = IpcCommand::seek_relative(-10.0);
    let json = serde_json::to_string(&cmd).unwrap();
    assert!(json.contains("\"seek\""));
    assert!(json.contains("relative"));
  }

  #[test]
  fn response_parsing() {
    let reply = IpcResponse::parse(r#"{"error":"success","data":12.5,"request_id":1}"#).unwrap();
    assert!(reply.is_success());
    assert_eq!(reply.data.as_ref().and_then(Value::as_f64), Some(12.5));
  }

  #[test]
  fn events_are_not_responses() {
    assert!(IpcResponse::parse(r#"{"event":"pause"}"#).is_none());
    assert!(IpcResponse::parse("not json").is_none());
  }

  #[test]
  fn property_value_accessors() {
    assert_eq!(PropertyValue::from(Value::from(42.0)).as_f64(), Some(42.0));
    assert_eq!(PropertyValue::from(Value::Bool(true)).as_bool(), Some(true));
    assert_eq!(PropertyValue::from(Value::Null).as_f64(), None);
  }
}
