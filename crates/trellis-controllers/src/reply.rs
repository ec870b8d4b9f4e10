//! What a controller method returns.

use bytes::Bytes;
use serde_json::Value;
use trellis_http::Response;

/// Output of a controller method.
///
/// Mappings and lists go through the negotiated rendering engine. Strings,
/// scalars and bytes become the body verbatim. A [`Response`] is returned as
/// is.
#[derive(Debug, Clone)]
pub enum Reply {
	Value(Value),
	Bytes(Bytes),
	Response(Response),
}

impl Reply {
	/// Empty output.
	pub fn empty() -> Self {
		Reply::Value(Value::Null)
	}

	pub fn as_object_mut(&mut self) -> Option<&mut serde_json::Map<String, Value>> {
		match self {
			Reply::Value(Value::Object(map)) => Some(map),
			_ => None,
		}
	}
}

impl From<Value> for Reply {
	fn from(value: Value) -> Self {
		Reply::Value(value)
	}
}

impl From<&str> for Reply {
	fn from(text: &str) -> Self {
		Reply::Value(Value::String(text.to_string()))
	}
}

impl From<String> for Reply {
	fn from(text: String) -> Self {
		Reply::Value(Value::String(text))
	}
}

impl From<Bytes> for Reply {
	fn from(bytes: Bytes) -> Self {
		Reply::Bytes(bytes)
	}
}

impl From<Vec<u8>> for Reply {
	fn from(bytes: Vec<u8>) -> Self {
		Reply::Bytes(Bytes::from(bytes))
	}
}

impl From<Response> for Reply {
	fn from(response: Response) -> Self {
		Reply::Response(response)
	}
}
