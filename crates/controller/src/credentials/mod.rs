//! # Credentials Transformer
//!
//! Pure functions turning opaque broker credentials into secret payloads.
//!
//! - raw credentials secret: one `credentials` key holding the JSON object
//! - normalized binding secret: one key per credential, in servicebinding.io form
//!
//! Output maps are `BTreeMap`s, so re-deriving from the same input is byte-identical.

use crate::osbapi::JsonObject;
use crate::store::SecretData;
use serde_json::Value;
use thiserror::Error;

/// Key of the raw credentials secret
pub const CREDENTIALS_KEY: &str = "credentials";
/// Key of a parameters secret
pub const PARAMETERS_KEY: &str = "parameters";
/// Credential naming the binding type
pub const TYPE_KEY: &str = "type";
pub const BINDING_TYPE_PREFIX: &str = "servicebinding.io/";
pub const DEFAULT_BINDING_TYPE: &str = "user-provided";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("secret has no {key:?} key")]
    MissingKey { key: &'static str },
    #[error("{key:?} does not hold a JSON object: {reason}")]
    Malformed { key: &'static str, reason: String },
}

/// Parse the `credentials` key of a secret
///
/// # Errors
///
/// `MissingKey` if absent, `Malformed` if not a JSON object.
pub fn get_credentials(data: &SecretData) -> Result<JsonObject, CredentialsError> {
    json_object(data, CREDENTIALS_KEY)
}

/// Parse the `parameters` key of a secret
///
/// # Errors
///
/// `MissingKey` if absent, `Malformed` if not a JSON object.
pub fn get_parameters(data: &SecretData) -> Result<JsonObject, CredentialsError> {
    json_object(data, PARAMETERS_KEY)
}

fn json_object(data: &SecretData, key: &'static str) -> Result<JsonObject, CredentialsError> {
    let raw = data.get(key).ok_or(CredentialsError::MissingKey { key })?;
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CredentialsError::Malformed {
            key,
            reason: format!("found {}", json_kind(&other)),
        }),
        Err(e) => Err(CredentialsError::Malformed {
            key,
            reason: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Secret type for the normalized binding secret
///
/// `servicebinding.io/<type>` when the broker supplied a string `type`,
/// `servicebinding.io/user-provided` otherwise.
pub fn binding_secret_type(credentials: &JsonObject) -> String {
    let binding_type = credentials
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_BINDING_TYPE);
    format!("{BINDING_TYPE_PREFIX}{binding_type}")
}

/// Secret type for the normalized binding secret of a raw credentials secret
///
/// # Errors
///
/// Fails if the secret's `credentials` key is absent or unparsable.
pub fn get_binding_secret_type(data: &SecretData) -> Result<String, CredentialsError> {
    get_credentials(data).map(|c| binding_secret_type(&c))
}

/// Flatten credentials into secret data
///
/// Strings pass through verbatim, every other value is serialized as JSON.
/// A `type` entry is injected as `user-provided` when absent.
pub fn to_normalized_secret_data(credentials: &JsonObject) -> SecretData {
    let mut data: SecretData = credentials
        .iter()
        .map(|(key, value)| {
            let bytes = match value {
                Value::String(s) => s.clone().into_bytes(),
                other => other.to_string().into_bytes(),
            };
            (key.clone(), bytes)
        })
        .collect();
    data.entry(TYPE_KEY.to_owned())
        .or_insert_with(|| DEFAULT_BINDING_TYPE.as_bytes().to_vec());
    data
}

/// Raw credentials secret payload: the whole object under `credentials`
pub fn to_credentials_secret_data(credentials: &JsonObject) -> SecretData {
    let mut data = SecretData::new();
    data.insert(
        CREDENTIALS_KEY.to_owned(),
        Value::Object(credentials.clone()).to_string().into_bytes(),
    );
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn as_strings(data: &SecretData) -> Vec<(String, String)> {
        data.iter()
            .map(|(k, v)| (k.clone(), String::from_utf8(v.clone()).unwrap()))
            .collect()
    }

    #[test]
    fn nested_values_are_serialized_and_type_is_injected() {
        let data = to_normalized_secret_data(&object(json!({"object": {"a": "b"}})));
        assert_eq!(
            as_strings(&data),
            vec![
                ("object".to_owned(), r#"{"a":"b"}"#.to_owned()),
                ("type".to_owned(), "user-provided".to_owned()),
            ]
        );
    }

    #[test]
    fn strings_pass_through_verbatim() {
        let data = to_normalized_secret_data(&object(json!({
            "uri": "postgres://u:p@host/db",
            "port": 5432,
            "tls": true,
            "hosts": ["a", "b"],
            "type": "postgresql"
        })));
        let strings: std::collections::BTreeMap<_, _> = as_strings(&data).into_iter().collect();
        assert_eq!(strings["uri"], "postgres://u:p@host/db");
        assert_eq!(strings["port"], "5432");
        assert_eq!(strings["tls"], "true");
        assert_eq!(strings["hosts"], r#"["a","b"]"#);
        assert_eq!(strings["type"], "postgresql");
    }

    #[test]
    fn normalization_is_deterministic() {
        let creds = object(json!({"z": 1, "a": {"y": [1, 2], "b": null}, "m": "s"}));
        assert_eq!(to_normalized_secret_data(&creds), to_normalized_secret_data(&creds));
    }

    #[test]
    fn binding_type_from_credentials() {
        assert_eq!(
            binding_secret_type(&object(json!({"type": "mysql"}))),
            "servicebinding.io/mysql"
        );
        assert_eq!(
            binding_secret_type(&object(json!({"user": "x"}))),
            "servicebinding.io/user-provided"
        );
        assert_eq!(
            binding_secret_type(&object(json!({"type": 7}))),
            "servicebinding.io/user-provided"
        );
    }

    #[test]
    fn credentials_round_trip_through_raw_secret() {
        let creds = object(json!({"password": "s3cret", "type": "redis"}));
        let raw = to_credentials_secret_data(&creds);
        assert_eq!(get_credentials(&raw).unwrap(), creds);
        assert_eq!(get_binding_secret_type(&raw).unwrap(), "servicebinding.io/redis");
    }

    #[test]
    fn missing_credentials_key() {
        assert_eq!(
            get_credentials(&SecretData::new()).unwrap_err(),
            CredentialsError::MissingKey { key: "credentials" }
        );
    }

    #[test]
    fn non_object_credentials_are_malformed() {
        let mut data = SecretData::new();
        data.insert(CREDENTIALS_KEY.into(), b"[1,2]".to_vec());
        let err = get_credentials(&data).unwrap_err();
        assert!(matches!(err, CredentialsError::Malformed { key: "credentials", .. }));
        assert!(err.to_string().contains("an array"));

        data.insert(CREDENTIALS_KEY.into(), b"{not json".to_vec());
        assert!(matches!(
            get_credentials(&data).unwrap_err(),
            CredentialsError::Malformed { .. }
        ));
    }

    #[test]
    fn parameters_are_read_from_their_own_key() {
        let mut data = SecretData::new();
        data.insert(PARAMETERS_KEY.into(), br#"{"size":"large"}"#.to_vec());
        assert_eq!(get_parameters(&data).unwrap()["size"], "large");
    }
}
