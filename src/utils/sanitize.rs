use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Parses a form-encoded body into a JSON object and sanitizes it.
pub fn sanitize_form(body: &[u8]) -> Value {
    let map = url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect::<serde_json::Map<_, _>>();
    sanitize_json(&Value::Object(map))
}

fn is_sensitive_field(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|ch| *ch != '_' && *ch != '-')
        .collect::<String>()
        .to_lowercase();
    matches!(
        normalized.as_str(),
        "hash"
            | "hashcheck"
            | "apikey"
            | "privatekey"
            | "password"
            | "secret"
            | "token"
            | "authorization"
            | "maskedaccountnumber"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.len() > 8 && s.is_ascii() => {
            let visible = &s[..4];
            let end = &s[s.len() - 4..];
            Value::String(format!("{}****{}", visible, end))
        }
        _ => Value::String("****".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_hash_fields() {
        let input = json!({
            "Hash": "9ac15f86f5d24c5e25fb77f0111da14a",
            "hashCheck": "abcdef0123456789",
            "Amount": "103.00"
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["Hash"], "9ac1****a14a");
        assert!(sanitized["hashCheck"].as_str().unwrap().contains("****"));
        assert_eq!(sanitized["Amount"], "103.00");
    }

    #[test]
    fn test_sanitize_nested() {
        let input = json!({
            "gateway": {
                "api_key": "live_key_123456",
                "siteCode": "TSTSTE0001"
            }
        });

        let sanitized = sanitize_json(&input);
        assert!(sanitized["gateway"]["api_key"].as_str().unwrap().contains("****"));
        assert_eq!(sanitized["gateway"]["siteCode"], "TSTSTE0001");
    }

    #[test]
    fn test_sanitize_form_body() {
        let sanitized = sanitize_form(b"TransactionId=gw-1&Hash=00ff00ff00ff00ff&MaskedAccountNumber=1234");
        assert_eq!(sanitized["TransactionId"], "gw-1");
        assert!(sanitized["Hash"].as_str().unwrap().contains("****"));
        assert_eq!(sanitized["MaskedAccountNumber"], "****");
    }
}
