use serde_json::Value;

const MESSAGE_KEYS: [&str; 3] = ["Message", "message", "error"];
const PLAIN_PREFIXES: [&str; 3] = ["External API error:", "Server error:", "Errors occurred:"];
const FALLBACK_MESSAGE: &str = "request failed";

/// Turns a raw backend error payload into a message fit for the user.
///
/// The innermost `Message`/`message`/`error` field of any embedded JSON wins;
/// boilerplate prefixes are stripped from whatever text remains.
pub fn normalize_error_message(raw: &str) -> String {
    if let Some(message) = extract_message(raw) {
        let stripped = strip_prefixes(&message);
        if !stripped.is_empty() {
            return stripped;
        }
    }

    let prose = match first_json_value(raw) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    };
    let stripped = strip_prefixes(prose);
    let stripped = stripped.trim_end_matches(':').trim();
    if stripped.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        stripped.to_string()
    }
}

fn extract_message(text: &str) -> Option<String> {
    let (_, value) = first_json_value(text)?;
    message_from_value(&value)
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => MESSAGE_KEYS.iter().find_map(|key| {
            let inner = map.get(*key)?;
            match inner {
                Value::String(text) => extract_message(text).or_else(|| Some(text.clone())),
                Value::Object(_) => message_from_value(inner),
                Value::Array(items) => items.iter().find_map(message_from_value),
                _ => None,
            }
        }),
        Value::Array(items) => items.iter().find_map(message_from_value),
        Value::String(text) => extract_message(text),
        _ => None,
    }
}

/// Finds the first JSON object or array embedded in prose, ignoring trailing text.
fn first_json_value(text: &str) -> Option<(usize, Value)> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(idx, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value @ (Value::Object(_) | Value::Array(_)))) => Some((idx, value)),
                _ => None,
            }
        })
}

fn strip_prefixes(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let before = current;
        for prefix in PLAIN_PREFIXES {
            if let Some(rest) = strip_prefix_ignore_case(current, prefix) {
                current = rest.trim_start();
            }
        }
        if let Some(rest) = strip_client_error_prefix(current) {
            current = rest.trim_start();
        }
        if current == before {
            break;
        }
    }
    current.trim().trim_matches('"').trim().to_string()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Strips `Client error NNN:`.
fn strip_client_error_prefix(text: &str) -> Option<&str> {
    let rest = strip_prefix_ignore_case(text, "Client error")?.trim_start();
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    rest[digits..].trim_start().strip_prefix(':')
}
