use serde_json::Value;

const PREVIEW_MAX_CHARS: usize = 60;

fn truncate_preview(value: &str) -> String {
    if value.chars().count() <= PREVIEW_MAX_CHARS {
        return value.to_string();
    }
    let mut out: String = value.chars().take(PREVIEW_MAX_CHARS - 1).collect();
    out.push('…');
    out
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn non_empty<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn block_to_text(block: &Value) -> String {
    let Some(kind) = non_empty(block, "type") else {
        return pretty(block);
    };
    match kind {
        "text" => non_empty(block, "text").unwrap_or_default().to_string(),
        "resource_link" => {
            let title = non_empty(block, "title").or_else(|| non_empty(block, "name"));
            [title, non_empty(block, "uri")].into_iter().flatten().collect::<Vec<_>>().join("\n")
        }
        "resource" | "embedded_resource" => {
            let resource = block.get("resource").unwrap_or(&Value::Null);
            if let Some(text) = non_empty(resource, "text") {
                text.to_string()
            } else if let Some(blob) = non_empty(resource, "blob") {
                format!("[embedded resource blob: {} bytes]", blob.len())
            } else {
                non_empty(resource, "uri").unwrap_or_default().to_string()
            }
        }
        "image" | "audio" => {
            let mime = non_empty(block, "mimeType").unwrap_or_default();
            let size = block.get("data").and_then(Value::as_str).map_or(0, str::len);
            format!("[{kind} {mime} {size} bytes]")
        }
        _ => pretty(block),
    }
}

/// Flatten MCP tool-result content blocks into plain text separated by blank lines.
pub fn content_to_text(blocks: &[Value]) -> String {
    blocks
        .iter()
        .map(block_to_text)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Short preview of tool-call arguments for a collapsed card header.
pub fn args_preview(args: &Value) -> String {
    match args {
        Value::Null => String::new(),
        Value::Object(map) => {
            let mut values = map.values();
            match (values.next(), values.next()) {
                (None, _) => String::new(),
                (Some(single), None) if !single.is_object() && !single.is_array() => match single {
                    Value::String(s) => truncate_preview(&Value::String(s.clone()).to_string()),
                    other => other.to_string(),
                },
                _ => truncate_preview(&args.to_string()),
            }
        }
        Value::String(s) => truncate_preview(s),
        other => truncate_preview(&other.to_string()),
    }
}
