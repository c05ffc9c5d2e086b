use serde_json::Value;

/// A parsed Server-Sent Event.
#[derive(Debug)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: Option<Value>,
}

/// Parse a chunk of SSE text into events.
/// SSE events are separated by double newlines. Each event has optional `event:` and `data:` fields.
pub fn parse_sse_chunk(chunk: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut current_event_type: Option<String> = None;
    let mut current_data = String::new();

    for line in chunk.lines() {
        if line.is_empty() {
            // Empty line = end of event
            if !current_data.is_empty() {
                let data = current_data.trim().to_string();
                let parsed = if data == "[DONE]" {
                    None
                } else {
                    serde_json::from_str::<Value>(&data).ok()
                };
                events.push(SseEvent {
                    event_type: current_event_type.take(),
                    data: parsed,
                });
                current_data.clear();
            }
            current_event_type = None;
        } else if let Some(event_type) = line.strip_prefix("event: ") {
            current_event_type = Some(event_type.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data: ") {
            if !current_data.is_empty() {
                current_data.push('\n');
            }
            current_data.push_str(data);
        }
    }

    // Handle final event if chunk doesn't end with empty line
    if !current_data.is_empty() {
        let data = current_data.trim().to_string();
        let parsed = if data == "[DONE]" {
            None
        } else {
            serde_json::from_str::<Value>(&data).ok()
        };
        events.push(SseEvent {
            event_type: current_event_type,
            data: parsed,
        });
    }

    events
}
