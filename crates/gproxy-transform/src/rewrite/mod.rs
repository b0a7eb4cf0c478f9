//! SSE-aware stream rewriter (spec §4.4): rewrites `model` fields and
//! strips Anthropic "thinking" blocks mid-stream while tolerating chunk
//! fragmentation across network reads. Single-owner per stream — a
//! `StreamRewriter` carries buffering state and must not be shared across
//! concurrent consumers of the same upstream stream.

use std::collections::HashSet;

use serde_json::Value;

use crate::thinking::json_path;

/// Design bound from spec §4.4: caps how much unresolved tail we'll hold
/// onto waiting for the rest of an event, so a malformed or infinite
/// upstream can't grow `pending` without limit.
const MAX_PENDING_BYTES: usize = 1024 * 1024;

const MODEL_FIELD_PATHS: &[&str] = &[
    "model",
    "modelVersion",
    "response.model",
    "response.modelVersion",
    "message.model",
];

#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// When set, replaces the enumerated `model*` fields in every `data:`
    /// payload with this value.
    pub rewrite_model: Option<String>,
    /// When true, drops Anthropic "thinking" content-block events entirely.
    pub strip_thinking: bool,
}

pub struct StreamRewriter {
    opts: RewriteOptions,
    pending: Vec<u8>,
    thinking_block_indexes: HashSet<i64>,
}

impl StreamRewriter {
    pub fn new(opts: RewriteOptions) -> Self {
        StreamRewriter {
            opts,
            pending: Vec::new(),
            thinking_block_indexes: HashSet::new(),
        }
    }

    /// Feeds one chunk of raw SSE bytes and returns the rewritten bytes
    /// ready to forward to the client. May return an empty vec when the
    /// chunk didn't complete an event and was fully buffered.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let Some(boundary_end) = last_event_boundary(&buf) else {
            if buf.len() > MAX_PENDING_BYTES {
                // Can't safely hold an unbounded tail waiting for a boundary
                // that never arrives; flush it through unrewritten rather
                // than grow forever.
                return buf;
            }
            self.pending = buf;
            return Vec::new();
        };

        let (process_region, remainder): (Vec<u8>, Vec<u8>) = {
            let (prefix, tail) = buf.split_at(boundary_end);
            if tail == b"\n" {
                (buf.clone(), Vec::new())
            } else {
                (prefix.to_vec(), tail.to_vec())
            }
        };

        let (output, unconsumed_tail) = self.rewrite_events(&process_region);
        let mut new_pending = unconsumed_tail;
        new_pending.extend_from_slice(&remainder);
        self.pending = new_pending;
        output
    }

    /// Splits `region` into `\n\n`-delimited events and rewrites each one.
    /// Returns `(rewritten_bytes, unconsumed_suffix)` — the suffix is
    /// non-empty only when an event's `data:` payload failed to parse as
    /// JSON (a chunk boundary landed mid-object), in which case that event
    /// and everything after it in this region is re-buffered whole.
    fn rewrite_events(&mut self, region: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut out = Vec::new();
        let mut cursor = 0usize;
        while cursor < region.len() {
            let rest = &region[cursor..];
            let Some(end) = find_subslice(rest, b"\n\n") else {
                // Trailing partial event with no terminator in this region.
                return (out, region[cursor..].to_vec());
            };
            let event_bytes = &rest[..end];
            match self.rewrite_one_event(event_bytes) {
                Some(rewritten) => {
                    out.extend_from_slice(&rewritten);
                }
                None => {
                    // Invalid/incomplete JSON: re-buffer this event and
                    // everything remaining in the region, in order.
                    return (out, region[cursor..].to_vec());
                }
            }
            cursor += end + 2;
        }
        (out, Vec::new())
    }

    /// Rewrites a single event's raw bytes (without the trailing `\n\n`).
    /// Returns `None` when the event's `data:` line is present but not yet
    /// valid JSON (ask the caller to re-buffer); returns `Some(vec![])`
    /// when the event is intentionally dropped (a stripped thinking event
    /// or a blank line).
    fn rewrite_one_event(&mut self, event_bytes: &[u8]) -> Option<Vec<u8>> {
        let text = String::from_utf8_lossy(event_bytes);
        let mut event_name: Option<String> = None;
        let mut data_line: Option<&str> = None;
        for line in text.split('\n') {
            if let Some(rest) = line.strip_prefix("event:") {
                event_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_line = Some(rest.trim());
            }
        }

        let Some(data) = data_line else {
            // No data line at all (blank keep-alive, or comment) — pass
            // through verbatim.
            let mut out = event_bytes.to_vec();
            out.extend_from_slice(b"\n\n");
            return Some(out);
        };

        if data.is_empty() {
            let mut out = event_bytes.to_vec();
            out.extend_from_slice(b"\n\n");
            return Some(out);
        }

        let mut value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => return None,
        };

        if self.opts.strip_thinking && self.is_thinking_event(&value) {
            return Some(Vec::new());
        }

        if let Some(target) = &self.opts.rewrite_model {
            rewrite_model_fields(&mut value, target);
        }

        let mut out = Vec::new();
        if let Some(name) = &event_name {
            out.extend_from_slice(format!("event: {name}\n").as_bytes());
        }
        out.extend_from_slice(b"data: ");
        out.extend_from_slice(serde_json::to_string(&value).unwrap_or_default().as_bytes());
        out.extend_from_slice(b"\n\n");
        Some(out)
    }

    /// Classifies and tracks Anthropic Messages streaming "thinking" block
    /// events (spec §4.4 step 4).
    fn is_thinking_event(&mut self, value: &Value) -> bool {
        let ty = value.get("type").and_then(Value::as_str).unwrap_or("");
        match ty {
            "content_block_start" => {
                let is_thinking = value
                    .get("content_block")
                    .and_then(|b| b.get("type"))
                    .and_then(Value::as_str)
                    == Some("thinking");
                if is_thinking {
                    if let Some(index) = value.get("index").and_then(Value::as_i64) {
                        self.thinking_block_indexes.insert(index);
                    }
                    return true;
                }
                false
            }
            "content_block_delta" => {
                let index = value.get("index").and_then(Value::as_i64);
                let tracked = index.is_some_and(|i| self.thinking_block_indexes.contains(&i));
                let delta_type = value
                    .get("delta")
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str);
                tracked || matches!(delta_type, Some("thinking_delta") | Some("signature_delta"))
            }
            "content_block_stop" => {
                if let Some(index) = value.get("index").and_then(Value::as_i64)
                    && self.thinking_block_indexes.remove(&index)
                {
                    return true;
                }
                false
            }
            _ => false,
        }
    }
}

fn rewrite_model_fields(value: &mut Value, target: &str) {
    for path in MODEL_FIELD_PATHS {
        if json_path::get(value, path).is_some() {
            json_path::set(value, path, Value::String(target.to_string()));
        }
    }
}

fn last_event_boundary(buf: &[u8]) -> Option<usize> {
    find_last_subslice(buf, b"\n\n").map(|idx| idx + 2)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn find_last_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Non-stream companion: removes `content[].type == "thinking"` entries
/// from a parsed Anthropic Messages response body.
pub fn strip_thinking_blocks_from_response(value: &mut Value) {
    if let Some(content) = value.get_mut("content").and_then(Value::as_array_mut) {
        content.retain(|block| block.get("type").and_then(Value::as_str) != Some("thinking"));
    }
}

/// Replaces the enumerated `model*` fields in a parsed, non-stream response
/// body. Companion to the stream path's per-chunk rewrite.
pub fn rewrite_model_in_response(value: &mut Value, target: &str) {
    rewrite_model_fields(value, target);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: Option<&str>, data: &str) -> String {
        match name {
            Some(n) => format!("event: {n}\ndata: {data}\n\n"),
            None => format!("data: {data}\n\n"),
        }
    }

    #[test]
    fn strips_thinking_block_but_keeps_text_block() {
        let mut rewriter = StreamRewriter::new(RewriteOptions {
            rewrite_model: None,
            strip_thinking: true,
        });
        let input = concat!(
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        );
        let out = rewriter.process_chunk(input.as_bytes());
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("\"index\":1"));
        assert!(out.contains("\"text\""));
        assert!(!out.contains("\"index\":0"));
        assert!(!out.contains("thinking"));
    }

    #[test]
    fn drops_thinking_deltas_and_stop_between_start_and_stop() {
        let mut rewriter = StreamRewriter::new(RewriteOptions {
            rewrite_model: None,
            strip_thinking: true,
        });
        let input = concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hm\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"text\"}}\n\n",
        );
        let out = rewriter.process_chunk(input.as_bytes());
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("\"type\":\"content_block").count(), 1);
        assert!(out.contains("\"index\":1"));
    }

    #[test]
    fn rewrites_model_fields_only_when_present() {
        let mut rewriter = StreamRewriter::new(RewriteOptions {
            rewrite_model: Some("alias-name".to_string()),
            strip_thinking: false,
        });
        let input = event(None, r#"{"model":"upstream-model","response":{"model":"upstream-model"}}"#);
        let out = rewriter.process_chunk(input.as_bytes());
        let v: Value = serde_json::from_slice(
            &out[out.windows(6).position(|w| w == b"data: ").unwrap() + 6..],
        )
        .unwrap();
        assert_eq!(v["model"], "alias-name");
        assert_eq!(v["response"]["model"], "alias-name");
    }

    #[test]
    fn buffers_incomplete_event_across_chunks() {
        let mut rewriter = StreamRewriter::new(RewriteOptions::default());
        let part1 = b"data: {\"type\":\"mess";
        let part2 = b"age_start\"}\n\n";
        let out1 = rewriter.process_chunk(part1);
        assert!(out1.is_empty());
        let out2 = rewriter.process_chunk(part2);
        let text = String::from_utf8(out2).unwrap();
        assert!(text.contains("message_start"));
    }

    #[test]
    fn passes_through_non_json_or_blank_events_unchanged() {
        let mut rewriter = StreamRewriter::new(RewriteOptions::default());
        let input = "event: ping\ndata: \n\n";
        let out = rewriter.process_chunk(input.as_bytes());
        assert_eq!(String::from_utf8(out).unwrap(), input);
    }

    #[test]
    fn strip_thinking_blocks_from_response_preserves_other_blocks() {
        let mut body = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "scratch"},
                {"type": "text", "text": "answer"}
            ]
        });
        strip_thinking_blocks_from_response(&mut body);
        assert_eq!(body["content"].as_array().unwrap().len(), 1);
        assert_eq!(body["content"][0]["type"], "text");
    }
}
