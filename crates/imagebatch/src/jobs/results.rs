// crates/imagebatch/src/jobs/results.rs

use serde_json::Value;
use std::io::BufRead;

/// What the vendor produced for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Base64 image payload, not yet decoded.
    Image(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub key: String,
    pub outcome: ItemOutcome,
}

/// Parse one line of the results artifact.
///
/// Returns `None` for lines that carry nothing usable: blank lines, lines
/// that are not JSON objects, and objects without a string `key`.
pub fn parse_line(line: &str) -> Option<ResultRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed result line");
            return None;
        }
    };

    let Some(key) = value.get("key").and_then(Value::as_str) else {
        tracing::warn!("skipping result line without key");
        return None;
    };

    Some(ResultRecord {
        key: key.to_string(),
        outcome: outcome_of(&value),
    })
}

fn outcome_of(value: &Value) -> ItemOutcome {
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("Unknown error");
        return ItemOutcome::Failed(msg.to_string());
    }

    let Some(parts) = value
        .pointer("/response/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return ItemOutcome::Failed("Invalid response format".to_string());
    };

    parts
        .iter()
        .find_map(|p| {
            p.pointer("/inlineData/data")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
        })
        .map(|d| ItemOutcome::Image(d.to_string()))
        .unwrap_or_else(|| ItemOutcome::Failed("No image data in response".to_string()))
}

/// Lazy iterator over the records of a results artifact.
///
/// Lines are read one at a time, so a results file with large inline
/// images is never held in memory all at once. Lines that are not valid
/// UTF-8 are skipped like any other malformed line; only I/O errors end
/// the iteration.
pub struct ResultRecords<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ResultRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for ResultRecords<R> {
    type Item = ResultRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => match std::str::from_utf8(&self.buf) {
                    Ok(line) => {
                        if let Some(rec) = parse_line(line) {
                            return Some(rec);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping result line that is not UTF-8"),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "stopped reading results");
                    return None;
                }
            }
        }
    }
}
