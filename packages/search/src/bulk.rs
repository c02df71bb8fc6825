//! Newline-delimited bulk payloads.
//!
//! Every record is two lines: an action-metadata line
//! `{"index":{"_id":"<id>"}}` followed by the JSON document, each
//! terminated by `\n`.

use serde::Serialize;

/// A pre-serialized bulk request body.
#[derive(Debug, Clone)]
pub struct BulkBuffer {
    source: String,
    records: usize,
    body: Vec<u8>,
}

#[derive(Serialize)]
struct IndexAction<'a> {
    index: IndexTarget<'a>,
}

#[derive(Serialize)]
struct IndexTarget<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
}

impl BulkBuffer {
    /// Creates an empty buffer. `source` names the producer in logs and
    /// errors (e.g. `"ways"`).
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            records: 0,
            body: Vec::new(),
        }
    }

    /// Appends one `index` operation for `document` under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `document` cannot be serialized.
    pub fn push<T: Serialize>(&mut self, id: &str, document: &T) -> Result<(), serde_json::Error> {
        let start = self.body.len();

        let result = serde_json::to_writer(
            &mut self.body,
            &IndexAction {
                index: IndexTarget { id },
            },
        )
        .and_then(|()| {
            self.body.push(b'\n');
            serde_json::to_writer(&mut self.body, document)
        });

        if let Err(e) = result {
            self.body.truncate(start);
            return Err(e);
        }

        self.body.push(b'\n');
        self.records += 1;
        Ok(())
    }

    /// Name of the producer.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of records in the buffer.
    #[must_use]
    pub const fn records(&self) -> usize {
        self.records
    }

    /// Whether the buffer holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// The serialized request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn writes_metadata_and_document_lines() {
        let mut buffer = BulkBuffer::new("nodes");
        buffer.push("42", &json!({"street": "Манаса"})).unwrap();
        buffer.push("43", &json!({"street": "Чуй"})).unwrap();

        let text = std::str::from_utf8(buffer.body()).unwrap();
        assert_eq!(
            text,
            "{\"index\":{\"_id\":\"42\"}}\n{\"street\":\"Манаса\"}\n\
             {\"index\":{\"_id\":\"43\"}}\n{\"street\":\"Чуй\"}\n"
        );
        assert_eq!(buffer.records(), 2);
        assert_eq!(buffer.source(), "nodes");
    }

    #[test]
    fn empty_buffer_has_no_body() {
        let buffer = BulkBuffer::new("ways");
        assert!(buffer.is_empty());
        assert!(buffer.body().is_empty());
    }
}
