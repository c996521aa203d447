use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;

/// Immutable record of one completed prediction. Serialization skips the
/// owned JPEG bytes and exposes `image_url` instead.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub id: String,
    pub age: u32,
    pub confidence: f32,
    pub timestamp_ms: i64,
    pub image_url: String,
    #[serde(skip)]
    pub image: Bytes,
}

/// Receiver for completed predictions, invoked once per successful capture.
pub trait ResultSink: Send + Sync + 'static {
    fn on_result(&self, result: PredictionResult);
}

/// Append-only history of predictions; insertion order is display order.
#[derive(Default)]
pub struct ResultFeed {
    entries: RwLock<Vec<PredictionResult>>,
}

impl ResultFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, result: PredictionResult) {
        self.entries.write().push(result);
    }

    pub fn snapshot(&self) -> Vec<PredictionResult> {
        self.entries.read().clone()
    }

    pub fn image_for(&self, id: &str) -> Option<Bytes> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.image.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ResultSink for ResultFeed {
    fn on_result(&self, result: PredictionResult) {
        self.append(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, age: u32) -> PredictionResult {
        PredictionResult {
            id: id.to_string(),
            age,
            confidence: 0.9,
            timestamp_ms: 1_700_000_000_000,
            image_url: format!("/predictions/{id}/image"),
            image: Bytes::from_static(b"\xff\xd8jpeg"),
        }
    }

    #[test]
    fn append_preserves_insertion_order() {
        let feed = ResultFeed::new();
        feed.append(result("a", 30));
        feed.append(result("b", 45));
        feed.append(result("c", 61));

        let entries = feed.snapshot();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn image_lookup_by_id() {
        let feed = ResultFeed::new();
        feed.append(result("a", 30));

        assert_eq!(feed.image_for("a"), Some(Bytes::from_static(b"\xff\xd8jpeg")));
        assert_eq!(feed.image_for("missing"), None);
    }

    #[test]
    fn sink_appends_to_feed() {
        let feed = ResultFeed::new();
        feed.on_result(result("a", 30));

        assert_eq!(feed.len(), 1);
        assert!(!feed.is_empty());
    }
}
