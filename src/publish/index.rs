use std::{
    collections::{HashSet, VecDeque},
    io::SeekFrom,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use serde_json::{Map, Value, json};

use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter},
};

use crate::{error::ConsumerError, event::CosmicEvent, publish::Consumer};

/// Index schema, created once
pub const MAPPING_FILE: &str = "mapping.json";

/// One JSON document per line
pub const DOCUMENTS_FILE: &str = "events.jsonl";

/// Number of recent identifiers checked for duplicates
const RECENT_IDS: usize = 4096;

/// Only the tail of previous documents is scanned on startup
const TAIL_BYTES: u64 = 4 * 1024 * 1024;

/// Most recent identifiers, oldest evicted first.
/// Identifiers start with the capture time, so duplicates are always recent.
#[derive(Debug)]
struct Recent {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl Recent {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// [IndexSink] stores events as searchable JSON documents.
/// Documents are keyed by event id: a recent document is never indexed twice.
pub struct IndexSink {
    /// Index directory
    path: PathBuf,

    /// Documents handle
    fd: Option<BufWriter<File>>,

    /// Identifiers recently indexed
    indexed: Recent,
}

impl IndexSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fd: None,
            indexed: Recent::new(RECENT_IDS),
        }
    }

    /// Document mapping of the index
    pub fn mapping() -> Value {
        let orientation = json!({
            "properties": {
                "x": { "type": "double" },
                "y": { "type": "double" },
                "z": { "type": "double" }
            }
        });

        let values = (0..10)
            .map(|i| (format!("value{}", i), json!({ "type": "long" })))
            .collect::<Map<String, Value>>();

        let channel = json!({ "properties": values });

        json!({
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "gps": { "type": "text" },
                    "geoPoint": { "type": "geo_point" },
                    "timestamp": { "type": "date", "format": "epoch_millis" },
                    "fix": {
                        "properties": {
                            "timeOfDay": { "type": "double" },
                            "latitude": { "type": "double" },
                            "longitude": { "type": "double" },
                            "quality": { "type": "integer" },
                            "satellites": { "type": "integer" },
                            "horizontalAccuracy": { "type": "double" },
                            "altitude": { "type": "double" },
                            "geoidHeight": { "type": "double" },
                            "correctionAge": { "type": "double" },
                            "checksumValid": { "type": "boolean" }
                        }
                    },
                    "timing": { "type": "double" },
                    "energy": {
                        "properties": {
                            "energy1": { "type": "long" },
                            "energy2": { "type": "long" }
                        }
                    },
                    "channel1": channel.clone(),
                    "channel2": channel,
                    "altitude": { "type": "double" },
                    "humidity": { "type": "double" },
                    "gravitationalOrientation": orientation.clone(),
                    "magneticOrientation": orientation,
                    "temperature": {
                        "properties": {
                            "value1": { "type": "double" },
                            "value2": { "type": "double" }
                        }
                    },
                    "uptime": { "type": "double" }
                }
            }
        })
    }

    /// Creates the mapping, unless it already exists.
    async fn create_mapping(&self) -> Result<(), ConsumerError> {
        let path = self.path.join(MAPPING_FILE);

        if fs::try_exists(&path).await? {
            debug!("index - mapping {} exists", path.display());
            return Ok(());
        }

        // written aside then renamed: the mapping is never seen partially written
        let staging = self.path.join(format!("{}.part", MAPPING_FILE));
        fs::write(&staging, serde_json::to_vec_pretty(&Self::mapping())?).await?;
        fs::rename(&staging, &path).await?;

        info!("index - mapping {} created", path.display());
        Ok(())
    }

    /// Collects identifiers of the latest documents indexed by previous runs
    async fn load_indexed(&mut self) -> Result<(), ConsumerError> {
        let path = self.path.join(DOCUMENTS_FILE);

        if !fs::try_exists(&path).await? {
            return Ok(());
        }

        let mut fd = File::open(&path).await?;
        let offset = fd.metadata().await?.len().saturating_sub(TAIL_BYTES);
        fd.seek(SeekFrom::Start(offset)).await?;

        let mut lines = BufReader::new(fd).lines();

        // first line is partial
        if offset > 0 {
            lines.next_line().await?;
        }

        while let Some(line) = lines.next_line().await? {
            match serde_json::from_str::<Value>(&line) {
                Ok(document) => {
                    if let Some(id) = document.get("id").and_then(Value::as_str) {
                        self.indexed.insert(id);
                    }
                },
                Err(e) => warn!("index - corrupt document: {}", e),
            }
        }

        debug!("index - {} documents already indexed", self.indexed.len());
        Ok(())
    }

    async fn open_documents(&mut self) -> Result<(), ConsumerError> {
        let fd = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.join(DOCUMENTS_FILE))
            .await?;

        self.fd = Some(BufWriter::new(fd));
        Ok(())
    }

    async fn write_document(&mut self, document: &[u8]) -> Result<(), ConsumerError> {
        if self.fd.is_none() {
            self.open_documents().await?;
        }

        let fd = self.fd.as_mut().ok_or(ConsumerError::NotConnected)?;
        fd.write_all(document).await?;
        fd.flush().await?;
        Ok(())
    }
}

impl Consumer for IndexSink {
    fn name(&self) -> &str {
        "index"
    }

    async fn prepare(&mut self) -> Result<(), ConsumerError> {
        fs::create_dir_all(&self.path).await?;
        self.create_mapping().await?;

        if self.fd.is_none() {
            self.indexed.clear();
            self.load_indexed().await?;
            self.open_documents().await?;
        }
        Ok(())
    }

    async fn on_event(&mut self, event: &CosmicEvent) -> Result<(), ConsumerError> {
        if self.indexed.contains(&event.id) {
            debug!("index - event {} already indexed", event.id);
            return Ok(());
        }

        let mut document = serde_json::to_vec(event)?;
        document.push(b'\n');

        if let Err(e) = self.write_document(&document).await {
            // reopened on next event
            self.fd = None;
            return Err(e);
        }

        self.indexed.insert(&event.id);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{DOCUMENTS_FILE, IndexSink, MAPPING_FILE, Recent, TAIL_BYTES};
    use crate::{event::fixture, publish::Consumer};

    use serde_json::Value;

    fn workspace(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("cosmicpi-index-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        path
    }

    fn documents(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path.join(DOCUMENTS_FILE))
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn duplicates_are_not_indexed_twice() {
        let path = workspace("duplicates");
        let events = fixture(2);

        let mut sink = IndexSink::new(&path);
        sink.prepare().await.unwrap();

        sink.on_event(&events[0]).await.unwrap();
        sink.on_event(&events[1]).await.unwrap();
        sink.on_event(&events[0]).await.unwrap();

        let docs = documents(&path);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["id"], events[0].id.as_str());
        assert_eq!(docs[1]["id"], events[1].id.as_str());
        assert_eq!(docs[1]["channel1"]["value0"], 1);

        // a new instance knows what previous runs indexed
        drop(sink);
        let mut sink = IndexSink::new(&path);
        sink.prepare().await.unwrap();
        sink.on_event(&events[1]).await.unwrap();
        assert_eq!(documents(&path).len(), 2);

        let _ = std::fs::remove_dir_all(&path);
    }

    #[tokio::test]
    async fn mapping_is_created_once() {
        let path = workspace("mapping");

        let mut sink = IndexSink::new(&path);
        sink.prepare().await.unwrap();

        let mapping: Value =
            serde_json::from_str(&std::fs::read_to_string(path.join(MAPPING_FILE)).unwrap())
                .unwrap();
        assert_eq!(
            mapping["mappings"]["properties"]["geoPoint"]["type"],
            "geo_point"
        );
        assert_eq!(
            mapping["mappings"]["properties"]["channel2"]["properties"]["value9"]["type"],
            "long"
        );

        // existing mappings are left untouched
        std::fs::write(path.join(MAPPING_FILE), "{}").unwrap();
        sink.prepare().await.unwrap();
        IndexSink::new(&path).prepare().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path.join(MAPPING_FILE)).unwrap(),
            "{}"
        );

        let _ = std::fs::remove_dir_all(&path);
    }

    #[test]
    fn recent_identifiers_are_bounded() {
        let mut recent = Recent::new(2);
        for id in ["a", "b", "b", "c"] {
            recent.insert(id);
        }
        assert_eq!(recent.len(), 2);
        assert!(!recent.contains("a"));
        assert!(recent.contains("b"));
        assert!(recent.contains("c"));
    }

    #[tokio::test]
    async fn only_latest_documents_are_reloaded() {
        let path = workspace("tail");
        std::fs::create_dir_all(&path).unwrap();

        let events = fixture(2);

        // an old document, followed by enough padding to fall out of the scanned tail
        let mut content = serde_json::to_string(&events[0]).unwrap();
        content.push('\n');
        let padding = format!("{{\"pad\":\"{}\"}}\n", "x".repeat(1024));
        while (content.len() as u64) < TAIL_BYTES + 4096 {
            content.push_str(&padding);
        }
        content.push_str(&serde_json::to_string(&events[1]).unwrap());
        content.push('\n');
        std::fs::write(path.join(DOCUMENTS_FILE), content).unwrap();

        let mut sink = IndexSink::new(&path);
        sink.prepare().await.unwrap();
        assert!(sink.indexed.contains(&events[1].id));
        assert!(!sink.indexed.contains(&events[0].id));

        let _ = std::fs::remove_dir_all(&path);
    }
}
