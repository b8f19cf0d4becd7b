//! Catalog records, the in-memory store keyed by normalized identifier, and
//! CSV persistence.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, info};

use crate::error::CatalogError;

/// `type` column value for every record.
pub const MEDIA_TYPE: &str = "Image;MovingImage";

/// One catalog row per distinct video.
///
/// Field order is the CSV column order. `filename`, `location`, `latitude`,
/// `longitude` and `language` are reserved and always written empty.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CatalogRecord {
    #[serde(rename = "objectid")]
    pub object_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(rename = "youtubeid")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator: String,
    #[serde(rename = "date", default)]
    pub publish_date: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "subject", default)]
    pub subject_tags: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(rename = "source", default)]
    pub source_channel_url: String,
    pub identifier: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(rename = "format", default)]
    pub mime_type: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub rights: String,
    #[serde(rename = "rightsstatement", default)]
    pub rights_statement: String,
    /// Empty for rows written before addition dates were tracked.
    #[serde(rename = "additiondate", default)]
    pub addition_date: String,
}

/// Canonical watch URL for a video id.
pub fn watch_url_for(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Dedup key for catalog identifiers: `www.` host variants collapse together.
pub fn normalize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let (scheme, rest) = match trimmed.find("://") {
        Some(index) => trimmed.split_at(index + 3),
        None => ("", trimmed),
    };
    match rest.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => format!("{scheme}{}", &rest[4..]),
        _ => trimmed.to_string(),
    }
}

/// Ordered catalog with O(1) membership by normalized identifier.
#[derive(Debug, Default)]
pub struct CatalogStore {
    records: Vec<CatalogRecord>,
    index: HashMap<String, usize>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from rows in encounter order, keeping the first of any duplicates.
    pub fn from_records(records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            let identifier = record.identifier.clone();
            if !store.append(record) {
                debug!("Dropping duplicate catalog row for {identifier}");
            }
        }
        store
    }

    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.index.contains_key(&normalize_identifier(identifier))
    }

    /// Appends a new record. Returns `false` when its identifier is already present.
    pub fn append(&mut self, record: CatalogRecord) -> bool {
        let key = normalize_identifier(&record.identifier);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.records.len());
        self.records.push(record);
        true
    }

    pub fn get(&self, identifier: &str) -> Option<&CatalogRecord> {
        let position = *self.index.get(&normalize_identifier(identifier))?;
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Records in persisted order: normalized identifier descending, raw
    /// identifier breaking ties.
    pub fn sorted_records(&self) -> Vec<&CatalogRecord> {
        let mut keyed: Vec<(String, &CatalogRecord)> = self
            .records
            .iter()
            .map(|record| (normalize_identifier(&record.identifier), record))
            .collect();
        keyed.sort_by(|(left_key, left), (right_key, right)| {
            right_key
                .cmp(left_key)
                .then_with(|| right.identifier.cmp(&left.identifier))
        });
        keyed.into_iter().map(|(_, record)| record).collect()
    }
}

/// Reads the catalog file. A missing file is an empty catalog.
pub fn load_catalog(path: &Path) -> Result<CatalogStore, CatalogError> {
    if !path.exists() {
        info!("Catalog not found, starting empty. path={}", path.display());
        return Ok(CatalogStore::new());
    }

    let csv_error = |source| CatalogError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<CatalogRecord>() {
        rows.push(row.map_err(csv_error)?);
    }
    let row_count = rows.len();
    let store = CatalogStore::from_records(rows);
    info!(
        "Loaded catalog: {} rows, {} distinct. path={}",
        row_count,
        store.len(),
        path.display()
    );
    Ok(store)
}

/// Rewrites the catalog file atomically, sorted by identifier descending.
pub fn save_catalog(path: &Path, store: &CatalogStore) -> Result<(), CatalogError> {
    let io_error = |path: &Path, source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }

    let temp_path = path.with_extension("csv.tmp");
    {
        let csv_error = |source| CatalogError::Csv {
            path: temp_path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&temp_path).map_err(csv_error)?;
        for record in store.sorted_records() {
            writer.serialize(record).map_err(csv_error)?;
        }
        writer
            .flush()
            .map_err(|source| io_error(&temp_path, source))?;
    }
    fs::rename(&temp_path, path).map_err(|source| io_error(path, source))?;
    info!(
        "Saved catalog: {} rows. path={}",
        store.len(),
        path.display()
    );
    Ok(())
}

/// Exclusive hold on the catalog for one sync run.
///
/// Backed by an OS advisory lock on `<catalog stem>.lock`, so the kernel
/// releases it when the holder exits, however it exits. A lock file left on
/// disk by an interrupted run does not block the next one. The file holds the
/// owner's pid for operators.
#[derive(Debug)]
pub struct CatalogLock {
    path: PathBuf,
    file: fs::File,
}

impl CatalogLock {
    pub fn acquire(catalog_path: &Path) -> Result<Self, CatalogError> {
        let path = catalog_path.with_extension("lock");
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut file = match fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => return Err(CatalogError::Io { path, source }),
        };
        if let Err(error) = file.try_lock_exclusive() {
            if error.kind() == fs2::lock_contended_error().kind() {
                return Err(CatalogError::Locked { path });
            }
            return Err(CatalogError::Io {
                path,
                source: error,
            });
        }

        let owner = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()));
        if let Err(error) = owner {
            debug!("Failed to record lock owner in {}: {}", path.display(), error);
        }
        debug!("Catalog lock acquired. path={}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, identifier: &str) -> CatalogRecord {
    CatalogRecord {
        object_id: id.to_string(),
        filename: String::new(),
        id: id.to_string(),
        title: format!("Title {id}"),
        creator: "Archivo".to_string(),
        publish_date: "2023-03-09".to_string(),
        description: "line one\nline two, with comma".to_string(),
        subject_tags: "historia; archivo".to_string(),
        location: String::new(),
        latitude: String::new(),
        longitude: String::new(),
        source_channel_url: "https://www.youtube.com/channel/UC123".to_string(),
        identifier: identifier.to_string(),
        media_type: MEDIA_TYPE.to_string(),
        mime_type: "video/mp4".to_string(),
        language: String::new(),
        rights: "Licencia de YouTube estándar".to_string(),
        rights_statement: "https://www.youtube.com/static?template=terms".to_string(),
        addition_date: "2026-10-18".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        load_catalog, normalize_identifier, sample_record, save_catalog, watch_url_for,
        CatalogLock, CatalogStore,
    };
    use crate::error::CatalogError;
    use fs2::FileExt;

    #[test]
    fn test_normalize_identifier_strips_www_host_prefix() {
        assert_eq!(
            normalize_identifier("https://www.youtube.com/watch?v=abc"),
            "https://youtube.com/watch?v=abc"
        );
        assert_eq!(
            normalize_identifier("https://youtube.com/watch?v=abc"),
            "https://youtube.com/watch?v=abc"
        );
        assert_eq!(
            normalize_identifier("WWW.youtube.com/watch?v=abc"),
            "youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn test_store_collapses_www_variants_to_one_record() {
        let mut store = CatalogStore::new();
        assert!(store.append(sample_record("abc", &watch_url_for("abc"))));
        assert!(!store.append(sample_record("abc", "https://youtube.com/watch?v=abc")));
        assert_eq!(store.len(), 1);
        assert!(store.contains_identifier("https://youtube.com/watch?v=abc"));
        assert_eq!(
            store
                .get("https://youtube.com/watch?v=abc")
                .map(|record| record.identifier.as_str()),
            Some("https://www.youtube.com/watch?v=abc")
        );
    }

    #[test]
    fn test_from_records_keeps_first_duplicate() {
        let mut second = sample_record("abc", "https://youtube.com/watch?v=abc");
        second.title = "later".to_string();
        let store = CatalogStore::from_records(vec![
            sample_record("abc", &watch_url_for("abc")),
            second,
            sample_record("xyz", &watch_url_for("xyz")),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].title, "Title abc");
    }

    #[test]
    fn test_sorted_records_are_identifier_descending() {
        let store = CatalogStore::from_records(vec![
            sample_record("b", &watch_url_for("b")),
            sample_record("c", &watch_url_for("c")),
            sample_record("a", &watch_url_for("a")),
        ]);
        let ids: Vec<&str> = store
            .sorted_records()
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sorted_records_ignore_www_prefix_in_legacy_rows() {
        let store = CatalogStore::from_records(vec![
            sample_record("a", "https://youtube.com/watch?v=a"),
            sample_record("c", "https://www.youtube.com/watch?v=c"),
            sample_record("b", "https://youtube.com/watch?v=b"),
        ]);
        let ids: Vec<&str> = store
            .sorted_records()
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_load_catalog_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = load_catalog(&dir.path().join("data.csv")).expect("missing file is empty");
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_catalog_writes_columns_in_catalog_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("_data").join("data.csv");
        let store = CatalogStore::from_records(vec![
            sample_record("a", &watch_url_for("a")),
            sample_record("b", &watch_url_for("b")),
        ]);

        save_catalog(&path, &store).expect("catalog should save");

        let content = std::fs::read_to_string(&path).expect("catalog should be readable");
        let header = content.lines().next().expect("header row should exist");
        assert_eq!(
            header,
            "objectid,filename,youtubeid,title,creator,date,description,subject,location,\
             latitude,longitude,source,identifier,type,format,language,rights,\
             rightsstatement,additiondate"
        );

        let reloaded = load_catalog(&path).expect("catalog should reload");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.records()[0].id, "b");
        assert_eq!(
            reloaded.records()[0].description,
            "line one\nline two, with comma"
        );
    }

    #[test]
    fn test_load_catalog_accepts_rows_without_addition_date() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("data.csv");
        let legacy = "objectid,filename,youtubeid,title,creator,date,description,subject,location,latitude,longitude,source,identifier,type,format,language,rights,rightsstatement\n\
            abc,,abc,Old,Someone,2023-01-01,,,,,,https://www.youtube.com/channel/UC1,https://www.youtube.com/watch?v=abc,Image;MovingImage,video/mp4,,r,s\n\
            abc,,abc,Dup,Someone,2023-01-01,,,,,,,https://youtube.com/watch?v=abc,,,,,\n";
        std::fs::write(&path, legacy).expect("fixture should be written");

        let store = load_catalog(&path).expect("legacy catalog should load");
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].title, "Old");
        assert!(store.records()[0].addition_date.is_empty());
    }

    #[test]
    fn test_catalog_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("data.csv");

        let lock = CatalogLock::acquire(&path).expect("first lock should succeed");
        assert!(matches!(
            CatalogLock::acquire(&path),
            Err(CatalogError::Locked { .. })
        ));
        drop(lock);
        assert!(CatalogLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_catalog_lock_ignores_lock_file_left_by_interrupted_run() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("data.csv");
        let lock_path = dir.path().join("data.lock");
        // A killed run leaves its lock file behind, but no process holds it.
        std::fs::write(&lock_path, "4194303\n").expect("fixture should be written");

        let lock = CatalogLock::acquire(&path).expect("stale lock file should not block");
        assert_eq!(lock.path(), lock_path.as_path());
        let owner = std::fs::read_to_string(&lock_path).expect("lock file should be readable");
        assert_eq!(owner.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_catalog_lock_is_released_with_the_holding_handle() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("data.csv");
        let lock_path = dir.path().join("data.lock");

        // A bare locked handle with no cleanup code, as a killed process would leave it.
        let holder = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .expect("lock file should open");
        holder
            .try_lock_exclusive()
            .expect("holder should take the lock");
        assert!(matches!(
            CatalogLock::acquire(&path),
            Err(CatalogError::Locked { .. })
        ));

        drop(holder);
        assert!(lock_path.exists());
        assert!(CatalogLock::acquire(&path).is_ok());
    }
}
