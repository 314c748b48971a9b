//! Persistent up-to-date cache for (descriptor, class) pairs.
//!
//! The cache lives in a single file under the build directory. A run calls
//! [`CacheFile::read`] once, queries and mutates the returned [`CacheState`],
//! and hands it back through [`CacheState::write`], which consumes it.
//!
//! Staleness is decided purely by modification time. Clock skew, or a copy
//! that preserves timestamps, can make a changed pair look up to date (or the
//! reverse); content hashes are not consulted.
//!
//! Only one run may use a given build directory at a time. Two concurrent
//! runs both read the old file and the last writer wins.
//!
//! File layout:
//!
//! ```text
//! gui-forms-cache 1
//! {"descriptor":"/abs/A.form","descriptor_mtime":1,"class":"/abs/A.class","class_mtime":2}
//! end 1 <sha256 of the record lines>
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

pub const CACHE_FILE_NAME: &str = "gui-forms.cache";

const FORMAT_HEADER: &str = "gui-forms-cache";
const FORMAT_VERSION: u32 = 1;
const TRAILER: &str = "end";

/// One successfully processed pair. Identity is the two paths; timestamps
/// only matter for staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "descriptor")]
    pub descriptor_path: PathBuf,
    #[serde(rename = "descriptor_mtime")]
    pub descriptor_timestamp: u64,
    #[serde(rename = "class")]
    pub class_path: PathBuf,
    #[serde(rename = "class_mtime")]
    pub class_timestamp: u64,
}

impl CacheEntry {
    /// Snapshot both files' current modification times.
    pub fn capture(descriptor_path: &Path, class_path: &Path) -> Self {
        Self {
            descriptor_path: descriptor_path.to_path_buf(),
            descriptor_timestamp: modification_time(descriptor_path),
            class_path: class_path.to_path_buf(),
            class_timestamp: modification_time(class_path),
        }
    }

    fn key(descriptor_path: &Path, class_path: &Path) -> Self {
        Self {
            descriptor_path: descriptor_path.to_path_buf(),
            descriptor_timestamp: 0,
            class_path: class_path.to_path_buf(),
            class_timestamp: 0,
        }
    }
}

impl PartialEq for CacheEntry {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor_path == other.descriptor_path && self.class_path == other.class_path
    }
}

impl Eq for CacheEntry {}

impl Hash for CacheEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor_path.hash(state);
        self.class_path.hash(state);
    }
}

/// Modification time in nanoseconds since the Unix epoch, or 0 when the file
/// cannot be inspected.
pub fn modification_time(path: &Path) -> u64 {
    let Ok(mtime) = path.metadata().and_then(|m| m.modified()) else {
        return 0;
    };
    let nanos = mtime.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

/// Location of the persisted cache.
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(build_dir: &Path) -> Self {
        Self::at(build_dir.join(CACHE_FILE_NAME))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted set. Missing or unreadable files yield an empty set.
    pub fn read(&self) -> CacheState {
        let entries = match std::fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw).unwrap_or_else(|| {
                debug!(path = %self.path.display(), "discarding unreadable cache file");
                HashSet::new()
            }),
            Err(_) => HashSet::new(),
        };
        CacheState {
            path: self.path.clone(),
            entries,
        }
    }

    /// Remove the persisted file. Returns `true` only if a file was removed.
    pub fn delete(&self) -> bool {
        self.path.is_file() && std::fs::remove_file(&self.path).is_ok()
    }
}

/// In-memory entry set for one run.
#[derive(Debug)]
pub struct CacheState {
    path: PathBuf,
    entries: HashSet<CacheEntry>,
}

impl CacheState {
    pub fn is_up_to_date(&self, descriptor_path: &Path, class_path: &Path) -> bool {
        self.find_cache_entry(descriptor_path, class_path)
            .is_some_and(|entry| {
                entry.descriptor_timestamp == modification_time(descriptor_path)
                    && entry.class_timestamp == modification_time(class_path)
            })
    }

    pub fn find_cache_entry(&self, descriptor_path: &Path, class_path: &Path) -> Option<&CacheEntry> {
        self.entries.get(&CacheEntry::key(descriptor_path, class_path))
    }

    pub fn remove_cache_entry(&mut self, descriptor_path: &Path, class_path: &Path) {
        self.entries.remove(&CacheEntry::key(descriptor_path, class_path));
    }

    pub fn put_cache_entry(&mut self, descriptor_path: &Path, class_path: &Path) {
        self.entries
            .replace(CacheEntry::capture(descriptor_path, class_path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    /// Persist and drop the set. I/O failures are swallowed; the next run
    /// then simply reprocesses everything.
    pub fn write(self) -> bool {
        match persist(&self.path, &self.entries) {
            Ok(()) => true,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "failed to persist cache");
                false
            }
        }
    }
}

fn persist(path: &Path, entries: &HashSet<CacheEntry>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = encode(entries)?;

    let mut tmp_os = path.as_os_str().to_os_string();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);
    std::fs::write(&tmp, payload)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

fn encode(entries: &HashSet<CacheEntry>) -> serde_json::Result<String> {
    let mut sorted: Vec<&CacheEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        a.descriptor_path
            .cmp(&b.descriptor_path)
            .then_with(|| a.class_path.cmp(&b.class_path))
    });

    let records = sorted
        .into_iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()?;
    let body = records.join("\n");

    let mut out = format!("{FORMAT_HEADER} {FORMAT_VERSION}\n");
    if !body.is_empty() {
        out.push_str(&body);
        out.push('\n');
    }
    out.push_str(&format!("{TRAILER} {} {}\n", records.len(), checksum(&body)));
    Ok(out)
}

fn decode(raw: &str) -> Option<HashSet<CacheEntry>> {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 || !raw.ends_with('\n') {
        return None;
    }

    let header = lines.remove(0);
    let version = header.strip_prefix(FORMAT_HEADER)?.trim().parse::<u32>().ok()?;
    if version != FORMAT_VERSION {
        return None;
    }

    let trailer = lines.pop()?;
    let mut parts = trailer.split(' ');
    if parts.next()? != TRAILER {
        return None;
    }
    let count = parts.next()?.parse::<usize>().ok()?;
    let digest = parts.next()?;
    if parts.next().is_some() || count != lines.len() || digest != checksum(&lines.join("\n")) {
        return None;
    }

    let mut entries = HashSet::with_capacity(count);
    for line in lines {
        let entry: CacheEntry = serde_json::from_str(line).ok()?;
        entries.replace(entry);
    }
    Some(entries)
}

fn checksum(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gui_forms_cache_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: &Path, secs: u64) {
        std::fs::write(path, b"x").unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let base = temp_dir("missing");
        let cache = CacheFile::new(&base).read();
        assert!(cache.is_empty());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn written_entries_survive_a_reload() {
        let base = temp_dir("roundtrip");
        let form = base.join("A.form");
        let class = base.join("A.class");
        touch(&form, 1_000);
        touch(&class, 2_000);

        let file = CacheFile::new(&base.join("target"));
        let mut cache = file.read();
        cache.put_cache_entry(&form, &class);
        assert!(cache.write());
        assert!(file.path().is_file());

        let reloaded = file.read();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.is_up_to_date(&form, &class));
        let entry = reloaded.find_cache_entry(&form, &class).unwrap();
        assert_eq!(entry.descriptor_timestamp, 1_000 * 1_000_000_000);
        assert_eq!(entry.class_timestamp, 2_000 * 1_000_000_000);
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn changed_timestamps_make_pair_stale() {
        let base = temp_dir("stale");
        let form = base.join("A.form");
        let class = base.join("A.class");
        touch(&form, 10);
        touch(&class, 20);

        let mut cache = CacheFile::new(&base).read();
        cache.put_cache_entry(&form, &class);
        assert!(cache.is_up_to_date(&form, &class));

        touch(&class, 21);
        assert!(!cache.is_up_to_date(&form, &class));

        cache.put_cache_entry(&form, &class);
        touch(&form, 11);
        assert!(!cache.is_up_to_date(&form, &class));
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn same_pair_keeps_single_latest_entry() {
        let base = temp_dir("identity");
        let form = base.join("A.form");
        let class = base.join("A.class");
        touch(&form, 10);
        touch(&class, 20);

        let mut cache = CacheFile::new(&base).read();
        cache.put_cache_entry(&form, &class);
        touch(&class, 30);
        cache.put_cache_entry(&form, &class);

        assert_eq!(cache.len(), 1);
        let entry = cache.find_cache_entry(&form, &class).unwrap();
        assert_eq!(entry.class_timestamp, 30 * 1_000_000_000);

        cache.remove_cache_entry(&form, &class);
        cache.remove_cache_entry(&form, &class);
        assert!(cache.is_empty());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn truncated_or_foreign_files_read_as_empty() {
        let base = temp_dir("truncated");
        let form = base.join("A.form");
        let class = base.join("A.class");
        touch(&form, 10);
        touch(&class, 20);

        let file = CacheFile::new(&base);
        let mut cache = file.read();
        cache.put_cache_entry(&form, &class);
        assert!(cache.write());

        let full = std::fs::read(file.path()).unwrap();
        std::fs::write(file.path(), &full[..full.len() / 2]).unwrap();
        assert!(file.read().is_empty());

        std::fs::write(file.path(), b"\xac\xed\x00\x05sr\x00").unwrap();
        assert!(file.read().is_empty());

        let text = String::from_utf8(full).unwrap();
        std::fs::write(file.path(), text.replace("gui-forms-cache 1", "gui-forms-cache 2")).unwrap();
        assert!(file.read().is_empty());

        std::fs::write(file.path(), text.replace("A.class", "B.class")).unwrap();
        assert!(file.read().is_empty());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn identical_sets_encode_identically() {
        let mut entries = HashSet::new();
        for i in 0..8 {
            entries.insert(CacheEntry {
                descriptor_path: PathBuf::from(format!("/src/F{i}.form")),
                descriptor_timestamp: i,
                class_path: PathBuf::from(format!("/out/F{i}.class")),
                class_timestamp: i + 1,
            });
        }
        let rebuilt: HashSet<CacheEntry> = entries.iter().cloned().collect();
        assert_eq!(encode(&entries).unwrap(), encode(&rebuilt).unwrap());
        assert_eq!(decode(&encode(&entries).unwrap()).unwrap().len(), 8);
        assert!(decode(&encode(&HashSet::new()).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn delete_reports_whether_file_existed() {
        let base = temp_dir("delete");
        let file = CacheFile::new(&base);
        assert!(!file.delete());
        assert!(file.read().write());
        assert!(file.delete());
        assert!(!file.path().exists());
        let _ = std::fs::remove_dir_all(base);
    }
}
