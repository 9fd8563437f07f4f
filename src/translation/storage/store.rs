//! 持久化存储
//!
//! 设置和缓存快照都以原始字符串的形式按键保存。读取时无法解析的数据
//! 由调用方视为缺失，存储层本身不做任何解释。

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::translation::error::{TranslationError, TranslationResult};

/// 键值持久化存储
pub trait PersistentStore: Send + Sync {
    /// 读取原始值，不存在时返回 `None`
    fn get(&self, key: &str) -> Option<String>;

    /// 写入原始值
    fn set(&self, key: &str, raw: &str) -> TranslationResult<()>;
}

impl<S: PersistentStore + ?Sized> PersistentStore for Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, raw: &str) -> TranslationResult<()> {
        (**self).set(key, raw)
    }
}

/// 进程内存储，用于测试和一次性运行
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否存在某个键
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, raw: &str) -> TranslationResult<()> {
        self.lock().insert(key.to_string(), raw.to_string());
        Ok(())
    }
}

/// 文件存储：每个键对应数据目录下的一个 `<key>.json` 文件
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// 打开数据目录，不存在时创建
    pub fn open<P: AsRef<Path>>(dir: P) -> TranslationResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            TranslationError::StorageError(format!("创建数据目录失败 {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("读取存储文件失败 {}: {}", path.display(), e);
                None
            }
        }
    }

    fn set(&self, key: &str, raw: &str) -> TranslationResult<()> {
        let path = self.path_for(key);

        // 先写临时文件再原子替换，避免中途失败留下半截快照
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(raw.as_bytes())?;
        file.flush()?;
        file.persist(&path).map_err(|e| {
            TranslationError::StorageError(format!("写入存储文件失败 {}: {}", path.display(), e))
        })?;

        tracing::trace!("已写入 {} ({} 字节)", path.display(), raw.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k"), None);

        store.set("k", "{}").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("{}"));
        assert!(store.contains("k"));
    }

    #[test]
    fn test_file_store_overwrites_and_sanitizes_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();

        store.set("ai_translator_cache_v1", "{\"a\":\"1\"}").unwrap();
        store.set("ai_translator_cache_v1", "{\"b\":\"2\"}").unwrap();
        assert_eq!(store.get("ai_translator_cache_v1").as_deref(), Some("{\"b\":\"2\"}"));

        store.set("../escape", "x").unwrap();
        assert!(store.dir().join("___escape.json").exists());
        assert_eq!(store.get("missing"), None);
    }
}
