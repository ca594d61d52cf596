//! 班级文件存储
//! 本地目录模拟 `class-files` 存储桶，对象键为 `{classId}/{fileName}`

use crate::models::StoredFile;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const BUCKET: &str = "class-files";

pub struct FileStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FileStorage {
    /// `root` 为存储桶所在目录
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn class_dir(&self, class_id: i64) -> PathBuf {
        self.root.join(BUCKET).join(class_id.to_string())
    }

    fn object_path(&self, class_id: i64, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.class_dir(class_id).join(file_name))
    }

    /// 文件的公开访问地址
    pub fn public_url(&self, class_id: i64, file_name: &str) -> String {
        format!(
            "{}/files/{}/{}",
            self.public_base_url,
            class_id,
            urlencoding::encode(file_name)
        )
    }

    /// 列出班级目录下的文件，按名称排序
    pub async fn list(&self, class_id: i64) -> Result<Vec<StoredFile>> {
        let dir = self.class_dir(class_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            files.push(StoredFile {
                url: self.public_url(class_id, &name),
                name,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub async fn upload(&self, class_id: i64, file_name: &str, bytes: &[u8]) -> Result<StoredFile> {
        let path = self.object_path(class_id, file_name)?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            bail!("{}/{} already exists", class_id, file_name);
        }

        fs::create_dir_all(self.class_dir(class_id)).await?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("uploaded {}/{} ({} bytes)", class_id, file_name, bytes.len());

        Ok(StoredFile {
            name: file_name.to_string(),
            size: bytes.len() as u64,
            url: self.public_url(class_id, file_name),
        })
    }

    pub async fn read(&self, class_id: i64, file_name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(class_id, file_name)?;
        fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}/{}", class_id, file_name))
    }

    pub async fn exists(&self, class_id: i64, file_name: &str) -> Result<bool> {
        let path = self.object_path(class_id, file_name)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    /// 删除指定文件，返回实际删除的数量
    pub async fn remove(&self, class_id: i64, file_names: &[String]) -> Result<usize> {
        let mut removed = 0;
        for name in file_names {
            let path = self.object_path(class_id, name)?;
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to remove {}/{}", class_id, name))
                }
            }
        }
        Ok(removed)
    }

    /// 删除班级下的全部文件
    pub async fn remove_all(&self, class_id: i64) -> Result<usize> {
        let names: Vec<String> = self.list(class_id).await?.into_iter().map(|f| f.name).collect();
        let removed = self.remove(class_id, &names).await?;

        let dir = self.class_dir(class_id);
        if fs::try_exists(&dir).await.unwrap_or(false) {
            // 目录中可能仍有子目录，失败时保留
            if let Err(e) = fs::remove_dir(&dir).await {
                log::warn!("failed to remove {}: {}", dir.display(), e);
            }
        }
        Ok(removed)
    }
}

/// 文件名不能为空，也不能包含路径成分
pub fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.trim().is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\', '\0'])
    {
        bail!("invalid file name: {:?}", file_name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> FileStorage {
        FileStorage::new(dir.path(), "http://localhost:8080/")
    }

    #[tokio::test]
    async fn test_upload_list_remove() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert!(storage.list(1).await.unwrap().is_empty());
        storage.upload(1, "b notes.txt", b"beta").await.unwrap();
        storage.upload(1, "a.txt", b"alpha!").await.unwrap();
        storage.upload(2, "other.txt", b"x").await.unwrap();

        let files = storage.list(1).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.txt");
        assert_eq!(files[0].size, 6);
        assert_eq!(files[1].url, "http://localhost:8080/files/1/b%20notes.txt");

        assert_eq!(storage.read(1, "a.txt").await.unwrap(), b"alpha!");
        assert_eq!(
            storage.remove(1, &["a.txt".to_string(), "missing".to_string()]).await.unwrap(),
            1
        );
        assert_eq!(storage.list(1).await.unwrap().len(), 1);
        assert_eq!(storage.list(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.upload(1, "a.txt", b"1").await.unwrap();
        assert!(storage.upload(1, "a.txt", b"2").await.is_err());
        assert_eq!(storage.read(1, "a.txt").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_remove_all() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.upload(5, "a.txt", b"1").await.unwrap();
        storage.upload(5, "b.txt", b"2").await.unwrap();
        assert_eq!(storage.remove_all(5).await.unwrap(), 2);
        assert!(storage.list(5).await.unwrap().is_empty());
        assert_eq!(storage.remove_all(6).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        for name in ["../escape.txt", "a/b.txt", "..", "", "  "] {
            assert!(storage.upload(1, name, b"x").await.is_err(), "{:?}", name);
        }
        assert!(storage.read(1, "..\\x").await.is_err());
    }
}
