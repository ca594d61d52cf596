// 数据库服务模块
// 提供 SQLite 数据库操作，支持班级、生成内容与使用统计

use crate::models::{ClassInfo, ContentKind, GeneratedItem, UserStatistics};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// 带类型的生成内容记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub class_id: i64,
    pub kind: ContentKind,
    pub item: GeneratedItem,
}

/// 数据库服务
pub struct DatabaseService {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// 打开（或创建）数据库文件
    pub fn open(db_path: &Path) -> Result<Self> {
        // 确保数据目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )
        .context("failed to configure database")?;

        let service = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        service.initialize()?;
        Ok(service)
    }

    /// 内存数据库，用于测试
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let service = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        service.initialize()?;
        Ok(service)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database lock poisoned"))
    }

    /// 初始化数据库表结构
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS generated_content (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                class_id INTEGER NOT NULL,
                type TEXT NOT NULL CHECK(type IN ('test', 'flashcard', 'cribsheet')),
                file_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS user_statistics (
                scope_key TEXT PRIMARY KEY,
                flashcards_clicked INTEGER NOT NULL DEFAULT 0,
                cumulative_score INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_classes_user_id ON classes(user_id);
            CREATE INDEX IF NOT EXISTS idx_content_class_id ON generated_content(class_id);
            ",
        )
        .context("failed to create tables")?;

        Ok(())
    }

    // ==================== 班级管理 ====================

    /// 创建班级
    pub fn create_class(&self, user_id: Option<&str>, name: &str, color: &str) -> Result<ClassInfo> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO classes (user_id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, name, color, now.to_rfc3339()],
        )
        .context("failed to insert class")?;

        Ok(ClassInfo {
            id: conn.last_insert_rowid(),
            user_id: user_id.map(str::to_string),
            name: name.to_string(),
            color: color.to_string(),
            created_at: now,
        })
    }

    pub fn get_class(&self, id: i64) -> Result<Option<ClassInfo>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, user_id, name, color, created_at FROM classes WHERE id = ?1",
            params![id],
            Self::row_to_class,
        )
        .optional()
        .context("failed to query class")
    }

    /// 列出班级；给定用户时只返回该用户的班级
    pub fn list_classes(&self, user_id: Option<&str>) -> Result<Vec<ClassInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, color, created_at FROM classes
             WHERE ?1 IS NULL OR user_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let classes = stmt
            .query_map(params![user_id], Self::row_to_class)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list classes")?;
        Ok(classes)
    }

    /// 更新班级颜色，返回是否存在该班级
    pub fn update_class_color(&self, id: i64, color: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE classes SET color = ?1 WHERE id = ?2",
                params![color, id],
            )
            .context("failed to update class color")?;
        Ok(changed > 0)
    }

    /// 删除班级及其生成内容
    pub fn delete_class(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM generated_content WHERE class_id = ?1",
            params![id],
        )?;
        let changed = tx.execute("DELETE FROM classes WHERE id = ?1", params![id])?;
        tx.commit().context("failed to delete class")?;
        Ok(changed > 0)
    }

    // ==================== 生成内容 ====================

    /// 保存生成内容，返回分配的 id
    pub fn insert_generated(&self, class_id: i64, kind: ContentKind, item: &GeneratedItem) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO generated_content (class_id, type, file_name, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                class_id,
                kind.as_str(),
                item.file_name,
                item.content,
                Utc::now().to_rfc3339()
            ],
        )
        .with_context(|| format!("failed to insert {} for class {}", kind, class_id))?;

        Ok(conn.last_insert_rowid())
    }

    /// 按班级查询生成内容，按创建顺序返回
    pub fn list_generated(&self, class_id: i64, kind: Option<ContentKind>) -> Result<Vec<StoredContent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, type, file_name, content FROM generated_content
             WHERE class_id = ?1 AND (?2 IS NULL OR type = ?2)
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![class_id, kind.map(|k| k.as_str())], Self::row_to_content)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to list generated content")?;
        Ok(rows)
    }

    pub fn get_generated(&self, id: i64) -> Result<Option<StoredContent>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, class_id, type, file_name, content FROM generated_content WHERE id = ?1",
            params![id],
            Self::row_to_content,
        )
        .optional()
        .context("failed to query generated content")
    }

    pub fn delete_generated(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM generated_content WHERE id = ?1", params![id])
            .context("failed to delete generated content")?;
        Ok(changed > 0)
    }

    // ==================== 使用统计 ====================

    pub fn get_statistics(&self, scope_key: &str) -> Result<UserStatistics> {
        let conn = self.conn()?;
        let stats = conn
            .query_row(
                "SELECT flashcards_clicked, cumulative_score FROM user_statistics WHERE scope_key = ?1",
                params![scope_key],
                |row| {
                    Ok(UserStatistics {
                        flashcards_clicked: row.get(0)?,
                        cumulative_score: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("failed to query statistics")?;
        Ok(stats.unwrap_or_default())
    }

    /// 记录一次闪卡掌握
    pub fn record_flashcard_mastered(&self, scope_key: &str) -> Result<UserStatistics> {
        self.upsert_statistics(scope_key, 1, 0)
    }

    /// 累加测验得分
    pub fn add_quiz_score(&self, scope_key: &str, score: u32) -> Result<UserStatistics> {
        self.upsert_statistics(scope_key, 0, score)
    }

    fn upsert_statistics(&self, scope_key: &str, clicked: u32, score: u32) -> Result<UserStatistics> {
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO user_statistics (scope_key, flashcards_clicked, cumulative_score, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(scope_key) DO UPDATE SET
                 flashcards_clicked = flashcards_clicked + excluded.flashcards_clicked,
                 cumulative_score = cumulative_score + excluded.cumulative_score,
                 updated_at = excluded.updated_at",
                params![scope_key, clicked, score, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to update statistics for {}", scope_key))?;
        }
        self.get_statistics(scope_key)
    }

    fn row_to_class(row: &Row) -> Result<ClassInfo, rusqlite::Error> {
        let created_at: String = row.get(4)?;
        Ok(ClassInfo {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                })?,
        })
    }

    fn row_to_content(row: &Row) -> Result<StoredContent, rusqlite::Error> {
        let kind: String = row.get(2)?;
        let kind = kind.parse::<ContentKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;

        Ok(StoredContent {
            class_id: row.get(1)?,
            kind,
            item: GeneratedItem {
                id: Some(row.get(0)?),
                file_name: row.get(3)?,
                content: row.get(4)?,
            },
        })
    }
}
