//! JSON-file store for community discussion threads.
//!
//! The whole store lives in one file that is re-read and atomically rewritten
//! on every mutation. A missing file is an empty store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, thiserror::Error)]
pub enum CommunityError {
    #[error("thread {0} not found")]
    ThreadNotFound(String),
    #[error("comment {comment_id} not found in thread {thread_id}")]
    CommentNotFound {
        thread_id: String,
        comment_id: String,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt community store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CommunityError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct NewThread {
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: Option<String>,
}

/// Fields left `None` are unchanged.
#[derive(Debug, Clone, Default)]
pub struct ThreadPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewComment {
    pub author: String,
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    threads: Vec<Thread>,
}

pub struct CommunityStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl CommunityStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Newest first, optionally restricted to one category.
    pub fn list_threads(&self, category: Option<&str>) -> Result<Vec<Thread>> {
        let _guard = self.lock.lock();
        let mut threads: Vec<Thread> = self
            .read()?
            .threads
            .into_iter()
            .filter(|t| category.is_none_or(|c| t.category == c))
            .collect();
        // Reverse first so equal timestamps still list the later insert first.
        threads.reverse();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(threads)
    }

    pub fn get_thread(&self, id: &str) -> Result<Thread> {
        let _guard = self.lock.lock();
        self.read()?
            .threads
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CommunityError::ThreadNotFound(id.to_string()))
    }

    pub fn create_thread(&self, new: NewThread) -> Result<Thread> {
        let title = required("title", new.title)?;
        let content = required("content", new.content)?;
        let author = required("author", new.author)?;
        let category = match new.category {
            Some(c) => required("category", c)?,
            None => default_category(),
        };
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            author,
            category,
            created_at: now,
            updated_at: now,
            likes: 0,
            comments: Vec::new(),
        };
        self.mutate(|file| {
            file.threads.push(thread.clone());
            Ok(())
        })?;
        info!(id = %thread.id, category = %thread.category, "Thread created");
        Ok(thread)
    }

    pub fn update_thread(&self, id: &str, patch: ThreadPatch) -> Result<Thread> {
        let title = patch.title.map(|t| required("title", t)).transpose()?;
        let content = patch.content.map(|c| required("content", c)).transpose()?;
        let category = patch.category.map(|c| required("category", c)).transpose()?;
        self.mutate(|file| {
            let thread = find_thread(file, id)?;
            if let Some(title) = title {
                thread.title = title;
            }
            if let Some(content) = content {
                thread.content = content;
            }
            if let Some(category) = category {
                thread.category = category;
            }
            thread.updated_at = Utc::now();
            Ok(thread.clone())
        })
    }

    pub fn delete_thread(&self, id: &str) -> Result<Thread> {
        let removed = self.mutate(|file| {
            let idx = file
                .threads
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| CommunityError::ThreadNotFound(id.to_string()))?;
            Ok(file.threads.remove(idx))
        })?;
        info!(id = %id, "Thread deleted");
        Ok(removed)
    }

    pub fn like_thread(&self, id: &str) -> Result<Thread> {
        self.mutate(|file| {
            let thread = find_thread(file, id)?;
            thread.likes += 1;
            Ok(thread.clone())
        })
    }

    pub fn add_comment(&self, thread_id: &str, new: NewComment) -> Result<Comment> {
        let author = required("author", new.author)?;
        let content = required("content", new.content)?;
        self.mutate(|file| {
            let thread = find_thread(file, thread_id)?;
            let comment = Comment {
                id: Uuid::new_v4().to_string(),
                author,
                content,
                created_at: Utc::now(),
                updated_at: None,
            };
            thread.comments.push(comment.clone());
            Ok(comment)
        })
    }

    pub fn update_comment(&self, thread_id: &str, comment_id: &str, content: String) -> Result<Comment> {
        let content = required("content", content)?;
        self.mutate(|file| {
            let comment = find_comment(file, thread_id, comment_id)?;
            comment.content = content;
            comment.updated_at = Some(Utc::now());
            Ok(comment.clone())
        })
    }

    pub fn delete_comment(&self, thread_id: &str, comment_id: &str) -> Result<Comment> {
        self.mutate(|file| {
            let thread = find_thread(file, thread_id)?;
            let idx = thread
                .comments
                .iter()
                .position(|c| c.id == comment_id)
                .ok_or_else(|| comment_not_found(thread_id, comment_id))?;
            Ok(thread.comments.remove(idx))
        })
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreFile) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock();
        let mut file = self.read()?;
        let out = f(&mut file)?;
        self.write(&file)?;
        Ok(out)
    }

    fn read(&self) -> Result<StoreFile> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(StoreFile::default()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| CommunityError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn write(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let raw = serde_json::to_string_pretty(file).map_err(|source| CommunityError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), threads = file.threads.len(), "Community store written");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CommunityError {
        CommunityError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn required(field: &'static str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CommunityError::Empty(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn find_thread<'a>(file: &'a mut StoreFile, id: &str) -> Result<&'a mut Thread> {
    file.threads
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| CommunityError::ThreadNotFound(id.to_string()))
}

fn find_comment<'a>(file: &'a mut StoreFile, thread_id: &str, comment_id: &str) -> Result<&'a mut Comment> {
    find_thread(file, thread_id)?
        .comments
        .iter_mut()
        .find(|c| c.id == comment_id)
        .ok_or_else(|| comment_not_found(thread_id, comment_id))
}

fn comment_not_found(thread_id: &str, comment_id: &str) -> CommunityError {
    CommunityError::CommentNotFound {
        thread_id: thread_id.to_string(),
        comment_id: comment_id.to_string(),
    }
}
