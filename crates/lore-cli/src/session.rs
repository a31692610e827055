//! JSONL transcripts of conversation threads

use lore_ai::Message;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Transcript entry types for JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// Transcript header
    Metadata {
        id: String,
        created_at: i64,
        model: String,
    },
    /// A message in the conversation
    Message { message: Message, timestamp: i64 },
    /// Fragments retrieved for the turn that follows
    Context { fragments: Vec<String>, timestamp: i64 },
}

/// Appends a thread's turns to `<sessions_dir>/<thread id>.jsonl`
pub struct SessionManager {
    id: String,
    writer: BufWriter<File>,
}

impl SessionManager {
    /// Get the sessions directory
    pub fn sessions_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lore")
            .join("sessions")
    }

    /// Start a transcript for a new thread
    pub fn new(id: &str, model: &str) -> std::io::Result<Self> {
        Self::create_in(&Self::sessions_dir(), id, model)
    }

    /// Open an existing transcript, returning its messages
    pub fn load(id: &str) -> std::io::Result<(Self, Vec<Message>)> {
        Self::load_from(&Self::sessions_dir(), id)
    }

    /// List all transcripts, newest first
    pub fn list_sessions() -> std::io::Result<Vec<SessionInfo>> {
        Self::list_in(&Self::sessions_dir())
    }

    fn create_in(dir: &Path, id: &str, model: &str) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;

        let file = File::create(dir.join(format!("{}.jsonl", id)))?;
        let mut session = Self {
            id: id.to_string(),
            writer: BufWriter::new(file),
        };
        session.append(&SessionEntry::Metadata {
            id: id.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            model: model.to_string(),
        })?;
        Ok(session)
    }

    fn load_from(dir: &Path, id: &str) -> std::io::Result<(Self, Vec<Message>)> {
        let path = dir.join(format!("{}.jsonl", id));

        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Session not found: {}", id),
            ));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut messages = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<SessionEntry>(&line) {
                Ok(SessionEntry::Message { message, .. }) => messages.push(message),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable transcript line in {}: {}", id, e),
            }
        }

        let file = File::options().append(true).open(&path)?;
        Ok((
            Self {
                id: id.to_string(),
                writer: BufWriter::new(file),
            },
            messages,
        ))
    }

    fn list_in(dir: &Path) -> std::io::Result<Vec<SessionInfo>> {
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut sessions = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                if let Some(info) = Self::read_session_info(&path) {
                    sessions.push(info);
                }
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(sessions)
    }

    /// Thread id this transcript belongs to
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message to the transcript
    pub fn append_message(&mut self, message: &Message) -> std::io::Result<()> {
        self.append(&SessionEntry::Message {
            message: message.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Record the fragments a turn was grounded on
    pub fn append_context(&mut self, fragments: &[String]) -> std::io::Result<()> {
        self.append(&SessionEntry::Context {
            fragments: fragments.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn append(&mut self, entry: &SessionEntry) -> std::io::Result<()> {
        writeln!(self.writer, "{}", serde_json::to_string(entry)?)?;
        self.writer.flush()
    }

    fn read_session_info(path: &Path) -> Option<SessionInfo> {
        let reader = BufReader::new(File::open(path).ok()?);
        let mut lines = reader.lines().map_while(Result::ok);

        let SessionEntry::Metadata {
            id,
            created_at,
            model,
        } = serde_json::from_str(&lines.next()?).ok()?
        else {
            return None;
        };

        let message_count = lines
            .filter(|l| l.contains("\"type\":\"message\""))
            .count();

        Some(SessionInfo {
            id,
            created_at,
            model,
            message_count,
        })
    }
}

/// Information about a saved transcript
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: i64,
    pub model: String,
    pub message_count: usize,
}

impl SessionInfo {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lore-sessions-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_transcript_round_trip() {
        let dir = scratch_dir();
        let mut session = SessionManager::create_in(&dir, "thread-1", "gpt-4o-mini").unwrap();
        session.append_message(&Message::user("What is X?")).unwrap();
        session.append_context(&["X is a widget.".to_string()]).unwrap();
        session.append_message(&Message::assistant("A widget.")).unwrap();
        drop(session);

        let (session, messages) = SessionManager::load_from(&dir, "thread-1").unwrap();
        assert_eq!(session.id(), "thread-1");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "What is X?");
        assert!(messages[1].is_assistant());

        let infos = SessionManager::list_in(&dir).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].message_count, 2);
        assert_eq!(infos[0].model, "gpt-4o-mini");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_missing_session() {
        let err = SessionManager::load_from(&scratch_dir(), "nope").err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        assert!(SessionManager::list_in(&scratch_dir()).unwrap().is_empty());
    }
}
