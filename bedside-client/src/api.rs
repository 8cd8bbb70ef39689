//! Wire types for the consultation service.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Clinician,
    Patient,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadMeta {
    pub id: u64,
    pub title: String,
    pub status: ThreadStatus,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
}

impl ThreadMeta {
    pub fn is_closed(&self) -> bool {
        self.status == ThreadStatus::Closed
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PostMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// Response of the end-thread call. The service also attaches the session
/// feedback report, which this client does not consume.
#[derive(Clone, Debug, Deserialize)]
pub struct EndReport {
    pub thread: ThreadMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_row_round_trip() {
        let row = MessageRow {
            id: 12,
            role: Role::Patient,
            content: "It hurts when I breathe in.".to_string(),
            created_at: "2025-11-03T10:15:00".to_string(),
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains(r#""role":"patient""#));
        let back: MessageRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 12);
        assert_eq!(back.role, Role::Patient);
    }

    #[test]
    fn test_thread_meta_tolerates_missing_fields() {
        let meta: ThreadMeta = serde_json::from_str(
            r#"{"id": 3, "title": "Chest pain", "status": "open", "created_at": "2025-11-03T10:00:00"}"#,
        )
        .unwrap();
        assert!(!meta.is_closed());
        assert_eq!(meta.updated_at, None);
    }

    #[test]
    fn test_post_message_serialization() {
        let payload = PostMessage {
            role: Role::Clinician,
            content: "When did it start?",
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"role":"clinician","content":"When did it start?"}"#
        );
    }
}
