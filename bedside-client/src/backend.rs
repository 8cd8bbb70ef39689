//! REST-backed collaborators for the voice orchestrator.
//!
//! The consultation service answers a posted clinician message with the
//! full updated transcript; the patient rows appended after our own message
//! are the counterpart's reply for that turn.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::{debug, info};

use bedside_voice::{
    AudioFetchError, ConversationBackend, ReplyId, SpeechAudioSource, ThreadId, TurnReply,
};

use crate::api::{EndReport, MessageRow, PostMessage, Role, ThreadMeta};
use crate::client::{Client, StatusError};
use crate::settings::Settings;

pub struct ConsultationService {
    client: Client,
}

impl ConsultationService {
    pub fn new(base_url: &str, api_token: Option<&str>) -> Self {
        Self {
            client: Client::new(base_url, api_token),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.base_url, settings.api_token.as_deref())
    }

    pub async fn thread(&self, thread: ThreadId) -> Result<ThreadMeta> {
        self.client.get(&format!("/threads/{thread}")).await
    }

    pub async fn transcript(&self, thread: ThreadId) -> Result<Vec<MessageRow>> {
        self.client
            .get(&format!("/threads/{thread}/messages"))
            .await
    }

    /// Close the thread. The service generates the session feedback as a
    /// side effect; this client only cares that the status flips.
    pub async fn end_thread(&self, thread: ThreadId) -> Result<ThreadMeta> {
        let report: EndReport = self
            .client
            .post(&format!("/threads/{thread}/end"), &serde_json::json!({}))
            .await?;
        info!(%thread, "thread closed");
        Ok(report.thread)
    }
}

/// Patient rows appended after the last clinician row, as reply texts keyed
/// by the newest row id.
fn extract_replies(transcript: &[MessageRow]) -> Option<(Vec<String>, ReplyId)> {
    let last_clinician = transcript
        .iter()
        .rposition(|row| row.role == Role::Clinician)?;
    let new_patient: Vec<&MessageRow> = transcript[last_clinician + 1..]
        .iter()
        .filter(|row| row.role == Role::Patient)
        .collect();
    let newest = new_patient.iter().map(|row| row.id).max()?;
    let replies = new_patient
        .into_iter()
        .map(|row| row.content.clone())
        .collect();
    Some((replies, ReplyId(newest)))
}

#[async_trait]
impl ConversationBackend for ConsultationService {
    async fn submit_utterance(&self, thread: ThreadId, text: &str) -> Result<TurnReply> {
        let payload = PostMessage {
            role: Role::Clinician,
            content: text,
        };
        let transcript: Vec<MessageRow> = match self
            .client
            .post(&format!("/threads/{thread}/messages"), &payload)
            .await
        {
            Ok(transcript) => transcript,
            Err(e) => {
                // The thread closed under us; not a failure, the turn is over.
                if let Some(status) = e.downcast_ref::<StatusError>()
                    && status.status == StatusCode::CONFLICT
                {
                    debug!(%thread, "message rejected, thread already closed");
                    return Ok(TurnReply {
                        replies: Vec::new(),
                        reply_id: ReplyId(0),
                        thread_closed: true,
                    });
                }
                return Err(e);
            }
        };

        let (replies, reply_id) = match extract_replies(&transcript) {
            Some(found) => found,
            None => (Vec::new(), ReplyId(0)),
        };
        debug!(%thread, %reply_id, count = replies.len(), "reply received");
        Ok(TurnReply {
            replies,
            reply_id,
            thread_closed: false,
        })
    }
}

#[async_trait]
impl SpeechAudioSource for ConsultationService {
    async fn fetch_audio(&self, reply: ReplyId) -> std::result::Result<Bytes, AudioFetchError> {
        self.client
            .get_bytes(&format!("/messages/{reply}/speech"))
            .await
            .map_err(|e| match e.downcast_ref::<StatusError>() {
                Some(status) => AudioFetchError::status(status.status.as_u16(), status.to_string()),
                None => AudioFetchError::transport(format!("{e:#}")),
            })
    }
}
