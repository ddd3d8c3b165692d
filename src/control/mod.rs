//! Operator-facing call contract: session lifecycle, command and group
//! CRUD, ad-hoc sends, API diagnostics, and the status snapshot.

pub mod http;

use crate::engine::registry::ConnectionPhase;
use crate::engine::{ConnectOutcome, Engine, dispatch};
use crate::error::{ControlError, GateError, SessionError};
use crate::link::MediaKind;
use crate::store::{Command, CommandAction, GroupRecord, SessionRecord};
use serde::{Deserialize, Serialize};

/// Untyped command fields as submitted by the operator. `validate` turns a
/// draft into a [`Command`], enforcing the type-specific required fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDraft {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub response: Option<String>,
    pub case_insensitive: Option<bool>,
    pub media_url: Option<String>,
    pub caption: Option<String>,
    pub api_url: Option<String>,
    pub api_response_path: Option<String>,
}

impl CommandDraft {
    fn validate(self) -> Result<Command, ControlError> {
        let kind = self
            .kind
            .ok_or_else(|| ControlError::Validation("Command type is required".into()))?;
        let action = match kind.as_str() {
            "text" => CommandAction::Text {
                response: self
                    .response
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| ControlError::Validation("Response text is required".into()))?,
            },
            "image" | "video" => {
                let media_url = self
                    .media_url
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| ControlError::Validation("Media URL is required".into()))?;
                if kind == "image" {
                    CommandAction::Image {
                        media_url,
                        caption: self.caption,
                    }
                } else {
                    CommandAction::Video {
                        media_url,
                        caption: self.caption,
                    }
                }
            }
            "api" => CommandAction::Api {
                api_url: self
                    .api_url
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| ControlError::Validation("API URL is required".into()))?,
                api_response_path: self
                    .api_response_path
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "result".into()),
            },
            other => {
                return Err(ControlError::Validation(format!(
                    "Unknown command type: {other}"
                )));
            }
        };
        Ok(Command {
            case_insensitive: self.case_insensitive.unwrap_or(false),
            action,
        })
    }

    /// Fill unset fields from an existing command, then validate. Backs the
    /// partial-update operation.
    fn merged_into(self, existing: &Command) -> Self {
        let mut draft = self;
        let existing_kind = match existing.action {
            CommandAction::Text { .. } => "text",
            CommandAction::Image { .. } => "image",
            CommandAction::Video { .. } => "video",
            CommandAction::Api { .. } => "api",
        };
        draft.kind.get_or_insert_with(|| existing_kind.into());
        draft
            .case_insensitive
            .get_or_insert(existing.case_insensitive);
        match &existing.action {
            CommandAction::Text { response } => {
                draft.response.get_or_insert_with(|| response.clone());
            }
            CommandAction::Image { media_url, caption }
            | CommandAction::Video { media_url, caption } => {
                draft.media_url.get_or_insert_with(|| media_url.clone());
                if draft.caption.is_none() {
                    draft.caption.clone_from(caption);
                }
            }
            CommandAction::Api {
                api_url,
                api_response_path,
            } => {
                draft.api_url.get_or_insert_with(|| api_url.clone());
                draft
                    .api_response_path
                    .get_or_insert_with(|| api_response_path.clone());
            }
        }
        draft
    }
}

/// Operator-directed payload for the ad-hoc send operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SendPayload {
    Text {
        body: String,
    },
    Image {
        media_url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Video {
        media_url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Document {
        media_url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Voice {
        media_url: String,
    },
    Api {
        api_url: String,
        #[serde(default)]
        api_response_path: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub connection_phase: ConnectionPhase,
    pub qr_payload: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub sessions: Vec<SessionStatus>,
    /// Insertion-ordered command map, as persisted.
    pub commands: serde_json::Map<String, serde_json::Value>,
    pub groups: Vec<GroupRecord>,
}

#[derive(Clone)]
pub struct Controller {
    engine: Engine,
}

impl Controller {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // ── Sessions ────────────────────────────────────────────────────────

    pub fn create_session(&self, name: &str) -> Result<SessionRecord, ControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::Validation("Session name is required".into()));
        }
        Ok(self.engine.sessions().create(name)?)
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), ControlError> {
        match self.engine.delete_session(id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::NotFound(id.to_string()).into()),
            Err(error) => Err(flatten_engine_error(error)),
        }
    }

    pub async fn connect_session(&self, id: &str) -> Result<ConnectOutcome, ControlError> {
        self.engine.connect(id).await.map_err(flatten_engine_error)
    }

    pub async fn disconnect_session(&self, id: &str) -> Result<(), ControlError> {
        self.engine
            .disconnect(id)
            .await
            .map_err(flatten_engine_error)
    }

    pub fn rename_session(&self, id: &str, name: &str) -> Result<(), ControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::Validation("Session name is required".into()));
        }
        self.found(self.engine.sessions().rename(id, name)?, id)
    }

    pub fn set_session_enabled(&self, id: &str, enabled: bool) -> Result<(), ControlError> {
        self.found(self.engine.sessions().set_enabled(id, enabled)?, id)
    }

    pub fn set_session_commands_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<(), ControlError> {
        self.found(self.engine.sessions().set_commands_enabled(id, enabled)?, id)
    }

    fn found(&self, hit: bool, id: &str) -> Result<(), ControlError> {
        if hit {
            Ok(())
        } else {
            Err(SessionError::NotFound(id.to_string()).into())
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    pub fn add_command(&self, key: &str, draft: CommandDraft) -> Result<(), ControlError> {
        if key.trim().is_empty() {
            return Err(ControlError::Validation("Command trigger is required".into()));
        }
        let command = draft.validate()?;
        self.engine.commands().upsert(key, command)?;
        Ok(())
    }

    pub fn update_command(&self, key: &str, draft: CommandDraft) -> Result<(), ControlError> {
        let existing = self
            .engine
            .commands()
            .get(key)?
            .ok_or_else(|| ControlError::CommandNotFound(key.to_string()))?;
        let command = draft.merged_into(&existing).validate()?;
        self.engine.commands().replace(key, command)?;
        Ok(())
    }

    pub fn delete_command(&self, key: &str) -> Result<(), ControlError> {
        if self.engine.commands().remove(key)? {
            Ok(())
        } else {
            Err(ControlError::CommandNotFound(key.to_string()))
        }
    }

    // ── Groups ──────────────────────────────────────────────────────────

    pub fn set_group_enabled(&self, id: &str, enabled: bool) -> Result<(), ControlError> {
        if self.engine.groups().set_enabled(id, enabled)? {
            Ok(())
        } else {
            Err(ControlError::GroupNotFound(id.to_string()))
        }
    }

    // ── Ad-hoc send ─────────────────────────────────────────────────────

    pub async fn send(
        &self,
        session_id: &str,
        recipient: &str,
        payload: SendPayload,
    ) -> Result<(), ControlError> {
        if recipient.trim().is_empty() {
            return Err(ControlError::Validation("Recipient is required".into()));
        }
        self.engine
            .sessions()
            .get(session_id)?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if self.engine.registry().phase(session_id).await != ConnectionPhase::Connected {
            return Err(SessionError::NotConnected(session_id.to_string()).into());
        }
        let handle = self
            .engine
            .registry()
            .handle(session_id)
            .await
            .ok_or_else(|| SessionError::NotConnected(session_id.to_string()))?;

        let http = self.engine.http();
        let asset_root = self.engine.config().asset_root();
        match payload {
            SendPayload::Text { body } => handle
                .send_text(recipient, &body)
                .await
                .map_err(ControlError::Link),
            SendPayload::Image { media_url, caption } => Ok(dispatch::send_media(
                handle.as_ref(),
                recipient,
                MediaKind::Image,
                &media_url,
                caption.as_deref(),
                http,
                asset_root,
            )
            .await?),
            SendPayload::Video { media_url, caption } => Ok(dispatch::send_media(
                handle.as_ref(),
                recipient,
                MediaKind::Video,
                &media_url,
                caption.as_deref(),
                http,
                asset_root,
            )
            .await?),
            SendPayload::Document { media_url, caption } => Ok(dispatch::send_media(
                handle.as_ref(),
                recipient,
                MediaKind::Document,
                &media_url,
                caption.as_deref(),
                http,
                asset_root,
            )
            .await?),
            SendPayload::Voice { media_url } => Ok(dispatch::send_media(
                handle.as_ref(),
                recipient,
                MediaKind::Voice,
                &media_url,
                None,
                http,
                asset_root,
            )
            .await?),
            SendPayload::Api {
                api_url,
                api_response_path,
            } => {
                let path = api_response_path
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "result".into());
                let value = dispatch::fetch_api_value(http, &api_url, &path).await?;
                handle
                    .send_text(recipient, &value)
                    .await
                    .map_err(ControlError::Link)
            }
        }
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    /// Fetch and extract without touching any state. Unlike inbound
    /// dispatch, the raw error detail goes back to the operator.
    pub async fn test_api(
        &self,
        api_url: &str,
        api_response_path: &str,
    ) -> Result<String, ControlError> {
        if api_url.trim().is_empty() {
            return Err(ControlError::Validation("API URL is required".into()));
        }
        let path = if api_response_path.is_empty() {
            "result"
        } else {
            api_response_path
        };
        Ok(dispatch::fetch_api_value(self.engine.http(), api_url, path).await?)
    }

    // ── Status ──────────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        let mut sessions = Vec::new();
        for record in self.engine.sessions().list()? {
            let runtime = self.engine.registry().snapshot(&record.id).await;
            sessions.push(SessionStatus {
                record,
                connection_phase: runtime.phase,
                qr_payload: runtime.qr,
            });
        }

        let mut commands = serde_json::Map::new();
        for (key, command) in self.engine.commands().entries()? {
            commands.insert(
                key,
                serde_json::to_value(command).map_err(crate::error::StoreError::Serialize)?,
            );
        }

        Ok(StatusSnapshot {
            sessions,
            commands,
            groups: self.engine.groups().list()?,
        })
    }
}

/// Engine methods return `GateError`; the control surface narrows that back
/// to its own taxonomy.
fn flatten_engine_error(error: GateError) -> ControlError {
    match error {
        GateError::Session(e) => ControlError::Session(e),
        GateError::Store(e) => ControlError::Store(e),
        GateError::Link(e) => ControlError::Link(e),
        GateError::Dispatch(e) => ControlError::Dispatch(e),
        GateError::Control(e) => e,
        other => ControlError::Validation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::link::memory::{MemoryTransport, Sent};
    use crate::link::LinkEvent;
    use std::sync::Arc;

    fn controller() -> (tempfile::TempDir, Controller, Arc<MemoryTransport>) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_data_dir(dir.path());
        let transport = Arc::new(MemoryTransport::new());
        let engine = Engine::new(config, transport.clone()).unwrap();
        (dir, Controller::new(engine), transport)
    }

    fn text_draft(response: &str) -> CommandDraft {
        CommandDraft {
            kind: Some("text".into()),
            response: Some(response.into()),
            ..CommandDraft::default()
        }
    }

    #[tokio::test]
    async fn create_session_requires_name() {
        let (_dir, controller, _t) = controller();
        let err = controller.create_session("  ").unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
        assert!(controller.engine().sessions().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_command_validates_type_specific_fields() {
        let (_dir, controller, _t) = controller();

        let missing_response = CommandDraft {
            kind: Some("text".into()),
            ..CommandDraft::default()
        };
        assert!(matches!(
            controller.add_command("menu", missing_response),
            Err(ControlError::Validation(_))
        ));

        let missing_api_url = CommandDraft {
            kind: Some("api".into()),
            ..CommandDraft::default()
        };
        assert!(matches!(
            controller.add_command("joke", missing_api_url),
            Err(ControlError::Validation(_))
        ));

        controller.add_command("menu", text_draft("1. A")).unwrap();
        assert!(controller.engine().commands().get("menu").unwrap().is_some());
    }

    #[tokio::test]
    async fn update_command_merges_partial_fields() {
        let (_dir, controller, _t) = controller();
        controller.add_command("menu", text_draft("1. A")).unwrap();

        controller
            .update_command(
                "menu",
                CommandDraft {
                    case_insensitive: Some(true),
                    ..CommandDraft::default()
                },
            )
            .unwrap();

        let command = controller.engine().commands().get("menu").unwrap().unwrap();
        assert!(command.case_insensitive);
        assert_eq!(
            command.action,
            CommandAction::Text {
                response: "1. A".into()
            }
        );
    }

    #[tokio::test]
    async fn update_command_unknown_key_is_not_found() {
        let (_dir, controller, _t) = controller();
        let err = controller
            .update_command("missing", text_draft("x"))
            .unwrap_err();
        assert!(matches!(err, ControlError::CommandNotFound(_)));
    }

    #[tokio::test]
    async fn send_requires_connected_session() {
        let (_dir, controller, _t) = controller();
        let session = controller.create_session("main").unwrap();

        let err = controller
            .send(
                &session.id,
                "555@s.whatsapp.net",
                SendPayload::Text { body: "hi".into() },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::Session(crate::error::SessionError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn send_text_reaches_link() {
        let (_dir, controller, transport) = controller();
        let session = controller.create_session("main").unwrap();
        let control = transport.control(&session.id);
        controller.connect_session(&session.id).await.unwrap();
        control.emit(LinkEvent::Open).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        controller
            .send(
                &session.id,
                "555@s.whatsapp.net",
                SendPayload::Text { body: "hi".into() },
            )
            .await
            .unwrap();

        assert!(control.sent().contains(&Sent::Text {
            chat: "555@s.whatsapp.net".into(),
            body: "hi".into(),
        }));
    }

    #[tokio::test]
    async fn status_annotates_sessions_with_runtime_state() {
        let (_dir, controller, transport) = controller();
        let session = controller.create_session("main").unwrap();
        let control = transport.control(&session.id);
        controller.connect_session(&session.id).await.unwrap();
        control.emit(LinkEvent::Qr("pair-me".into())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        controller.add_command("menu", text_draft("1. A")).unwrap();

        let status = controller.status().await.unwrap();

        assert_eq!(status.sessions.len(), 1);
        assert_eq!(
            status.sessions[0].connection_phase,
            ConnectionPhase::Connecting
        );
        assert_eq!(status.sessions[0].qr_payload.as_deref(), Some("pair-me"));
        assert!(status.commands.contains_key("menu"));
    }

    #[tokio::test]
    async fn group_toggle_unknown_id_is_not_found() {
        let (_dir, controller, _t) = controller();
        let err = controller.set_group_enabled("missing@g.us", false).unwrap_err();
        assert!(matches!(err, ControlError::GroupNotFound(_)));
    }
}
