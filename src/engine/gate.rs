use crate::error::StoreError;
use crate::link::{InboundMessage, LinkHandle};
use crate::store::{GroupStore, SessionRecord};

/// Decide whether command dispatch should run for an inbound message.
///
/// Two levels: the session-wide kill switch, then the per-group opt-out. A
/// group seen for the first time is registered enabled, with its display
/// name fetched from group metadata; processing continues for that message.
pub async fn allows_dispatch(
    session: &SessionRecord,
    message: &InboundMessage,
    groups: &GroupStore,
    handle: &dyn LinkHandle,
) -> Result<bool, StoreError> {
    if !session.commands_enabled {
        return Ok(false);
    }

    if message.is_group {
        match groups.get(&message.chat)? {
            Some(group) if !group.enabled => return Ok(false),
            Some(_) => {}
            None => {
                // Metadata fetch is best-effort; the group id is a usable
                // fallback name.
                let name = match handle.group_subject(&message.chat).await {
                    Ok(subject) => subject,
                    Err(error) => {
                        tracing::debug!(group = %message.chat, %error, "group metadata unavailable");
                        message.chat.clone()
                    }
                };
                groups.register(&message.chat, &name)?;
            }
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{MemoryTransport, Transport};
    use chrono::Utc;
    use std::path::Path;

    fn session(commands_enabled: bool) -> SessionRecord {
        SessionRecord {
            id: "s1".into(),
            name: "main".into(),
            enabled: true,
            commands_enabled,
            created_at: Utc::now(),
        }
    }

    fn message(chat: &str, is_group: bool) -> InboundMessage {
        InboundMessage {
            id: "m1".into(),
            chat: chat.into(),
            body: "menu".into(),
            from_me: false,
            is_group,
        }
    }

    async fn harness() -> (
        tempfile::TempDir,
        GroupStore,
        std::sync::Arc<dyn LinkHandle>,
        crate::link::memory::MemoryLinkControl,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let groups = GroupStore::open(dir.path().join("groups.json")).unwrap();
        let transport = MemoryTransport::new();
        let control = transport.control("s1");
        let (handle, _rx) = transport.open("s1", Path::new("")).await.unwrap();
        (dir, groups, handle, control)
    }

    #[tokio::test]
    async fn session_kill_switch_blocks_everything() {
        let (_dir, groups, handle, _ctl) = harness().await;
        let allowed = allows_dispatch(
            &session(false),
            &message("123@g.us", true),
            &groups,
            handle.as_ref(),
        )
        .await
        .unwrap();
        assert!(!allowed);
        // Gated before group handling: nothing auto-registered.
        assert!(groups.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_group_blocks_dispatch() {
        let (_dir, groups, handle, _ctl) = harness().await;
        groups.register("123@g.us", "Class").unwrap();
        groups.set_enabled("123@g.us", false).unwrap();

        let allowed = allows_dispatch(
            &session(true),
            &message("123@g.us", true),
            &groups,
            handle.as_ref(),
        )
        .await
        .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn unknown_group_is_registered_enabled_and_processing_continues() {
        let (_dir, groups, handle, control) = harness().await;
        control.set_group_name("123@g.us", "Class of 2024");

        let allowed = allows_dispatch(
            &session(true),
            &message("123@g.us", true),
            &groups,
            handle.as_ref(),
        )
        .await
        .unwrap();

        assert!(allowed);
        let record = groups.get("123@g.us").unwrap().unwrap();
        assert!(record.enabled);
        assert_eq!(record.name, "Class of 2024");
    }

    #[tokio::test]
    async fn second_message_does_not_duplicate_registration() {
        let (_dir, groups, handle, control) = harness().await;
        control.set_group_name("123@g.us", "Class");

        for _ in 0..2 {
            allows_dispatch(
                &session(true),
                &message("123@g.us", true),
                &groups,
                handle.as_ref(),
            )
            .await
            .unwrap();
        }
        assert_eq!(groups.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn metadata_failure_falls_back_to_group_id() {
        let (_dir, groups, handle, _ctl) = harness().await;

        let allowed = allows_dispatch(
            &session(true),
            &message("987@g.us", true),
            &groups,
            handle.as_ref(),
        )
        .await
        .unwrap();

        assert!(allowed);
        assert_eq!(groups.get("987@g.us").unwrap().unwrap().name, "987@g.us");
    }

    #[tokio::test]
    async fn private_chat_skips_group_gate() {
        let (_dir, groups, handle, _ctl) = harness().await;
        let allowed = allows_dispatch(
            &session(true),
            &message("555@s.whatsapp.net", false),
            &groups,
            handle.as_ref(),
        )
        .await
        .unwrap();
        assert!(allowed);
        assert!(groups.list().unwrap().is_empty());
    }
}
