//! One-shot conversation commands: contact, chats, show, send.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use shared::models::{ConversationSummary, Message, PartyId};
use uuid::Uuid;

use super::api::ApiClient;

pub async fn contact(api: &ApiClient, other_party: &str, topic: Option<&str>) -> Result<()> {
    let resolved = api.resolve(other_party, topic).await?;
    let state = if resolved.created { "started" } else { "existing" };
    println!("{} ({state})", resolved.conversation_id);
    Ok(())
}

pub async fn chats(api: &ApiClient) -> Result<()> {
    let conversations = api.conversations().await?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    for summary in &conversations {
        println!("{}", summary_line(summary));
    }
    Ok(())
}

pub async fn show(api: &ApiClient, conversation_id: Uuid) -> Result<()> {
    let detail = api.detail(conversation_id).await?;
    let other = detail
        .other_profile
        .as_ref()
        .map_or(detail.other_party.as_str(), |profile| profile.display_name.as_str());
    println!("Conversation with {other}");
    if let Some(topic) = &detail.topic {
        println!("About: {}", topic.title);
    }
    for message in &detail.messages {
        println!("{}", message_line(message, &detail.other_party));
    }
    Ok(())
}

pub async fn send(api: &ApiClient, conversation_id: Uuid, body: &str) -> Result<()> {
    let message = api.send(conversation_id, body).await?;
    println!("sent {} at {}", message.id, local_time(message.created_at));
    Ok(())
}

pub(crate) fn summary_line(summary: &ConversationSummary) -> String {
    let who = summary
        .other_profile
        .as_ref()
        .map_or(summary.other_party.as_str(), |profile| profile.display_name.as_str());
    let topic = summary
        .topic
        .as_ref()
        .map(|topic| format!(" [{}]", topic.title))
        .unwrap_or_default();
    let when = summary
        .last_activity_at
        .map_or_else(|| "-".to_string(), local_time);
    let preview = summary.preview_text.as_deref().unwrap_or("");
    format!("{}  {when}  {who}{topic}  {preview}", summary.id)
}

/// Renders a message; anything not sent by `other_party` is shown as "you".
pub(crate) fn message_line(message: &Message, other_party: &PartyId) -> String {
    let who = if &message.sender_id == other_party {
        message.sender_id.as_str()
    } else {
        "you"
    };
    format!("[{}] {who}: {}", local_time(message.created_at), message.body)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{PartyProfile, TopicId, TopicSummary};

    fn message(sender: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: PartyId::new(sender),
            body: "Still have the apples?".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn own_messages_render_as_you() {
        let other = PartyId::new("u1");
        assert!(message_line(&message("u2"), &other).contains("you: Still have the apples?"));
        assert!(message_line(&message("u1"), &other).contains("u1: Still have the apples?"));
    }

    #[test]
    fn summary_prefers_display_name_and_topic_title() {
        let summary = ConversationSummary {
            id: Uuid::new_v4(),
            topic_id: Some(TopicId::new("p42")),
            other_party: PartyId::new("u1"),
            other_profile: Some(PartyProfile {
                party_id: PartyId::new("u1"),
                display_name: "Sunny Side Orchard".into(),
                avatar_url: None,
            }),
            topic: Some(TopicSummary {
                id: TopicId::new("p42"),
                title: "Honeycrisp apples, 5kg".into(),
                image_url: None,
            }),
            preview_text: Some("Still have the apples?".into()),
            last_activity_at: None,
        };
        let line = summary_line(&summary);
        assert!(line.contains("Sunny Side Orchard [Honeycrisp apples, 5kg]"));
        assert!(line.contains("  -  "));
        assert!(line.ends_with("Still have the apples?"));
    }

    #[test]
    fn summary_falls_back_to_party_id() {
        let summary = ConversationSummary {
            id: Uuid::new_v4(),
            topic_id: None,
            other_party: PartyId::new("u9"),
            other_profile: None,
            topic: None,
            preview_text: None,
            last_activity_at: None,
        };
        assert!(summary_line(&summary).contains("u9"));
    }
}
