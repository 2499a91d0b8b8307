//! Event construction and inspection helpers.
//!
//! Canned constructors for the well-known event kinds, plus the validation,
//! sanitizing and classification predicates callers apply before publishing.

use crate::core::{generate_id, Event, EventKind};
use regex::Regex;
use std::sync::OnceLock;

/// E.164-style phone number: optional `+`, no leading zero, up to 15 digits.
fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("static regex is valid"))
}

/// Kinds that should be surfaced immediately by downstream channels.
const URGENT_KINDS: [&str; 3] = ["SEGURANCA", "MANUTENCAO", "SISTEMA"];

impl Event {
    /// True when kind, title, body and recipient are all non-blank.
    pub fn is_valid(&self) -> bool {
        [&self.kind, &self.title, &self.body, &self.recipient]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    /// One-line description, e.g. `[PROMOCAO] Offer for a@b.com`.
    pub fn summary(&self) -> String {
        format!("[{}] {} for {}", self.kind, self.title, self.recipient)
    }

    /// Compact representation used in structured log lines.
    pub fn to_log_string(&self) -> String {
        format!(
            "Event[id={}, kind={}, recipient={}, created_at={}]",
            self.id, self.kind, self.recipient, self.created_at
        )
    }

    /// Returns a normalized copy: trimmed fields, upper-case kind,
    /// lower-case recipient, and an id generated if none was set.
    pub fn sanitized(&self) -> Event {
        let id = match self.id.trim() {
            "" => generate_id(),
            id => id.to_string(),
        };
        Event {
            id,
            kind: self.kind.trim().to_uppercase(),
            title: self.title.trim().to_string(),
            body: self.body.trim().to_string(),
            recipient: self.recipient.trim().to_lowercase(),
            created_at: self.created_at,
        }
    }

    pub fn has_email_recipient(&self) -> bool {
        self.recipient.contains('@')
    }

    pub fn has_phone_recipient(&self) -> bool {
        phone_pattern().is_match(&self.recipient)
    }

    pub fn is_urgent(&self) -> bool {
        URGENT_KINDS.contains(&self.kind.as_str())
    }
}

/// Constructors for the predefined notification events.
pub struct EventFactory;

impl EventFactory {
    pub fn welcome(recipient: &str) -> Event {
        EventKind::Welcome.to_event(
            "Welcome!",
            "Thanks for signing up to our platform!",
            recipient,
        )
    }

    pub fn promotion(recipient: &str, description: &str) -> Event {
        EventKind::Promotion.to_event(
            "Special offer!",
            format!("Don't miss this opportunity: {description}"),
            recipient,
        )
    }

    pub fn maintenance(recipient: &str, scheduled_for: &str) -> Event {
        EventKind::Maintenance.to_event(
            "Scheduled maintenance",
            format!("The system will enter maintenance at: {scheduled_for}"),
            recipient,
        )
    }

    pub fn security(recipient: &str, alert: &str) -> Event {
        EventKind::Security.to_event("Security alert", format!("Detected: {alert}"), recipient)
    }

    /// A plain notification carrying `message` as its body.
    pub fn notify(message: &str, recipient: &str) -> Event {
        EventKind::Notification.to_event("Notification", message, recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_requires_all_display_fields() {
        let valid = Event::new("TESTE", "Valid title", "Valid body", "dest@example.com");
        assert!(valid.is_valid());
        assert!(!Event::default().is_valid());
        assert!(!Event::new("TESTE", "  ", "body", "dest@example.com").is_valid());
    }

    #[test]
    fn test_factory_events_are_valid_and_identified() {
        let welcome = EventFactory::welcome("new@user.com");
        let promotion = EventFactory::promotion("client@example.com", "Black Friday 70% OFF");

        assert_eq!(welcome.kind, "BOAS_VINDAS");
        assert_eq!(welcome.recipient, "new@user.com");
        assert_eq!(promotion.kind, "PROMOCAO");
        assert!(promotion.body.contains("Black Friday"));

        for event in [
            welcome,
            promotion,
            EventFactory::maintenance("ops@example.com", "2025-12-01 02:00"),
            EventFactory::security("admin@example.com", "brute force"),
            EventFactory::notify("Your purchase was approved!", "buyer@example.com"),
        ] {
            assert!(event.is_valid(), "event should be valid: {:?}", event);
            assert!(!event.id.is_empty());
        }
    }

    #[test]
    fn test_notify_builds_notification_kind() {
        let event = EventFactory::notify("Your purchase was approved!", "buyer@example.com");
        assert_eq!(event.kind, "NOTIFICACAO");
        assert_eq!(event.body, "Your purchase was approved!");
        assert_eq!(event.recipient, "buyer@example.com");
    }

    #[test]
    fn test_sanitized_normalizes_fields() {
        let event = Event::new(" promocao ", " Offer ", " 50% off ", " A@B.com ");
        let clean = event.sanitized();
        assert_eq!(clean.kind, "PROMOCAO");
        assert_eq!(clean.title, "Offer");
        assert_eq!(clean.body, "50% off");
        assert_eq!(clean.recipient, "a@b.com");
        assert_eq!(clean.id.len(), 36);

        let kept = Event::new("X", "t", "b", "r").with_id(" evt-7 ").sanitized();
        assert_eq!(kept.id, "evt-7");
    }

    #[test]
    fn test_recipient_classification() {
        let email = Event::new("TESTE", "t", "b", "someone@example.com");
        assert!(email.has_email_recipient());
        assert!(!email.has_phone_recipient());

        let phone = Event::new("TESTE", "t", "b", "+5511999998888");
        assert!(phone.has_phone_recipient());
        assert!(!phone.has_email_recipient());

        assert!(!Event::new("TESTE", "t", "b", "0123").has_phone_recipient());
    }

    #[test]
    fn test_urgency_and_summary() {
        let event = EventFactory::security("admin@example.com", "new device");
        assert!(event.is_urgent());
        assert!(!EventFactory::welcome("x@y.z").is_urgent());
        assert_eq!(
            Event::new("PROMOCAO", "Offer", "b", "a@b.com").summary(),
            "[PROMOCAO] Offer for a@b.com"
        );
        assert!(event.to_log_string().starts_with("Event[id="));
    }
}
