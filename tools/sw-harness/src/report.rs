//! One JSON line per dispatched event.

use pressing_sw::{EventOutcome, Handled, RouteOutcome};
use serde_json::{json, Value as JsonValue};

pub fn outcome_line(event: &str, outcome: &EventOutcome) -> JsonValue {
    match outcome {
        EventOutcome::Completed(handled) => {
            let mut line = handled_fields(handled);
            if let JsonValue::Object(fields) = &mut line {
                fields.insert("event".into(), json!(event));
                fields.insert("status".into(), json!("completed"));
            }
            line
        }
        EventOutcome::Failed { category, reason } => json!({
            "event": event,
            "status": "failed",
            "category": category,
            "reason": reason,
        }),
    }
}

fn handled_fields(handled: &Handled) -> JsonValue {
    match handled {
        Handled::Installed { precached } => json!({ "precached": precached }),
        Handled::Activated { evicted } => json!({ "evicted": evicted }),
        Handled::Responded { status, from_cache } => {
            json!({ "response": status, "from_cache": from_cache })
        }
        Handled::Shown { tag } => json!({ "shown": tag }),
        Handled::Routed(route) => match route {
            RouteOutcome::Dismissed => json!({ "route": "dismissed" }),
            RouteOutcome::Focused { client_id, url } => {
                json!({ "route": "focused", "client": client_id, "url": url.as_str() })
            }
            RouteOutcome::Opened { client_id, url } => {
                json!({ "route": "opened", "client": client_id, "url": url.as_str() })
            }
            RouteOutcome::Abandoned => json!({ "route": "abandoned" }),
        },
        Handled::Closed { tracked } => json!({ "tracked": tracked }),
        Handled::Replied(reply) => json!({ "reply": reply }),
        Handled::Synced => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressing_sw::ControlReply;
    use url::Url;

    #[test]
    fn test_completed_line() {
        let outcome = EventOutcome::Completed(Handled::Replied(Some(ControlReply::Version {
            version: "v1".into(),
        })));
        assert_eq!(
            outcome_line("message", &outcome),
            json!({"event": "message", "status": "completed", "reply": {"version": "v1"}})
        );
    }

    #[test]
    fn test_route_line() {
        let outcome = EventOutcome::Completed(Handled::Routed(RouteOutcome::Opened {
            client_id: "client-1".into(),
            url: Url::parse("http://localhost:3000/pressing/orders/123").unwrap(),
        }));
        let line = outcome_line("notificationclick", &outcome);
        assert_eq!(line["route"], "opened");
        assert_eq!(line["url"], "http://localhost:3000/pressing/orders/123");
    }

    #[test]
    fn test_failed_line() {
        let outcome = EventOutcome::Failed {
            category: "notification",
            reason: "Permission denied".into(),
        };
        assert_eq!(
            outcome_line("push", &outcome),
            json!({
                "event": "push",
                "status": "failed",
                "category": "notification",
                "reason": "Permission denied"
            })
        );
    }
}
