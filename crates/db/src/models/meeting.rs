//! Meeting model and DTOs.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use idyll_core::access::{Assignable, FieldScope};
use idyll_core::types::{EntityId, Timestamp};

use super::{null_as_default, FieldUpdate};

/// A row from the `meetings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: EntityId,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attendees: Vec<EntityId>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub created_by: Option<EntityId>,
}

impl Meeting {
    /// `HH:MM`, as shown in invitations.
    pub fn time_label(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

impl Assignable for Meeting {
    fn is_assigned_to(&self, user_id: EntityId) -> bool {
        self.attendees.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeeting {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub link: String,
    pub attendees: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeetingField {
    Name(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Link(String),
    Attendees(Vec<EntityId>),
}

impl FieldUpdate for MeetingField {
    fn column(&self) -> &'static str {
        match self {
            MeetingField::Name(_) => "name",
            MeetingField::Date(_) => "date",
            MeetingField::Time(_) => "time",
            MeetingField::Link(_) => "link",
            MeetingField::Attendees(_) => "attendees",
        }
    }

    fn value(&self) -> Value {
        match self {
            MeetingField::Name(v) | MeetingField::Link(v) => json!(v),
            MeetingField::Date(v) => json!(v),
            MeetingField::Time(v) => json!(v),
            MeetingField::Attendees(v) => json!(v),
        }
    }

    fn scope(&self) -> FieldScope {
        FieldScope::ManagerOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn attendees_decide_assignment() {
        let attendee = Uuid::new_v4();
        let meeting: Meeting = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "Review",
            "date": "2026-06-02",
            "time": "14:30:00",
            "link": null,
            "attendees": [attendee],
            "created_at": "2026-06-01T08:00:00Z",
        }))
        .unwrap();
        assert!(meeting.is_assigned_to(attendee));
        assert!(!meeting.is_assigned_to(Uuid::new_v4()));
        assert_eq!(meeting.time_label(), "14:30");
        assert_eq!(meeting.link, "");
    }
}
