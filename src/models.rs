pub const NOTIFICATION_TITLE: &str = "Czas na leki! 💊";

/// Where a tapped reminder lands inside the PWA.
const HEALTH_LINK: &str = "/health";
const ICON_PATH: &str = "/pwa-192x192.png";

/// Sentinel in `schedule.days` meaning the reminder fires every day.
pub const EVERY_DAY: &str = "Codziennie";

/// A medication entry as the health UI stores it under
/// `users/{uid}/medical_meds`.
#[derive(Clone, Debug)]
pub struct MedicationSchedule {
    pub name: String,
    pub dosage: String,
    pub schedule: ReminderSchedule,
}

#[derive(Clone, Debug)]
pub struct ReminderSchedule {
    /// Zero-padded 24-hour "HH:MM", local to the schedule timezone.
    pub time: String,
    /// Weekday labels, or [`EVERY_DAY`].
    pub days: Vec<String>,
}

/// One multicast push, built fresh per due medication per tick and discarded
/// after the send.
#[derive(Clone, Debug)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub link: String,
    pub icon: String,
    pub tokens: Vec<String>,
}

impl NotificationPayload {
    pub fn for_medication(med: &MedicationSchedule, tokens: Vec<String>) -> NotificationPayload {
        NotificationPayload {
            title: String::from(NOTIFICATION_TITLE),
            body: format!("Przypomnienie: {} ({})", med.name, med.dosage),
            link: String::from(HEALTH_LINK),
            icon: String::from(ICON_PATH),
            tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_interpolates_name_and_dosage() {
        let med = MedicationSchedule {
            name: String::from("Aspiryna"),
            dosage: String::from("1 tabletka"),
            schedule: ReminderSchedule {
                time: String::from("08:00"),
                days: vec![String::from(EVERY_DAY)],
            },
        };
        let payload = NotificationPayload::for_medication(&med, vec![String::from("tok-a")]);
        assert_eq!(payload.title, "Czas na leki! 💊");
        assert_eq!(payload.body, "Przypomnienie: Aspiryna (1 tabletka)");
        assert_eq!(payload.link, "/health");
        assert_eq!(payload.tokens, vec![String::from("tok-a")]);
    }
}
