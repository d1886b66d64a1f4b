use chrono::{DateTime, Utc};

pub const NO_CONTACT: &str = "No contact";

/// Short card date, e.g. `Mar 4`.
pub fn format_last_contact(last_contact: Option<DateTime<Utc>>) -> String {
    match last_contact {
        Some(at) => at.format("%b %-d").to_string(),
        None => NO_CONTACT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn formats_month_and_unpadded_day() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap();
        assert_eq!(format_last_contact(Some(at)), "Mar 4");
        let at = Utc.with_ymd_and_hms(2024, 11, 23, 0, 0, 0).unwrap();
        assert_eq!(format_last_contact(Some(at)), "Nov 23");
    }

    #[test]
    fn missing_contact_has_placeholder() {
        assert_eq!(format_last_contact(None), "No contact");
    }
}
