use chrono::{DateTime, FixedOffset, NaiveDate, Utc, Weekday};

/// Offset of the exchange timezone (Asia/Shanghai, no DST).
const CHINA_OFFSET_SECONDS: i32 = 8 * 3600;

/// The fixed UTC+8 exchange timezone.
pub fn china_tz() -> FixedOffset {
    FixedOffset::east_opt(CHINA_OFFSET_SECONDS).expect("UTC+8 is a valid offset")
}

/// Current wall-clock time in the exchange timezone.
pub fn china_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&china_tz())
}

/// Today's date in the exchange timezone.
pub fn china_today() -> NaiveDate {
    china_now().date_naive()
}

/// English weekday name used in prompt contexts.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
