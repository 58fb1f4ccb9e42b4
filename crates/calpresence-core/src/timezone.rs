//! Vendor time-zone names and local/UTC conversion helpers.
//!
//! Outlook reports the creation zone of a meeting either as a Windows
//! registry key name (`"Eastern Standard Time"`) or as the localised display
//! string shown in its UI (`"(UTC-05:00) Eastern Time (US & Canada)"`).
//! [`TimeZoneList`] maps both forms onto IANA zones, falling back to a zone
//! with the advertised UTC offset when the name is unknown.

use crate::source::AnalyticsSink;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Windows time-zone key name to IANA zone.
pub static WINDOWS_ZONES: &[(&str, &str)] = &[
    ("Dateline Standard Time", "Etc/GMT+12"),
    ("UTC-11", "Etc/GMT+11"),
    ("Aleutian Standard Time", "America/Adak"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
    ("Marquesas Standard Time", "Pacific/Marquesas"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("UTC-09", "Etc/GMT+9"),
    ("Pacific Standard Time (Mexico)", "America/Tijuana"),
    ("UTC-08", "Etc/GMT+8"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Mountain Standard Time (Mexico)", "America/Mazatlan"),
    ("Mountain Standard Time", "America/Denver"),
    ("Central America Standard Time", "America/Guatemala"),
    ("Central Standard Time", "America/Chicago"),
    ("Easter Island Standard Time", "Pacific/Easter"),
    ("Central Standard Time (Mexico)", "America/Mexico_City"),
    ("Canada Central Standard Time", "America/Regina"),
    ("SA Pacific Standard Time", "America/Bogota"),
    ("Eastern Standard Time (Mexico)", "America/Cancun"),
    ("Eastern Standard Time", "America/New_York"),
    ("Haiti Standard Time", "America/Port-au-Prince"),
    ("Cuba Standard Time", "America/Havana"),
    ("US Eastern Standard Time", "America/Indiana/Indianapolis"),
    ("Turks And Caicos Standard Time", "America/Grand_Turk"),
    ("Paraguay Standard Time", "America/Asuncion"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("Venezuela Standard Time", "America/Caracas"),
    ("Central Brazilian Standard Time", "America/Cuiaba"),
    ("SA Western Standard Time", "America/La_Paz"),
    ("Pacific SA Standard Time", "America/Santiago"),
    ("Newfoundland Standard Time", "America/St_Johns"),
    ("Tocantins Standard Time", "America/Araguaina"),
    ("E. South America Standard Time", "America/Sao_Paulo"),
    ("SA Eastern Standard Time", "America/Cayenne"),
    ("Argentina Standard Time", "America/Argentina/Buenos_Aires"),
    ("Greenland Standard Time", "America/Nuuk"),
    ("Montevideo Standard Time", "America/Montevideo"),
    ("Magallanes Standard Time", "America/Punta_Arenas"),
    ("Saint Pierre Standard Time", "America/Miquelon"),
    ("Bahia Standard Time", "America/Bahia"),
    ("UTC-02", "Etc/GMT+2"),
    ("Azores Standard Time", "Atlantic/Azores"),
    ("Cape Verde Standard Time", "Atlantic/Cape_Verde"),
    ("UTC", "Etc/UTC"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("Sao Tome Standard Time", "Africa/Sao_Tome"),
    ("Morocco Standard Time", "Africa/Casablanca"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("W. Central Africa Standard Time", "Africa/Lagos"),
    ("Jordan Standard Time", "Asia/Amman"),
    ("GTB Standard Time", "Europe/Bucharest"),
    ("Middle East Standard Time", "Asia/Beirut"),
    ("Egypt Standard Time", "Africa/Cairo"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("Syria Standard Time", "Asia/Damascus"),
    ("West Bank Standard Time", "Asia/Hebron"),
    ("South Africa Standard Time", "Africa/Johannesburg"),
    ("FLE Standard Time", "Europe/Kyiv"),
    ("Israel Standard Time", "Asia/Jerusalem"),
    ("South Sudan Standard Time", "Africa/Juba"),
    ("Kaliningrad Standard Time", "Europe/Kaliningrad"),
    ("Sudan Standard Time", "Africa/Khartoum"),
    ("Libya Standard Time", "Africa/Tripoli"),
    ("Namibia Standard Time", "Africa/Windhoek"),
    ("Arabic Standard Time", "Asia/Baghdad"),
    ("Turkey Standard Time", "Europe/Istanbul"),
    ("Arab Standard Time", "Asia/Riyadh"),
    ("Belarus Standard Time", "Europe/Minsk"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("E. Africa Standard Time", "Africa/Nairobi"),
    ("Iran Standard Time", "Asia/Tehran"),
    ("Arabian Standard Time", "Asia/Dubai"),
    ("Astrakhan Standard Time", "Europe/Astrakhan"),
    ("Azerbaijan Standard Time", "Asia/Baku"),
    ("Russia Time Zone 3", "Europe/Samara"),
    ("Mauritius Standard Time", "Indian/Mauritius"),
    ("Saratov Standard Time", "Europe/Saratov"),
    ("Georgian Standard Time", "Asia/Tbilisi"),
    ("Volgograd Standard Time", "Europe/Volgograd"),
    ("Caucasus Standard Time", "Asia/Yerevan"),
    ("Afghanistan Standard Time", "Asia/Kabul"),
    ("West Asia Standard Time", "Asia/Tashkent"),
    ("Ekaterinburg Standard Time", "Asia/Yekaterinburg"),
    ("Pakistan Standard Time", "Asia/Karachi"),
    ("Qyzylorda Standard Time", "Asia/Qyzylorda"),
    ("India Standard Time", "Asia/Kolkata"),
    ("Sri Lanka Standard Time", "Asia/Colombo"),
    ("Nepal Standard Time", "Asia/Kathmandu"),
    ("Central Asia Standard Time", "Asia/Almaty"),
    ("Bangladesh Standard Time", "Asia/Dhaka"),
    ("Omsk Standard Time", "Asia/Omsk"),
    ("Myanmar Standard Time", "Asia/Yangon"),
    ("SE Asia Standard Time", "Asia/Bangkok"),
    ("Altai Standard Time", "Asia/Barnaul"),
    ("W. Mongolia Standard Time", "Asia/Hovd"),
    ("North Asia Standard Time", "Asia/Krasnoyarsk"),
    ("N. Central Asia Standard Time", "Asia/Novosibirsk"),
    ("Tomsk Standard Time", "Asia/Tomsk"),
    ("China Standard Time", "Asia/Shanghai"),
    ("North Asia East Standard Time", "Asia/Irkutsk"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("W. Australia Standard Time", "Australia/Perth"),
    ("Taipei Standard Time", "Asia/Taipei"),
    ("Ulaanbaatar Standard Time", "Asia/Ulaanbaatar"),
    ("Aus Central W. Standard Time", "Australia/Eucla"),
    ("Transbaikal Standard Time", "Asia/Chita"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("North Korea Standard Time", "Asia/Pyongyang"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("Yakutsk Standard Time", "Asia/Yakutsk"),
    ("Cen. Australia Standard Time", "Australia/Adelaide"),
    ("AUS Central Standard Time", "Australia/Darwin"),
    ("E. Australia Standard Time", "Australia/Brisbane"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("West Pacific Standard Time", "Pacific/Port_Moresby"),
    ("Tasmania Standard Time", "Australia/Hobart"),
    ("Vladivostok Standard Time", "Asia/Vladivostok"),
    ("Lord Howe Standard Time", "Australia/Lord_Howe"),
    ("Bougainville Standard Time", "Pacific/Bougainville"),
    ("Russia Time Zone 10", "Asia/Srednekolymsk"),
    ("Magadan Standard Time", "Asia/Magadan"),
    ("Norfolk Standard Time", "Pacific/Norfolk"),
    ("Sakhalin Standard Time", "Asia/Sakhalin"),
    ("Central Pacific Standard Time", "Pacific/Guadalcanal"),
    ("Russia Time Zone 11", "Asia/Kamchatka"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    ("UTC+12", "Etc/GMT-12"),
    ("Fiji Standard Time", "Pacific/Fiji"),
    ("Chatham Islands Standard Time", "Pacific/Chatham"),
    ("UTC+13", "Etc/GMT-13"),
    ("Tonga Standard Time", "Pacific/Tongatapu"),
    ("Samoa Standard Time", "Pacific/Apia"),
    ("Line Islands Standard Time", "Pacific/Kiritimati"),
];

/// Outlook display-name tails (text after the offset prefix) to Windows key
/// names.
static DISPLAY_NAMES: &[(&str, &str)] = &[
    ("Coordinated Universal Time", "UTC"),
    ("Hawaii", "Hawaiian Standard Time"),
    ("Alaska", "Alaskan Standard Time"),
    ("Pacific Time (US & Canada)", "Pacific Standard Time"),
    ("Pacific Time (US and Canada); Tijuana", "Pacific Standard Time"),
    ("Arizona", "US Mountain Standard Time"),
    ("Mountain Time (US & Canada)", "Mountain Standard Time"),
    ("Central Time (US & Canada)", "Central Standard Time"),
    ("Guadalajara, Mexico City, Monterrey", "Central Standard Time (Mexico)"),
    ("Saskatchewan", "Canada Central Standard Time"),
    ("Bogota, Lima, Quito, Rio Branco", "SA Pacific Standard Time"),
    ("Eastern Time (US & Canada)", "Eastern Standard Time"),
    ("Indiana (East)", "US Eastern Standard Time"),
    ("Atlantic Time (Canada)", "Atlantic Standard Time"),
    ("Newfoundland", "Newfoundland Standard Time"),
    ("Brasilia", "E. South America Standard Time"),
    ("City of Buenos Aires", "Argentina Standard Time"),
    ("Buenos Aires", "Argentina Standard Time"),
    ("Santiago", "Pacific SA Standard Time"),
    ("Azores", "Azores Standard Time"),
    ("Dublin, Edinburgh, Lisbon, London", "GMT Standard Time"),
    ("Greenwich Mean Time : Dublin, Edinburgh, Lisbon, London", "GMT Standard Time"),
    ("Monrovia, Reykjavik", "Greenwich Standard Time"),
    ("Casablanca", "Morocco Standard Time"),
    ("Amsterdam, Berlin, Bern, Rome, Stockholm, Vienna", "W. Europe Standard Time"),
    ("Belgrade, Bratislava, Budapest, Ljubljana, Prague", "Central Europe Standard Time"),
    ("Brussels, Copenhagen, Madrid, Paris", "Romance Standard Time"),
    ("Sarajevo, Skopje, Warsaw, Zagreb", "Central European Standard Time"),
    ("West Central Africa", "W. Central Africa Standard Time"),
    ("Athens, Bucharest", "GTB Standard Time"),
    ("Athens, Bucharest, Istanbul", "GTB Standard Time"),
    ("Beirut", "Middle East Standard Time"),
    ("Cairo", "Egypt Standard Time"),
    ("Harare, Pretoria", "South Africa Standard Time"),
    ("Helsinki, Kyiv, Riga, Sofia, Tallinn, Vilnius", "FLE Standard Time"),
    ("Helsinki, Kiev, Riga, Sofia, Tallinn, Vilnius", "FLE Standard Time"),
    ("Jerusalem", "Israel Standard Time"),
    ("Amman", "Jordan Standard Time"),
    ("Baghdad", "Arabic Standard Time"),
    ("Istanbul", "Turkey Standard Time"),
    ("Kuwait, Riyadh", "Arab Standard Time"),
    ("Minsk", "Belarus Standard Time"),
    ("Moscow, St. Petersburg", "Russian Standard Time"),
    ("Moscow, St. Petersburg, Volgograd", "Russian Standard Time"),
    ("Nairobi", "E. Africa Standard Time"),
    ("Tehran", "Iran Standard Time"),
    ("Abu Dhabi, Muscat", "Arabian Standard Time"),
    ("Baku", "Azerbaijan Standard Time"),
    ("Tbilisi", "Georgian Standard Time"),
    ("Yerevan", "Caucasus Standard Time"),
    ("Kabul", "Afghanistan Standard Time"),
    ("Ashgabat, Tashkent", "West Asia Standard Time"),
    ("Ekaterinburg", "Ekaterinburg Standard Time"),
    ("Islamabad, Karachi", "Pakistan Standard Time"),
    ("Chennai, Kolkata, Mumbai, New Delhi", "India Standard Time"),
    ("Sri Jayawardenepura", "Sri Lanka Standard Time"),
    ("Kathmandu", "Nepal Standard Time"),
    ("Astana", "Central Asia Standard Time"),
    ("Dhaka", "Bangladesh Standard Time"),
    ("Yangon (Rangoon)", "Myanmar Standard Time"),
    ("Bangkok, Hanoi, Jakarta", "SE Asia Standard Time"),
    ("Krasnoyarsk", "North Asia Standard Time"),
    ("Novosibirsk", "N. Central Asia Standard Time"),
    ("Beijing, Chongqing, Hong Kong, Urumqi", "China Standard Time"),
    ("Irkutsk", "North Asia East Standard Time"),
    ("Kuala Lumpur, Singapore", "Singapore Standard Time"),
    ("Perth", "W. Australia Standard Time"),
    ("Taipei", "Taipei Standard Time"),
    ("Ulaanbaatar", "Ulaanbaatar Standard Time"),
    ("Osaka, Sapporo, Tokyo", "Tokyo Standard Time"),
    ("Seoul", "Korea Standard Time"),
    ("Yakutsk", "Yakutsk Standard Time"),
    ("Adelaide", "Cen. Australia Standard Time"),
    ("Darwin", "AUS Central Standard Time"),
    ("Brisbane", "E. Australia Standard Time"),
    ("Canberra, Melbourne, Sydney", "AUS Eastern Standard Time"),
    ("Guam, Port Moresby", "West Pacific Standard Time"),
    ("Hobart", "Tasmania Standard Time"),
    ("Vladivostok", "Vladivostok Standard Time"),
    ("Magadan", "Magadan Standard Time"),
    ("Solomon Is., New Caledonia", "Central Pacific Standard Time"),
    ("Auckland, Wellington", "New Zealand Standard Time"),
    ("Fiji", "Fiji Standard Time"),
    ("Nuku'alofa", "Tonga Standard Time"),
    ("Samoa", "Samoa Standard Time"),
    ("Kiritimati Island", "Line Islands Standard Time"),
];

/// Representative zones for offsets that are not whole hours.
static FRACTIONAL_OFFSETS: &[(i32, &str)] = &[
    (-570, "Pacific/Marquesas"),
    (-210, "America/St_Johns"),
    (210, "Asia/Tehran"),
    (270, "Asia/Kabul"),
    (330, "Asia/Kolkata"),
    (345, "Asia/Kathmandu"),
    (390, "Asia/Yangon"),
    (525, "Australia/Eucla"),
    (570, "Australia/Darwin"),
    (630, "Australia/Lord_Howe"),
    (765, "Pacific/Chatham"),
];

fn windows_index() -> &'static HashMap<String, &'static str> {
    static INDEX: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        WINDOWS_ZONES
            .iter()
            .map(|(key, iana)| (key.to_lowercase(), *iana))
            .collect()
    })
}

fn display_index() -> &'static HashMap<String, &'static str> {
    static INDEX: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        DISPLAY_NAMES
            .iter()
            .map(|(tail, key)| (tail.to_lowercase(), *key))
            .collect()
    })
}

/// Result of resolving a vendor zone name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneLookup {
    pub zone: Tz,
    /// False when the zone is a best-effort fallback.
    pub exact: bool,
}

/// Resolves vendor zone names and remembers which names needed a fallback.
pub struct TimeZoneList {
    default_zone: Tz,
    analytics: Arc<dyn AnalyticsSink>,
    unmapped: Mutex<BTreeSet<String>>,
}

impl std::fmt::Debug for TimeZoneList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeZoneList")
            .field("default_zone", &self.default_zone)
            .field("unmapped", &*self.unmapped.lock())
            .finish()
    }
}

impl TimeZoneList {
    pub fn new(default_zone: Tz, analytics: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            default_zone,
            analytics,
            unmapped: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn default_zone(&self) -> Tz {
        self.default_zone
    }

    /// Resolve a zone name, recording and reporting fallbacks.
    pub fn resolve(&self, name: &str) -> ZoneLookup {
        let lookup = lookup_zone(name).unwrap_or_else(|| {
            let zone = parse_offset_prefix(name)
                .and_then(zone_for_offset)
                .unwrap_or(self.default_zone);
            ZoneLookup { zone, exact: false }
        });

        if !lookup.exact {
            let first_time = self.unmapped.lock().insert(name.to_string());
            if first_time {
                warn!(zone_name = %name, fallback = %lookup.zone, "Unrecognised time zone, using fallback");
                self.analytics.unknown_time_zone(name, lookup.zone.name());
            } else {
                debug!(zone_name = %name, "Unrecognised time zone already reported");
            }
        }
        lookup
    }

    /// Names that could not be mapped exactly, in sorted order.
    pub fn unmapped_names(&self) -> Vec<String> {
        self.unmapped.lock().iter().cloned().collect()
    }
}

/// Exact lookup: IANA name, Windows key name, or a known display name.
pub fn lookup_zone(name: &str) -> Option<ZoneLookup> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(zone) = Tz::from_str(trimmed) {
        return Some(ZoneLookup { zone, exact: true });
    }

    let lower = trimmed.to_lowercase();
    if let Some(iana) = windows_index().get(&lower) {
        return Tz::from_str(iana).ok().map(|zone| ZoneLookup { zone, exact: true });
    }

    let tail = strip_offset_prefix(trimmed).to_lowercase();
    display_index()
        .get(&tail)
        .and_then(|key| windows_index().get(&key.to_lowercase()))
        .and_then(|iana| Tz::from_str(iana).ok())
        .map(|zone| ZoneLookup { zone, exact: true })
}

/// Text following a `(UTC+hh:mm)` / `(GMT-hh:mm)` / `(UTC)` prefix.
fn strip_offset_prefix(name: &str) -> &str {
    let trimmed = name.trim_start();
    if trimmed.starts_with('(') {
        if let Some(close) = trimmed.find(')') {
            return trimmed[close + 1..].trim();
        }
    }
    trimmed.trim()
}

/// Offset in minutes east of UTC advertised by a display-name prefix.
pub fn parse_offset_prefix(name: &str) -> Option<i32> {
    let trimmed = name.trim_start();
    let inner = trimmed.strip_prefix('(')?;
    let close = inner.find(')')?;
    let inner = &inner[..close];
    let rest = inner
        .strip_prefix("UTC")
        .or_else(|| inner.strip_prefix("GMT"))?
        .trim();

    if rest.is_empty() {
        return Some(0);
    }

    let (sign, digits) = match rest.as_bytes()[0] {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (digits.parse::<i32>().ok()?, 0),
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

/// Best-effort zone for a fixed UTC offset.
pub fn zone_for_offset(offset_minutes: i32) -> Option<Tz> {
    if offset_minutes % 60 == 0 {
        let hours = offset_minutes / 60;
        let name = match hours {
            0 => "Etc/UTC".to_string(),
            // Etc/GMT signs are inverted: Etc/GMT-5 is five hours east.
            h if h > 0 => format!("Etc/GMT-{}", h),
            h => format!("Etc/GMT+{}", -h),
        };
        return Tz::from_str(&name).ok();
    }
    FRACTIONAL_OFFSETS
        .iter()
        .find(|(offset, _)| *offset == offset_minutes)
        .and_then(|(_, iana)| Tz::from_str(iana).ok())
}

/// Midnight, 1 January 1601: the origin of MAPI minute counts.
pub fn mapi_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1601, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Convert a MAPI minute count to a local (zone-less) date-time.
pub fn minutes_to_local(minutes: u32) -> Option<NaiveDateTime> {
    mapi_epoch().checked_add_signed(Duration::minutes(i64::from(minutes)))
}

/// Convert a local date-time back to a MAPI minute count.
pub fn local_to_minutes(local: NaiveDateTime) -> i64 {
    (local - mapi_epoch()).num_minutes()
}

/// Interpret a local date-time in `tz`, using the offset in force on that
/// date.
///
/// Times skipped by a spring-forward transition move one hour later;
/// ambiguous times resolve to the earlier instant.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => {
            let shifted = local + Duration::hours(1);
            match tz.from_local_datetime(&shifted).earliest() {
                Some(dt) => dt.with_timezone(&Utc),
                None => Utc.from_utc_datetime(&local),
            }
        }
    }
}

/// Local date-time of a UTC instant in `tz`.
pub fn utc_to_local(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}
