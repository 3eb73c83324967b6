//! Static code→name catalog and the five-level resolution chain (§4.5).
//!
//! The catalog and the chain are both pure and immutable after startup —
//! no protocol-specific state leaks in here. Each decoder still keeps its
//! own private code-translation table (e.g. GT06's alarm-bit table, AAA's
//! event table) and is expected to have already turned that into either an
//! explicit numeric code or one of the other resolution inputs before
//! calling [`resolve`].

use crate::packet::EventCode;

/// code → human name. Ordered by code for readability, not lookup speed.
const CATALOG: &[(i32, &str)] = &[
    (1, "SOS"),
    (20, "Fence In Alarm"),
    (21, "Fence Out Alarm"),
    (23, "Power Cut Alarm"),
    (35, "Normal Location"),
    (50, "Alarm"),
    (79, "Shock Alarm"),
];

/// Looks up a known code's name, or synthesizes `"Event {code}"` for an
/// unrecognized one rather than failing the whole packet (§8: `Name`
/// may equal the original raw tag for unrecognized events).
pub fn name_for_code(code: i32) -> String {
    CATALOG
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Event {code}"))
}

/// Reverse lookup used by resolution level (iii): an `AlarmType` string
/// that matches a catalog name case-insensitively resolves to that code.
pub fn code_for_name(name: &str) -> Option<i32> {
    let needle = name.trim().to_ascii_lowercase();
    CATALOG
        .iter()
        .find(|(_, n)| n.to_ascii_lowercase() == needle)
        .map(|(c, _)| *c)
}

/// Keyword scan used by resolution levels (iv)/(v). Order matters: SOS
/// before the generic "alarm" scan would be wrong the other way around,
/// since "alarm" is a substring of several other phrases.
fn scan_keywords(text: &str) -> Option<i32> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("sos") {
        Some(1)
    } else if lower.contains("fence in") || lower.contains("fence-in") {
        Some(20)
    } else if lower.contains("fence out") || lower.contains("fence-out") {
        Some(21)
    } else if lower.contains("power cut") {
        Some(23)
    } else if lower.contains("shock") {
        Some(79)
    } else {
        None
    }
}

/// Inputs available to the resolver, gathered by the caller from an
/// intermediate record. Each is optional; absence simply skips that level.
#[derive(Debug, Default, Clone)]
pub struct ResolutionInputs<'a> {
    /// (i) explicit numeric code already decoded from the wire.
    pub explicit_code: Option<i32>,
    /// (ii) `AlarmAndLanguage.EventCode`, also a numeric code.
    pub alarm_and_language_code: Option<i32>,
    /// (iii) `AlarmType` string, reverse-looked-up against the catalog.
    pub alarm_type: Option<&'a str>,
    /// (iv) the raw `Message` field, keyword-scanned.
    pub message: Option<&'a str>,
    /// (v) a rendered terminal-information string, keyword-scanned.
    pub terminal_info: Option<&'a str>,
}

/// The five-level fallback chain from §4.5: first source that yields a
/// code wins; no source yielding anything falls to 35 "Normal Location".
pub fn resolve(inputs: &ResolutionInputs) -> EventCode {
    if let Some(code) = inputs.explicit_code {
        return EventCode::new(code, name_for_code(code));
    }
    if let Some(code) = inputs.alarm_and_language_code {
        return EventCode::new(code, name_for_code(code));
    }
    if let Some(alarm_type) = inputs.alarm_type {
        if let Some(code) = code_for_name(alarm_type) {
            return EventCode::new(code, name_for_code(code));
        }
    }
    if let Some(message) = inputs.message {
        if let Some(code) = scan_keywords(message) {
            return EventCode::new(code, name_for_code(code));
        }
    }
    if let Some(terminal_info) = inputs.terminal_info {
        if let Some(code) = scan_keywords(terminal_info) {
            return EventCode::new(code, name_for_code(code));
        }
    }
    EventCode::normal_location()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_code_wins_over_everything_else() {
        let inputs = ResolutionInputs {
            explicit_code: Some(1),
            message: Some("Power Cut detected"),
            ..Default::default()
        };
        assert_eq!(resolve(&inputs), EventCode::new(1, "SOS"));
    }

    #[test]
    fn alarm_type_reverse_lookup_is_case_insensitive() {
        let inputs = ResolutionInputs {
            alarm_type: Some("power cut alarm"),
            ..Default::default()
        };
        assert_eq!(resolve(&inputs), EventCode::new(23, "Power Cut Alarm"));
    }

    #[test]
    fn message_keyword_scan_falls_back_correctly() {
        let inputs = ResolutionInputs {
            message: Some("device reports Shock event"),
            ..Default::default()
        };
        assert_eq!(resolve(&inputs), EventCode::new(79, "Shock Alarm"));
    }

    #[test]
    fn no_matching_source_defaults_to_normal_location() {
        let inputs = ResolutionInputs::default();
        assert_eq!(resolve(&inputs), EventCode::normal_location());
    }

    #[test]
    fn unrecognized_explicit_code_still_resolves_with_synthesized_name() {
        let inputs = ResolutionInputs {
            explicit_code: Some(999),
            ..Default::default()
        };
        assert_eq!(resolve(&inputs), EventCode::new(999, "Event 999"));
    }
}
