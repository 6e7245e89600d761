//! Tolerant extraction of `key=value` tokens and known phrases from the
//! free-text raw telemetry log. Lines are vendor reprs, not a stable format,
//! so everything here degrades to `None` instead of failing.

use crate::domain::models::EventKind;

pub const CHARGING_MARKER: &str = "ChargingState.CHARGING";
pub const READY_MARKER: &str = "ChargingState.READY_FOR_CHARGING";
pub const CHARGING_DATA_PREFIX: &str = "Charging data fetched:";
pub const POSITION_PREFIX: &str = "Vehicle positions fetched:";

/// Maps a charging-state marker in a log line to an event kind. The READY
/// marker must be probed before the CHARGING one; a READY line also passes a
/// plain substring check for the shorter marker family.
pub fn charging_state_event(message: &str) -> Option<EventKind> {
    if message.contains(READY_MARKER) {
        Some(EventKind::Stop)
    } else if message.contains(CHARGING_MARKER) {
        Some(EventKind::Start)
    } else {
        None
    }
}

pub fn extract_f64_token(message: &str, key: &str) -> Option<f64> {
    token_text(message, key)?.parse::<f64>().ok()
}

pub fn extract_i64_token(message: &str, key: &str) -> Option<i64> {
    let text = token_text(message, key)?;
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    // Some feeds serialize integral values as floats ("soc=55.0").
    text.parse::<f64>().ok().map(|value| value as i64)
}

/// Parses a `lat: <x>, lng: <y>` position line into coordinate strings.
pub fn extract_position(message: &str) -> Option<(String, String)> {
    let latitude = labeled_value(message, "lat:")?;
    let longitude = labeled_value(message, "lng:")?;
    if latitude.is_empty() || longitude.is_empty() {
        return None;
    }
    Some((latitude, longitude))
}

/// Parses the trailing odometer value from a `... mileage: <km>` line.
pub fn extract_mileage(message: &str) -> Option<i64> {
    labeled_value(message, "mileage:")?.parse::<i64>().ok()
}

fn token_text<'a>(message: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{key}=");
    let mut search_from = 0;

    while let Some(relative) = message[search_from..].find(&needle) {
        let index = search_from + relative;
        if has_token_boundary(message, index) {
            let value_start = index + needle.len();
            let rest = &message[value_start..];
            let end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
                .unwrap_or(rest.len());
            let text = &rest[..end];
            if text.is_empty() {
                return None;
            }
            return Some(text);
        }
        search_from = index + needle.len();
    }

    None
}

// Rejects matches embedded in a longer identifier, e.g. "range=" inside
// "charged_range=".
fn has_token_boundary(message: &str, index: usize) -> bool {
    match message[..index].chars().next_back() {
        Some(previous) => !(previous.is_ascii_alphanumeric() || previous == '_'),
        None => true,
    }
}

fn labeled_value(message: &str, label: &str) -> Option<String> {
    let index = message.find(label)?;
    let rest = &message[index + label.len()..];
    let end = rest.find(',').unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        charging_state_event, extract_f64_token, extract_i64_token, extract_mileage,
        extract_position,
    };
    use crate::domain::models::EventKind;

    const CHARGING_LINE: &str = "Charging data fetched: state=ChargingState.CHARGING, \
         charge_power_in_kw=7.2, state_of_charge_in_percent=55, charged_range=210, soc=55";

    #[test]
    fn maps_ready_marker_to_stop_before_charging_marker() {
        let line = "Charging data fetched: state=ChargingState.READY_FOR_CHARGING, soc=80";
        assert_eq!(charging_state_event(line), Some(EventKind::Stop));
        assert_eq!(charging_state_event(CHARGING_LINE), Some(EventKind::Start));
        assert_eq!(charging_state_event("Vehicle health fetched"), None);
    }

    #[test]
    fn extracts_float_tokens() {
        assert_eq!(
            extract_f64_token(CHARGING_LINE, "charge_power_in_kw"),
            Some(7.2)
        );
        assert_eq!(extract_f64_token(CHARGING_LINE, "battery_power"), None);
    }

    #[test]
    fn extracts_integer_tokens_including_float_serialized() {
        assert_eq!(extract_i64_token(CHARGING_LINE, "charged_range"), Some(210));
        assert_eq!(extract_i64_token("soc=55.0", "soc"), Some(55));
        assert_eq!(extract_i64_token("soc=", "soc"), None);
    }

    #[test]
    fn token_keys_do_not_match_inside_longer_identifiers() {
        let line = "charged_range=210, start_range=180";
        assert_eq!(extract_i64_token(line, "range"), None);
        assert_eq!(extract_i64_token(line, "start_range"), Some(180));
    }

    #[test]
    fn extracts_position_pairs() {
        let line = "Vehicle positions fetched: lat: 55.54789, lng: 11.22201";
        assert_eq!(
            extract_position(line),
            Some(("55.54789".to_string(), "11.22201".to_string()))
        );
        assert_eq!(extract_position("Vehicle positions fetched: lat: 55.5"), None);
    }

    #[test]
    fn extracts_mileage() {
        assert_eq!(
            extract_mileage("Vehicle health fetched, mileage: 48233"),
            Some(48233)
        );
        assert_eq!(extract_mileage("Vehicle health fetched"), None);
    }
}
