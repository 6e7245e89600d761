//! Normalizes heterogeneous vehicle-cloud event payloads into one shape.
//! Payload field names drift between cloud library versions, so every field
//! is probed through an alias list and absent fields stay `None`.

use serde_json::{Map, Value};

const EVENT_TYPE_KEYS: &[&str] = &["event_type", "eventType", "type"];
const TOPIC_KEYS: &[&str] = &["topic"];
const NAME_KEYS: &[&str] = &["name"];
const OPERATION_KEYS: &[&str] = &["operation"];
const STATUS_KEYS: &[&str] = &["status"];

const SOC_KEYS: &[&str] = &["soc", "state_of_charge", "stateOfCharge"];
const CHARGING_STATE_KEYS: &[&str] = &["state", "charging_state", "chargingState"];
const POWER_KEYS: &[&str] = &["charge_power_in_kw", "chargePowerInKw", "charge_power_kw"];
const RANGE_KEYS: &[&str] = &["charged_range", "chargedRange", "cruising_range_in_km"];
const MILEAGE_KEYS: &[&str] = &["mileage", "mileage_in_km", "mileageInKm"];
const LATITUDE_KEYS: &[&str] = &["latitude", "lat"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lng"];

const CHARGING_NAMES: &[&str] = &[
    "CHARGING",
    "CHARGING_STATUS_CHANGED",
    "START_CHARGING",
    "STOP_CHARGING",
];
const CHARGING_FIELD_HINTS: &[&str] = &["charging_status", "plug_status", "is_charging"];

/// Charging phase reported inside an event's data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingPhase {
    Charging,
    ReadyForCharging,
}

impl ChargingPhase {
    pub fn marker(self) -> &'static str {
        match self {
            ChargingPhase::Charging => "ChargingState.CHARGING",
            ChargingPhase::ReadyForCharging => "ChargingState.READY_FOR_CHARGING",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleEvent {
    pub event_type: Option<String>,
    pub topic: Option<String>,
    pub name: Option<String>,
    pub operation: Option<String>,
    pub status: Option<String>,
    pub soc: Option<f64>,
    pub charging_phase: Option<ChargingPhase>,
    pub charge_power_kw: Option<f64>,
    pub charged_range: Option<i64>,
    pub mileage: Option<i64>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    has_charging_fields: bool,
}

impl VehicleEvent {
    pub fn from_payload(payload: &Value) -> Self {
        let Some(object) = payload.as_object() else {
            return Self::default();
        };

        let data = data_object(object);

        let charging_phase = data
            .and_then(|map| find_string(map, CHARGING_STATE_KEYS))
            .and_then(|state| classify_phase(&state));

        let has_charging_fields = data.is_some_and(|map| {
            CHARGING_FIELD_HINTS.iter().any(|key| map.contains_key(*key))
                || CHARGING_STATE_KEYS.iter().any(|key| map.contains_key(*key))
                || POWER_KEYS.iter().any(|key| map.contains_key(*key))
        });

        Self {
            event_type: find_string(object, EVENT_TYPE_KEYS),
            topic: find_string(object, TOPIC_KEYS),
            name: find_string(object, NAME_KEYS),
            operation: find_string(object, OPERATION_KEYS),
            status: find_string(object, STATUS_KEYS),
            soc: data.and_then(|map| find_f64(map, SOC_KEYS)),
            charging_phase,
            charge_power_kw: data.and_then(|map| find_f64(map, POWER_KEYS)),
            charged_range: data.and_then(|map| find_i64(map, RANGE_KEYS)),
            mileage: data.and_then(|map| find_i64(map, MILEAGE_KEYS)),
            latitude: data.and_then(|map| find_string(map, LATITUDE_KEYS)),
            longitude: data.and_then(|map| find_string(map, LONGITUDE_KEYS)),
            has_charging_fields,
        }
    }

    pub fn is_service_event(&self) -> bool {
        self.event_type
            .as_deref()
            .is_some_and(|value| value.to_uppercase().ends_with("SERVICE_EVENT"))
    }

    /// Decides whether this event should feed the charge pipeline. Ordered
    /// from the strongest signal (topic) down to name/operation hints.
    pub fn is_charging_related(&self) -> bool {
        if self
            .topic
            .as_deref()
            .is_some_and(|topic| topic.to_uppercase().ends_with("CHARGING"))
        {
            return true;
        }

        if self.soc.is_some() || self.has_charging_fields {
            return true;
        }

        let name = self.name.as_deref().map(str::to_uppercase);
        if let Some(name) = &name {
            if name.contains("CHARG") || CHARGING_NAMES.contains(&name.as_str()) {
                return true;
            }
            if name == "CHANGE_ACCESS" && self.is_service_event() {
                return true;
            }
        }

        if let Some(operation) = self.operation.as_deref().map(str::to_uppercase) {
            let completed = self
                .status
                .as_deref()
                .is_some_and(|status| status.to_uppercase() == "COMPLETED_SUCCESS");
            if operation.contains("CHARG") && completed {
                return true;
            }
        }

        false
    }
}

fn classify_phase(state: &str) -> Option<ChargingPhase> {
    let upper = state.to_uppercase();
    if upper.contains("READY") {
        Some(ChargingPhase::ReadyForCharging)
    } else if upper.contains("CHARG") {
        Some(ChargingPhase::Charging)
    } else {
        None
    }
}

fn data_object(object: &Map<String, Value>) -> Option<&Map<String, Value>> {
    object
        .get("event")
        .and_then(|event| event.get("data"))
        .or_else(|| object.get("data"))
        .and_then(Value::as_object)
}

fn find_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn find_f64(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let value = object.get(*key)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
    })
}

fn find_i64(object: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    find_f64(object, keys).map(|value| value as i64)
}
