/// Kind of a charge event derived from the raw telemetry log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Stop,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(EventKind::Start),
            "stop" => Some(EventKind::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawLogRecord {
    pub log_timestamp: String,
    pub log_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeEventRecord {
    pub id: i64,
    pub event_timestamp: String,
    pub pos_lat: Option<String>,
    pub pos_lon: Option<String>,
    pub charged_range: Option<i64>,
    pub mileage: Option<i64>,
    pub event_type: String,
    pub soc: Option<i64>,
    pub charge_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChargeEventRecord {
    pub event_timestamp: String,
    pub pos_lat: Option<String>,
    pub pos_lon: Option<String>,
    pub charged_range: Option<i64>,
    pub mileage: Option<i64>,
    pub event_type: String,
    pub soc: Option<i64>,
}

/// One hour bucket of a charge. `amount` and `start_range` use -1 as the
/// "tried and failed" sentinel so backfill passes skip them.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeHourRecord {
    pub id: i64,
    pub log_timestamp: String,
    pub start_at: Option<String>,
    pub stop_at: Option<String>,
    pub position: Option<String>,
    pub charged_range: Option<i64>,
    pub start_range: Option<i64>,
    pub mileage: Option<i64>,
    pub soc: Option<i64>,
    pub amount: Option<f64>,
    pub price: Option<f64>,
}
