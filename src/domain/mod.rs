pub mod energy;
pub mod models;
pub mod report;
pub mod session;
pub mod tariff;
pub mod telemetry;
pub mod vehicle_event;
