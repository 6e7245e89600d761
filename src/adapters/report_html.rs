//! The monthly HTML report. Domain aggregation happens in `domain::report`;
//! this module only shapes the rows for the template.

use askama::Template;

use crate::domain::models::ChargeHourRecord;
use crate::domain::report::{
    daily_totals_home, filter_efficiency_data, footer_metrics, group_sessions_by_mileage,
    normalized_efficiency, round2, session_summary,
};

#[derive(Template)]
#[template(path = "report.html")]
struct MonthReportTemplate {
    year: i32,
    month: u32,
    prev_year: i32,
    prev_month: u32,
    next_year: i32,
    next_month: u32,
    sessions: Vec<SessionRow>,
    daily: Vec<DailyRow>,
    efficiency: Vec<EfficiencyRow>,
    footer: FooterRow,
}

struct SessionRow {
    ended_at: String,
    mileage: String,
    amount: String,
    price: String,
    position: String,
    max_soc: String,
    max_range: String,
}

struct DailyRow {
    date: String,
    kwh: String,
    dkk: String,
}

struct EfficiencyRow {
    stopped_at: String,
    estimated: String,
    actual: String,
    soc_gain: String,
}

struct FooterRow {
    total_mileage: String,
    total_amount: String,
    estimated_km_per_kwh: String,
    actual_km_per_kwh: String,
}

pub fn render_month_report(
    rows: &[ChargeHourRecord],
    year: i32,
    month: u32,
) -> Result<String, askama::Error> {
    let sessions = group_sessions_by_mileage(rows);

    let session_rows = sessions
        .iter()
        .map(|session| {
            let summary = session_summary(&session.rows);
            let max_soc = session.rows.iter().filter_map(|row| row.soc).max();
            let max_range = session.rows.iter().filter_map(|row| row.charged_range).max();

            SessionRow {
                ended_at: session
                    .end
                    .clone()
                    .or_else(|| session.start.clone())
                    .unwrap_or_default(),
                mileage: format_opt_i64(session.mileage),
                amount: format!("{:.2}", summary.amount),
                price: format!("{:.2}", summary.price),
                position: summary.position.to_string(),
                max_soc: format_opt_i64(max_soc),
                max_range: format_opt_i64(max_range),
            }
        })
        .collect();

    let daily = daily_totals_home(rows)
        .into_iter()
        .map(|(date, total)| DailyRow {
            date: date.format("%Y-%m-%d").to_string(),
            kwh: format!("{:.2}", round2(total.kwh)),
            dkk: format!("{:.2}", round2(total.dkk)),
        })
        .collect();

    let efficiency = filter_efficiency_data(&normalized_efficiency(&sessions))
        .into_iter()
        .map(|entry| EfficiencyRow {
            stopped_at: entry.stop_at.unwrap_or_default(),
            estimated: format_opt_f64(entry.estimated_efficiency),
            actual: format_opt_f64(entry.actual_efficiency),
            soc_gain: format!("{:.0}", entry.soc_gain),
        })
        .collect();

    let metrics = footer_metrics(&sessions);
    let footer = FooterRow {
        total_mileage: metrics.total_mileage.to_string(),
        total_amount: format!("{:.2}", metrics.total_amount),
        estimated_km_per_kwh: format!("{:.2}", metrics.estimated_km_per_kwh),
        actual_km_per_kwh: format!("{:.2}", metrics.actual_km_per_kwh),
    };

    let (prev_year, prev_month) = if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    MonthReportTemplate {
        year,
        month,
        prev_year,
        prev_month,
        next_year,
        next_month,
        sessions: session_rows,
        daily,
        efficiency,
        footer,
    }
    .render()
}

fn format_opt_i64(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn format_opt_f64(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}
