//! Best-effort timing telemetry

use crate::{fields, GatewayRequest, Record, ReportLevel, Report};
use chrono::Local;
use std::time::Duration;

/// Response fields copied into a report
const COPIED: &[&str] = &[
    fields::RETURN_CODE,
    fields::RETURN_MSG,
    fields::ERR_CODE,
    fields::ERR_CODE_DES,
    fields::OUT_TRADE_NO,
    fields::DEVICE_INFO,
];

/// Whether a round trip with this response is reported
pub fn should_report(level: ReportLevel, response: &Record) -> bool {
    match level {
        ReportLevel::Off => false,
        ReportLevel::FailuresOnly => !response.is_success(),
        ReportLevel::All => true,
    }
}

/// Build the report for one round trip
pub fn build_report(url: &str, elapsed: Duration, response: &Record, client_ip: &str) -> Report {
    let mut report = Report::new()
        .interface_url(url)
        .execute_time(elapsed.as_millis())
        .result_code(response.result_code().unwrap_or(fields::FAIL))
        .user_ip(client_ip)
        .time(&Local::now().format("%Y%m%d%H%M%S").to_string());

    for field in COPIED {
        if let Some(value) = response.get_str(field) {
            report.record_mut().set(*field, value);
        }
    }
    report
}
