//! Webhook Reconciler: turns carrier status callbacks into idempotent
//! `CallRecord` updates against the typed `CallStatus` vocabulary, with
//! terminal-status duration bookkeeping and a quote-extraction helper for
//! turning call results into a number.

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{CallRecord, CallStatus};

/// Map a carrier's status string (Twilio-compatible vocabulary) to our
/// internal `CallStatus`. Anything unrecognized maps to `Failed` rather
/// than being silently dropped — a carrier callback we don't understand
/// yet should surface as a failure, not vanish.
pub fn map_carrier_status(status: &str) -> CallStatus {
    match status.to_lowercase().as_str() {
        "initiated" => CallStatus::Pending,
        "ringing" => CallStatus::Ringing,
        "in-progress" | "answered" => CallStatus::Connected,
        "completed" => CallStatus::Complete,
        "busy" => CallStatus::Busy,
        "no-answer" => CallStatus::NoAnswer,
        "failed" | "canceled" => CallStatus::Failed,
        _ => CallStatus::Failed,
    }
}

/// Apply a carrier status callback to the matching call record.
///
/// Idempotent: `CallRecord::apply_status` already refuses to overwrite a
/// terminal status, so a retried or out-of-order webhook delivery is a
/// no-op rather than a regression. Sets `ended_at`/`duration_s` the first
/// time a terminal status lands.
pub fn apply_status_callback(record: &mut CallRecord, status: &str) -> bool {
    let new_status = map_carrier_status(status);
    let applied = record.apply_status(new_status);
    if applied && new_status.is_terminal() {
        let now = Utc::now();
        record.ended_at = Some(now);
        if let Some(started) = record.started_at {
            record.duration_s = Some((now - started).num_seconds());
        }
    }
    applied
}

const ANSWERED_BY_MACHINE: &[&str] =
    &["machine_start", "machine_end_beep", "machine_end_silence", "machine_end_other", "fax"];

/// Answering Machine Detection callback: true if the carrier reports a
/// voicemail/machine/fax tone, meaning the call should be hung up
/// immediately instead of playing the script to a machine.
pub fn is_answering_machine(answered_by: &str) -> bool {
    ANSWERED_BY_MACHINE.contains(&answered_by)
}

fn quote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[£$]\s*(\d+(?:\.\d{1,2})?)").expect("static regex is valid"))
}

/// Extract a numeric quote from free-text call result. Requires a currency
/// symbol (£ or $) to avoid treating arbitrary numbers in the transcript
/// (phone numbers, addresses, times) as a quote.
pub fn extract_quote(result_text: &str) -> Option<f64> {
    quote_regex()
        .captures(result_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Business;

    fn business() -> Business {
        Business {
            id: "b1".into(),
            name: "Acme Plumbing".into(),
            phone: "+447000000000".into(),
            address: None,
            rating: None,
            lat: None,
            lng: None,
        }
    }

    #[test]
    fn maps_known_statuses() {
        assert_eq!(map_carrier_status("ringing"), CallStatus::Ringing);
        assert_eq!(map_carrier_status("in-progress"), CallStatus::Connected);
        assert_eq!(map_carrier_status("ANSWERED"), CallStatus::Connected);
        assert_eq!(map_carrier_status("completed"), CallStatus::Complete);
        assert_eq!(map_carrier_status("busy"), CallStatus::Busy);
        assert_eq!(map_carrier_status("no-answer"), CallStatus::NoAnswer);
    }

    #[test]
    fn unknown_status_maps_to_failed() {
        assert_eq!(map_carrier_status("weird-new-thing"), CallStatus::Failed);
    }

    #[test]
    fn terminal_callback_sets_duration() {
        let mut record = CallRecord::pending(business());
        record.started_at = Some(Utc::now() - chrono::Duration::seconds(45));

        let applied = apply_status_callback(&mut record, "completed");
        assert!(applied);
        assert_eq!(record.status, CallStatus::Complete);
        assert!(record.duration_s.unwrap() >= 45);
    }

    #[test]
    fn retried_callback_after_terminal_is_noop() {
        let mut record = CallRecord::pending(business());
        apply_status_callback(&mut record, "completed");
        let second = apply_status_callback(&mut record, "ringing");
        assert!(!second);
        assert_eq!(record.status, CallStatus::Complete);
    }

    #[test]
    fn detects_machine_answered_by() {
        assert!(is_answering_machine("machine_start"));
        assert!(is_answering_machine("fax"));
        assert!(!is_answering_machine("human"));
    }

    #[test]
    fn extracts_quote_with_currency_symbol() {
        assert_eq!(extract_quote("Can do tomorrow, £95 call-out fee"), Some(95.0));
        assert_eq!(extract_quote("quote was $120.50 total"), Some(120.50));
    }

    #[test]
    fn no_currency_symbol_yields_none() {
        assert_eq!(extract_quote("available at 3pm, 45 minutes"), None);
    }
}
