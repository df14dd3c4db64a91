//! ID utilities: monotonic audit ids, ISO-8601/millis timestamps, opaque
//! virtual-id generation.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_AUDIT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new monotonic audit-entry id (process-local, starts at 1).
pub fn next_audit_id() -> u64 {
    NEXT_AUDIT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Milliseconds since the UNIX epoch, for in-memory/transient fields.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// ISO-8601 UTC timestamp (seconds resolution), for durable fields.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    format_iso8601(secs)
}

/// Format a UNIX timestamp (seconds) as an ISO-8601 UTC string without pulling
/// in a calendar crate: days are converted via the proleptic Gregorian
/// civil-from-days algorithm (Howard Hinnant's `civil_from_days`).
fn format_iso8601(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z",
    )
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

const ALPHANUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate an opaque, printable, collision-resistant suffix of `len`
/// alphanumeric characters using a CSPRNG.
pub fn random_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| ALPHANUM[rng.gen_range(0..ALPHANUM.len())] as char).collect()
}

/// Opaque virtual email id: `email_<12 alnum>`.
pub fn new_virtual_email_id() -> String {
    format!("email_{}", random_alnum(12))
}

/// Opaque virtual account id: `account_<12 alnum>`.
pub fn new_virtual_account_id() -> String {
    format!("account_{}", random_alnum(12))
}

/// Real (internal) account id. Deliberately a distinct prefix from
/// [`new_virtual_account_id`]: the former never leaves the core, the
/// latter is the only account identifier an agent ever sees.
pub fn new_account_id() -> String {
    format!("acct_{}", random_alnum(12))
}

/// Opaque trace identifier (UUID v4 string), carried through the session
/// transport for correlating a request across fan-out sub-tasks.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque session id minted on `initialize`.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_increments() {
        let a = next_audit_id();
        let b = next_audit_id();
        assert!(b > a);
    }

    #[test]
    fn virtual_id_prefixes() {
        assert!(new_virtual_email_id().starts_with("email_"));
        assert!(new_virtual_account_id().starts_with("account_"));
        assert_eq!(new_virtual_email_id().len(), "email_".len() + 12);
    }

    #[test]
    fn real_account_id_is_distinct_from_virtual_account_id_namespace() {
        assert!(new_account_id().starts_with("acct_"));
        assert!(!new_account_id().starts_with("account_"));
    }

    #[test]
    fn iso8601_known_epoch() {
        // 2024-01-01T00:00:00Z == 1704067200
        assert_eq!(format_iso8601(1_704_067_200), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn trace_id_is_uuid_shaped() {
        let t = new_trace_id();
        assert_eq!(t.len(), 36);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }
}
