/// Get the current time as epoch milliseconds — the representation the
/// ledger stores for arrival timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
