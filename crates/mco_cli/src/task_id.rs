use std::time::{SystemTime, UNIX_EPOCH};

/// Sortable, unique-within-an-`artifact_base` task id: a UTC timestamp
/// (so lexical order matches creation order) plus a short suffix derived
/// from the process id and a nanosecond counter.
pub fn new_task_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let millis = now.as_millis();
    let nanos_tail = now.as_nanos() % 1_000_000;
    format!("{millis:013}-{:06x}-{:04x}", nanos_tail, std::process::id() & 0xffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_generated_in_sequence_sort_lexically() {
        let a = new_task_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_task_id();
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn id_has_three_dash_separated_segments() {
        let id = new_task_id();
        assert_eq!(id.split('-').count(), 3);
    }
}
