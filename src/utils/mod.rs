use std::time::Instant;
use tracing::{info, warn};
use url::Url;

/// Logs the wall-clock duration of a command when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self { label, start: Instant::now() }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.start.elapsed());
    }
}

/// Resolve `link` against the page it was found on. Absolute links are
/// returned unchanged.
pub fn resolve_url(base: &str, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    if link.starts_with("http://") || link.starts_with("https://") {
        return Some(link.to_string());
    }

    match Url::parse(base).and_then(|b| b.join(link)) {
        Ok(u) => Some(u.to_string()),
        Err(e) => {
            warn!("resolve_url: cannot join {:?} onto {:?}: {}", link, base, e);
            None
        }
    }
}

/// Format a count with thousands separators: 1234567 → "1 234 567"
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut groups: Vec<&str> = Vec::new();
    let mut end = digits.len();
    while end > 3 {
        groups.push(&digits[end - 3..end]);
        end -= 3;
    }
    groups.push(&digits[..end]);
    groups.reverse();

    let sign = if n < 0 { "-" } else { "" };
    format!("{sign}{}", groups.join(" "))
}
