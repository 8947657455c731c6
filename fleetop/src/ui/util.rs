//! Small UI helpers: human-readable sizes, truncation, icons.

pub fn human(b: u64) -> String {
    const K: f64 = 1024.0;
    let b = b as f64;
    if b < K {
        return format!("{b:.0}B");
    }
    let kb = b / K;
    if kb < K {
        return format!("{kb:.1}KB");
    }
    let mb = kb / K;
    if mb < K {
        return format!("{mb:.1}MB");
    }
    let gb = mb / K;
    if gb < K {
        return format!("{gb:.1}GB");
    }
    let tb = gb / K;
    format!("{tb:.2}TB")
}

/// Shorten to `max` chars keeping both ends.
pub fn truncate_middle(s: &str, max: usize) -> String {
    let n = s.chars().count();
    if n <= max {
        return s.to_string();
    }
    if max <= 3 {
        return "...".into();
    }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(n - right).collect();
    format!("{head}...{tail}")
}

pub fn fs_icon(device: &str, fs_type: &str) -> &'static str {
    let d = device.to_ascii_lowercase();
    if d.contains(':') || matches!(fs_type, "nfs" | "nfs4" | "cifs" | "smbfs") {
        "🗄️"
    } else if d.contains("nvme") {
        "⚡"
    } else if fs_type == "overlay" || d.contains("overlay") {
        "📦"
    } else if d.contains("sd") {
        "💽"
    } else {
        "🖴"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(human(512), "512B");
        assert_eq!(human(1536), "1.5KB");
        assert_eq!(human(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_middle("short", 10), "short");
        assert_eq!(truncate_middle("/mnt/very/long/mount/point", 11), "/mnt...oint");
        assert_eq!(truncate_middle("ééééééééé", 5), "é...é");
    }
}
