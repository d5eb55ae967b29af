//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings (API error bodies, payload previews).
/// Cuts on a char boundary so Vietnamese text never splits mid-character.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_every_occurrence() {
    let out = fill_template("{a} và {b}, lại {a}", &[("a", "Toán"), ("b", "20")]);
    assert_eq!(out, "Toán và 20, lại Toán");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "Tiếng Việt";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with("Ti"));
    assert!(t.ends_with(&format!("({} bytes total)", s.len())));
    assert_eq!(trunc_for_log("ok", 10), "ok");
  }
}
