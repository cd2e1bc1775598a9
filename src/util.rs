//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Models sometimes wrap JSON in a markdown fence even in JSON mode.
/// Strips a leading ```` ```json ```` / ```` ``` ```` and a trailing ```` ``` ````.
pub fn strip_code_fences(text: &str) -> &str {
  let mut t = text.trim();
  if let Some(rest) = t.strip_prefix("```json") {
    t = rest;
  } else if let Some(rest) = t.strip_prefix("```") {
    t = rest;
  }
  if let Some(rest) = t.strip_suffix("```") {
    t = rest;
  }
  t.trim()
}

/// Round to two decimals for display fields.
pub fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) { end -= 1; }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
