//! Small utility helpers used across modules.

use uuid::Uuid;

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

/// Log-safe truncation for large strings (char-boundary aware).
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let total = s.chars().count();
  if total <= max_chars {
    s.to_string()
  } else {
    let head: String = s.chars().take(max_chars).collect();
    format!("{}… ({} chars total)", head, total)
  }
}

/// Fresh opaque identifier with a short readable prefix, e.g. `u-3f2a…`.
pub fn new_id(prefix: &str) -> String {
  format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Credentials are matched case-insensitively, ignoring surrounding spaces.
pub fn normalize_credential(raw: &str) -> String {
  raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_every_occurrence() {
    let out = fill_template("{a} and {a} then {b}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and x then y");
  }

  #[test]
  fn truncation_respects_multibyte_chars() {
    assert_eq!(trunc_for_log("héllo", 10), "héllo");
    assert_eq!(trunc_for_log("héllo wörld", 3), "hél… (11 chars total)");
  }

  #[test]
  fn ids_are_prefixed_and_unique() {
    let a = new_id("u");
    assert!(a.starts_with("u-"));
    assert_ne!(a, new_id("u"));
  }

  #[test]
  fn credentials_normalize() {
    assert_eq!(normalize_credential("  Siswa@SMP.sch.id "), "siswa@smp.sch.id");
  }
}
