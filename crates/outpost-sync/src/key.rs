// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedupe key construction.

/// Build a dedupe key of the form `target:part1|part2|...`.
///
/// Two intents that should collapse into one queued write must produce the
/// same key, e.g. `dedupe_key_for("census_entries", &[day, point_id])`.
pub fn dedupe_key_for<S: AsRef<str>>(target: &str, parts: &[S]) -> String {
    let joined: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
    format!("{target}:{}", joined.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_parts_after_target() {
        assert_eq!(
            dedupe_key_for("census_entries", &["2026-02-24", "pt1"]),
            "census_entries:2026-02-24|pt1"
        );
        assert_eq!(
            dedupe_key_for("people", &[String::from("p-9")]),
            "people:p-9"
        );
        assert_eq!(dedupe_key_for::<&str>("settings", &[]), "settings:");
    }
}
