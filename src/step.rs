use std::fmt;

/// One drawing step as produced by the planner.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    /// Short heading.
    pub title: String,
    /// One or two sentences explaining the step.
    pub description: String,
    /// Drawing code in the step language (see [`crate::script`]).
    pub code: String,
}

impl Step {
    /// Build a step from its parts.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            code: code.into(),
        }
    }

    /// Text spoken for this step: `"{title}. {description}"`, trimmed.
    pub fn narration_text(&self) -> String {
        format!("{}. {}", self.title.trim(), self.description.trim())
            .trim()
            .to_owned()
    }

    /// Cache identity of this step's narration.
    pub fn narration_key(&self) -> NarrationKey {
        NarrationKey::new(&self.title, &self.description)
    }
}

/// Identity of a narration clip: trimmed title and description joined by a unit separator.
///
/// Steps with identical title and description share one clip regardless of their code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NarrationKey(String);

impl NarrationKey {
    /// Separator between title and description.
    pub const SEPARATOR: char = '\u{1f}';

    pub fn new(title: &str, description: &str) -> Self {
        Self(format!(
            "{}{}{}",
            title.trim(),
            Self::SEPARATOR,
            description.trim()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NarrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The separator is a control character; show it readably.
        f.write_str(&self.0.replace(Self::SEPARATOR, " | "))
    }
}

/// Parse a JSON array of steps, rejecting an empty plan.
pub fn steps_from_json(json: &str) -> crate::ReelResult<Vec<Step>> {
    let steps: Vec<Step> = serde_json::from_str(json)
        .map_err(|e| crate::ReelError::validation(format!("invalid steps json: {e}")))?;
    if steps.is_empty() {
        return Err(crate::ReelError::validation("steps json contains no steps"));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narration_text_joins_title_and_description() {
        let s = Step::new("  Boil water ", " Put the kettle on. ", "");
        assert_eq!(s.narration_text(), "Boil water. Put the kettle on.");
    }

    #[test]
    fn key_ignores_code_and_outer_whitespace() {
        let a = Step::new("A", "desc", "rect(0,0,1,1)");
        let b = Step::new(" A ", "desc ", "circle(0,0,1)");
        assert_eq!(a.narration_key(), b.narration_key());
        assert_ne!(a.narration_key(), Step::new("A", "other", "").narration_key());
        assert_eq!(a.narration_key().as_str(), "A\u{1f}desc");
    }

    #[test]
    fn key_separator_prevents_boundary_collisions() {
        assert_ne!(NarrationKey::new("ab", "c"), NarrationKey::new("a", "bc"));
    }

    #[test]
    fn steps_json_round_trips_and_rejects_empty() {
        let steps = steps_from_json(
            r#"[{"title":"t","description":"d","code":"line(0,0,1,1)"}]"#,
        )
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps_from_json("[]").is_err());
        assert!(steps_from_json("{").is_err());
    }
}
