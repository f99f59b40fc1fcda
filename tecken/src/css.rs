//! The @font-face contract consumed by the stylesheet assembler.
//!
//! The assembler itself is an external collaborator; this module only fixes
//! the shape of what it consumes: one named rule binding a family name to
//! exactly one embedded-font string. Reusing a family name across several
//! distinct-coverage subsets is the caller's policy to make.

/// One `@font-face` rule binding a family name to an embedded font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontFaceRule {
    pub family: String,
    /// The embedded-font string, i.e. a `data:font/woff2;base64,` URI.
    pub src: String,
}

impl FontFaceRule {
    pub fn new(family: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            src: src.into(),
        }
    }
}

impl std::fmt::Display for FontFaceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "@font-face {{\n    font-family: '{}';\n    src: url({}) format('woff2');\n}}",
            self.family, self.src
        )
    }
}

/// A `font-family:` stack listing each family in priority order.
pub fn font_family_stack<S: AsRef<str>>(families: &[S]) -> String {
    families
        .iter()
        .map(|family| format!("'{}'", family.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_shape() {
        let rule = FontFaceRule::new("Tecken Sans", "data:font/woff2;base64,AA==");
        let css = rule.to_string();
        assert!(css.starts_with("@font-face {"));
        assert!(css.contains("font-family: 'Tecken Sans';"));
        assert!(css.contains("src: url(data:font/woff2;base64,AA==) format('woff2');"));
    }

    #[test]
    fn family_stack() {
        assert_eq!(
            font_family_stack(&["Tecken Sans", "Tecken Mincho"]),
            "'Tecken Sans', 'Tecken Mincho'"
        );
        assert_eq!(font_family_stack::<&str>(&[]), "");
    }
}
