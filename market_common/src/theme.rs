//! Light/dark theme preference.

use strum_macros::{Display, EnumString};

/// UI colour theme. Persisted as `"light"` or `"dark"`.
#[derive(Debug, Clone, Copy, Default, Display, EnumString, Eq, PartialEq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Theme {
    #[allow(missing_docs)]
    #[default]
    Light,
    #[allow(missing_docs)]
    Dark,
}

impl Theme {
    /// Interpret a stored value. Anything other than `"dark"` is light.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some(v) if v == "dark" => Theme::Dark,
            _ => Theme::Light,
        }
    }

    /// The opposite theme.
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dark_is_dark() {
        assert_eq!(Theme::from_stored(Some("dark")), Theme::Dark);
        assert_eq!(Theme::from_stored(Some("light")), Theme::Light);
        assert_eq!(Theme::from_stored(Some("DARK")), Theme::Light);
        assert_eq!(Theme::from_stored(None), Theme::Light);
        assert_eq!(Theme::Dark.to_string(), "dark");
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }
}
