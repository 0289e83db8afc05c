use crate::surface::UiElementAttributes;

/// Represents ways to locate an element on the editor surface.
///
/// The node editor tags its elements with `data-id` / `data-testid`
/// attributes; selectors address those directly rather than walking an
/// element tree by role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Exact `data-id` match
    Id(String),
    /// `data-id` prefix match
    IdPrefix(String),
    /// `data-id` suffix match
    IdSuffix(String),
    /// Exact `data-testid` match
    TestId(String),
    /// `data-testid` prefix match
    TestIdPrefix(String),
    /// Arbitrary `data-*` attribute equality
    Attr { name: String, value: String },
    /// Logical AND over a set of selectors (all must match the same element)
    And(Vec<Selector>),
    /// Keep only the n-th element (0-based) of the current match set.
    /// Only meaningful inside a [`Selector::Chain`].
    Nth(usize),
    /// Chain multiple selectors: a [`Selector::Nth`] segment filters the
    /// current match set, any other segment matches descendants of it.
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    /// Whether a single element's attributes satisfy this selector.
    ///
    /// Structural variants (`Chain`, `Nth`) are resolved by the surface's
    /// query engine, not per element; they never match here.
    pub fn matches(&self, attrs: &UiElementAttributes) -> bool {
        match self {
            Selector::Id(id) => attrs.data_id.as_deref() == Some(id.as_str()),
            Selector::IdPrefix(prefix) => attrs
                .data_id
                .as_deref()
                .is_some_and(|v| v.starts_with(prefix.as_str())),
            Selector::IdSuffix(suffix) => attrs
                .data_id
                .as_deref()
                .is_some_and(|v| v.ends_with(suffix.as_str())),
            Selector::TestId(id) => attrs.test_id.as_deref() == Some(id.as_str()),
            Selector::TestIdPrefix(prefix) => attrs
                .test_id
                .as_deref()
                .is_some_and(|v| v.starts_with(prefix.as_str())),
            Selector::Attr { name, value } => {
                attrs.data.get(name).map(String::as_str) == Some(value.as_str())
            }
            Selector::And(parts) => parts.iter().all(|p| p.matches(attrs)),
            Selector::Nth(_) | Selector::Chain(_) | Selector::Invalid(_) => false,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        // Helper: parse a single, non-chain segment with AND support
        fn parse_segment(input: &str) -> Selector {
            let s = input.trim();

            // AND: explicit && only
            if s.contains("&&") {
                let parts: Vec<Selector> = s.split("&&").map(|p| parse_segment(p.trim())).collect();
                return if parts.len() == 1 {
                    parts.into_iter().next().unwrap()
                } else {
                    Selector::And(parts)
                };
            }

            match s {
                _ if s.starts_with("id^:") => Selector::IdPrefix(s["id^:".len()..].to_string()),
                _ if s.starts_with("id$:") => Selector::IdSuffix(s["id$:".len()..].to_string()),
                _ if s.starts_with("id:") => Selector::Id(s["id:".len()..].to_string()),
                _ if s.starts_with("testid^:") => {
                    Selector::TestIdPrefix(s["testid^:".len()..].to_string())
                }
                _ if s.starts_with("testid:") => Selector::TestId(s["testid:".len()..].to_string()),
                _ if s.starts_with("attr:") => {
                    let attr_part = &s["attr:".len()..];
                    let parts: Vec<&str> = attr_part.splitn(2, '=').collect();
                    if parts.len() == 2 {
                        Selector::Attr {
                            name: parts[0].trim().to_string(),
                            value: parts[1].trim().to_string(),
                        }
                    } else {
                        Selector::Invalid(format!(
                            "attr selector requires name=value, got: '{attr_part}'"
                        ))
                    }
                }
                _ if s.starts_with("nth:") => {
                    let index_str = &s["nth:".len()..];
                    if let Ok(index) = index_str.parse::<usize>() {
                        Selector::Nth(index)
                    } else {
                        Selector::Invalid(format!("invalid index for nth selector: '{index_str}'"))
                    }
                }
                _ => Selector::Invalid(format!(
                    "Unknown selector format: \"{s}\". Use prefixes like 'id:', 'id^:', 'id$:', 'testid:', 'testid^:', 'attr:' or 'nth:' to specify the selector type."
                )),
            }
        }

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(parse_segment).collect());
        }

        parse_segment(s)
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}
