//! Class path patterns.

/// A `/`-separated class path pattern.
///
/// Segments compare case-insensitively and `*` matches exactly one
/// segment. Patterns match the end of a path (`*/primaryWeapon`
/// matches `Mission/Item0/primaryWeapon`) unless they start with `/`,
/// which anchors them at file scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    anchored: bool,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Any,
    Name(String),
}

impl Pattern {
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    Segment::Any
                } else {
                    Segment::Name(s.to_string())
                }
            })
            .collect();
        Self {
            anchored: pattern.starts_with('/'),
            segments,
        }
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if self.segments.is_empty() || parts.len() < self.segments.len() {
            return false;
        }
        if self.anchored && parts.len() != self.segments.len() {
            return false;
        }

        let tail = &parts[parts.len() - self.segments.len()..];
        self.segments
            .iter()
            .zip(tail)
            .all(|(segment, part)| match segment {
                Segment::Any => true,
                Segment::Name(name) => name.eq_ignore_ascii_case(part),
            })
    }
}

impl std::str::FromStr for Pattern {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
