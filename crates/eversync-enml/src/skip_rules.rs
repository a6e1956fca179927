//! Caller-supplied rules for skipping HTML elements during conversion

/// How a matcher compares its pattern against a name or value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Equals,
    StartsWith,
    EndsWith,
    Contains,
}

/// One pattern with its comparison mode and case sensitivity
#[derive(Debug, Clone)]
pub struct Matcher {
    pub pattern: String,
    pub rule: MatchRule,
    pub case_sensitive: bool,
}

impl Matcher {
    pub fn equals(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            rule: MatchRule::Equals,
            case_sensitive: true,
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        if self.case_sensitive {
            match self.rule {
                MatchRule::Equals => candidate == self.pattern,
                MatchRule::StartsWith => candidate.starts_with(&self.pattern),
                MatchRule::EndsWith => candidate.ends_with(&self.pattern),
                MatchRule::Contains => candidate.contains(&self.pattern),
            }
        } else {
            let candidate = candidate.to_lowercase();
            let pattern = self.pattern.to_lowercase();
            match self.rule {
                MatchRule::Equals => candidate == pattern,
                MatchRule::StartsWith => candidate.starts_with(&pattern),
                MatchRule::EndsWith => candidate.ends_with(&pattern),
                MatchRule::Contains => candidate.contains(&pattern),
            }
        }
    }
}

/// A rule for skipping HTML elements during HTML -> ENML conversion
///
/// An element is skipped when its name matches `element_name`, or when any
/// of its attributes matches `attribute_name` / `attribute_value`.
/// `preserve_contents` decides whether the element's subtree is dropped
/// with it or written through.
#[derive(Debug, Clone, Default)]
pub struct SkipHtmlElementRule {
    pub element_name: Option<Matcher>,
    pub attribute_name: Option<Matcher>,
    pub attribute_value: Option<Matcher>,
    pub preserve_contents: bool,
}

/// What to do with an element according to the skip rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipElementOption {
    DontSkip,
    SkipWithContents,
    SkipButPreserveContents,
}

/// Applies the rules to one element
///
/// A skip-with-contents verdict wins immediately; a preserve-contents
/// verdict is remembered but later rules may still escalate.
pub fn skip_element_option(
    element_name: &str,
    attributes: &[(String, String)],
    rules: &[SkipHtmlElementRule],
) -> SkipElementOption {
    if rules.is_empty() {
        return SkipElementOption::DontSkip;
    }

    let mut preserve_contents_hit = false;

    let mut check = |matched: bool, preserve: bool| -> Option<SkipElementOption> {
        if matched {
            if preserve {
                preserve_contents_hit = true;
                None
            } else {
                Some(SkipElementOption::SkipWithContents)
            }
        } else {
            None
        }
    };

    for rule in rules {
        if let Some(matcher) = rule.element_name.as_ref() {
            if let Some(verdict) = check(matcher.matches(element_name), rule.preserve_contents) {
                return verdict;
            }
        }

        if let Some(matcher) = rule.attribute_name.as_ref() {
            for (name, _) in attributes {
                if let Some(verdict) = check(matcher.matches(name), rule.preserve_contents) {
                    return verdict;
                }
            }
        }

        if let Some(matcher) = rule.attribute_value.as_ref() {
            for (_, value) in attributes {
                if let Some(verdict) = check(matcher.matches(value), rule.preserve_contents) {
                    return verdict;
                }
            }
        }
    }

    if preserve_contents_hit {
        SkipElementOption::SkipButPreserveContents
    } else {
        SkipElementOption::DontSkip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rules_means_no_skipping() {
        assert_eq!(
            skip_element_option("div", &[], &[]),
            SkipElementOption::DontSkip
        );
    }

    #[test]
    fn element_name_rule_skips_with_contents() {
        let rules = vec![SkipHtmlElementRule {
            element_name: Some(Matcher::equals("aside")),
            ..Default::default()
        }];
        assert_eq!(
            skip_element_option("aside", &[], &rules),
            SkipElementOption::SkipWithContents
        );
        assert_eq!(
            skip_element_option("div", &[], &rules),
            SkipElementOption::DontSkip
        );
    }

    #[test]
    fn attribute_value_rule_can_preserve_contents() {
        let rules = vec![SkipHtmlElementRule {
            attribute_value: Some(Matcher {
                pattern: "sidebar".into(),
                rule: MatchRule::Contains,
                case_sensitive: false,
            }),
            preserve_contents: true,
            ..Default::default()
        }];

        let attributes = vec![("role".to_string(), "The-Sidebar".to_string())];
        assert_eq!(
            skip_element_option("div", &attributes, &rules),
            SkipElementOption::SkipButPreserveContents
        );
    }

    #[test]
    fn skip_with_contents_wins_over_preserve() {
        let rules = vec![
            SkipHtmlElementRule {
                element_name: Some(Matcher::equals("nav")),
                preserve_contents: true,
                ..Default::default()
            },
            SkipHtmlElementRule {
                element_name: Some(Matcher::equals("nav")),
                preserve_contents: false,
                ..Default::default()
            },
        ];
        assert_eq!(
            skip_element_option("nav", &[], &rules),
            SkipElementOption::SkipWithContents
        );
    }
}
