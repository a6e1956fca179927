//! Conflict naming for renamed local copies
//!
//! Generates unique names for local entities that lose a name conflict,
//! following the pattern: `name - conflicting` and, on collision,
//! `name - conflicting (2)`, `name - conflicting (3)`, ...

use chrono::Utc;

/// Generates conflict names for renamed local entities
pub struct ConflictNamer;

impl ConflictNamer {
    /// The `n`-th candidate name for a renamed local copy
    ///
    /// `n == 0` yields `"name - conflicting"`, `n == 1` yields
    /// `"name - conflicting (2)"` and so on.
    pub fn candidate(original_name: &str, n: u32) -> String {
        if n == 0 {
            format!("{original_name} - conflicting")
        } else {
            format!("{original_name} - conflicting ({})", n + 1)
        }
    }

    /// Picks the first candidate for which `exists` returns false
    pub fn generate_unique<F>(original_name: &str, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        for n in 0..u32::MAX {
            let candidate = Self::candidate(original_name, n);
            if !exists(&candidate) {
                return candidate;
            }
        }
        // Unreachable in practice; u32::MAX collisions would be required
        Self::candidate(original_name, u32::MAX)
    }

    /// Title for a local duplicate note created during resource conflict
    /// handling
    ///
    /// Given `Some("Shopping list")`, produces
    /// `"Shopping list - conflicting (2026-08-01 12:34:56)"`; untitled
    /// notes get `"Conflicting note (2026-08-01 12:34:56)"`.
    pub fn conflicting_note_title(original_title: Option<&str>) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        match original_title {
            Some(title) => format!("{title} - conflicting ({timestamp})"),
            None => format!("Conflicting note ({timestamp})"),
        }
    }
}
