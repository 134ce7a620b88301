//! Key translation from wire identities to program key names.
//!
//! Senders put whatever their platform reports on the wire: a DOM
//! `KeyboardEvent.key` (`"ArrowUp"`, `" "`, `"w"`), a DOM
//! `KeyboardEvent.code` (`"KeyW"`, `"Digit1"`) or the program's own name
//! (`"up arrow"`). The running program only knows its own names, so the
//! receiver normalises every key through [`KeyMapper::wire_to_program`]
//! before touching the pressed-key set. Two spellings of the same key
//! therefore occupy a single slot.

use std::fmt;

/// A key the running program can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKey {
    UpArrow,
    DownArrow,
    LeftArrow,
    RightArrow,
    Space,
    Enter,
    /// Letters (stored upper case), digits and printable ASCII punctuation.
    Character(char),
}

impl ProgramKey {
    /// The name the program's keyboard device stores in its pressed set.
    pub fn program_name(self) -> String {
        match self {
            ProgramKey::UpArrow => "up arrow".to_string(),
            ProgramKey::DownArrow => "down arrow".to_string(),
            ProgramKey::LeftArrow => "left arrow".to_string(),
            ProgramKey::RightArrow => "right arrow".to_string(),
            ProgramKey::Space => "space".to_string(),
            ProgramKey::Enter => "enter".to_string(),
            ProgramKey::Character(c) => c.to_string(),
        }
    }

    /// The DOM `KeyboardEvent.key` spelling senders use by default.
    pub fn wire_name(self) -> String {
        match self {
            ProgramKey::UpArrow => "ArrowUp".to_string(),
            ProgramKey::DownArrow => "ArrowDown".to_string(),
            ProgramKey::LeftArrow => "ArrowLeft".to_string(),
            ProgramKey::RightArrow => "ArrowRight".to_string(),
            ProgramKey::Space => " ".to_string(),
            ProgramKey::Enter => "Enter".to_string(),
            ProgramKey::Character(c) => c.to_string(),
        }
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program_name())
    }
}

/// Unified key mapper.
pub struct KeyMapper;

impl KeyMapper {
    /// Translates a wire key identity into a [`ProgramKey`].
    ///
    /// Returns `None` for keys the program cannot observe (modifiers,
    /// function keys, multi-character names it does not know).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use multiplay_core::keymap::{KeyMapper, ProgramKey};
    ///
    /// assert_eq!(KeyMapper::wire_to_program("ArrowUp"), Some(ProgramKey::UpArrow));
    /// assert_eq!(KeyMapper::wire_to_program("KeyW"), Some(ProgramKey::Character('W')));
    /// assert_eq!(KeyMapper::wire_to_program("w"), Some(ProgramKey::Character('W')));
    /// assert_eq!(KeyMapper::wire_to_program("Shift"), None);
    /// ```
    pub fn wire_to_program(key: &str) -> Option<ProgramKey> {
        if let Some(named) = named_key(key) {
            return Some(named);
        }
        if let Some(letter) = key.strip_prefix("Key").and_then(single_char) {
            return letter
                .is_ascii_alphabetic()
                .then(|| ProgramKey::Character(letter.to_ascii_uppercase()));
        }
        if let Some(digit) = key.strip_prefix("Digit").and_then(single_char) {
            return digit.is_ascii_digit().then_some(ProgramKey::Character(digit));
        }
        let c = single_char(key)?;
        if c.is_ascii_alphanumeric() || c.is_ascii_punctuation() {
            Some(ProgramKey::Character(c.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// Shorthand for `wire_to_program(key).map(ProgramKey::program_name)`.
    pub fn program_name(key: &str) -> Option<String> {
        Self::wire_to_program(key).map(ProgramKey::program_name)
    }
}

fn named_key(key: &str) -> Option<ProgramKey> {
    let named = match key {
        "ArrowUp" | "Up" | "up arrow" => ProgramKey::UpArrow,
        "ArrowDown" | "Down" | "down arrow" => ProgramKey::DownArrow,
        "ArrowLeft" | "Left" | "left arrow" => ProgramKey::LeftArrow,
        "ArrowRight" | "Right" | "right arrow" => ProgramKey::RightArrow,
        " " | "Space" | "Spacebar" | "space" => ProgramKey::Space,
        "Enter" | "Return" | "NumpadEnter" | "enter" => ProgramKey::Enter,
        _ => return None,
    };
    Some(named)
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
