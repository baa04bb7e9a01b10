use serde::{Deserialize, Serialize};

/// CEFR proficiency levels, also used as story difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

pub const STORY_LEVELS: [Level; 6] = [
    Level::A1,
    Level::A2,
    Level::B1,
    Level::B2,
    Level::C1,
    Level::C2,
];

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
            Level::C1 => "C1",
            Level::C2 => "C2",
        }
    }

    /// Case-insensitive parse; returns None for unknown codes.
    pub fn parse(value: &str) -> Option<Level> {
        match value.trim().to_uppercase().as_str() {
            "A1" => Some(Level::A1),
            "A2" => Some(Level::A2),
            "B1" => Some(Level::B1),
            "B2" => Some(Level::B2),
            "C1" => Some(Level::C1),
            "C2" => Some(Level::C2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub ui_language: Option<String>,
    pub ui_theme: String,
    pub level: Option<String>,
    pub ai_teacher_id: Option<String>,
    pub avatar_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub locale: Option<String>,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorySummary {
    pub id: i64,
    pub title: String,
    pub level: String,
    pub summary: String,
    pub created_at: String,
    pub estimated_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub level: String,
    pub summary: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRef {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub prompt: String,
    pub answers: [String; 4],
    pub correct_index: i64,
    pub audio_path: Option<String>,
}

/// One reading_progress row joined with its story, as shown on the
/// library and profile pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressItem {
    pub story_id: i64,
    pub percentage: i64,
    pub last_read_at: String,
    pub title: String,
    pub level: String,
    pub estimated_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyWord {
    pub id: i64,
    pub term: String,
    pub translation: Option<String>,
    pub example_sentence: Option<String>,
    pub photo_path: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyTopic {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub words: Vec<VocabularyWord>,
}

/// Reading time estimate used across listings: at least one minute,
/// about 900 characters per minute.
pub fn estimated_minutes(body_chars: i64) -> i64 {
    ((body_chars + 899) / 900).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parse_accepts_lowercase() {
        assert_eq!(Level::parse("b2"), Some(Level::B2));
        assert_eq!(Level::parse(" C1 "), Some(Level::C1));
        assert_eq!(Level::parse("D1"), None);
        assert_eq!(Level::parse(""), None);
    }

    #[test]
    fn estimated_minutes_has_floor_of_one() {
        assert_eq!(estimated_minutes(0), 1);
        assert_eq!(estimated_minutes(500), 1);
        assert_eq!(estimated_minutes(900), 1);
        assert_eq!(estimated_minutes(901), 2);
        assert_eq!(estimated_minutes(4500), 5);
    }
}
