//! Guest catalog: the flat list of guests built from `questions.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::rng::Rng;
use crate::stages::StageTable;
use crate::types::{Difficulty, Guest, GuestTier, Question};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog json: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    episodes: Vec<RawEpisode>,
}

#[derive(Debug, Deserialize)]
struct RawEpisode {
    guest: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Clone, Debug, Default)]
pub struct GuestCatalog {
    guests: Vec<Guest>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl GuestCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(text)?;
        let mut guests = Vec::new();
        for episode in raw.episodes {
            let name = episode
                .guest
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| episode.title.clone());
            if episode.questions.is_empty() {
                tracing::warn!(guest = %name, "guest has no questions, skipping");
                continue;
            }
            let id = format!("{:03}", guests.len() + 1);
            guests.push(Guest {
                id,
                avatar_key: avatar_key(&name),
                difficulty: Difficulty::from_question_count(episode.questions.len()),
                name,
                episode: episode.title,
                episode_url: episode.url.unwrap_or_default(),
                questions: episode.questions,
                tier: GuestTier::Unranked,
                captured: false,
            });
        }
        tracing::info!(count = guests.len(), "loaded guest catalog");
        Ok(Self::from_guests(guests))
    }

    pub fn from_guests(guests: Vec<Guest>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for (idx, guest) in guests.iter().enumerate() {
            by_id.insert(guest.id.clone(), idx);
            by_name.entry(name_key(&guest.name)).or_insert(idx);
        }
        Self {
            guests,
            by_id,
            by_name,
        }
    }

    /// Resolves every guest's tier from the stage table. The configured
    /// boss name wins over any stage assignment.
    pub fn assign_tiers(&mut self, stages: &StageTable, boss_name: &str) {
        let boss_key = name_key(boss_name);
        for guest in &mut self.guests {
            guest.tier = if !boss_key.is_empty() && name_key(&guest.name) == boss_key {
                GuestTier::Boss
            } else {
                match stages.tier_of(&guest.name) {
                    Some(stage) => GuestTier::Ranked(stage),
                    None => GuestTier::Unranked,
                }
            };
        }
    }

    pub fn guests(&self) -> &[Guest] {
        &self.guests
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Guest> {
        self.by_id.get(id).map(|idx| &self.guests[*idx])
    }

    /// Case-insensitive lookup on the trimmed display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Guest> {
        self.by_name.get(&name_key(name)).map(|idx| &self.guests[*idx])
    }

    /// Returns `true` only the first time a guest becomes captured.
    pub fn mark_captured(&mut self, id: &str) -> bool {
        let Some(idx) = self.by_id.get(id).copied() else {
            tracing::warn!(guest_id = id, "mark_captured for unknown guest");
            return false;
        };
        let guest = &mut self.guests[idx];
        if guest.captured {
            return false;
        }
        guest.captured = true;
        true
    }

    pub fn is_captured(&self, id: &str) -> bool {
        self.get_by_id(id).map(|guest| guest.captured).unwrap_or(false)
    }

    pub fn captured_count(&self) -> usize {
        self.guests.iter().filter(|guest| guest.captured).count()
    }

    /// Every question when the guest has `count` or fewer, otherwise a
    /// random subset of `count`.
    pub fn pick_questions(&self, id: &str, count: usize, rng: &mut Rng) -> Vec<Question> {
        let Some(guest) = self.get_by_id(id) else {
            tracing::warn!(guest_id = id, "no questions found for guest");
            return Vec::new();
        };
        if guest.questions.len() <= count {
            return guest.questions.clone();
        }
        let mut pool = guest.questions.clone();
        rng.shuffle(&mut pool);
        pool.truncate(count);
        pool
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Strips a trailing version suffix such as `" 2.0"` and a trailing `_`.
pub fn clean_guest_name(name: &str) -> String {
    let trimmed = name.trim();
    let without_version = match trimmed.rsplit_once(' ') {
        Some((head, tail)) if is_version_suffix(tail) => head.trim_end(),
        _ => trimmed,
    };
    without_version
        .strip_suffix('_')
        .unwrap_or(without_version)
        .trim()
        .to_string()
}

fn is_version_suffix(value: &str) -> bool {
    let Some((major, minor)) = value.split_once('.') else {
        return false;
    };
    !major.is_empty()
        && !minor.is_empty()
        && major.chars().all(|c| c.is_ascii_digit())
        && minor.chars().all(|c| c.is_ascii_digit())
}

/// `"Ada Chen Rekhi"` → `"avatar-ada-chen-rekhi"`.
pub fn avatar_key(name: &str) -> String {
    let lowered = clean_guest_name(name).to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        let mapped = if c.is_whitespace() || c == '&' || c == '+' {
            '-'
        } else {
            c
        };
        if mapped == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(mapped);
    }
    format!("avatar-{}", slug.trim_matches('-'))
}

/// Relative avatar image path; the host decides whether the file exists and
/// falls back to a placeholder when it does not.
pub fn avatar_path(name: &str) -> String {
    format!("avatars/{}_pixel_art.png", clean_guest_name(name))
}
