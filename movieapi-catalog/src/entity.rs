//! Entity codec for the single-table layout
//!
//! | Kind  | `id`            | `sk`          |
//! |-------|-----------------|---------------|
//! | Movie | `m<movieId>`    | `xxxx`        |
//! | Cast  | `c<movieId>`    | `<actorId>`   |
//! | Award | `w<entityId>`   | `<awardBody>` |
//! | Actor | `a<actorId>`    | `xxxx`        |

use std::fmt;

use movieapi_dynamodb::ItemKey;
use serde_json::{Map, Value};
use thiserror::Error;

/// Sort key shared by every single-record partition (movies, actors)
pub const SINGLETON_SORT_KEY: &str = "xxxx";

/// Entity kinds, tagged by the first character of `id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Movie,
    Cast,
    Award,
    Actor,
}

impl EntityKind {
    pub fn prefix(&self) -> char {
        match self {
            Self::Movie => 'm',
            Self::Cast => 'c',
            Self::Award => 'w',
            Self::Actor => 'a',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'm' => Some(Self::Movie),
            'c' => Some(Self::Cast),
            'w' => Some(Self::Award),
            'a' => Some(Self::Actor),
            _ => None,
        }
    }

    /// Partition key for an id of this kind
    pub fn partition(&self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }
}

pub fn movie_key(movie_id: &str) -> ItemKey {
    ItemKey::new(EntityKind::Movie.partition(movie_id), SINGLETON_SORT_KEY)
}

pub fn cast_partition(movie_id: &str) -> String {
    EntityKind::Cast.partition(movie_id)
}

pub fn cast_member_key(movie_id: &str, actor_id: &str) -> ItemKey {
    ItemKey::new(cast_partition(movie_id), actor_id)
}

/// Awards hang off either a movie id or an actor id
pub fn award_partition(entity_id: &str) -> String {
    EntityKind::Award.partition(entity_id)
}

pub fn award_key(entity_id: &str, award_body: &str) -> ItemKey {
    ItemKey::new(award_partition(entity_id), award_body)
}

/// Why a plain record could not be decoded into an [`Entity`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownEntity {
    #[error("record has no string id/sk")]
    MissingKey,

    #[error("unrecognized id prefix in {0:?}")]
    UnknownPrefix(String),
}

/// A record decoded from its plain attribute map.
///
/// Attribute fields hold display text; a missing or null attribute is an
/// empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Movie {
        id: String,
        sk: String,
        title: String,
        release_date: String,
        overview: String,
    },
    Cast {
        id: String,
        sk: String,
        role_name: String,
        role_description: String,
    },
    Award {
        id: String,
        body: String,
        category: String,
        year: String,
    },
    Actor {
        id: String,
        sk: String,
        name: String,
        bio: String,
        dob: String,
    },
}

impl Entity {
    pub fn decode(record: &Map<String, Value>) -> Result<Self, UnknownEntity> {
        let (id, sk) = match (record.get("id"), record.get("sk")) {
            (Some(Value::String(id)), Some(Value::String(sk))) => (id.clone(), sk.clone()),
            _ => return Err(UnknownEntity::MissingKey),
        };

        let kind = id
            .chars()
            .next()
            .and_then(EntityKind::from_prefix)
            .ok_or_else(|| UnknownEntity::UnknownPrefix(id.clone()))?;

        let text = |name: &str| record.get(name).map(display_text).unwrap_or_default();

        Ok(match kind {
            EntityKind::Movie => Entity::Movie {
                title: text("title"),
                release_date: text("releaseDate"),
                overview: text("overview"),
                id,
                sk,
            },
            EntityKind::Cast => Entity::Cast {
                role_name: text("roleName"),
                role_description: text("roleDescription"),
                id,
                sk,
            },
            // Award lines carry the record's own `body`, not the sort key
            EntityKind::Award => Entity::Award {
                body: text("body"),
                category: text("category"),
                year: text("year"),
                id,
            },
            EntityKind::Actor => Entity::Actor {
                name: text("name"),
                bio: text("bio"),
                dob: text("dob"),
                id,
                sk,
            },
        })
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Movie {
                id,
                sk,
                title,
                release_date,
                overview,
            } => write!(f, "{} | {} | {} | {} | {}", id, sk, title, release_date, overview),
            Entity::Cast {
                id,
                sk,
                role_name,
                role_description,
            } => write!(f, "{} | {} | {} | {}", id, sk, role_name, role_description),
            Entity::Award {
                id,
                body,
                category,
                year,
            } => write!(f, "{} | {} | {} | {}", id, body, category, year),
            Entity::Actor {
                id,
                sk,
                name,
                bio,
                dob,
            } => write!(f, "{} | {} | {} | {} | {}", id, sk, name, bio, dob),
        }
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
