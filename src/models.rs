use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};
use sqlx::{FromRow, Type};

pub const INVALID_RUNTIME_FORMAT: &str = "invalid runtime format";

/// Running time in minutes.
///
/// Stored as a plain integer column; on the wire it is the string `"<n> mins"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Type)]
#[sqlx(transparent)]
pub struct Runtime(pub i32);

impl From<i32> for Runtime {
    fn from(minutes: i32) -> Self {
        Self(minutes)
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = &'static str;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some((minutes, unit)) = raw.split_once(' ') else {
            return Err(INVALID_RUNTIME_FORMAT);
        };

        if unit != "mins" {
            return Err(INVALID_RUNTIME_FORMAT);
        }

        minutes
            .parse::<i32>()
            .map(Self)
            .map_err(|_| INVALID_RUNTIME_FORMAT)
    }
}

impl Serialize for Runtime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RuntimeVisitor;

        impl Visitor<'_> for RuntimeVisitor {
            type Value = Runtime;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a runtime string such as \"135 mins\"")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(RuntimeVisitor)
    }
}

/// A row of the `movies` table.
///
/// `id`, `created_at` and `version` are owned by the store: they are assigned
/// on insert and only `version` ever changes afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, FromRow)]
pub struct Movie {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    /// Builds an unsaved record; the store fills in the rest on insert.
    pub fn new(
        title: impl Into<String>,
        year: i32,
        runtime: impl Into<Runtime>,
        genres: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            year,
            runtime: runtime.into(),
            genres,
            ..Self::default()
        }
    }
}

/// New movie input. Absent and `null` fields both decode to zero values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub year: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub runtime: Runtime,
    #[serde(deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
}

impl CreateMovieRequest {
    pub fn into_movie(self) -> Movie {
        Movie::new(self.title, self.year, self.runtime, self.genres)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Partial update: absent and `null` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl UpdateMovieRequest {
    pub fn apply_to(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = runtime;
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub store: &'static str,
    pub version: &'static str,
}
