//! Request and response types shared by the HTTP API and its clients.

pub mod comments;
pub mod notifications;
pub mod projects;
pub mod schedule;
pub mod tags;
pub mod tasks;
pub mod users;

use serde::{Deserialize, Deserializer};

/// Deserializes a field where "absent" and "explicit null" mean different things.
///
/// Use together with `#[serde(default)]`: an absent field stays `None`, a
/// `null` becomes `Some(None)` and a value becomes `Some(Some(value))`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
