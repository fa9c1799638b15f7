use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::AppError;

const GMAPS_PLACE_URL: &str = "https://www.google.com/maps/place/";

/// One extracted rental listing.
///
/// Two rentals are the same listing iff their `id`s are equal; every other
/// field is informational.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Rental {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub img_url: String,
    #[serde(default)]
    pub beds: String,
    #[serde(default)]
    pub gmaps_url: String,
}

/// Derive a listing id from its canonical URL.
///
/// Takes the 7 characters that precede the final character, counting from
/// the end of the URL. Shorter URLs yield whatever is available.
pub fn listing_id(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    let start = chars.len().saturating_sub(8);
    let end = (start + 7).min(chars.len());
    chars[start..end].iter().collect()
}

/// Google Maps search link for a street address.
///
/// The address is encoded as a single path component: reserved characters
/// such as `,` and `&` are escaped and spaces become `%20`.
pub fn gmaps_url(address: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(address.as_bytes())
        .map(|chunk| if chunk == "+" { "%20" } else { chunk })
        .collect();
    format!("{GMAPS_PLACE_URL}{encoded}")
}

/// Named record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Unseen,
    Seen,
    Favorite,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Unseen, Partition::Seen, Partition::Favorite];

    /// Storage key of the persisted blob.
    pub fn storage_key(self) -> &'static str {
        match self {
            Partition::Unseen => "_rentals",
            Partition::Seen => "_seenRentals",
            Partition::Favorite => "_favRentals",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Partition::Unseen => "unseen",
            Partition::Seen => "seen",
            Partition::Favorite => "favorite",
        };
        f.write_str(name)
    }
}

impl FromStr for Partition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unseen" | "new" => Ok(Partition::Unseen),
            "seen" | "hidden" => Ok(Partition::Seen),
            "favorite" | "favourite" | "fav" | "saved" => Ok(Partition::Favorite),
            other => Err(AppError::config(format!("unknown partition '{other}'"))),
        }
    }
}
