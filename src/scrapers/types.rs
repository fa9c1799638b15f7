use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Search parameters for the rental results page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Area slug, e.g. `dublin-city`
    pub location: String,
    /// Minimum monthly rent (EUR)
    pub min_price: Option<u32>,
    /// Maximum monthly rent (EUR)
    pub max_price: Option<u32>,
    /// Minimum number of bedrooms
    pub min_beds: Option<u8>,
    /// Maximum number of bedrooms
    pub max_beds: Option<u8>,
    /// Sort field understood by the site
    pub sort_by: String,
    /// Sort direction
    pub sort_descending: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            location: "dublin-city".to_string(),
            min_price: Some(1500),
            max_price: Some(2300),
            min_beds: Some(1),
            max_beds: Some(2),
            sort_by: "price".to_string(),
            sort_descending: true,
        }
    }
}

impl SearchParams {
    /// Site-relative path of the first results page.
    pub fn start_path(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());

        let bounds = [
            ("mnp", self.min_price.map(|v| v.to_string())),
            ("mxp", self.max_price.map(|v| v.to_string())),
            ("mnb", self.min_beds.map(|v| v.to_string())),
            ("mxb", self.max_beds.map(|v| v.to_string())),
        ];
        for (key, value) in bounds {
            if let Some(value) = value {
                query.append_pair(key, &value);
            }
        }

        query.append_pair("s[sort_by]", &self.sort_by);
        query.append_pair("s[sort_type]", if self.sort_descending { "d" } else { "a" });
        query.append_pair("searchSource", "rental");

        format!(
            "/{}/residential-property-for-rent/?{}",
            self.location.trim_matches('/'),
            query.finish()
        )
    }
}
