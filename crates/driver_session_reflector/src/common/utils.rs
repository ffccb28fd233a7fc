/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Backend timestamps are zone-less `LocalDateTime`s. An unparseable value is
/// dropped rather than failing the whole ride payload.
pub fn deserialize_optional_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| parse_local_datetime(&raw)))
}

pub fn parse_local_datetime(raw: &str) -> Option<NaiveDateTime> {
    let parsed = raw
        .parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"));
    match parsed {
        Ok(timestamp) => Some(timestamp),
        Err(err) => {
            warn!(tag = "[Timestamp Parse Failed]", raw = %raw, error = %err);
            None
        }
    }
}

/// Joins a relative API path onto the configured base url, keeping any path the
/// base already carries (`http://host/api` + `rides/pending`).
pub fn join_path(base: &url::Url, path: &str) -> Result<url::Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}
