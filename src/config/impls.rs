use serde::Deserialize;
use std::str::FromStr;

pub(crate) fn deserialize_level_filter<'de, D>(
    deserializer: D,
) -> Result<Option<log::LevelFilter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(None), |s| {
        log::LevelFilter::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom)
    })
}

/* Empty strings in config files and environment variables mean "unset" for
 * optional paths such as the seccomp program. */
pub(crate) fn optional_path(s: String) -> Option<std::path::PathBuf> {
    if s.is_empty() { None } else { Some(s.into()) }
}
